// services/pix_gateway.rs
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    amount_in_cents: i64,
    external_id: String,
    callback_url: String,
}

/// Canonical charge record extracted from whatever shape the provider
/// answered with.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeDescriptor {
    pub transaction_id: String,
    pub display_url: Option<String>,
    pub copy_paste_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, amount: f64, external_reference: &str)
        -> Result<ChargeDescriptor>;

    /// Normalized provider status word for a transaction.
    async fn query_status(&self, transaction_id: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct PixGatewayClient {
    config: AppConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

impl PixGatewayClient {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        PixGatewayClient {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().unwrap();
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() + chrono::Duration::minutes(5) {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new provider access token");
        let auth_string = format!(
            "{}:{}",
            self.config.pix_client_id, self.config.pix_client_secret
        );
        let encoded_auth = base64.encode(auth_string);

        let response = self
            .client
            .post(self.config.auth_url())
            .header(header::AUTHORIZATION, format!("Basic {}", encoded_auth))
            .json(&serde_json::json!({ "grant_type": "client_credentials" }))
            .send()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("auth request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Provider auth failed: {} - {}", status, body);
            return Err(AppError::UpstreamAuth(format!("auth returned {}", status)));
        }

        let auth_response: AuthResponse = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamAuth(format!("unreadable auth response: {}", e)))?;

        let token = auth_response
            .access_token
            .ok_or_else(|| AppError::UpstreamAuth("auth response had no access_token".to_string()))?;

        {
            let ttl = auth_response.expires_in.unwrap_or(3600);
            let expiry = Utc::now() + chrono::Duration::seconds(ttl as i64);
            let mut cached = self.cached_token.write().unwrap();
            *cached = Some((token.clone(), expiry));
        }

        Ok(token)
    }
}

#[async_trait]
impl PaymentGateway for PixGatewayClient {
    async fn create_charge(
        &self,
        amount: f64,
        external_reference: &str,
    ) -> Result<ChargeDescriptor> {
        info!("Creating pix charge for R$ {:.2}", amount);

        let access_token = self.get_access_token().await?;

        let deposit_request = DepositRequest {
            amount_in_cents: (amount * 100.0).round() as i64,
            external_id: external_reference.to_string(),
            callback_url: self.config.pix_callback_url.clone(),
        };

        let response = self
            .client
            .post(self.config.deposit_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&deposit_request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Charge creation failed: {} - {}", status, body);
            return Err(AppError::UpstreamResponse(format!(
                "charge creation returned {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::UpstreamResponse(format!("unreadable charge response: {}", e)))?;

        let descriptor = normalize_charge_response(&body)?;
        info!("Charge created: {}", descriptor.transaction_id);
        Ok(descriptor)
    }

    async fn query_status(&self, transaction_id: &str) -> Result<String> {
        let access_token = self.get_access_token().await?;

        for url in self.config.status_urls(transaction_id) {
            let response = self
                .client
                .get(&url)
                .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                info!("Status candidate {} answered 404, trying next", url);
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!("Status lookup failed: {} - {}", status, body);
                return Err(AppError::UpstreamStatus(format!(
                    "status lookup returned {}",
                    status
                )));
            }

            let body: Value = match response.json().await {
                Ok(value) => value,
                Err(e) => {
                    warn!("Status candidate {} returned unparseable body: {}", url, e);
                    continue;
                }
            };

            if let Some(word) = parse_status(&body) {
                return Ok(word);
            }
            warn!("Status candidate {} had no status field, trying next", url);
        }

        Err(AppError::UpstreamUnavailable(format!(
            "no status endpoint answered for transaction {}",
            transaction_id
        )))
    }
}

// ---------------------------------------------------------------------------
// Response normalization. The provider has answered with several payload
// shapes over time: flat, nested under `qrCodeResponse`, nested under `data`,
// and occasionally with the copy-paste code only embedded in free text. Each
// extraction below is an ordered chain over those candidates.
// ---------------------------------------------------------------------------

const WRAPPER_BLOCKS: &[&str] = &["qrCodeResponse", "data"];

const TRANSACTION_ID_FIELDS: &[&str] = &["transactionId", "transaction_id", "txid", "id"];
const DISPLAY_URL_FIELDS: &[&str] = &["qrCodeUrl", "qr_code_url", "qrCodeImage", "paymentUrl", "url"];
const COPY_PASTE_FIELDS: &[&str] = &[
    "copyPaste",
    "copy_paste",
    "qrCode",
    "qr_code",
    "brCode",
    "pixCode",
    "emv",
    "code",
];
const EXPIRES_FIELDS: &[&str] = &["expiresAt", "expires_at", "expirationDate", "expiration"];

/// Pix EMV "copia e cola" grammar: the fixed `000201` payload-format prefix,
/// an arbitrary run of tagged fields, and the `6304` CRC tag followed by four
/// hex digits.
fn pix_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"000201[^"\\]*?6304[0-9A-Fa-f]{4}"#).expect("valid pix code pattern")
    })
}

fn candidate_blocks(value: &Value) -> Vec<&Value> {
    let mut blocks = vec![value];
    for wrapper in WRAPPER_BLOCKS {
        if let Some(nested) = value.get(wrapper) {
            if nested.is_object() {
                blocks.push(nested);
            }
        }
    }
    blocks
}

fn first_string(blocks: &[&Value], fields: &[&str]) -> Option<String> {
    for block in blocks {
        for field in fields {
            if let Some(s) = block.get(*field).and_then(Value::as_str) {
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

/// Last-resort extraction: scan the raw serialized response for the first
/// string matching the copy-paste grammar.
pub(crate) fn extract_pix_code(raw: &str) -> Option<String> {
    pix_code_re().find(raw).map(|m| m.as_str().to_string())
}

pub(crate) fn normalize_charge_response(value: &Value) -> Result<ChargeDescriptor> {
    let blocks = candidate_blocks(value);

    let transaction_id = first_string(&blocks, TRANSACTION_ID_FIELDS).ok_or_else(|| {
        AppError::upstream_response("charge response had no transaction id")
    })?;

    let mut display_url = first_string(&blocks, DISPLAY_URL_FIELDS);
    let mut copy_paste_code = first_string(&blocks, COPY_PASTE_FIELDS)
        // A URL in a code-named field is not a copy-paste code.
        .filter(|code| !code.starts_with("http") || pix_code_re().is_match(code));

    // Providers sometimes hand the raw code where a QR URL belongs.
    if let Some(url) = display_url.as_ref() {
        if pix_code_re().is_match(url) {
            if copy_paste_code.is_none() {
                copy_paste_code = Some(url.clone());
            }
            display_url = None;
        }
    }

    if copy_paste_code.is_none() {
        let raw = value.to_string();
        copy_paste_code = extract_pix_code(&raw);
    }

    if display_url.is_none() && copy_paste_code.is_none() {
        return Err(AppError::upstream_response(
            "charge response had no display artifact",
        ));
    }

    let expires_at = first_string(&blocks, EXPIRES_FIELDS).and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    });

    Ok(ChargeDescriptor {
        transaction_id,
        display_url,
        copy_paste_code,
        expires_at,
    })
}

const STATUS_FIELDS: &[&str] = &["status", "transactionStatus", "transaction_status", "state"];

pub(crate) fn parse_status(value: &Value) -> Option<String> {
    let blocks = candidate_blocks(value);
    first_string(&blocks, STATUS_FIELDS)
}

/// Provider vocabulary for a settled charge.
pub fn is_completed_status(status: &str) -> bool {
    matches!(
        status.to_ascii_lowercase().as_str(),
        "paid" | "approved" | "completed" | "confirmed" | "success"
    )
}
