// services/notifier.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::models::donation::{Donation, DonationStatus};

/// Funnel state reported to the attribution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunnelStage {
    WaitingPayment,
    Paid,
}

impl FunnelStage {
    fn as_str(&self) -> &'static str {
        match self {
            FunnelStage::WaitingPayment => "waiting_payment",
            FunnelStage::Paid => "paid",
        }
    }
}

/// Snapshot handed to the notifier. Built by the lifecycle engine at the
/// moment of the state change; `created_at` is always the donation's original
/// creation time, `approved_date` only set for the paid stage.
#[derive(Debug, Clone)]
pub struct ConversionEvent {
    pub donation_id: String,
    pub transaction_id: String,
    pub stage: FunnelStage,
    pub amount_in_cents: i64,
    pub created_at: DateTime<Utc>,
    pub approved_date: Option<DateTime<Utc>>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
    pub client_ip: Option<String>,
}

impl ConversionEvent {
    pub fn from_donation(
        donation: &Donation,
        stage: FunnelStage,
        approved_date: Option<DateTime<Utc>>,
    ) -> Self {
        let attribution = donation.attribution.as_ref();
        ConversionEvent {
            donation_id: donation.id.clone(),
            transaction_id: donation.transaction_id.clone(),
            stage,
            amount_in_cents: donation.amount_in_cents(),
            created_at: donation.created_at,
            approved_date,
            utm_source: attribution.and_then(|a| a.utm_source.clone()),
            utm_medium: attribution.and_then(|a| a.utm_medium.clone()),
            utm_campaign: attribution.and_then(|a| a.utm_campaign.clone()),
            utm_content: attribution.and_then(|a| a.utm_content.clone()),
            utm_term: attribution.and_then(|a| a.utm_term.clone()),
            client_ip: donation.client_ip.clone(),
        }
    }
}

#[async_trait]
pub trait ConversionNotifier: Send + Sync {
    async fn send(&self, event: ConversionEvent) -> Result<()>;
}

// Attribution service order payload.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttributionOrder {
    order_id: String,
    platform: String,
    payment_method: String,
    status: String,
    created_at: String,
    approved_date: Option<String>,
    refunded_at: Option<String>,
    customer: AttributionCustomer,
    products: Vec<AttributionProduct>,
    tracking_parameters: TrackingParameters,
    commission: Commission,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttributionCustomer {
    ip: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttributionProduct {
    id: String,
    name: String,
    price_in_cents: i64,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct TrackingParameters {
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    utm_content: Option<String>,
    utm_term: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Commission {
    total_price_in_cents: i64,
    gateway_fee_in_cents: i64,
    user_commission_in_cents: i64,
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn build_order(event: &ConversionEvent) -> AttributionOrder {
    AttributionOrder {
        order_id: event.donation_id.clone(),
        platform: "donations".to_string(),
        payment_method: "pix".to_string(),
        status: event.stage.as_str().to_string(),
        created_at: format_timestamp(event.created_at),
        approved_date: event.approved_date.map(format_timestamp),
        refunded_at: None,
        customer: AttributionCustomer {
            ip: event.client_ip.clone(),
        },
        products: vec![AttributionProduct {
            id: event.transaction_id.clone(),
            name: "Donation".to_string(),
            price_in_cents: event.amount_in_cents,
            quantity: 1,
        }],
        tracking_parameters: TrackingParameters {
            utm_source: event.utm_source.clone(),
            utm_medium: event.utm_medium.clone(),
            utm_campaign: event.utm_campaign.clone(),
            utm_content: event.utm_content.clone(),
            utm_term: event.utm_term.clone(),
        },
        commission: Commission {
            total_price_in_cents: event.amount_in_cents,
            gateway_fee_in_cents: 0,
            user_commission_in_cents: event.amount_in_cents,
        },
    }
}

#[derive(Debug, Clone)]
pub struct AttributionNotifier {
    config: AppConfig,
    client: Client,
}

impl AttributionNotifier {
    pub fn new(config: AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        AttributionNotifier { config, client }
    }
}

#[async_trait]
impl ConversionNotifier for AttributionNotifier {
    async fn send(&self, event: ConversionEvent) -> Result<()> {
        let order = build_order(&event);
        info!(
            "Sending {} attribution event for donation {}",
            event.stage.as_str(),
            event.donation_id
        );

        let response = self
            .client
            .post(&self.config.attribution_api_url)
            .header("x-api-token", &self.config.attribution_api_token)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&order)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("attribution request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Attribution service rejected event: {} - {}", status, body);
            return Err(AppError::Notification(format!(
                "attribution service returned {}",
                status
            )));
        }

        Ok(())
    }
}
