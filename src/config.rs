// config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pix_client_id: String,
    pub pix_client_secret: String,
    pub pix_base_url: String,
    pub pix_callback_url: String,
    pub attribution_api_url: String,
    pub attribution_api_token: String,
    pub port: u16,
    pub host: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        AppConfig {
            pix_client_id: env::var("PIX_CLIENT_ID")
                .expect("PIX_CLIENT_ID must be set"),
            pix_client_secret: env::var("PIX_CLIENT_SECRET")
                .expect("PIX_CLIENT_SECRET must be set"),
            pix_base_url: env::var("PIX_BASE_URL")
                .expect("PIX_BASE_URL must be set"),
            pix_callback_url: env::var("PIX_CALLBACK_URL")
                .expect("PIX_CALLBACK_URL must be set"),
            attribution_api_url: env::var("ATTRIBUTION_API_URL")
                .expect("ATTRIBUTION_API_URL must be set"),
            attribution_api_token: env::var("ATTRIBUTION_API_TOKEN")
                .expect("ATTRIBUTION_API_TOKEN must be set"),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("PORT must be a number"),
            host: env::var("HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }

    pub fn auth_url(&self) -> String {
        format!("{}/oauth/token", self.pix_base_url.trim_end_matches('/'))
    }

    pub fn deposit_url(&self) -> String {
        format!("{}/v1/deposits", self.pix_base_url.trim_end_matches('/'))
    }

    /// Ordered candidate endpoints for a transaction status lookup. The
    /// provider has shipped this route under more than one path; the first
    /// candidate that answers with a parseable status wins.
    pub fn status_urls(&self, transaction_id: &str) -> Vec<String> {
        let base = self.pix_base_url.trim_end_matches('/');
        vec![
            format!("{}/v1/transactions/{}", base, transaction_id),
            format!("{}/v1/transaction/{}", base, transaction_id),
            format!("{}/v1/deposits/{}/status", base, transaction_id),
        ]
    }
}
