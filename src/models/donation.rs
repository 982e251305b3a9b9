use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Pending,
    Paid,
}

/// UTM campaign tags captured at creation and forwarded untouched to the
/// attribution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_content: Option<String>,
    pub utm_term: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub id: String,
    pub amount: f64,
    pub status: DonationStatus,
    /// Provider-assigned id; the sole join key for webhook and sync
    /// reconciliation. Unique across all donations.
    pub transaction_id: String,
    pub display_url: Option<String>,
    pub copy_paste_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub attribution: Option<Attribution>,
    pub client_ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Donation {
    pub fn amount_in_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

// Request / response shapes for the HTTP surface.

#[derive(Debug, Deserialize)]
pub struct CreateDonationRequest {
    pub amount: f64,
    pub attribution: Option<Attribution>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationCreated {
    pub donation_id: String,
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_paste_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationView {
    pub donation_id: String,
    pub status: DonationStatus,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy_paste_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub donation_id: String,
    pub status: DonationStatus,
}

impl DonationCreated {
    pub fn from_donation(d: &Donation) -> Self {
        DonationCreated {
            donation_id: d.id.clone(),
            transaction_id: d.transaction_id.clone(),
            display_url: d.display_url.clone(),
            copy_paste_code: d.copy_paste_code.clone(),
            expires_at: d.expires_at,
        }
    }
}

impl DonationView {
    pub fn from_donation(d: &Donation) -> Self {
        DonationView {
            donation_id: d.id.clone(),
            status: d.status,
            amount: d.amount,
            display_url: d.display_url.clone(),
            copy_paste_code: d.copy_paste_code.clone(),
        }
    }
}
