// services/lifecycle.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::donation::{
    Attribution, Donation, DonationCreated, DonationStatus, DonationView, SyncResult,
};
use crate::services::notifier::{ConversionEvent, ConversionNotifier, FunnelStage};
use crate::services::pix_gateway::{is_completed_status, PaymentGateway};
use crate::store::DonationStore;

/// The donation state machine. Both reconciliation channels (provider webhook
/// and caller-triggered sync) converge on `apply_completion`, which funnels
/// the pending -> paid flip through the store's compare-and-transition so the
/// paid attribution event fires at most once.
pub struct LifecycleEngine {
    store: Arc<dyn DonationStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn ConversionNotifier>,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn DonationStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn ConversionNotifier>,
    ) -> Self {
        LifecycleEngine {
            store,
            gateway,
            notifier,
        }
    }

    pub async fn create(
        &self,
        amount: f64,
        attribution: Option<Attribution>,
        client_ip: Option<String>,
    ) -> Result<DonationCreated> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(AppError::invalid_input("amount must be a positive number"));
        }

        let donation_id = Uuid::new_v4().to_string();
        // Nothing is persisted until the provider call succeeds.
        let charge = self.gateway.create_charge(amount, &donation_id).await?;

        let donation = Donation {
            id: donation_id,
            amount,
            status: DonationStatus::Pending,
            transaction_id: charge.transaction_id,
            display_url: charge.display_url,
            copy_paste_code: charge.copy_paste_code,
            expires_at: charge.expires_at,
            attribution,
            client_ip,
            created_at: Utc::now(),
            paid_at: None,
        };
        self.store.insert(donation.clone()).await?;
        info!(
            "Donation {} created, transaction {}",
            donation.id, donation.transaction_id
        );

        self.dispatch_event(ConversionEvent::from_donation(
            &donation,
            FunnelStage::WaitingPayment,
            None,
        ));

        Ok(DonationCreated::from_donation(&donation))
    }

    /// Idempotent convergence point for both reconciliation channels. Unknown
    /// transaction ids are `DonationNotFound`; duplicate confirmations are a
    /// quiet no-op and send no second paid event.
    pub async fn apply_completion(&self, transaction_id: &str) -> Result<SyncResult> {
        let donation = self
            .store
            .get_by_transaction_id(transaction_id)
            .await
            .ok_or(AppError::DonationNotFound)?;

        let applied = self
            .store
            .compare_and_transition(&donation.id, DonationStatus::Pending, DonationStatus::Paid)
            .await;

        if applied {
            info!(
                "Donation {} confirmed paid (transaction {})",
                donation.id, transaction_id
            );
            self.dispatch_event(ConversionEvent::from_donation(
                &donation,
                FunnelStage::Paid,
                Some(Utc::now()),
            ));
        } else {
            info!(
                "Duplicate completion for transaction {}, already paid",
                transaction_id
            );
        }

        Ok(SyncResult {
            donation_id: donation.id,
            status: DonationStatus::Paid,
        })
    }

    /// Pull reconciliation: poll the provider and converge through
    /// `apply_completion` if it reports the charge settled.
    pub async fn sync(&self, donation_id: &str) -> Result<SyncResult> {
        let donation = self
            .store
            .get(donation_id)
            .await
            .ok_or(AppError::DonationNotFound)?;

        let status = self.gateway.query_status(&donation.transaction_id).await?;
        if is_completed_status(&status) {
            return self.apply_completion(&donation.transaction_id).await;
        }

        Ok(SyncResult {
            donation_id: donation.id,
            status: donation.status,
        })
    }

    /// Push reconciliation entry point. The record is resolved before the
    /// pushed status is inspected so an unrecognized transaction id is always
    /// a 404, never a silent ack.
    pub async fn handle_webhook(&self, transaction_id: &str, status: &str) -> Result<()> {
        if self
            .store
            .get_by_transaction_id(transaction_id)
            .await
            .is_none()
        {
            return Err(AppError::DonationNotFound);
        }

        if is_completed_status(status) {
            self.apply_completion(transaction_id).await?;
        } else {
            info!(
                "Webhook for transaction {} with status {}, nothing to apply",
                transaction_id, status
            );
        }
        Ok(())
    }

    pub async fn status_view(&self, donation_id: &str) -> Result<DonationView> {
        let donation = self
            .store
            .get(donation_id)
            .await
            .ok_or(AppError::DonationNotFound)?;
        Ok(DonationView::from_donation(&donation))
    }

    // Best-effort telemetry: dispatched on its own task, failure logged and
    // never surfaced to the caller.
    fn dispatch_event(&self, event: ConversionEvent) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let donation_id = event.donation_id.clone();
            if let Err(e) = notifier.send(event).await {
                warn!("Attribution event for donation {} failed: {}", donation_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pix_gateway::ChargeDescriptor;
    use crate::store::InMemoryDonationStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeGateway {
        charge: Option<ChargeDescriptor>,
        status: Option<String>,
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_charge(
            &self,
            _amount: f64,
            _external_reference: &str,
        ) -> Result<ChargeDescriptor> {
            self.charge
                .clone()
                .ok_or_else(|| AppError::UpstreamResponse("provider down".to_string()))
        }

        async fn query_status(&self, _transaction_id: &str) -> Result<String> {
            self.status
                .clone()
                .ok_or_else(|| AppError::UpstreamUnavailable("no candidates".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<ConversionEvent>>,
    }

    #[async_trait]
    impl ConversionNotifier for RecordingNotifier {
        async fn send(&self, event: ConversionEvent) -> Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn charge(transaction_id: &str) -> ChargeDescriptor {
        ChargeDescriptor {
            transaction_id: transaction_id.to_string(),
            display_url: Some("https://provider.example/qr.png".to_string()),
            copy_paste_code: Some("000201...".to_string()),
            expires_at: None,
        }
    }

    fn engine(
        gateway: FakeGateway,
    ) -> (
        LifecycleEngine,
        Arc<InMemoryDonationStore>,
        Arc<RecordingNotifier>,
    ) {
        let store = Arc::new(InMemoryDonationStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = LifecycleEngine::new(store.clone(), Arc::new(gateway), notifier.clone());
        (engine, store, notifier)
    }

    // Notification dispatch is spawned; give the runtime a beat to drain it.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn create_inserts_pending_record_and_sends_waiting_event() {
        let (engine, store, notifier) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        assert_eq!(created.transaction_id, "tx-1");

        let record = store.get(&created.donation_id).await.unwrap();
        assert_eq!(record.status, DonationStatus::Pending);
        assert_eq!(record.amount, 25.50);

        settle().await;
        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, FunnelStage::WaitingPayment);
        assert_eq!(events[0].amount_in_cents, 2550);
    }

    #[tokio::test]
    async fn create_rejects_bad_amounts() {
        let (engine, _, _) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        for amount in [0.0, -3.0, f64::NAN, f64::INFINITY] {
            let err = engine.create(amount, None, None).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn gateway_failure_inserts_nothing() {
        let (engine, store, notifier) = engine(FakeGateway {
            charge: None,
            status: None,
        });

        let err = engine.create(10.0, None, None).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamResponse(_)));

        settle().await;
        assert!(store.get_by_transaction_id("tx-1").await.is_none());
        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn completion_is_idempotent_and_notifies_once() {
        let (engine, store, notifier) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let created = engine.create(25.50, None, None).await.unwrap();

        let first = engine.apply_completion("tx-1").await.unwrap();
        assert_eq!(first.status, DonationStatus::Paid);

        let second = engine.apply_completion("tx-1").await.unwrap();
        assert_eq!(second.status, DonationStatus::Paid);

        let record = store.get(&created.donation_id).await.unwrap();
        assert_eq!(record.status, DonationStatus::Paid);
        assert!(record.paid_at.is_some());

        settle().await;
        let events = notifier.events.lock().unwrap();
        let paid: Vec<_> = events
            .iter()
            .filter(|e| e.stage == FunnelStage::Paid)
            .collect();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].amount_in_cents, 2550);
        assert_eq!(paid[0].created_at, record.created_at);
        assert!(paid[0].approved_date.is_some());
    }

    #[tokio::test]
    async fn completion_for_unknown_transaction_is_not_found() {
        let (engine, _, notifier) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let err = engine.apply_completion("tx-unknown").await.unwrap_err();
        assert!(matches!(err, AppError::DonationNotFound));

        settle().await;
        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_applies_completion_when_provider_reports_paid() {
        let (engine, store, notifier) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: Some("PAID".to_string()),
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        let result = engine.sync(&created.donation_id).await.unwrap();

        assert_eq!(result.status, DonationStatus::Paid);
        assert_eq!(
            store.get(&created.donation_id).await.unwrap().status,
            DonationStatus::Paid
        );

        settle().await;
        let events = notifier.events.lock().unwrap();
        assert!(events.iter().any(|e| e.stage == FunnelStage::Paid));
    }

    #[tokio::test]
    async fn sync_leaves_pending_donation_untouched() {
        let (engine, store, _) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: Some("pending".to_string()),
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        let result = engine.sync(&created.donation_id).await.unwrap();

        assert_eq!(result.status, DonationStatus::Pending);
        assert_eq!(
            store.get(&created.donation_id).await.unwrap().status,
            DonationStatus::Pending
        );
    }

    #[tokio::test]
    async fn sync_surfaces_provider_exhaustion() {
        let (engine, _, _) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        let err = engine.sync(&created.donation_id).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn sync_for_unknown_donation_is_not_found() {
        let (engine, _, _) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: Some("PAID".to_string()),
        });

        let err = engine.sync("missing").await.unwrap_err();
        assert!(matches!(err, AppError::DonationNotFound));
    }

    #[tokio::test]
    async fn webhook_with_unknown_transaction_changes_nothing() {
        let (engine, store, notifier) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        let err = engine.handle_webhook("tx-unknown", "PAID").await.unwrap_err();
        assert!(matches!(err, AppError::DonationNotFound));

        assert_eq!(
            store.get(&created.donation_id).await.unwrap().status,
            DonationStatus::Pending
        );
        settle().await;
        let events = notifier.events.lock().unwrap();
        assert!(events.iter().all(|e| e.stage == FunnelStage::WaitingPayment));
    }

    #[tokio::test]
    async fn webhook_with_non_final_status_is_acknowledged_without_transition() {
        let (engine, store, _) = engine(FakeGateway {
            charge: Some(charge("tx-1")),
            status: None,
        });

        let created = engine.create(25.50, None, None).await.unwrap();
        engine.handle_webhook("tx-1", "waiting_payment").await.unwrap();

        assert_eq!(
            store.get(&created.donation_id).await.unwrap().status,
            DonationStatus::Pending
        );
    }
}
