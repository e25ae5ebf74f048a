use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::{
    entities::payment_events::PaymentEventEntity,
    value_objects::stage_payments::{StagePaymentOutcome, StagePaymentUpdate},
};

#[automock]
#[async_trait]
pub trait PaymentEventRepository: Send + Sync {
    async fn find_by_transaction_id(
        &self,
        external_transaction_id: &str,
    ) -> Result<Option<PaymentEventEntity>>;

    /// Records the payment event and applies the proposal and job updates in
    /// one transaction. The event's transaction id is the idempotency key.
    async fn apply_stage_payment(&self, update: StagePaymentUpdate) -> Result<StagePaymentOutcome>;
}
