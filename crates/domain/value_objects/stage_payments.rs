use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::enums::{
    job_statuses::JobStatus, payment_stages::PaymentStage, proposal_statuses::ProposalStatus,
};
use crate::domain::entities::payment_events::InsertPaymentEventEntity;

/// Everything one verified stage payment writes, computed up front so it can
/// be applied in a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct StagePaymentUpdate {
    pub proposal_id: Uuid,
    pub stage: PaymentStage,
    pub paid_at: DateTime<Utc>,
    pub total_paid_minor: i64,
    pub proposal_status: ProposalStatus,
    pub next_payment_stage: Option<PaymentStage>,
    pub job_update: Option<JobStatusUpdate>,
    pub event: InsertPaymentEventEntity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStatusUpdate {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePaymentOutcome {
    Applied { event_id: Uuid },
    /// The idempotency key was already recorded; nothing was written.
    Duplicate,
    /// The proposal was rejected before the payment landed; nothing was written.
    ProposalRejected,
}
