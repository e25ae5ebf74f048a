use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{
    enums::{
        job_statuses::JobStatus, payment_stages::PaymentStage,
        proposal_statuses::ProposalStatus, stage_statuses::StageStatus,
    },
    payment_ledger::{PaymentLedger, StagePlan},
};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApprovalDto {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    pub job_id: Uuid,
    pub job_number: String,
    pub stages: Vec<StagePlan>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StageViewDto {
    pub stage: PaymentStage,
    pub percentage: u8,
    pub amount_minor: i64,
    pub status: StageStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl StageViewDto {
    pub fn from_ledger(ledger: &PaymentLedger) -> Vec<Self> {
        PaymentStage::ALL
            .iter()
            .map(|stage| StageViewDto {
                stage: *stage,
                percentage: stage.percentage(),
                amount_minor: ledger.amounts().amount(*stage),
                status: ledger.stage_status(*stage),
                paid_at: ledger.paid_at(*stage),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProposalStatusDto {
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    pub job_id: Option<Uuid>,
    pub job_status: Option<JobStatus>,
    pub label: String,
    pub total_minor: i64,
    pub total_paid_minor: i64,
    pub paid_percentage: f64,
    pub current_payment_stage: Option<PaymentStage>,
    pub stages: Vec<StageViewDto>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CheckoutSessionDto {
    pub proposal_id: Uuid,
    pub stage: PaymentStage,
    pub amount_minor: i64,
    pub currency: String,
    pub session_id: String,
    pub url: String,
}
