use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        enums::{payment_stages::PaymentStage, proposal_statuses::ProposalStatus},
        payment_ledger::{LedgerError, PaymentLedger, StageAmounts},
        stage_payments::StagePaymentUpdate,
    },
    infra::db::postgres::schema::proposals,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = proposals)]
pub struct ProposalEntity {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub status: String,
    pub total_minor: i64,
    pub currency: String,
    pub deposit_amount_minor: Option<i64>,
    pub progress_amount_minor: Option<i64>,
    pub final_amount_minor: Option<i64>,
    pub deposit_paid_at: Option<DateTime<Utc>>,
    pub progress_paid_at: Option<DateTime<Utc>>,
    pub final_paid_at: Option<DateTime<Utc>>,
    pub total_paid_minor: i64,
    pub current_payment_stage: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProposalEntity {
    pub fn status(&self) -> Option<ProposalStatus> {
        ProposalStatus::normalize(&self.status)
    }

    /// The ledger exists once the proposal has been approved; before that the
    /// amount columns are null.
    pub fn ledger(&self) -> Result<Option<PaymentLedger>, LedgerError> {
        let (Some(deposit_minor), Some(progress_minor), Some(final_minor)) = (
            self.deposit_amount_minor,
            self.progress_amount_minor,
            self.final_amount_minor,
        ) else {
            return Ok(None);
        };

        PaymentLedger::from_parts(
            self.total_minor,
            StageAmounts {
                deposit_minor,
                progress_minor,
                final_minor,
            },
            self.deposit_paid_at,
            self.progress_paid_at,
            self.final_paid_at,
        )
        .map(Some)
    }

    pub fn current_payment_stage(&self) -> Option<PaymentStage> {
        self.current_payment_stage
            .as_deref()
            .and_then(PaymentStage::from_str)
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.customer_id == Some(user_id)
    }
}

/// Columns written when a proposal is approved and its ledger materialised.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = proposals)]
pub struct ApproveProposalEntity {
    pub status: String,
    pub deposit_amount_minor: Option<i64>,
    pub progress_amount_minor: Option<i64>,
    pub final_amount_minor: Option<i64>,
    pub total_paid_minor: i64,
    pub current_payment_stage: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ApproveProposalEntity {
    pub fn from_ledger(ledger: &PaymentLedger, approved_at: DateTime<Utc>) -> Self {
        let amounts = ledger.amounts();
        Self {
            status: ProposalStatus::Approved.to_string(),
            deposit_amount_minor: Some(amounts.deposit_minor),
            progress_amount_minor: Some(amounts.progress_minor),
            final_amount_minor: Some(amounts.final_minor),
            total_paid_minor: ledger.total_paid_minor(),
            current_payment_stage: ledger.active_stage().map(|stage| stage.to_string()),
            approved_at: Some(approved_at),
            updated_at: approved_at,
        }
    }
}

/// Columns written when a stage payment lands. Only the paid stage's
/// timestamp is `Some`, so the other two are left untouched.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = proposals)]
pub struct StagePaymentChangeset {
    pub status: String,
    pub deposit_paid_at: Option<DateTime<Utc>>,
    pub progress_paid_at: Option<DateTime<Utc>>,
    pub final_paid_at: Option<DateTime<Utc>>,
    pub total_paid_minor: i64,
    pub current_payment_stage: Option<Option<String>>,
    pub updated_at: DateTime<Utc>,
}

impl StagePaymentChangeset {
    pub fn from_update(update: &StagePaymentUpdate, updated_at: DateTime<Utc>) -> Self {
        let paid_at = |stage: PaymentStage| (update.stage == stage).then_some(update.paid_at);
        Self {
            status: update.proposal_status.to_string(),
            deposit_paid_at: paid_at(PaymentStage::Deposit),
            progress_paid_at: paid_at(PaymentStage::Progress),
            final_paid_at: paid_at(PaymentStage::Final),
            total_paid_minor: update.total_paid_minor,
            current_payment_stage: Some(update.next_payment_stage.map(|stage| stage.to_string())),
            updated_at,
        }
    }
}
