use chrono::{DateTime, TimeZone, Utc};
use fieldops::domain::{
    entities::{jobs::JobEntity, proposals::ProposalEntity},
    value_objects::{
        actors::Actor,
        enums::{job_statuses::JobStatus, proposal_statuses::ProposalStatus, roles::Role},
        payment_ledger::StageAmounts,
    },
};
use uuid::Uuid;

pub(crate) fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap()
}

pub(crate) fn actor(role: Role) -> Actor {
    Actor::new(Uuid::new_v4(), role)
}

pub(crate) fn draft_proposal(customer_id: Uuid, total_minor: i64) -> ProposalEntity {
    ProposalEntity {
        id: Uuid::new_v4(),
        customer_id: Some(customer_id),
        title: "Heat pump install".to_string(),
        status: ProposalStatus::Draft.to_string(),
        total_minor,
        currency: "usd".to_string(),
        deposit_amount_minor: None,
        progress_amount_minor: None,
        final_amount_minor: None,
        deposit_paid_at: None,
        progress_paid_at: None,
        final_paid_at: None,
        total_paid_minor: 0,
        current_payment_stage: None,
        approved_at: None,
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}

/// As stored right after approval: amounts fixed, nothing paid.
pub(crate) fn approved_proposal(customer_id: Uuid, total_minor: i64) -> ProposalEntity {
    let amounts = StageAmounts::split(total_minor).unwrap();
    ProposalEntity {
        status: ProposalStatus::Approved.to_string(),
        deposit_amount_minor: Some(amounts.deposit_minor),
        progress_amount_minor: Some(amounts.progress_minor),
        final_amount_minor: Some(amounts.final_minor),
        current_payment_stage: Some("deposit".to_string()),
        approved_at: Some(fixed_time()),
        ..draft_proposal(customer_id, total_minor)
    }
}

pub(crate) fn job_for(proposal_id: Uuid, status: JobStatus) -> JobEntity {
    JobEntity {
        id: Uuid::new_v4(),
        job_number: "JOB-20261001-001".to_string(),
        proposal_id: Some(proposal_id),
        title: "Heat pump install".to_string(),
        status: status.to_string(),
        created_at: fixed_time(),
        updated_at: fixed_time(),
    }
}
