//! The one mapping table between proposal and job statuses.
//!
//! Everything here is pure. Callers persist whatever these functions return.

use super::{
    enums::{job_statuses::JobStatus, proposal_statuses::ProposalStatus},
    payment_ledger::PaymentLedger,
};

pub fn job_status_for(proposal_status: ProposalStatus) -> JobStatus {
    match proposal_status {
        ProposalStatus::Draft | ProposalStatus::Sent | ProposalStatus::Approved => {
            JobStatus::NotScheduled
        }
        ProposalStatus::Rejected => JobStatus::Cancelled,
        ProposalStatus::DepositPaid => JobStatus::Scheduled,
        ProposalStatus::RoughInPaid => JobStatus::InProgress,
        ProposalStatus::Completed => JobStatus::Completed,
    }
}

/// Lossy: every non-terminal job maps back to `approved`.
pub fn proposal_status_for(job_status: JobStatus) -> ProposalStatus {
    match job_status {
        JobStatus::NotScheduled | JobStatus::Scheduled | JobStatus::InProgress => {
            ProposalStatus::Approved
        }
        JobStatus::Completed => ProposalStatus::Completed,
        JobStatus::Cancelled => ProposalStatus::Rejected,
    }
}

/// Single display label for a job/proposal pair.
///
/// Precedence: a terminal job wins, then an active job on an approved
/// proposal, then the proposal's own label.
pub fn unified_label(job_status: JobStatus, proposal_status: ProposalStatus) -> String {
    if job_status.is_terminal() {
        return job_status.label().to_string();
    }

    if proposal_status.is_post_approval()
        && matches!(job_status, JobStatus::Scheduled | JobStatus::InProgress)
    {
        return job_status.label().to_string();
    }

    proposal_status.label().to_string()
}

/// [`unified_label`] over stored strings. A proposal status we cannot read is
/// shown titleized as-is rather than guessed at.
pub fn unified_label_raw(job_status: &str, proposal_status: &str) -> String {
    let job = JobStatus::normalize_or_default(job_status);
    match ProposalStatus::normalize(proposal_status) {
        Some(proposal) => unified_label(job, proposal),
        None if job.is_terminal() => job.label().to_string(),
        None => titleize(proposal_status),
    }
}

pub fn titleize(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Job update triggered by a proposal reaching `proposal_status` through a
/// payment. Terminal jobs are left alone and a job never moves backwards, so
/// `None` means "no write needed".
pub fn job_status_after_payment(
    current: JobStatus,
    proposal_status: ProposalStatus,
) -> Option<JobStatus> {
    if current.is_terminal() {
        return None;
    }

    let target = job_status_for(proposal_status);
    match (current.progress_rank(), target.progress_rank()) {
        (Some(current_rank), Some(target_rank)) if target_rank > current_rank => Some(target),
        _ => None,
    }
}

/// Proposal update triggered by an operator or technician moving the job.
///
/// Once any stage is paid the proposal status belongs to the ledger, so a
/// job change only moves the proposal when the result agrees with it.
pub fn proposal_status_after_job_change(
    current: ProposalStatus,
    job_status: JobStatus,
    ledger: Option<&PaymentLedger>,
) -> Option<ProposalStatus> {
    if current.is_terminal() || !current.is_post_approval() {
        return None;
    }

    let candidate = proposal_status_for(job_status);
    let consistent = match ledger {
        Some(ledger) if ledger.has_payments() => candidate == ledger.derived_status(),
        // Nothing paid yet: only the pre-payment outcomes are reachable.
        Some(_) => candidate == ProposalStatus::Approved || candidate == ProposalStatus::Rejected,
        None => false,
    };

    (consistent && candidate != current).then_some(candidate)
}
