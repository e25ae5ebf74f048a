use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use fieldops::{
    domain::{
        entities::{
            jobs::{InsertJobEntity, format_job_number},
            proposals::{ApproveProposalEntity, ProposalEntity},
        },
        repositories::{jobs::JobRepository, proposals::ProposalRepository},
        value_objects::{
            actors::Actor,
            enums::{payment_stages::PaymentStage, proposal_statuses::ProposalStatus, roles::Role},
            payment_ledger::{LedgerError, PaymentLedger},
            proposals::{ApprovalDto, CheckoutSessionDto, ProposalStatusDto, StageViewDto},
            status_mapping::{job_status_for, unified_label_raw},
        },
    },
    payments::stripe_client::CheckoutRequest,
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::payment_gateway::PaymentGateway;

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("proposal not found")]
    NotFound,
    #[error("not allowed to {0} this proposal")]
    Forbidden(&'static str),
    #[error("cannot move proposal from {from} to {to}")]
    InvalidTransition { from: String, to: ProposalStatus },
    #[error("proposal is already approved")]
    AlreadyApproved,
    #[error("{0}")]
    InvariantViolation(String),
    #[error("invalid payment ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("payment gateway request failed")]
    Gateway(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProposalError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ProposalError::NotFound => StatusCode::NOT_FOUND,
            ProposalError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProposalError::InvalidTransition { .. }
            | ProposalError::AlreadyApproved
            | ProposalError::InvariantViolation(_)
            | ProposalError::Ledger(_) => StatusCode::CONFLICT,
            ProposalError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ProposalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, ProposalError>;

/// Customers only see their own proposals; staff and technicians see all.
pub(crate) fn can_access(actor: &Actor, proposal: &ProposalEntity) -> bool {
    actor.role != Role::Customer || proposal.is_owned_by(actor.user_id)
}

pub struct ProposalUseCase<P, J, G>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    proposal_repo: Arc<P>,
    job_repo: Arc<J>,
    payment_gateway: Arc<G>,
    currency: String,
}

impl<P, J, G> ProposalUseCase<P, J, G>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(proposal_repo: Arc<P>, job_repo: Arc<J>, payment_gateway: Arc<G>, currency: String) -> Self {
        Self {
            proposal_repo,
            job_repo,
            payment_gateway,
            currency,
        }
    }

    async fn load(&self, actor: &Actor, proposal_id: Uuid, action: &'static str) -> UseCaseResult<ProposalEntity> {
        let proposal = self
            .proposal_repo
            .find_by_id(proposal_id)
            .await
            .map_err(|err| {
                error!(%proposal_id, db_error = ?err, "proposals: failed to load proposal");
                ProposalError::Internal(err)
            })?
            .ok_or_else(|| {
                warn!(%proposal_id, "proposals: proposal not found");
                ProposalError::NotFound
            })?;

        if !can_access(actor, &proposal) {
            warn!(
                %proposal_id,
                user_id = %actor.user_id,
                action,
                "proposals: customer does not own proposal"
            );
            return Err(ProposalError::Forbidden(action));
        }

        Ok(proposal)
    }

    async fn transition(
        &self,
        actor: &Actor,
        proposal_id: Uuid,
        allowed_from: &[ProposalStatus],
        to: ProposalStatus,
    ) -> UseCaseResult<ProposalStatus> {
        let proposal = self.load(actor, proposal_id, "update").await?;

        let from = match proposal.status() {
            Some(status) if allowed_from.contains(&status) => status,
            _ => {
                warn!(
                    %proposal_id,
                    from = %proposal.status,
                    to = %to,
                    "proposals: transition not allowed"
                );
                return Err(ProposalError::InvalidTransition {
                    from: proposal.status,
                    to,
                });
            }
        };

        let changed = self
            .proposal_repo
            .transition_status(proposal_id, from, to)
            .await
            .map_err(|err| {
                error!(%proposal_id, db_error = ?err, "proposals: failed to update status");
                ProposalError::Internal(err)
            })?;
        if !changed {
            // Someone else moved it between our read and write.
            warn!(%proposal_id, from = %from, to = %to, "proposals: status changed concurrently");
            return Err(ProposalError::InvalidTransition {
                from: from.to_string(),
                to,
            });
        }

        info!(%proposal_id, from = %from, to = %to, user_id = %actor.user_id, "proposals: status updated");
        Ok(to)
    }

    pub async fn send_proposal(&self, actor: &Actor, proposal_id: Uuid) -> UseCaseResult<ProposalStatus> {
        if !actor.role.can_send_or_reject_proposals() {
            return Err(ProposalError::Forbidden("send"));
        }
        self.transition(actor, proposal_id, &[ProposalStatus::Draft], ProposalStatus::Sent)
            .await
    }

    pub async fn reject_proposal(&self, actor: &Actor, proposal_id: Uuid) -> UseCaseResult<ProposalStatus> {
        if !actor.role.can_send_or_reject_proposals() {
            return Err(ProposalError::Forbidden("reject"));
        }
        self.transition(
            actor,
            proposal_id,
            &[ProposalStatus::Draft, ProposalStatus::Sent],
            ProposalStatus::Rejected,
        )
        .await
    }

    /// Fixes the stage amounts and opens the linked job. The amounts are never
    /// recomputed afterwards.
    pub async fn approve_proposal(&self, actor: &Actor, proposal_id: Uuid) -> UseCaseResult<ApprovalDto> {
        if !actor.role.can_approve_proposals() {
            return Err(ProposalError::Forbidden("approve"));
        }
        let proposal = self.load(actor, proposal_id, "approve").await?;

        let status = proposal.status();
        if proposal.deposit_amount_minor.is_some() || status.is_some_and(|s| s.is_post_approval()) {
            warn!(%proposal_id, status = %proposal.status, "proposals: already approved");
            return Err(ProposalError::AlreadyApproved);
        }
        if !status.is_some_and(|s| s.is_pre_approval()) {
            return Err(ProposalError::InvalidTransition {
                from: proposal.status,
                to: ProposalStatus::Approved,
            });
        }

        let ledger = PaymentLedger::materialize(proposal.total_minor)?;

        let now = Utc::now();
        let today = now.date_naive();
        let created_today = self.job_repo.count_created_on(today).await.map_err(|err| {
            error!(%proposal_id, db_error = ?err, "proposals: failed to count today's jobs");
            ProposalError::Internal(err)
        })?;
        let job_number = format_job_number(today, created_today + 1);

        let job = InsertJobEntity {
            job_number: job_number.clone(),
            proposal_id: Some(proposal_id),
            title: proposal.title.clone(),
            status: job_status_for(ProposalStatus::Approved).to_string(),
            created_at: now,
            updated_at: now,
        };

        let job_id = self
            .proposal_repo
            .approve_with_job(proposal_id, ApproveProposalEntity::from_ledger(&ledger, now), job)
            .await
            .map_err(|err| {
                error!(%proposal_id, %job_number, db_error = ?err, "proposals: approval write failed");
                ProposalError::Internal(err)
            })?
            .ok_or_else(|| {
                warn!(%proposal_id, "proposals: approval guard did not match");
                ProposalError::AlreadyApproved
            })?;

        info!(
            %proposal_id,
            %job_id,
            %job_number,
            total_minor = proposal.total_minor,
            user_id = %actor.user_id,
            "proposals: approved and job created"
        );

        Ok(ApprovalDto {
            proposal_id,
            status: ProposalStatus::Approved,
            job_id,
            job_number,
            stages: ledger.plan(today),
        })
    }

    pub async fn status_overview(&self, actor: &Actor, proposal_id: Uuid) -> UseCaseResult<ProposalStatusDto> {
        let proposal = self.load(actor, proposal_id, "view").await?;

        let job = self
            .job_repo
            .find_by_proposal_id(proposal_id)
            .await
            .map_err(|err| {
                error!(%proposal_id, db_error = ?err, "proposals: failed to load linked job");
                ProposalError::Internal(err)
            })?;
        let ledger = proposal.ledger()?;

        let job_status = job.as_ref().map(|job| job.status());
        let label = unified_label_raw(
            job_status.unwrap_or_default().as_str(),
            &proposal.status,
        );

        Ok(ProposalStatusDto {
            proposal_id,
            status: ProposalStatus::normalize_or_default(&proposal.status),
            job_id: job.as_ref().map(|job| job.id),
            job_status,
            label,
            total_minor: proposal.total_minor,
            total_paid_minor: ledger
                .as_ref()
                .map_or(proposal.total_paid_minor, |l| l.total_paid_minor()),
            paid_percentage: ledger.as_ref().map_or(0.0, |l| l.paid_percentage()),
            current_payment_stage: ledger.as_ref().and_then(|l| l.active_stage()),
            stages: ledger.as_ref().map(StageViewDto::from_ledger).unwrap_or_default(),
        })
    }

    /// Starts payment of the active stage. `requested` is only a check on what
    /// the caller believes is due.
    pub async fn create_checkout_session(
        &self,
        actor: &Actor,
        proposal_id: Uuid,
        requested: Option<PaymentStage>,
    ) -> UseCaseResult<CheckoutSessionDto> {
        if !actor.role.can_initiate_payment() {
            return Err(ProposalError::Forbidden("pay"));
        }
        let proposal = self.load(actor, proposal_id, "pay").await?;

        // Rejected and completed proposals keep their ledger columns but take no payments.
        if !proposal
            .status()
            .is_some_and(|status| status.is_post_approval() && !status.is_terminal())
        {
            warn!(%proposal_id, status = %proposal.status, "proposals: checkout on closed proposal");
            return Err(ProposalError::InvariantViolation(format!(
                "proposal is {}; payments are not accepted",
                proposal.status
            )));
        }

        let ledger = proposal.ledger()?.ok_or_else(|| {
            ProposalError::InvariantViolation("proposal has not been approved".to_string())
        })?;
        let stage = ledger.active_stage().ok_or_else(|| {
            ProposalError::InvariantViolation("all payment stages are already paid".to_string())
        })?;
        if let Some(requested) = requested.filter(|requested| *requested != stage) {
            warn!(%proposal_id, requested = %requested, active = %stage, "proposals: stage not payable");
            return Err(ProposalError::InvariantViolation(format!(
                "{requested} stage is not payable; {stage} is due"
            )));
        }

        let amount_minor = ledger.amounts().amount(stage);
        if amount_minor <= 0 {
            return Err(ProposalError::InvariantViolation(format!(
                "{stage} stage has nothing to pay"
            )));
        }

        let metadata = HashMap::from([
            ("proposal_id".to_string(), proposal_id.to_string()),
            ("payment_stage".to_string(), stage.to_string()),
        ]);
        let request = CheckoutRequest {
            amount_minor,
            currency: self.currency.clone(),
            product_name: format!("{} ({} {}%)", proposal.title, stage.label(), stage.percentage()),
            metadata,
            idempotency_key: Some(checkout_idempotency_key(proposal_id, stage, Uuid::new_v4())),
        };

        let session = self
            .payment_gateway
            .create_checkout_session(request)
            .await
            .map_err(|err| {
                error!(%proposal_id, stage = %stage, gateway_error = ?err, "proposals: checkout session failed");
                ProposalError::Gateway(err)
            })?;

        info!(
            %proposal_id,
            stage = %stage,
            amount_minor,
            session_id = %session.session_id,
            "proposals: checkout session created"
        );

        Ok(CheckoutSessionDto {
            proposal_id,
            stage,
            amount_minor,
            currency: self.currency.clone(),
            session_id: session.session_id,
            url: session.url,
        })
    }
}

/// One key per checkout attempt: Stripe replays a reused key for 24h, which
/// would hand an abandoned session back or reject changed parameters.
fn checkout_idempotency_key(proposal_id: Uuid, stage: PaymentStage, attempt: Uuid) -> String {
    format!("checkout-{proposal_id}-{stage}-{attempt}")
}
