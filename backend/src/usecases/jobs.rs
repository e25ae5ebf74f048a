use std::sync::Arc;

use fieldops::domain::{
    repositories::{jobs::JobRepository, proposals::ProposalRepository},
    value_objects::{
        actors::Actor,
        enums::{job_statuses::JobStatus, proposal_statuses::ProposalStatus},
        status_mapping::{proposal_status_after_job_change, unified_label},
    },
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobStatusError {
    #[error("job not found")]
    NotFound,
    #[error("not allowed to update jobs")]
    Forbidden,
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
    /// The job row was written but the linked proposal was not.
    #[error("job {job_id} updated but proposal {proposal_id} was not")]
    PartialWriteFailure {
        job_id: Uuid,
        proposal_id: Uuid,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JobStatusError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            JobStatusError::NotFound => StatusCode::NOT_FOUND,
            JobStatusError::Forbidden => StatusCode::FORBIDDEN,
            JobStatusError::InvalidTransition { .. } => StatusCode::CONFLICT,
            JobStatusError::PartialWriteFailure { .. } | JobStatusError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobStatusChangeDto {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub proposal_id: Option<Uuid>,
    pub proposal_status: Option<ProposalStatus>,
    pub label: String,
}

pub type UseCaseResult<T> = std::result::Result<T, JobStatusError>;

pub struct JobStatusUseCase<J, P>
where
    J: JobRepository + 'static,
    P: ProposalRepository + 'static,
{
    job_repo: Arc<J>,
    proposal_repo: Arc<P>,
}

impl<J, P> JobStatusUseCase<J, P>
where
    J: JobRepository + 'static,
    P: ProposalRepository + 'static,
{
    pub fn new(job_repo: Arc<J>, proposal_repo: Arc<P>) -> Self {
        Self {
            job_repo,
            proposal_repo,
        }
    }

    pub async fn update_job_status(
        &self,
        actor: &Actor,
        job_id: Uuid,
        status: JobStatus,
    ) -> UseCaseResult<JobStatusChangeDto> {
        if !actor.role.can_update_jobs() {
            warn!(%job_id, user_id = %actor.user_id, role = %actor.role, "jobs: update not allowed");
            return Err(JobStatusError::Forbidden);
        }

        let job = self
            .job_repo
            .find_by_id(job_id)
            .await
            .map_err(|err| {
                error!(%job_id, db_error = ?err, "jobs: failed to load job");
                JobStatusError::Internal(err)
            })?
            .ok_or(JobStatusError::NotFound)?;

        let current = job.status();
        if current.is_terminal() && current != status {
            warn!(%job_id, from = %current, to = %status, "jobs: job is already closed");
            return Err(JobStatusError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        if current != status {
            self.job_repo
                .update_status(job_id, status)
                .await
                .map_err(|err| {
                    error!(%job_id, db_error = ?err, "jobs: failed to update status");
                    JobStatusError::Internal(err)
                })?;
            info!(%job_id, from = %current, to = %status, user_id = %actor.user_id, "jobs: status updated");
        }

        let Some(proposal_id) = job.proposal_id else {
            return Ok(JobStatusChangeDto {
                job_id,
                status,
                proposal_id: None,
                proposal_status: None,
                label: status.label().to_string(),
            });
        };

        let proposal_status = self.sync_proposal(job_id, proposal_id, status).await?;

        Ok(JobStatusChangeDto {
            job_id,
            status,
            proposal_id: Some(proposal_id),
            proposal_status,
            label: match proposal_status {
                Some(proposal_status) => unified_label(status, proposal_status),
                None => status.label().to_string(),
            },
        })
    }

    /// Second write of the pair. Any failure here leaves the job ahead of the
    /// proposal and is reported for manual reconciliation.
    async fn sync_proposal(
        &self,
        job_id: Uuid,
        proposal_id: Uuid,
        job_status: JobStatus,
    ) -> UseCaseResult<Option<ProposalStatus>> {
        let partial = |source: anyhow::Error| {
            error!(
                %job_id,
                %proposal_id,
                job_status = %job_status,
                db_error = ?source,
                "jobs: job updated but proposal sync failed, manual reconciliation needed"
            );
            JobStatusError::PartialWriteFailure {
                job_id,
                proposal_id,
                source,
            }
        };

        let Some(proposal) = self.proposal_repo.find_by_id(proposal_id).await.map_err(partial)? else {
            warn!(%job_id, %proposal_id, "jobs: linked proposal is missing");
            return Ok(None);
        };

        let Some(current) = proposal.status() else {
            warn!(%proposal_id, status = %proposal.status, "jobs: linked proposal has unknown status");
            return Ok(None);
        };

        let ledger = match proposal.ledger() {
            Ok(ledger) => ledger,
            Err(err) => {
                warn!(%proposal_id, ledger_error = %err, "jobs: linked proposal ledger is inconsistent");
                None
            }
        };

        let Some(next) = proposal_status_after_job_change(current, job_status, ledger.as_ref()) else {
            return Ok(Some(current));
        };

        let changed = self
            .proposal_repo
            .transition_status(proposal_id, current, next)
            .await
            .map_err(partial)?;
        if !changed {
            warn!(%proposal_id, from = %current, to = %next, "jobs: proposal changed concurrently, left as is");
            return Ok(None);
        }

        info!(%job_id, %proposal_id, from = %current, to = %next, "jobs: proposal status synced");
        Ok(Some(next))
    }
}
