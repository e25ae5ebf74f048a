use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{
        jobs::InsertJobEntity,
        proposals::{ApproveProposalEntity, ProposalEntity},
    },
    value_objects::enums::proposal_statuses::ProposalStatus,
};

#[automock]
#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn find_by_id(&self, proposal_id: Uuid) -> Result<Option<ProposalEntity>>;

    /// Moves the proposal to `to` only while it is still in `from`.
    /// Returns whether a row changed.
    async fn transition_status(
        &self,
        proposal_id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> Result<bool>;

    /// Materialises the ledger and creates the linked job atomically, provided
    /// the proposal is still pre-approval and has no ledger. `None` means the
    /// guard did not match and nothing was written.
    async fn approve_with_job(
        &self,
        proposal_id: Uuid,
        approval: ApproveProposalEntity,
        job: InsertJobEntity,
    ) -> Result<Option<Uuid>>;
}
