use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::jobs::JobEntity, value_objects::enums::job_statuses::JobStatus,
};

#[automock]
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<JobEntity>>;

    async fn find_by_proposal_id(&self, proposal_id: Uuid) -> Result<Option<JobEntity>>;

    async fn count_created_on(&self, day: NaiveDate) -> Result<i64>;

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> Result<()>;
}
