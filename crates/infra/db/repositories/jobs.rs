use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::jobs},
};
use domain::{
    entities::jobs::JobEntity, repositories::jobs::JobRepository,
    value_objects::enums::job_statuses::JobStatus,
};

pub struct JobPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl JobPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl JobRepository for JobPostgres {
    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<JobEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let job = jobs::table
            .find(job_id)
            .select(JobEntity::as_select())
            .first::<JobEntity>(&mut conn)
            .optional()?;

        Ok(job)
    }

    async fn find_by_proposal_id(&self, proposal_id: Uuid) -> Result<Option<JobEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let job = jobs::table
            .filter(jobs::proposal_id.eq(proposal_id))
            .select(JobEntity::as_select())
            .first::<JobEntity>(&mut conn)
            .optional()?;

        Ok(job)
    }

    async fn count_created_on(&self, day: NaiveDate) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let starts_at = day.and_time(NaiveTime::MIN).and_utc();
        let ends_at = starts_at + Duration::days(1);

        let count = jobs::table
            .filter(jobs::created_at.ge(starts_at))
            .filter(jobs::created_at.lt(ends_at))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(count)
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(status.as_str()),
                jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }
}
