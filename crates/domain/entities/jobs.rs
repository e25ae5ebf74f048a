use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::enums::job_statuses::JobStatus,
    infra::db::postgres::schema::jobs,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = jobs)]
pub struct JobEntity {
    pub id: Uuid,
    pub job_number: String,
    pub proposal_id: Option<Uuid>,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobEntity {
    pub fn status(&self) -> JobStatus {
        JobStatus::normalize_or_default(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = jobs)]
pub struct InsertJobEntity {
    pub job_number: String,
    pub proposal_id: Option<Uuid>,
    pub title: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `JOB-YYYYMMDD-NNN`, where `NNN` is the 1-based position of the job among
/// those created that day.
pub fn format_job_number(created_on: NaiveDate, sequence: i64) -> String {
    format!("JOB-{}-{:03}", created_on.format("%Y%m%d"), sequence)
}
