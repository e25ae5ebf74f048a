use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{Connection, RunQueryDsl, insert_into, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{jobs, proposals},
    },
};
use domain::{
    entities::{
        jobs::InsertJobEntity,
        proposals::{ApproveProposalEntity, ProposalEntity},
    },
    repositories::proposals::ProposalRepository,
    value_objects::enums::proposal_statuses::ProposalStatus,
};

pub struct ProposalPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProposalPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProposalRepository for ProposalPostgres {
    async fn find_by_id(&self, proposal_id: Uuid) -> Result<Option<ProposalEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let proposal = proposals::table
            .find(proposal_id)
            .select(ProposalEntity::as_select())
            .first::<ProposalEntity>(&mut conn)
            .optional()?;

        Ok(proposal)
    }

    async fn transition_status(
        &self,
        proposal_id: Uuid,
        from: ProposalStatus,
        to: ProposalStatus,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let affected = update(proposals::table)
            .filter(proposals::id.eq(proposal_id))
            .filter(proposals::status.eq(from.as_str()))
            .set((
                proposals::status.eq(to.as_str()),
                proposals::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(affected > 0)
    }

    async fn approve_with_job(
        &self,
        proposal_id: Uuid,
        approval: ApproveProposalEntity,
        job: InsertJobEntity,
    ) -> Result<Option<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let job_id = conn.transaction::<Option<Uuid>, diesel::result::Error, _>(|tx| {
            let approved = update(proposals::table)
                .filter(proposals::id.eq(proposal_id))
                .filter(
                    proposals::status
                        .eq_any([ProposalStatus::Draft.as_str(), ProposalStatus::Sent.as_str()]),
                )
                .filter(proposals::deposit_amount_minor.is_null())
                .set(&approval)
                .execute(tx)?;

            if approved == 0 {
                return Ok(None);
            }

            let job_id = insert_into(jobs::table)
                .values(&job)
                .returning(jobs::id)
                .get_result::<Uuid>(tx)?;

            Ok(Some(job_id))
        })?;

        Ok(job_id)
    }
}
