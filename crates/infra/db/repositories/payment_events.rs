use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{Connection, RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{jobs, payment_events, proposals},
    },
};
use domain::{
    entities::{
        payment_events::PaymentEventEntity,
        proposals::{ProposalEntity, StagePaymentChangeset},
    },
    repositories::payment_events::PaymentEventRepository,
    value_objects::{
        enums::{
            job_statuses::JobStatus, payment_stages::PaymentStage, proposal_statuses::ProposalStatus,
        },
        stage_payments::{StagePaymentOutcome, StagePaymentUpdate},
    },
};

pub struct PaymentEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentEventRepository for PaymentEventPostgres {
    async fn find_by_transaction_id(
        &self,
        external_transaction_id: &str,
    ) -> Result<Option<PaymentEventEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let event = payment_events::table
            .filter(payment_events::external_transaction_id.eq(external_transaction_id))
            .select(PaymentEventEntity::as_select())
            .first::<PaymentEventEntity>(&mut conn)
            .optional()?;

        Ok(event)
    }

    async fn apply_stage_payment(&self, update: StagePaymentUpdate) -> Result<StagePaymentOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let outcome = conn.transaction::<StagePaymentOutcome, diesel::result::Error, _>(|tx| {
            // Row lock: concurrent deliveries and rejections for one proposal queue up here.
            let locked = proposals::table
                .find(update.proposal_id)
                .select(ProposalEntity::as_select())
                .for_update()
                .first::<ProposalEntity>(tx)?;

            if let Some(refused) = refuse_stage_payment(&locked, update.stage) {
                return Ok(refused);
            }

            // Unique on external_transaction_id and on (proposal_id, stage).
            let event_id = insert_into(payment_events::table)
                .values(&update.event)
                .on_conflict_do_nothing()
                .returning(payment_events::id)
                .get_result::<Uuid>(tx)
                .optional()?;
            let Some(event_id) = event_id else {
                return Ok(StagePaymentOutcome::Duplicate);
            };

            let now = Utc::now();
            let changeset = StagePaymentChangeset::from_update(&update, now);
            let target = proposals::table
                .find(update.proposal_id)
                .filter(proposals::status.ne(ProposalStatus::Rejected.as_str()));
            let updated = match update.stage {
                PaymentStage::Deposit => diesel::update(target.filter(proposals::deposit_paid_at.is_null()))
                    .set(&changeset)
                    .execute(tx)?,
                PaymentStage::Progress => diesel::update(target.filter(proposals::progress_paid_at.is_null()))
                    .set(&changeset)
                    .execute(tx)?,
                PaymentStage::Final => diesel::update(target.filter(proposals::final_paid_at.is_null()))
                    .set(&changeset)
                    .execute(tx)?,
            };
            compare_and_set_held(updated)?;

            if let Some(job_update) = update.job_update {
                diesel::update(jobs::table.find(job_update.job_id))
                    .filter(jobs::status.ne_all([
                        JobStatus::Completed.as_str(),
                        JobStatus::Cancelled.as_str(),
                    ]))
                    .set((
                        jobs::status.eq(job_update.status.as_str()),
                        jobs::updated_at.eq(now),
                    ))
                    .execute(tx)?;
            }

            Ok(StagePaymentOutcome::Applied { event_id })
        });

        settle(outcome)
    }
}

/// Outcome to return without writing, judged on the locked proposal row.
fn refuse_stage_payment(locked: &ProposalEntity, stage: PaymentStage) -> Option<StagePaymentOutcome> {
    let already_paid = match stage {
        PaymentStage::Deposit => locked.deposit_paid_at.is_some(),
        PaymentStage::Progress => locked.progress_paid_at.is_some(),
        PaymentStage::Final => locked.final_paid_at.is_some(),
    };
    if already_paid {
        return Some(StagePaymentOutcome::Duplicate);
    }

    (locked.status() == Some(ProposalStatus::Rejected)).then_some(StagePaymentOutcome::ProposalRejected)
}

/// A compare-and-set that matched no row rolls back the event insert too.
fn compare_and_set_held(updated: usize) -> Result<(), diesel::result::Error> {
    if updated == 0 {
        return Err(diesel::result::Error::RollbackTransaction);
    }
    Ok(())
}

fn settle(outcome: Result<StagePaymentOutcome, diesel::result::Error>) -> Result<StagePaymentOutcome> {
    match outcome {
        Ok(outcome) => Ok(outcome),
        Err(diesel::result::Error::RollbackTransaction) => Ok(StagePaymentOutcome::Duplicate),
        Err(err) => Err(err.into()),
    }
}
