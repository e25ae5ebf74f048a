use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::payment_events;

/// Append-only record of one settled stage payment.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = payment_events)]
pub struct PaymentEventEntity {
    pub id: Uuid,
    pub proposal_id: Uuid,
    pub stage: String,
    pub amount_minor: i64,
    pub external_transaction_id: String,
    pub checkout_session_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = payment_events)]
pub struct InsertPaymentEventEntity {
    pub proposal_id: Uuid,
    pub stage: String,
    pub amount_minor: i64,
    pub external_transaction_id: String,
    pub checkout_session_id: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
