use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use fieldops::{
    domain::{
        entities::payment_events::InsertPaymentEventEntity,
        repositories::{
            jobs::JobRepository, payment_events::PaymentEventRepository,
            proposals::ProposalRepository,
        },
        value_objects::{
            enums::{payment_stages::PaymentStage, proposal_statuses::ProposalStatus},
            payment_ledger::LedgerError,
            stage_payments::{JobStatusUpdate, StagePaymentOutcome, StagePaymentUpdate},
            status_mapping::job_status_after_payment,
        },
    },
    payments::stripe_client::{StripeCheckoutSession, StripeClient, StripeEvent, WebhookSignatureError},
};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::payment_gateway::PaymentGateway;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid webhook signature")]
    InvalidSignature(#[source] WebhookSignatureError),
    #[error("malformed webhook event: {0}")]
    MalformedEvent(String),
    #[error("payment violates the stage ledger: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReconcileError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            ReconcileError::InvalidSignature(_) | ReconcileError::MalformedEvent(_) => {
                StatusCode::BAD_REQUEST
            }
            ReconcileError::InvariantViolation(_) => StatusCode::CONFLICT,
            ReconcileError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnhandledEventType(String),
    PaymentPending,
    MissingMetadata,
    ProposalNotFound(Uuid),
}

/// Every variant is acknowledged to the gateway with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied {
        proposal_id: Uuid,
        stage: PaymentStage,
        event_id: Uuid,
    },
    Duplicate {
        proposal_id: Uuid,
        stage: PaymentStage,
    },
    Ignored(IgnoreReason),
}

pub type UseCaseResult<T> = std::result::Result<T, ReconcileError>;

pub struct PaymentWebhookUseCase<P, J, E, G>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    E: PaymentEventRepository + 'static,
    G: PaymentGateway + 'static,
{
    proposal_repo: Arc<P>,
    job_repo: Arc<J>,
    payment_event_repo: Arc<E>,
    payment_gateway: Arc<G>,
}

impl<P, J, E, G> PaymentWebhookUseCase<P, J, E, G>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    E: PaymentEventRepository + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        proposal_repo: Arc<P>,
        job_repo: Arc<J>,
        payment_event_repo: Arc<E>,
        payment_gateway: Arc<G>,
    ) -> Self {
        Self {
            proposal_repo,
            job_repo,
            payment_event_repo,
            payment_gateway,
        }
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> UseCaseResult<WebhookOutcome> {
        let event = self
            .payment_gateway
            .verify_webhook_signature(payload, signature)
            .map_err(|err| match err {
                WebhookSignatureError::MalformedPayload(parse_err) => {
                    warn!(error = %parse_err, "payment_webhook: verified payload is not an event");
                    ReconcileError::MalformedEvent(parse_err.to_string())
                }
                other => {
                    warn!(reason = %other, "payment_webhook: signature rejected");
                    ReconcileError::InvalidSignature(other)
                }
            })?;

        let event_id = event.id.clone().unwrap_or_default();
        info!(%event_id, event_type = %event.type_, "payment_webhook: event received");

        match event.type_.as_str() {
            CHECKOUT_COMPLETED | ASYNC_PAYMENT_SUCCEEDED => {}
            other => {
                info!(%event_id, event_type = %other, "payment_webhook: event type ignored");
                return Ok(WebhookOutcome::Ignored(IgnoreReason::UnhandledEventType(
                    other.to_string(),
                )));
            }
        }

        let session = StripeClient::extract_checkout_session(&event).ok_or_else(|| {
            warn!(%event_id, "payment_webhook: event object is not a checkout session");
            ReconcileError::MalformedEvent("data.object is not a checkout session".to_string())
        })?;

        // A completed session for a delayed method arrives unpaid; the
        // async_payment_succeeded event follows once funds settle.
        if !matches!(session.payment_status.as_deref(), Some("paid") | Some("no_payment_required")) {
            info!(
                %event_id,
                payment_status = ?session.payment_status,
                "payment_webhook: session not paid yet"
            );
            return Ok(WebhookOutcome::Ignored(IgnoreReason::PaymentPending));
        }

        let (Some(proposal_id), Some(stage)) = (
            session
                .metadata_value("proposal_id")
                .and_then(|raw| Uuid::parse_str(raw).ok()),
            session
                .metadata_value("payment_stage")
                .and_then(PaymentStage::from_str),
        ) else {
            warn!(
                %event_id,
                session_id = ?session.id,
                metadata = ?session.metadata,
                "payment_webhook: checkout session lacks proposal metadata"
            );
            return Ok(WebhookOutcome::Ignored(IgnoreReason::MissingMetadata));
        };

        let external_transaction_id = transaction_id(&session, &event).ok_or_else(|| {
            ReconcileError::MalformedEvent("event carries no transaction reference".to_string())
        })?;

        self.reconcile(&event, &session, proposal_id, stage, external_transaction_id)
            .await
    }

    async fn reconcile(
        &self,
        event: &StripeEvent,
        session: &StripeCheckoutSession,
        proposal_id: Uuid,
        stage: PaymentStage,
        external_transaction_id: String,
    ) -> UseCaseResult<WebhookOutcome> {
        let duplicate = Ok(WebhookOutcome::Duplicate { proposal_id, stage });

        if self
            .payment_event_repo
            .find_by_transaction_id(&external_transaction_id)
            .await
            .map_err(|err| {
                error!(%proposal_id, db_error = ?err, "payment_webhook: idempotency lookup failed");
                ReconcileError::Internal(err)
            })?
            .is_some()
        {
            info!(%proposal_id, stage = %stage, %external_transaction_id, "payment_webhook: transaction already recorded");
            return duplicate;
        }

        let Some(proposal) = self.proposal_repo.find_by_id(proposal_id).await.map_err(|err| {
            error!(%proposal_id, db_error = ?err, "payment_webhook: failed to load proposal");
            ReconcileError::Internal(err)
        })?
        else {
            warn!(%proposal_id, stage = %stage, "payment_webhook: proposal not found, event dropped");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::ProposalNotFound(proposal_id)));
        };

        if proposal.status() == Some(ProposalStatus::Rejected) {
            error!(
                %proposal_id,
                stage = %stage,
                %external_transaction_id,
                "payment_webhook: payment collected for rejected proposal, refund or reconcile manually"
            );
            return Err(rejected_payment(stage));
        }

        let ledger = proposal
            .ledger()
            .map_err(|err| {
                error!(%proposal_id, ledger_error = %err, "payment_webhook: stored ledger is inconsistent");
                ReconcileError::InvariantViolation(err.to_string())
            })?
            .ok_or_else(|| {
                error!(%proposal_id, status = %proposal.status, "payment_webhook: payment for unapproved proposal");
                ReconcileError::InvariantViolation("proposal has not been approved".to_string())
            })?;

        let paid_at = event_time(event);
        let paid = match ledger.record_payment(stage, paid_at) {
            Ok(paid) => paid,
            Err(LedgerError::AlreadyPaid(_)) => {
                info!(%proposal_id, stage = %stage, "payment_webhook: stage already paid");
                return duplicate;
            }
            Err(err) => {
                error!(%proposal_id, stage = %stage, ledger_error = %err, "payment_webhook: out-of-order payment");
                return Err(ReconcileError::InvariantViolation(err.to_string()));
            }
        };

        let proposal_status = paid.derived_status();
        let total_paid_minor = paid.total_paid_through(stage);
        if proposal_status != stage.paid_status() || total_paid_minor != paid.total_paid_minor() {
            error!(
                %proposal_id,
                stage = %stage,
                status = %proposal_status,
                total_paid_minor,
                "payment_webhook: post-conditions do not hold"
            );
            return Err(ReconcileError::InvariantViolation(format!(
                "{stage} payment does not lead to a consistent ledger"
            )));
        }

        let stage_amount = paid.amounts().amount(stage);
        if let Some(charged) = session.amount_total.filter(|charged| *charged != stage_amount) {
            warn!(
                %proposal_id,
                stage = %stage,
                charged,
                expected = stage_amount,
                "payment_webhook: charged amount differs from stage amount"
            );
        }

        let job = self.job_repo.find_by_proposal_id(proposal_id).await.map_err(|err| {
            error!(%proposal_id, db_error = ?err, "payment_webhook: failed to load linked job");
            ReconcileError::Internal(err)
        })?;
        let job_update = job.and_then(|job| {
            job_status_after_payment(job.status(), proposal_status).map(|status| JobStatusUpdate {
                job_id: job.id,
                status,
            })
        });

        let update = StagePaymentUpdate {
            proposal_id,
            stage,
            paid_at,
            total_paid_minor,
            proposal_status,
            next_payment_stage: paid.active_stage(),
            job_update,
            event: InsertPaymentEventEntity {
                proposal_id,
                stage: stage.to_string(),
                amount_minor: session.amount_total.unwrap_or(stage_amount),
                external_transaction_id: external_transaction_id.clone(),
                checkout_session_id: session.id.clone(),
                paid_at,
                created_at: Utc::now(),
            },
        };

        let outcome = self
            .payment_event_repo
            .apply_stage_payment(update)
            .await
            .map_err(|err| {
                error!(
                    %proposal_id,
                    stage = %stage,
                    %external_transaction_id,
                    db_error = ?err,
                    "payment_webhook: failed to apply stage payment"
                );
                ReconcileError::Internal(err)
            })?;

        match outcome {
            StagePaymentOutcome::Applied { event_id } => {
                info!(
                    %proposal_id,
                    stage = %stage,
                    %event_id,
                    status = %proposal_status,
                    total_paid_minor,
                    job_status = ?job_update.map(|update| update.status),
                    "payment_webhook: stage payment applied"
                );
                Ok(WebhookOutcome::Applied {
                    proposal_id,
                    stage,
                    event_id,
                })
            }
            StagePaymentOutcome::Duplicate => {
                info!(%proposal_id, stage = %stage, "payment_webhook: concurrent delivery already applied");
                duplicate
            }
            StagePaymentOutcome::ProposalRejected => {
                error!(
                    %proposal_id,
                    stage = %stage,
                    %external_transaction_id,
                    "payment_webhook: proposal rejected while payment landed, refund or reconcile manually"
                );
                Err(rejected_payment(stage))
            }
        }
    }
}

fn rejected_payment(stage: PaymentStage) -> ReconcileError {
    ReconcileError::InvariantViolation(format!("{stage} payment received for a rejected proposal"))
}

/// Payment intent, else checkout session, else the event itself.
fn transaction_id(session: &StripeCheckoutSession, event: &StripeEvent) -> Option<String> {
    [&session.payment_intent, &session.id, &event.id]
        .into_iter()
        .flatten()
        .find(|id| !id.trim().is_empty())
        .cloned()
}

fn event_time(event: &StripeEvent) -> DateTime<Utc> {
    event
        .created
        .and_then(|created| Utc.timestamp_opt(created, 0).single())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::fixtures::{approved_proposal, job_for};
    use fieldops::{
        domain::{
            entities::{jobs::JobEntity, payment_events::PaymentEventEntity, proposals::ProposalEntity},
            repositories::{
                jobs::MockJobRepository, payment_events::MockPaymentEventRepository,
                proposals::MockProposalRepository,
            },
            value_objects::enums::job_statuses::JobStatus,
        },
        payments::stripe_client::compute_signature,
    };
    use serde_json::json;
    use std::sync::Mutex;

    const SECRET: &str = "whsec_reconcile_test";

    type UseCase = PaymentWebhookUseCase<
        MockProposalRepository,
        MockJobRepository,
        MockPaymentEventRepository,
        StripeClient,
    >;

    /// Rows the mocked repositories read and write.
    #[derive(Default)]
    struct Store {
        proposal: Option<ProposalEntity>,
        job: Option<JobEntity>,
        events: Vec<InsertPaymentEventEntity>,
    }

    fn stripe() -> StripeClient {
        StripeClient::new(
            "sk_test_reconcile".to_string(),
            SECRET.to_string(),
            "https://app.example.com/paid".to_string(),
            "https://app.example.com/cancel".to_string(),
            300,
        )
    }

    fn checkout_event(proposal_id: Uuid, stage: &str, payment_intent: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "id": format!("evt_{payment_intent}"),
            "type": "checkout.session.completed",
            "created": Utc::now().timestamp(),
            "data": { "object": {
                "id": format!("cs_{payment_intent}"),
                "mode": "payment",
                "payment_status": "paid",
                "payment_intent": payment_intent,
                "currency": "usd",
                "metadata": {
                    "proposal_id": proposal_id.to_string(),
                    "payment_stage": stage
                }
            }}
        }))
        .unwrap()
    }

    fn sign(payload: &[u8]) -> String {
        let timestamp = Utc::now().timestamp();
        format!("t={timestamp},v1={}", compute_signature(SECRET, timestamp, payload))
    }

    /// Applies updates the way the Postgres repository does: one event per
    /// transaction id and per stage, and only onto an unpaid stage.
    fn apply(store: &mut Store, update: StagePaymentUpdate) -> StagePaymentOutcome {
        let duplicate = store.events.iter().any(|event| {
            event.external_transaction_id == update.event.external_transaction_id
                || (event.proposal_id == update.proposal_id && event.stage == update.event.stage)
        });
        let Some(proposal) = store.proposal.as_mut() else {
            return StagePaymentOutcome::Duplicate;
        };
        let paid_at = match update.stage {
            PaymentStage::Deposit => &mut proposal.deposit_paid_at,
            PaymentStage::Progress => &mut proposal.progress_paid_at,
            PaymentStage::Final => &mut proposal.final_paid_at,
        };
        if duplicate || paid_at.is_some() {
            return StagePaymentOutcome::Duplicate;
        }
        if proposal.status == "rejected" {
            return StagePaymentOutcome::ProposalRejected;
        }

        *paid_at = Some(update.paid_at);
        proposal.status = update.proposal_status.to_string();
        proposal.total_paid_minor = update.total_paid_minor;
        proposal.current_payment_stage = update.next_payment_stage.map(|s| s.to_string());
        if let (Some(job_update), Some(job)) = (update.job_update, store.job.as_mut()) {
            if job.id == job_update.job_id && !job.status().is_terminal() {
                job.status = job_update.status.to_string();
            }
        }
        store.events.push(update.event);
        StagePaymentOutcome::Applied {
            event_id: Uuid::new_v4(),
        }
    }

    fn wired(store: Arc<Mutex<Store>>) -> UseCase {
        let mut proposal_repo = MockProposalRepository::new();
        let proposals = Arc::clone(&store);
        proposal_repo
            .expect_find_by_id()
            .returning(move |_| Ok(proposals.lock().unwrap().proposal.clone()));

        let mut job_repo = MockJobRepository::new();
        let jobs = Arc::clone(&store);
        job_repo
            .expect_find_by_proposal_id()
            .returning(move |_| Ok(jobs.lock().unwrap().job.clone()));

        let mut event_repo = MockPaymentEventRepository::new();
        let events = Arc::clone(&store);
        event_repo
            .expect_find_by_transaction_id()
            .returning(move |transaction_id| {
                Ok(events
                    .lock()
                    .unwrap()
                    .events
                    .iter()
                    .find(|event| event.external_transaction_id == transaction_id)
                    .map(|event| PaymentEventEntity {
                        id: Uuid::new_v4(),
                        proposal_id: event.proposal_id,
                        stage: event.stage.clone(),
                        amount_minor: event.amount_minor,
                        external_transaction_id: event.external_transaction_id.clone(),
                        checkout_session_id: event.checkout_session_id.clone(),
                        paid_at: event.paid_at,
                        created_at: event.created_at,
                    }))
            });
        let writes = Arc::clone(&store);
        event_repo
            .expect_apply_stage_payment()
            .returning(move |update| Ok(apply(&mut writes.lock().unwrap(), update)));

        PaymentWebhookUseCase::new(
            Arc::new(proposal_repo),
            Arc::new(job_repo),
            Arc::new(event_repo),
            Arc::new(stripe()),
        )
    }

    fn approved_store(total_minor: i64) -> (Arc<Mutex<Store>>, Uuid) {
        let proposal = approved_proposal(Uuid::new_v4(), total_minor);
        let proposal_id = proposal.id;
        let store = Store {
            job: Some(job_for(proposal_id, JobStatus::NotScheduled)),
            proposal: Some(proposal),
            events: Vec::new(),
        };
        (Arc::new(Mutex::new(store)), proposal_id)
    }

    async fn deliver(usecase: &UseCase, payload: &[u8]) -> UseCaseResult<WebhookOutcome> {
        usecase.handle_stripe_webhook(payload, &sign(payload)).await
    }

    fn snapshot(store: &Arc<Mutex<Store>>) -> (ProposalEntity, JobEntity) {
        let store = store.lock().unwrap();
        (
            store.proposal.clone().unwrap(),
            store.job.clone().unwrap(),
        )
    }

    #[tokio::test]
    async fn forged_signature_reads_nothing() {
        let mut proposal_repo = MockProposalRepository::new();
        proposal_repo.expect_find_by_id().never();
        let mut event_repo = MockPaymentEventRepository::new();
        event_repo.expect_find_by_transaction_id().never();
        event_repo.expect_apply_stage_payment().never();
        let usecase = PaymentWebhookUseCase::new(
            Arc::new(proposal_repo),
            Arc::new(MockJobRepository::new()),
            Arc::new(event_repo),
            Arc::new(stripe()),
        );

        let payload = checkout_event(Uuid::new_v4(), "deposit", "pi_forged");
        let timestamp = Utc::now().timestamp();
        let forged = format!(
            "t={timestamp},v1={}",
            compute_signature("whsec_attacker", timestamp, &payload)
        );

        let err = usecase
            .handle_stripe_webhook(&payload, &forged)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvalidSignature(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unrelated_event_types_are_acknowledged() {
        let (store, _) = approved_store(1_000);
        let usecase = wired(store);
        let payload = serde_json::to_vec(&json!({
            "id": "evt_invoice",
            "type": "invoice.paid",
            "data": { "object": {} }
        }))
        .unwrap();

        let outcome = deliver(&usecase, &payload).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::UnhandledEventType("invoice.paid".to_string()))
        );
    }

    #[tokio::test]
    async fn missing_metadata_is_ignored() {
        let (store, _) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));
        let payload = serde_json::to_vec(&json!({
            "id": "evt_no_meta",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_no_meta",
                "payment_status": "paid",
                "payment_intent": "pi_no_meta",
                "metadata": { "payment_stage": "deposit" }
            }}
        }))
        .unwrap();

        let outcome = deliver(&usecase, &payload).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored(IgnoreReason::MissingMetadata));
        assert!(store.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn unknown_proposal_is_ignored() {
        let store = Arc::new(Mutex::new(Store::default()));
        let usecase = wired(store);
        let missing = Uuid::new_v4();

        let outcome = deliver(&usecase, &checkout_event(missing, "deposit", "pi_missing"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored(IgnoreReason::ProposalNotFound(missing))
        );
    }

    #[tokio::test]
    async fn unpaid_session_waits_for_async_payment() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));
        let mut event: serde_json::Value =
            serde_json::from_slice(&checkout_event(proposal_id, "deposit", "pi_async")).unwrap();
        event["data"]["object"]["payment_status"] = json!("unpaid");
        let payload = serde_json::to_vec(&event).unwrap();

        let outcome = deliver(&usecase, &payload).await.unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored(IgnoreReason::PaymentPending));
        assert!(store.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn deposit_payment_advances_proposal_and_schedules_job() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));

        let outcome = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_deposit"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Applied { stage: PaymentStage::Deposit, .. }
        ));

        let (proposal, job) = snapshot(&store);
        assert!(proposal.deposit_paid_at.is_some());
        assert_eq!(proposal.total_paid_minor, 500);
        assert_eq!(proposal.status(), Some(ProposalStatus::DepositPaid));
        assert_eq!(proposal.current_payment_stage(), Some(PaymentStage::Progress));
        assert_eq!(proposal.ledger().unwrap().unwrap().paid_percentage(), 50.0);
        assert_eq!(job.status(), JobStatus::Scheduled);

        let guard = store.lock().unwrap();
        let events = &guard.events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].external_transaction_id, "pi_deposit");
        assert_eq!(events[0].amount_minor, 500);
    }

    #[tokio::test]
    async fn duplicate_delivery_does_not_double_count() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));
        let payload = checkout_event(proposal_id, "deposit", "pi_deposit");

        deliver(&usecase, &payload).await.unwrap();
        let replay = deliver(&usecase, &payload).await.unwrap();

        assert_eq!(
            replay,
            WebhookOutcome::Duplicate {
                proposal_id,
                stage: PaymentStage::Deposit
            }
        );
        let (proposal, job) = snapshot(&store);
        assert_eq!(proposal.total_paid_minor, 500);
        assert_eq!(proposal.status(), Some(ProposalStatus::DepositPaid));
        assert_eq!(job.status(), JobStatus::Scheduled);
        assert_eq!(store.lock().unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn new_transaction_for_paid_stage_is_a_duplicate() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));

        deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_first"))
            .await
            .unwrap();
        let second = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_second"))
            .await
            .unwrap();

        assert!(matches!(second, WebhookOutcome::Duplicate { .. }));
        assert_eq!(snapshot(&store).0.total_paid_minor, 500);
    }

    #[tokio::test]
    async fn all_three_stages_complete_proposal_and_job() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));

        for (stage, intent) in [("deposit", "pi_1"), ("roughin", "pi_2"), ("final", "pi_3")] {
            let outcome = deliver(&usecase, &checkout_event(proposal_id, stage, intent))
                .await
                .unwrap();
            assert!(matches!(outcome, WebhookOutcome::Applied { .. }), "{stage}");
        }

        let (proposal, job) = snapshot(&store);
        let ledger = proposal.ledger().unwrap().unwrap();
        assert_eq!(proposal.status(), Some(ProposalStatus::Completed));
        assert_eq!(proposal.total_paid_minor, 1_000);
        assert_eq!(proposal.current_payment_stage, None);
        assert_eq!(ledger.paid_percentage(), 100.0);
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn out_of_order_stage_is_rejected() {
        let (store, proposal_id) = approved_store(1_000);
        let usecase = wired(Arc::clone(&store));

        let err = deliver(&usecase, &checkout_event(proposal_id, "final", "pi_final"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvariantViolation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        let (proposal, job) = snapshot(&store);
        assert_eq!(proposal.total_paid_minor, 0);
        assert_eq!(job.status(), JobStatus::NotScheduled);
    }

    #[tokio::test]
    async fn payment_for_unapproved_proposal_is_rejected() {
        let (store, proposal_id) = approved_store(1_000);
        {
            let mut store = store.lock().unwrap();
            let proposal = store.proposal.as_mut().unwrap();
            proposal.status = "sent".to_string();
            proposal.deposit_amount_minor = None;
            proposal.progress_amount_minor = None;
            proposal.final_amount_minor = None;
        }
        let usecase = wired(Arc::clone(&store));

        let err = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_early"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn payment_never_reopens_a_cancelled_job() {
        let (store, proposal_id) = approved_store(1_000);
        store.lock().unwrap().job.as_mut().unwrap().status = "cancelled".to_string();
        let usecase = wired(Arc::clone(&store));

        deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_deposit"))
            .await
            .unwrap();

        let (proposal, job) = snapshot(&store);
        assert_eq!(proposal.total_paid_minor, 500);
        assert_eq!(job.status(), JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn payment_for_rejected_proposal_does_not_reopen_it() {
        let (store, proposal_id) = approved_store(1_000);
        {
            let mut store = store.lock().unwrap();
            store.proposal.as_mut().unwrap().status = "rejected".to_string();
            store.job.as_mut().unwrap().status = "cancelled".to_string();
        }
        let usecase = wired(Arc::clone(&store));

        let err = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_after_reject"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::InvariantViolation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        let (proposal, job) = snapshot(&store);
        assert_eq!(proposal.status(), Some(ProposalStatus::Rejected));
        assert!(proposal.deposit_paid_at.is_none());
        assert_eq!(proposal.total_paid_minor, 0);
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(store.lock().unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn rejection_racing_the_payment_is_reported() {
        let proposal = approved_proposal(Uuid::new_v4(), 1_000);
        let proposal_id = proposal.id;

        let mut proposal_repo = MockProposalRepository::new();
        proposal_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(proposal.clone())));
        let mut job_repo = MockJobRepository::new();
        job_repo.expect_find_by_proposal_id().returning(|_| Ok(None));
        let mut event_repo = MockPaymentEventRepository::new();
        event_repo
            .expect_find_by_transaction_id()
            .returning(|_| Ok(None));
        event_repo
            .expect_apply_stage_payment()
            .times(1)
            .returning(|_| Ok(StagePaymentOutcome::ProposalRejected));

        let usecase = PaymentWebhookUseCase::new(
            Arc::new(proposal_repo),
            Arc::new(job_repo),
            Arc::new(event_repo),
            Arc::new(stripe()),
        );

        let err = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_raced"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn losing_a_concurrent_race_reports_duplicate() {
        let proposal = approved_proposal(Uuid::new_v4(), 1_000);
        let proposal_id = proposal.id;

        let mut proposal_repo = MockProposalRepository::new();
        proposal_repo
            .expect_find_by_id()
            .returning(move |_| Ok(Some(proposal.clone())));
        let mut job_repo = MockJobRepository::new();
        job_repo.expect_find_by_proposal_id().returning(|_| Ok(None));
        let mut event_repo = MockPaymentEventRepository::new();
        event_repo
            .expect_find_by_transaction_id()
            .returning(|_| Ok(None));
        event_repo
            .expect_apply_stage_payment()
            .times(1)
            .returning(|_| Ok(StagePaymentOutcome::Duplicate));

        let usecase = PaymentWebhookUseCase::new(
            Arc::new(proposal_repo),
            Arc::new(job_repo),
            Arc::new(event_repo),
            Arc::new(stripe()),
        );

        let outcome = deliver(&usecase, &checkout_event(proposal_id, "deposit", "pi_race"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Duplicate {
                proposal_id,
                stage: PaymentStage::Deposit
            }
        );
    }

    #[test]
    fn transaction_id_prefers_payment_intent() {
        let event: StripeEvent = serde_json::from_slice(&checkout_event(Uuid::new_v4(), "deposit", "pi_9")).unwrap();
        let mut session = StripeClient::extract_checkout_session(&event).unwrap();
        assert_eq!(transaction_id(&session, &event).as_deref(), Some("pi_9"));

        session.payment_intent = None;
        assert_eq!(transaction_id(&session, &event).as_deref(), Some("cs_pi_9"));

        session.id = None;
        assert_eq!(transaction_id(&session, &event).as_deref(), Some("evt_pi_9"));
    }
}
