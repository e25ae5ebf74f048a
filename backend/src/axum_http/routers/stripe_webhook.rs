use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use fieldops::{
    domain::repositories::{
        jobs::JobRepository, payment_events::PaymentEventRepository, proposals::ProposalRepository,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            jobs::JobPostgres, payment_events::PaymentEventPostgres, proposals::ProposalPostgres,
        },
    },
    payments::stripe_client::StripeClient,
};
use serde_json::json;
use tracing::warn;

use crate::{
    axum_http::error_responses::AppError,
    usecases::{
        payment_gateway::PaymentGateway,
        payment_webhook::{PaymentWebhookUseCase, WebhookOutcome},
    },
};

pub fn routes(db_pool: Arc<PgPoolSquad>, stripe_client: Arc<StripeClient>) -> Router {
    let usecase = PaymentWebhookUseCase::new(
        Arc::new(ProposalPostgres::new(Arc::clone(&db_pool))),
        Arc::new(JobPostgres::new(Arc::clone(&db_pool))),
        Arc::new(PaymentEventPostgres::new(Arc::clone(&db_pool))),
        stripe_client,
    );

    Router::new()
        .route(
            "/webhook",
            post(stripe_webhook::<ProposalPostgres, JobPostgres, PaymentEventPostgres, StripeClient>),
        )
        .with_state(Arc::new(usecase))
}

/// The body is taken raw: the signature covers the exact bytes sent.
pub async fn stripe_webhook<P, J, E, G>(
    State(usecase): State<Arc<PaymentWebhookUseCase<P, J, E, G>>>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    E: PaymentEventRepository + 'static,
    G: PaymentGateway + 'static,
{
    let Some(signature) = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
    else {
        warn!("payment_webhook: request without stripe-signature header");
        return Err(AppError::BadRequest("missing Stripe-Signature header".to_string()));
    };

    let outcome = usecase.handle_stripe_webhook(&payload, signature).await?;
    let outcome = match outcome {
        WebhookOutcome::Applied { .. } => "applied",
        WebhookOutcome::Duplicate { .. } => "duplicate",
        WebhookOutcome::Ignored(_) => "ignored",
    };

    Ok(Json(json!({ "received": true, "outcome": outcome })))
}
