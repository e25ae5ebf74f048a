use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use fieldops::{
    domain::{
        repositories::{jobs::JobRepository, proposals::ProposalRepository},
        value_objects::enums::payment_stages::PaymentStage,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{jobs::JobPostgres, proposals::ProposalPostgres},
    },
    payments::stripe_client::StripeClient,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{payment_gateway::PaymentGateway, proposals::ProposalUseCase},
};

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    pub stage: Option<PaymentStage>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    proposal_id: Uuid,
    status: String,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, stripe_client: Arc<StripeClient>, currency: String) -> Router {
    let usecase = ProposalUseCase::new(
        Arc::new(ProposalPostgres::new(Arc::clone(&db_pool))),
        Arc::new(JobPostgres::new(Arc::clone(&db_pool))),
        stripe_client,
        currency,
    );

    Router::new()
        .route("/:id/send", post(send::<ProposalPostgres, JobPostgres, StripeClient>))
        .route("/:id/approve", post(approve::<ProposalPostgres, JobPostgres, StripeClient>))
        .route("/:id/reject", post(reject::<ProposalPostgres, JobPostgres, StripeClient>))
        .route("/:id/status", get(status::<ProposalPostgres, JobPostgres, StripeClient>))
        .route("/:id/checkout", post(checkout::<ProposalPostgres, JobPostgres, StripeClient>))
        .with_state(Arc::new(usecase))
}

pub async fn send<P, J, G>(
    State(usecase): State<Arc<ProposalUseCase<P, J, G>>>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    info!(%proposal_id, user_id = %auth.user_id, "proposals: send requested");
    let status = usecase.send_proposal(&auth.actor(), proposal_id).await?;
    Ok(Json(StatusBody {
        proposal_id,
        status: status.to_string(),
    }))
}

pub async fn approve<P, J, G>(
    State(usecase): State<Arc<ProposalUseCase<P, J, G>>>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    info!(%proposal_id, user_id = %auth.user_id, "proposals: approval requested");
    let approval = usecase.approve_proposal(&auth.actor(), proposal_id).await?;
    Ok(Json(approval))
}

pub async fn reject<P, J, G>(
    State(usecase): State<Arc<ProposalUseCase<P, J, G>>>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    info!(%proposal_id, user_id = %auth.user_id, "proposals: rejection requested");
    let status = usecase.reject_proposal(&auth.actor(), proposal_id).await?;
    Ok(Json(StatusBody {
        proposal_id,
        status: status.to_string(),
    }))
}

pub async fn status<P, J, G>(
    State(usecase): State<Arc<ProposalUseCase<P, J, G>>>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    let overview = usecase.status_overview(&auth.actor(), proposal_id).await?;
    Ok(Json(overview))
}

pub async fn checkout<P, J, G>(
    State(usecase): State<Arc<ProposalUseCase<P, J, G>>>,
    auth: AuthUser,
    Path(proposal_id): Path<Uuid>,
    body: Option<Json<CheckoutBody>>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProposalRepository + 'static,
    J: JobRepository + 'static,
    G: PaymentGateway + 'static,
{
    let Json(body) = body.unwrap_or_default();
    info!(%proposal_id, user_id = %auth.user_id, stage = ?body.stage, "proposals: checkout requested");
    let session = usecase
        .create_checkout_session(&auth.actor(), proposal_id, body.stage)
        .await?;
    Ok(Json(session))
}
