use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::patch,
};
use fieldops::{
    domain::{
        repositories::{jobs::JobRepository, proposals::ProposalRepository},
        value_objects::enums::job_statuses::JobStatus,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{jobs::JobPostgres, proposals::ProposalPostgres},
    },
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{auth::AuthUser, axum_http::error_responses::AppError, usecases::jobs::JobStatusUseCase};

#[derive(Debug, Deserialize)]
pub struct UpdateJobStatusBody {
    pub status: String,
}

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let usecase = JobStatusUseCase::new(
        Arc::new(JobPostgres::new(Arc::clone(&db_pool))),
        Arc::new(ProposalPostgres::new(Arc::clone(&db_pool))),
    );

    Router::new()
        .route("/:id/status", patch(update_status::<JobPostgres, ProposalPostgres>))
        .with_state(Arc::new(usecase))
}

pub async fn update_status<J, P>(
    State(usecase): State<Arc<JobStatusUseCase<J, P>>>,
    auth: AuthUser,
    Path(job_id): Path<Uuid>,
    Json(body): Json<UpdateJobStatusBody>,
) -> Result<impl IntoResponse, AppError>
where
    J: JobRepository + 'static,
    P: ProposalRepository + 'static,
{
    // Accepts legacy spellings such as "In Progress" or "canceled".
    let status = JobStatus::normalize(&body.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown job status: {}", body.status)))?;

    info!(%job_id, user_id = %auth.user_id, status = %status, "jobs: status change requested");
    let change = usecase
        .update_job_status(&auth.actor(), job_id, status)
        .await?;
    Ok(Json(change))
}
