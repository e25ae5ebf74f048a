pub mod job_statuses;
pub mod payment_stages;
pub mod proposal_statuses;
pub mod roles;
pub mod stage_statuses;
