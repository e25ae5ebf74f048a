pub mod jobs;
pub mod payment_events;
pub mod proposals;
