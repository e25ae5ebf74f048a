pub mod jobs;
pub mod proposals;
pub mod stripe_webhook;
