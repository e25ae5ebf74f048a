pub mod jobs;
pub mod payment_gateway;
pub mod payment_webhook;
pub mod proposals;

#[cfg(test)]
pub(crate) mod fixtures;
