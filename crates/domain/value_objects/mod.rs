pub mod actors;
pub mod enums;
pub mod payment_ledger;
pub mod proposals;
pub mod stage_payments;
pub mod status_mapping;
