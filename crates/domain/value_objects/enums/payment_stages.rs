use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::proposal_statuses::ProposalStatus;

/// The three ordered installments of an approved proposal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PaymentStage {
    #[serde(rename = "deposit")]
    Deposit,
    #[serde(rename = "roughin", alias = "rough_in", alias = "rough-in", alias = "progress")]
    Progress,
    #[serde(rename = "final")]
    Final,
}

impl PaymentStage {
    pub const ALL: [PaymentStage; 3] = [
        PaymentStage::Deposit,
        PaymentStage::Progress,
        PaymentStage::Final,
    ];

    /// Wire value carried in checkout metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStage::Deposit => "deposit",
            PaymentStage::Progress => "roughin",
            PaymentStage::Final => "final",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deposit" => Some(PaymentStage::Deposit),
            "roughin" | "rough_in" | "rough-in" | "progress" => Some(PaymentStage::Progress),
            "final" => Some(PaymentStage::Final),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentStage::Deposit => "Deposit",
            PaymentStage::Progress => "Rough-In",
            PaymentStage::Final => "Final",
        }
    }

    pub fn percentage(&self) -> u8 {
        match self {
            PaymentStage::Deposit => 50,
            PaymentStage::Progress => 30,
            PaymentStage::Final => 20,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            PaymentStage::Deposit => 0,
            PaymentStage::Progress => 1,
            PaymentStage::Final => 2,
        }
    }

    pub fn next(&self) -> Option<Self> {
        match self {
            PaymentStage::Deposit => Some(PaymentStage::Progress),
            PaymentStage::Progress => Some(PaymentStage::Final),
            PaymentStage::Final => None,
        }
    }

    /// Proposal status once this stage has been paid.
    pub fn paid_status(&self) -> ProposalStatus {
        match self {
            PaymentStage::Deposit => ProposalStatus::DepositPaid,
            PaymentStage::Progress => ProposalStatus::RoughInPaid,
            PaymentStage::Final => ProposalStatus::Completed,
        }
    }
}

impl Display for PaymentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
