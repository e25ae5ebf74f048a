use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Lifecycle of a proposal. Once approved, the status follows the payment ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
    DepositPaid,
    RoughInPaid,
    Completed,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 7] = [
        ProposalStatus::Draft,
        ProposalStatus::Sent,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::DepositPaid,
        ProposalStatus::RoughInPaid,
        ProposalStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "draft",
            ProposalStatus::Sent => "sent",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::DepositPaid => "deposit_paid",
            ProposalStatus::RoughInPaid => "rough_in_paid",
            ProposalStatus::Completed => "completed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProposalStatus::Draft => "Draft",
            ProposalStatus::Sent => "Sent",
            ProposalStatus::Approved => "Approved",
            ProposalStatus::Rejected => "Rejected",
            ProposalStatus::DepositPaid => "Deposit Paid",
            ProposalStatus::RoughInPaid => "Rough-In Paid",
            ProposalStatus::Completed => "Completed",
        }
    }

    /// Parses a stored or submitted status, folding the historical spellings
    /// (`"deposit paid"`, `"Rough-In Paid"`, `"final_paid"`, ...) onto the
    /// canonical variants.
    pub fn normalize(value: &str) -> Option<Self> {
        let folded = value
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");

        match folded.as_str() {
            "draft" => Some(ProposalStatus::Draft),
            "sent" => Some(ProposalStatus::Sent),
            "approved" => Some(ProposalStatus::Approved),
            "rejected" => Some(ProposalStatus::Rejected),
            "deposit_paid" => Some(ProposalStatus::DepositPaid),
            "rough_in_paid" | "roughin_paid" | "progress_paid" => Some(ProposalStatus::RoughInPaid),
            // Paying the final stage settles the ledger.
            "final_paid" | "completed" => Some(ProposalStatus::Completed),
            _ => None,
        }
    }

    /// Unknown input degrades to `approved`, the least-progressed post-approval state.
    pub fn normalize_or_default(value: &str) -> Self {
        Self::normalize(value).unwrap_or(ProposalStatus::Approved)
    }

    pub fn is_pre_approval(&self) -> bool {
        matches!(self, ProposalStatus::Draft | ProposalStatus::Sent)
    }

    pub fn is_post_approval(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Approved
                | ProposalStatus::DepositPaid
                | ProposalStatus::RoughInPaid
                | ProposalStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProposalStatus::Rejected | ProposalStatus::Completed)
    }
}

impl Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
