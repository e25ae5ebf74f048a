use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    NotScheduled,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::NotScheduled,
        JobStatus::Scheduled,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotScheduled => "not_scheduled",
            JobStatus::Scheduled => "scheduled",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::NotScheduled => "Not Scheduled",
            JobStatus::Scheduled => "Scheduled",
            JobStatus::InProgress => "In Progress",
            JobStatus::Completed => "Completed",
            JobStatus::Cancelled => "Cancelled",
        }
    }

    pub fn normalize(value: &str) -> Option<Self> {
        let folded = value
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");

        match folded.as_str() {
            "not_scheduled" => Some(JobStatus::NotScheduled),
            "scheduled" => Some(JobStatus::Scheduled),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "cancelled" | "canceled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    /// Unknown input degrades to `not_scheduled`.
    pub fn normalize_or_default(value: &str) -> Self {
        Self::normalize(value).unwrap_or_default()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Position along the work timeline. `None` for `cancelled`, which is off it.
    pub fn progress_rank(&self) -> Option<u8> {
        match self {
            JobStatus::NotScheduled => Some(0),
            JobStatus::Scheduled => Some(1),
            JobStatus::InProgress => Some(2),
            JobStatus::Completed => Some(3),
            JobStatus::Cancelled => None,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
