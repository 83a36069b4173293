use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    Shortlisted,
    Interviewed,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Shortlisted => "shortlisted",
            ApplicationStatus::Interviewed => "interviewed",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// Wording for notification and audit text.
    pub const fn describe(self) -> &'static str {
        match self {
            ApplicationStatus::UnderReview => "under review",
            other => other.label(),
        }
    }

    /// The student may still pull the application back.
    pub const fn is_withdrawable(self) -> bool {
        matches!(self, ApplicationStatus::Submitted | ApplicationStatus::UnderReview)
    }

    /// HR can still move the application; accepted and rejected are final.
    pub const fn is_open_for_review(self) -> bool {
        !matches!(self, ApplicationStatus::Accepted | ApplicationStatus::Rejected)
    }

    /// Statuses reachable through a review decision.
    pub const fn is_review_target(self) -> bool {
        !matches!(self, ApplicationStatus::Submitted)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(Self::Submitted),
            "under_review" => Ok(Self::UnderReview),
            "shortlisted" => Ok(Self::Shortlisted),
            "interviewed" => Ok(Self::Interviewed),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("unknown application status: {}", s)),
        }
    }
}

/// A student's application to one opportunity. `match_score` is frozen at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub opportunity_id: Uuid,
    pub student_id: Uuid,
    pub status: ApplicationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub applied_at: OffsetDateTime,
    pub match_score: u8,
}
