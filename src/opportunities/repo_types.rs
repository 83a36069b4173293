use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpportunityType {
    Coop,
    Internship,
    PartTime,
    Junior,
}

impl OpportunityType {
    pub const fn as_str(self) -> &'static str {
        match self {
            OpportunityType::Coop => "coop",
            OpportunityType::Internship => "internship",
            OpportunityType::PartTime => "part-time",
            OpportunityType::Junior => "junior",
        }
    }
}

impl std::fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    Remote,
    Onsite,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpportunityStatus {
    Open,
    Closed,
}

/// Posting owned by an HR account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Uuid,
    pub hr_id: Uuid,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: OpportunityType,
    pub company: String,
    pub department: String,
    pub required_majors: Vec<String>,
    pub min_ers: u8,
    pub min_gpa: f64,
    pub required_certs: Vec<String>,
    pub skills: Vec<String>,
    pub location: String,
    pub work_mode: WorkMode,
    pub duration: String,
    pub deadline: String,
    pub positions: u32,
    pub description: String,
    pub status: OpportunityStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Opportunity {
    pub fn is_open(&self) -> bool {
        self.status == OpportunityStatus::Open
    }

    /// Empty `required_majors` means every major qualifies.
    pub fn accepts_major(&self, major: &str) -> bool {
        self.required_majors.is_empty() || self.required_majors.iter().any(|m| m == major)
    }
}
