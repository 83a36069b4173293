use serde::{Deserialize, Serialize};

use crate::opportunities::repo_types::{OpportunityStatus, OpportunityType, WorkMode};

fn default_positions() -> u32 {
    1
}

/// Request body for a new posting. `company` defaults to the recruiter's company.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOpportunityRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: OpportunityType,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub required_majors: Vec<String>,
    #[serde(default)]
    pub min_ers: u8,
    #[serde(default)]
    pub min_gpa: f64,
    #[serde(default)]
    pub required_certs: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub location: String,
    pub work_mode: WorkMode,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default = "default_positions")]
    pub positions: u32,
    #[serde(default)]
    pub description: String,
}

impl CreateOpportunityRequest {
    pub fn new(title: &str, kind: OpportunityType, work_mode: WorkMode) -> Self {
        Self {
            title: title.into(),
            kind,
            company: None,
            department: String::new(),
            required_majors: Vec::new(),
            min_ers: 0,
            min_gpa: 0.0,
            required_certs: Vec::new(),
            skills: Vec::new(),
            location: String::new(),
            work_mode,
            duration: String::new(),
            deadline: String::new(),
            positions: default_positions(),
            description: String::new(),
        }
    }
}

/// Partial edit; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOpportunityRequest {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<OpportunityType>,
    pub department: Option<String>,
    pub required_majors: Option<Vec<String>>,
    pub min_ers: Option<u8>,
    pub min_gpa: Option<f64>,
    pub required_certs: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
    pub location: Option<String>,
    pub work_mode: Option<WorkMode>,
    pub duration: Option<String>,
    pub deadline: Option<String>,
    pub positions: Option<u32>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: OpportunityStatus,
}

/// Advisory result of checking a student against a posting's requirements.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityReport {
    pub eligible: bool,
    pub open: bool,
    pub major_ok: bool,
    pub ers_ok: bool,
    pub gpa_ok: bool,
    pub missing_certs: Vec<String>,
    pub ers: u8,
    pub match_score: u8,
}
