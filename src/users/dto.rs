use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::{ConductKind, GpaScale, Role};

/// Request body for registration. Role-specific fields are checked per role.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    // student
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub gpa_scale: Option<GpaScale>,
    #[serde(default)]
    pub coop_required: bool,
    // hr
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    // university
    #[serde(default)]
    pub university_name: Option<String>,
    #[serde(default)]
    pub official_domain: Option<String>,
    #[serde(default)]
    pub admin_contact: Option<String>,
}

impl RegisterRequest {
    pub fn new(name: &str, email: &str, password: &str, role: Role) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role,
            university: None,
            major: None,
            gpa: None,
            gpa_scale: None,
            coop_required: false,
            company: None,
            position: None,
            industry: None,
            university_name: None,
            official_domain: None,
            admin_contact: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentProfileUpdate {
    pub university: Option<String>,
    pub major: Option<String>,
    pub gpa: Option<f64>,
    pub gpa_scale: Option<GpaScale>,
    pub coop_required: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddProjectRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AddCertificationRequest {
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Outcome reported by the file collaborator after it stored an upload.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptUpload {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptReviewRequest {
    pub approve: bool,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCertificationRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AcademicScoreRequest {
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    pub name: String,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordConductRequest {
    #[serde(rename = "type")]
    pub kind: ConductKind,
    pub description: String,
    pub date: String,
    pub impact_points: u32,
}

#[derive(Debug, Deserialize)]
pub struct CoopEligibilityRequest {
    pub eligible: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetDisabledRequest {
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    #[default]
    National,
    University,
    Major,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default)]
    pub scope: ScopeKind,
    pub university: Option<String>,
    pub major: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateFilter {
    /// Matches name or certification name.
    pub q: Option<String>,
    pub min_ers: Option<u8>,
    pub major: Option<String>,
    pub university: Option<String>,
    pub coop_eligible: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub student_id: Uuid,
    pub name: String,
    pub university: String,
    pub major: String,
    pub ers: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub student_id: Uuid,
    pub name: String,
    pub email: String,
    pub university: String,
    pub major: String,
    pub gpa: f64,
    pub gpa_scale: GpaScale,
    pub ers: u8,
    pub verified_certifications: Vec<String>,
    pub badges: Vec<String>,
    pub coop_eligible: bool,
}
