use serde::{Deserialize, Serialize};

use crate::applications::repo_types::{Application, ApplicationStatus};

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantSort {
    #[default]
    MatchScore,
    Ers,
    Gpa,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicantsQuery {
    #[serde(default)]
    pub sort: ApplicantSort,
}

/// Application joined with the applicant's current standing.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicantView {
    #[serde(flatten)]
    pub application: Application,
    pub student_name: String,
    pub student_email: String,
    pub major: String,
    pub university: String,
    pub ers: u8,
    /// 4.0-equivalent.
    pub gpa: f64,
}

/// Student-facing view with the posting it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct MyApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub title: String,
    pub company: String,
}
