use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Role-specific data lives in the matching [`Profile`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Hr,
    University,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Hr => "hr",
            Role::University => "university",
            Role::Admin => "admin",
        }
    }

    /// Admins and university officers run the verification queues.
    pub const fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::University)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "hr" => Ok(Role::Hr),
            "university" => Ok(Role::University),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// Login entry point the caller used. The admin portal also admits university officers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Portal {
    Student,
    Hr,
    #[serde(alias = "university")]
    Admin,
}

impl Portal {
    pub fn admits(self, role: Role) -> bool {
        match self {
            Portal::Student => role == Role::Student,
            Portal::Hr => role == Role::Hr,
            Portal::Admin => matches!(role, Role::Admin | Role::University),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpaScale {
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
}

impl GpaScale {
    pub const fn max(self) -> f64 {
        match self {
            GpaScale::Four => 4.0,
            GpaScale::Five => 5.0,
        }
    }

    /// Converts a GPA on this scale to the 4.0-equivalent basis.
    pub fn to_four_point(self, gpa: f64) -> f64 {
        gpa * 4.0 / self.max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub name: String,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConductKind {
    Cheating,
    Warning,
    Attendance,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConductRecord {
    #[serde(rename = "type")]
    pub kind: ConductKind,
    pub description: String,
    pub date: String,
    pub impact_points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub university: String,
    pub major: String,
    pub gpa: f64,
    pub gpa_scale: GpaScale,
    #[serde(default)]
    pub transcript_uploaded: bool,
    #[serde(default)]
    pub transcript_verified: bool,
    #[serde(default)]
    pub certifications: Vec<Certification>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
    #[serde(default)]
    pub conduct_records: Vec<ConductRecord>,
    #[serde(default)]
    pub academic_score: f64,
    #[serde(default)]
    pub badges: Vec<String>,
    #[serde(default)]
    pub coop_eligible: bool,
    #[serde(default)]
    pub coop_required: bool,
}

impl StudentProfile {
    /// Fresh profile as created at registration: all derived scores start at zero.
    pub fn new(university: String, major: String, gpa: f64, gpa_scale: GpaScale) -> Self {
        Self {
            university,
            major,
            gpa,
            gpa_scale,
            transcript_uploaded: false,
            transcript_verified: false,
            certifications: Vec::new(),
            projects: Vec::new(),
            activities: Vec::new(),
            conduct_records: Vec::new(),
            academic_score: 0.0,
            badges: Vec::new(),
            coop_eligible: false,
            coop_required: false,
        }
    }

    pub fn verified_certifications(&self) -> impl Iterator<Item = &Certification> {
        self.certifications.iter().filter(|c| c.verified)
    }

    pub fn activity_points(&self) -> u32 {
        self.activities
            .iter()
            .fold(0u32, |total, a| total.saturating_add(a.points))
    }

    /// Baseline 100, reduced by recorded incidents, never below zero.
    pub fn conduct_score(&self) -> u32 {
        let deductions = self
            .conduct_records
            .iter()
            .fold(0u32, |total, r| total.saturating_add(r.impact_points));
        100u32.saturating_sub(deductions)
    }

    pub fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrProfile {
    pub company: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub industry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniversityProfile {
    pub university_name: String,
    #[serde(default)]
    pub official_domain: String,
    #[serde(default)]
    pub admin_contact: String,
}

/// Role-specific data; exactly one set exists per account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Student(StudentProfile),
    Hr(HrProfile),
    University(UniversityProfile),
    Admin,
}

impl Profile {
    pub const fn role(&self) -> Role {
        match self {
            Profile::Student(_) => Role::Student,
            Profile::Hr(_) => Role::Hr,
            Profile::University(_) => Role::University,
            Profile::Admin => Role::Admin,
        }
    }
}

/// Account record in the credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Always stored lower-cased.
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub disabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub profile: Profile,
}

impl User {
    pub const fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn student(&self) -> Option<&StudentProfile> {
        match &self.profile {
            Profile::Student(p) => Some(p),
            _ => None,
        }
    }

    pub fn student_mut(&mut self) -> Option<&mut StudentProfile> {
        match &mut self.profile {
            Profile::Student(p) => Some(p),
            _ => None,
        }
    }

    pub fn hr(&self) -> Option<&HrProfile> {
        match &self.profile {
            Profile::Hr(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serializes_with_role_tag() {
        let profile = Profile::Hr(HrProfile {
            company: "STC".into(),
            position: "Talent Acquisition Lead".into(),
            industry: "Telecom".into(),
        });
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["role"], "hr");
        assert_eq!(json["company"], "STC");

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back.role(), Role::Hr);
    }

    #[test]
    fn admin_portal_admits_university_officers() {
        assert!(Portal::Admin.admits(Role::University));
        assert!(Portal::Admin.admits(Role::Admin));
        assert!(!Portal::Student.admits(Role::Hr));
        assert!(!Portal::Hr.admits(Role::Admin));
    }

    #[test]
    fn conduct_score_never_negative() {
        let mut p = StudentProfile::new("KFUPM".into(), "Mechanical Engineering".into(), 3.7, GpaScale::Four);
        assert_eq!(p.conduct_score(), 100);
        p.conduct_records.push(ConductRecord {
            kind: ConductKind::Cheating,
            description: "Exam misconduct".into(),
            date: "2025-05-01".into(),
            impact_points: 140,
        });
        assert_eq!(p.conduct_score(), 0);
    }

    #[test]
    fn point_totals_saturate_instead_of_wrapping() {
        let mut p = StudentProfile::new("KFUPM".into(), "Physics".into(), 3.1, GpaScale::Four);
        for _ in 0..2 {
            p.activities.push(ActivityRecord {
                name: "Imported award".into(),
                points: 3_000_000_000,
                date: None,
            });
            p.conduct_records.push(ConductRecord {
                kind: ConductKind::Cheating,
                description: "Imported incident".into(),
                date: "2025-02-11".into(),
                impact_points: u32::MAX,
            });
        }
        assert_eq!(p.activity_points(), u32::MAX);
        assert_eq!(p.conduct_score(), 0);
    }

    #[test]
    fn five_point_gpa_normalizes_to_four() {
        assert!((GpaScale::Five.to_four_point(4.5) - 3.6).abs() < 1e-9);
        assert!((GpaScale::Four.to_four_point(3.2) - 3.2).abs() < 1e-9);
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let user = User {
            id: Uuid::new_v4(),
            email: "hr@aramco.com".into(),
            password_hash: "$argon2id$secret".into(),
            name: "Nasser".into(),
            disabled: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            profile: Profile::Admin,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"role\":\"admin\""));
    }
}
