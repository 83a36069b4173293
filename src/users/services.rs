use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::validate_password_strength;
use crate::auth::services::MAX_EMAIL_LEN;
use crate::error::AppError;
use crate::feed::services::{audit, notify};
use crate::state::AppState;
use crate::storage::{SessionRepo, StoreError, UserRepo};
use crate::users::dto::{RegisterRequest, StudentProfileUpdate, TranscriptUpload};
use crate::users::repo_types::{
    ActivityRecord, Certification, ConductRecord, GpaScale, HrProfile, Profile, Role,
    StudentProfile, UniversityProfile, User,
};

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_TEXT_LEN: usize = 200;
pub const MAX_TRANSCRIPT_BYTES: u64 = 5 * 1024 * 1024;
/// Upper bound for a single activity award or conduct deduction.
pub const MAX_RECORD_POINTS: u32 = 100;

const TRANSCRIPT_TYPES: &[(&str, &[&str])] = &[
    ("pdf", &["application/pdf"]),
    ("png", &["image/png"]),
    ("jpg", &["image/jpeg", "image/jpg"]),
    ("jpeg", &["image/jpeg", "image/jpg"]),
];

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn required(field: Option<String>, what: &str) -> Result<String, AppError> {
    match field.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => {
            if v.chars().count() > MAX_TEXT_LEN {
                return Err(AppError::invalid(format!("{} is too long.", what)));
            }
            Ok(v)
        }
        _ => Err(AppError::invalid(format!("{} is required.", what))),
    }
}

fn optional(field: Option<String>) -> String {
    field.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn check_gpa(gpa: f64, scale: GpaScale) -> Result<(), AppError> {
    if !gpa.is_finite() || gpa < 0.0 || gpa > scale.max() {
        return Err(AppError::invalid(format!(
            "GPA must be between 0 and {}.",
            scale.max()
        )));
    }
    Ok(())
}

#[instrument(skip(state, req), fields(email = %req.email, role = %req.role))]
pub async fn register(state: &AppState, req: RegisterRequest) -> Result<User, AppError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(AppError::invalid("Please fill in all fields."));
    }
    if name.chars().count() > MAX_NAME_LEN || email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::invalid("Name or email is too long."));
    }
    if !is_valid_email(&email) {
        warn!("invalid email");
        return Err(AppError::invalid("Invalid email address."));
    }
    validate_password_strength(&req.password)?;

    let profile = match req.role {
        Role::Admin => {
            return Err(AppError::invalid("Admin accounts cannot be self-registered."));
        }
        Role::Student => {
            let suffix = state.config.student_email_suffix.to_lowercase();
            if !suffix.is_empty() && !email.ends_with(&suffix) {
                return Err(AppError::invalid(format!(
                    "Students must register with a university email ending in {}.",
                    suffix
                )));
            }
            let university = required(req.university, "University")?;
            let major = required(req.major, "Major")?;
            let scale = req
                .gpa_scale
                .ok_or_else(|| AppError::invalid("GPA scale is required."))?;
            let gpa = req.gpa.unwrap_or(0.0);
            check_gpa(gpa, scale)?;
            let mut profile = StudentProfile::new(university, major, gpa, scale);
            profile.coop_required = req.coop_required;
            Profile::Student(profile)
        }
        Role::Hr => Profile::Hr(HrProfile {
            company: required(req.company, "Company")?,
            position: optional(req.position),
            industry: optional(req.industry),
        }),
        Role::University => Profile::University(UniversityProfile {
            university_name: req
                .university_name
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| name.clone()),
            official_domain: optional(req.official_domain),
            admin_contact: optional(req.admin_contact),
        }),
    };

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: state.passwords.hash(&req.password)?,
        name,
        disabled: false,
        created_at: state.clock.now(),
        profile,
    };

    let user = match state.store.create_user(user).await {
        Ok(u) => u,
        Err(StoreError::Conflict) => {
            warn!("email already registered");
            return Err(AppError::DuplicateEmail);
        }
        Err(e) => return Err(e.into()),
    };

    audit(state, format!("New {} registered: {}", user.role(), user.email)).await?;
    info!(user_id = %user.id, "user registered");
    Ok(user)
}

pub async fn find_by_email(state: &AppState, email: &str) -> Result<User, AppError> {
    state
        .store
        .find_user_by_email(email.trim())
        .await?
        .ok_or(AppError::NotFound("User"))
}

pub async fn find_by_id(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .store
        .find_user_by_id(id)
        .await?
        .ok_or(AppError::NotFound("User"))
}

/// Creates the configured bootstrap admin if it does not exist yet.
pub async fn ensure_admin(state: &AppState) -> Result<(), AppError> {
    let Some(admin) = state.config.bootstrap_admin.clone() else {
        return Ok(());
    };
    let email = admin.email.trim().to_lowercase();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }
    validate_password_strength(&admin.password)?;

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: state.passwords.hash(&admin.password)?,
        name: admin.name,
        disabled: false,
        created_at: state.clock.now(),
        profile: Profile::Admin,
    };
    match state.store.create_user(user).await {
        Ok(user) => {
            audit(state, format!("New admin registered: {}", user.email)).await?;
            info!(user_id = %user.id, "bootstrap admin created");
            Ok(())
        }
        // another instance got there first
        Err(StoreError::Conflict) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Loads a student, applies `edit` to the profile and stores the result.
async fn edit_student<F>(state: &AppState, student_id: Uuid, edit: F) -> Result<User, AppError>
where
    F: FnOnce(&mut StudentProfile) -> Result<(), AppError>,
{
    let mut user = find_by_id(state, student_id).await?;
    let profile = user.student_mut().ok_or(AppError::NotFound("Student"))?;
    edit(profile)?;
    state.store.update_user(&user).await?;
    Ok(user)
}

fn require_student(actor: &User) -> Result<(), AppError> {
    if actor.role() != Role::Student {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

// ===== student self-service =====

pub async fn update_student_profile(
    state: &AppState,
    actor: &User,
    update: StudentProfileUpdate,
) -> Result<User, AppError> {
    require_student(actor)?;
    let university = update.university.map(|u| required(Some(u), "University")).transpose()?;
    let major = update.major.map(|m| required(Some(m), "Major")).transpose()?;

    edit_student(state, actor.id, |p| {
        let scale = update.gpa_scale.unwrap_or(p.gpa_scale);
        let gpa = update.gpa.unwrap_or(p.gpa);
        check_gpa(gpa, scale)?;
        p.gpa = gpa;
        p.gpa_scale = scale;
        if let Some(u) = university {
            p.university = u;
        }
        if let Some(m) = major {
            p.major = m;
        }
        if let Some(c) = update.coop_required {
            p.coop_required = c;
        }
        Ok(())
    })
    .await
}

pub async fn add_project(state: &AppState, actor: &User, title: &str) -> Result<User, AppError> {
    require_student(actor)?;
    let title = required(Some(title.to_string()), "Project title")?;
    edit_student(state, actor.id, |p| {
        p.projects.push(title);
        Ok(())
    })
    .await
}

/// Adds a self-reported certification. It counts toward scores once verified.
pub async fn add_certification(
    state: &AppState,
    actor: &User,
    name: &str,
    external_id: Option<String>,
) -> Result<User, AppError> {
    require_student(actor)?;
    let name = required(Some(name.to_string()), "Certification name")?;
    let external_id = external_id.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    edit_student(state, actor.id, |p| {
        if p.certifications.iter().any(|c| c.name.eq_ignore_ascii_case(&name)) {
            return Err(AppError::StateConflict("Certification already added.".into()));
        }
        p.certifications.push(Certification {
            name,
            external_id,
            verified: false,
        });
        Ok(())
    })
    .await
}

fn check_transcript(upload: &TranscriptUpload) -> Result<(), AppError> {
    let extension = upload
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .ok_or_else(|| AppError::invalid("Invalid file type."))?;
    let content_type = upload.content_type.trim().to_ascii_lowercase();

    let allowed = TRANSCRIPT_TYPES
        .iter()
        .any(|(ext, mimes)| *ext == extension && mimes.contains(&content_type.as_str()));
    if !allowed {
        return Err(AppError::invalid("Only PDF, PNG, and JPEG files are allowed."));
    }
    if upload.size_bytes == 0 {
        return Err(AppError::invalid("Invalid file type."));
    }
    if upload.size_bytes > MAX_TRANSCRIPT_BYTES {
        return Err(AppError::invalid("File size exceeds 5 MB limit."));
    }
    Ok(())
}

/// Records that the file collaborator accepted a transcript. Only flags are kept.
pub async fn report_transcript_upload(
    state: &AppState,
    actor: &User,
    upload: &TranscriptUpload,
) -> Result<User, AppError> {
    require_student(actor)?;
    check_transcript(upload)?;
    let user = edit_student(state, actor.id, |p| {
        p.transcript_uploaded = true;
        p.transcript_verified = false;
        Ok(())
    })
    .await?;
    audit(state, format!("Transcript uploaded: {}", user.email)).await?;
    Ok(user)
}

// ===== staff verification =====

/// Admins act on any student; university officers only on their own students.
fn ensure_can_verify(actor: &User, student: &User) -> Result<(), AppError> {
    match &actor.profile {
        Profile::Admin => Ok(()),
        Profile::University(u) => {
            let same = student
                .student()
                .map(|s| s.university.trim().eq_ignore_ascii_case(u.university_name.trim()))
                .unwrap_or(false);
            if same {
                Ok(())
            } else {
                Err(AppError::Forbidden)
            }
        }
        _ => Err(AppError::Forbidden),
    }
}

async fn staff_edit<F>(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    edit: F,
) -> Result<User, AppError>
where
    F: FnOnce(&mut StudentProfile) -> Result<(), AppError>,
{
    if !actor.role().is_staff() {
        return Err(AppError::Forbidden);
    }
    let student = find_by_id(state, student_id).await?;
    if student.student().is_none() {
        return Err(AppError::NotFound("Student"));
    }
    ensure_can_verify(actor, &student)?;
    edit_student(state, student_id, edit).await
}

#[instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn review_transcript(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    approve: bool,
) -> Result<User, AppError> {
    let user = staff_edit(state, actor, student_id, |p| {
        if !p.transcript_uploaded {
            return Err(AppError::StateConflict("No transcript uploaded.".into()));
        }
        p.transcript_verified = approve;
        if !approve {
            p.transcript_uploaded = false;
        }
        Ok(())
    })
    .await?;

    if approve {
        notify(state, user.id, "Transcript verified").await?;
        audit(state, format!("Transcript verified: {}", user.email)).await?;
    } else {
        notify(state, user.id, "Transcript rejected. Please upload again.").await?;
        audit(state, format!("Transcript rejected: {}", user.email)).await?;
    }
    Ok(user)
}

#[instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn verify_certification(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    name: &str,
) -> Result<User, AppError> {
    let name = name.trim().to_string();
    let mut verified_name = String::new();
    let user = staff_edit(state, actor, student_id, |p| {
        let cert = p
            .certifications
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
            .ok_or(AppError::NotFound("Certification"))?;
        cert.verified = true;
        verified_name = cert.name.clone();
        Ok(())
    })
    .await?;

    notify(state, user.id, format!("Certification verified: {}", verified_name)).await?;
    audit(state, format!("Certification verified: {} for {}", verified_name, user.email)).await?;
    Ok(user)
}

pub async fn set_academic_score(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    score: f64,
) -> Result<User, AppError> {
    if !score.is_finite() || !(0.0..=100.0).contains(&score) {
        return Err(AppError::invalid("Academic score must be between 0 and 100."));
    }
    let user = staff_edit(state, actor, student_id, |p| {
        p.academic_score = score;
        Ok(())
    })
    .await?;
    audit(state, format!("Academic score set: {} = {}", user.email, score)).await?;
    Ok(user)
}

/// Points default to the activity catalogue entry when not given.
pub async fn record_activity(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    name: &str,
    points: Option<u32>,
    date: Option<String>,
) -> Result<User, AppError> {
    let name = required(Some(name.to_string()), "Activity name")?;
    let points = points
        .or_else(|| state.catalog.activity_points(&name))
        .ok_or_else(|| AppError::invalid("Unknown activity; points are required."))?;
    if points > MAX_RECORD_POINTS {
        return Err(AppError::invalid(format!(
            "Activity points must be between 0 and {}.",
            MAX_RECORD_POINTS
        )));
    }

    let record = ActivityRecord {
        name: name.clone(),
        points,
        date,
    };
    let user = staff_edit(state, actor, student_id, |p| {
        p.activities.push(record);
        Ok(())
    })
    .await?;
    audit(state, format!("Activity recorded: {} for {} (+{})", name, user.email, points)).await?;
    Ok(user)
}

pub async fn record_conduct(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    record: ConductRecord,
) -> Result<User, AppError> {
    if record.description.trim().is_empty() {
        return Err(AppError::invalid("Description is required."));
    }
    if record.impact_points > MAX_RECORD_POINTS {
        return Err(AppError::invalid(format!(
            "Impact points must be between 0 and {}.",
            MAX_RECORD_POINTS
        )));
    }
    let impact = record.impact_points;
    let user = staff_edit(state, actor, student_id, |p| {
        p.conduct_records.push(record);
        Ok(())
    })
    .await?;
    audit(state, format!("Conduct record added: {} (-{})", user.email, impact)).await?;
    Ok(user)
}

pub async fn set_coop_eligibility(
    state: &AppState,
    actor: &User,
    student_id: Uuid,
    eligible: bool,
) -> Result<User, AppError> {
    let user = staff_edit(state, actor, student_id, |p| {
        p.coop_eligible = eligible;
        Ok(())
    })
    .await?;
    audit(state, format!("Co-op eligibility set: {} = {}", user.email, eligible)).await?;
    Ok(user)
}

// ===== admin =====

pub async fn list_users(state: &AppState, actor: &User) -> Result<Vec<User>, AppError> {
    if actor.role() != Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(state.store.list_users().await?)
}

/// Enables or disables an account. Disabling also revokes its sessions.
#[instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn set_disabled(
    state: &AppState,
    actor: &User,
    user_id: Uuid,
    disabled: bool,
) -> Result<User, AppError> {
    if actor.role() != Role::Admin {
        return Err(AppError::Forbidden);
    }
    let mut user = find_by_id(state, user_id).await?;
    if user.role() == Role::Admin {
        return Err(AppError::Forbidden);
    }
    user.disabled = disabled;
    state.store.update_user(&user).await?;

    if disabled {
        let revoked = state.store.delete_sessions_for_user(user.id).await?;
        info!(user_id = %user.id, revoked, "account disabled");
        audit(state, format!("User disabled: {}", user.email)).await?;
    } else {
        audit(state, format!("User enabled: {}", user.email)).await?;
    }
    Ok(user)
}
