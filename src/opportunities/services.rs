use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::feed::services::{audit, notify};
use crate::opportunities::dto::{CreateOpportunityRequest, EligibilityReport, UpdateOpportunityRequest};
use crate::opportunities::repo_types::{Opportunity, OpportunityStatus};
use crate::scoring::{calculate_ers, calculate_match_score};
use crate::state::AppState;
use crate::storage::{OpportunityRepo, UserRepo};
use crate::users::repo_types::{Role, User};

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn validate(opp: &Opportunity) -> Result<(), AppError> {
    if opp.title.is_empty() || opp.company.is_empty() {
        return Err(AppError::invalid("Title and company are required."));
    }
    if opp.title.chars().count() > MAX_TITLE_LEN || opp.description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::invalid("Title or description is too long."));
    }
    if opp.min_ers > 100 {
        return Err(AppError::invalid("Minimum ERS must be between 0 and 100."));
    }
    // compared against the student's 4.0-equivalent GPA
    if !opp.min_gpa.is_finite() || !(0.0..=4.0).contains(&opp.min_gpa) {
        return Err(AppError::invalid("Minimum GPA must be between 0 and 4."));
    }
    if opp.positions == 0 {
        return Err(AppError::invalid("Positions must be at least 1."));
    }
    Ok(())
}

/// Owner or admin.
pub(crate) fn ensure_manager(actor: &User, opp: &Opportunity) -> Result<(), AppError> {
    if actor.role() == Role::Admin || (actor.role() == Role::Hr && actor.id == opp.hr_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// The posting's own HR account. Admins do not qualify.
fn ensure_owner(actor: &User, opp: &Opportunity) -> Result<(), AppError> {
    if actor.role() == Role::Hr && actor.id == opp.hr_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

pub async fn get(state: &AppState, id: Uuid) -> Result<Opportunity, AppError> {
    state
        .store
        .find_opportunity(id)
        .await?
        .ok_or(AppError::NotFound("Opportunity"))
}

#[instrument(skip(state, actor, req), fields(actor_id = %actor.id))]
pub async fn create_opportunity(
    state: &AppState,
    actor: &User,
    req: CreateOpportunityRequest,
) -> Result<Opportunity, AppError> {
    if !matches!(actor.role(), Role::Hr | Role::Admin) {
        return Err(AppError::Forbidden);
    }
    let company = req
        .company
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .or_else(|| actor.hr().map(|hr| hr.company.clone()))
        .unwrap_or_default();

    let opp = Opportunity {
        id: Uuid::new_v4(),
        hr_id: actor.id,
        title: req.title.trim().to_string(),
        kind: req.kind,
        company,
        department: req.department.trim().to_string(),
        required_majors: clean_list(req.required_majors),
        min_ers: req.min_ers,
        min_gpa: req.min_gpa,
        required_certs: clean_list(req.required_certs),
        skills: clean_list(req.skills),
        location: req.location.trim().to_string(),
        work_mode: req.work_mode,
        duration: req.duration,
        deadline: req.deadline,
        positions: req.positions,
        description: req.description,
        status: OpportunityStatus::Open,
        created_at: state.clock.now(),
    };
    validate(&opp)?;

    state.store.insert_opportunity(&opp).await?;
    audit(state, format!("Opportunity created: {} by {}", opp.title, opp.company)).await?;

    let text = format!("New {} opportunity: {} at {}", opp.kind, opp.title, opp.company);
    let mut notified = 0usize;
    for student in state.store.list_students().await? {
        let Some(profile) = student.student() else { continue };
        if student.disabled || !opp.accepts_major(&profile.major) {
            continue;
        }
        notify(state, student.id, text.clone()).await?;
        notified += 1;
    }
    info!(opportunity_id = %opp.id, notified, "opportunity created");
    Ok(opp)
}

pub async fn update_opportunity(
    state: &AppState,
    actor: &User,
    id: Uuid,
    update: UpdateOpportunityRequest,
) -> Result<Opportunity, AppError> {
    let mut opp = get(state, id).await?;
    ensure_owner(actor, &opp)?;

    if let Some(v) = update.title {
        opp.title = v.trim().to_string();
    }
    if let Some(v) = update.kind {
        opp.kind = v;
    }
    if let Some(v) = update.department {
        opp.department = v.trim().to_string();
    }
    if let Some(v) = update.required_majors {
        opp.required_majors = clean_list(v);
    }
    if let Some(v) = update.min_ers {
        opp.min_ers = v;
    }
    if let Some(v) = update.min_gpa {
        opp.min_gpa = v;
    }
    if let Some(v) = update.required_certs {
        opp.required_certs = clean_list(v);
    }
    if let Some(v) = update.skills {
        opp.skills = clean_list(v);
    }
    if let Some(v) = update.location {
        opp.location = v.trim().to_string();
    }
    if let Some(v) = update.work_mode {
        opp.work_mode = v;
    }
    if let Some(v) = update.duration {
        opp.duration = v;
    }
    if let Some(v) = update.deadline {
        opp.deadline = v;
    }
    if let Some(v) = update.positions {
        opp.positions = v;
    }
    if let Some(v) = update.description {
        opp.description = v;
    }
    validate(&opp)?;

    state.store.update_opportunity(&opp).await?;
    audit(state, format!("Opportunity updated: {}", opp.title)).await?;
    Ok(opp)
}

/// Opens or closes a posting. Closed postings reject new applications.
pub async fn set_status(
    state: &AppState,
    actor: &User,
    id: Uuid,
    status: OpportunityStatus,
) -> Result<Opportunity, AppError> {
    let mut opp = get(state, id).await?;
    ensure_owner(actor, &opp)?;
    if opp.status == status {
        return Ok(opp);
    }
    opp.status = status;
    state.store.update_opportunity(&opp).await?;

    let verb = match status {
        OpportunityStatus::Open => "reopened",
        OpportunityStatus::Closed => "closed",
    };
    audit(state, format!("Opportunity {}: {}", verb, opp.title)).await?;
    Ok(opp)
}

/// Hard delete, owner only. Applications go with it.
pub async fn delete_opportunity(state: &AppState, actor: &User, id: Uuid) -> Result<(), AppError> {
    let opp = get(state, id).await?;
    ensure_owner(actor, &opp)?;
    if !state.store.delete_opportunity(id).await? {
        return Err(AppError::NotFound("Opportunity"));
    }
    audit(state, format!("Opportunity deleted: {}", opp.title)).await?;
    debug!(opportunity_id = %id, "opportunity deleted");
    Ok(())
}

pub async fn list_open(state: &AppState) -> Result<Vec<Opportunity>, AppError> {
    let all = state.store.list_opportunities().await?;
    Ok(all.into_iter().filter(Opportunity::is_open).collect())
}

pub async fn list_by_owner(state: &AppState, hr_id: Uuid) -> Result<Vec<Opportunity>, AppError> {
    let all = state.store.list_opportunities().await?;
    Ok(all.into_iter().filter(|o| o.hr_id == hr_id).collect())
}

/// Checks a student against the posting. Advisory only; applying does not enforce it.
pub async fn check_eligibility(
    state: &AppState,
    student: &User,
    opportunity_id: Uuid,
) -> Result<EligibilityReport, AppError> {
    let profile = student.student().ok_or(AppError::Forbidden)?;
    let opp = get(state, opportunity_id).await?;

    let ers = calculate_ers(profile, &state.catalog);
    let open = opp.is_open();
    let major_ok = opp.accepts_major(&profile.major);
    let ers_ok = ers >= opp.min_ers;
    let gpa_ok = profile.gpa_scale.to_four_point(profile.gpa) >= opp.min_gpa;
    let missing_certs: Vec<String> = opp
        .required_certs
        .iter()
        .filter(|rc| !profile.verified_certifications().any(|c| c.name.eq_ignore_ascii_case(rc)))
        .cloned()
        .collect();

    Ok(EligibilityReport {
        eligible: open && major_ok && ers_ok && gpa_ok && missing_certs.is_empty(),
        open,
        major_ok,
        ers_ok,
        gpa_ok,
        missing_certs,
        ers,
        match_score: calculate_match_score(profile, &opp, &state.catalog),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opportunities::repo_types::{OpportunityType, WorkMode};
    use crate::test_support::TestApp;

    fn soc_analyst() -> CreateOpportunityRequest {
        let mut req = CreateOpportunityRequest::new("SOC Analyst", OpportunityType::Coop, WorkMode::Onsite);
        req.required_majors = vec!["Cybersecurity".into()];
        req.skills = vec!["Security".into(), "Networking".into()];
        req
    }

    #[tokio::test]
    async fn create_fans_out_to_matching_majors() {
        let app = TestApp::new();
        let hr = app.hr("hr@aramco.com", "Aramco").await;
        let cyber = app.student("cyber@ksu.edu.sa", "Cybersecurity").await;
        let law = app.student("law@ksu.edu.sa", "Law").await;

        let opp = create_opportunity(&app.state, &hr, soc_analyst()).await.unwrap();
        assert_eq!(opp.company, "Aramco");
        assert_eq!(opp.status, OpportunityStatus::Open);

        assert_eq!(
            app.notification_texts(cyber.id).await,
            vec!["New coop opportunity: SOC Analyst at Aramco".to_string()]
        );
        assert!(app.notification_texts(law.id).await.is_empty());
        assert_eq!(app.last_audit().await, "Opportunity created: SOC Analyst by Aramco");
    }

    #[tokio::test]
    async fn students_cannot_post_and_bad_input_is_rejected() {
        let app = TestApp::new();
        let student = app.student("s@ksu.edu.sa", "Law").await;
        assert!(matches!(
            create_opportunity(&app.state, &student, soc_analyst()).await,
            Err(AppError::Forbidden)
        ));

        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let mut req = soc_analyst();
        req.min_ers = 120;
        assert!(matches!(create_opportunity(&app.state, &hr, req).await, Err(AppError::InvalidInput(_))));
        let mut req = soc_analyst();
        req.title = "   ".into();
        assert!(matches!(create_opportunity(&app.state, &hr, req).await, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn only_the_owner_edits_toggles_and_deletes() {
        let app = TestApp::new();
        let owner = app.hr("owner@neom.com", "NEOM").await;
        let other = app.hr("other@sabic.com", "SABIC").await;
        let admin = app.admin().await;
        let opp = create_opportunity(&app.state, &owner, soc_analyst()).await.unwrap();

        assert!(matches!(
            set_status(&app.state, &other, opp.id, OpportunityStatus::Closed).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            set_status(&app.state, &admin, opp.id, OpportunityStatus::Closed).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            update_opportunity(
                &app.state,
                &admin,
                opp.id,
                UpdateOpportunityRequest { positions: Some(9), ..Default::default() },
            )
            .await,
            Err(AppError::Forbidden)
        ));
        let closed = set_status(&app.state, &owner, opp.id, OpportunityStatus::Closed).await.unwrap();
        assert!(!closed.is_open());
        assert!(list_open(&app.state).await.unwrap().is_empty());

        let updated = update_opportunity(
            &app.state,
            &owner,
            opp.id,
            UpdateOpportunityRequest { positions: Some(3), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.positions, 3);
        assert_eq!(list_by_owner(&app.state, owner.id).await.unwrap().len(), 1);

        assert!(matches!(delete_opportunity(&app.state, &admin, opp.id).await, Err(AppError::Forbidden)));
        delete_opportunity(&app.state, &owner, opp.id).await.unwrap();
        assert!(matches!(get(&app.state, opp.id).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn eligibility_reports_each_requirement() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("e@ksu.edu.sa", "Cybersecurity").await;
        let mut req = soc_analyst();
        req.min_gpa = 3.0;
        req.min_ers = 50;
        req.required_certs = vec!["CEH".into()];
        let opp = create_opportunity(&app.state, &hr, req).await.unwrap();

        let report = check_eligibility(&app.state, &student, opp.id).await.unwrap();
        assert!(report.open && report.major_ok && report.gpa_ok);
        assert!(!report.ers_ok);
        assert_eq!(report.missing_certs, vec!["CEH".to_string()]);
        assert!(!report.eligible);
    }
}
