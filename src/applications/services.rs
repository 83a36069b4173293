use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::applications::dto::{ApplicantSort, ApplicantView, MyApplicationView};
use crate::applications::repo_types::{Application, ApplicationStatus};
use crate::error::AppError;
use crate::feed::services::{audit_after_commit, notify_after_commit};
use crate::opportunities::services::{self as opportunities, ensure_manager};
use crate::scoring::{calculate_ers, calculate_match_score};
use crate::state::AppState;
use crate::storage::{ApplicationRepo, OpportunityRepo, StoreError, UserRepo};
use crate::users::repo_types::{Role, User};

pub const SHORTLISTED_BADGE: &str = "Shortlisted";
pub const OFFER_BADGE: &str = "Offer Received";

fn status_text(status: ApplicationStatus) -> &'static str {
    match status {
        ApplicationStatus::Submitted => "Submitted",
        ApplicationStatus::UnderReview => "Under review",
        ApplicationStatus::Shortlisted => "Shortlisted",
        ApplicationStatus::Interviewed => "Marked for interview",
        ApplicationStatus::Accepted => "Accepted",
        ApplicationStatus::Rejected => "Not selected",
    }
}

fn badge_for(status: ApplicationStatus) -> Option<&'static str> {
    match status {
        ApplicationStatus::Shortlisted => Some(SHORTLISTED_BADGE),
        ApplicationStatus::Accepted => Some(OFFER_BADGE),
        _ => None,
    }
}

async fn find(state: &AppState, id: Uuid) -> Result<Application, AppError> {
    state
        .store
        .find_application(id)
        .await?
        .ok_or(AppError::NotFound("Application"))
}

/// Submits an application with its match score frozen at this moment.
///
/// Guards run in order: existing application, missing posting, closed posting.
/// The store's unique key on (student, opportunity) settles concurrent submits.
#[instrument(skip(state, student), fields(student_id = %student.id))]
pub async fn apply_to_opportunity(
    state: &AppState,
    student: &User,
    opportunity_id: Uuid,
) -> Result<Application, AppError> {
    let profile = student.student().ok_or(AppError::Forbidden)?;

    if state
        .store
        .find_application_for(student.id, opportunity_id)
        .await?
        .is_some()
    {
        return Err(AppError::AlreadyApplied);
    }
    let opp = opportunities::get(state, opportunity_id).await?;
    if !opp.is_open() {
        return Err(AppError::OpportunityClosed);
    }

    let application = Application {
        id: Uuid::new_v4(),
        opportunity_id,
        student_id: student.id,
        status: ApplicationStatus::Submitted,
        applied_at: state.clock.now(),
        match_score: calculate_match_score(profile, &opp, &state.catalog),
    };
    match state.store.insert_application(&application).await {
        Ok(()) => {}
        Err(StoreError::Conflict) => return Err(AppError::AlreadyApplied),
        Err(e) => return Err(e.into()),
    }

    notify_after_commit(
        state,
        student.id,
        format!("Application submitted for {} at {}", opp.title, opp.company),
    )
    .await;
    notify_after_commit(
        state,
        opp.hr_id,
        format!("New application for {} from {}", opp.title, student.name),
    )
    .await;
    audit_after_commit(state, format!("Application: {} → {}", student.name, opp.title)).await;

    info!(application_id = %application.id, match_score = application.match_score, "application submitted");
    Ok(application)
}

/// Removes the student's own application while it is still submitted or under review.
#[instrument(skip(state, student), fields(student_id = %student.id))]
pub async fn withdraw_application(
    state: &AppState,
    student: &User,
    application_id: Uuid,
) -> Result<(), AppError> {
    let application = find(state, application_id).await?;
    if application.student_id != student.id {
        return Err(AppError::NotFound("Application"));
    }
    if !application.status.is_withdrawable() {
        return Err(AppError::StateConflict(
            "Application can no longer be withdrawn.".into(),
        ));
    }
    if !state.store.withdraw_application(application_id, student.id).await? {
        warn!(%application_id, "application changed before withdrawal");
        return Err(AppError::StateConflict(
            "Application can no longer be withdrawn.".into(),
        ));
    }

    let title = match state.store.find_opportunity(application.opportunity_id).await {
        Ok(opp) => opp.map(|o| o.title).unwrap_or_default(),
        Err(e) => {
            warn!(%application_id, error = %e, "posting lookup failed after withdrawal");
            String::new()
        }
    };
    audit_after_commit(state, format!("Application withdrawn: {} → {}", student.name, title)).await;
    Ok(())
}

/// Moves an application through review. Accepted and rejected are final.
#[instrument(skip(state, actor), fields(actor_id = %actor.id))]
pub async fn update_application_status(
    state: &AppState,
    actor: &User,
    application_id: Uuid,
    status: ApplicationStatus,
) -> Result<Application, AppError> {
    let mut application = find(state, application_id).await?;
    let opp = opportunities::get(state, application.opportunity_id).await?;
    ensure_manager(actor, &opp)?;

    if !status.is_review_target() {
        return Err(AppError::invalid(format!("Cannot move an application to {}.", status)));
    }
    if !application.status.is_open_for_review() {
        return Err(AppError::StateConflict(format!(
            "Application is already {}.",
            application.status
        )));
    }
    if !state
        .store
        .transition_application(application_id, application.status, status)
        .await?
    {
        return Err(AppError::StateConflict(
            "Application changed; reload and try again.".into(),
        ));
    }
    application.status = status;

    let mut student = match state.store.find_user_by_id(application.student_id).await {
        Ok(Some(student)) => student,
        Ok(None) => return Ok(application),
        Err(e) => {
            warn!(%application_id, error = %e, "student lookup failed after status change");
            return Ok(application);
        }
    };

    notify_after_commit(
        state,
        student.id,
        format!("{} for {} at {}", status_text(status), opp.title, opp.company),
    )
    .await;

    if let Some(badge) = badge_for(status) {
        if let Some(profile) = student.student_mut() {
            if !profile.has_badge(badge) {
                profile.badges.push(badge.to_string());
                if let Err(e) = state.store.update_user(&student).await {
                    warn!(student_id = %student.id, badge, error = %e, "badge not granted");
                }
            }
        }
    }

    audit_after_commit(
        state,
        format!("Application {}: {} for {}", status.describe(), student.name, opp.title),
    )
    .await;
    Ok(application)
}

pub async fn list_for_student(
    state: &AppState,
    student: &User,
) -> Result<Vec<MyApplicationView>, AppError> {
    if student.role() != Role::Student {
        return Err(AppError::Forbidden);
    }
    let applications = state.store.list_applications_by_student(student.id).await?;
    let mut views = Vec::with_capacity(applications.len());
    for application in applications {
        let (title, company) = match state.store.find_opportunity(application.opportunity_id).await? {
            Some(o) => (o.title, o.company),
            None => continue,
        };
        views.push(MyApplicationView {
            application,
            title,
            company,
        });
    }
    Ok(views)
}

/// Applicants for a posting, best first by the chosen key. Owner or admin.
pub async fn list_for_opportunity(
    state: &AppState,
    actor: &User,
    opportunity_id: Uuid,
    sort: ApplicantSort,
) -> Result<Vec<ApplicantView>, AppError> {
    let opp = opportunities::get(state, opportunity_id).await?;
    ensure_manager(actor, &opp)?;

    let applications = state.store.list_applications_by_opportunity(opportunity_id).await?;
    let mut views = Vec::with_capacity(applications.len());
    for application in applications {
        let Some(student) = state.store.find_user_by_id(application.student_id).await? else {
            continue;
        };
        let Some(profile) = student.student() else { continue };
        views.push(ApplicantView {
            ers: calculate_ers(profile, &state.catalog),
            gpa: profile.gpa_scale.to_four_point(profile.gpa),
            major: profile.major.clone(),
            university: profile.university.clone(),
            student_name: student.name.clone(),
            student_email: student.email.clone(),
            application,
        });
    }

    match sort {
        ApplicantSort::MatchScore => {
            views.sort_by(|a, b| b.application.match_score.cmp(&a.application.match_score))
        }
        ApplicantSort::Ers => views.sort_by(|a, b| b.ers.cmp(&a.ers)),
        ApplicantSort::Gpa => views.sort_by(|a, b| b.gpa.total_cmp(&a.gpa)),
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opportunities::dto::CreateOpportunityRequest;
    use crate::opportunities::repo_types::{Opportunity, OpportunityStatus, OpportunityType, WorkMode};
    use crate::opportunities::services::{create_opportunity, delete_opportunity, set_status};
    use crate::storage::MemoryStore;
    use crate::test_support::TestApp;
    use crate::users::repo_types::Certification;
    use std::sync::Arc;

    async fn posting(app: &TestApp, hr: &User) -> Opportunity {
        let mut req = CreateOpportunityRequest::new("Cloud Intern", OpportunityType::Internship, WorkMode::Hybrid);
        req.skills = vec!["AWS".into(), "Python".into()];
        req.required_certs = vec!["AWS Cloud Practitioner".into()];
        create_opportunity(&app.state, hr, req).await.unwrap()
    }

    #[tokio::test]
    async fn apply_notifies_both_sides_and_audits() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("sara@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;

        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();
        assert_eq!(application.status, ApplicationStatus::Submitted);

        assert_eq!(
            app.notification_texts(student.id).await[0],
            "Application submitted for Cloud Intern at STC"
        );
        assert_eq!(
            app.notification_texts(hr.id).await[0],
            "New application for Cloud Intern from sara"
        );
        assert_eq!(app.last_audit().await, "Application: sara → Cloud Intern");
    }

    #[tokio::test]
    async fn match_score_is_frozen_at_submission() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("f@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;

        let submitted = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();

        let mut user = app.reload(student.id).await;
        let profile = user.student_mut().unwrap();
        profile.academic_score = 100.0;
        profile.certifications.push(Certification {
            name: "AWS Cloud Practitioner".into(),
            external_id: None,
            verified: true,
        });
        app.state.store.update_user(&user).await.unwrap();
        assert!(calculate_match_score(user.student().unwrap(), &opp, &app.state.catalog) > submitted.match_score);

        let stored = app.state.store.find_application(submitted.id).await.unwrap().unwrap();
        assert_eq!(stored.match_score, submitted.match_score);
    }

    #[tokio::test]
    async fn second_apply_is_rejected() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("d@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;

        apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();
        let err = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyApplied));
        assert_eq!(app.state.store.list_applications_by_student(student.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_applies_leave_one_record() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("c@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;

        let opp_id = opp.id;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = app.state.clone();
            let student = student.clone();
            handles.push(tokio::spawn(async move {
                apply_to_opportunity(&state, &student, opp_id).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, AppError::AlreadyApplied)),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(app.state.store.list_applications_by_opportunity(opp.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn closed_and_missing_postings() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("x@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;
        set_status(&app.state, &hr, opp.id, OpportunityStatus::Closed).await.unwrap();

        let err = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap_err();
        assert!(matches!(err, AppError::OpportunityClosed));
        assert!(app.state.store.list_applications_by_student(student.id).await.unwrap().is_empty());

        let err = apply_to_opportunity(&app.state, &student, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound("Opportunity")));
    }

    #[tokio::test]
    async fn withdraw_only_before_shortlist() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("w@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;
        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();

        update_application_status(&app.state, &hr, application.id, ApplicationStatus::Shortlisted)
            .await
            .unwrap();
        let err = withdraw_application(&app.state, &student, application.id).await.unwrap_err();
        assert!(matches!(err, AppError::StateConflict(_)));

        let accepted =
            update_application_status(&app.state, &hr, application.id, ApplicationStatus::Accepted)
                .await
                .unwrap();
        assert_eq!(accepted.status, ApplicationStatus::Accepted);

        let badges = app.reload(student.id).await.student().unwrap().badges.clone();
        assert_eq!(badges, vec![SHORTLISTED_BADGE.to_string(), OFFER_BADGE.to_string()]);
        assert_eq!(
            app.notification_texts(student.id).await[0],
            "Accepted for Cloud Intern at STC"
        );
    }

    #[tokio::test]
    async fn withdraw_removes_submitted_application() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("r@ksu.edu.sa", "Computer Science").await;
        let other = app.student("o@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;
        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();

        assert!(matches!(
            withdraw_application(&app.state, &other, application.id).await,
            Err(AppError::NotFound(_))
        ));
        withdraw_application(&app.state, &student, application.id).await.unwrap();
        assert!(app.state.store.find_application(application.id).await.unwrap().is_none());
        // can apply again after withdrawing
        apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();
    }

    #[tokio::test]
    async fn final_states_and_permissions() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let rival = app.hr("hr@zain.com", "Zain").await;
        let student = app.student("p@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;
        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();

        assert!(matches!(
            update_application_status(&app.state, &rival, application.id, ApplicationStatus::Rejected).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            update_application_status(&app.state, &hr, application.id, ApplicationStatus::Submitted).await,
            Err(AppError::InvalidInput(_))
        ));
        update_application_status(&app.state, &hr, application.id, ApplicationStatus::Rejected)
            .await
            .unwrap();
        assert!(matches!(
            update_application_status(&app.state, &hr, application.id, ApplicationStatus::Accepted).await,
            Err(AppError::StateConflict(_))
        ));
        assert_eq!(
            app.notification_texts(student.id).await[0],
            "Not selected for Cloud Intern at STC"
        );
    }

    #[tokio::test]
    async fn feed_outage_does_not_fail_stored_changes() {
        let store = Arc::new(MemoryStore::new());
        let app = TestApp::on_store(store.clone());
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("outage@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;

        store.break_feed();
        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();
        assert!(app
            .state
            .store
            .find_application_for(student.id, opp.id)
            .await
            .unwrap()
            .is_some());
        assert!(matches!(
            apply_to_opportunity(&app.state, &student, opp.id).await,
            Err(AppError::AlreadyApplied)
        ));

        let moved = update_application_status(&app.state, &hr, application.id, ApplicationStatus::Shortlisted)
            .await
            .unwrap();
        assert_eq!(moved.status, ApplicationStatus::Shortlisted);
        assert!(app.reload(student.id).await.student().unwrap().has_badge(SHORTLISTED_BADGE));
    }

    #[tokio::test]
    async fn under_review_reads_naturally() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("ur@ksu.edu.sa", "Computer Science").await;
        let opp = posting(&app, &hr).await;
        let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();

        update_application_status(&app.state, &hr, application.id, ApplicationStatus::UnderReview)
            .await
            .unwrap();
        assert_eq!(
            app.notification_texts(student.id).await[0],
            "Under review for Cloud Intern at STC"
        );
        assert_eq!(app.last_audit().await, "Application under review: ur for Cloud Intern");
    }

    #[tokio::test]
    async fn shortlisted_badge_granted_once() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let student = app.student("b@ksu.edu.sa", "Computer Science").await;
        let first = posting(&app, &hr).await;
        let second = posting(&app, &hr).await;

        for opp in [&first, &second] {
            let application = apply_to_opportunity(&app.state, &student, opp.id).await.unwrap();
            update_application_status(&app.state, &hr, application.id, ApplicationStatus::Shortlisted)
                .await
                .unwrap();
        }
        let badges = app.reload(student.id).await.student().unwrap().badges.clone();
        assert_eq!(badges, vec![SHORTLISTED_BADGE.to_string()]);
    }

    #[tokio::test]
    async fn applicants_sorted_and_deleted_with_posting() {
        let app = TestApp::new();
        let hr = app.hr("hr@stc.com.sa", "STC").await;
        let weak = app.student("weak@ksu.edu.sa", "Law").await;
        let strong = app.student("strong@ksu.edu.sa", "Computer Science").await;
        let mut user = app.reload(strong.id).await;
        user.student_mut().unwrap().projects.push("Python AWS pipeline".into());
        app.state.store.update_user(&user).await.unwrap();
        let strong = app.reload(strong.id).await;

        let opp = posting(&app, &hr).await;
        apply_to_opportunity(&app.state, &weak, opp.id).await.unwrap();
        apply_to_opportunity(&app.state, &strong, opp.id).await.unwrap();

        let list = list_for_opportunity(&app.state, &hr, opp.id, ApplicantSort::MatchScore)
            .await
            .unwrap();
        assert_eq!(list[0].application.student_id, strong.id);
        assert!(list[0].application.match_score > list[1].application.match_score);

        assert!(matches!(
            list_for_opportunity(&app.state, &weak, opp.id, ApplicantSort::Ers).await,
            Err(AppError::Forbidden)
        ));

        delete_opportunity(&app.state, &hr, opp.id).await.unwrap();
        assert!(list_for_student(&app.state, &weak).await.unwrap().is_empty());
    }
}
