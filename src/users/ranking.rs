use std::cmp::Ordering;

use crate::error::AppError;
use crate::scoring::{calculate_ers, ers_breakdown, ErsBreakdown};
use crate::state::AppState;
use crate::storage::UserRepo;
use crate::users::dto::{CandidateFilter, CandidateSummary, LeaderboardEntry, LeaderboardQuery, ScopeKind};
use crate::users::repo_types::{Role, StudentProfile, User};

pub const DEFAULT_LEADERBOARD_LIMIT: usize = 50;
pub const MAX_LEADERBOARD_LIMIT: usize = 200;

/// Enabled students paired with their current ERS.
async fn scored_students(state: &AppState) -> Result<Vec<(User, u8)>, AppError> {
    let students = state.store.list_students().await?;
    Ok(students
        .into_iter()
        .filter(|u| !u.disabled)
        .filter_map(|u| {
            let ers = calculate_ers(u.student()?, &state.catalog);
            Some((u, ers))
        })
        .collect())
}

fn by_ers_then_name(a: &(User, u8), b: &(User, u8)) -> Ordering {
    b.1.cmp(&a.1)
        .then_with(|| a.0.name.to_lowercase().cmp(&b.0.name.to_lowercase()))
}

fn same(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Ranks students by ERS. University and major scopes fall back to the
/// caller's own profile when the query leaves them out.
pub async fn leaderboard(
    state: &AppState,
    actor: &User,
    query: &LeaderboardQuery,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let own = actor.student();
    let wanted = match query.scope {
        ScopeKind::National => None,
        ScopeKind::University => {
            let university = query
                .university
                .clone()
                .or_else(|| own.map(|p| p.university.clone()))
                .ok_or_else(|| AppError::invalid("University is required for this scope."))?;
            Some(university)
        }
        ScopeKind::Major => {
            let major = query
                .major
                .clone()
                .or_else(|| own.map(|p| p.major.clone()))
                .ok_or_else(|| AppError::invalid("Major is required for this scope."))?;
            Some(major)
        }
    };
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);

    let mut rows = scored_students(state).await?;
    if let Some(wanted) = &wanted {
        rows.retain(|(u, _)| {
            u.student()
                .map(|p| match query.scope {
                    ScopeKind::University => same(&p.university, wanted),
                    _ => same(&p.major, wanted),
                })
                .unwrap_or(false)
        });
    }
    rows.sort_by(by_ers_then_name);

    Ok(rows
        .into_iter()
        .take(limit)
        .enumerate()
        .filter_map(|(i, (user, ers))| {
            let p = user.student()?;
            Some(LeaderboardEntry {
                rank: i + 1,
                student_id: user.id,
                university: p.university.clone(),
                major: p.major.clone(),
                name: user.name,
                ers,
            })
        })
        .collect())
}

fn matches_filter(user: &User, profile: &StudentProfile, ers: u8, filter: &CandidateFilter) -> bool {
    if let Some(min) = filter.min_ers {
        if ers < min {
            return false;
        }
    }
    if let Some(major) = &filter.major {
        if !same(&profile.major, major) {
            return false;
        }
    }
    if let Some(university) = &filter.university {
        if !same(&profile.university, university) {
            return false;
        }
    }
    if let Some(coop) = filter.coop_eligible {
        if profile.coop_eligible != coop {
            return false;
        }
    }
    match filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        None => true,
        Some(q) => {
            let q = q.to_lowercase();
            user.name.to_lowercase().contains(&q)
                || profile
                    .certifications
                    .iter()
                    .any(|c| c.name.to_lowercase().contains(&q))
        }
    }
}

/// Candidate search for recruiters and staff, best ERS first.
pub async fn search_candidates(
    state: &AppState,
    actor: &User,
    filter: &CandidateFilter,
) -> Result<Vec<CandidateSummary>, AppError> {
    if actor.role() == Role::Student {
        return Err(AppError::Forbidden);
    }
    let mut rows = scored_students(state).await?;
    rows.retain(|(u, ers)| {
        u.student()
            .map(|p| matches_filter(u, p, *ers, filter))
            .unwrap_or(false)
    });
    rows.sort_by(by_ers_then_name);

    Ok(rows
        .into_iter()
        .filter_map(|(user, ers)| {
            let p = user.student()?;
            Some(CandidateSummary {
                student_id: user.id,
                email: user.email.clone(),
                university: p.university.clone(),
                major: p.major.clone(),
                gpa: p.gpa,
                gpa_scale: p.gpa_scale,
                ers,
                verified_certifications: p.verified_certifications().map(|c| c.name.clone()).collect(),
                badges: p.badges.clone(),
                coop_eligible: p.coop_eligible,
                name: user.name,
            })
        })
        .collect())
}

/// ERS sub-scores for the caller's dashboard.
pub fn scorecard(state: &AppState, user: &User) -> Result<ErsBreakdown, AppError> {
    let profile = user.student().ok_or(AppError::Forbidden)?;
    Ok(ers_breakdown(profile, &state.catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use crate::users::repo_types::Certification;

    async fn boost(app: &TestApp, user: &User, academic: f64) {
        let mut user = app.reload(user.id).await;
        user.student_mut().unwrap().academic_score = academic;
        app.state.store.update_user(&user).await.unwrap();
    }

    #[tokio::test]
    async fn leaderboard_orders_by_ers_then_name() {
        let app = TestApp::new();
        app.student("bader@ksu.edu.sa", "Finance").await;
        let a = app.student("amal@ksu.edu.sa", "Finance").await;
        let top = app.student("zain@ksu.edu.sa", "Law").await;
        boost(&app, &top, 90.0).await;

        let board = leaderboard(&app.state, &a, &LeaderboardQuery::default()).await.unwrap();
        let names: Vec<_> = board.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zain", "amal", "bader"]);
        assert_eq!(board[0].rank, 1);
        assert!(board[0].ers > board[1].ers);
        assert_eq!(board[1].ers, board[2].ers);
    }

    #[tokio::test]
    async fn major_scope_defaults_to_callers_major_and_skips_disabled() {
        let app = TestApp::new();
        let me = app.student("me@ksu.edu.sa", "Finance").await;
        app.student("other@ksu.edu.sa", "Law").await;
        let gone = app.student("gone@ksu.edu.sa", "Finance").await;
        let mut gone = app.reload(gone.id).await;
        gone.disabled = true;
        app.state.store.update_user(&gone).await.unwrap();

        let query = LeaderboardQuery { scope: ScopeKind::Major, ..Default::default() };
        let board = leaderboard(&app.state, &me, &query).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].student_id, me.id);

        let hr = app.hr("hr@stc.com.sa", "STC").await;
        assert!(matches!(
            leaderboard(&app.state, &hr, &query).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn candidate_search_filters_by_text_and_ers() {
        let app = TestApp::new();
        let hr = app.hr("hr@aramco.com", "Aramco").await;
        let strong = app.student("noura@ksu.edu.sa", "Cybersecurity").await;
        app.student("fahad@ksu.edu.sa", "Cybersecurity").await;
        boost(&app, &strong, 95.0).await;
        let mut user = app.reload(strong.id).await;
        user.student_mut().unwrap().certifications.push(Certification {
            name: "OSCP".into(),
            external_id: None,
            verified: true,
        });
        app.state.store.update_user(&user).await.unwrap();

        let by_cert = CandidateFilter { q: Some("oscp".into()), ..Default::default() };
        let found = search_candidates(&app.state, &hr, &by_cert).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].verified_certifications, vec!["OSCP".to_string()]);

        let all = search_candidates(&app.state, &hr, &CandidateFilter::default()).await.unwrap();
        assert_eq!(all[0].student_id, strong.id);

        let high = CandidateFilter { min_ers: Some(all[0].ers), ..Default::default() };
        assert_eq!(search_candidates(&app.state, &hr, &high).await.unwrap().len(), 1);

        assert!(matches!(
            search_candidates(&app.state, &strong, &CandidateFilter::default()).await,
            Err(AppError::Forbidden)
        ));
    }
}
