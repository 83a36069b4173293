//! Employment Readiness Score and per-application match score.
//!
//! Both are pure functions of a profile snapshot. Every consumer (dashboards,
//! matching, leaderboard, eligibility) goes through this module so the weights
//! live in exactly one place.

pub mod catalog;

use serde::Serialize;

pub use catalog::{Catalog, CatalogEntry, DEFAULT_CERTIFICATION_POINTS};

use crate::opportunities::repo_types::Opportunity;
use crate::users::repo_types::StudentProfile;

/// ERS weights: academic, certifications, projects, soft skills, conduct.
pub mod ers_weights {
    pub const ACADEMIC: f64 = 0.40;
    pub const CERTIFICATIONS: f64 = 0.25;
    pub const PROJECTS: f64 = 0.15;
    pub const SOFT_SKILLS: f64 = 0.10;
    pub const CONDUCT: f64 = 0.10;
}

/// Match weights: skills, certifications, ERS, GPA, activities.
pub mod match_weights {
    pub const SKILLS: f64 = 0.40;
    pub const CERTIFICATIONS: f64 = 0.25;
    pub const ERS: f64 = 0.20;
    pub const GPA: f64 = 0.10;
    pub const ACTIVITIES: f64 = 0.05;
}

/// Certification points that count as a full certification sub-score.
pub const CERT_POINTS_FOR_FULL: f64 = 60.0;
/// Points per project.
pub const POINTS_PER_PROJECT: f64 = 25.0;
/// Activity points that count as a full soft-skill sub-score.
pub const ACTIVITY_POINTS_FOR_FULL: f64 = 40.0;
/// Skill sub-score when the opportunity lists no skills.
pub const DEFAULT_SKILL_MATCH: f64 = 80.0;

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

fn round_score(value: f64) -> u8 {
    clamp_score(value.round()) as u8
}

fn soft_skill_score(profile: &StudentProfile) -> f64 {
    clamp_score(100.0 * f64::from(profile.activity_points()) / ACTIVITY_POINTS_FOR_FULL)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErsBreakdown {
    pub academic: f64,
    pub certifications: f64,
    pub projects: f64,
    pub soft_skills: f64,
    pub conduct: f64,
    pub total: u8,
}

pub fn ers_breakdown(profile: &StudentProfile, catalog: &Catalog) -> ErsBreakdown {
    let academic = clamp_score(profile.academic_score);

    let cert_points = profile
        .verified_certifications()
        .fold(0u32, |total, c| total.saturating_add(catalog.certification_points(&c.name)));
    let certifications = clamp_score(100.0 * f64::from(cert_points) / CERT_POINTS_FOR_FULL);

    let projects = clamp_score(POINTS_PER_PROJECT * profile.projects.len() as f64);
    let soft_skills = soft_skill_score(profile);
    let conduct = clamp_score(f64::from(profile.conduct_score()));

    let weighted = ers_weights::ACADEMIC * academic
        + ers_weights::CERTIFICATIONS * certifications
        + ers_weights::PROJECTS * projects
        + ers_weights::SOFT_SKILLS * soft_skills
        + ers_weights::CONDUCT * conduct;

    ErsBreakdown {
        academic,
        certifications,
        projects,
        soft_skills,
        conduct,
        total: round_score(weighted),
    }
}

/// ERS in `0..=100`.
pub fn calculate_ers(profile: &StudentProfile, catalog: &Catalog) -> u8 {
    ers_breakdown(profile, catalog).total
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchBreakdown {
    pub skills: f64,
    pub certifications: f64,
    pub ers: f64,
    pub gpa: f64,
    pub activities: f64,
    pub total: u8,
}

fn skill_match(profile: &StudentProfile, opportunity: &Opportunity) -> f64 {
    if opportunity.skills.is_empty() {
        return DEFAULT_SKILL_MATCH;
    }
    let haystack: Vec<String> = profile
        .verified_certifications()
        .map(|c| c.name.to_lowercase())
        .chain(profile.projects.iter().map(|p| p.to_lowercase()))
        .chain(std::iter::once(profile.major.to_lowercase()))
        .filter(|s| !s.trim().is_empty())
        .collect();

    let matched = opportunity
        .skills
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|skill| !skill.trim().is_empty())
        .filter(|skill| {
            haystack
                .iter()
                .any(|item| item.contains(skill.as_str()) || skill.contains(item.as_str()))
        })
        .count();
    clamp_score(100.0 * matched as f64 / opportunity.skills.len() as f64)
}

fn cert_match(profile: &StudentProfile, opportunity: &Opportunity) -> f64 {
    if opportunity.required_certs.is_empty() {
        return 100.0;
    }
    let matched = opportunity
        .required_certs
        .iter()
        .filter(|required| {
            profile
                .verified_certifications()
                .any(|c| c.name.trim().eq_ignore_ascii_case(required.trim()))
        })
        .count();
    clamp_score(100.0 * matched as f64 / opportunity.required_certs.len() as f64)
}

pub fn match_breakdown(
    profile: &StudentProfile,
    opportunity: &Opportunity,
    catalog: &Catalog,
) -> MatchBreakdown {
    let skills = skill_match(profile, opportunity);
    let certifications = cert_match(profile, opportunity);
    let ers = f64::from(calculate_ers(profile, catalog));
    let gpa = clamp_score(100.0 * profile.gpa_scale.to_four_point(profile.gpa) / 4.0);
    let activities = soft_skill_score(profile);

    let weighted = match_weights::SKILLS * skills
        + match_weights::CERTIFICATIONS * certifications
        + match_weights::ERS * ers
        + match_weights::GPA * gpa
        + match_weights::ACTIVITIES * activities;

    MatchBreakdown {
        skills,
        certifications,
        ers,
        gpa,
        activities,
        total: round_score(weighted),
    }
}

/// Match score in `0..=100`. Computed once per application and stored.
pub fn calculate_match_score(
    profile: &StudentProfile,
    opportunity: &Opportunity,
    catalog: &Catalog,
) -> u8 {
    match_breakdown(profile, opportunity, catalog).total
}
