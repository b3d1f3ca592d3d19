//! Pure compatibility scoring (C2). No I/O: every function here is a
//! plain computation over `UserPreferences`, which keeps the matching
//! pass in `queue.rs` testable without a database.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use accountability_shared::types::ids::UserId;

use crate::preferences::{CommunicationStyle, UserPreferences};

pub const WEIGHT_TIMEZONE: f64 = 0.25;
pub const WEIGHT_INTERESTS: f64 = 0.20;
pub const WEIGHT_GOALS: f64 = 0.20;
pub const WEIGHT_SCHEDULE: f64 = 0.15;
pub const WEIGHT_COMMUNICATION: f64 = 0.10;
pub const WEIGHT_PERSONALITY: f64 = 0.10;

/// Minimum total score (§4.2) for a pair to be proposed automatically
/// by the matching pass. Below this, a pair is never surfaced.
pub const MINIMUM_ACCEPTABLE: f64 = 0.6;

/// Jaccard similarity for two empty sets is defined as neutral (0.5)
/// rather than 1.0 or 0.0, since "both have no interests listed" is
/// not evidence of either compatibility or incompatibility.
const EMPTY_SET_NEUTRAL: f64 = 0.5;

/// Personality similarity never drops below this floor — two users
/// with completely disjoint personality tags are still compatible
/// enough to be matched on other factors (§4.2 edge case).
const PERSONALITY_FLOOR: f64 = 0.3;

/// Called once at boot (from `AppConfig::assert_valid`) so a broken
/// weight table fails fast instead of silently mis-scoring every pair.
pub fn assert_weights_sum_to_one() {
    let total = WEIGHT_TIMEZONE
        + WEIGHT_INTERESTS
        + WEIGHT_GOALS
        + WEIGHT_SCHEDULE
        + WEIGHT_COMMUNICATION
        + WEIGHT_PERSONALITY;
    assert!(
        (total - 1.0).abs() < 1e-9,
        "compatibility weights must sum to 1.0, got {total}"
    );
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompatibilityBreakdown {
    pub timezone: f64,
    pub interests: f64,
    pub goals: f64,
    pub schedule: f64,
    pub communication: f64,
    pub personality: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub total: f64,
    pub breakdown: CompatibilityBreakdown,
}

impl CompatibilityScore {
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.total >= threshold
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return EMPTY_SET_NEUTRAL;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        EMPTY_SET_NEUTRAL
    } else {
        intersection as f64 / union as f64
    }
}

/// 4x4 symmetric compatibility matrix over [`CommunicationStyle`], per
/// the literal values in §GLOSSARY. Matching styles score 1.0;
/// `Balanced` is the mediator and scores highest against everything;
/// the sharpest clash is Direct vs Supportive.
fn communication_compatibility(a: CommunicationStyle, b: CommunicationStyle) -> f64 {
    use CommunicationStyle::*;

    const MATRIX: [[f64; 4]; 4] = [
        // Direct, Supportive, Balanced, Analytical
        [1.0, 0.5, 0.7, 0.8], // Direct
        [0.5, 1.0, 0.9, 0.6], // Supportive
        [0.7, 0.9, 1.0, 0.8], // Balanced
        [0.8, 0.6, 0.8, 1.0], // Analytical
    ];

    fn index(style: CommunicationStyle) -> usize {
        match style {
            Direct => 0,
            Supportive => 1,
            Balanced => 2,
            Analytical => 3,
        }
    }

    MATRIX[index(a)][index(b)]
}

/// Offset-from-UTC, in whole hours, for a timezone at a given instant.
/// Resolved "at the current instant" (rather than a fixed reference
/// date) so DST transitions are reflected at evaluation time.
fn utc_offset_hours(tz_name: &str, at: DateTime<Utc>) -> f64 {
    use chrono::Offset;
    let tz: chrono_tz::Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    let offset = tz.offset_from_utc_datetime(&at.naive_utc());
    offset.fix().local_minus_utc() as f64 / 3600.0
}

fn timezone_factor(a: &UserPreferences, b: &UserPreferences, at: DateTime<Utc>) -> f64 {
    let diff = (utc_offset_hours(&a.timezone, at) - utc_offset_hours(&b.timezone, at)).abs();
    (1.0 - diff / 12.0).clamp(0.0, 1.0)
}

/// Fraction of the week (in minutes) that both working-hour maps
/// overlap, divided by the smaller of the two totals (§4.2): the side
/// with less declared availability sets the ceiling, so a user who is
/// only free 2 hours a week can still score 1.0 against a partner who
/// is free all of those 2 hours and more besides.
fn schedule_factor(a: &UserPreferences, b: &UserPreferences) -> f64 {
    let mut overlap_minutes: u32 = 0;

    let days: BTreeSet<_> = a.working_hours.keys().chain(b.working_hours.keys()).copied().collect();
    for day in days {
        let empty = Vec::new();
        let a_intervals = a.working_hours.get(&day).unwrap_or(&empty);
        let b_intervals = b.working_hours.get(&day).unwrap_or(&empty);

        for ai in a_intervals {
            for bi in b_intervals {
                let start = ai.start_minutes.max(bi.start_minutes);
                let end = ai.end_minutes.min(bi.end_minutes);
                if end > start {
                    overlap_minutes += (end - start) as u32;
                }
            }
        }
    }

    let smaller_total = a.total_weekly_minutes().min(b.total_weekly_minutes());
    if smaller_total == 0 {
        return EMPTY_SET_NEUTRAL;
    }
    (overlap_minutes as f64 / smaller_total as f64).clamp(0.0, 1.0)
}

pub fn score(a: &UserPreferences, b: &UserPreferences, at: DateTime<Utc>) -> CompatibilityScore {
    let timezone = timezone_factor(a, b, at);
    let interests = jaccard(&a.interests, &b.interests);
    let goals = jaccard(&a.focus_goals, &b.focus_goals);
    let schedule = schedule_factor(a, b);
    let communication = communication_compatibility(a.communication_style, b.communication_style);
    let personality = jaccard(&a.personality_tags, &b.personality_tags).max(PERSONALITY_FLOOR);

    let total = WEIGHT_TIMEZONE * timezone
        + WEIGHT_INTERESTS * interests
        + WEIGHT_GOALS * goals
        + WEIGHT_SCHEDULE * schedule
        + WEIGHT_COMMUNICATION * communication
        + WEIGHT_PERSONALITY * personality;

    CompatibilityScore {
        total: total.clamp(0.0, 1.0),
        breakdown: CompatibilityBreakdown {
            timezone,
            interests,
            goals,
            schedule,
            communication,
            personality,
        },
    }
}

/// Seam for swapping the scoring algorithm without touching the
/// queue/matching-pass call sites (Design Notes §9: "pluggable scoring
/// interface suggested"). `RuleBasedScorer` is the only implementation;
/// an ML-backed scorer is unspecified and not built here.
pub trait CompatibilityScorer: Send + Sync {
    fn score(&self, a: &UserPreferences, b: &UserPreferences, at: DateTime<Utc>) -> CompatibilityScore;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedScorer;

impl CompatibilityScorer for RuleBasedScorer {
    fn score(&self, a: &UserPreferences, b: &UserPreferences, at: DateTime<Utc>) -> CompatibilityScore {
        score(a, b, at)
    }
}

/// A scored candidate pairing, used by the matching pass (C3) to rank
/// and deduplicate proposals within a timezone bucket.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub user_id: UserId,
    pub other_id: UserId,
    pub score: CompatibilityScore,
}

/// Orders candidates so the matching pass's greedy pairing always
/// picks deterministically among ties: highest total score first,
/// then highest schedule overlap, then smallest timezone gap, then
/// lexicographically smallest pair of user ids.
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total
        .partial_cmp(&a.score.total)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            b.score
                .breakdown
                .schedule
                .partial_cmp(&a.score.breakdown.schedule)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| {
            a.score
                .breakdown
                .timezone
                .partial_cmp(&b.score.breakdown.timezone)
                .unwrap_or(Ordering::Equal)
                .reverse()
        })
        .then_with(|| (a.user_id.0, a.other_id.0).cmp(&(b.user_id.0, b.other_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preferences::{ExperienceLevel, TimeInterval, WorkingHours};
    use chrono::Weekday;
    use uuid::Uuid;

    fn prefs(id: u128, tz: &str, interests: &[&str]) -> UserPreferences {
        UserPreferences {
            user_id: UserId(Uuid::from_u128(id)),
            timezone: tz.to_string(),
            working_hours: WorkingHours::new(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            focus_goals: BTreeSet::new(),
            communication_style: CommunicationStyle::Balanced,
            experience_level: ExperienceLevel::Intermediate,
            personality_tags: BTreeSet::new(),
            preferred_session_duration_minutes: 30,
            max_concurrent_partners: 3,
            available: true,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn weights_sum_to_one() {
        assert_weights_sum_to_one();
    }

    #[test]
    fn total_is_bounded_and_symmetric() {
        let a = prefs(1, "America/New_York", &["rust", "running"]);
        let b = prefs(2, "Europe/Berlin", &["rust", "reading"]);
        let at = Utc::now();

        let ab = score(&a, &b, at);
        let ba = score(&b, &a, at);

        assert!((0.0..=1.0).contains(&ab.total));
        assert!((ab.total - ba.total).abs() < 1e-9);
    }

    #[test]
    fn identical_preferences_score_maximally_on_shared_factors() {
        let a = prefs(1, "Europe/London", &["rust", "chess"]);
        let mut b = prefs(2, "Europe/London", &["rust", "chess"]);
        b.communication_style = a.communication_style;

        let s = score(&a, &b, Utc::now());
        assert_eq!(s.breakdown.timezone, 1.0);
        assert_eq!(s.breakdown.interests, 1.0);
        assert_eq!(s.breakdown.communication, 1.0);
    }

    #[test]
    fn empty_interests_are_neutral_not_zero() {
        let a = prefs(1, "UTC", &[]);
        let b = prefs(2, "UTC", &[]);
        let s = score(&a, &b, Utc::now());
        assert_eq!(s.breakdown.interests, EMPTY_SET_NEUTRAL);
    }

    #[test]
    fn personality_similarity_never_drops_below_floor() {
        let mut a = prefs(1, "UTC", &[]);
        let mut b = prefs(2, "UTC", &[]);
        a.personality_tags = ["introvert".to_string()].into();
        b.personality_tags = ["extrovert".to_string()].into();
        let s = score(&a, &b, Utc::now());
        assert!(s.breakdown.personality >= PERSONALITY_FLOOR);
    }

    #[test]
    fn rank_prefers_higher_total_score() {
        let hi = Candidate {
            user_id: UserId(Uuid::from_u128(1)),
            other_id: UserId(Uuid::from_u128(2)),
            score: CompatibilityScore {
                total: 0.9,
                breakdown: CompatibilityBreakdown {
                    timezone: 1.0,
                    interests: 1.0,
                    goals: 1.0,
                    schedule: 1.0,
                    communication: 1.0,
                    personality: 1.0,
                },
            },
        };
        let lo = Candidate { score: CompatibilityScore { total: 0.5, ..hi.score }, ..hi };
        assert_eq!(rank(&hi, &lo), Ordering::Less);
    }

    #[test]
    fn schedule_factor_rewards_overlapping_hours() {
        let mut a = prefs(1, "UTC", &[]);
        let mut b = prefs(2, "UTC", &[]);
        a.working_hours.insert(Weekday::Mon, vec![TimeInterval { start_minutes: 540, end_minutes: 600 }]);
        b.working_hours.insert(Weekday::Mon, vec![TimeInterval { start_minutes: 540, end_minutes: 600 }]);
        let overlapping = schedule_factor(&a, &b);

        let mut c = prefs(3, "UTC", &[]);
        c.working_hours.insert(Weekday::Mon, vec![TimeInterval { start_minutes: 0, end_minutes: 60 }]);
        let disjoint = schedule_factor(&a, &c);

        assert!(overlapping > disjoint);
    }
}
