//! Partnership health scoring (C6): a single 0..=100 number
//! summarizing how well a partnership is going, recomputed
//! periodically and edge-triggering a `HealthAtRisk` event the first
//! time it drops below the at-risk threshold.

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use accountability_shared::errors::{AppError, AppResult, ErrorCode};
use accountability_shared::types::ids::{PartnershipId, UserId};

use crate::checkin;
use crate::config::AppConfig;
use crate::models::{NewHealthEventRow, PartnershipRow};
use crate::schema::{health_events, partnerships};

/// Health below this is considered "at risk" (§4.6).
pub const AT_RISK_THRESHOLD: i16 = 40;

const RECENCY_WEIGHT: f64 = 40.0;
const BALANCE_WEIGHT: f64 = 25.0;
const ACCOUNTABILITY_WEIGHT: f64 = 20.0;
const STREAK_WEIGHT: f64 = 15.0;

/// Days of silence after which the recency factor bottoms out at zero.
const RECENCY_HORIZON_DAYS: f64 = 14.0;
/// Streak length at which the streak factor saturates at 1.0.
const STREAK_SATURATION_DAYS: f64 = 14.0;

/// Recency factor: `max(0, 1 − daysSinceLastActivity/14)` (§4.6). No
/// recorded activity at all is treated as maximally stale.
fn recency_factor(last_activity_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last) = last_activity_at else { return 0.0 };
    let days_since = (now - last).num_seconds() as f64 / 86_400.0;
    (1.0 - days_since / RECENCY_HORIZON_DAYS).max(0.0)
}

/// Balance factor: `1 − |accountability(A) − accountability(B)|/100`
/// (§4.6) — two participants with near-identical accountability
/// scores are "balanced" regardless of how high or low that shared
/// score is.
fn balance_factor(accountability_a: f64, accountability_b: f64) -> f64 {
    1.0 - (accountability_a - accountability_b).abs() / 100.0
}

/// Average-accountability factor: `(accountability(A)+accountability(B))/200`.
fn avg_accountability_factor(accountability_a: f64, accountability_b: f64) -> f64 {
    (accountability_a + accountability_b) / 200.0
}

/// Streak factor: `min(1, currentStreak/14)` (§4.6).
fn streak_factor(current_streak: i32) -> f64 {
    (current_streak as f64 / STREAK_SATURATION_DAYS).min(1.0)
}

/// Recomputes and persists one partnership's health, only if it is
/// due (older than `health.recomputeInterval`, or never computed).
/// Returns `None` if recompute was skipped because it isn't due yet.
pub fn recompute_if_due(conn: &mut PgConnection, partnership_id: PartnershipId, config: &AppConfig, now: DateTime<Utc>) -> AppResult<Option<(i16, bool)>> {
    let p = partnerships::table
        .find(partnership_id.0)
        .first::<PartnershipRow>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::not_found(ErrorCode::PartnershipNotFound, "no such partnership"))?;

    let due = match p.health_recomputed_at {
        None => true,
        Some(last) => (now - last).num_seconds() >= config.health_recompute_interval_secs,
    };
    if !due {
        return Ok(None);
    }

    let today = now.date_naive();
    let window_days = config.accountability_window_days;

    let acc_a = checkin::accountability_score(conn, partnership_id, UserId(p.user_a_id), window_days, today).unwrap_or(0) as f64;
    let acc_b = checkin::accountability_score(conn, partnership_id, UserId(p.user_b_id), window_days, today).unwrap_or(0) as f64;

    let recency = recency_factor(p.last_activity_at, now);
    let balance = balance_factor(acc_a, acc_b);
    let avg_accountability = avg_accountability_factor(acc_a, acc_b);
    let streak = streak_factor(p.current_streak);

    let health = (RECENCY_WEIGHT * recency + BALANCE_WEIGHT * balance + ACCOUNTABILITY_WEIGHT * avg_accountability + STREAK_WEIGHT * streak)
        .round()
        .clamp(0.0, 100.0) as i16;

    let was_at_risk = p.health_at_risk;
    let now_at_risk = health < AT_RISK_THRESHOLD;

    diesel::update(partnerships::table.find(partnership_id.0))
        .set((
            partnerships::health.eq(health),
            partnerships::health_recomputed_at.eq(now),
            partnerships::health_at_risk.eq(now_at_risk),
        ))
        .execute(conn)
        .map_err(AppError::Database)?;

    diesel::insert_into(health_events::table)
        .values(&NewHealthEventRow { id: Uuid::new_v4(), partnership_id: partnership_id.0, health, created_at: now })
        .execute(conn)
        .map_err(AppError::Database)?;

    // Edge-triggered: only report "newly at risk", not "still at
    // risk" on every recompute, so consumers don't get paged repeatedly
    // for a partnership that never recovers.
    let newly_at_risk = now_at_risk && !was_at_risk;

    Ok(Some((health, newly_at_risk)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_is_full_marks_immediately_after_activity() {
        let now = Utc::now();
        assert_eq!(recency_factor(Some(now), now), 1.0);
    }

    #[test]
    fn recency_decays_to_zero_at_the_fourteen_day_horizon() {
        let now = Utc::now();
        let stale = now - Duration::days(14);
        assert_eq!(recency_factor(Some(stale), now), 0.0);
        let way_stale = now - Duration::days(30);
        assert_eq!(recency_factor(Some(way_stale), now), 0.0);
    }

    #[test]
    fn recency_is_zero_with_no_activity() {
        assert_eq!(recency_factor(None, Utc::now()), 0.0);
    }

    #[test]
    fn balance_is_perfect_when_scores_match() {
        assert_eq!(balance_factor(70.0, 70.0), 1.0);
    }

    #[test]
    fn balance_drops_as_scores_diverge() {
        assert!(balance_factor(90.0, 10.0) < balance_factor(60.0, 40.0));
    }

    #[test]
    fn streak_factor_caps_at_fourteen_days() {
        assert_eq!(streak_factor(14), 1.0);
        assert_eq!(streak_factor(60), 1.0);
        assert!(streak_factor(7) < 1.0);
    }

    /// Literal scenario S6: last activity 10 days ago, accountability
    /// 30/20, streak 0 → health ≈ 38.9, landing in the `<40` at-risk band.
    #[test]
    fn scenario_s6_health_at_risk_matches_the_spec_example() {
        let now = Utc::now();
        let last_activity = now - Duration::days(10);

        let recency = recency_factor(Some(last_activity), now);
        let balance = balance_factor(30.0, 20.0);
        let avg_accountability = avg_accountability_factor(30.0, 20.0);
        let streak = streak_factor(0);

        let health = RECENCY_WEIGHT * recency + BALANCE_WEIGHT * balance + ACCOUNTABILITY_WEIGHT * avg_accountability + STREAK_WEIGHT * streak;

        assert!((health - 38.93).abs() < 0.1, "expected ~38.9, got {health}");
        assert!(health < AT_RISK_THRESHOLD as f64);
    }
}
