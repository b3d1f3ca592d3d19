//! Check-in submission, streak tracking, and the accountability score
//! (C5). Daily and weekly check-ins are deduplicated at the database
//! layer via a unique constraint on `(partnership_id, author_user_id,
//! local_date)` for daily and `(partnership_id, author_user_id,
//! iso_week)` for weekly — `kind` disambiguates the two families.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use accountability_shared::errors::{AppError, AppResult, ErrorCode};
use accountability_shared::types::ids::{PartnershipId, UserId};

use crate::models::{CheckInRow, NewCheckInRow, NewStreakStateRow, StreakStateRow};
use crate::partnership::{self, PartnershipStatus};
use crate::preferences;
use crate::schema::{check_ins, streak_state};

pub const KIND_DAILY: &str = "DAILY";
pub const KIND_WEEKLY: &str = "WEEKLY";

/// Hard cap on `notes`, per §3 (`notes (free text ≤ 2 KB)`).
const MAX_NOTES_BYTES: usize = 2 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct CheckInInput {
    pub mood: i16,
    pub energy: i16,
    pub productivity: i16,
    pub stress: i16,
}

impl CheckInInput {
    fn validate(&self) -> AppResult<()> {
        for (name, v) in [("mood", self.mood), ("energy", self.energy), ("productivity", self.productivity), ("stress", self.stress)] {
            if !(1..=10).contains(&v) {
                return Err(AppError::invalid(ErrorCode::InvalidPreferencesForScoring, format!("{name} must be in 1..=10")));
            }
        }
        Ok(())
    }
}

fn validate_notes(notes: &str) -> AppResult<()> {
    if notes.len() > MAX_NOTES_BYTES {
        return Err(AppError::invalid(ErrorCode::InvalidPreferencesForScoring, "notes must be at most 2KB"));
    }
    Ok(())
}

fn iso_week_key(date: NaiveDate) -> String {
    let iso = date.iso_week();
    format!("{:04}-W{:02}", iso.year(), iso.week())
}

/// Resolves `createdAt` into the author's local calendar date (§4.5:
/// `d = local-date(createdAt, authorTimezone)`), so the streak and
/// dedup keys track the day as the author experiences it rather than
/// the server's UTC day.
fn author_local_date(conn: &mut PgConnection, author: UserId, created_at: DateTime<Utc>) -> AppResult<NaiveDate> {
    let prefs = preferences::get_preferences(conn, author)?;
    let tz: chrono_tz::Tz = prefs.timezone.parse().unwrap_or(chrono_tz::UTC);
    Ok(created_at.with_timezone(&tz).date_naive())
}

fn submit(
    conn: &mut PgConnection,
    partnership_id: PartnershipId,
    author: UserId,
    kind: &str,
    input: CheckInInput,
    notes: String,
    now: DateTime<Utc>,
) -> AppResult<CheckInRow> {
    input.validate()?;
    validate_notes(&notes)?;

    let p = partnership::get(conn, partnership_id)?;
    if p.user_a_id != author.0 && p.user_b_id != author.0 {
        return Err(AppError::forbidden(ErrorCode::NotParticipant, "not a participant in this partnership"));
    }
    let status = PartnershipStatus::parse(&p.status)?;
    if !matches!(status, PartnershipStatus::Active) {
        return Err(AppError::conflict(ErrorCode::CheckInWrongState, "partnership is not active"));
    }

    let local_date = author_local_date(conn, author, now)?;
    let iso_week = iso_week_key(local_date);

    let duplicate = match kind {
        KIND_DAILY => check_ins::table
            .filter(check_ins::partnership_id.eq(partnership_id.0))
            .filter(check_ins::author_user_id.eq(author.0))
            .filter(check_ins::kind.eq(KIND_DAILY))
            .filter(check_ins::local_date.eq(local_date))
            .first::<CheckInRow>(conn)
            .optional()
            .map_err(AppError::Database)?,
        _ => check_ins::table
            .filter(check_ins::partnership_id.eq(partnership_id.0))
            .filter(check_ins::author_user_id.eq(author.0))
            .filter(check_ins::kind.eq(KIND_WEEKLY))
            .filter(check_ins::iso_week.eq(&iso_week))
            .first::<CheckInRow>(conn)
            .optional()
            .map_err(AppError::Database)?,
    };

    if duplicate.is_some() {
        return Err(AppError::conflict(ErrorCode::DuplicateCheckIn, "already checked in for this period"));
    }

    let row = diesel::insert_into(check_ins::table)
        .values(&NewCheckInRow {
            id: Uuid::new_v4(),
            partnership_id: partnership_id.0,
            author_user_id: author.0,
            kind: kind.to_string(),
            mood: input.mood,
            energy: input.energy,
            productivity: input.productivity,
            stress: input.stress,
            notes,
            local_date,
            iso_week,
            created_at: now,
        })
        .get_result::<CheckInRow>(conn)
        .map_err(AppError::Database)?;

    diesel::update(crate::schema::partnerships::table.find(partnership_id.0))
        .set(crate::schema::partnerships::last_activity_at.eq(now))
        .execute(conn)
        .map_err(AppError::Database)?;

    if kind == KIND_DAILY {
        update_streak(conn, partnership_id, author, local_date)?;
    }

    Ok(row)
}

pub fn submit_daily(
    conn: &mut PgConnection,
    partnership_id: PartnershipId,
    author: UserId,
    input: CheckInInput,
    notes: String,
    now: DateTime<Utc>,
) -> AppResult<CheckInRow> {
    submit(conn, partnership_id, author, KIND_DAILY, input, notes, now)
}

pub fn submit_weekly(
    conn: &mut PgConnection,
    partnership_id: PartnershipId,
    author: UserId,
    input: CheckInInput,
    notes: String,
    now: DateTime<Utc>,
) -> AppResult<CheckInRow> {
    submit(conn, partnership_id, author, KIND_WEEKLY, input, notes, now)
}

/// Streak rule (§4.5): a daily check-in on the day immediately after
/// the last one extends the streak; a gap of more than one day resets
/// it to 1; a same-day check-in (already prevented by the uniqueness
/// constraint) would be a no-op.
fn update_streak(conn: &mut PgConnection, partnership_id: PartnershipId, user_id: UserId, local_date: NaiveDate) -> AppResult<StreakStateRow> {
    let existing = streak_state::table
        .find((partnership_id.0, user_id.0))
        .first::<StreakStateRow>(conn)
        .optional()
        .map_err(AppError::Database)?;

    let (current, longest) = match existing {
        Some(row) => match row.last_check_in_date {
            Some(last) if last == local_date - Duration::days(1) => (row.current + 1, row.longest.max(row.current + 1)),
            Some(last) if last == local_date => (row.current, row.longest),
            _ => (1, row.longest.max(1)),
        },
        None => (1, 1),
    };

    let new_row = NewStreakStateRow {
        partnership_id: partnership_id.0,
        user_id: user_id.0,
        current,
        longest,
        last_check_in_date: Some(local_date),
    };

    diesel::insert_into(streak_state::table)
        .values(&new_row)
        .on_conflict((streak_state::partnership_id, streak_state::user_id))
        .do_update()
        .set(&new_row)
        .get_result::<StreakStateRow>(conn)
        .map_err(AppError::Database)
}

pub fn get_streak(conn: &mut PgConnection, partnership_id: PartnershipId, user_id: UserId) -> AppResult<StreakStateRow> {
    streak_state::table
        .find((partnership_id.0, user_id.0))
        .first::<StreakStateRow>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::not_found(ErrorCode::PartnershipNotFound, "no streak recorded for this user"))
}

/// Resets every streak whose `last_check_in_date` is more than one day
/// stale, relative to `today`. Run by the daily `streak-decay` job
/// (§4.7) so a missed day is reflected even if the user never submits
/// another check-in to trigger the reset inline.
pub fn decay_stale_streaks(conn: &mut PgConnection, today: NaiveDate) -> AppResult<usize> {
    let cutoff = today - Duration::days(1);
    diesel::update(streak_state::table.filter(streak_state::last_check_in_date.lt(cutoff)).filter(streak_state::current.gt(0)))
        .set(streak_state::current.eq(0))
        .execute(conn)
        .map_err(AppError::Database)
}

/// The 0..=100 accountability score over the trailing window (§4.5):
/// 70% weight on the fraction of days with a daily check-in, 30% on
/// the fraction of weeks with a weekly check-in.
pub fn accountability_score(conn: &mut PgConnection, partnership_id: PartnershipId, user_id: UserId, window_days: i64, today: NaiveDate) -> AppResult<u8> {
    let window_start = today - Duration::days(window_days);

    let daily_count: i64 = check_ins::table
        .filter(check_ins::partnership_id.eq(partnership_id.0))
        .filter(check_ins::author_user_id.eq(user_id.0))
        .filter(check_ins::kind.eq(KIND_DAILY))
        .filter(check_ins::local_date.gt(window_start))
        .count()
        .get_result(conn)
        .map_err(AppError::Database)?;

    let weekly_count: i64 = check_ins::table
        .filter(check_ins::partnership_id.eq(partnership_id.0))
        .filter(check_ins::author_user_id.eq(user_id.0))
        .filter(check_ins::kind.eq(KIND_WEEKLY))
        .filter(check_ins::local_date.gt(window_start))
        .count()
        .get_result(conn)
        .map_err(AppError::Database)?;

    let expected_weeks = ((window_days as f64) / 7.0).ceil().max(1.0);
    let daily_rate = (daily_count as f64 / window_days.max(1) as f64).clamp(0.0, 1.0);
    let weekly_rate = (weekly_count as f64 / expected_weeks).clamp(0.0, 1.0);

    let score = (0.7 * daily_rate + 0.3 * weekly_rate) * 100.0;
    Ok(score.round().clamp(0.0, 100.0) as u8)
}

/// An inclusive local-date window for `list`. `None` on either side
/// means unbounded in that direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Lists check-ins for a partnership, visible only to its two
/// participants (§3 Ownership: "CheckIns are owned by their author but
/// visible to the other participant"), newest first.
pub fn list(conn: &mut PgConnection, partnership_id: PartnershipId, viewer: UserId, range: DateRange) -> AppResult<Vec<CheckInRow>> {
    let p = partnership::get(conn, partnership_id)?;
    if p.user_a_id != viewer.0 && p.user_b_id != viewer.0 {
        return Err(AppError::forbidden(ErrorCode::NotParticipant, "not a participant in this partnership"));
    }

    let mut query = check_ins::table.filter(check_ins::partnership_id.eq(partnership_id.0)).into_boxed();
    if let Some(from) = range.from {
        query = query.filter(check_ins::local_date.ge(from));
    }
    if let Some(to) = range.to {
        query = query.filter(check_ins::local_date.le(to));
    }

    query.order(check_ins::created_at.desc()).load(conn).map_err(AppError::Database)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_week_format_is_stable() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert_eq!(iso_week_key(d), "2026-W01");
    }

    #[test]
    fn check_in_input_rejects_out_of_range() {
        let input = CheckInInput { mood: 11, energy: 3, productivity: 3, stress: 3 };
        assert!(input.validate().is_err());
    }

    #[test]
    fn check_in_input_accepts_boundary_values() {
        let input = CheckInInput { mood: 1, energy: 10, productivity: 1, stress: 10 };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn notes_over_2kb_are_rejected() {
        let notes = "x".repeat(2049);
        assert!(validate_notes(&notes).is_err());
    }

    #[test]
    fn notes_at_2kb_are_accepted() {
        let notes = "x".repeat(2048);
        assert!(validate_notes(&notes).is_ok());
    }
}
