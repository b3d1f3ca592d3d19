use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc, Weekday};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accountability_shared::errors::{AppError, AppResult, ErrorCode};
use accountability_shared::types::ids::UserId;

use crate::models::{NewPreferencesRow, PreferencesRow};
use crate::schema::preferences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationStyle {
    Direct,
    Supportive,
    Balanced,
    Analytical,
}

impl FromStr for CommunicationStyle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECT" => Ok(Self::Direct),
            "SUPPORTIVE" => Ok(Self::Supportive),
            "BALANCED" => Ok(Self::Balanced),
            "ANALYTICAL" => Ok(Self::Analytical),
            other => Err(AppError::invalid(
                ErrorCode::InvalidPreferencesForScoring,
                format!("unknown communication style: {other}"),
            )),
        }
    }
}

impl CommunicationStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Supportive => "SUPPORTIVE",
            Self::Balanced => "BALANCED",
            Self::Analytical => "ANALYTICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperienceLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl FromStr for ExperienceLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BEGINNER" => Ok(Self::Beginner),
            "INTERMEDIATE" => Ok(Self::Intermediate),
            "ADVANCED" => Ok(Self::Advanced),
            other => Err(AppError::invalid(
                ErrorCode::InvalidPreferencesForScoring,
                format!("unknown experience level: {other}"),
            )),
        }
    }
}

impl ExperienceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "BEGINNER",
            Self::Intermediate => "INTERMEDIATE",
            Self::Advanced => "ADVANCED",
        }
    }
}

/// A half-open interval of minutes-from-midnight, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start_minutes: u16,
    pub end_minutes: u16,
}

impl TimeInterval {
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start_minutes < other.end_minutes && other.start_minutes < self.end_minutes
    }

    fn minutes(&self) -> u32 {
        (self.end_minutes - self.start_minutes) as u32
    }
}

pub type WorkingHours = BTreeMap<Weekday, Vec<TimeInterval>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: UserId,
    pub timezone: String,
    pub working_hours: WorkingHours,
    pub interests: BTreeSet<String>,
    pub focus_goals: BTreeSet<String>,
    pub communication_style: CommunicationStyle,
    pub experience_level: ExperienceLevel,
    pub personality_tags: BTreeSet<String>,
    pub preferred_session_duration_minutes: u16,
    pub max_concurrent_partners: i32,
    pub available: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl UserPreferences {
    /// Validates the invariants in §3: timezone parses, and working
    /// hour intervals are non-overlapping within a day.
    pub fn validate(&self) -> AppResult<()> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            AppError::invalid(
                ErrorCode::InvalidTimezone,
                format!("timezone '{}' does not parse as an IANA zone", self.timezone),
            )
        })?;

        for (day, intervals) in &self.working_hours {
            for i in 0..intervals.len() {
                for j in (i + 1)..intervals.len() {
                    if intervals[i].overlaps(&intervals[j]) {
                        return Err(AppError::invalid(
                            ErrorCode::OverlappingWorkingHours,
                            format!("working hours for {day} contain overlapping intervals"),
                        ));
                    }
                }
            }
        }

        if !(5..=240).contains(&self.preferred_session_duration_minutes) {
            return Err(AppError::invalid(
                ErrorCode::InvalidPreferencesForScoring,
                "preferred session duration must be in 5..240 minutes",
            ));
        }
        if !(1..=5).contains(&self.max_concurrent_partners) {
            return Err(AppError::invalid(
                ErrorCode::InvalidPreferencesForScoring,
                "max concurrent partners must be in 1..5",
            ));
        }

        Ok(())
    }

    /// Total minutes-per-week spent available, used by the schedule
    /// overlap factor in the compatibility engine.
    pub fn total_weekly_minutes(&self) -> u32 {
        self.working_hours
            .values()
            .flat_map(|intervals| intervals.iter())
            .map(TimeInterval::minutes)
            .sum()
    }

    fn from_row(row: PreferencesRow) -> AppResult<Self> {
        let working_hours: WorkingHours = serde_json::from_value(row.working_hours)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt working_hours: {e}")))?;

        Ok(Self {
            user_id: UserId(row.user_id),
            timezone: row.timezone,
            working_hours,
            interests: row.interests.into_iter().collect(),
            focus_goals: row.focus_goals.into_iter().collect(),
            communication_style: row.communication_style.parse()?,
            experience_level: row.experience_level.parse()?,
            personality_tags: row.personality_tags.into_iter().collect(),
            preferred_session_duration_minutes: row.preferred_session_duration_minutes as u16,
            max_concurrent_partners: row.max_concurrent_partners,
            available: row.available,
            version: row.version,
            updated_at: row.updated_at,
        })
    }

    fn into_new_row(self, now: DateTime<Utc>) -> AppResult<NewPreferencesRow> {
        Ok(NewPreferencesRow {
            user_id: self.user_id.0,
            timezone: self.timezone,
            working_hours: serde_json::to_value(&self.working_hours)
                .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to encode working_hours: {e}")))?,
            interests: self.interests.into_iter().collect(),
            focus_goals: self.focus_goals.into_iter().collect(),
            communication_style: self.communication_style.as_str().to_string(),
            experience_level: self.experience_level.as_str().to_string(),
            personality_tags: self.personality_tags.into_iter().collect(),
            preferred_session_duration_minutes: self.preferred_session_duration_minutes as i32,
            max_concurrent_partners: self.max_concurrent_partners,
            available: self.available,
            version: self.version + 1,
            updated_at: now,
        })
    }
}

pub fn get_preferences(conn: &mut PgConnection, user_id: UserId) -> AppResult<UserPreferences> {
    let row = preferences::table
        .find(user_id.0)
        .first::<PreferencesRow>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| {
            AppError::not_found(ErrorCode::PreferencesNotFound, "no preferences for this user")
        })?;

    UserPreferences::from_row(row)
}

/// Upserts a user's preferences. Rejects with `Invalid` if the
/// timezone does not parse or the working-hour intervals overlap.
/// Uses last-writer-wins with an optimistic version counter — per §4.1
/// no concurrency between writers for the same user is assumed, but
/// the version lets callers detect a stale read after the fact (and
/// lets the compatibility-score cache detect that cached scores for
/// this user are now stale, per Testable Property 8).
pub fn upsert_preferences(
    conn: &mut PgConnection,
    mut prefs: UserPreferences,
    now: DateTime<Utc>,
) -> AppResult<UserPreferences> {
    prefs.validate()?;

    let existing_version = preferences::table
        .find(prefs.user_id.0)
        .select(preferences::version)
        .first::<i32>(conn)
        .optional()
        .map_err(AppError::Database)?;

    prefs.version = existing_version.unwrap_or(0);
    let new_row = prefs.into_new_row(now)?;

    let saved = diesel::insert_into(preferences::table)
        .values(&new_row)
        .on_conflict(preferences::user_id)
        .do_update()
        .set(&new_row)
        .get_result::<PreferencesRow>(conn)
        .map_err(AppError::Database)?;

    UserPreferences::from_row(saved)
}

pub fn set_availability(conn: &mut PgConnection, user_id: UserId, available: bool, now: DateTime<Utc>) -> AppResult<()> {
    let updated = diesel::update(preferences::table.find(user_id.0))
        .set((preferences::available.eq(available), preferences::updated_at.eq(now)))
        .execute(conn)
        .map_err(AppError::Database)?;

    if updated == 0 {
        return Err(AppError::not_found(
            ErrorCode::PreferencesNotFound,
            "no preferences for this user",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: u16, end: u16) -> TimeInterval {
        TimeInterval { start_minutes: start, end_minutes: end }
    }

    #[test]
    fn detects_overlapping_intervals() {
        let mut working_hours = WorkingHours::new();
        working_hours.insert(Weekday::Mon, vec![interval(540, 600), interval(590, 650)]);

        let prefs = sample_prefs(working_hours);
        let err = prefs.validate().unwrap_err();
        assert!(matches!(err, AppError::Invalid { code: ErrorCode::OverlappingWorkingHours, .. }));
    }

    #[test]
    fn accepts_adjacent_non_overlapping_intervals() {
        let mut working_hours = WorkingHours::new();
        working_hours.insert(Weekday::Mon, vec![interval(540, 600), interval(600, 660)]);

        let prefs = sample_prefs(working_hours);
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn rejects_unparseable_timezone() {
        let mut prefs = sample_prefs(WorkingHours::new());
        prefs.timezone = "Not/AZone".to_string();
        let err = prefs.validate().unwrap_err();
        assert!(matches!(err, AppError::Invalid { code: ErrorCode::InvalidTimezone, .. }));
    }

    #[test]
    fn total_weekly_minutes_sums_across_days() {
        let mut working_hours = WorkingHours::new();
        working_hours.insert(Weekday::Mon, vec![interval(540, 600)]); // 60
        working_hours.insert(Weekday::Tue, vec![interval(540, 660)]); // 120
        let prefs = sample_prefs(working_hours);
        assert_eq!(prefs.total_weekly_minutes(), 180);
    }

    fn sample_prefs(working_hours: WorkingHours) -> UserPreferences {
        UserPreferences {
            user_id: UserId(Uuid::nil()),
            timezone: "Europe/London".to_string(),
            working_hours,
            interests: BTreeSet::new(),
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
}
