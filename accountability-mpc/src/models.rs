use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{
    check_ins, health_events, outbound_events, partnership_ratings, partnerships, preferences,
    queue_entries, streak_state,
};

// --- Preferences (C1) ---

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = preferences, primary_key(user_id))]
pub struct PreferencesRow {
    pub user_id: Uuid,
    pub timezone: String,
    pub working_hours: serde_json::Value,
    pub interests: Vec<String>,
    pub focus_goals: Vec<String>,
    pub communication_style: String,
    pub experience_level: String,
    pub personality_tags: Vec<String>,
    pub preferred_session_duration_minutes: i32,
    pub max_concurrent_partners: i32,
    pub available: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = preferences)]
pub struct NewPreferencesRow {
    pub user_id: Uuid,
    pub timezone: String,
    pub working_hours: serde_json::Value,
    pub interests: Vec<String>,
    pub focus_goals: Vec<String>,
    pub communication_style: String,
    pub experience_level: String,
    pub personality_tags: Vec<String>,
    pub preferred_session_duration_minutes: i32,
    pub max_concurrent_partners: i32,
    pub available: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

// --- QueueEntry (C3) ---

#[derive(Debug, Queryable, Identifiable, Clone)]
#[diesel(table_name = queue_entries, primary_key(user_id))]
pub struct QueueEntryRow {
    pub user_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub status: String,
    pub last_considered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = queue_entries)]
pub struct NewQueueEntryRow {
    pub user_id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    pub status: String,
}

// --- Partnership (C4) ---

#[derive(Debug, Queryable, Identifiable, Clone, Serialize)]
#[diesel(table_name = partnerships)]
pub struct PartnershipRow {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub initiator_id: Uuid,
    pub status: String,
    pub match_score: f64,
    pub message: Option<String>,
    pub duration_days: i32,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
    pub total_sessions: i32,
    pub total_goals_completed: i32,
    pub current_streak: i32,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub health: i16,
    pub health_recomputed_at: Option<DateTime<Utc>>,
    pub health_at_risk: bool,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = partnerships)]
pub struct NewPartnershipRow {
    pub id: Uuid,
    pub user_a_id: Uuid,
    pub user_b_id: Uuid,
    pub initiator_id: Uuid,
    pub status: String,
    pub match_score: f64,
    pub message: Option<String>,
    pub duration_days: i32,
    pub created_at: DateTime<Utc>,
    pub total_sessions: i32,
    pub total_goals_completed: i32,
    pub current_streak: i32,
    pub health: i16,
    pub health_at_risk: bool,
}

// --- CheckIn (C5) ---

#[derive(Debug, Queryable, Identifiable, Clone, Serialize)]
#[diesel(table_name = check_ins)]
pub struct CheckInRow {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub author_user_id: Uuid,
    pub kind: String,
    pub mood: i16,
    pub energy: i16,
    pub productivity: i16,
    pub stress: i16,
    pub notes: String,
    pub local_date: NaiveDate,
    pub iso_week: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = check_ins)]
pub struct NewCheckInRow {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub author_user_id: Uuid,
    pub kind: String,
    pub mood: i16,
    pub energy: i16,
    pub productivity: i16,
    pub stress: i16,
    pub notes: String,
    pub local_date: NaiveDate,
    pub iso_week: String,
    pub created_at: DateTime<Utc>,
}

// --- StreakState (derived) ---

#[derive(Debug, Queryable, Identifiable, Clone, Copy, Serialize, Deserialize)]
#[diesel(table_name = streak_state, primary_key(partnership_id, user_id))]
pub struct StreakStateRow {
    pub partnership_id: Uuid,
    pub user_id: Uuid,
    pub current: i32,
    pub longest: i32,
    pub last_check_in_date: Option<NaiveDate>,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = streak_state)]
pub struct NewStreakStateRow {
    pub partnership_id: Uuid,
    pub user_id: Uuid,
    pub current: i32,
    pub longest: i32,
    pub last_check_in_date: Option<NaiveDate>,
}

// --- HealthEvent (C6 audit trail) ---

#[derive(Debug, Insertable)]
#[diesel(table_name = health_events)]
pub struct NewHealthEventRow {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub health: i16,
    pub created_at: DateTime<Utc>,
}

// --- PartnershipRating ---

#[derive(Debug, Insertable)]
#[diesel(table_name = partnership_ratings)]
pub struct NewPartnershipRatingRow {
    pub id: Uuid,
    pub partnership_id: Uuid,
    pub rater_user_id: Uuid,
    pub rating: i16,
    pub created_at: DateTime<Utc>,
}

// --- OutboundEvent (outbox for the at-least-once event sink) ---

#[derive(Debug, Insertable)]
#[diesel(table_name = outbound_events)]
pub struct NewOutboundEventRow {
    pub id: Uuid,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
