//! Partnership lifecycle (C4): creation from a match proposal, the
//! accept/reject/cancel/pause/resume/end state machine, and the
//! concurrency and uniqueness constraints from §3.

use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use accountability_shared::errors::{AppError, AppResult, ErrorCode};
use accountability_shared::types::ids::{ordered_pair, PartnershipId, UserId};

use crate::config::AppConfig;
use crate::models::{NewPartnershipRow, PartnershipRow};
use crate::schema::partnerships;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnershipStatus {
    Pending,
    Active,
    Rejected,
    Expired,
    Paused,
    Ended,
}

impl PartnershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Paused => "PAUSED",
            Self::Ended => "ENDED",
        }
    }

    pub(crate) fn parse(s: &str) -> AppResult<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            "PAUSED" => Ok(Self::Paused),
            "ENDED" => Ok(Self::Ended),
            other => Err(AppError::Internal(anyhow::anyhow!("unknown partnership status '{other}'"))),
        }
    }

    /// Is this partnership still occupying one of the user's
    /// concurrent-partner slots (§3, §4.4)?
    fn counts_toward_concurrent_cap(self) -> bool {
        matches!(self, Self::Pending | Self::Active | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Accept,
    Reject,
    Cancel,
    Pause,
    Resume,
    End,
    Expire,
}

/// The transition table from §4.4. Kept as one explicit match rather
/// than scattered `if status == ...` checks, so every legal edge is
/// visible in one place (Design Notes §9). `cancel` is distinct from
/// `reject`: the diagram routes it to `EXPIRED` with
/// `endReason=CANCELLED`, not to `REJECTED` — a request the initiator
/// withdrew is not the same outcome as one the recipient turned down.
fn next_status(current: PartnershipStatus, action: Action) -> AppResult<PartnershipStatus> {
    use Action::*;
    use PartnershipStatus::*;

    match (current, action) {
        (Pending, Accept) => Ok(Active),
        (Pending, Reject) => Ok(Rejected),
        (Pending, Cancel) => Ok(Expired),
        (Pending, Expire) => Ok(Expired),
        (Active, Pause) => Ok(Paused),
        (Active, End) => Ok(Ended),
        (Paused, Resume) => Ok(Active),
        (Paused, End) => Ok(Ended),
        (current, _) => Err(AppError::wrong_state(current.as_str())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Requester {
    Initiator,
    NonInitiator,
    EitherParticipant,
}

fn required_requester(action: Action) -> Requester {
    match action {
        Action::Accept | Action::Reject => Requester::NonInitiator,
        Action::Cancel => Requester::Initiator,
        Action::Pause | Action::Resume | Action::End => Requester::EitherParticipant,
        Action::Expire => Requester::EitherParticipant, // system-driven; not user-authorized
    }
}

fn authorize(row: &PartnershipRow, actor: UserId, action: Action) -> AppResult<()> {
    let initiator = UserId(row.initiator_id);
    let is_participant = row.user_a_id == actor.0 || row.user_b_id == actor.0;

    if !is_participant {
        return Err(AppError::forbidden(ErrorCode::NotParticipant, "not a participant in this partnership"));
    }

    match required_requester(action) {
        Requester::Initiator if actor != initiator => {
            Err(AppError::forbidden(ErrorCode::NotInitiator, "only the initiator may perform this action"))
        }
        Requester::NonInitiator if actor == initiator => {
            Err(AppError::forbidden(ErrorCode::NotRecipient, "only the recipient may perform this action"))
        }
        _ => Ok(()),
    }
}

/// Extra per-action fields that don't fit the transition table itself
/// (a free-text reason, an optional closing rating).
#[derive(Debug, Clone, Default)]
struct TransitionExtras {
    end_reason: Option<String>,
    rating: Option<i16>,
}

fn apply_transition(
    conn: &mut PgConnection,
    partnership_id: PartnershipId,
    actor: Option<UserId>,
    action: Action,
    config: &AppConfig,
    now: DateTime<Utc>,
    extras: TransitionExtras,
) -> AppResult<PartnershipRow> {
    let row = partnerships::table
        .find(partnership_id.0)
        .first::<PartnershipRow>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::not_found(ErrorCode::PartnershipNotFound, "no such partnership"))?;

    if let Some(actor) = actor {
        authorize(&row, actor, action)?;
    }

    let current = PartnershipStatus::parse(&row.status)?;
    let new_status = next_status(current, action)?;

    if action == Action::Accept {
        for participant in [UserId(row.user_a_id), UserId(row.user_b_id)] {
            // re-checked atomically with the transition itself (§4.4):
            // a cap that was fine when the request was opened may have
            // filled up in the meantime via another acceptance.
            if !under_concurrent_cap_excluding(conn, participant, partnership_id, config)? {
                return Err(AppError::limit_exceeded("accepting would exceed a participant's concurrent-partner cap"));
            }
        }
    }

    let updated = match action {
        Action::Accept => diesel::update(partnerships::table.find(row.id))
            .set((partnerships::status.eq(new_status.as_str()), partnerships::responded_at.eq(now)))
            .get_result::<PartnershipRow>(conn),
        Action::Reject => diesel::update(partnerships::table.find(row.id))
            .set((
                partnerships::status.eq(new_status.as_str()),
                partnerships::responded_at.eq(now),
                partnerships::end_reason.eq(extras.end_reason),
            ))
            .get_result::<PartnershipRow>(conn),
        Action::Expire => diesel::update(partnerships::table.find(row.id))
            .set((
                partnerships::status.eq(new_status.as_str()),
                partnerships::responded_at.eq(now),
                partnerships::end_reason.eq(Some("TTL_EXPIRED".to_string())),
            ))
            .get_result::<PartnershipRow>(conn),
        Action::Pause => diesel::update(partnerships::table.find(row.id))
            .set((partnerships::status.eq(new_status.as_str()), partnerships::paused_at.eq(now)))
            .get_result::<PartnershipRow>(conn),
        Action::Resume => diesel::update(partnerships::table.find(row.id))
            .set((partnerships::status.eq(new_status.as_str()), partnerships::paused_at.eq(None::<DateTime<Utc>>)))
            .get_result::<PartnershipRow>(conn),
        Action::Cancel => diesel::update(partnerships::table.find(row.id))
            .set((
                partnerships::status.eq(new_status.as_str()),
                partnerships::responded_at.eq(now),
                partnerships::end_reason.eq(Some("CANCELLED".to_string())),
            ))
            .get_result::<PartnershipRow>(conn),
        Action::End => {
            diesel::update(partnerships::table.find(row.id))
                .set((
                    partnerships::status.eq(new_status.as_str()),
                    partnerships::ended_at.eq(now),
                    partnerships::end_reason.eq(extras.end_reason.or_else(|| Some("ENDED_BY_PARTICIPANT".to_string()))),
                ))
                .get_result::<PartnershipRow>(conn)
        }
    }
    .map_err(AppError::Database)?;

    if action == Action::End {
        if let (Some(actor), Some(rating)) = (actor, extras.rating) {
            if !(1..=5).contains(&rating) {
                return Err(AppError::invalid(ErrorCode::InvalidPreferencesForScoring, "rating must be in 1..=5"));
            }
            diesel::insert_into(crate::schema::partnership_ratings::table)
                .values(&crate::models::NewPartnershipRatingRow {
                    id: Uuid::new_v4(),
                    partnership_id: partnership_id.0,
                    rater_user_id: actor.0,
                    rating,
                    created_at: now,
                })
                .execute(conn)
                .map_err(AppError::Database)?;
        }
    }

    Ok(updated)
}

pub fn accept(conn: &mut PgConnection, id: PartnershipId, actor: UserId, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::Accept, config, now, TransitionExtras::default())
}

pub fn reject(conn: &mut PgConnection, id: PartnershipId, actor: UserId, reason: Option<String>, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::Reject, config, now, TransitionExtras { end_reason: reason, rating: None })
}

pub fn cancel(conn: &mut PgConnection, id: PartnershipId, actor: UserId, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::Cancel, config, now, TransitionExtras::default())
}

pub fn pause(conn: &mut PgConnection, id: PartnershipId, actor: UserId, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::Pause, config, now, TransitionExtras::default())
}

pub fn resume(conn: &mut PgConnection, id: PartnershipId, actor: UserId, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::Resume, config, now, TransitionExtras::default())
}

pub fn end(conn: &mut PgConnection, id: PartnershipId, actor: UserId, reason: Option<String>, rating: Option<i16>, config: &AppConfig, now: DateTime<Utc>) -> AppResult<PartnershipRow> {
    apply_transition(conn, id, Some(actor), Action::End, config, now, TransitionExtras { end_reason: reason, rating })
}

/// Expires every `PENDING` partnership whose request TTL has elapsed.
/// Run by the `expire-pending` scheduled job (§4.7); not user-invoked,
/// so it bypasses `authorize`.
pub fn expire_stale_pending(conn: &mut PgConnection, config: &AppConfig, now: DateTime<Utc>) -> AppResult<usize> {
    let cutoff = now - chrono::Duration::seconds(config.partnership_request_ttl_secs);

    let stale: Vec<Uuid> = partnerships::table
        .filter(partnerships::status.eq(PartnershipStatus::Pending.as_str()))
        .filter(partnerships::created_at.lt(cutoff))
        .select(partnerships::id)
        .load(conn)
        .map_err(AppError::Database)?;

    for id in &stale {
        apply_transition(conn, PartnershipId(*id), None, Action::Expire, config, now, TransitionExtras::default())?;
    }

    Ok(stale.len())
}

pub fn get(conn: &mut PgConnection, id: PartnershipId) -> AppResult<PartnershipRow> {
    partnerships::table
        .find(id.0)
        .first::<PartnershipRow>(conn)
        .optional()
        .map_err(AppError::Database)?
        .ok_or_else(|| AppError::not_found(ErrorCode::PartnershipNotFound, "no such partnership"))
}

pub fn list_for_user(conn: &mut PgConnection, user_id: UserId) -> AppResult<Vec<PartnershipRow>> {
    partnerships::table
        .filter(partnerships::user_a_id.eq(user_id.0).or(partnerships::user_b_id.eq(user_id.0)))
        .order(partnerships::created_at.desc())
        .load(conn)
        .map_err(AppError::Database)
}

/// True if the pair already has a `PENDING`, `ACTIVE`, or `PAUSED`
/// partnership between them (§3 pair-uniqueness invariant). The
/// matching pass uses this to skip pairs it would otherwise re-propose.
pub fn has_active_partnership_between(conn: &mut PgConnection, a: UserId, b: UserId) -> AppResult<bool> {
    let (lo, hi) = ordered_pair(a, b);
    let count: i64 = partnerships::table
        .filter(partnerships::user_a_id.eq(lo.0))
        .filter(partnerships::user_b_id.eq(hi.0))
        .filter(
            partnerships::status
                .eq(PartnershipStatus::Pending.as_str())
                .or(partnerships::status.eq(PartnershipStatus::Active.as_str()))
                .or(partnerships::status.eq(PartnershipStatus::Paused.as_str())),
        )
        .select(count_star())
        .first(conn)
        .map_err(AppError::Database)?;

    Ok(count > 0)
}

/// A user's effective concurrent-partner cap: their own preference
/// (§3: `max concurrent partners, 1..5, default 3`) when preferences
/// exist, else the service-wide `partnership.maxConcurrent` default.
fn effective_cap(conn: &mut PgConnection, user_id: UserId, config: &AppConfig) -> AppResult<i32> {
    match crate::preferences::get_preferences(conn, user_id) {
        Ok(prefs) => Ok(prefs.max_concurrent_partners),
        Err(AppError::NotFound { .. }) => Ok(config.partnership_max_concurrent),
        Err(e) => Err(e),
    }
}

fn occupied_slot_count(conn: &mut PgConnection, user_id: UserId, exclude: Option<PartnershipId>) -> AppResult<i64> {
    let rows: Vec<(Uuid, String)> = partnerships::table
        .filter(partnerships::user_a_id.eq(user_id.0).or(partnerships::user_b_id.eq(user_id.0)))
        .select((partnerships::id, partnerships::status))
        .load(conn)
        .map_err(AppError::Database)?;

    Ok(rows
        .iter()
        .filter(|(id, _)| exclude.map(|e| e.0 != *id).unwrap_or(true))
        .filter(|(_, s)| PartnershipStatus::parse(s).map(|s| s.counts_toward_concurrent_cap()).unwrap_or(false))
        .count() as i64)
}

/// True if `user_id` has strictly fewer than their effective cap of
/// partnerships in a status that occupies a slot.
pub fn under_concurrent_cap(conn: &mut PgConnection, user_id: UserId, config: &AppConfig) -> AppResult<bool> {
    let occupied = occupied_slot_count(conn, user_id, None)?;
    Ok(occupied < effective_cap(conn, user_id, config)? as i64)
}

/// True if accepting/retaining `partnership_id` would keep `user_id`
/// within their effective cap, counting every *other* live partnership
/// plus the one slot `partnership_id` itself occupies.
fn under_concurrent_cap_excluding(conn: &mut PgConnection, user_id: UserId, partnership_id: PartnershipId, config: &AppConfig) -> AppResult<bool> {
    let occupied_excluding_this = occupied_slot_count(conn, user_id, Some(partnership_id))?;
    Ok(occupied_excluding_this + 1 <= effective_cap(conn, user_id, config)? as i64)
}

/// User-initiated partnership request (§4.4): `initiator` asks
/// `recipient` to partner up. Rejects `SelfPartner`, `Conflict` if a
/// live partnership already exists between the pair, and
/// `LimitExceeded` if either side is already at their concurrent cap.
pub fn request(
    conn: &mut PgConnection,
    initiator: UserId,
    recipient: UserId,
    message: Option<String>,
    duration_days: i32,
    config: &AppConfig,
    now: DateTime<Utc>,
) -> AppResult<PartnershipRow> {
    if initiator == recipient {
        return Err(AppError::invalid(ErrorCode::SelfPartner, "cannot request a partnership with yourself"));
    }
    if has_active_partnership_between(conn, initiator, recipient)? {
        return Err(AppError::conflict(ErrorCode::DuplicatePartnership, "pair already has a live partnership"));
    }
    if !under_concurrent_cap(conn, initiator, config)? {
        return Err(AppError::limit_exceeded("initiator is at their concurrent-partner cap"));
    }
    if !under_concurrent_cap(conn, recipient, config)? {
        return Err(AppError::limit_exceeded("recipient is at their concurrent-partner cap"));
    }

    let (lo, hi) = ordered_pair(initiator, recipient);
    let new_row = NewPartnershipRow {
        id: Uuid::new_v4(),
        user_a_id: lo.0,
        user_b_id: hi.0,
        initiator_id: initiator.0,
        status: PartnershipStatus::Pending.as_str().to_string(),
        match_score: 0.0,
        message,
        duration_days,
        created_at: now,
        total_sessions: 0,
        total_goals_completed: 0,
        current_streak: 0,
        health: 100,
        health_at_risk: false,
    };

    diesel::insert_into(partnerships::table)
        .values(&new_row)
        .get_result::<PartnershipRow>(conn)
        .map_err(AppError::Database)
}

/// Creates a `PENDING` partnership from a matching-pass proposal.
/// `initiator` is the longer-waiting of the two users (§4.3 step 5);
/// the caller compares both candidates' `enqueued_at` and passes the
/// one that has been in the queue longer.
pub fn propose_match(
    conn: &mut PgConnection,
    user_a: UserId,
    user_b: UserId,
    initiator: UserId,
    match_score: f64,
    now: DateTime<Utc>,
) -> AppResult<PartnershipRow> {
    if user_a == user_b {
        return Err(AppError::invalid(ErrorCode::SelfPartner, "cannot partner a user with themselves"));
    }
    if has_active_partnership_between(conn, user_a, user_b)? {
        return Err(AppError::conflict(ErrorCode::DuplicatePartnership, "pair already has an active partnership"));
    }

    let (lo, hi) = ordered_pair(user_a, user_b);
    let new_row = NewPartnershipRow {
        id: Uuid::new_v4(),
        user_a_id: lo.0,
        user_b_id: hi.0,
        initiator_id: initiator.0,
        status: PartnershipStatus::Pending.as_str().to_string(),
        match_score,
        message: None,
        duration_days: 0,
        created_at: now,
        total_sessions: 0,
        total_goals_completed: 0,
        current_streak: 0,
        health: 100,
        health_at_risk: false,
    };

    diesel::insert_into(partnerships::table)
        .values(&new_row)
        .get_result::<PartnershipRow>(conn)
        .map_err(AppError::Database)
}

#[cfg(test)]
mod tests {
    use super::*;
    use PartnershipStatus::*;

    #[test]
    fn pending_accepts_into_active() {
        assert_eq!(next_status(Pending, Action::Accept).unwrap(), Active);
    }

    #[test]
    fn active_cannot_be_accepted_again() {
        let err = next_status(Active, Action::Accept).unwrap_err();
        assert!(matches!(err, AppError::WrongState { .. }));
    }

    #[test]
    fn ended_is_terminal() {
        assert!(next_status(Ended, Action::Resume).is_err());
        assert!(next_status(Ended, Action::Pause).is_err());
    }

    #[test]
    fn paused_resumes_into_active() {
        assert_eq!(next_status(Paused, Action::Resume).unwrap(), Active);
    }

    #[test]
    fn authorize_rejects_non_participants() {
        let row = PartnershipRow {
            id: Uuid::new_v4(),
            user_a_id: Uuid::from_u128(1),
            user_b_id: Uuid::from_u128(2),
            initiator_id: Uuid::from_u128(1),
            status: "PENDING".to_string(),
            match_score: 0.7,
            message: None,
            duration_days: 0,
            created_at: Utc::now(),
            responded_at: None,
            paused_at: None,
            ended_at: None,
            end_reason: None,
            total_sessions: 0,
            total_goals_completed: 0,
            current_streak: 0,
            last_activity_at: None,
            health: 100,
            health_recomputed_at: None,
            health_at_risk: false,
        };

        let stranger = UserId(Uuid::from_u128(99));
        let err = authorize(&row, stranger, Action::Accept).unwrap_err();
        assert!(matches!(err, AppError::Forbidden { code: ErrorCode::NotParticipant, .. }));
    }

    #[test]
    fn authorize_rejects_initiator_accepting_own_request() {
        let row = PartnershipRow {
            id: Uuid::new_v4(),
            user_a_id: Uuid::from_u128(1),
            user_b_id: Uuid::from_u128(2),
            initiator_id: Uuid::from_u128(1),
            status: "PENDING".to_string(),
            match_score: 0.7,
            message: None,
            duration_days: 0,
            created_at: Utc::now(),
            responded_at: None,
            paused_at: None,
            ended_at: None,
            end_reason: None,
            total_sessions: 0,
            total_goals_completed: 0,
            current_streak: 0,
            last_activity_at: None,
            health: 100,
            health_recomputed_at: None,
            health_at_risk: false,
        };

        let initiator = UserId(Uuid::from_u128(1));
        let err = authorize(&row, initiator, Action::Accept).unwrap_err();
        assert!(matches!(err, AppError::Forbidden { code: ErrorCode::NotRecipient, .. }));
    }
}
