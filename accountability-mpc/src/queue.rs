//! Durable matching queue (C3). Backed by Postgres rather than the
//! in-memory/Redis sorted set a lower-durability service might use —
//! `queue_entries` is one of the eight persisted tables in §6, and the
//! spec calls the queue itself durable, so membership must survive a
//! process restart (see SPEC_FULL.md §4.3).

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use tracing::{info, warn};

use accountability_shared::clients::redis::RedisClient;
use accountability_shared::errors::{AppError, AppResult, ErrorCode};
use accountability_shared::types::ids::{PartnershipId, UserId};

use crate::clock::Clock;
use crate::compatibility::{self, Candidate, CompatibilityScore};
use crate::config::AppConfig;
use crate::models::{NewQueueEntryRow, QueueEntryRow};
use crate::partnership;
use crate::preferences::{self, UserPreferences};
use crate::schema::{preferences as preferences_table, queue_entries};

const STATUS_WAITING: &str = "WAITING";

const MATCHING_PASS_LEASE: &str = "matching-pass";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    NotQueued,
    Waiting,
}

pub fn join(conn: &mut PgConnection, user_id: UserId, now: DateTime<Utc>) -> AppResult<()> {
    let prefs = preferences::get_preferences(conn, user_id)?;
    if !prefs.available {
        return Err(AppError::invalid(
            ErrorCode::QueueIneligible,
            "user has marked themselves unavailable",
        ));
    }

    let already_queued = queue_entries::table
        .find(user_id.0)
        .first::<QueueEntryRow>(conn)
        .optional()
        .map_err(AppError::Database)?;

    if already_queued.is_some() {
        return Err(AppError::conflict(ErrorCode::AlreadyQueued, "already in the matching queue"));
    }

    diesel::insert_into(queue_entries::table)
        .values(&NewQueueEntryRow { user_id: user_id.0, enqueued_at: now, status: STATUS_WAITING.to_string() })
        .execute(conn)
        .map_err(AppError::Database)?;

    Ok(())
}

pub fn leave(conn: &mut PgConnection, user_id: UserId) -> AppResult<()> {
    let deleted = diesel::delete(queue_entries::table.find(user_id.0))
        .execute(conn)
        .map_err(AppError::Database)?;

    if deleted == 0 {
        return Err(AppError::not_found(ErrorCode::NotQueued, "not in the matching queue"));
    }
    Ok(())
}

pub fn status(conn: &mut PgConnection, user_id: UserId) -> AppResult<QueueStatus> {
    let entry = queue_entries::table
        .find(user_id.0)
        .first::<QueueEntryRow>(conn)
        .optional()
        .map_err(AppError::Database)?;

    Ok(match entry {
        Some(_) => QueueStatus::Waiting,
        None => QueueStatus::NotQueued,
    })
}

/// One ranked result from `suggest`: a candidate partner and the
/// compatibility score against the requester.
#[derive(Debug, Clone, Copy)]
pub struct Suggestion {
    pub candidate: UserId,
    pub score: CompatibilityScore,
}

/// Ranked partner suggestions for `user_id` (§4.3): drawn from the
/// queue itself plus a bounded scan of up to `matching.suggestScanLimit`
/// availability-flagged users who are not queued, scored against the
/// requester, filtered to those at or above `matching.threshold`, and
/// ranked with the same tie-break order as the matching pass (§4.2).
pub fn suggest(conn: &mut PgConnection, user_id: UserId, limit: i64, config: &AppConfig, now: DateTime<Utc>) -> AppResult<Vec<Suggestion>> {
    let requester = preferences::get_preferences(conn, user_id)?;

    let mut seen = std::collections::HashSet::new();
    seen.insert(user_id.0);

    let mut pool: Vec<UserPreferences> = Vec::new();

    let queued: Vec<QueueEntryRow> = queue_entries::table
        .filter(queue_entries::status.eq(STATUS_WAITING))
        .filter(queue_entries::user_id.ne(user_id.0))
        .load(conn)
        .map_err(AppError::Database)?;
    for row in queued {
        if seen.insert(row.user_id) {
            if let Ok(prefs) = preferences::get_preferences(conn, UserId(row.user_id)) {
                pool.push(prefs);
            }
        }
    }

    let scanned: Vec<uuid::Uuid> = preferences_table::table
        .filter(preferences_table::available.eq(true))
        .filter(preferences_table::user_id.ne(user_id.0))
        .filter(preferences_table::user_id.ne_all(queue_entries::table.select(queue_entries::user_id)))
        .select(preferences_table::user_id)
        .limit(config.suggest_scan_limit)
        .load(conn)
        .map_err(AppError::Database)?;
    for id in scanned {
        if seen.insert(id) {
            if let Ok(prefs) = preferences::get_preferences(conn, UserId(id)) {
                pool.push(prefs);
            }
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for other in &pool {
        if partnership::has_active_partnership_between(conn, user_id, other.user_id)? {
            continue;
        }
        let score = compatibility::score(&requester, other, now);
        if score.meets_threshold(config.matching_threshold) {
            candidates.push(Candidate { user_id, other_id: other.user_id, score });
        }
    }

    candidates.sort_by(compatibility::rank);
    candidates.truncate(limit.max(0) as usize);

    Ok(candidates.into_iter().map(|c| Suggestion { candidate: c.other_id, score: c.score }).collect())
}

/// Evicts entries that have sat in the queue longer than
/// `queue.idleEvictAfter` without being matched. Run by the
/// `queue-eviction` scheduled job (§4.7).
pub fn evict_idle(conn: &mut PgConnection, config: &AppConfig, now: DateTime<Utc>) -> AppResult<usize> {
    let cutoff = now - chrono::Duration::seconds(config.queue_idle_evict_after_secs);
    let evicted = diesel::delete(queue_entries::table.filter(queue_entries::enqueued_at.lt(cutoff)))
        .execute(conn)
        .map_err(AppError::Database)?;

    if evicted > 0 {
        info!(count = evicted, "evicted idle queue entries");
    }
    Ok(evicted)
}

/// Buckets waiting users by UTC-offset hour (rounded), so the pass
/// only compares candidates within `matching.bucketHours` of one
/// another — an O(n^2) compatibility scan across the whole queue is
/// unnecessary when timezone alone rules most pairs out.
fn bucket_key(offset_hours: f64, bucket_width: i32) -> i32 {
    let bucket_width = bucket_width.max(1);
    (offset_hours / bucket_width as f64).round() as i32
}

/// One partnership proposal produced by a matching pass, returned so
/// the caller can publish a `MatchProposed` event per pair without
/// re-deriving it from the database.
#[derive(Debug, Clone, Copy)]
pub struct MatchProposal {
    pub partnership_id: PartnershipId,
    pub user_a_id: UserId,
    pub user_b_id: UserId,
    pub initiator_id: UserId,
    pub match_score: f64,
}

/// Runs one matching pass: loads all waiting, available users, groups
/// them into timezone buckets, scores every pair within (and adjacent
/// to) a bucket, and greedily proposes the highest-scoring pairs that
/// clear `matching.threshold`, highest score first. Each user is
/// proposed at most once per pass. Returns one `MatchProposal` per
/// pair proposed, so the caller can emit `MatchProposed` events.
///
/// Guarded by a Redis lease so two scheduler instances never run a
/// pass concurrently (§4.7); callers should skip the pass entirely if
/// `redis.acquire_lease` returns `false`.
pub fn run_matching_pass(
    conn: &mut PgConnection,
    config: &AppConfig,
    clock: &dyn Clock,
) -> AppResult<Vec<MatchProposal>> {
    let now = clock.now();

    let waiting: Vec<QueueEntryRow> = queue_entries::table
        .filter(queue_entries::status.eq(STATUS_WAITING))
        .load(conn)
        .map_err(AppError::Database)?;

    if waiting.len() < 2 {
        return Ok(Vec::new());
    }

    let enqueued_at: std::collections::HashMap<uuid::Uuid, DateTime<Utc>> =
        waiting.iter().map(|row| (row.user_id, row.enqueued_at)).collect();

    let mut entries = Vec::with_capacity(waiting.len());
    for row in waiting {
        match preferences::get_preferences(conn, UserId(row.user_id)) {
            Ok(prefs) if prefs.available => entries.push(prefs),
            Ok(_) => {
                // no longer available; leave queued but skip this pass
            }
            Err(AppError::NotFound { .. }) => {
                warn!(user_id = %row.user_id, "queued user has no preferences; skipping");
            }
            Err(e) => return Err(e),
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            let a = &entries[i];
            let b = &entries[j];

            let tz_a = bucket_key(offset_hours(&a.timezone, now), config.matching_bucket_hours);
            let tz_b = bucket_key(offset_hours(&b.timezone, now), config.matching_bucket_hours);
            if (tz_a - tz_b).abs() > 1 {
                continue;
            }

            if partnership::has_active_partnership_between(conn, a.user_id, b.user_id)? {
                continue;
            }

            let score = compatibility::score(a, b, now);
            if score.meets_threshold(config.matching_threshold) {
                candidates.push(Candidate { user_id: a.user_id, other_id: b.user_id, score });
            }
        }
    }

    candidates.sort_by(compatibility::rank);

    let mut matched = std::collections::HashSet::new();
    let mut proposals = Vec::new();

    for candidate in candidates {
        if matched.contains(&candidate.user_id) || matched.contains(&candidate.other_id) {
            continue;
        }

        let a_cap_ok = partnership::under_concurrent_cap(conn, candidate.user_id, config)?;
        let b_cap_ok = partnership::under_concurrent_cap(conn, candidate.other_id, config)?;
        if !a_cap_ok || !b_cap_ok {
            continue;
        }

        let initiator = if enqueued_at[&candidate.user_id.0] <= enqueued_at[&candidate.other_id.0] {
            candidate.user_id
        } else {
            candidate.other_id
        };
        let row = partnership::propose_match(conn, candidate.user_id, candidate.other_id, initiator, candidate.score.total, now)?;

        for user in [candidate.user_id, candidate.other_id] {
            diesel::delete(queue_entries::table.find(user.0)).execute(conn).map_err(AppError::Database)?;
        }

        matched.insert(candidate.user_id);
        matched.insert(candidate.other_id);
        proposals.push(MatchProposal {
            partnership_id: PartnershipId(row.id),
            user_a_id: UserId(row.user_a_id),
            user_b_id: UserId(row.user_b_id),
            initiator_id: UserId(row.initiator_id),
            match_score: row.match_score,
        });
    }

    diesel::update(
        queue_entries::table.filter(
            queue_entries::user_id.eq_any(
                preferences_table::table.select(preferences_table::user_id).filter(preferences_table::available.eq(true)),
            ),
        ),
    )
    .set(queue_entries::last_considered_at.eq(now))
    .execute(conn)
    .map_err(AppError::Database)?;

    info!(proposals = proposals.len(), candidates_considered = matched.len() / 2, "matching pass complete");
    Ok(proposals)
}

fn offset_hours(tz_name: &str, at: DateTime<Utc>) -> f64 {
    use chrono::Offset;
    let tz: chrono_tz::Tz = tz_name.parse().unwrap_or(chrono_tz::UTC);
    tz.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc() as f64 / 3600.0
}

/// Acquires the distributed single-flight lease for one matching pass.
/// Returns `true` if this caller won the lease and should proceed.
/// A Redis error is treated as "did not acquire" — better to skip a
/// pass than risk two schedulers racing on the same bucket.
pub async fn acquire_pass_lease(redis: &RedisClient, ttl_secs: u64) -> bool {
    redis.acquire_lease(MATCHING_PASS_LEASE, ttl_secs).await.unwrap_or(false)
}

pub async fn release_pass_lease(redis: &RedisClient) {
    if let Err(e) = redis.release_lease(MATCHING_PASS_LEASE).await {
        warn!(error = %e, "failed to release matching-pass lease");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_key_groups_nearby_offsets() {
        assert_eq!(bucket_key(5.0, 6), bucket_key(4.0, 6));
        assert_ne!(bucket_key(-5.0, 6), bucket_key(5.0, 6));
    }
}
