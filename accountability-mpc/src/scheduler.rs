//! Scheduled background jobs (C7). Each job is a `tokio::time::interval`
//! loop guarded by a Redis lease so only one replica runs a given job
//! at a time, and each stops cooperatively on a `tokio::sync::watch`
//! shutdown signal rather than being aborted mid-transaction.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, Duration as TokioDuration, MissedTickBehavior};
use tracing::{error, info, warn};

use accountability_shared::clients::db::DbPool;
use accountability_shared::clients::redis::RedisClient;
use accountability_shared::types::ids::PartnershipId;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::events::{publish, Notifier};
use crate::partnership;
use crate::queue;
use crate::schema::partnerships;
use diesel::prelude::*;

pub struct Scheduler {
    pool: DbPool,
    redis: RedisClient,
    notifier: Notifier,
    config: Arc<AppConfig>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(pool: DbPool, redis: RedisClient, notifier: Notifier, config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        Self { pool, redis, notifier, config, clock }
    }

    /// Spawns all five jobs, each on its own task, all stopping when
    /// `shutdown` fires.
    pub fn spawn_all(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        handles.push(Self::spawn_job("match-pass", self.config.matching_interval_secs, shutdown.clone(), {
            let this = self.clone();
            move || this.clone().run_match_pass()
        }));

        handles.push(Self::spawn_job("expire-pending", 3600, shutdown.clone(), {
            let this = self.clone();
            move || this.clone().run_expire_pending()
        }));

        handles.push(Self::spawn_job(
            "health-recompute",
            self.config.health_recompute_interval_secs.max(1) as u64,
            shutdown.clone(),
            {
                let this = self.clone();
                move || this.clone().run_health_recompute()
            },
        ));

        handles.push(Self::spawn_job("streak-decay", 24 * 3600, shutdown.clone(), {
            let this = self.clone();
            move || this.clone().run_streak_decay()
        }));

        handles.push(Self::spawn_job("queue-eviction", 3600, shutdown.clone(), {
            let this = self.clone();
            move || this.clone().run_queue_eviction()
        }));

        handles
    }

    fn spawn_job<F, Fut>(name: &'static str, interval_secs: u64, mut shutdown: watch::Receiver<bool>, mut run: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = interval(TokioDuration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run().await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!(job = name, "shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }

    async fn run_match_pass(self: Arc<Self>) {
        if !queue::acquire_pass_lease(&self.redis, self.config.matching_interval_secs).await {
            return;
        }

        let pool = self.pool.clone();
        let config = self.config.clone();
        let clock = self.clock.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| anyhow::anyhow!(e))?;
            queue::run_matching_pass(&mut conn, &config, clock.as_ref()).map_err(|e| anyhow::anyhow!(e))
        })
        .await;

        queue::release_pass_lease(&self.redis).await;

        match result {
            Ok(Ok(proposals)) if !proposals.is_empty() => {
                info!(proposals = proposals.len(), "matching pass produced proposals");
                for p in proposals {
                    publish::match_proposed(&self.notifier, p.partnership_id, p.user_a_id, p.user_b_id, p.initiator_id, p.match_score).await;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "matching pass failed"),
            Err(e) => error!(error = %e, "matching pass task panicked"),
        }
    }

    async fn run_expire_pending(self: Arc<Self>) {
        let pool = self.pool.clone();
        let config = self.config.clone();
        let now = self.clock.now();

        let expired = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(PartnershipId, uuid::Uuid, uuid::Uuid)>> {
            let mut conn = pool.get()?;
            let stale: Vec<(uuid::Uuid, uuid::Uuid, uuid::Uuid)> = partnerships::table
                .filter(partnerships::status.eq("PENDING"))
                .filter(partnerships::created_at.lt(now - chrono::Duration::seconds(config.partnership_request_ttl_secs)))
                .select((partnerships::id, partnerships::user_a_id, partnerships::user_b_id))
                .load(&mut conn)?;

            partnership::expire_stale_pending(&mut conn, &config, now)?;
            Ok(stale.into_iter().map(|(id, a, b)| (PartnershipId(id), a, b)).collect())
        })
        .await;

        match expired {
            Ok(Ok(rows)) => {
                for (id, a, b) in rows {
                    publish::partnership_expired(&self.notifier, id, accountability_shared::types::ids::UserId(a), accountability_shared::types::ids::UserId(b)).await;
                }
            }
            Ok(Err(e)) => error!(error = %e, "expire-pending job failed"),
            Err(e) => error!(error = %e, "expire-pending task panicked"),
        }
    }

    async fn run_health_recompute(self: Arc<Self>) {
        let pool = self.pool.clone();
        let config = self.config.clone();
        let now = self.clock.now();

        let result = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<(PartnershipId, i16)>> {
            let mut conn = pool.get()?;
            let active: Vec<uuid::Uuid> = partnerships::table
                .filter(partnerships::status.eq_any(["ACTIVE", "PAUSED"]))
                .select(partnerships::id)
                .load(&mut conn)?;

            let mut at_risk = Vec::new();
            for id in active {
                if let Some((health, newly_at_risk)) = crate::health::recompute_if_due(&mut conn, PartnershipId(id), &config, now)? {
                    if newly_at_risk {
                        at_risk.push((PartnershipId(id), health));
                    }
                }
            }
            Ok(at_risk)
        })
        .await;

        match result {
            Ok(Ok(newly_at_risk)) => {
                for (id, health) in newly_at_risk {
                    publish::health_at_risk(&self.notifier, id, health).await;
                }
            }
            Ok(Err(e)) => error!(error = %e, "health-recompute job failed"),
            Err(e) => error!(error = %e, "health-recompute task panicked"),
        }
    }

    async fn run_streak_decay(self: Arc<Self>) {
        let pool = self.pool.clone();
        let today = self.clock.now().date_naive();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| anyhow::anyhow!(e))?;
            crate::checkin::decay_stale_streaks(&mut conn, today).map_err(|e| anyhow::anyhow!(e))
        })
        .await;

        match result {
            Ok(Ok(count)) if count > 0 => info!(count, "decayed stale streaks"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "streak-decay job failed"),
            Err(e) => error!(error = %e, "streak-decay task panicked"),
        }
    }

    async fn run_queue_eviction(self: Arc<Self>) {
        let pool = self.pool.clone();
        let config = self.config.clone();
        let now = self.clock.now();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| anyhow::anyhow!(e))?;
            queue::evict_idle(&mut conn, &config, now).map_err(|e| anyhow::anyhow!(e))
        })
        .await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(error = %e, "queue-eviction job failed"),
            Err(e) => error!(error = %e, "queue-eviction task panicked"),
        }
    }
}

/// Sends the shutdown signal and waits for every job task to finish.
pub async fn shutdown(shutdown_tx: watch::Sender<bool>, handles: Vec<tokio::task::JoinHandle<()>>) {
    if shutdown_tx.send(true).is_err() {
        warn!("no scheduler jobs were listening for shutdown");
    }
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "scheduler job task failed to join");
        }
    }
}
