//! Outbound event publication. Kept as a small concrete enum rather
//! than a boxed async trait — the teacher's `events/publisher.rs` has
//! exactly one publishing backend in practice, and MPC only ever
//! produces events (it never consumes its own queue), so the extra
//! indirection of a trait object and an `async-trait` dependency buys
//! nothing here.

use serde::Serialize;
use tracing::warn;

use accountability_shared::clients::rabbitmq::RabbitMQClient;
use accountability_shared::types::event::Event;

#[derive(Clone)]
pub enum Notifier {
    Rabbit(RabbitMQClient),
    /// Used in tests and for local runs without a broker.
    Noop,
}

impl Notifier {
    pub async fn publish<T: Serialize>(&self, routing_key: &str, event: &Event<T>) {
        match self {
            Self::Rabbit(client) => {
                if let Err(e) = client.publish(routing_key, event).await {
                    warn!(error = %e, routing_key, "failed to publish event");
                }
            }
            Self::Noop => {}
        }
    }
}

pub mod publish {
    use super::Notifier;
    use accountability_shared::types::event::{payloads::*, routing_keys, Event};
    use accountability_shared::types::ids::{PartnershipId, UserId};

    const SOURCE: &str = "accountability-mpc";

    pub async fn match_proposed(
        notifier: &Notifier,
        partnership_id: PartnershipId,
        user_a_id: UserId,
        user_b_id: UserId,
        initiator_id: UserId,
        match_score: f64,
    ) {
        let event = Event::new(
            SOURCE,
            routing_keys::MATCH_PROPOSED,
            MatchProposed { partnership_id, user_a_id: user_a_id.0, user_b_id: user_b_id.0, match_score, initiator_id: initiator_id.0 },
        );
        notifier.publish(routing_keys::MATCH_PROPOSED, &event).await;
    }

    pub async fn partnership_accepted(notifier: &Notifier, partnership_id: PartnershipId, user_a_id: UserId, user_b_id: UserId) {
        let event = Event::new(
            SOURCE,
            routing_keys::PARTNERSHIP_ACCEPTED,
            PartnershipAccepted { partnership_id, user_a_id: user_a_id.0, user_b_id: user_b_id.0 },
        );
        notifier.publish(routing_keys::PARTNERSHIP_ACCEPTED, &event).await;
    }

    pub async fn partnership_rejected(notifier: &Notifier, partnership_id: PartnershipId, user_a_id: UserId, user_b_id: UserId) {
        let event = Event::new(
            SOURCE,
            routing_keys::PARTNERSHIP_REJECTED,
            PartnershipRejected { partnership_id, user_a_id: user_a_id.0, user_b_id: user_b_id.0 },
        );
        notifier.publish(routing_keys::PARTNERSHIP_REJECTED, &event).await;
    }

    pub async fn partnership_expired(notifier: &Notifier, partnership_id: PartnershipId, user_a_id: UserId, user_b_id: UserId) {
        let event = Event::new(
            SOURCE,
            routing_keys::PARTNERSHIP_EXPIRED,
            PartnershipExpired { partnership_id, user_a_id: user_a_id.0, user_b_id: user_b_id.0, end_reason: "TTL_EXPIRED".to_string() },
        );
        notifier.publish(routing_keys::PARTNERSHIP_EXPIRED, &event).await;
    }

    pub async fn partnership_paused(notifier: &Notifier, partnership_id: PartnershipId, by_user_id: UserId) {
        let event = Event::new(SOURCE, routing_keys::PARTNERSHIP_PAUSED, PartnershipPaused { partnership_id, by_user_id: by_user_id.0 });
        notifier.publish(routing_keys::PARTNERSHIP_PAUSED, &event).await;
    }

    pub async fn partnership_resumed(notifier: &Notifier, partnership_id: PartnershipId, by_user_id: UserId) {
        let event = Event::new(SOURCE, routing_keys::PARTNERSHIP_RESUMED, PartnershipResumed { partnership_id, by_user_id: by_user_id.0 });
        notifier.publish(routing_keys::PARTNERSHIP_RESUMED, &event).await;
    }

    pub async fn partnership_ended(notifier: &Notifier, partnership_id: PartnershipId, by_user_id: UserId, rating: Option<i16>) {
        let event = Event::new(
            SOURCE,
            routing_keys::PARTNERSHIP_ENDED,
            PartnershipEnded { partnership_id, by_user_id: by_user_id.0, end_reason: "ENDED_BY_PARTICIPANT".to_string(), rating },
        );
        notifier.publish(routing_keys::PARTNERSHIP_ENDED, &event).await;
    }

    pub async fn check_in_recorded(notifier: &Notifier, partnership_id: PartnershipId, author_user_id: UserId, kind: &str) {
        let event = Event::new(
            SOURCE,
            routing_keys::CHECK_IN_RECORDED,
            CheckInRecorded { partnership_id, author_user_id: author_user_id.0, kind: kind.to_string() },
        );
        notifier.publish(routing_keys::CHECK_IN_RECORDED, &event).await;
    }

    pub async fn streak_milestone(notifier: &Notifier, partnership_id: PartnershipId, user_id: UserId, current_streak: i32) {
        let event = Event::new(SOURCE, routing_keys::STREAK_MILESTONE, StreakMilestone { partnership_id, user_id: user_id.0, current_streak });
        notifier.publish(routing_keys::STREAK_MILESTONE, &event).await;
    }

    pub async fn health_at_risk(notifier: &Notifier, partnership_id: PartnershipId, health: i16) {
        let event = Event::new(SOURCE, routing_keys::HEALTH_AT_RISK, HealthAtRisk { partnership_id, health });
        notifier.publish(routing_keys::HEALTH_AT_RISK, &event).await;
    }
}
