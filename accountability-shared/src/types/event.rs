use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{PartnershipId, UserId};

/// Outbound event envelope wrapping every domain event emitted by the
/// MPC. Delivery is at-least-once; consumers must be idempotent (§5).
///
/// Routing key format: `accountability.{component}.{entity}.{action}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id.0);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys, one per event name in §GLOSSARY.
pub mod routing_keys {
    pub const MATCH_PROPOSED: &str = "accountability.matching.match.proposed";
    pub const PARTNERSHIP_ACCEPTED: &str = "accountability.partnership.partnership.accepted";
    pub const PARTNERSHIP_REJECTED: &str = "accountability.partnership.partnership.rejected";
    pub const PARTNERSHIP_EXPIRED: &str = "accountability.partnership.partnership.expired";
    pub const PARTNERSHIP_PAUSED: &str = "accountability.partnership.partnership.paused";
    pub const PARTNERSHIP_RESUMED: &str = "accountability.partnership.partnership.resumed";
    pub const PARTNERSHIP_ENDED: &str = "accountability.partnership.partnership.ended";
    pub const CHECK_IN_RECORDED: &str = "accountability.checkin.checkin.recorded";
    pub const STREAK_MILESTONE: &str = "accountability.checkin.streak.milestone";
    pub const HEALTH_AT_RISK: &str = "accountability.health.health.at_risk";
}

/// Event data payloads, named and shaped per §GLOSSARY "Event names".
pub mod payloads {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchProposed {
        pub partnership_id: PartnershipId,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
        pub match_score: f64,
        pub initiator_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipAccepted {
        pub partnership_id: PartnershipId,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipRejected {
        pub partnership_id: PartnershipId,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipExpired {
        pub partnership_id: PartnershipId,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
        pub end_reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipPaused {
        pub partnership_id: PartnershipId,
        pub by_user_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipResumed {
        pub partnership_id: PartnershipId,
        pub by_user_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PartnershipEnded {
        pub partnership_id: PartnershipId,
        pub by_user_id: Uuid,
        pub end_reason: String,
        pub rating: Option<i16>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CheckInRecorded {
        pub partnership_id: PartnershipId,
        pub author_user_id: Uuid,
        pub kind: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct StreakMilestone {
        pub partnership_id: PartnershipId,
        pub user_id: Uuid,
        pub current_streak: i32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HealthAtRisk {
        pub partnership_id: PartnershipId,
        pub health: i16,
    }
}
