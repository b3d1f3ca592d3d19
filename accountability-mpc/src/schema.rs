// Diesel schema for the eight logical tables in §6.

diesel::table! {
    preferences (user_id) {
        user_id -> Uuid,
        timezone -> Varchar,
        working_hours -> Jsonb,
        interests -> Array<Text>,
        focus_goals -> Array<Text>,
        #[max_length = 20]
        communication_style -> Varchar,
        #[max_length = 20]
        experience_level -> Varchar,
        personality_tags -> Array<Text>,
        preferred_session_duration_minutes -> Int4,
        max_concurrent_partners -> Int4,
        available -> Bool,
        version -> Int4,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    queue_entries (user_id) {
        user_id -> Uuid,
        enqueued_at -> Timestamptz,
        #[max_length = 20]
        status -> Varchar,
        last_considered_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    partnerships (id) {
        id -> Uuid,
        user_a_id -> Uuid,
        user_b_id -> Uuid,
        initiator_id -> Uuid,
        #[max_length = 20]
        status -> Varchar,
        match_score -> Float8,
        message -> Nullable<Text>,
        duration_days -> Int4,
        created_at -> Timestamptz,
        responded_at -> Nullable<Timestamptz>,
        paused_at -> Nullable<Timestamptz>,
        ended_at -> Nullable<Timestamptz>,
        #[max_length = 30]
        end_reason -> Nullable<Varchar>,
        total_sessions -> Int4,
        total_goals_completed -> Int4,
        current_streak -> Int4,
        last_activity_at -> Nullable<Timestamptz>,
        health -> Int2,
        health_recomputed_at -> Nullable<Timestamptz>,
        health_at_risk -> Bool,
    }
}

diesel::table! {
    check_ins (id) {
        id -> Uuid,
        partnership_id -> Uuid,
        author_user_id -> Uuid,
        #[max_length = 10]
        kind -> Varchar,
        mood -> Int2,
        energy -> Int2,
        productivity -> Int2,
        stress -> Int2,
        notes -> Text,
        local_date -> Date,
        #[max_length = 10]
        iso_week -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    streak_state (partnership_id, user_id) {
        partnership_id -> Uuid,
        user_id -> Uuid,
        current -> Int4,
        longest -> Int4,
        last_check_in_date -> Nullable<Date>,
    }
}

diesel::table! {
    health_events (id) {
        id -> Uuid,
        partnership_id -> Uuid,
        health -> Int2,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    partnership_ratings (id) {
        id -> Uuid,
        partnership_id -> Uuid,
        rater_user_id -> Uuid,
        rating -> Int2,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    outbound_events (id) {
        id -> Uuid,
        #[max_length = 120]
        routing_key -> Varchar,
        payload -> Jsonb,
        created_at -> Timestamptz,
        published_at -> Nullable<Timestamptz>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    preferences,
    queue_entries,
    partnerships,
    check_ins,
    streak_state,
    health_events,
    partnership_ratings,
    outbound_events,
);
