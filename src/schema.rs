table! {
    users (id) {
        id -> Text,
        email -> Nullable<Text>,
        name -> Nullable<Text>,
        age -> Nullable<Int4>,
        gender -> Nullable<Text>,
        profession -> Nullable<Text>,
        is_premium -> Bool,
        onboarding_completed -> Bool,
        voice_setup_completed -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    user_preferences (user_id) {
        user_id -> Text,
        focus_areas -> Array<Text>,
        emotional_state -> Text,
        preferred_tone -> Text,
        language -> Text,
        style -> Text,
        selected_voice -> Text,
        interests -> Array<Text>,
        background_music_url -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    affirmations (id) {
        id -> Int4,
        user_id -> Text,
        text -> Text,
        audio_url -> Nullable<Text>,
        background_music_url -> Nullable<Text>,
        is_favorite -> Bool,
        focus_area -> Nullable<Text>,
        emotional_state -> Nullable<Text>,
        tone -> Nullable<Text>,
        style -> Nullable<Text>,
        language -> Text,
        generated_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    mood_tracking (id) {
        id -> Int4,
        user_id -> Text,
        mood_before -> Nullable<Text>,
        mood_after -> Nullable<Text>,
        affirmation_id -> Nullable<Int4>,
        tracked_at -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    user_voices (id) {
        id -> Int4,
        user_id -> Text,
        voice_type -> Text,
        storage_url -> Text,
        original_filename -> Nullable<Text>,
        duration_seconds -> Nullable<Float8>,
        sample_text -> Nullable<Text>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(
    users,
    user_preferences,
    affirmations,
    mood_tracking,
    user_voices,
);
