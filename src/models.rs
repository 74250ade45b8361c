use crate::schema::{affirmations, mood_tracking, user_preferences, user_voices, users};

use chrono::{DateTime, Utc};
use diesel::{
    backend::Backend,
    deserialize::{self, FromSql},
    serialize::{self, Output, ToSql},
    sql_types, Queryable,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Queryable, PartialEq, Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub profession: Option<String>,
    pub is_premium: bool,
    pub onboarding_completed: bool,
    pub voice_setup_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[table_name = "users"]
pub struct NewUser {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Partial profile update. The outer `Option` is "leave unchanged", the
/// inner one is "set to NULL".
#[derive(AsChangeset, Debug, Clone, Default)]
#[table_name = "users"]
pub struct UserChangeset {
    pub email: Option<Option<String>>,
    pub name: Option<Option<String>>,
    pub age: Option<Option<i32>>,
    pub gender: Option<Option<String>>,
    pub profession: Option<Option<String>>,
    pub onboarding_completed: Option<bool>,
    pub voice_setup_completed: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserChangeset {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.profession.is_none()
            && self.onboarding_completed.is_none()
            && self.voice_setup_completed.is_none()
    }
}

#[derive(Queryable, PartialEq, Debug, Clone, Serialize)]
pub struct UserPreferences {
    pub user_id: String,
    pub focus_areas: Vec<String>,
    pub emotional_state: String,
    pub preferred_tone: String,
    pub language: String,
    pub style: String,
    pub selected_voice: String,
    pub interests: Vec<String>,
    pub background_music_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert values and upsert changeset for preferences. Does not touch the
/// custom music override.
#[derive(Insertable, AsChangeset, Debug, Clone)]
#[table_name = "user_preferences"]
pub struct PreferencesChangeset {
    pub user_id: String,
    pub focus_areas: Vec<String>,
    pub emotional_state: String,
    pub preferred_tone: String,
    pub language: String,
    pub style: String,
    pub selected_voice: String,
    pub interests: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Queryable, PartialEq, Debug, Clone, Serialize)]
pub struct Affirmation {
    pub id: i32,
    pub user_id: String,
    pub text: String,
    pub audio_url: Option<String>,
    pub background_music_url: Option<String>,
    pub is_favorite: bool,
    pub focus_area: Option<String>,
    pub emotional_state: Option<String>,
    pub tone: Option<String>,
    pub style: Option<String>,
    pub language: String,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[table_name = "affirmations"]
pub struct NewAffirmation {
    pub user_id: String,
    pub text: String,
    pub background_music_url: Option<String>,
    pub focus_area: Option<String>,
    pub emotional_state: Option<String>,
    pub tone: Option<String>,
    pub style: Option<String>,
    pub language: String,
}

#[derive(Queryable, PartialEq, Debug, Clone, Serialize)]
pub struct MoodEntry {
    pub id: i32,
    pub user_id: String,
    pub mood_before: Option<String>,
    pub mood_after: Option<String>,
    pub affirmation_id: Option<i32>,
    pub tracked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[table_name = "mood_tracking"]
pub struct NewMoodEntry {
    pub user_id: String,
    pub mood_before: Option<String>,
    pub mood_after: Option<String>,
    pub affirmation_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[serde(rename_all = "lowercase")]
#[sql_type = "sql_types::Text"]
pub enum VoiceType {
    Recorded,
    Uploaded,
}

impl VoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceType::Recorded => "recorded",
            VoiceType::Uploaded => "uploaded",
        }
    }
}

impl FromStr for VoiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recorded" => Ok(VoiceType::Recorded),
            "uploaded" => Ok(VoiceType::Uploaded),
            other => Err(format!("Unknown voice type {}", other)),
        }
    }
}

impl<DB> ToSql<sql_types::Text, DB> for VoiceType
where
    DB: Backend,
    str: ToSql<sql_types::Text, DB>,
{
    fn to_sql<W: std::io::Write>(&self, out: &mut Output<W, DB>) -> serialize::Result {
        self.as_str().to_sql(out)
    }
}

impl<DB> FromSql<sql_types::Text, DB> for VoiceType
where
    DB: Backend,
    String: FromSql<sql_types::Text, DB>,
{
    fn from_sql(bytes: Option<&DB::RawValue>) -> deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        value.parse::<VoiceType>().map_err(|err| err.into())
    }
}

#[derive(Queryable, PartialEq, Debug, Clone, Serialize)]
pub struct UserVoice {
    pub id: i32,
    pub user_id: String,
    pub voice_type: VoiceType,
    pub storage_url: String,
    pub original_filename: Option<String>,
    pub duration_seconds: Option<f64>,
    pub sample_text: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[table_name = "user_voices"]
pub struct NewUserVoice {
    pub user_id: String,
    pub voice_type: VoiceType,
    pub storage_url: String,
    pub original_filename: Option<String>,
    pub duration_seconds: Option<f64>,
    pub sample_text: Option<String>,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_type_parses_its_own_names() {
        for kind in [VoiceType::Recorded, VoiceType::Uploaded] {
            assert_eq!(kind.as_str().parse::<VoiceType>(), Ok(kind));
        }
        assert!("synthetic".parse::<VoiceType>().is_err());
    }

    #[test]
    fn empty_user_changeset_ignores_timestamp() {
        let changeset = UserChangeset {
            updated_at: Some(Utc::now()),
            ..Default::default()
        };
        assert!(changeset.is_empty());
        let changeset = UserChangeset {
            age: Some(None),
            ..Default::default()
        };
        assert!(!changeset.is_empty());
    }
}
