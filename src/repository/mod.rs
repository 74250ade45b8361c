use async_trait::async_trait;
use derive_more::{Display, Error, From};

use crate::models::{
    Affirmation, MoodEntry, NewAffirmation, NewMoodEntry, NewUser, NewUserVoice,
    PreferencesChangeset, User, UserChangeset, UserPreferences, UserVoice,
};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgRepository;

/// Upper bound on the mood history returned for one user.
pub const MOOD_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Display, From, Error)]
pub enum Error {
    #[display(fmt = "Failed to acquire a database connection: {}", _0)]
    EstablishConnection(mobc::Error<diesel::ConnectionError>),
    #[display(fmt = "Query failed: {}", _0)]
    QueryResult(diesel::result::Error),
}

/// Persistence for everything the service stores in the database.
///
/// Lookups by id return `Ok(None)` for missing rows. Mutations addressed by
/// id return `Ok(None)` (or `false`) when nothing matched.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, Error>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, Error>;
    async fn update_user(&self, user_id: &str, changes: UserChangeset) -> Result<Option<User>, Error>;

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error>;
    /// Inserts or replaces the single preferences row of a user, keeping any
    /// custom background music.
    async fn save_preferences(&self, preferences: PreferencesChangeset) -> Result<UserPreferences, Error>;
    /// `false` when the user has no preferences row to update.
    async fn set_background_music(&self, user_id: &str, key: Option<String>) -> Result<bool, Error>;

    async fn insert_affirmation(&self, affirmation: NewAffirmation) -> Result<Affirmation, Error>;
    async fn get_affirmation(&self, id: i32) -> Result<Option<Affirmation>, Error>;
    /// Newest first.
    async fn list_affirmations(&self, user_id: &str) -> Result<Vec<Affirmation>, Error>;
    async fn update_affirmation_text(&self, id: i32, text: &str) -> Result<Option<Affirmation>, Error>;
    async fn set_favorite(&self, id: i32, is_favorite: bool) -> Result<Option<Affirmation>, Error>;
    /// `None` clears the key, leaving the affirmation without audio.
    async fn set_audio_key(&self, id: i32, key: Option<&str>) -> Result<(), Error>;
    async fn delete_affirmation(&self, id: i32) -> Result<bool, Error>;

    async fn insert_mood(&self, entry: NewMoodEntry) -> Result<MoodEntry, Error>;
    /// Latest `limit` entries, newest first.
    async fn list_moods(&self, user_id: &str, limit: i64) -> Result<Vec<MoodEntry>, Error>;

    /// Stores `voice` as the user's active voice and deactivates the others.
    async fn insert_active_voice(&self, voice: NewUserVoice) -> Result<UserVoice, Error>;
    /// Newest first.
    async fn list_voices(&self, user_id: &str) -> Result<Vec<UserVoice>, Error>;
    async fn get_voice(&self, id: i32) -> Result<Option<UserVoice>, Error>;

    /// Removes the user's affirmations, mood log, voices and preferences.
    /// The user row itself is kept.
    async fn delete_user_data(&self, user_id: &str) -> Result<(), Error>;
}
