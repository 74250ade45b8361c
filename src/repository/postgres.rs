use async_trait::async_trait;
use chrono::Utc;
use diesel::{Connection, ExpressionMethods, OptionalExtension, QueryDsl, RunQueryDsl};
use mobc::Pool;
use tracing::{span, Instrument, Level};

use super::{Error, Repository};
use crate::connection_pool::PgConnectionManager;
use crate::models::{
    Affirmation, MoodEntry, NewAffirmation, NewMoodEntry, NewUser, NewUserVoice,
    PreferencesChangeset, User, UserChangeset, UserPreferences, UserVoice,
};
use crate::schema::{affirmations, mood_tracking, user_preferences, user_voices, users};

#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<PgConnectionManager>,
}

impl PgRepository {
    pub fn new(pool: Pool<PgConnectionManager>) -> Self {
        PgRepository { pool }
    }

    async fn connection(&self) -> Result<mobc::Connection<PgConnectionManager>, Error> {
        Ok(self
            .pool
            .get()
            .instrument(tracing::info_span!("Acquiring a DB Connection."))
            .await?)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Inserting user into db.");
        let _a = db_span.enter();
        Ok(diesel::insert_into(users::table)
            .values(&user)
            .get_result(&*conn)?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching user by email from db.");
        let _a = db_span.enter();
        Ok(users::table
            .filter(users::email.eq(email))
            .first(&*conn)
            .optional()?)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching user from db.");
        let _a = db_span.enter();
        Ok(users::table.find(user_id).first(&*conn).optional()?)
    }

    async fn update_user(&self, user_id: &str, changes: UserChangeset) -> Result<Option<User>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Updating user in db.");
        let _a = db_span.enter();
        let changes = UserChangeset {
            updated_at: Some(Utc::now()),
            ..changes
        };
        Ok(diesel::update(users::table.find(user_id))
            .set(&changes)
            .get_result(&*conn)
            .optional()?)
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching preferences from db.");
        let _a = db_span.enter();
        Ok(user_preferences::table
            .find(user_id)
            .first(&*conn)
            .optional()?)
    }

    async fn save_preferences(&self, preferences: PreferencesChangeset) -> Result<UserPreferences, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Inserting or updating preferences.");
        let _a = db_span.enter();
        Ok(diesel::insert_into(user_preferences::table)
            .values(&preferences)
            .on_conflict(user_preferences::user_id)
            .do_update()
            .set(&preferences)
            .get_result(&*conn)?)
    }

    async fn set_background_music(&self, user_id: &str, key: Option<String>) -> Result<bool, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Updating background music preference.");
        let _a = db_span.enter();
        let updated = diesel::update(user_preferences::table.find(user_id))
            .set((
                user_preferences::background_music_url.eq(key),
                user_preferences::updated_at.eq(Utc::now()),
            ))
            .execute(&*conn)?;
        Ok(updated > 0)
    }

    async fn insert_affirmation(&self, affirmation: NewAffirmation) -> Result<Affirmation, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Inserting affirmation into db.");
        let _a = db_span.enter();
        Ok(diesel::insert_into(affirmations::table)
            .values(&affirmation)
            .get_result(&*conn)?)
    }

    async fn get_affirmation(&self, id: i32) -> Result<Option<Affirmation>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching affirmation from db.");
        let _a = db_span.enter();
        Ok(affirmations::table.find(id).first(&*conn).optional()?)
    }

    async fn list_affirmations(&self, user_id: &str) -> Result<Vec<Affirmation>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching affirmations from db.");
        let _a = db_span.enter();
        Ok(affirmations::table
            .filter(affirmations::user_id.eq(user_id))
            .order((affirmations::created_at.desc(), affirmations::id.desc()))
            .load(&*conn)?)
    }

    async fn update_affirmation_text(&self, id: i32, text: &str) -> Result<Option<Affirmation>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Updating affirmation text.");
        let _a = db_span.enter();
        Ok(diesel::update(affirmations::table.find(id))
            .set((
                affirmations::text.eq(text),
                affirmations::updated_at.eq(Utc::now()),
            ))
            .get_result(&*conn)
            .optional()?)
    }

    async fn set_favorite(&self, id: i32, is_favorite: bool) -> Result<Option<Affirmation>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Updating favorite flag.");
        let _a = db_span.enter();
        Ok(diesel::update(affirmations::table.find(id))
            .set((
                affirmations::is_favorite.eq(is_favorite),
                affirmations::updated_at.eq(Utc::now()),
            ))
            .get_result(&*conn)
            .optional()?)
    }

    async fn set_audio_key(&self, id: i32, key: Option<&str>) -> Result<(), Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Recording affirmation audio key.");
        let _a = db_span.enter();
        diesel::update(affirmations::table.find(id))
            .set((
                affirmations::audio_url.eq(key),
                affirmations::updated_at.eq(Utc::now()),
            ))
            .execute(&*conn)?;
        Ok(())
    }

    async fn delete_affirmation(&self, id: i32) -> Result<bool, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Deleting affirmation from db.");
        let _a = db_span.enter();
        let deleted = diesel::delete(affirmations::table.find(id)).execute(&*conn)?;
        Ok(deleted > 0)
    }

    async fn insert_mood(&self, entry: NewMoodEntry) -> Result<MoodEntry, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Inserting mood entry into db.");
        let _a = db_span.enter();
        Ok(diesel::insert_into(mood_tracking::table)
            .values(&entry)
            .get_result(&*conn)?)
    }

    async fn list_moods(&self, user_id: &str, limit: i64) -> Result<Vec<MoodEntry>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching mood history from db.");
        let _a = db_span.enter();
        Ok(mood_tracking::table
            .filter(mood_tracking::user_id.eq(user_id))
            .order((mood_tracking::tracked_at.desc(), mood_tracking::id.desc()))
            .limit(limit)
            .load(&*conn)?)
    }

    async fn insert_active_voice(&self, voice: NewUserVoice) -> Result<UserVoice, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Inserting active voice.");
        let _a = db_span.enter();
        let voice = NewUserVoice {
            is_active: true,
            ..voice
        };
        Ok(conn.transaction::<_, diesel::result::Error, _>(|| {
            let inserted: UserVoice = diesel::insert_into(user_voices::table)
                .values(&voice)
                .get_result(&*conn)?;
            diesel::update(
                user_voices::table
                    .filter(user_voices::user_id.eq(&inserted.user_id))
                    .filter(user_voices::id.ne(inserted.id)),
            )
            .set((
                user_voices::is_active.eq(false),
                user_voices::updated_at.eq(Utc::now()),
            ))
            .execute(&*conn)?;
            Ok(inserted)
        })?)
    }

    async fn list_voices(&self, user_id: &str) -> Result<Vec<UserVoice>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching voices from db.");
        let _a = db_span.enter();
        Ok(user_voices::table
            .filter(user_voices::user_id.eq(user_id))
            .order((user_voices::created_at.desc(), user_voices::id.desc()))
            .load(&*conn)?)
    }

    async fn get_voice(&self, id: i32) -> Result<Option<UserVoice>, Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Fetching voice from db.");
        let _a = db_span.enter();
        Ok(user_voices::table.find(id).first(&*conn).optional()?)
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<(), Error> {
        let conn = self.connection().await?;
        let db_span = span!(Level::INFO, "Deleting user data from db.");
        let _a = db_span.enter();
        Ok(conn.transaction::<_, diesel::result::Error, _>(|| {
            diesel::delete(mood_tracking::table.filter(mood_tracking::user_id.eq(user_id)))
                .execute(&*conn)?;
            diesel::delete(affirmations::table.filter(affirmations::user_id.eq(user_id)))
                .execute(&*conn)?;
            diesel::delete(user_voices::table.filter(user_voices::user_id.eq(user_id)))
                .execute(&*conn)?;
            diesel::delete(user_preferences::table.find(user_id)).execute(&*conn)?;
            Ok(())
        })?)
    }
}
