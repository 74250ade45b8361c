use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::{Error, Repository};
use crate::models::{
    Affirmation, MoodEntry, NewAffirmation, NewMoodEntry, NewUser, NewUserVoice,
    PreferencesChangeset, User, UserChangeset, UserPreferences, UserVoice,
};

/// Repository kept in memory, for endpoint tests.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    next_id: i32,
    users: BTreeMap<String, User>,
    preferences: BTreeMap<String, UserPreferences>,
    affirmations: BTreeMap<i32, Affirmation>,
    moods: Vec<MoodEntry>,
    voices: BTreeMap<i32, UserVoice>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now();
        let created = User {
            id: user.id,
            email: user.email,
            name: user.name,
            age: None,
            gender: None,
            profession: None,
            is_premium: false,
            onboarding_completed: false,
            voice_setup_completed: false,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .await
            .users
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|user| user.email.as_deref() == Some(email))
            .cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, Error> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn update_user(&self, user_id: &str, changes: UserChangeset) -> Result<Option<User>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.users.get_mut(user_id).map(|user| {
            if let Some(email) = changes.email {
                user.email = email;
            }
            if let Some(name) = changes.name {
                user.name = name;
            }
            if let Some(age) = changes.age {
                user.age = age;
            }
            if let Some(gender) = changes.gender {
                user.gender = gender;
            }
            if let Some(profession) = changes.profession {
                user.profession = profession;
            }
            if let Some(done) = changes.onboarding_completed {
                user.onboarding_completed = done;
            }
            if let Some(done) = changes.voice_setup_completed {
                user.voice_setup_completed = done;
            }
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error> {
        Ok(self.state.lock().await.preferences.get(user_id).cloned())
    }

    async fn save_preferences(&self, preferences: PreferencesChangeset) -> Result<UserPreferences, Error> {
        let mut state = self.state.lock().await;
        let existing = state.preferences.get(&preferences.user_id);
        let saved = UserPreferences {
            background_music_url: existing.and_then(|x| x.background_music_url.clone()),
            created_at: existing.map(|x| x.created_at).unwrap_or(preferences.updated_at),
            user_id: preferences.user_id,
            focus_areas: preferences.focus_areas,
            emotional_state: preferences.emotional_state,
            preferred_tone: preferences.preferred_tone,
            language: preferences.language,
            style: preferences.style,
            selected_voice: preferences.selected_voice,
            interests: preferences.interests,
            updated_at: preferences.updated_at,
        };
        state
            .preferences
            .insert(saved.user_id.clone(), saved.clone());
        Ok(saved)
    }

    async fn set_background_music(&self, user_id: &str, key: Option<String>) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        Ok(match state.preferences.get_mut(user_id) {
            Some(preferences) => {
                preferences.background_music_url = key;
                preferences.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn insert_affirmation(&self, affirmation: NewAffirmation) -> Result<Affirmation, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = Affirmation {
            id: state.next_id(),
            user_id: affirmation.user_id,
            text: affirmation.text,
            audio_url: None,
            background_music_url: affirmation.background_music_url,
            is_favorite: false,
            focus_area: affirmation.focus_area,
            emotional_state: affirmation.emotional_state,
            tone: affirmation.tone,
            style: affirmation.style,
            language: affirmation.language,
            generated_at: now,
            created_at: now,
            updated_at: now,
        };
        state.affirmations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_affirmation(&self, id: i32) -> Result<Option<Affirmation>, Error> {
        Ok(self.state.lock().await.affirmations.get(&id).cloned())
    }

    async fn list_affirmations(&self, user_id: &str) -> Result<Vec<Affirmation>, Error> {
        let mut found: Vec<Affirmation> = self
            .state
            .lock()
            .await
            .affirmations
            .values()
            .filter(|x| x.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    async fn update_affirmation_text(&self, id: i32, text: &str) -> Result<Option<Affirmation>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.affirmations.get_mut(&id).map(|x| {
            x.text = text.to_string();
            x.updated_at = Utc::now();
            x.clone()
        }))
    }

    async fn set_favorite(&self, id: i32, is_favorite: bool) -> Result<Option<Affirmation>, Error> {
        let mut state = self.state.lock().await;
        Ok(state.affirmations.get_mut(&id).map(|x| {
            x.is_favorite = is_favorite;
            x.updated_at = Utc::now();
            x.clone()
        }))
    }

    async fn set_audio_key(&self, id: i32, key: Option<&str>) -> Result<(), Error> {
        if let Some(x) = self.state.lock().await.affirmations.get_mut(&id) {
            x.audio_url = key.map(str::to_string);
            x.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_affirmation(&self, id: i32) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        let deleted = state.affirmations.remove(&id).is_some();
        for mood in state.moods.iter_mut() {
            if mood.affirmation_id == Some(id) {
                mood.affirmation_id = None;
            }
        }
        Ok(deleted)
    }

    async fn insert_mood(&self, entry: NewMoodEntry) -> Result<MoodEntry, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = MoodEntry {
            id: state.next_id(),
            user_id: entry.user_id,
            mood_before: entry.mood_before,
            mood_after: entry.mood_after,
            affirmation_id: entry.affirmation_id,
            tracked_at: now,
            created_at: now,
            updated_at: now,
        };
        state.moods.push(created.clone());
        Ok(created)
    }

    async fn list_moods(&self, user_id: &str, limit: i64) -> Result<Vec<MoodEntry>, Error> {
        let state = self.state.lock().await;
        let mut found: Vec<MoodEntry> = state
            .moods
            .iter()
            .filter(|x| x.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.tracked_at, b.id).cmp(&(a.tracked_at, a.id)));
        found.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(found)
    }

    async fn insert_active_voice(&self, voice: NewUserVoice) -> Result<UserVoice, Error> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let created = UserVoice {
            id: state.next_id(),
            user_id: voice.user_id,
            voice_type: voice.voice_type,
            storage_url: voice.storage_url,
            original_filename: voice.original_filename,
            duration_seconds: voice.duration_seconds,
            sample_text: voice.sample_text,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        for other in state.voices.values_mut() {
            if other.user_id == created.user_id {
                other.is_active = false;
            }
        }
        state.voices.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_voices(&self, user_id: &str) -> Result<Vec<UserVoice>, Error> {
        let mut found: Vec<UserVoice> = self
            .state
            .lock()
            .await
            .voices
            .values()
            .filter(|x| x.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    async fn get_voice(&self, id: i32) -> Result<Option<UserVoice>, Error> {
        Ok(self.state.lock().await.voices.get(&id).cloned())
    }

    async fn delete_user_data(&self, user_id: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.moods.retain(|x| x.user_id != user_id);
        state.affirmations.retain(|_, x| x.user_id != user_id);
        state.voices.retain(|_, x| x.user_id != user_id);
        state.preferences.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VoiceType;

    fn new_voice(user_id: &str) -> NewUserVoice {
        NewUserVoice {
            user_id: user_id.into(),
            voice_type: VoiceType::Recorded,
            storage_url: format!("user-voices/{}/1.webm", user_id),
            original_filename: Some("sample.webm".into()),
            duration_seconds: None,
            sample_text: None,
            is_active: false,
        }
    }

    #[tokio::test]
    async fn new_voice_is_the_only_active_one() {
        let repository = MemoryRepository::default();
        let first = repository.insert_active_voice(new_voice("user_a")).await.unwrap();
        let other_user = repository.insert_active_voice(new_voice("user_b")).await.unwrap();
        let second = repository.insert_active_voice(new_voice("user_a")).await.unwrap();

        let voices = repository.list_voices("user_a").await.unwrap();
        assert_eq!(voices.iter().map(|x| x.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert!(voices[0].is_active);
        assert!(!voices[1].is_active);
        assert!(repository.get_voice(other_user.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn saving_preferences_keeps_custom_music() {
        let repository = MemoryRepository::default();
        let changeset = PreferencesChangeset {
            user_id: "user_a".into(),
            focus_areas: vec!["calm".into()],
            emotional_state: "neutral".into(),
            preferred_tone: "gentle".into(),
            language: "en".into(),
            style: "inspirational".into(),
            selected_voice: "sarah".into(),
            interests: vec![],
            updated_at: Utc::now(),
        };
        repository.save_preferences(changeset.clone()).await.unwrap();
        assert!(repository
            .set_background_music("user_a", Some("background-music/custom/user_a/1.mp3".into()))
            .await
            .unwrap());
        let saved = repository.save_preferences(changeset).await.unwrap();
        assert_eq!(
            saved.background_music_url.as_deref(),
            Some("background-music/custom/user_a/1.mp3")
        );
        assert!(!repository.set_background_music("user_b", None).await.unwrap());
    }
}
