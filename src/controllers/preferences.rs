use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, json_body, with_context, Context, Error};
use crate::audio_urls;
use crate::clients::google_tts::DEFAULT_VOICE;
use crate::clients::openai::default_language;
use crate::models::{PreferencesChangeset, UserPreferences};
use crate::util::map_result;

#[derive(Debug, Deserialize)]
pub struct SavePreferencesRequest {
    user_id: String,
    focus_areas: Vec<String>,
    emotional_state: String,
    preferred_tone: String,
    #[serde(default = "default_language")]
    language: String,
    style: String,
    selected_voice: Option<String>,
    interests: Option<Vec<String>>,
}

impl SavePreferencesRequest {
    fn validate(self) -> Result<PreferencesChangeset, Error> {
        let mut problems = Vec::new();
        if self.user_id.trim().is_empty() {
            problems.push("user_id is required");
        }
        if self.focus_areas.iter().all(|x| x.trim().is_empty()) {
            problems.push("At least one focus area is required");
        }
        if self.emotional_state.trim().is_empty() {
            problems.push("Emotional state is required");
        }
        if self.preferred_tone.trim().is_empty() {
            problems.push("Preferred tone is required");
        }
        if self.style.trim().is_empty() {
            problems.push("Style is required");
        }
        if !problems.is_empty() {
            return Err(Error::Validation(problems.join(", ")));
        }
        Ok(PreferencesChangeset {
            user_id: self.user_id,
            focus_areas: self
                .focus_areas
                .into_iter()
                .filter(|x| !x.trim().is_empty())
                .collect(),
            emotional_state: self.emotional_state,
            preferred_tone: self.preferred_tone,
            language: Some(self.language)
                .filter(|x| !x.trim().is_empty())
                .unwrap_or_else(default_language),
            style: self.style,
            selected_voice: self
                .selected_voice
                .filter(|x| !x.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_VOICE.into()),
            interests: self.interests.unwrap_or_default(),
            updated_at: Utc::now(),
        })
    }
}

/// Preferences as handed to clients.
#[derive(Debug, Serialize, PartialEq)]
pub struct PreferencesView {
    focus_areas: Vec<String>,
    emotional_state: String,
    preferred_tone: String,
    language: String,
    style: String,
    selected_voice: String,
    interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    background_music_url: Option<String>,
}

impl Default for PreferencesView {
    fn default() -> Self {
        PreferencesView {
            focus_areas: vec!["mindfulness".into()],
            emotional_state: "neutral".into(),
            preferred_tone: "gentle".into(),
            language: default_language(),
            style: "inspirational".into(),
            selected_voice: DEFAULT_VOICE.into(),
            interests: vec![],
            background_music_url: None,
        }
    }
}

impl From<UserPreferences> for PreferencesView {
    fn from(x: UserPreferences) -> Self {
        PreferencesView {
            focus_areas: x.focus_areas,
            emotional_state: x.emotional_state,
            preferred_tone: x.preferred_tone,
            language: x.language,
            style: x.style,
            selected_voice: x.selected_voice,
            interests: x.interests,
            background_music_url: x.background_music_url.as_deref().map(audio_urls::music_url),
        }
    }
}

#[derive(Serialize)]
pub struct PreferencesBody {
    preferences: PreferencesView,
}

#[tracing::instrument(
name = "Get preferences.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn get_preferences(user_id: String, ctx: Context) -> Result<PreferencesBody, Error> {
    let preferences = ctx
        .repository
        .get_preferences(&user_id)
        .await?
        .map(PreferencesView::from)
        .unwrap_or_default();
    Ok(PreferencesBody { preferences })
}

#[tracing::instrument(
name = "Save preferences.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn save_preferences(
    ctx: Context,
    request: SavePreferencesRequest,
) -> Result<PreferencesBody, Error> {
    let changeset = request.validate()?;
    let saved = ctx.repository.save_preferences(changeset).await?;
    Ok(PreferencesBody {
        preferences: saved.into(),
    })
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let get_filter = warp::get()
        .and(api("preferences"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(get_preferences)
        .map(map_result);
    let save_filter = warp::post()
        .and(api("preferences"))
        .and(warp::path::end())
        .and(with_context(ctx))
        .and(json_body())
        .then(save_preferences)
        .map(map_result);
    get_filter.or(save_filter).unify().boxed()
}
