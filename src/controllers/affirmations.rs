use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, json_body, with_context, Context, Error};
use crate::audio_urls::{self, affirmation_audio_key, is_affirmation_audio_key};
use crate::clients::google_tts::{effective_voice, DEFAULT_VOICE};
use crate::clients::openai::{self, default_language, GenerationPreferences};
use crate::models::{Affirmation, NewAffirmation};
use crate::music::select_music_key;
use crate::util::{audio_reply, map_response, map_result, Empty, AUDIO_MPEG};

const MAX_TEXT_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct SaveAffirmationRequest {
    user_id: String,
    text: String,
    focus_area: Option<String>,
    emotional_state: Option<String>,
    tone: Option<String>,
    style: Option<String>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(rename = "voiceName", default = "default_voice")]
    voice_name: String,
}

fn default_voice() -> String {
    DEFAULT_VOICE.into()
}

#[derive(Debug, Deserialize)]
pub struct UpdateAffirmationRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct ToggleFavoriteRequest {
    is_favorite: bool,
}

#[derive(Serialize)]
pub struct GeneratedAffirmations {
    affirmations: Vec<String>,
}

#[derive(Serialize)]
pub struct SavedAffirmation {
    id: i32,
    #[serde(rename = "audioUrl")]
    audio_url: Option<String>,
    #[serde(rename = "backgroundMusicUrl")]
    background_music_url: Option<String>,
}

#[derive(Serialize)]
pub struct AffirmationList {
    affirmations: Vec<Affirmation>,
}

#[derive(Serialize)]
pub struct AffirmationBody {
    affirmation: Affirmation,
}

#[derive(Serialize)]
pub struct AudioLocation {
    #[serde(rename = "audioUrl")]
    audio_url: String,
}

/// Affirmation as handed to clients, with storage keys turned into URLs.
pub fn present(affirmation: Affirmation) -> Affirmation {
    Affirmation {
        audio_url: audio_urls::affirmation_audio_url(affirmation.id, affirmation.audio_url.as_deref()),
        background_music_url: affirmation
            .background_music_url
            .as_deref()
            .map(audio_urls::music_url),
        ..affirmation
    }
}

/// Trimmed affirmation text, or a validation error.
fn validate_text(text: &str) -> Result<String, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::Validation("Affirmation text is required".into()));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(Error::Validation("Affirmation text too long".into()));
    }
    Ok(text.to_string())
}

/// Voice and language from the owner's preferences.
pub(crate) async fn voice_settings(ctx: &Context, user_id: &str) -> Result<(String, String), Error> {
    Ok(match ctx.repository.get_preferences(user_id).await? {
        Some(preferences) => (preferences.selected_voice, preferences.language),
        None => (default_voice(), default_language()),
    })
}

/// Synthesizes the affirmation's text, stores it and records the key.
async fn narrate(
    ctx: &Context,
    affirmation: &Affirmation,
    voice: &str,
    language: &str,
) -> Result<String, Error> {
    let speech = ctx.speech()?;
    let audio = speech
        .synthesize(&affirmation.text, effective_voice(voice), language)
        .await?;
    let key = affirmation_audio_key(&affirmation.user_id, affirmation.id);
    ctx.blobs.put(&key, audio, AUDIO_MPEG).await?;
    ctx.repository.set_audio_key(affirmation.id, Some(&key)).await?;
    Ok(key)
}

#[tracing::instrument(
name = "Generating affirmations.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn generate(
    ctx: Context,
    preferences: GenerationPreferences,
) -> Result<GeneratedAffirmations, Error> {
    let writer = ctx.writer()?;
    let affirmations = openai::generate_affirmations(writer, &preferences).await?;
    Ok(GeneratedAffirmations { affirmations })
}

#[tracing::instrument(
name = "Saving an affirmation.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn save(ctx: Context, request: SaveAffirmationRequest) -> Result<SavedAffirmation, Error> {
    if request.user_id.trim().is_empty() {
        return Err(Error::Validation("user_id is required".into()));
    }
    let text = validate_text(&request.text)?;
    let preferences = ctx.repository.get_preferences(&request.user_id).await?;
    let music_key = select_music_key(
        preferences.as_ref(),
        request.focus_area.as_deref(),
        request.tone.as_deref(),
    );
    let affirmation = ctx
        .repository
        .insert_affirmation(NewAffirmation {
            user_id: request.user_id.clone(),
            text,
            background_music_url: Some(music_key),
            focus_area: request.focus_area,
            emotional_state: request.emotional_state,
            tone: request.tone,
            style: request.style,
            language: request.language.clone(),
        })
        .await?;

    let audio_key = if ctx.speech.is_some() {
        match narrate(&ctx, &affirmation, &request.voice_name, &request.language).await {
            Ok(key) => Some(key),
            Err(err) => {
                error!(affirmation_id = affirmation.id, "Failed to narrate affirmation: {}", err);
                None
            }
        }
    } else {
        info!("Speech synthesis is not configured, saving without audio.");
        None
    };

    Ok(SavedAffirmation {
        id: affirmation.id,
        audio_url: audio_urls::affirmation_audio_url(affirmation.id, audio_key.as_deref()),
        background_music_url: affirmation
            .background_music_url
            .as_deref()
            .map(audio_urls::music_url),
    })
}

#[tracing::instrument(
name = "Listing affirmations.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn list(user_id: String, ctx: Context) -> Result<AffirmationList, Error> {
    let affirmations = ctx.repository.list_affirmations(&user_id).await?;
    Ok(AffirmationList {
        affirmations: affirmations.into_iter().map(present).collect(),
    })
}

#[tracing::instrument(
name = "Editing affirmation text.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn update_text(
    id: i32,
    ctx: Context,
    request: UpdateAffirmationRequest,
) -> Result<AffirmationBody, Error> {
    let text = validate_text(&request.text)?;
    let current = ctx
        .repository
        .get_affirmation(id)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    let mut affirmation = ctx
        .repository
        .update_affirmation_text(id, &text)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    if current.text == affirmation.text {
        return Ok(AffirmationBody {
            affirmation: present(affirmation),
        });
    }

    // Old narration no longer matches the text.
    if let Some(key) = current.audio_url.as_deref() {
        if is_affirmation_audio_key(key) {
            if let Err(err) = ctx.blobs.delete(key).await {
                warn!(affirmation_id = id, "Failed to delete stale narration {}: {}", key, err);
            }
        }
        ctx.repository.set_audio_key(id, None).await?;
        affirmation.audio_url = None;
    }

    if ctx.speech.is_some() {
        let narrated = async {
            let (voice, language) = voice_settings(&ctx, &affirmation.user_id).await?;
            narrate(&ctx, &affirmation, &voice, &language).await
        }
        .await;
        match narrated {
            Ok(key) => affirmation.audio_url = Some(key),
            Err(err) => warn!(affirmation_id = id, "Failed to re-narrate edited affirmation: {}", err),
        }
    }
    Ok(AffirmationBody {
        affirmation: present(affirmation),
    })
}

#[tracing::instrument(
name = "Setting favorite flag.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn set_favorite(
    id: i32,
    ctx: Context,
    request: ToggleFavoriteRequest,
) -> Result<AffirmationBody, Error> {
    let affirmation = ctx
        .repository
        .set_favorite(id, request.is_favorite)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    Ok(AffirmationBody {
        affirmation: present(affirmation),
    })
}

#[tracing::instrument(
name = "Deleting an affirmation.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn delete(id: i32, ctx: Context) -> Result<Empty, Error> {
    let affirmation = ctx
        .repository
        .get_affirmation(id)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    if let Some(key) = affirmation.audio_url.as_deref().filter(|k| is_affirmation_audio_key(k)) {
        if let Err(err) = ctx.blobs.delete(key).await {
            error!(affirmation_id = id, "Failed to delete narration blob {}: {}", key, err);
        }
    }
    ctx.repository.delete_affirmation(id).await?;
    Ok(Empty {})
}

#[tracing::instrument(
name = "Generating affirmation audio.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn generate_audio(id: i32, ctx: Context) -> Result<AudioLocation, Error> {
    let affirmation = ctx
        .repository
        .get_affirmation(id)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    if affirmation.text.trim().is_empty() {
        return Err(Error::Validation("Affirmation text is missing".into()));
    }
    ctx.speech()?;
    let (voice, language) = voice_settings(&ctx, &affirmation.user_id).await?;
    info!(affirmation_id = id, voice = %voice, "Generating audio for affirmation.");
    narrate(&ctx, &affirmation, &voice, &language).await?;
    Ok(AudioLocation {
        audio_url: audio_urls::affirmation_audio_path(id),
    })
}

#[tracing::instrument(
name = "Serving affirmation audio.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn audio(id: i32, ctx: Context) -> Result<Response, Error> {
    let affirmation = ctx
        .repository
        .get_affirmation(id)
        .await?
        .ok_or(Error::NotFound("Affirmation"))?;
    let key = match affirmation.audio_url.as_deref() {
        Some(key) if is_affirmation_audio_key(key) => key.to_string(),
        _ => affirmation_audio_key(&affirmation.user_id, id),
    };

    let mut blob = ctx.blobs.get(&key).await?;
    if blob.is_none() && ctx.speech.is_some() {
        info!(affirmation_id = id, "Audio not found, generating it now.");
        let regenerated = async {
            let (voice, language) = voice_settings(&ctx, &affirmation.user_id).await?;
            narrate(&ctx, &affirmation, &voice, &language).await
        }
        .await;
        match regenerated {
            Ok(key) => blob = ctx.blobs.get(&key).await?,
            Err(err) => error!(affirmation_id = id, "Failed to generate audio on the fly: {}", err),
        }
    }
    let blob = blob.ok_or(Error::NotFound("Audio file"))?;
    Ok(audio_reply(blob.bytes, AUDIO_MPEG, blob.e_tag.as_deref()))
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let generate_filter = warp::post()
        .and(api("affirmations"))
        .and(warp::path("generate"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(generate)
        .map(map_result);
    let save_filter = warp::post()
        .and(api("affirmations"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(save)
        .map(map_result);
    let list_filter = warp::get()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(list)
        .map(map_result);
    let update_filter = warp::patch()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(update_text)
        .map(map_result);
    let favorite_filter = warp::patch()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path("favorite"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(set_favorite)
        .map(map_result);
    let delete_filter = warp::delete()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(delete)
        .map(map_result);
    let generate_audio_filter = warp::post()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path("generate-audio"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(generate_audio)
        .map(map_result);
    let audio_filter = warp::get()
        .and(api("affirmations"))
        .and(warp::path::param())
        .and(warp::path("audio"))
        .and(warp::path::end())
        .and(with_context(ctx))
        .then(audio)
        .map(map_response);
    generate_filter
        .or(save_filter)
        .unify()
        .or(list_filter)
        .unify()
        .or(update_filter)
        .unify()
        .or(favorite_filter)
        .unify()
        .or(delete_filter)
        .unify()
        .or(generate_audio_filter)
        .unify()
        .or(audio_filter)
        .unify()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::google_tts::stub::StubSynthesizer;
    use crate::clients::openai::stub::StubWriter;
    use crate::controllers::test_support::{json_of, Harness};
    use crate::models::PreferencesChangeset;
    use crate::repository::Repository;
    use crate::storage::BlobStore;
    use chrono::Utc;
    use serde_json::json;
    use tokio_test::assert_ok;

    async fn save_text(harness: &Harness, text: &str) -> serde_json::Value {
        let response = warp::test::request()
            .method("POST")
            .path("/api/affirmations")
            .json(&json!({ "user_id": "user_a", "text": text, "tone": "motivating" }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200, "{:?}", response.body());
        json_of(&response)
    }

    #[tokio::test]
    async fn generate_returns_five_clean_lines() {
        let harness = Harness::new().with_writer(StubWriter::replying(
            "1. I am calm\n2. I am strong\n- I am kind\n* I am brave\n\"I am enough\"",
        ));
        let response = warp::test::request()
            .method("POST")
            .path("/api/affirmations/generate")
            .json(&json!({
                "focus_areas": ["confidence"],
                "emotional_state": "anxious",
                "preferred_tone": "gentle",
                "style": "short"
            }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        let body = json_of(&response);
        assert_eq!(body["success"], true);
        assert_eq!(
            body["affirmations"],
            json!(["I am calm", "I am strong", "I am kind", "I am brave", "I am enough"])
        );
    }

    #[tokio::test]
    async fn generate_without_writer_is_not_configured() {
        let harness = Harness::new();
        let response = warp::test::request()
            .method("POST")
            .path("/api/affirmations/generate")
            .json(&json!({
                "focus_areas": ["calm"],
                "emotional_state": "neutral",
                "preferred_tone": "gentle",
                "style": "short"
            }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 500);
        assert!(json_of(&response)["error"]
            .as_str()
            .unwrap()
            .contains("OpenAI API key is not configured"));
    }

    #[tokio::test]
    async fn generate_surfaces_rate_limits() {
        let harness = Harness::new().with_writer(StubWriter::failing(429));
        let response = warp::test::request()
            .method("POST")
            .path("/api/affirmations/generate")
            .json(&json!({
                "focus_areas": ["calm"],
                "emotional_state": "neutral",
                "preferred_tone": "gentle",
                "style": "short"
            }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 429);
    }

    #[tokio::test]
    async fn save_narrates_and_assigns_music() {
        let harness = Harness::new();
        let body = save_text(&harness, "  I am enough  ").await;
        let id = body["id"].as_i64().unwrap() as i32;
        assert_eq!(body["audioUrl"], format!("/api/affirmations/{}/audio", id));
        assert_eq!(body["backgroundMusicUrl"], "/api/background-music/nature/peaceful");

        let stored = harness.repository.get_affirmation(id).await.unwrap().unwrap();
        assert_eq!(stored.text, "I am enough");
        assert_eq!(stored.audio_url, Some(format!("affirmations/user_a/{}.mp3", id)));
        assert!(harness.blobs.contains(&format!("affirmations/user_a/{}.mp3", id)).await);
    }

    #[tokio::test]
    async fn save_survives_synthesis_failure() {
        let harness = Harness::new().with_speech(StubSynthesizer::failing(500));
        let body = save_text(&harness, "I am resilient").await;
        assert_eq!(body["success"], true);
        assert_eq!(body["audioUrl"], serde_json::Value::Null);
        assert!(harness.blobs.keys().await.is_empty());
    }

    #[tokio::test]
    async fn save_rejects_overlong_text() {
        let harness = Harness::new();
        let response = warp::test::request()
            .method("POST")
            .path("/api/affirmations")
            .json(&json!({ "user_id": "user_a", "text": "a".repeat(501) }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 400);
        assert_eq!(json_of(&response)["error"], "Affirmation text too long");
    }

    #[tokio::test]
    async fn save_uses_custom_music_override() {
        let harness = Harness::new().without_speech();
        harness
            .repository
            .save_preferences(PreferencesChangeset {
                user_id: "user_a".into(),
                focus_areas: vec!["anxiety".into()],
                emotional_state: "neutral".into(),
                preferred_tone: "gentle".into(),
                language: "en".into(),
                style: "inspirational".into(),
                selected_voice: "sarah".into(),
                interests: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        harness
            .repository
            .set_background_music("user_a", Some("background-music/custom/user_a/9.mp3".into()))
            .await
            .unwrap();
        let body = save_text(&harness, "I am at ease").await;
        assert_eq!(body["backgroundMusicUrl"], "/api/background-music/custom/user_a/9.mp3");
        assert_eq!(body["audioUrl"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn list_normalizes_urls() {
        let harness = Harness::new();
        let saved = save_text(&harness, "I am grounded").await;
        let response = warp::test::request()
            .path("/api/affirmations/user_a")
            .reply(&harness.routes())
            .await;
        let body = json_of(&response);
        let first = &body["affirmations"][0];
        assert_eq!(first["id"], saved["id"]);
        assert_eq!(first["audio_url"], saved["audioUrl"]);
        assert_eq!(first["background_music_url"], "/api/background-music/nature/peaceful");
    }

    #[tokio::test]
    async fn favorite_flip_and_flip_back_restores_state() {
        let harness = Harness::new().without_speech();
        let id = save_text(&harness, "I am loved").await["id"].as_i64().unwrap();
        for value in [true, false] {
            let response = warp::test::request()
                .method("PATCH")
                .path(&format!("/api/affirmations/{}/favorite", id))
                .json(&json!({ "is_favorite": value }))
                .reply(&harness.routes())
                .await;
            assert_eq!(json_of(&response)["affirmation"]["is_favorite"], value);
        }
        let stored = harness.repository.get_affirmation(id as i32).await.unwrap().unwrap();
        assert!(!stored.is_favorite);
    }

    #[tokio::test]
    async fn favorite_on_missing_affirmation_is_404() {
        let harness = Harness::new();
        let response = warp::test::request()
            .method("PATCH")
            .path("/api/affirmations/999/favorite")
            .json(&json!({ "is_favorite": true }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 404);
        assert_eq!(json_of(&response)["error"], "Affirmation not found");
    }

    #[tokio::test]
    async fn edit_trims_and_renarrates() {
        let harness = Harness::new();
        let id = save_text(&harness, "I am here").await["id"].as_i64().unwrap();
        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/affirmations/{}", id))
            .json(&json!({ "text": "  I am fully here " }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(json_of(&response)["affirmation"]["text"], "I am fully here");
        let blob = harness
            .blobs
            .get(&format!("affirmations/user_a/{}.mp3", id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.bytes, b"mp3:I am fully here");
    }

    #[tokio::test]
    async fn edit_with_failing_synthesis_drops_old_audio() {
        let harness = Harness::new();
        let id = save_text(&harness, "I am here").await["id"].as_i64().unwrap() as i32;
        let key = format!("affirmations/user_a/{}.mp3", id);
        assert!(harness.blobs.contains(&key).await);

        let harness = harness.with_speech(StubSynthesizer::failing(500));
        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/affirmations/{}", id))
            .json(&json!({ "text": "I am somewhere new" }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        let body = json_of(&response);
        assert_eq!(body["affirmation"]["text"], "I am somewhere new");
        assert_eq!(body["affirmation"]["audio_url"], serde_json::Value::Null);
        assert!(!harness.blobs.contains(&key).await);
        let stored = harness.repository.get_affirmation(id).await.unwrap().unwrap();
        assert_eq!(stored.audio_url, None);

        let harness = harness.with_speech(StubSynthesizer::default());
        let response = warp::test::request()
            .path(&format!("/api/affirmations/{}/audio", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"mp3:I am somewhere new");
    }

    #[tokio::test]
    async fn edit_without_speech_drops_old_audio() {
        let harness = Harness::new().without_speech();
        let id = save_text(&harness, "I am here").await["id"].as_i64().unwrap() as i32;
        let key = format!("affirmations/user_a/{}.mp3", id);
        harness.blobs.put(&key, b"mp3:I am here".to_vec(), AUDIO_MPEG).await.unwrap();
        harness.repository.set_audio_key(id, Some(&key)).await.unwrap();

        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/affirmations/{}", id))
            .json(&json!({ "text": "I am elsewhere" }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        let body = json_of(&response);
        assert_eq!(body["affirmation"]["text"], "I am elsewhere");
        assert_eq!(body["affirmation"]["audio_url"], serde_json::Value::Null);
        assert!(harness.blobs.keys().await.is_empty());
        let stored = harness.repository.get_affirmation(id).await.unwrap().unwrap();
        assert_eq!(stored.audio_url, None);
    }

    #[tokio::test]
    async fn edit_with_same_text_keeps_audio() {
        let harness = Harness::new().without_speech();
        let id = save_text(&harness, "I am here").await["id"].as_i64().unwrap() as i32;
        let key = format!("affirmations/user_a/{}.mp3", id);
        harness.blobs.put(&key, b"mp3:I am here".to_vec(), AUDIO_MPEG).await.unwrap();
        harness.repository.set_audio_key(id, Some(&key)).await.unwrap();

        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/affirmations/{}", id))
            .json(&json!({ "text": " I am here " }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(
            json_of(&response)["affirmation"]["audio_url"],
            format!("/api/affirmations/{}/audio", id)
        );
        assert!(harness.blobs.contains(&key).await);
    }

    #[tokio::test]
    async fn edit_rejects_blank_text() {
        let harness = Harness::new();
        let id = save_text(&harness, "I am here").await["id"].as_i64().unwrap();
        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/api/affirmations/{}", id))
            .json(&json!({ "text": "   " }))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn delete_removes_row_and_narration() {
        let harness = Harness::new();
        let id = save_text(&harness, "I let go").await["id"].as_i64().unwrap() as i32;
        let key = format!("affirmations/user_a/{}.mp3", id);
        assert!(harness.blobs.contains(&key).await);

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/affirmations/{}", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert!(harness.repository.get_affirmation(id).await.unwrap().is_none());
        assert!(!harness.blobs.contains(&key).await);
    }

    #[tokio::test]
    async fn delete_without_audio_only_removes_row() {
        let harness = Harness::new().without_speech();
        harness
            .blobs
            .put("background-music/nature/peaceful.mp3", vec![1], AUDIO_MPEG)
            .await
            .unwrap();
        let id = save_text(&harness, "I let go").await["id"].as_i64().unwrap() as i32;
        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/affirmations/{}", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert!(harness.repository.get_affirmation(id).await.unwrap().is_none());
        assert_eq!(harness.blobs.keys().await, vec!["background-music/nature/peaceful.mp3"]);

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/affirmations/{}", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn audio_is_regenerated_when_blob_is_missing() {
        let harness = Harness::new();
        let id = save_text(&harness, "I breathe").await["id"].as_i64().unwrap() as i32;
        let key = format!("affirmations/user_a/{}.mp3", id);
        assert_ok!(harness.blobs.delete(&key).await);

        let response = warp::test::request()
            .path(&format!("/api/affirmations/{}/audio", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["content-type"], "audio/mpeg");
        assert!(response.headers().contains_key("etag"));
        assert_eq!(response.body().as_ref(), b"mp3:I breathe");
    }

    #[tokio::test]
    async fn audio_missing_without_speech_is_404() {
        let harness = Harness::new().without_speech();
        let id = save_text(&harness, "I breathe").await["id"].as_i64().unwrap();
        let response = warp::test::request()
            .path(&format!("/api/affirmations/{}/audio", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 404);
        assert_eq!(json_of(&response)["error"], "Audio file not found");
    }

    #[tokio::test]
    async fn generate_audio_uses_preferred_voice_and_falls_back_for_custom() {
        let harness = Harness::new();
        harness
            .repository
            .save_preferences(PreferencesChangeset {
                user_id: "user_a".into(),
                focus_areas: vec!["calm".into()],
                emotional_state: "neutral".into(),
                preferred_tone: "gentle".into(),
                language: "es-ES".into(),
                style: "inspirational".into(),
                selected_voice: "custom_4".into(),
                interests: vec![],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let id = save_text(&harness, "Soy suficiente").await["id"].as_i64().unwrap();
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/api/affirmations/{}/generate-audio", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(json_of(&response)["audioUrl"], format!("/api/affirmations/{}/audio", id));
        let calls = harness.speech.as_ref().unwrap().calls.lock().await;
        let (_, voice, language) = calls.last().unwrap();
        assert_eq!(voice, "sarah");
        assert_eq!(language, "es-ES");
    }

    #[tokio::test]
    async fn generate_audio_requires_speech() {
        let harness = Harness::new().without_speech();
        let id = save_text(&harness, "I am").await["id"].as_i64().unwrap();
        let response = warp::test::request()
            .method("POST")
            .path(&format!("/api/affirmations/{}/generate-audio", id))
            .reply(&harness.routes())
            .await;
        assert_eq!(response.status(), 500);
        assert_eq!(json_of(&response)["error"], "Google Cloud API key is not configured");
    }
}
