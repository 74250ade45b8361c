use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, json_body, with_context, Context, Error};
use crate::audio_urls::{affirmation_audio_key, affirmation_audio_path};
use crate::clients::google_tts::effective_voice;
use crate::clients::openai::default_language;
use crate::util::{cacheable_audio_reply, map_response, map_result, AUDIO_MPEG};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice_name: String,
    #[serde(default = "default_language")]
    language: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesizeRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    voice_name: String,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    user_id: String,
    affirmation_id: Option<i32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSpeech {
    audio_url: String,
    storage_key: String,
}

fn require_text_and_voice(text: &str, voice_name: &str) -> Result<(), Error> {
    if text.trim().is_empty() || voice_name.trim().is_empty() {
        return Err(Error::Validation("Text and voiceName are required".into()));
    }
    Ok(())
}

#[tracing::instrument(
name = "Previewing speech.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn preview(ctx: Context, request: PreviewRequest) -> Result<Response, Error> {
    require_text_and_voice(&request.text, &request.voice_name)?;
    let speech = ctx.speech()?;
    let audio = speech
        .synthesize(&request.text, effective_voice(&request.voice_name), &request.language)
        .await?;
    info!(body_len_bytes = audio.len(), "Speech preview generated.");
    Ok(cacheable_audio_reply(audio))
}

#[tracing::instrument(
name = "Synthesizing and storing speech.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn synthesize(ctx: Context, request: SynthesizeRequest) -> Result<StoredSpeech, Error> {
    require_text_and_voice(&request.text, &request.voice_name)?;
    let affirmation_id = match request.affirmation_id {
        Some(id) if !request.user_id.trim().is_empty() => id,
        _ => {
            return Err(Error::Validation(
                "userId and affirmationId are required".into(),
            ))
        }
    };
    let speech = ctx.speech()?;
    let audio = speech
        .synthesize(&request.text, effective_voice(&request.voice_name), &request.language)
        .await?;
    let storage_key = affirmation_audio_key(&request.user_id, affirmation_id);
    ctx.blobs.put(&storage_key, audio, AUDIO_MPEG).await?;

    // Only record the key on an affirmation the named user owns.
    if let Some(affirmation) = ctx.repository.get_affirmation(affirmation_id).await? {
        if affirmation.user_id == request.user_id {
            ctx.repository
                .set_audio_key(affirmation_id, Some(&storage_key))
                .await?;
        }
    }
    Ok(StoredSpeech {
        audio_url: affirmation_audio_path(affirmation_id),
        storage_key,
    })
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let preview_filter = warp::post()
        .and(api("text-to-speech"))
        .and(warp::path("preview"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(preview)
        .map(map_response);
    let synthesize_filter = warp::post()
        .and(api("text-to-speech"))
        .and(warp::path::end())
        .and(with_context(ctx))
        .and(json_body())
        .then(synthesize)
        .map(map_result);
    preview_filter.or(synthesize_filter).unify().boxed()
}
