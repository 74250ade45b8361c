use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use warp::filters::multipart::FormData;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, caller, read_form, take_part, with_context, Caller, Context, Error};
use crate::audio_urls::{file_extension, user_voice_key};
use crate::models::{NewUserVoice, UserVoice, VoiceType};
use crate::util::{audio_reply, map_response, map_result};

const DEFAULT_EXTENSION: &str = "webm";
const DEFAULT_CONTENT_TYPE: &str = "audio/webm";

#[derive(Serialize)]
pub struct UploadedVoice {
    id: i32,
    storage_url: String,
    original_filename: Option<String>,
    voice_type: VoiceType,
    is_active: bool,
}

#[derive(Serialize)]
pub struct VoiceList {
    voices: Vec<UserVoice>,
}

fn text_field(bytes: Vec<u8>) -> Option<String> {
    String::from_utf8(bytes)
        .ok()
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
}

#[tracing::instrument(
name = "Uploading a voice sample.",
err,
level = "info",
skip(ctx, form),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn upload(caller: Caller, ctx: Context, form: FormData) -> Result<UploadedVoice, Error> {
    let user_id = caller.require()?;
    let mut parts = read_form(form).await?;
    let audio = take_part(&mut parts, "audio")
        .filter(|part| !part.bytes.is_empty())
        .ok_or_else(|| Error::Validation("No audio file provided".into()))?;
    let voice_type = match take_part(&mut parts, "voice_type").and_then(|x| text_field(x.bytes)) {
        Some(kind) => kind.parse::<VoiceType>().map_err(Error::Validation)?,
        None => VoiceType::Recorded,
    };
    let sample_text = take_part(&mut parts, "sample_text").and_then(|x| text_field(x.bytes));
    let duration_seconds = match take_part(&mut parts, "duration_seconds").and_then(|x| text_field(x.bytes)) {
        Some(value) => Some(
            value
                .parse::<f64>()
                .ok()
                .filter(|x| x.is_finite() && *x >= 0.0)
                .ok_or_else(|| Error::Validation("duration_seconds must be a positive number".into()))?,
        ),
        None => None,
    };

    let extension = file_extension(audio.file_name.as_deref(), DEFAULT_EXTENSION);
    let storage_key = user_voice_key(
        &user_id,
        &format!("{}.{}", Utc::now().timestamp_millis(), extension),
    );
    let content_type = audio
        .content_type
        .clone()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
    info!(body_len_bytes = audio.bytes.len(), key = %storage_key, "Storing voice sample.");
    ctx.blobs.put(&storage_key, audio.bytes, &content_type).await?;

    let voice = ctx
        .repository
        .insert_active_voice(NewUserVoice {
            user_id,
            voice_type,
            storage_url: storage_key,
            original_filename: audio.file_name,
            duration_seconds,
            sample_text,
            is_active: true,
        })
        .await?;
    Ok(UploadedVoice {
        id: voice.id,
        storage_url: voice.storage_url,
        original_filename: voice.original_filename,
        voice_type: voice.voice_type,
        is_active: voice.is_active,
    })
}

#[tracing::instrument(
name = "Listing voices.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn list(caller: Caller, ctx: Context) -> Result<VoiceList, Error> {
    let user_id = caller.require()?;
    Ok(VoiceList {
        voices: ctx.repository.list_voices(&user_id).await?,
    })
}

#[tracing::instrument(
name = "Serving voice audio.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn audio(id: i32, ctx: Context) -> Result<Response, Error> {
    let voice = ctx
        .repository
        .get_voice(id)
        .await?
        .ok_or(Error::NotFound("Voice"))?;
    let blob = ctx
        .blobs
        .get(&voice.storage_url)
        .await?
        .ok_or(Error::NotFound("Audio file"))?;
    let content_type = blob
        .content_type
        .clone()
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
    Ok(audio_reply(blob.bytes, &content_type, blob.e_tag.as_deref()))
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let upload_filter = warp::post()
        .and(api("user-voices"))
        .and(warp::path("upload"))
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx.clone()))
        .and(warp::multipart::form().max_length(ctx.max_upload_bytes))
        .then(upload)
        .map(map_result);
    let list_filter = warp::get()
        .and(api("user-voices"))
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx.clone()))
        .then(list)
        .map(map_result);
    let audio_filter = warp::get()
        .and(api("user-voices"))
        .and(warp::path::param())
        .and(warp::path("audio"))
        .and(warp::path::end())
        .and(with_context(ctx))
        .then(audio)
        .map(map_response);
    upload_filter
        .or(list_filter)
        .unify()
        .or(audio_filter)
        .unify()
        .boxed()
}
