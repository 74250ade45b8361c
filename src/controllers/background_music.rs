use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use warp::filters::multipart::FormData;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, caller, read_form, take_part, with_context, Caller, Context, Error, UploadedPart};
use crate::audio_urls::{
    builtin_music_key, custom_music_key, custom_music_path, custom_music_prefix, file_extension,
    is_valid_file_name, is_valid_style, music_url,
};
use crate::music::{MusicStyle, STYLES};
use crate::util::{audio_reply, map_response, map_result, Empty, AUDIO_MPEG};

const DEFAULT_EXTENSION: &str = "mp3";
const CUSTOM_CATEGORY: &str = "custom";

#[derive(Serialize)]
pub struct StyleCatalogue {
    styles: &'static [MusicStyle],
}

#[derive(Serialize, Debug)]
pub struct CustomTrack {
    filename: String,
    storage_url: String,
    audio_url: String,
    size: i64,
    uploaded_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomTracks {
    music_files: Vec<CustomTrack>,
}

#[derive(Serialize)]
pub struct UploadedTrack {
    storage_url: String,
    audio_url: String,
}

fn require_audio(parts: &mut Vec<(String, UploadedPart)>) -> Result<UploadedPart, Error> {
    take_part(parts, "audio")
        .filter(|part| !part.bytes.is_empty())
        .ok_or_else(|| Error::Validation("No audio file provided".into()))
}

async fn serve(ctx: &Context, key: &str) -> Result<Response, Error> {
    let blob = ctx
        .blobs
        .get(key)
        .await?
        .ok_or(Error::NotFound("Music file"))?;
    Ok(audio_reply(blob.bytes, AUDIO_MPEG, blob.e_tag.as_deref()))
}

pub async fn styles() -> Result<StyleCatalogue, Error> {
    Ok(StyleCatalogue { styles: STYLES })
}

#[tracing::instrument(
name = "Serving built-in music.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn builtin(category: String, name: String, ctx: Context) -> Result<Response, Error> {
    let style = format!("{}/{}", category, name);
    if category == CUSTOM_CATEGORY || !is_valid_style(&style) {
        return Err(Error::NotFound("Music file"));
    }
    serve(&ctx, &builtin_music_key(&style)).await
}

#[tracing::instrument(
name = "Serving single segment music style.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn builtin_single(style: String, ctx: Context) -> Result<Response, Error> {
    if !is_valid_style(&style) {
        return Err(Error::NotFound("Music file"));
    }
    serve(&ctx, &builtin_music_key(&style)).await
}

#[tracing::instrument(
name = "Listing custom music.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn list_custom(caller: Caller, ctx: Context) -> Result<CustomTracks, Error> {
    let user_id = caller.require()?;
    let prefix = custom_music_prefix(&user_id);
    let mut music_files: Vec<CustomTrack> = ctx
        .blobs
        .list(&prefix)
        .await?
        .into_iter()
        .filter_map(|summary| {
            let filename = summary.key.strip_prefix(&prefix)?.to_string();
            if !is_valid_file_name(&filename) {
                return None;
            }
            Some(CustomTrack {
                audio_url: custom_music_path(&user_id, &filename),
                filename,
                storage_url: summary.key,
                size: summary.size,
                uploaded_at: summary.last_modified,
            })
        })
        .collect();
    music_files.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    Ok(CustomTracks { music_files })
}

#[tracing::instrument(
name = "Serving custom music.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn custom(user_id: String, file_name: String, ctx: Context) -> Result<Response, Error> {
    if !is_valid_file_name(&file_name) {
        return Err(Error::NotFound("Music file"));
    }
    serve(&ctx, &custom_music_key(&user_id, &file_name)).await
}

#[tracing::instrument(
name = "Uploading custom music.",
err,
level = "info",
skip(ctx, form),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn upload(caller: Caller, ctx: Context, form: FormData) -> Result<UploadedTrack, Error> {
    let user_id = caller.require()?;
    let mut parts = read_form(form).await?;
    let audio = require_audio(&mut parts)?;
    let file_name = format!(
        "{}.{}",
        Utc::now().timestamp_millis(),
        file_extension(audio.file_name.as_deref(), DEFAULT_EXTENSION)
    );
    let storage_key = custom_music_key(&user_id, &file_name);
    let content_type = audio.content_type.as_deref().unwrap_or(AUDIO_MPEG);
    info!(body_len_bytes = audio.bytes.len(), key = %storage_key, "Storing custom music.");
    ctx.blobs.put(&storage_key, audio.bytes, content_type).await?;

    let updated = ctx
        .repository
        .set_background_music(&user_id, Some(storage_key.clone()))
        .await?;
    if !updated {
        warn!(%user_id, "No preferences saved yet, custom music not selected.");
    }
    Ok(UploadedTrack {
        audio_url: custom_music_path(&user_id, &file_name),
        storage_url: storage_key,
    })
}

#[tracing::instrument(
name = "Uploading built-in music.",
err,
level = "info",
skip(ctx, form),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn upload_builtin(ctx: Context, form: FormData) -> Result<UploadedTrack, Error> {
    let mut parts = read_form(form).await?;
    let audio = require_audio(&mut parts)?;
    let style = take_part(&mut parts, "style")
        .and_then(|x| String::from_utf8(x.bytes).ok())
        .map(|x| x.trim().to_string())
        .unwrap_or_default();
    if !is_valid_style(&style) || style.starts_with("custom/") {
        return Err(Error::Validation(format!("Invalid music style: {}", style)));
    }
    let storage_key = builtin_music_key(&style);
    info!(body_len_bytes = audio.bytes.len(), key = %storage_key, "Storing built-in music.");
    ctx.blobs.put(&storage_key, audio.bytes, AUDIO_MPEG).await?;
    Ok(UploadedTrack {
        audio_url: music_url(&storage_key),
        storage_url: storage_key,
    })
}

#[tracing::instrument(
name = "Deleting custom music.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn delete_custom(
    user_id: String,
    file_name: String,
    caller: Caller,
    ctx: Context,
) -> Result<Empty, Error> {
    let caller_id = caller.require()?;
    if caller_id != user_id {
        return Err(Error::Forbidden("Cannot delete another user's music"));
    }
    if !is_valid_file_name(&file_name) {
        return Err(Error::NotFound("Music file"));
    }
    let storage_key = custom_music_key(&user_id, &file_name);
    if !ctx.blobs.exists(&storage_key).await? {
        return Err(Error::NotFound("Music file"));
    }
    ctx.blobs.delete(&storage_key).await?;

    let selected = ctx
        .repository
        .get_preferences(&user_id)
        .await?
        .and_then(|x| x.background_music_url);
    if selected.as_deref() == Some(storage_key.as_str()) {
        info!(%user_id, "Deleted track was selected, clearing preference.");
        ctx.repository.set_background_music(&user_id, None).await?;
    }
    Ok(Empty {})
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let styles_filter = warp::get()
        .and(api("background-music"))
        .and(warp::path("styles"))
        .and(warp::path::end())
        .then(styles)
        .map(map_result);
    let list_custom_filter = warp::get()
        .and(api("background-music"))
        .and(warp::path(CUSTOM_CATEGORY))
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx.clone()))
        .then(list_custom)
        .map(map_result);
    let custom_filter = warp::get()
        .and(api("background-music"))
        .and(warp::path(CUSTOM_CATEGORY))
        .and(warp::path::param())
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(custom)
        .map(map_response);
    let builtin_filter = warp::get()
        .and(api("background-music"))
        .and(warp::path::param())
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(builtin)
        .map(map_response);
    let builtin_single_filter = warp::get()
        .and(api("background-music"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .then(builtin_single)
        .map(map_response);
    let upload_filter = warp::post()
        .and(api("background-music"))
        .and(warp::path("upload"))
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx.clone()))
        .and(warp::multipart::form().max_length(ctx.max_upload_bytes))
        .then(upload)
        .map(map_result);
    let upload_builtin_filter = warp::post()
        .and(api("background-music"))
        .and(warp::path("upload-built-in"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(warp::multipart::form().max_length(ctx.max_upload_bytes))
        .then(upload_builtin)
        .map(map_result);
    let delete_filter = warp::delete()
        .and(api("background-music"))
        .and(warp::path(CUSTOM_CATEGORY))
        .and(warp::path::param())
        .and(warp::path::param())
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx))
        .then(delete_custom)
        .map(map_result);
    styles_filter
        .or(list_custom_filter)
        .unify()
        .or(custom_filter)
        .unify()
        .or(builtin_filter)
        .unify()
        .or(builtin_single_filter)
        .unify()
        .or(upload_filter)
        .unify()
        .or(upload_builtin_filter)
        .unify()
        .or(delete_filter)
        .unify()
        .boxed()
}
