use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, caller, with_context, Caller, Context, Error};
use crate::audio_urls::{custom_music_prefix, is_affirmation_audio_key};
use crate::util::map_result;

#[derive(Serialize)]
pub struct Cleared {
    message: &'static str,
}

/// Storage keys of every blob owned by a user.
async fn owned_keys(ctx: &Context, user_id: &str) -> Result<Vec<String>, Error> {
    let mut keys: Vec<String> = ctx
        .repository
        .list_affirmations(user_id)
        .await?
        .into_iter()
        .filter_map(|x| x.audio_url)
        .filter(|key| is_affirmation_audio_key(key))
        .collect();
    keys.extend(
        ctx.repository
            .list_voices(user_id)
            .await?
            .into_iter()
            .map(|x| x.storage_url),
    );
    keys.extend(
        ctx.blobs
            .list(&custom_music_prefix(user_id))
            .await?
            .into_iter()
            .map(|x| x.key),
    );
    Ok(keys)
}

#[tracing::instrument(
name = "Clearing all user data.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn clear_all(caller: Caller, ctx: Context) -> Result<Cleared, Error> {
    let user_id = caller.require()?;
    let keys = owned_keys(&ctx, &user_id).await?;
    for key in &keys {
        if let Err(e) = ctx.blobs.delete(key).await {
            error!(%key, "Failed to delete blob: {}", e);
        }
    }
    ctx.repository.delete_user_data(&user_id).await?;
    info!(%user_id, blobs = keys.len(), "All data cleared.");
    Ok(Cleared {
        message: "All data cleared successfully",
    })
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    warp::delete()
        .and(api("clear-all-data"))
        .and(warp::path::end())
        .and(caller())
        .and(with_context(ctx))
        .then(clear_all)
        .map(map_result)
        .boxed()
}
