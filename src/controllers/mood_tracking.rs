use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warp::filters::BoxedFilter;
use warp::reply::Response;
use warp::Filter;

use super::{api, json_body, with_context, Context, Error};
use crate::models::{MoodEntry, NewMoodEntry};
use crate::repository::MOOD_HISTORY_LIMIT;
use crate::util::map_result;

#[derive(Debug, Deserialize)]
pub struct TrackMoodRequest {
    #[serde(default)]
    user_id: String,
    mood_before: Option<String>,
    mood_after: Option<String>,
    affirmation_id: Option<i32>,
}

#[derive(Serialize)]
pub struct Tracked {
    id: i32,
}

#[derive(Serialize)]
pub struct MoodHistory {
    mood_tracking: Vec<MoodEntry>,
}

fn mood_label(value: Option<String>) -> Option<String> {
    value.map(|x| x.trim().to_string()).filter(|x| !x.is_empty())
}

#[tracing::instrument(
name = "Tracking a mood.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn track(ctx: Context, request: TrackMoodRequest) -> Result<Tracked, Error> {
    let user_id = request.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(Error::Validation("user_id is required".into()));
    }
    let mood_before = mood_label(request.mood_before);
    let mood_after = mood_label(request.mood_after);
    if mood_before.is_none() && mood_after.is_none() {
        return Err(Error::Validation(
            "At least one of mood_before or mood_after is required".into(),
        ));
    }
    if let Some(id) = request.affirmation_id {
        ctx.repository
            .get_affirmation(id)
            .await?
            .ok_or(Error::NotFound("Affirmation"))?;
    }
    let entry = ctx
        .repository
        .insert_mood(NewMoodEntry {
            user_id,
            mood_before,
            mood_after,
            affirmation_id: request.affirmation_id,
        })
        .await?;
    Ok(Tracked { id: entry.id })
}

#[tracing::instrument(
name = "Get mood history.",
err,
level = "info",
skip(ctx),
fields(
    request_id = %Uuid::new_v4(),
)
)]
pub async fn history(user_id: String, ctx: Context) -> Result<MoodHistory, Error> {
    Ok(MoodHistory {
        mood_tracking: ctx
            .repository
            .list_moods(&user_id, MOOD_HISTORY_LIMIT)
            .await?,
    })
}

pub fn get_filters(ctx: Context) -> BoxedFilter<(Response,)> {
    let track_filter = warp::post()
        .and(api("mood-tracking"))
        .and(warp::path::end())
        .and(with_context(ctx.clone()))
        .and(json_body())
        .then(track)
        .map(map_result);
    let history_filter = warp::get()
        .and(api("mood-tracking"))
        .and(warp::path::param())
        .and(warp::path::end())
        .and(with_context(ctx))
        .then(history)
        .map(map_result);
    track_filter.or(history_filter).unify().boxed()
}
