use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use futures::{Future, TryStreamExt};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::de::DeserializeOwned;
use warp::filters::multipart::FormData;
use warp::reply::Response;
use warp::{filters::BoxedFilter, Buf, Filter, Rejection};

use crate::clients::google_tts::SpeechSynthesizer;
use crate::clients::openai::AffirmationWriter;
use crate::rate_limit::{ip_rate_limit_filter, path_method_limit_filter, spawn_cleanup};
use crate::repository::Repository;
use crate::storage::BlobStore;
use crate::util;

pub mod affirmations;
pub mod background_music;
pub mod data;
mod errors;
pub mod mood_tracking;
pub mod preferences;
pub mod speech;
pub mod user_voices;
pub mod users;

pub use errors::Error;

const JSON_BODY_LIMIT: u64 = 16 * 1024;
const LIMITER_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

/// Everything a handler needs. Cloned into each filter.
#[derive(Clone)]
pub struct Context {
    pub repository: Arc<dyn Repository>,
    pub blobs: Arc<dyn BlobStore>,
    pub writer: Option<Arc<dyn AffirmationWriter>>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub max_upload_bytes: u64,
}

impl Context {
    pub fn writer(&self) -> Result<&dyn AffirmationWriter, Error> {
        self.writer.as_deref().ok_or(Error::NotConfigured(
            "OpenAI API key is not configured. Please configure OPENAI_API_KEY.",
        ))
    }

    pub fn speech(&self) -> Result<&dyn SpeechSynthesizer, Error> {
        self.speech
            .as_deref()
            .ok_or(Error::NotConfigured("Google Cloud API key is not configured"))
    }
}

/// The user a request acts for, taken from the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct Caller(Option<String>);

impl Caller {
    pub fn require(self) -> Result<String, Error> {
        self.0.ok_or(Error::Unauthenticated)
    }
}

pub fn with_context(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

pub fn caller() -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    warp::header::optional::<String>("x-user-id").map(|user_id: Option<String>| {
        Caller(user_id.map(|x| x.trim().to_string()).filter(|x| !x.is_empty()))
    })
}

pub fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

/// `/api/{segment}` prefix shared by every route.
pub fn api(segment: &'static str) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path("api").and(warp::path(segment))
}

/// One file part of a multipart upload.
#[derive(Debug, Default)]
pub struct UploadedPart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Reads every part of a multipart form into memory, keyed by field name.
pub async fn read_form(form: FormData) -> Result<Vec<(String, UploadedPart)>, Error> {
    let mut parts = Vec::new();
    let mut form = Box::pin(form);
    while let Some(part) = form.try_next().await? {
        let name = part.name().to_string();
        let file_name = part.filename().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);
        let mut bytes = Vec::new();
        let mut stream = Box::pin(part.stream());
        while let Some(mut buf) = stream.try_next().await? {
            while buf.has_remaining() {
                let chunk = buf.chunk();
                let len = chunk.len();
                bytes.extend_from_slice(chunk);
                buf.advance(len);
            }
        }
        parts.push((
            name,
            UploadedPart {
                file_name,
                content_type,
                bytes,
            },
        ));
    }
    Ok(parts)
}

/// Takes the named part out of a read form.
pub fn take_part(parts: &mut Vec<(String, UploadedPart)>, name: &str) -> Option<UploadedPart> {
    let index = parts.iter().position(|(part_name, _)| part_name == name)?;
    Some(parts.swap_remove(index).1)
}

/// Every API route, with rejections turned into JSON errors.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    affirmations::get_filters(ctx.clone())
        .or(speech::get_filters(ctx.clone()))
        .unify()
        .or(preferences::get_filters(ctx.clone()))
        .unify()
        .or(user_voices::get_filters(ctx.clone()))
        .unify()
        .or(users::get_filters(ctx.clone()))
        .unify()
        .or(mood_tracking::get_filters(ctx.clone()))
        .unify()
        .or(background_music::get_filters(ctx.clone()))
        .unify()
        .or(data::get_filters(ctx))
        .unify()
        .recover(util::recover)
        .unify()
        .boxed()
}

pub fn get_server_future(
    ctx: Context,
    bind_address: SocketAddr,
    rate_limit_per_second: u32,
) -> impl Future<Output = ()> {
    let per_second = NonZeroU32::new(rate_limit_per_second).unwrap_or(nonzero!(5u32));
    let ip_limiter = Arc::new(RateLimiter::keyed(Quota::per_second(per_second)));
    spawn_cleanup(ip_limiter.clone(), LIMITER_CLEANUP_PERIOD);
    let ip_rate_limiter = ip_rate_limit_filter(ip_limiter);
    let api_limiter = Arc::new(RateLimiter::keyed(Quota::per_second(per_second)));
    spawn_cleanup(api_limiter.clone(), LIMITER_CLEANUP_PERIOD);
    let api_rate_limiter = path_method_limit_filter(api_limiter);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allow_headers(vec!["content-type", "x-user-id"]);

    warp::serve(
        ip_rate_limiter
            .or(api_rate_limiter)
            .or(routes(ctx))
            .with(cors)
            .with(warp::trace::request()),
    )
    .run(bind_address)
}
