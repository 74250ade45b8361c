use std::convert::Infallible;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::error;
use warp::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, ETAG};
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::{Rejection, Reply};

use crate::clients::{google_tts, openai};
use crate::controllers::Error;

pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Body of every successful JSON reply. The payload's fields sit next to
/// `success`.
#[derive(Serialize)]
pub struct Success<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ErrorMessage {
    pub success: bool,
    pub error: String,
}

impl From<&str> for ErrorMessage {
    fn from(x: &str) -> Self {
        x.to_owned().into()
    }
}

impl From<String> for ErrorMessage {
    fn from(error: String) -> Self {
        ErrorMessage {
            success: false,
            error,
        }
    }
}

/// An empty payload, for replies that only report success.
#[derive(Serialize)]
pub struct Empty {}

pub fn map_result(result: Result<impl Serialize, Error>) -> Response {
    match result {
        Ok(body) => reply::with_status(
            reply::json(&Success {
                success: true,
                body,
            }),
            StatusCode::OK,
        )
        .into_response(),
        Err(err) => error_reply(err),
    }
}

/// Like [`map_result`], for handlers that build their own reply.
pub fn map_response(result: Result<Response, Error>) -> Response {
    result.unwrap_or_else(error_reply)
}

fn error_reply(err: Error) -> Response {
    let internal_server_error: (StatusCode, ErrorMessage) = (
        StatusCode::INTERNAL_SERVER_ERROR,
        "An internal exception occurred.".into(),
    );
    let (status, body) = match &err {
        Error::Validation(_) | Error::Multipart(_) => (StatusCode::BAD_REQUEST, err.to_string().into()),
        Error::Unauthenticated => (StatusCode::UNAUTHORIZED, err.to_string().into()),
        Error::Forbidden(_) => (StatusCode::FORBIDDEN, err.to_string().into()),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string().into()),
        Error::NotConfigured(message) => (StatusCode::INTERNAL_SERVER_ERROR, (*message).into()),
        Error::Generation(openai::Error::Status { status, message }) => match status {
            401 | 403 => (
                provider_status(*status),
                "OpenAI API authentication failed. Please check your API key.".into(),
            ),
            429 => (
                StatusCode::TOO_MANY_REQUESTS,
                "OpenAI API rate limit exceeded. Please try again later.".into(),
            ),
            _ => (provider_status(*status), message.as_str().into()),
        },
        Error::Generation(openai::Error::EmptyResponse) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate affirmations. Please try again or check OpenAI API configuration."
                .into(),
        ),
        Error::Generation(openai::Error::Request(_)) => internal_server_error,
        Error::Speech(google_tts::Error::Status { status, message }) => {
            (provider_status(*status), message.as_str().into())
        }
        Error::Speech(_) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string().into()),
        Error::Repository(_) => internal_server_error,
        Error::Storage(_) => internal_server_error,
    };
    error!(
        "Returning error body: {}, StatusCode: {}, Source: {}",
        body.error, status, err
    );
    reply::with_status(reply::json(&body), status).into_response()
}

/// Provider statuses outside the error range become a 500.
fn provider_status(status: u16) -> StatusCode {
    match StatusCode::from_u16(status) {
        Ok(code) if code.is_client_error() || code.is_server_error() => code,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Raw audio reply carrying the blob's content type and ETag.
pub fn audio_reply(bytes: Vec<u8>, content_type: &str, e_tag: Option<&str>) -> Response {
    let mut response = Response::new(bytes.into());
    let headers = response.headers_mut();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or_else(|_| HeaderValue::from_static(AUDIO_MPEG)),
    );
    if let Some(tag) = e_tag.and_then(|x| HeaderValue::from_str(x).ok()) {
        headers.insert(ETAG, tag);
    }
    response
}

/// Audio that may be cached by clients for an hour.
pub fn cacheable_audio_reply(bytes: Vec<u8>) -> Response {
    let mut response = audio_reply(bytes, AUDIO_MPEG, None);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
    response
}

/// Turns rejections that reach the end of the filter chain into JSON
/// error bodies.
pub async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message): (StatusCode, String) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".into())
    } else if let Some(err) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request data: {}", err))
    } else if let Some(err) = rejection.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request data: {}", err))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".into())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Unsupported media type".into())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".into())
    } else {
        error!("Unhandled rejection: {:?}", rejection);
        (StatusCode::INTERNAL_SERVER_ERROR, "An internal exception occurred.".into())
    };
    Ok(reply::with_status(reply::json(&ErrorMessage::from(message)), status).into_response())
}

/// Deserializes a field that distinguishes "absent" (`None`) from an
/// explicit `null` (`Some(None)`). Use with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
