use derive_more::{Display, Error, From};

use crate::clients::{google_tts, openai};
use crate::{repository, storage};

#[derive(Debug, Display, From, Error)]
pub enum Error {
    Repository(repository::Error),
    Storage(storage::Error),
    Generation(openai::Error),
    Speech(google_tts::Error),
    #[display(fmt = "Invalid request data: {}", _0)]
    Multipart(warp::Error),
    #[from(ignore)]
    #[display(fmt = "{}", _0)]
    Validation(#[error(not(source))] String),
    #[from(ignore)]
    #[display(fmt = "Missing X-User-Id header")]
    Unauthenticated,
    #[from(ignore)]
    #[display(fmt = "{}", _0)]
    Forbidden(#[error(not(source))] &'static str),
    #[from(ignore)]
    #[display(fmt = "{} not found", _0)]
    NotFound(#[error(not(source))] &'static str),
    #[from(ignore)]
    #[display(fmt = "{}", _0)]
    NotConfigured(#[error(not(source))] &'static str),
}

impl<'a> From<addr::error::Error<'a>> for Error {
    fn from(x: addr::error::Error<'a>) -> Self {
        Self::Validation(format!("Invalid email address: {}", x))
    }
}
