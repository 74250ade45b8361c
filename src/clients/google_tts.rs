use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use derive_more::{Display, Error, From};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};
use url::Url;
use uuid::Uuid;

use crate::clients::openai::provider_message;
use crate::configuration::SpeechConfiguration;

pub const DEFAULT_VOICE: &str = "sarah";
const DEFAULT_PROVIDER_VOICE: &str = "en-US-Neural2-F";
const CUSTOM_VOICE_PREFIX: &str = "custom_";

const VOICE_MAPPING: &[(&str, &str)] = &[
    ("sarah", "en-US-Neural2-F"), // female, warm
    ("alex", "en-US-Neural2-D"),  // male, confident
    ("maya", "en-US-Neural2-E"),  // female, gentle
    ("james", "en-US-Neural2-J"), // male, deep
    ("luna", "en-US-Neural2-I"),  // female, peaceful
];

#[derive(Debug, Display, From, Error)]
pub enum Error {
    #[display(fmt = "Request to Google TTS failed: {}", _0)]
    Request(reqwest::Error),
    #[display(fmt = "Invalid Google TTS endpoint: {}", _0)]
    Endpoint(url::ParseError),
    #[from(ignore)]
    #[display(fmt = "{}", message)]
    Status { status: u16, message: String },
    #[from(ignore)]
    #[display(fmt = "No audio content received from Google TTS")]
    MissingAudio,
    #[display(fmt = "Failed to decode audio content: {}", _0)]
    Decode(base64::DecodeError),
}

/// Turns text into MP3 bytes.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<Vec<u8>, Error>;
}

/// Provider voice name for a friendly voice id.
pub fn provider_voice(voice_id: &str) -> &'static str {
    let voice_id = voice_id.to_lowercase();
    VOICE_MAPPING
        .iter()
        .find(|(name, _)| *name == voice_id)
        .map(|(_, provider)| *provider)
        .unwrap_or(DEFAULT_PROVIDER_VOICE)
}

pub fn language_code(language: &str) -> &str {
    if language == "en" {
        "en-US"
    } else {
        language
    }
}

/// Voice actually used for a user's selection. Recorded `custom_` voices
/// cannot be synthesized and fall back to [`DEFAULT_VOICE`].
pub fn effective_voice(selected: &str) -> &str {
    if selected.starts_with(CUSTOM_VOICE_PREFIX) {
        warn!(
            selected_voice = selected,
            "Custom voices are not synthesized, using the default voice."
        );
        DEFAULT_VOICE
    } else if selected.trim().is_empty() {
        DEFAULT_VOICE
    } else {
        selected
    }
}

pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleTts {
    pub fn new(config: &SpeechConfiguration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.expose().to_string(),
        }
    }
}

/// Synthesis URL under `endpoint`, keeping any path the endpoint carries.
fn synthesize_url(endpoint: &str, api_key: &str) -> Result<Url, Error> {
    let mut url = Url::parse(&format!("{}/v1/text:synthesize", endpoint))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    #[tracing::instrument(
    name = "Synthesizing speech.",
    err,
    level = "info",
    skip(self, text),
    fields(
        request_id = %Uuid::new_v4(),
        text_len = text.len(),
    )
    )]
    async fn synthesize(&self, text: &str, voice_id: &str, language: &str) -> Result<Vec<u8>, Error> {
        let url = synthesize_url(&self.endpoint, &self.api_key)?;
        let response = self
            .client
            .post(url)
            .json(&json!({
                "input": { "text": text },
                "voice": {
                    "languageCode": language_code(language),
                    "name": provider_voice(voice_id),
                },
                "audioConfig": { "audioEncoding": "MP3" },
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Google TTS API error.");
            let message = provider_message(&body)
                .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()))
                .unwrap_or_else(|| format!("Google TTS API failed: {}", status.as_u16()));
            return Err(Error::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body: SynthesizeResponse = response.json().await?;
        decode_audio(body.audio_content)
    }
}

fn decode_audio(audio_content: Option<String>) -> Result<Vec<u8>, Error> {
    let encoded = audio_content
        .filter(|content| !content.is_empty())
        .ok_or(Error::MissingAudio)?;
    Ok(STANDARD.decode(encoded.as_bytes())?)
}
