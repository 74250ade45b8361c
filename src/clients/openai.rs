use async_trait::async_trait;
use derive_more::{Display, Error, From};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::configuration::OpenAiConfiguration;

pub const AFFIRMATION_COUNT: usize = 5;

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.8;

// Also used to top up short completions.
const EXAMPLE_AFFIRMATIONS: [&str; AFFIRMATION_COUNT] = [
    "I am worthy of love and respect",
    "My emotions are valid and I honor them",
    "I choose peace and understanding in this moment",
    "I trust in my ability to navigate challenges",
    "I am exactly where I need to be right now",
];

#[derive(Debug, Display, From, Error)]
pub enum Error {
    #[display(fmt = "Request to OpenAI failed: {}", _0)]
    Request(reqwest::Error),
    #[from(ignore)]
    #[display(fmt = "{}", message)]
    Status { status: u16, message: String },
    #[from(ignore)]
    #[display(fmt = "OpenAI returned empty response")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationPreferences {
    pub focus_areas: Vec<String>,
    pub emotional_state: String,
    pub preferred_tone: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub style: String,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
}

pub fn default_language() -> String {
    "en".into()
}

/// Produces raw completion text for a prompt.
#[async_trait]
pub trait AffirmationWriter: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, Error>;
}

pub struct OpenAiWriter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiWriter {
    pub fn new(config: &OpenAiConfiguration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.as_str().trim_end_matches('/').to_string(),
            api_key: config.api_key.expose().to_string(),
            model: config.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl AffirmationWriter for OpenAiWriter {
    #[tracing::instrument(
    name = "Requesting a chat completion.",
    err,
    level = "info",
    skip(self, prompt),
    fields(
        request_id = %Uuid::new_v4(),
    )
    )]
    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": MAX_TOKENS,
                "temperature": TEMPERATURE,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "OpenAI API error.");
            return Err(Error::Status {
                status: status.as_u16(),
                message: provider_message(&body)
                    .unwrap_or_else(|| format!("OpenAI API failed: {}", status.as_u16())),
            });
        }
        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(Error::EmptyResponse)
    }
}

/// Extracts `error.message` from a provider error body.
pub fn provider_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(String::from))
        .filter(|message| !message.is_empty())
}

pub fn build_prompt(preferences: &GenerationPreferences) -> String {
    let focus_areas = preferences.focus_areas.iter().join(", ");
    let interests = preferences
        .interests
        .as_ref()
        .filter(|interests| !interests.is_empty())
        .map(|interests| interests.iter().join(", "));

    let mut prompt = format!(
        "Generate exactly {count} short, personalized affirmations in {language} language.\n\n\
         Context:\n\
         - Focus areas: {focus}\n\
         - Emotional state: {state}\n\
         - Preferred tone: {tone}\n\
         - Style: {style}",
        count = AFFIRMATION_COUNT,
        language = preferences.language,
        focus = focus_areas,
        state = preferences.emotional_state,
        tone = preferences.preferred_tone,
        style = preferences.style,
    );
    if let Some(interests) = &interests {
        prompt += &format!("\n- Interests: {}", interests);
    }
    prompt += &format!(
        "\n\nRequirements:\n\
         - Each affirmation should be 1-2 sentences maximum\n\
         - Use a {tone} tone\n\
         - Address the focus areas: {focus}\n\
         - Consider the emotional state: {state}\n\
         - Match the {style} style",
        tone = preferences.preferred_tone,
        focus = focus_areas,
        state = preferences.emotional_state,
        style = preferences.style,
    );
    if let Some(interests) = &interests {
        prompt += &format!("\n- Incorporate interests: {}", interests);
    }
    prompt += &format!(
        "\n- Return exactly {} affirmations, one per line\n\
         - Do not include numbers, bullets, or quotation marks\n\
         - Make them personal and empowering\n\n\
         Example format:\n{}",
        AFFIRMATION_COUNT,
        EXAMPLE_AFFIRMATIONS.iter().join("\n"),
    );
    prompt
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    let line = if digits > 0 {
        let rest = &line[digits..];
        rest.strip_prefix('.')
            .or_else(|| rest.strip_prefix(')'))
            .unwrap_or(line)
    } else {
        line.strip_prefix('-')
            .or_else(|| line.strip_prefix('*'))
            .or_else(|| line.strip_prefix('•'))
            .unwrap_or(line)
    };
    line.trim()
        .trim_matches(|c: char| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
}

/// Turns completion text into affirmations: one per non-empty line, list
/// markers and quotes removed, at most [`AFFIRMATION_COUNT`].
pub fn parse_affirmations(content: &str) -> Vec<String> {
    content
        .lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(AFFIRMATION_COUNT)
        .map(String::from)
        .collect()
}

/// Generates exactly [`AFFIRMATION_COUNT`] affirmations. Short completions
/// are padded with the prompt's example lines.
pub async fn generate_affirmations(
    writer: &dyn AffirmationWriter,
    preferences: &GenerationPreferences,
) -> Result<Vec<String>, Error> {
    let prompt = build_prompt(preferences);
    let content = writer.complete(&prompt).await?;
    let mut affirmations = parse_affirmations(&content);
    if affirmations.is_empty() {
        return Err(Error::EmptyResponse);
    }
    if affirmations.len() < AFFIRMATION_COUNT {
        info!(
            received = affirmations.len(),
            "Padding short completion with example affirmations."
        );
        for example in EXAMPLE_AFFIRMATIONS {
            if affirmations.len() == AFFIRMATION_COUNT {
                break;
            }
            if !affirmations.iter().any(|a| a == example) {
                affirmations.push(example.to_string());
            }
        }
    }
    Ok(affirmations)
}
