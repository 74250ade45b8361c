//! Storage keys and the client-facing URLs they map to.
//!
//! Blobs are identified only by their storage key. Rows persist keys, and
//! every response that hands an audio location to a client passes it
//! through [`affirmation_audio_url`] or [`music_url`]. Both leave an
//! already normalized `/api/...` path untouched.

const API_PREFIX: &str = "/api/";
const AFFIRMATIONS_PREFIX: &str = "affirmations/";
const MUSIC_PREFIX: &str = "background-music/";
const CUSTOM_MUSIC_PREFIX: &str = "background-music/custom/";
const VOICES_PREFIX: &str = "user-voices/";

pub fn affirmation_audio_key(user_id: &str, affirmation_id: i32) -> String {
    format!("{}{}/{}.mp3", AFFIRMATIONS_PREFIX, user_id, affirmation_id)
}

pub fn is_affirmation_audio_key(key: &str) -> bool {
    key.starts_with(AFFIRMATIONS_PREFIX)
}

pub fn builtin_music_key(style: &str) -> String {
    format!("{}{}.mp3", MUSIC_PREFIX, style)
}

pub fn custom_music_prefix(user_id: &str) -> String {
    format!("{}{}/", CUSTOM_MUSIC_PREFIX, user_id)
}

pub fn custom_music_key(user_id: &str, file_name: &str) -> String {
    format!("{}{}", custom_music_prefix(user_id), file_name)
}

pub fn user_voice_key(user_id: &str, file_name: &str) -> String {
    format!("{}{}/{}", VOICES_PREFIX, user_id, file_name)
}

pub fn affirmation_audio_path(affirmation_id: i32) -> String {
    format!("{}affirmations/{}/audio", API_PREFIX, affirmation_id)
}

pub fn custom_music_path(user_id: &str, file_name: &str) -> String {
    format!("{}background-music/custom/{}/{}", API_PREFIX, user_id, file_name)
}

pub fn builtin_music_path(style: &str) -> String {
    format!("{}background-music/{}", API_PREFIX, style)
}

/// Client URL for an affirmation's narration. `None` means the audio has
/// not been synthesized yet.
pub fn affirmation_audio_url(affirmation_id: i32, key: Option<&str>) -> Option<String> {
    key.map(|key| {
        if is_affirmation_audio_key(key) {
            affirmation_audio_path(affirmation_id)
        } else {
            key.to_string()
        }
    })
}

/// Client URL for a background-music storage key.
pub fn music_url(key: &str) -> String {
    if let Some(rest) = key.strip_prefix(CUSTOM_MUSIC_PREFIX) {
        return match rest.split_once('/') {
            Some((user_id, file_name)) => custom_music_path(user_id, file_name),
            None => key.to_string(),
        };
    }
    if let Some(rest) = key.strip_prefix(MUSIC_PREFIX) {
        let style = rest.strip_suffix(".mp3").unwrap_or(rest);
        return builtin_music_path(style);
    }
    key.to_string()
}

/// Lower-case `category/name` or a single segment, letters, digits and
/// dashes only.
pub fn is_valid_style(style: &str) -> bool {
    let segments: Vec<&str> = style.split('/').collect();
    segments.len() <= 2
        && segments.iter().all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        })
}

pub fn is_valid_file_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && !file_name.contains('/')
        && !file_name.contains('\\')
        && !file_name.contains("..")
}

/// Extension of an uploaded file name, or `fallback` when it has none.
pub fn file_extension<'a>(file_name: Option<&'a str>, fallback: &'a str) -> &'a str {
    file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(fallback)
}
