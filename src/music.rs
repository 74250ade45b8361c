use serde::Serialize;

use crate::audio_urls;
use crate::models::UserPreferences;

pub const DEFAULT_STYLE: &str = "ambient/calm";
const DEFAULT_FOCUS_AREA: &str = "mindfulness";
const DEFAULT_TONE: &str = "gentle";

// Candidates per bucket are ordered; the first one is the pick.
const FOCUS_AREA_STYLES: &[(&str, &[&str])] = &[
    ("calm", &["ambient/calm", "piano/gentle"]),
    ("anxiety", &["ambient/calm", "piano/gentle"]),
    ("stress", &["ambient/calm", "piano/gentle"]),
    ("energy", &["ambient/energy", "piano/motivating"]),
    ("motivation", &["ambient/energy", "piano/motivating"]),
    ("mindfulness", &["nature/peaceful", "solfeggio/528hz"]),
    ("self-love", &["nature/peaceful", "solfeggio/528hz"]),
];

const TONE_STYLES: &[(&str, &[&str])] = &[
    ("gratitude", &["piano/gentle"]),
    ("confidence", &["ambient/energy"]),
    ("gentle", &["piano/gentle"]),
    ("empowering", &["ambient/energy"]),
    ("nurturing", &["piano/gentle"]),
    ("motivating", &["piano/motivating"]),
    ("calming", &["ambient/calm"]),
];

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct MusicStyle {
    pub id: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

pub const STYLES: &[MusicStyle] = &[
    MusicStyle {
        id: "ambient/calm",
        name: "Ambient - Calm",
        category: "ambient",
    },
    MusicStyle {
        id: "ambient/energy",
        name: "Ambient - Energy",
        category: "ambient",
    },
    MusicStyle {
        id: "piano/gentle",
        name: "Piano - Gentle",
        category: "piano",
    },
    MusicStyle {
        id: "piano/motivating",
        name: "Piano - Motivating",
        category: "piano",
    },
    MusicStyle {
        id: "nature/peaceful",
        name: "Nature - Peaceful",
        category: "nature",
    },
    MusicStyle {
        id: "solfeggio/528hz",
        name: "Solfeggio - 528Hz",
        category: "solfeggio",
    },
];

fn lookup(table: &[(&str, &'static [&'static str])], key: &str) -> Option<&'static str> {
    let key = key.trim().to_lowercase();
    table
        .iter()
        .find(|(bucket, _)| *bucket == key)
        .and_then(|(_, styles)| styles.first().copied())
}

/// Picks a built-in music style for a focus area, falling back to the tone
/// and then to [`DEFAULT_STYLE`].
pub fn resolve_style(focus_area: &str, tone: &str) -> &'static str {
    lookup(FOCUS_AREA_STYLES, focus_area)
        .or_else(|| lookup(TONE_STYLES, tone))
        .unwrap_or(DEFAULT_STYLE)
}

/// Storage key of the background music for a new affirmation. A custom
/// track in the user's preferences wins over automatic selection.
pub fn select_music_key(
    preferences: Option<&UserPreferences>,
    focus_hint: Option<&str>,
    tone_hint: Option<&str>,
) -> String {
    if let Some(custom) = preferences.and_then(|p| p.background_music_url.as_deref()) {
        if !custom.trim().is_empty() {
            return custom.to_string();
        }
    }
    let focus_area = preferences
        .and_then(|p| p.focus_areas.first().map(String::as_str))
        .or(focus_hint)
        .unwrap_or(DEFAULT_FOCUS_AREA);
    let tone = preferences
        .map(|p| p.preferred_tone.as_str())
        .filter(|t| !t.is_empty())
        .or(tone_hint)
        .unwrap_or(DEFAULT_TONE);
    audio_urls::builtin_music_key(resolve_style(focus_area, tone))
}
