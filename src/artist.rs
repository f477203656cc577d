//! Display-name helpers for artists.

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

pub fn looks_like_email(value: &str) -> bool {
    value.contains('@')
}

/// Normalises an artist name for display.
///
/// Email addresses are reduced to their local part, split on `.`, with each
/// segment capitalised. Plain names have every word capitalised and the rest
/// lowercased. Empty input stays "Unknown Artist".
pub fn format_artist_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == UNKNOWN_ARTIST {
        return UNKNOWN_ARTIST.to_string();
    }

    let formatted = if looks_like_email(trimmed) {
        let local = trimmed.split('@').next().unwrap_or_default();
        local
            .split('.')
            .filter(|segment| !segment.is_empty())
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        trimmed
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    };

    if formatted.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        formatted
    }
}

/// Picks the name shown for an artwork's artist. A real name always wins;
/// the owner's email is only consulted when the name is missing or is the
/// "Unknown Artist" placeholder.
pub fn artist_display_name(name: Option<&str>, user_email: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() && name != UNKNOWN_ARTIST => format_artist_name(name),
        _ => match user_email {
            Some(email) if !email.trim().is_empty() => format_artist_name(email),
            _ => UNKNOWN_ARTIST.to_string(),
        },
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
