//! Tags

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Colors a tag can get, picked once when the tag is first used
pub const PALETTE: [&str; 11] = [
    "#ef4444", "#f97316", "#f59e0b", "#84cc16", "#10b981", "#06b6d4", "#3b82f6", "#6366f1",
    "#8b5cf6", "#d946ef", "#f43f5e",
];

/// Label attached to aliases
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tag {
    /// Tag ID
    pub id: Uuid,

    /// Normalized, unique name
    pub name: String,

    /// Hex color from [`PALETTE`]
    pub color: String,
}

/// Pick a random color from the palette
pub fn random_color() -> &'static str {
    PALETTE.choose(&mut OsRng).copied().unwrap_or(PALETTE[0])
}

/// Normalize a tag name: trimmed, NFC, lowercase
///
/// Returns `None` for names that are empty after trimming
pub fn normalize_tag_name(name: &str) -> Option<String> {
    let name = name.trim();

    if name.is_empty() {
        None
    } else {
        Some(name.nfc().collect::<String>().to_lowercase())
    }
}

/// Normalize and deduplicate tag names, keeping the first occurrence order
pub fn normalize_tag_names<I, N>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = N>,
    N: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();

    for name in names {
        if let Some(name) = normalize_tag_name(name.as_ref()) {
            if !normalized.contains(&name) {
                normalized.push(name);
            }
        }
    }

    normalized
}
