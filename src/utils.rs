//! Utility functions for channel references, file names and text

use crate::types::ChannelId;
use regex::Regex;
use std::sync::LazyLock;

/// Length of a stable channel identifier (`UC` + 22 characters)
const CHANNEL_ID_LEN: usize = 24;

/// Maximum length of a sanitized file stem
const MAX_FILE_STEM: usize = 50;

/// Characters that are not allowed in file names on common filesystems
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Profile URLs that embed the channel identifier
#[allow(clippy::expect_used)]
static CHANNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/(?:channel/|(?:c|user)/[\w-]+.*?/)(UC[\w-]{22})")
        .expect("channel URL pattern is valid")
});

/// Handle and custom-name URLs, which still need a name lookup
#[allow(clippy::expect_used)]
static HANDLE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"youtube\.com/(?:@|c/|user/)([\w.-]+)").expect("handle URL pattern is valid")
});

/// A caller-supplied channel reference, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// Already a stable identifier, or one extracted from a profile URL
    Id(ChannelId),
    /// Free-text name or handle that needs a lookup
    Name(String),
}

/// Classify a raw channel reference
///
/// # Examples
///
/// ```
/// use channel_ingest::utils::{classify_channel_ref, ChannelRef};
///
/// let id = "UC_x5XG1OV2P6uZZ5FSM9Ttw";
/// assert!(matches!(classify_channel_ref(id), ChannelRef::Id(_)));
///
/// let url = format!("https://www.youtube.com/channel/{id}");
/// assert!(matches!(classify_channel_ref(&url), ChannelRef::Id(_)));
///
/// assert_eq!(
///     classify_channel_ref("@rustlang"),
///     ChannelRef::Name("rustlang".to_string())
/// );
/// ```
pub fn classify_channel_ref(input: &str) -> ChannelRef {
    let input = input.trim();

    if is_channel_id(input) {
        return ChannelRef::Id(ChannelId::new(input));
    }

    if let Some(caps) = CHANNEL_URL.captures(input) {
        return ChannelRef::Id(ChannelId::new(&caps[1]));
    }

    if let Some(caps) = HANDLE_URL.captures(input) {
        return ChannelRef::Name(caps[1].to_string());
    }

    ChannelRef::Name(input.strip_prefix('@').unwrap_or(input).to_string())
}

/// Whether `input` has the shape of a stable channel identifier
pub fn is_channel_id(input: &str) -> bool {
    input.len() == CHANNEL_ID_LEN
        && input.starts_with("UC")
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Turn a channel name into a safe file stem
///
/// Invalid characters and spaces become `_`, and the result is limited to
/// 50 characters.
pub fn sanitize_filename(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_whitespace() || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .take(MAX_FILE_STEM)
        .collect();

    // "." and ".." would escape the data directory
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}

/// Truncate `text` to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
