// Content Segmenter - splits a post body into text, mention, hashtag and URL runs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(@[A-Za-z0-9_]+)|(#[A-Za-z0-9_]+)|(https?://\S+)").expect("Invalid content token regex")
});

const URL_DISPLAY_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum Segment {
    Text(String),
    Mention(String),
    Hashtag(String),
    Url(String),
}

impl Segment {
    /// Raw source text of the segment
    pub fn as_str(&self) -> &str {
        match self {
            Segment::Text(s) | Segment::Mention(s) | Segment::Hashtag(s) | Segment::Url(s) => s,
        }
    }

    /// Profile path a mention links to, `@alice` -> `/alice`
    pub fn mention_path(&self) -> Option<String> {
        match self {
            Segment::Mention(m) => Some(format!("/{}", m.trim_start_matches('@'))),
            _ => None,
        }
    }

    /// Link text for a URL: scheme stripped and cut to 30 chars. The `...` suffix
    /// depends on the length of the full URL, scheme included.
    pub fn url_display(&self) -> Option<String> {
        let Segment::Url(url) = self else {
            return None;
        };
        let bare = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url);

        let cut: String = bare.chars().take(URL_DISPLAY_CHARS).collect();
        if url.chars().count() > URL_DISPLAY_CHARS {
            Some(format!("{}...", cut))
        } else {
            Some(cut)
        }
    }
}

/// Left-to-right, non-overlapping scan. Concatenating the segments' text
/// reproduces the input exactly; empty input yields no segments.
pub fn parse_post_content(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in TOKEN_REGEX.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if whole.start() > last {
            segments.push(Segment::Text(text[last..whole.start()].to_string()));
        }

        let token = whole.as_str().to_string();
        segments.push(if caps.get(1).is_some() {
            Segment::Mention(token)
        } else if caps.get(2).is_some() {
            Segment::Hashtag(token)
        } else {
            Segment::Url(token)
        });
        last = whole.end();
    }

    if last < text.len() {
        segments.push(Segment::Text(text[last..].to_string()));
    }
    segments
}
