use std::{
    borrow::Cow,
    sync::OnceLock,
};

use regex::Regex;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").unwrap())
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap())
}

fn sound_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[sound:([^\]]+)\]").unwrap())
}

fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"src="([^"]+)""#).unwrap())
}

pub trait StripHtml {
    fn strip_html(&self) -> String;
}

// "<b>犬</b>&nbsp;" -> "犬\u{a0}"
impl StripHtml for str {
    fn strip_html(&self) -> String {
        let text = tag_regex().replace_all(self, "");
        decode_entities(&text).into_owned()
    }
}

impl StripHtml for String {
    fn strip_html(&self) -> String {
        self.as_str().strip_html()
    }
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    entity_regex().replace_all(text, |captures: &regex::Captures| {
        let entity = &captures[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{a0}'),
            _ => {
                let code = if let Some(hex) =
                    entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
            }
        };

        match decoded {
            Some(c) => c.to_string(),
            None => captures[0].to_string(),
        }
    })
}

/// Pitch-accent readings are often rendered twice ("さんさん"), keep one copy.
pub fn collapse_doubled_reading(reading: &str) -> &str {
    let char_count = reading.chars().count();
    if char_count == 0 || char_count % 2 != 0 {
        return reading;
    }

    let split_at = reading.char_indices().nth(char_count / 2).map(|(i, _)| i).unwrap_or(0);
    let (first, second) = reading.split_at(split_at);
    if first == second {
        first
    } else {
        reading
    }
}

pub fn extract_sound_filename(field: &str) -> Option<String> {
    sound_regex().captures(field).map(|c| c[1].to_string())
}

pub fn extract_image_filename(field: &str) -> Option<String> {
    image_regex().captures(field).map(|c| c[1].to_string())
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
