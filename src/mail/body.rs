//! Body extraction: flattens a MIME tree into one plain-text string.
//!
//! Plain-text parts win; the first HTML part is only used (tag-stripped) when
//! no plain text exists anywhere in the message. Never fails: a part that
//! cannot be decoded contributes the empty string.

use std::sync::LazyLock;

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine as _, alphabet};
use regex::Regex;

use crate::mail::{BodyEncoding, MessagePart, RawMessage};

/// URL-safe base64 that accepts both padded and unpadded input.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static SCRIPT_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").unwrap());

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^<>]*>").unwrap());

/// Extract the readable body of a message.
pub fn extract_body(message: &RawMessage) -> String {
    extract_payload_text(&message.payload)
}

/// Extract readable text from a MIME tree.
pub fn extract_payload_text(payload: &MessagePart) -> String {
    let mut plain = Vec::new();
    let mut first_html = None;
    collect_text_parts(payload, &mut plain, &mut first_html);

    let text: String = plain.iter().map(|part| decode_part(part)).collect();
    if !text.trim().is_empty() {
        return text;
    }

    match first_html {
        Some(part) => strip_html(&decode_part(part)),
        None => text,
    }
}

/// Depth-first walk collecting `text/plain` leaves and the first `text/html` leaf.
fn collect_text_parts<'a>(
    part: &'a MessagePart,
    plain: &mut Vec<&'a MessagePart>,
    first_html: &mut Option<&'a MessagePart>,
) {
    if part.is_multipart() {
        for child in &part.parts {
            collect_text_parts(child, plain, first_html);
        }
        return;
    }

    match base_mime_type(&part.mime_type).as_str() {
        "text/plain" => plain.push(part),
        "text/html" if first_html.is_none() => *first_html = Some(part),
        _ => {}
    }
}

/// `"Text/HTML; charset=utf-8"` → `"text/html"`.
fn base_mime_type(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decode a leaf's data to text; empty on any failure.
fn decode_part(part: &MessagePart) -> String {
    let Some(data) = part.data.as_deref() else {
        return String::new();
    };

    match part.encoding {
        BodyEncoding::Plain => data.to_string(),
        BodyEncoding::Base64Url => match URL_SAFE_LENIENT.decode(data.trim()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(mime_type = %part.mime_type, error = %e, "Undecodable body part");
                String::new()
            }
        },
    }
}

/// Strip HTML tags from content (permissive, not a parser).
///
/// Script and style blocks are dropped, a few common entities are decoded,
/// whitespace is collapsed within each line and blank lines are removed.
/// Unbalanced `<` or `>` characters are kept as text.
pub fn strip_html(html: &str) -> String {
    let without_blocks = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, " ");
    let decoded = decode_entities(&without_tags);

    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
