// Response decoding for the change-registration endpoint.
//
// The server normally answers with JSON, but when something goes wrong
// in front of the API handler it can answer with an HTML error page that
// still carries the JSON reply somewhere inside it (usually in a <pre>
// block). We accept either, and only give up on the content type when the
// page holds no balanced JSON fragment at all.

use crate::error::RegistrationError;
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// Longest body excerpt quoted in error messages, in characters.
pub const MAX_PREVIEW: usize = 200;

const JSON_MEDIA_TYPES: &[&str] = &["application/json", "text/json", "application/problem+json"];

/// Elements whose content is never searched for JSON.
const RAW_TEXT_ELEMENTS: &[&str] = &["style", "script"];

/// Acknowledgment returned by the server for one registration change.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistrationReply {
    #[serde(deserialize_with = "null_as_default")]
    pub ok: bool,
    pub result: Option<ReplyResult>,
    pub action: Option<String>,
    pub error: Option<ReplyError>,
}

/// `result` is a boolean on success, but some failures put a diagnostic
/// string there instead.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ReplyResult {
    Flag(bool),
    Message(String),
    Other(serde_json::Value),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReplyError {
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub num: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub log_id: String,
}

/// Read an explicit `null` as the field's zero value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {}, symbol {}, log {})",
            self.message, self.num, self.symbol, self.log_id
        )
    }
}

impl RegistrationReply {
    /// True when the server set both `ok` and `result`.
    pub fn acknowledged(&self) -> bool {
        self.ok && matches!(self.result, Some(ReplyResult::Flag(true)))
    }

    /// Turn a negative acknowledgment into an error, preferring the
    /// structured `error` object over a string `result`.
    pub fn check(self) -> Result<Self, RegistrationError> {
        if self.acknowledged() {
            return Ok(self);
        }
        match (self.error, self.result) {
            (Some(error), _) => Err(RegistrationError::Rejected(error)),
            (None, Some(ReplyResult::Message(message))) => Err(RegistrationError::Refused(message)),
            _ => Err(RegistrationError::NotAcknowledged),
        }
    }
}

/// Whether `content_type` names a JSON media type, ignoring parameters
/// such as `charset`.
pub fn is_json_content_type(content_type: &str) -> bool {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    JSON_MEDIA_TYPES.contains(&media_type.as_str())
}

/// Cut `text` down to [`MAX_PREVIEW`] characters, marking the cut with `...`.
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(MAX_PREVIEW) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

/// Decode a response body into a [`RegistrationReply`].
///
/// `content_type` is the raw header value, `status` the status line used
/// in error messages. A non-JSON content type is tolerated only when the
/// body holds an embedded JSON fragment.
pub fn decode_reply(
    body: &[u8],
    content_type: Option<&str>,
    status: &str,
) -> Result<RegistrationReply, RegistrationError> {
    let content_type = content_type.map(str::trim).filter(|ct| !ct.is_empty());

    let payload: Cow<'_, [u8]> = match content_type {
        Some(ct) if !is_json_content_type(ct) => {
            let text = String::from_utf8_lossy(body);
            match extract_embedded_json(&text) {
                Some(fragment) => {
                    debug!(content_type = ct, fragment, "found JSON embedded in response");
                    Cow::Owned(unescape_html(fragment).into_owned().into_bytes())
                }
                None => {
                    return Err(RegistrationError::ContentType {
                        content_type: ct.to_string(),
                        status: status.to_string(),
                        preview: truncate_preview(&text),
                    })
                }
            }
        }
        _ => Cow::Borrowed(body),
    };

    serde_json::from_slice(&payload).map_err(RegistrationError::Decode)
}

/// Find the first balanced `{...}` or `[...]` fragment in `text`, skipping
/// anything inside `<style>` and `<script>` elements.
///
/// Single pass: openers go on a stack and the earliest-starting fragment
/// that closes cleanly wins. A mismatched closer kills every open
/// candidate. Delimiters inside JSON string literals do not count.
pub fn extract_embedded_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    // ASCII lowercasing keeps byte offsets identical.
    let lower = text.to_ascii_lowercase();
    let lower = lower.as_bytes();

    // (offset, expected closer) of every opener still waiting to close.
    let mut open: Vec<(usize, u8)> = Vec::new();
    let mut best: Option<(usize, usize)> = None;
    let mut in_string = false;
    let mut escaped = false;

    let mut pos = 0;
    while pos < bytes.len() {
        let b = bytes[pos];
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            pos += 1;
            continue;
        }
        match b {
            b'<' if open.is_empty() => {
                if let Some(end) = skip_raw_text_element(lower, pos) {
                    pos = end;
                    continue;
                }
            }
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push((pos, b'}')),
            b'[' => open.push((pos, b']')),
            b'}' | b']' if !open.is_empty() => match open.pop() {
                Some((start, closer)) if closer == b => {
                    if open.is_empty() {
                        return Some(&text[start..=pos]);
                    }
                    // Nested: an enclosing opener may still close later.
                    if best.map_or(true, |(best_start, _)| start < best_start) {
                        best = Some((start, pos + 1));
                    }
                }
                _ => {
                    if best.is_some() {
                        break;
                    }
                    open.clear();
                }
            },
            _ => {}
        }
        pos += 1;
    }
    best.map(|(start, end)| &text[start..end])
}

/// If a `<style>` or `<script>` element opens at `pos`, return the offset
/// just past its closing tag (or the end of input when it never closes).
fn skip_raw_text_element(lower: &[u8], pos: usize) -> Option<usize> {
    let after_lt = &lower[pos + 1..];
    let name = RAW_TEXT_ELEMENTS.iter().find(|name| {
        after_lt.starts_with(name.as_bytes())
            && after_lt
                .get(name.len())
                .map_or(true, |&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
    })?;

    let closing = format!("</{}", name);
    let content_start = pos + 1 + name.len();
    let end = find(&lower[content_start..], closing.as_bytes())
        .map(|offset| content_start + offset + closing.len())
        .map(|close| {
            find(&lower[close..], b">")
                .map_or(lower.len(), |offset| close + offset + 1)
        })
        .unwrap_or(lower.len());
    Some(end)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Undo the entity escaping HTML pages apply to `<pre>` content.
fn unescape_html(fragment: &str) -> Cow<'_, str> {
    if !fragment.contains('&') {
        return Cow::Borrowed(fragment);
    }
    Cow::Owned(
        fragment
            .replace("&quot;", "\"")
            .replace("&#34;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("application/json", true)]
    #[case("application/json; charset=utf-8", true)]
    #[case("Text/JSON", true)]
    #[case("application/problem+json", true)]
    #[case("text/html; charset=utf-8", false)]
    #[case("text/plain", false)]
    #[case("", false)]
    fn recognizes_json_media_types(#[case] content_type: &str, #[case] expected: bool) {
        assert_eq!(is_json_content_type(content_type), expected);
    }

    #[test]
    fn decodes_json_embedded_in_html() {
        let body = br#"<html><body><pre>{"ok":true,"result":true,"action":"upsert"}</pre></body></html>"#;
        let reply = decode_reply(body, Some("text/html"), "200 OK").unwrap();
        assert!(reply.ok);
        assert_eq!(reply.result, Some(ReplyResult::Flag(true)));
        assert_eq!(reply.action.as_deref(), Some("upsert"));
        assert!(reply.acknowledged());
    }

    #[test]
    fn decodes_entity_escaped_json_in_html() {
        let body = b"<pre>{&quot;ok&quot;:true,&quot;result&quot;:true}</pre>";
        let reply = decode_reply(body, Some("text/html"), "200 OK").unwrap();
        assert!(reply.acknowledged());
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = decode_reply(b"not json", Some("application/json"), "200 OK").unwrap_err();
        assert!(matches!(err, RegistrationError::Decode(_)));
        assert!(err.to_string().starts_with("decoding response"));
    }

    #[test]
    fn html_without_json_is_a_content_type_error() {
        let body = b"<html><body><h1>Internal Server Error</h1></body></html>";
        let err = decode_reply(body, Some("text/html"), "200 OK").unwrap_err();
        match err {
            RegistrationError::ContentType {
                content_type,
                status,
                preview,
            } => {
                assert_eq!(content_type, "text/html");
                assert_eq!(status, "200 OK");
                assert!(preview.contains("Internal Server Error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_content_type_is_decoded_as_json() {
        let reply = decode_reply(br#"{"ok":true,"result":true}"#, None, "200 OK").unwrap();
        assert!(reply.acknowledged());
        let reply = decode_reply(br#"{"ok":true,"result":true}"#, Some(" "), "200 OK").unwrap();
        assert!(reply.acknowledged());
    }

    #[test]
    fn unknown_fields_are_ignored_and_missing_ones_default() {
        let reply = decode_reply(br#"{"ok":true,"server_time":1}"#, None, "200 OK").unwrap();
        assert_eq!(
            reply,
            RegistrationReply {
                ok: true,
                ..RegistrationReply::default()
            }
        );
        assert!(!reply.acknowledged());
    }

    #[test]
    fn skips_style_and_script_content() {
        let html = r#"<style>.x{color:red;}</style><script>var data = {invalid:true};</script><pre>{"ok":true}</pre>"#;
        assert_eq!(extract_embedded_json(html), Some(r#"{"ok":true}"#));
    }

    #[rstest]
    #[case(r#"<SCRIPT type="text/javascript">x = [1, 2];</SCRIPT>{"a":1}"#, Some(r#"{"a":1}"#))]
    #[case(r#"<scripts>{"a":1}</scripts>"#, Some(r#"{"a":1}"#))]
    #[case(r#"<p>{"a":"}{"}</p>"#, Some(r#"{"a":"}{"}"#))]
    #[case(r#"<p>{"a":"\"}"}</p>"#, Some(r#"{"a":"\"}"}"#))]
    #[case(r#"<p>{"a":[1,{"b":2}]}</p>"#, Some(r#"{"a":[1,{"b":2}]}"#))]
    #[case(r#"{ ] <pre>{"ok":true}</pre>"#, Some(r#"{"ok":true}"#))]
    #[case(r#"<script>{"ok":true}"#, None)]
    #[case("<p>{ never closed</p>", None)]
    #[case("<h1>plain</h1>", None)]
    fn scans_for_balanced_fragments(#[case] html: &str, #[case] expected: Option<&str>) {
        assert_eq!(extract_embedded_json(html), expected);
    }

    #[test]
    fn unbalanced_openers_do_not_hide_the_reply() {
        let mut html = "<p>{ ".repeat(20_000);
        html.push_str(r#"<pre>{"ok":true}</pre>"#);
        assert_eq!(extract_embedded_json(&html), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn large_unbalanced_input_is_scanned_once() {
        assert_eq!(extract_embedded_json(&"{".repeat(200_000)), None);
        assert_eq!(extract_embedded_json(&"{]".repeat(100_000)), None);
    }

    #[test]
    fn outer_fragment_wins_over_nested_one() {
        assert_eq!(
            extract_embedded_json(r#"x {"a":{"b":1}} y"#),
            Some(r#"{"a":{"b":1}}"#)
        );
    }

    #[test]
    fn preview_is_truncated_on_char_boundary() {
        let short = "x".repeat(MAX_PREVIEW);
        assert_eq!(truncate_preview(&short), short);

        let long = "é".repeat(MAX_PREVIEW + 5);
        let preview = truncate_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), MAX_PREVIEW + 3);
    }

    #[test]
    fn structured_error_wins() {
        let reply: RegistrationReply = serde_json::from_str(
            r#"{"ok":false,"result":"closed","error":{"message":"User is blocked","num":12,"symbol":"ERR_BLOCKED","log_id":"abc"}}"#,
        )
        .unwrap();
        let err = reply.check().unwrap_err();
        assert_eq!(
            err.to_string(),
            "server error: User is blocked (code 12, symbol ERR_BLOCKED, log abc)"
        );
    }

    #[test]
    fn null_fields_read_as_defaults() {
        let body = br#"{"ok":false,"result":false,"error":{"message":"User is blocked","num":null,"symbol":null,"log_id":null}}"#;
        let reply = decode_reply(body, Some("application/json"), "200 OK").unwrap();
        let err = reply.check().unwrap_err();
        assert!(err.to_string().contains("User is blocked"), "{err}");

        let reply = decode_reply(br#"{"ok":null,"result":true}"#, None, "200 OK").unwrap();
        assert!(!reply.ok);
        assert!(!reply.acknowledged());
    }

    #[test]
    fn string_result_is_surfaced() {
        let reply: RegistrationReply =
            serde_json::from_str(r#"{"ok":false,"result":"contest is closed"}"#).unwrap();
        let err = reply.check().unwrap_err();
        assert_eq!(err.to_string(), "server rejected the request: contest is closed");
    }

    #[rstest]
    #[case(r#"{"ok":false,"result":true}"#)]
    #[case(r#"{"ok":true,"result":false}"#)]
    #[case(r#"{"ok":true,"result":1}"#)]
    #[case(r#"{}"#)]
    fn other_negative_replies_are_not_acknowledged(#[case] json: &str) {
        let reply: RegistrationReply = serde_json::from_str(json).unwrap();
        assert!(matches!(reply.check(), Err(RegistrationError::NotAcknowledged)));
    }
}
