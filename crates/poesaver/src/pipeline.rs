//! The extraction-and-rendering pipeline.
//!
//! One call turns one HTML document into a [`ConversationData`] and its
//! rendered Markdown. Synchronous, no I/O, no shared state: safe to invoke
//! concurrently across documents with zero coordination.

use crate::content;
use crate::error::ConvertError;
use crate::extract::{self, RawTurn};
use crate::metadata;
use crate::model::{ConversationData, Message, Metadata, NormalizationWarning, Role};
use crate::render::{render, RenderOptions};
use chrono::{DateTime, Utc};
use scraper::Html;
use tracing::{debug, warn};

/// Title used when neither the page nor the messages yield one
const UNTITLED: &str = "Untitled Conversation";

/// Maximum title length in characters
const TITLE_MAX_CHARS: usize = 100;

/// Placeholder when no signal names the assistant
const UNKNOWN_MODEL: &str = "unknown";

/// Where a document came from.
///
/// The conversation id and capture time are fixed by the caller (the fetch
/// layer); the pipeline itself never reads the clock.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub url: String,
    pub conversation_id: String,
    pub fetched_at: DateTime<Utc>,
}

impl SourceInfo {
    pub fn new(
        url: impl Into<String>,
        conversation_id: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            conversation_id: conversation_id.into(),
            fetched_at,
        }
    }
}

/// Result of a successful conversion
#[derive(Debug, Clone)]
pub struct Converted {
    /// The structured conversation, exposed so callers can read counts and
    /// metadata without re-parsing the rendered text
    pub conversation: ConversationData,
    /// The rendered Markdown document
    pub markdown: String,
    /// Node kinds that were degraded to plain text, per turn
    pub warnings: Vec<NormalizationWarning>,
}

/// Convert a fetched share page with default rendering options
pub fn convert(html: &str, source: &SourceInfo) -> Result<Converted, ConvertError> {
    convert_with_options(html, source, &RenderOptions::default())
}

/// Convert a fetched share page.
///
/// Extraction prefers the embedded Next.js state when present and
/// parseable, then falls back to DOM heuristics. Per-turn normalization
/// problems surface as warnings on the result; only a document with no
/// extractable conversation at all is an error.
pub fn convert_with_options(
    html: &str,
    source: &SourceInfo,
    options: &RenderOptions,
) -> Result<Converted, ConvertError> {
    let document = Html::parse_document(html);

    let raw_turns = match extract::extract_embedded_turns(&document) {
        Some(turns) => turns,
        None => extract::extract_dom_turns(&document)?
            .into_iter()
            .map(|turn| {
                let (content, degraded_kinds) = content::normalize_fragment(turn.element);
                RawTurn {
                    sender: turn.sender,
                    role: turn.role,
                    content,
                    timestamp: None,
                    degraded_kinds,
                }
            })
            .collect(),
    };

    build(raw_turns, &document, source, options)
}

/// Compose raw turns and page facts into the immutable conversation,
/// then render it
fn build(
    raw_turns: Vec<RawTurn>,
    document: &Html,
    source: &SourceInfo,
    options: &RenderOptions,
) -> Result<Converted, ConvertError> {
    let facts = metadata::extract_page_facts(document);

    let model_name = raw_turns
        .iter()
        .filter(|turn| turn.role == Role::Assistant)
        .find_map(|turn| turn.sender.clone())
        .or_else(|| facts.model_hint.clone())
        .unwrap_or_else(|| UNKNOWN_MODEL.to_string());

    let mut messages: Vec<Message> = Vec::new();
    let mut warnings: Vec<NormalizationWarning> = Vec::new();

    for raw in raw_turns {
        if raw.content.is_empty() {
            // Structural noise that survived container detection
            continue;
        }
        let sequence_index = messages.len();
        for node_kind in raw.degraded_kinds {
            warnings.push(NormalizationWarning {
                turn_index: sequence_index,
                node_kind,
            });
        }
        let sender = match raw.role {
            Role::User => "User".to_string(),
            Role::Assistant => raw.sender.unwrap_or_else(|| model_name.clone()),
            Role::Unknown => raw.sender.unwrap_or_else(|| "Unknown".to_string()),
        };
        messages.push(Message {
            sender,
            role: raw.role,
            content: raw.content,
            timestamp: raw.timestamp,
            sequence_index,
        });
    }

    if messages.is_empty() {
        return Err(ConvertError::EmptyConversation);
    }

    let user_message_count = messages.iter().filter(|m| m.role == Role::User).count();
    let assistant_message_count = messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .count();

    let title = derive_title(&facts.page_title, &messages);
    let page_title = facts.page_title.filter(|raw| *raw != title);

    let metadata = Metadata {
        title,
        model_name,
        conversation_id: source.conversation_id.clone(),
        source_url: source.url.clone(),
        fetched_at: source.fetched_at,
        message_count: messages.len(),
        user_message_count,
        assistant_message_count,
        page_title,
    };

    debug!(
        messages = metadata.message_count,
        user = metadata.user_message_count,
        assistant = metadata.assistant_message_count,
        "conversation extracted"
    );
    if !warnings.is_empty() {
        warn!(count = warnings.len(), "some turn markup was degraded to plain text");
    }

    let conversation = ConversationData { metadata, messages };
    let markdown = render(&conversation, options);

    Ok(Converted {
        conversation,
        markdown,
        warnings,
    })
}

/// Page title when valid, else the first user turn's leading line,
/// else the placeholder
fn derive_title(page_title: &Option<String>, messages: &[Message]) -> String {
    if let Some(title) = page_title {
        return truncate_chars(title, TITLE_MAX_CHARS);
    }

    let first_user_line = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.plain_text())
        .find_map(|text| {
            text.lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && metadata::is_plausible_text(line))
                .map(str::to_string)
        });

    match first_user_line {
        Some(line) => truncate_chars(&line, TITLE_MAX_CHARS),
        None => UNTITLED.to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars - 3).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> SourceInfo {
        SourceInfo::new(
            "https://poe.com/s/abc123",
            "abc123",
            chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        )
    }

    fn page(body: &str) -> String {
        format!("<html><head><title>Chat about tests - Poe</title></head><body>{body}</body></html>")
    }

    #[test]
    fn test_convert_builds_contiguous_indices() {
        let html = page(concat!(
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_humanMessageBubble_x"><p>q1</p></div></div>"#,
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_botMessageBubble_y"><p>a1</p></div></div>"#,
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_humanMessageBubble_x"><p>q2</p></div></div>"#,
        ));
        let result = convert(&html, &source()).unwrap();
        let conversation = &result.conversation;

        let indices: Vec<usize> = conversation
            .messages
            .iter()
            .map(|m| m.sequence_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(conversation.metadata.message_count, 3);
        assert_eq!(conversation.metadata.user_message_count, 2);
        assert_eq!(conversation.metadata.assistant_message_count, 1);
        assert_eq!(conversation.metadata.unknown_message_count(), 0);
    }

    #[test]
    fn test_counts_add_up_with_unknowns() {
        let html = page(concat!(
            r#"<div data-message-id="1"><p>alpha</p></div>"#,
            r#"<div data-message-id="2"><p>beta</p></div>"#,
        ));
        let result = convert(&html, &source()).unwrap();
        let metadata = &result.conversation.metadata;
        assert_eq!(
            metadata.message_count,
            metadata.user_message_count
                + metadata.assistant_message_count
                + metadata.unknown_message_count()
        );
        assert_eq!(metadata.unknown_message_count(), 2);
    }

    #[test]
    fn test_empty_conversation_after_normalization() {
        // Containers pass the text check but hold only UI chrome
        let html = page(concat!(
            r#"<div data-message-id="1"><button>Copy</button></div>"#,
            r#"<div data-message-id="2"><button>Copy</button></div>"#,
        ));
        let result = convert(&html, &source());
        assert!(matches!(result, Err(ConvertError::EmptyConversation)));
    }

    #[test]
    fn test_no_turns_is_an_error() {
        let html = "<html><body><p>nothing here</p></body></html>";
        let result = convert(html, &source());
        assert!(matches!(result, Err(ConvertError::NoTurnsFound)));
    }

    #[test]
    fn test_model_name_from_avatar_signal() {
        let html = page(concat!(
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_humanMessageBubble_x"><p>q</p></div></div>"#,
            r#"<div class="ChatMessage_messageRow_a"><img alt="Bot image for Model-X" src="a.png"><p>a</p></div>"#,
        ));
        let result = convert(&html, &source()).unwrap();
        assert_eq!(result.conversation.metadata.model_name, "Model-X");
        assert_eq!(result.conversation.messages[1].sender, "Model-X");
    }

    #[test]
    fn test_model_name_unknown_without_signals() {
        let html = page(concat!(
            r#"<div data-message-id="1"><p>alpha</p></div>"#,
            r#"<div data-message-id="2"><p>beta</p></div>"#,
        ));
        let result = convert(&html, &source()).unwrap();
        assert_eq!(result.conversation.metadata.model_name, "unknown");
    }

    #[test]
    fn test_title_from_page() {
        let html = page(r#"<div data-message-id="1" data-message-author="human"><p>hi</p></div>
                          <div data-message-id="2"><p>hello</p></div>"#);
        let result = convert(&html, &source()).unwrap();
        assert_eq!(result.conversation.metadata.title, "Chat about tests");
    }

    #[test]
    fn test_title_falls_back_to_first_user_line() {
        let html = concat!(
            "<html><body>",
            r#"<div data-message-id="1" data-message-author="human"><p>Explain lifetimes please</p></div>"#,
            r#"<div data-message-id="2"><p>Sure.</p></div>"#,
            "</body></html>"
        );
        let result = convert(html, &source()).unwrap();
        assert_eq!(
            result.conversation.metadata.title,
            "Explain lifetimes please"
        );
    }

    #[test]
    fn test_title_placeholder_when_nothing_usable() {
        let html = concat!(
            "<html><body>",
            r#"<div data-message-id="1"><p>alpha</p></div>"#,
            r#"<div data-message-id="2"><p>beta</p></div>"#,
            "</body></html>"
        );
        let result = convert(html, &source()).unwrap();
        // both turns are unknown-role, so no user line exists
        assert_eq!(result.conversation.metadata.title, "Untitled Conversation");
    }

    #[test]
    fn test_warnings_carry_turn_index() {
        let html = page(concat!(
            r#"<div data-message-id="1" data-message-author="human"><p>fine</p></div>"#,
            r#"<div data-message-id="2"><table><tr><td>hello</td></tr></table></div>"#,
        ));
        let result = convert(&html, &source()).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].turn_index, 1);
        assert_eq!(result.warnings[0].node_kind, "table");
        // the degraded turn's text is still present in the output
        assert!(result.markdown.contains("hello"));
    }

    #[test]
    fn test_embedded_state_wins_over_dom() {
        let payload = serde_json::json!({
            "props": {"pageProps": {"data": {"mainQuery": {"chatShare": {"messages": [
                {"text": "from json", "author": "human"},
                {"text": "json answer", "author": "bot",
                 "authorBot": {"displayName": "Model-X"}},
            ]}}}}}
        });
        let html = format!(
            concat!(
                "<html><head><script id=\"__NEXT_DATA__\">{}</script></head><body>",
                r#"<div data-message-id="1"><p>from dom</p></div>"#,
                r#"<div data-message-id="2"><p>dom answer</p></div>"#,
                "</body></html>"
            ),
            payload
        );
        let result = convert(&html, &source()).unwrap();
        assert!(result.markdown.contains("from json"));
        assert!(!result.markdown.contains("from dom"));
        assert_eq!(result.conversation.metadata.model_name, "Model-X");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 100), "short");
        let long = "x".repeat(150);
        let truncated = truncate_chars(&long, 100);
        assert_eq!(truncated.chars().count(), 100);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_titles_keep_multibyte_boundaries() {
        let long = "é".repeat(150);
        let truncated = truncate_chars(&long, 100);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 100);
    }
}
