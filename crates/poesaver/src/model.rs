//! Core types for extracted conversations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker classification of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human participant
    User,
    /// The model/bot participant
    Assistant,
    /// Could not be determined; the message is kept rather than dropped
    Unknown,
}

impl Role {
    /// The opposite side of the conversation, used by positional inference.
    /// `Unknown` has no opposite.
    pub(crate) fn flipped(self) -> Role {
        match self {
            Role::User => Role::Assistant,
            Role::Assistant => Role::User,
            Role::Unknown => Role::Unknown,
        }
    }
}

/// Inline content inside a paragraph or list item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inline {
    /// Plain text run
    Text(String),
    /// Emphasized (italic) span
    Emphasis(Vec<Inline>),
    /// Strong (bold) span
    Strong(Vec<Inline>),
    /// Struck-through span
    Strikethrough(Vec<Inline>),
    /// Inline code span, verbatim
    Code(String),
    /// Hyperlink; `text` falls back to `target` when the source text is empty
    Link { text: String, target: String },
    /// Image reference; never downloaded or inlined
    Image { alt: String, source: String },
}

/// Block-level content of a message, independent of the source markup dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    /// Paragraph of inline content
    Paragraph(Vec<Inline>),
    /// Fenced code block; body is verbatim, language only when the source
    /// carried one (never guessed)
    Code {
        language: Option<String>,
        body: String,
    },
    /// Block quotation, recursively normalized
    Quote(Vec<Block>),
    /// Ordered or unordered list; item order and nesting preserved
    List {
        ordered: bool,
        items: Vec<Vec<Block>>,
    },
}

impl Inline {
    fn collect_text(&self, out: &mut String) {
        match self {
            Inline::Text(t) | Inline::Code(t) => out.push_str(t),
            Inline::Emphasis(inner) | Inline::Strong(inner) | Inline::Strikethrough(inner) => {
                for inline in inner {
                    inline.collect_text(out);
                }
            }
            Inline::Link { text, .. } => out.push_str(text),
            Inline::Image { alt, .. } => out.push_str(alt),
        }
    }
}

impl Block {
    fn collect_text(&self, out: &mut String) {
        match self {
            Block::Paragraph(inlines) => {
                for inline in inlines {
                    inline.collect_text(out);
                }
                out.push('\n');
            }
            Block::Code { body, .. } => {
                out.push_str(body);
                out.push('\n');
            }
            Block::Quote(blocks) => {
                for block in blocks {
                    block.collect_text(out);
                }
            }
            Block::List { items, .. } => {
                for item in items {
                    for block in item {
                        block.collect_text(out);
                    }
                }
            }
        }
    }
}

/// One conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Display name; always the literal `"User"` for user turns, the name
    /// shown on the page for assistant turns
    pub sender: String,
    /// Speaker classification; labels the section, never alters content
    pub role: Role,
    /// Normalized content
    pub content: Vec<Block>,
    /// Only present when the page exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Zero-based position in source order; contiguous across the document
    pub sequence_index: usize,
}

impl Message {
    /// Flattened text of the whole message, used for title derivation and
    /// word counting. Markup structure is ignored.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            block.collect_text(&mut out);
        }
        out.trim().to_string()
    }
}

/// Document-level facts about a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Conversation title, or the `"Untitled Conversation"` placeholder
    pub title: String,
    /// Display name of the assistant participant, or `"unknown"`
    pub model_name: String,
    /// Share identifier, recovered from the originating reference
    pub conversation_id: String,
    /// Where the document came from
    pub source_url: String,
    /// When the page was retrieved (fixed by the fetch layer, not the page)
    pub fetched_at: DateTime<Utc>,
    /// Total number of messages
    pub message_count: usize,
    /// Messages classified as user turns
    pub user_message_count: usize,
    /// Messages classified as assistant turns
    pub assistant_message_count: usize,
    /// Raw page `<title>` when it differs from the derived title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
}

impl Metadata {
    /// Messages that could not be classified
    pub fn unknown_message_count(&self) -> usize {
        self.message_count - self.user_message_count - self.assistant_message_count
    }
}

/// A complete extracted conversation: one [`Metadata`] plus the ordered
/// message sequence. Built once, never mutated, consumed by rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationData {
    pub metadata: Metadata,
    pub messages: Vec<Message>,
}

/// A node kind that could not be mapped and was degraded to plain text.
///
/// Non-fatal: the turn's text is kept, only its markup was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationWarning {
    /// `sequence_index` of the affected message
    pub turn_index: usize,
    /// Tag name of the unmapped node
    pub node_kind: String,
}

impl std::fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "turn {}: <{}> degraded to plain text",
            self.turn_index, self.node_kind
        )
    }
}
