//! Markdown rendering of a [`ConversationData`].
//!
//! A pure function of its inputs: identical conversation and options
//! produce byte-identical output. No clock reads, no I/O.

use crate::model::{Block, ConversationData, Inline, Message, Role};

/// Heading for user turns
const USER_HEADING: &str = "### 👤 User";
/// Heading for turns whose speaker could not be determined
const UNKNOWN_HEADING: &str = "### ❓ Unknown";
/// Attribution line in the footer
const ATTRIBUTION: &str = "*Saved with poesaver*";

/// Rendering configuration
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    /// Emit the metadata block under the title (default true)
    pub include_metadata_header: bool,
    /// Emit the trailing attribution block (default true)
    pub include_footer: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_metadata_header: true,
            include_footer: true,
        }
    }
}

/// Serialize a conversation into the final Markdown document
pub fn render(conversation: &ConversationData, options: &RenderOptions) -> String {
    let metadata = &conversation.metadata;
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", metadata.title));

    if options.include_metadata_header {
        render_metadata(conversation, &mut out);
        out.push('\n');
    }

    out.push_str("---\n\n");
    out.push_str("## Conversation\n\n");

    for message in &conversation.messages {
        render_message(message, &metadata.model_name, &mut out);
    }

    if options.include_footer {
        out.push_str("---\n\n");
        out.push_str(ATTRIBUTION);
        out.push('\n');
        out.push_str(&format!("*Original URL: {}*\n", metadata.source_url));
    }

    out
}

/// Metadata fields in fixed order
fn render_metadata(conversation: &ConversationData, out: &mut String) {
    let metadata = &conversation.metadata;

    out.push_str(&format!("**Source**: {}\n", metadata.source_url));
    out.push_str(&format!("**Model**: {}\n", metadata.model_name));
    out.push_str(&format!("**Conversation ID**: {}\n", metadata.conversation_id));
    out.push_str(&format!(
        "**Exported**: {}\n",
        metadata.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    if let Some(page_title) = &metadata.page_title {
        out.push_str(&format!("**Page title**: {page_title}\n"));
    }

    let unknown = metadata.unknown_message_count();
    let mut counts = format!(
        "**Messages**: {} ({} user, {} assistant",
        metadata.message_count, metadata.user_message_count, metadata.assistant_message_count
    );
    if unknown > 0 {
        counts.push_str(&format!(", {unknown} unknown"));
    }
    counts.push_str(")\n");
    out.push_str(&counts);
}

fn render_message(message: &Message, model_name: &str, out: &mut String) {
    match message.role {
        Role::User => out.push_str(USER_HEADING),
        Role::Assistant => out.push_str(&format!("### 🤖 {model_name}")),
        Role::Unknown => out.push_str(UNKNOWN_HEADING),
    }
    out.push_str("\n\n");
    render_blocks(&message.content, out);
}

fn render_blocks(blocks: &[Block], out: &mut String) {
    for block in blocks {
        match block {
            Block::Paragraph(inlines) => {
                out.push_str(&render_inlines(inlines));
                out.push_str("\n\n");
            }
            Block::Code { language, body } => {
                out.push_str("```");
                if let Some(language) = language {
                    out.push_str(language);
                }
                out.push('\n');
                out.push_str(body);
                if !body.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n\n");
            }
            Block::Quote(inner) => {
                let mut quoted = String::new();
                render_blocks(inner, &mut quoted);
                for line in quoted.trim_end().lines() {
                    if line.is_empty() {
                        out.push_str(">\n");
                    } else {
                        out.push_str(&format!("> {line}\n"));
                    }
                }
                out.push('\n');
            }
            Block::List { ordered, items } => {
                render_list(*ordered, items, 0, out);
                out.push('\n');
            }
        }
    }
}

/// Render a list with two spaces of indentation per nesting level.
/// Nested lists attach to their parent item without blank lines.
fn render_list(ordered: bool, items: &[Vec<Block>], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for (index, item) in items.iter().enumerate() {
        let marker = if ordered {
            format!("{}.", index + 1)
        } else {
            "-".to_string()
        };

        let mut blocks = item.iter();
        let lead = match blocks.next() {
            Some(Block::Paragraph(inlines)) => render_inlines(inlines),
            Some(other) => {
                // Item that opens with non-paragraph content: marker line
                // stays empty and the block follows indented
                out.push_str(&format!("{indent}{marker}\n"));
                render_item_block(other, depth, out);
                String::new()
            }
            None => String::new(),
        };
        if !lead.is_empty() {
            out.push_str(&format!("{indent}{marker} {lead}\n"));
        } else if item.is_empty() {
            out.push_str(&format!("{indent}{marker}\n"));
        }

        for block in blocks {
            render_item_block(block, depth, out);
        }
    }
}

fn render_item_block(block: &Block, depth: usize, out: &mut String) {
    match block {
        Block::List { ordered, items } => render_list(*ordered, items, depth + 1, out),
        other => {
            let mut rendered = String::new();
            render_blocks(std::slice::from_ref(other), &mut rendered);
            let inner_indent = "  ".repeat(depth + 1);
            for line in rendered.trim_end().lines() {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("{inner_indent}{line}\n"));
                }
            }
        }
    }
}

fn render_inlines(inlines: &[Inline]) -> String {
    let mut out = String::new();
    for inline in inlines {
        match inline {
            Inline::Text(text) => out.push_str(text),
            Inline::Emphasis(inner) => {
                out.push('*');
                out.push_str(&render_inlines(inner));
                out.push('*');
            }
            Inline::Strong(inner) => {
                out.push_str("**");
                out.push_str(&render_inlines(inner));
                out.push_str("**");
            }
            Inline::Strikethrough(inner) => {
                out.push_str("~~");
                out.push_str(&render_inlines(inner));
                out.push_str("~~");
            }
            Inline::Code(code) => {
                out.push('`');
                out.push_str(code);
                out.push('`');
            }
            Inline::Link { text, target } => {
                out.push_str(&format!("[{text}]({target})"));
            }
            Inline::Image { alt, source } => {
                out.push_str(&format!("![{alt}]({source})"));
            }
        }
    }
    out
}
