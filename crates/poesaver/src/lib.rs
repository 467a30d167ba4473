//! Poesaver - save Poe.com shared conversations as Markdown
//!
//! This crate turns a publicly shared conversation page into a structured
//! [`ConversationData`] and a deterministic Markdown document.
//!
//! ## Pipeline
//!
//! The core is a pure, synchronous pipeline: [`convert`] takes the raw
//! HTML plus a [`SourceInfo`] fixed by the caller and yields the
//! structured conversation, the rendered Markdown, and any normalization
//! warnings. It performs no network or filesystem I/O and holds no shared
//! state, so documents can be converted concurrently without coordination.
//!
//! ## Shells
//!
//! Around the pipeline sit the retrieval shell ([`fetch_share_page`],
//! retry with backoff and anti-bot body validation) and the persistence
//! helpers ([`unique_path`], collision-avoiding output naming).

mod content;
mod error;
mod extract;
mod fetch;
mod metadata;
mod model;
mod pipeline;
mod render;
mod storage;

pub use error::{ConvertError, FetchError, StorageError};
pub use fetch::{
    conversation_id, fetch_page, fetch_share_page, fetch_share_page_with_options, is_share_url,
    FetchOptions, DEFAULT_USER_AGENT,
};
pub use model::{
    Block, ConversationData, Inline, Message, Metadata, NormalizationWarning, Role,
};
pub use pipeline::{convert, convert_with_options, Converted, SourceInfo};
pub use render::{render, RenderOptions};
pub use storage::{
    count_words, format_file_size, read_url_list, sanitize_filename, unique_path,
};
