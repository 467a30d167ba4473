//! Document-level metadata lookups.
//!
//! Every lookup is independently optional and infallible: a missing or
//! corrupt field degrades to `None` and never blocks the others.

use scraper::{Html, Selector};
use std::sync::LazyLock;

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("hardcoded selector is valid"));

static BOT_IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img[alt^="Bot image for "]"#).expect("hardcoded selector is valid")
});

/// Page title boilerplate that never names the conversation
const TITLE_NOISE: &[&str] = &["Poe", "Poe - Fast AI Chat"];

/// Best-effort facts read from the page itself
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct PageFacts {
    /// Cleaned `<title>` text, when it plausibly names the conversation
    pub page_title: Option<String>,
    /// Assistant display name hinted by the page chrome
    pub model_hint: Option<String>,
}

pub(crate) fn extract_page_facts(document: &Html) -> PageFacts {
    PageFacts {
        page_title: page_title(document),
        model_hint: model_hint(document),
    }
}

fn page_title(document: &Html) -> Option<String> {
    let raw: String = document.select(&TITLE_SELECTOR).next()?.text().collect();
    let mut title = raw.trim();
    if let Some(stripped) = title.strip_suffix(" - Poe") {
        title = stripped.trim();
    }
    if title.is_empty() || TITLE_NOISE.contains(&title) || !is_plausible_text(title) {
        return None;
    }
    Some(title.to_string())
}

fn model_hint(document: &Html) -> Option<String> {
    if let Some(img) = document.select(&BOT_IMAGE_SELECTOR).next() {
        let name = img
            .value()
            .attr("alt")
            .and_then(|alt| alt.strip_prefix("Bot image for "))
            .map(str::trim)
            .unwrap_or("");
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    // Footer link pattern: "Go to @<handle> on Poe"
    let text: String = document.root_element().text().collect();
    let after = text.split("Go to @").nth(1)?;
    let handle = after.split(" on Poe").next()?.trim();
    if handle.is_empty() || handle.len() > 64 || handle.contains('\n') {
        return None;
    }
    Some(handle.to_string())
}

/// Reject strings that are mostly unprintable, a telltale of anti-bot
/// garbage leaking into the page
pub(crate) fn is_plausible_text(text: &str) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let total = text.chars().count();
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable * 10 >= total * 7
}
