//! Structural extraction: locate conversation turns in a parsed page and
//! classify who is speaking.
//!
//! Share pages carry no stable markup contract, so turn containers are
//! found with a prioritized selector chain and roles come from a chain of
//! classifier strategies tried in order. New strategies can be registered
//! without touching existing ones; when every signal abstains the turn is
//! kept with an unknown role rather than dropped.

use crate::error::ConvertError;
use crate::model::{Block, Inline, Role};
use chrono::{DateTime, Utc};
use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, warn};

// Hardcoded selectors never fail to parse
static MESSAGE_ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[class*="ChatMessage_messageRow"]"#)
        .expect("hardcoded selector is valid")
});

static MESSAGE_ID_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-message-id]").expect("hardcoded selector is valid"));

static GENERIC_MESSAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[class*="message"]"#).expect("hardcoded selector is valid")
});

static BODY_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("hardcoded selector is valid"));

static NEXT_DATA_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[id="__NEXT_DATA__"]"#).expect("hardcoded selector is valid")
});

/// Location of the message list inside the embedded Next.js state
const EMBEDDED_MESSAGES_POINTER: &str = "/props/pageProps/data/mainQuery/chatShare/messages";

/// One turn extracted from the embedded state, already normalized
pub(crate) struct RawTurn {
    pub sender: Option<String>,
    pub role: Role,
    pub content: Vec<Block>,
    pub timestamp: Option<DateTime<Utc>>,
    pub degraded_kinds: Vec<String>,
}

/// One turn located in the DOM, content not yet normalized
pub(crate) struct DomTurn<'a> {
    pub element: ElementRef<'a>,
    pub role: Role,
    pub sender: Option<String>,
}

/// Decision produced by a classifier strategy
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoleSignal {
    pub role: Role,
    /// Display name when the signal carries one (assistant avatars do)
    pub sender: Option<String>,
}

/// One role-classification strategy.
///
/// `classify` returns `None` to abstain; the chain moves on to the next
/// strategy. Strategies must not guess.
pub(crate) trait RoleClassifier {
    /// Identifier for logging
    fn name(&self) -> &'static str;

    /// Attempt a classification for one turn container
    fn classify(&self, turn: &ElementRef<'_>) -> Option<RoleSignal>;
}

/// Ordered chain of classifier strategies; first decisive signal wins
pub(crate) struct ClassifierChain {
    classifiers: Vec<Box<dyn RoleClassifier>>,
}

impl ClassifierChain {
    /// Chain with the built-in strategies, highest priority first:
    /// explicit container markers, then avatar affordances
    pub(crate) fn with_defaults() -> Self {
        Self {
            classifiers: vec![Box::new(MarkerClassifier), Box::new(AvatarClassifier)],
        }
    }

    pub(crate) fn classify(&self, turn: &ElementRef<'_>) -> Option<RoleSignal> {
        for classifier in &self.classifiers {
            if let Some(signal) = classifier.classify(turn) {
                debug!(classifier = classifier.name(), role = ?signal.role, "turn classified");
                return Some(signal);
            }
        }
        None
    }
}

/// Classifies by explicit role markers on the container or its subtree:
/// `data-*` author attributes and bubble class fragments
struct MarkerClassifier;

impl RoleClassifier for MarkerClassifier {
    fn name(&self) -> &'static str {
        "marker"
    }

    fn classify(&self, turn: &ElementRef<'_>) -> Option<RoleSignal> {
        for el in subtree_elements(turn) {
            for (attr, value) in el.value().attrs() {
                let value = value.to_ascii_lowercase();
                if attr.starts_with("data-") && (attr.ends_with("author") || attr.ends_with("role"))
                {
                    match value.as_str() {
                        "human" | "user" => return decisive(Role::User),
                        "bot" | "assistant" => return decisive(Role::Assistant),
                        _ => {}
                    }
                }
                if attr == "class" {
                    if value.contains("humanmessage") || value.contains("rightsidemessage") {
                        return decisive(Role::User);
                    }
                    if value.contains("botmessage") || value.contains("leftsidemessage") {
                        return decisive(Role::Assistant);
                    }
                }
            }
        }
        None
    }
}

/// Classifies by avatar affordances: Poe labels bot avatars
/// `Bot image for <name>`, which also yields the display name
struct AvatarClassifier;

impl RoleClassifier for AvatarClassifier {
    fn name(&self) -> &'static str {
        "avatar"
    }

    fn classify(&self, turn: &ElementRef<'_>) -> Option<RoleSignal> {
        for el in subtree_elements(turn) {
            if el.value().name() == "img" {
                if let Some(alt) = el.value().attr("alt") {
                    if let Some(name) = alt.strip_prefix("Bot image for ") {
                        let name = name.trim();
                        if !name.is_empty() {
                            return Some(RoleSignal {
                                role: Role::Assistant,
                                sender: Some(name.to_string()),
                            });
                        }
                    }
                    if alt.eq_ignore_ascii_case("user avatar") {
                        return decisive(Role::User);
                    }
                }
            }
            if let Some(class) = el.value().attr("class") {
                if class.to_ascii_lowercase().contains("useravatar") {
                    return decisive(Role::User);
                }
            }
        }
        None
    }
}

fn decisive(role: Role) -> Option<RoleSignal> {
    Some(RoleSignal { role, sender: None })
}

fn subtree_elements<'a>(root: &ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    root.descendants().filter_map(ElementRef::wrap)
}

/// Locate turn containers and classify each one.
///
/// Fails with [`ConvertError::NoTurnsFound`] when no heuristic matches;
/// that is fatal for this document and must not be retried here.
pub(crate) fn extract_dom_turns(document: &Html) -> Result<Vec<DomTurn<'_>>, ConvertError> {
    let candidates = find_turn_containers(document).ok_or(ConvertError::NoTurnsFound)?;

    let chain = ClassifierChain::with_defaults();
    let signals: Vec<Option<RoleSignal>> = candidates
        .iter()
        .map(|el| chain.classify(el))
        .collect();
    let resolved = resolve_positional(&signals);

    Ok(candidates
        .into_iter()
        .zip(resolved)
        .map(|(element, signal)| DomTurn {
            element,
            role: signal.role,
            sender: signal.sender,
        })
        .collect())
}

/// Try the marker selector chain, then the alternating-sibling fallback
fn find_turn_containers(document: &Html) -> Option<Vec<ElementRef<'_>>> {
    let selectors: [(&str, &Selector); 3] = [
        ("message_row", &MESSAGE_ROW_SELECTOR),
        ("message_id", &MESSAGE_ID_SELECTOR),
        ("generic_message", &GENERIC_MESSAGE_SELECTOR),
    ];

    for (name, selector) in selectors {
        let matches: Vec<ElementRef<'_>> =
            document.select(selector).filter(has_text).collect();
        let matches = outermost_only(matches);
        if !matches.is_empty() {
            debug!(heuristic = name, count = matches.len(), "turn containers located");
            return Some(matches);
        }
    }

    sibling_fallback(document)
}

/// Keep only containers that are not nested inside another match
fn outermost_only(mut elements: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids: HashSet<NodeId> = elements.iter().map(|el| el.id()).collect();
    elements.retain(|el| !el.ancestors().any(|ancestor| ids.contains(&ancestor.id())));
    elements
}

/// Last-resort heuristic: descend through single-child wrappers from the
/// body and treat the first run of two or more text-bearing siblings as
/// the turn sequence
fn sibling_fallback(document: &Html) -> Option<Vec<ElementRef<'_>>> {
    let mut container = document.select(&BODY_SELECTOR).next()?;
    loop {
        let texty: Vec<ElementRef<'_>> = container
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| has_text(el))
            .collect();
        match texty.len() {
            0 => return None,
            1 => container = texty[0],
            _ => {
                debug!(count = texty.len(), "turn containers located by sibling fallback");
                return Some(texty);
            }
        }
    }
}

fn has_text(el: &ElementRef<'_>) -> bool {
    el.text().any(|t| !t.trim().is_empty())
}

/// Fill unclassified turns by parity from the nearest decisively
/// classified turn. With no anchor anywhere, turns stay unknown: parity
/// never invents a first-turn role on its own.
fn resolve_positional(signals: &[Option<RoleSignal>]) -> Vec<RoleSignal> {
    let anchors: Vec<(usize, Role)> = signals
        .iter()
        .enumerate()
        .filter_map(|(i, signal)| signal.as_ref().map(|s| (i, s.role)))
        .filter(|(_, role)| *role != Role::Unknown)
        .collect();

    signals
        .iter()
        .enumerate()
        .map(|(i, signal)| {
            if let Some(signal) = signal {
                return signal.clone();
            }
            match anchors.iter().min_by_key(|(j, _)| i.abs_diff(*j)) {
                Some((j, role)) => {
                    let role = if i.abs_diff(*j) % 2 == 0 {
                        *role
                    } else {
                        role.flipped()
                    };
                    RoleSignal { role, sender: None }
                }
                None => RoleSignal {
                    role: Role::Unknown,
                    sender: None,
                },
            }
        })
        .collect()
}

/// Fast path: read the conversation from the embedded Next.js state.
///
/// Any failure here degrades silently to the DOM heuristics; this path
/// never aborts extraction.
pub(crate) fn extract_embedded_turns(document: &Html) -> Option<Vec<RawTurn>> {
    let script = document.select(&NEXT_DATA_SELECTOR).next()?;
    let json: String = script.text().collect();

    let data: serde_json::Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "embedded state present but not parseable");
            return None;
        }
    };

    let messages = data.pointer(EMBEDDED_MESSAGES_POINTER)?.as_array()?;

    let mut turns = Vec::new();
    for message in messages {
        let text = message.get("text").and_then(|t| t.as_str()).unwrap_or("");
        if text.trim().is_empty() {
            continue;
        }

        let author = message
            .get("author")
            .and_then(|a| a.as_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        let (role, sender) = if author == "human" {
            (Role::User, None)
        } else {
            let bot = message.get("authorBot");
            let name = bot
                .and_then(|b| b.get("displayName"))
                .and_then(|n| n.as_str())
                .or_else(|| bot.and_then(|b| b.get("handle")).and_then(|n| n.as_str()))
                .map(str::to_string)
                .or_else(|| (!author.is_empty()).then(|| author.clone()));
            (Role::Assistant, name)
        };

        let timestamp = message
            .get("creationTime")
            .and_then(|t| t.as_i64())
            .and_then(DateTime::from_timestamp_micros);

        // The embedded text is markdown source already; it passes through
        // as a single verbatim run
        turns.push(RawTurn {
            sender,
            role,
            content: vec![Block::Paragraph(vec![Inline::Text(text.to_string())])],
            timestamp,
            degraded_kinds: Vec::new(),
        });
    }

    if turns.is_empty() {
        return None;
    }
    debug!(count = turns.len(), "turns extracted from embedded state");
    Some(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> Html {
        Html::parse_document(&format!("<html><body>{body}</body></html>"))
    }

    #[test]
    fn test_marker_classifier_bubble_classes() {
        let html = doc(concat!(
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_humanMessageBubble_x">hi</div></div>"#,
            r#"<div class="ChatMessage_messageRow_a"><div class="Message_botMessageBubble_y">hello</div></div>"#,
        ));
        let turns = extract_dom_turns(&html).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_avatar_classifier_names_the_bot() {
        let html = doc(concat!(
            r#"<div class="ChatMessage_messageRow_a">question</div>"#,
            r#"<div class="ChatMessage_messageRow_a"><img alt="Bot image for Claude-3" src="a.png">answer</div>"#,
        ));
        let turns = extract_dom_turns(&html).unwrap();
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].sender.as_deref(), Some("Claude-3"));
        // first turn resolved by parity from the avatar anchor
        assert_eq!(turns[0].role, Role::User);
    }

    #[test]
    fn test_positional_resolution_flips_parity() {
        let html = doc(concat!(
            r#"<div data-message-id="1" data-message-author="human">a</div>"#,
            r#"<div data-message-id="2">b</div>"#,
            r#"<div data-message-id="3">c</div>"#,
        ));
        let turns = extract_dom_turns(&html).unwrap();
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[2].role, Role::User);
    }

    #[test]
    fn test_no_anchor_stays_unknown() {
        let html = doc(concat!(
            r#"<div data-message-id="1">a</div>"#,
            r#"<div data-message-id="2">b</div>"#,
        ));
        let turns = extract_dom_turns(&html).unwrap();
        assert!(turns.iter().all(|t| t.role == Role::Unknown));
    }

    #[test]
    fn test_empty_containers_are_noise() {
        let html = doc(concat!(
            r#"<div class="ChatMessage_messageRow_a">   </div>"#,
            r#"<div class="ChatMessage_messageRow_b">real</div>"#,
            r#"<div class="ChatMessage_messageRow_c">also real</div>"#,
        ));
        let turns = extract_dom_turns(&html).unwrap();
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn test_no_turns_found() {
        let html = doc("<p>just an article, no conversation</p>");
        // a single text-bearing body child is not a turn sequence
        let result = extract_dom_turns(&html);
        assert!(matches!(result, Err(ConvertError::NoTurnsFound)));
    }

    #[test]
    fn test_sibling_fallback_through_wrappers() {
        let html = doc(
            r#"<div id="__next"><div><section>first turn</section><section>second turn</section></div></div>"#,
        );
        let turns = extract_dom_turns(&html).unwrap();
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|t| t.role == Role::Unknown));
    }

    #[test]
    fn test_embedded_state_extraction() {
        let payload = serde_json::json!({
            "props": {"pageProps": {"data": {"mainQuery": {"chatShare": {"messages": [
                {"text": "What is Rust?", "author": "human", "creationTime": 1700000000000000i64},
                {"text": "A systems language.", "author": "bot",
                 "authorBot": {"displayName": "Model-X", "handle": "modelx"}},
            ]}}}}}
        });
        let html = Html::parse_document(&format!(
            r#"<html><head><script id="__NEXT_DATA__" type="application/json">{payload}</script></head><body></body></html>"#
        ));
        let turns = extract_embedded_turns(&html).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert!(turns[0].timestamp.is_some());
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].sender.as_deref(), Some("Model-X"));
    }

    #[test]
    fn test_embedded_state_garbage_degrades_to_none() {
        let html = Html::parse_document(
            r#"<html><head><script id="__NEXT_DATA__">not json at all</script></head><body></body></html>"#,
        );
        assert!(extract_embedded_turns(&html).is_none());
    }

    #[test]
    fn test_embedded_state_skips_blank_messages() {
        let payload = serde_json::json!({
            "props": {"pageProps": {"data": {"mainQuery": {"chatShare": {"messages": [
                {"text": "   ", "author": "human"},
                {"text": "kept", "author": "bot"},
            ]}}}}}
        });
        let html = Html::parse_document(&format!(
            r#"<html><head><script id="__NEXT_DATA__">{payload}</script></head><body></body></html>"#
        ));
        let turns = extract_embedded_turns(&html).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::Assistant);
    }
}
