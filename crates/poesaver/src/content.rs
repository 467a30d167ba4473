//! Content normalization: one turn fragment's sub-tree into the
//! markup-agnostic [`Block`]/[`Inline`] representation.
//!
//! Lossless with respect to semantic structure, lossy with respect to
//! presentation-only markup. Node kinds the model cannot express are
//! flattened to their text content and reported, never dropped silently.

use crate::model::{Block, Inline};
use scraper::node::Node;
use scraper::ElementRef;

/// Elements that never contribute content
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "iframe", "button", "template", "head", "hr",
];

/// Block-level containers that recurse transparently, introducing a
/// paragraph boundary at their edges
const BLOCK_CONTAINERS: &[&str] = &[
    "div", "section", "article", "main", "header", "footer", "figure", "figcaption", "aside",
];

/// Inline wrappers that recurse transparently without their own marker
const INLINE_CONTAINERS: &[&str] = &[
    "span", "u", "sup", "sub", "small", "mark", "abbr", "time", "cite", "label",
];

/// Convert one turn fragment into block content.
///
/// Returns the blocks plus the tag names of any node kinds that were
/// degraded to plain text.
pub(crate) fn normalize_fragment(root: ElementRef<'_>) -> (Vec<Block>, Vec<String>) {
    let mut collector = BlockCollector::default();
    for child in root.children() {
        collector.walk(child);
    }
    collector.flush();
    (collector.blocks, collector.degraded)
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    open: Vec<Inline>,
    degraded: Vec<String>,
}

impl BlockCollector {
    fn walk(&mut self, node: ego_tree::NodeRef<'_, Node>) {
        match node.value() {
            Node::Text(text) => self.push_text(&text),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(node) {
                    self.element(el);
                }
            }
            _ => {}
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();

        if SKIP_TAGS.contains(&name) {
            return;
        }

        match name {
            "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                let inlines = collect_inlines(el, &mut self.degraded);
                self.open = inlines;
                self.flush();
            }
            "pre" => {
                self.flush();
                self.blocks.push(code_block(el));
            }
            "blockquote" => {
                self.flush();
                let mut inner = BlockCollector::default();
                for child in el.children() {
                    inner.walk(child);
                }
                inner.flush();
                self.degraded.append(&mut inner.degraded);
                self.blocks.push(Block::Quote(inner.blocks));
            }
            "ul" | "ol" => {
                self.flush();
                let list = self.list_block(el, name == "ol");
                self.blocks.push(list);
            }
            // A stray list item outside a list still carries content
            "li" => {
                self.flush();
                let mut inner = BlockCollector::default();
                for child in el.children() {
                    inner.walk(child);
                }
                inner.flush();
                self.degraded.append(&mut inner.degraded);
                self.blocks.append(&mut inner.blocks);
            }
            "br" => self.push_raw_text("\n"),
            _ if BLOCK_CONTAINERS.contains(&name) => {
                self.flush();
                for child in el.children() {
                    self.walk(child);
                }
                self.flush();
            }
            "em" | "i" | "strong" | "b" | "del" | "s" | "strike" | "code" | "a" | "img" => {
                if let Some(inline) = inline_element(el, &mut self.degraded) {
                    self.push_inline(inline);
                }
            }
            _ if INLINE_CONTAINERS.contains(&name) => {
                for inline in collect_inlines(el, &mut self.degraded) {
                    self.push_inline(inline);
                }
            }
            // Unrecognized kind: keep the text, discard the markup
            _ => {
                self.degraded.push(name.to_string());
                let text: String = el.text().collect();
                self.flush();
                self.push_text(&text);
                self.flush();
            }
        }
    }

    fn list_block(&mut self, el: ElementRef<'_>, ordered: bool) -> Block {
        let mut items = Vec::new();
        for child in el.children() {
            let Some(item) = ElementRef::wrap(child) else {
                continue;
            };
            if item.value().name() != "li" {
                continue;
            }
            let mut inner = BlockCollector::default();
            for grandchild in item.children() {
                inner.walk(grandchild);
            }
            inner.flush();
            self.degraded.append(&mut inner.degraded);
            items.push(inner.blocks);
        }
        Block::List { ordered, items }
    }

    fn push_text(&mut self, text: &str) {
        let collapsed = collapse_whitespace(text);
        if collapsed.is_empty() {
            return;
        }
        self.push_raw_text(&collapsed);
    }

    fn push_raw_text(&mut self, text: &str) {
        if let Some(Inline::Text(last)) = self.open.last_mut() {
            last.push_str(text);
        } else {
            self.open.push(Inline::Text(text.to_string()));
        }
    }

    fn push_inline(&mut self, inline: Inline) {
        if let Inline::Text(text) = &inline {
            self.push_raw_text(text);
        } else {
            self.open.push(inline);
        }
    }

    fn flush(&mut self) {
        let inlines = std::mem::take(&mut self.open);
        if let Some(paragraph) = finalize_paragraph(inlines) {
            self.blocks.push(paragraph);
        }
    }
}

/// Collect the inline content of an element, recursing into nested spans
fn collect_inlines(el: ElementRef<'_>, degraded: &mut Vec<String>) -> Vec<Inline> {
    let mut inlines: Vec<Inline> = Vec::new();
    for child in el.children() {
        match child.value() {
            Node::Text(text) => push_merged(&mut inlines, &collapse_whitespace(text)),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if SKIP_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    push_merged(&mut inlines, "\n");
                } else if INLINE_CONTAINERS.contains(&name) {
                    for inline in collect_inlines(child_el, degraded) {
                        match inline {
                            Inline::Text(text) => push_merged(&mut inlines, &text),
                            other => inlines.push(other),
                        }
                    }
                } else if let Some(inline) = inline_element(child_el, degraded) {
                    match inline {
                        Inline::Text(text) => push_merged(&mut inlines, &text),
                        other => inlines.push(other),
                    }
                } else {
                    // Block-level or unknown markup inside an inline run:
                    // its text survives, its structure does not
                    let text: String = child_el.text().collect();
                    push_merged(&mut inlines, &collapse_whitespace(&text));
                }
            }
            _ => {}
        }
    }
    inlines
}

/// Map one inline element kind; `None` means the caller should flatten it
fn inline_element(el: ElementRef<'_>, degraded: &mut Vec<String>) -> Option<Inline> {
    match el.value().name() {
        "em" | "i" => Some(Inline::Emphasis(collect_inlines(el, degraded))),
        "strong" | "b" => Some(Inline::Strong(collect_inlines(el, degraded))),
        "del" | "s" | "strike" => Some(Inline::Strikethrough(collect_inlines(el, degraded))),
        "code" => Some(Inline::Code(el.text().collect())),
        "a" => {
            let target = el.value().attr("href").unwrap_or("").to_string();
            let text = collapse_whitespace(&el.text().collect::<String>())
                .trim()
                .to_string();
            if target.is_empty() {
                // Anchor without destination; keep only the text
                return if text.is_empty() {
                    None
                } else {
                    Some(Inline::Text(text))
                };
            }
            let text = if text.is_empty() { target.clone() } else { text };
            Some(Inline::Link { text, target })
        }
        "img" => Some(Inline::Image {
            alt: el.value().attr("alt").unwrap_or("").to_string(),
            source: el.value().attr("src").unwrap_or("").to_string(),
        }),
        _ => None,
    }
}

/// Build a code block from a `<pre>` element.
///
/// The body is taken verbatim; the language tag is carried through only
/// when a `language-*`/`lang-*` class is present on the `<pre>` or its
/// `<code>` child.
fn code_block(pre: ElementRef<'_>) -> Block {
    let code_child = pre.children().find_map(|child| {
        ElementRef::wrap(child).filter(|el| el.value().name() == "code")
    });

    let body: String = match code_child {
        Some(code) => code.text().collect(),
        None => pre.text().collect(),
    };

    let language = language_from_classes(pre)
        .or_else(|| code_child.and_then(language_from_classes));

    Block::Code { language, body }
}

fn language_from_classes(el: ElementRef<'_>) -> Option<String> {
    let classes = el.value().attr("class")?;
    for class in classes.split_whitespace() {
        for prefix in ["language-", "lang-"] {
            if let Some(lang) = class.strip_prefix(prefix) {
                if !lang.is_empty() {
                    return Some(lang.to_string());
                }
            }
        }
    }
    None
}

/// Collapse whitespace runs to single spaces, as a browser renders text
/// nodes. Leading/trailing runs become a single space so words separated
/// by markup boundaries do not fuse; paragraph ends are trimmed later.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn push_merged(inlines: &mut Vec<Inline>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Inline::Text(last)) = inlines.last_mut() {
        last.push_str(text);
    } else {
        inlines.push(Inline::Text(text.to_string()));
    }
}

/// Trim paragraph edges and drop paragraphs with no content
fn finalize_paragraph(mut inlines: Vec<Inline>) -> Option<Block> {
    if let Some(Inline::Text(first)) = inlines.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(Inline::Text(last)) = inlines.last_mut() {
        *last = last.trim_end().to_string();
    }
    inlines.retain(|inline| !matches!(inline, Inline::Text(t) if t.is_empty()));
    if inlines.is_empty() {
        return None;
    }
    Some(Block::Paragraph(inlines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn normalize(html: &str) -> (Vec<Block>, Vec<String>) {
        let fragment = Html::parse_fragment(html);
        normalize_fragment(fragment.root_element())
    }

    #[test]
    fn test_plain_paragraphs() {
        let (blocks, degraded) = normalize("<div><p>Hello</p><p>World</p></div>");
        assert!(degraded.is_empty());
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph(vec![Inline::Text("Hello".to_string())]),
                Block::Paragraph(vec![Inline::Text("World".to_string())]),
            ]
        );
    }

    #[test]
    fn test_emphasis_and_strong() {
        let (blocks, _) = normalize("<div><p>a <em>b</em> and <strong>c</strong></p></div>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Inline::Text("a ".to_string()),
                Inline::Emphasis(vec![Inline::Text("b".to_string())]),
                Inline::Text(" and ".to_string()),
                Inline::Strong(vec![Inline::Text("c".to_string())]),
            ])]
        );
    }

    #[test]
    fn test_code_block_verbatim_with_language() {
        let (blocks, _) =
            normalize("<div><pre><code class=\"language-python\">print(1)</code></pre></div>");
        assert_eq!(
            blocks,
            vec![Block::Code {
                language: Some("python".to_string()),
                body: "print(1)".to_string(),
            }]
        );
    }

    #[test]
    fn test_code_block_preserves_inner_whitespace() {
        let (blocks, _) =
            normalize("<div><pre><code>  indented\n    more  </code></pre></div>");
        assert_eq!(
            blocks,
            vec![Block::Code {
                language: None,
                body: "  indented\n    more  ".to_string(),
            }]
        );
    }

    #[test]
    fn test_inline_code() {
        let (blocks, _) = normalize("<div><p>run <code>ls -la</code> now</p></div>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Inline::Text("run ".to_string()),
                Inline::Code("ls -la".to_string()),
                Inline::Text(" now".to_string()),
            ])]
        );
    }

    #[test]
    fn test_blockquote_recurses() {
        let (blocks, _) =
            normalize("<div><blockquote><p>quoted</p><pre>code</pre></blockquote></div>");
        assert_eq!(
            blocks,
            vec![Block::Quote(vec![
                Block::Paragraph(vec![Inline::Text("quoted".to_string())]),
                Block::Code {
                    language: None,
                    body: "code".to_string(),
                },
            ])]
        );
    }

    #[test]
    fn test_nested_list_preserves_order_and_depth() {
        let html = "<div><ul>\
                    <li>one<ul><li>inner a</li><li>inner b</li></ul></li>\
                    <li>two</li>\
                    </ul></div>";
        let (blocks, _) = normalize(html);
        let Block::List { ordered, items } = &blocks[0] else {
            panic!("expected list, got {blocks:?}");
        };
        assert!(!ordered);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0][0],
            Block::Paragraph(vec![Inline::Text("one".to_string())])
        );
        let Block::List { items: inner, .. } = &items[0][1] else {
            panic!("expected nested list, got {:?}", items[0]);
        };
        assert_eq!(
            inner[0],
            vec![Block::Paragraph(vec![Inline::Text("inner a".to_string())])]
        );
        assert_eq!(
            inner[1],
            vec![Block::Paragraph(vec![Inline::Text("inner b".to_string())])]
        );
        assert_eq!(
            items[1][0],
            Block::Paragraph(vec![Inline::Text("two".to_string())])
        );
    }

    #[test]
    fn test_ordered_list() {
        let (blocks, _) = normalize("<div><ol><li>first</li><li>second</li></ol></div>");
        assert_eq!(
            blocks,
            vec![Block::List {
                ordered: true,
                items: vec![
                    vec![Block::Paragraph(vec![Inline::Text("first".to_string())])],
                    vec![Block::Paragraph(vec![Inline::Text("second".to_string())])],
                ],
            }]
        );
    }

    #[test]
    fn test_link_text_falls_back_to_target() {
        let (blocks, _) =
            normalize("<div><p><a href=\"https://example.com\"></a></p></div>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![Inline::Link {
                text: "https://example.com".to_string(),
                target: "https://example.com".to_string(),
            }])]
        );
    }

    #[test]
    fn test_image_reference() {
        let (blocks, _) =
            normalize("<div><p><img src=\"pic.png\" alt=\"a picture\"></p></div>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![Inline::Image {
                alt: "a picture".to_string(),
                source: "pic.png".to_string(),
            }])]
        );
    }

    #[test]
    fn test_unrecognized_kind_degrades_to_text() {
        let (blocks, degraded) =
            normalize("<div><table><tr><td>hello</td></tr></table></div>");
        assert_eq!(degraded, vec!["table".to_string()]);
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![Inline::Text("hello".to_string())])]
        );
    }

    #[test]
    fn test_script_and_buttons_skipped() {
        let (blocks, degraded) = normalize(
            "<div><p>before</p><script>alert(1)</script><button>Copy</button><p>after</p></div>",
        );
        assert!(degraded.is_empty());
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph(vec![Inline::Text("before".to_string())]),
                Block::Paragraph(vec![Inline::Text("after".to_string())]),
            ]
        );
    }

    #[test]
    fn test_whitespace_collapse_keeps_word_boundaries() {
        let (blocks, _) = normalize("<div><p>Hello\n   <em>big</em>\n world</p></div>");
        assert_eq!(
            blocks,
            vec![Block::Paragraph(vec![
                Inline::Text("Hello ".to_string()),
                Inline::Emphasis(vec![Inline::Text("big".to_string())]),
                Inline::Text(" world".to_string()),
            ])]
        );
    }

    #[test]
    fn test_empty_containers_yield_nothing() {
        let (blocks, degraded) = normalize("<div><div>  </div><p></p></div>");
        assert!(blocks.is_empty());
        assert!(degraded.is_empty());
    }
}
