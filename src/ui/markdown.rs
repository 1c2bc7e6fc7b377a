//! Constrained markdown to HTML
//!
//! Input is HTML-escaped first, then run through a fixed list of
//! [`MarkdownPass`]es. Code is pulled out into placeholders before any inline
//! styling, so `**` inside backticks survives untouched, and restored last.
//! Link targets are stashed the same way, so `*` or `_` in a URL stays literal.
//!
//! ```
//! use tabiwa_assistant::ui::markdown::render_markdown;
//!
//! assert_eq!(render_markdown("**広島**"), "<strong>広島</strong>");
//! assert_eq!(render_markdown("`**x**`"), "<code>**x**</code>");
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

/// Semantic node kinds a front-end knows how to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Bold,
    Italic,
    CodeInline,
    CodeBlock,
    Link,
    ListItem,
    /// Level 1..=3
    Heading(u8),
    Blockquote,
    TableCell,
}

/// How one node kind becomes markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRule {
    pub tag: &'static str,
    pub class: Option<String>,
}

impl RenderRule {
    fn new(tag: &'static str) -> Self {
        Self { tag, class: None }
    }

    fn open(&self, extra_attrs: &str) -> String {
        match &self.class {
            Some(class) => format!("<{} class=\"{}\"{}>", self.tag, escape_html(class), extra_attrs),
            None => format!("<{}{}>", self.tag, extra_attrs),
        }
    }

    fn close(&self) -> String {
        format!("</{}>", self.tag)
    }
}

/// Fixed dispatch from [`NodeKind`] to markup
#[derive(Debug, Clone)]
pub struct RenderTable {
    rules: HashMap<NodeKind, RenderRule>,
}

impl Default for RenderTable {
    fn default() -> Self {
        let rules = [
            (NodeKind::Bold, "strong"),
            (NodeKind::Italic, "em"),
            (NodeKind::CodeInline, "code"),
            (NodeKind::CodeBlock, "pre"),
            (NodeKind::Link, "a"),
            (NodeKind::ListItem, "li"),
            (NodeKind::Heading(1), "h1"),
            (NodeKind::Heading(2), "h2"),
            (NodeKind::Heading(3), "h3"),
            (NodeKind::Blockquote, "blockquote"),
            (NodeKind::TableCell, "td"),
        ]
        .into_iter()
        .map(|(kind, tag)| (kind, RenderRule::new(tag)))
        .collect();
        Self { rules }
    }
}

impl RenderTable {
    /// Attach a CSS class to every node of `kind`
    pub fn with_class(mut self, kind: NodeKind, class: impl Into<String>) -> Self {
        if let Some(rule) = self.rules.get_mut(&Self::normalize(kind)) {
            rule.class = Some(class.into());
        }
        self
    }

    pub fn rule(&self, kind: NodeKind) -> Option<&RenderRule> {
        self.rules.get(&Self::normalize(kind))
    }

    /// Headings outside 1..=3 render as the nearest supported level
    fn normalize(kind: NodeKind) -> NodeKind {
        match kind {
            NodeKind::Heading(level) => NodeKind::Heading(level.clamp(1, 3)),
            other => other,
        }
    }

    /// Wrap already-escaped `inner` in the markup for `kind`
    pub fn wrap(&self, kind: NodeKind, inner: &str) -> String {
        let Some(rule) = self.rule(kind) else {
            return inner.to_string();
        };
        match kind {
            NodeKind::CodeBlock => format!("{}<code>{}</code>{}", rule.open(""), inner, rule.close()),
            _ => format!("{}{}{}", rule.open(""), inner, rule.close()),
        }
    }

    /// A link opening in a new tab; `href` must already be escaped
    pub fn link(&self, href: &str, label: &str) -> String {
        let Some(rule) = self.rule(NodeKind::Link) else {
            return label.to_string();
        };
        let attrs = format!(
            " href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\"",
            href
        );
        format!("{}{}{}", rule.open(&attrs), label, rule.close())
    }
}

/// One substitution step, listed in execution order by [`PIPELINE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkdownPass {
    CodeBlock,
    CodeInline,
    Link,
    Bold,
    Italic,
    ListItem,
    LineBreak,
}

/// Code extraction, then link targets, then inline styling, then structure,
/// then whitespace
pub const PIPELINE: [MarkdownPass; 7] = [
    MarkdownPass::CodeBlock,
    MarkdownPass::CodeInline,
    MarkdownPass::Link,
    MarkdownPass::Bold,
    MarkdownPass::Italic,
    MarkdownPass::ListItem,
    MarkdownPass::LineBreak,
];

const STASH_OPEN: char = '\u{E000}';
const STASH_CLOSE: char = '\u{E001}';

static CODE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```(.*?)```").expect("valid regex"));
static CODE_INLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("valid regex"));
static ITALIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid regex"));
// Targets may hold one level of balanced parentheses
static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]\n]+)\]\(((?:[^()\s]|\([^()\s]*\))+)\)").expect("valid regex")
});
static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^- (.+)$").expect("valid regex"));
static STASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("\u{E000}([0-9]+)\u{E001}").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Escape text for HTML element content and quoted attributes
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            STASH_OPEN | STASH_CLOSE => {}
            _ => out.push(ch),
        }
    }
    out
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Only these link targets become anchors
fn is_safe_href(escaped_href: &str) -> bool {
    let lower = escaped_href.to_ascii_lowercase();
    ["http://", "https://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Renders the constrained markdown subset
#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer {
    table: RenderTable,
}

impl MarkdownRenderer {
    pub fn new(table: RenderTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RenderTable {
        &self.table
    }

    pub fn render(&self, text: &str) -> String {
        let mut stash: Vec<String> = Vec::new();
        let mut html = escape_html(text);
        for pass in PIPELINE {
            html = self.apply(pass, &html, &mut stash);
        }
        STASH_RE
            .replace_all(&html, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| stash.get(index).cloned())
                    .unwrap_or_default()
            })
            .into_owned()
    }

    fn apply(&self, pass: MarkdownPass, html: &str, stash: &mut Vec<String>) -> String {
        let table = &self.table;
        let mut keep = |rendered: String| {
            stash.push(rendered);
            format!("{}{}{}", STASH_OPEN, stash.len() - 1, STASH_CLOSE)
        };
        match pass {
            MarkdownPass::CodeBlock => CODE_BLOCK_RE
                .replace_all(html, |caps: &Captures| {
                    let code = caps[1].strip_prefix('\n').unwrap_or(&caps[1]);
                    let code = code.strip_suffix('\n').unwrap_or(code);
                    keep(table.wrap(NodeKind::CodeBlock, code))
                })
                .into_owned(),
            MarkdownPass::CodeInline => CODE_INLINE_RE
                .replace_all(html, |caps: &Captures| {
                    keep(table.wrap(NodeKind::CodeInline, &caps[1]))
                })
                .into_owned(),
            MarkdownPass::Bold => BOLD_RE
                .replace_all(html, |caps: &Captures| table.wrap(NodeKind::Bold, &caps[1]))
                .into_owned(),
            MarkdownPass::Italic => ITALIC_RE
                .replace_all(html, |caps: &Captures| table.wrap(NodeKind::Italic, &caps[1]))
                .into_owned(),
            MarkdownPass::Link => LINK_RE
                .replace_all(html, |caps: &Captures| {
                    if is_safe_href(&caps[2]) {
                        let href = keep(caps[2].to_string());
                        table.link(&href, &caps[1])
                    } else {
                        caps[1].to_string()
                    }
                })
                .into_owned(),
            MarkdownPass::ListItem => LIST_ITEM_RE
                .replace_all(html, |caps: &Captures| table.wrap(NodeKind::ListItem, &caps[1]))
                .into_owned(),
            MarkdownPass::LineBreak => html.replace('\n', "<br />"),
        }
    }
}

/// Render with the default table
pub fn render_markdown(text: &str) -> String {
    MarkdownRenderer::default().render(text)
}

/// Text a reader would see: breaks become newlines, tags vanish
pub fn visible_text(html: &str) -> String {
    let with_newlines = html.replace("<br />", "\n");
    unescape_html(&TAG_RE.replace_all(&with_newlines, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_styles() {
        assert_eq!(render_markdown("**a**"), "<strong>a</strong>");
        assert_eq!(render_markdown("*a*"), "<em>a</em>");
        assert_eq!(render_markdown("`a`"), "<code>a</code>");
        assert_eq!(
            render_markdown("**広島**と*宮島*"),
            "<strong>広島</strong>と<em>宮島</em>"
        );
    }

    #[test]
    fn test_code_block_contents_untouched() {
        assert_eq!(render_markdown("```a```"), "<pre><code>a</code></pre>");
        assert_eq!(
            render_markdown("```\n**x** [y](https://z)\n- w\n```"),
            "<pre><code>**x** [y](https://z)\n- w</code></pre>"
        );
        assert_eq!(render_markdown("`*a*`"), "<code>*a*</code>");
    }

    #[test]
    fn test_links() {
        assert_eq!(
            render_markdown("[広島ワイドパス](https://example.com/a?x=1&y=2)"),
            "<a href=\"https://example.com/a?x=1&amp;y=2\" target=\"_blank\" \
             rel=\"noopener noreferrer\">広島ワイドパス</a>"
        );
        assert_eq!(render_markdown("[click](javascript:alert(1))"), "click");
        assert_eq!(render_markdown("[x](/relative)"), "x");
    }

    #[test]
    fn test_link_target_is_not_styled() {
        assert_eq!(
            render_markdown("[x](https://ex.com/*a*)"),
            "<a href=\"https://ex.com/*a*\" target=\"_blank\" rel=\"noopener noreferrer\">x</a>"
        );
        assert_eq!(
            render_markdown("[**太字**](https://ex.com/**b**)"),
            "<a href=\"https://ex.com/**b**\" target=\"_blank\" \
             rel=\"noopener noreferrer\"><strong>太字</strong></a>"
        );
    }

    #[test]
    fn test_link_target_keeps_parentheses() {
        assert_eq!(
            render_markdown("[Rust](https://en.wikipedia.org/wiki/Rust_(language))"),
            "<a href=\"https://en.wikipedia.org/wiki/Rust_(language)\" target=\"_blank\" \
             rel=\"noopener noreferrer\">Rust</a>"
        );
        assert_eq!(
            render_markdown("(詳細は[こちら](https://ex.com/a))"),
            "(詳細は<a href=\"https://ex.com/a\" target=\"_blank\" \
             rel=\"noopener noreferrer\">こちら</a>)"
        );
    }

    #[test]
    fn test_list_items_and_breaks() {
        assert_eq!(
            render_markdown("候補:\n- 広島\n- 岡山"),
            "候補:<br /><li>広島</li><br /><li>岡山</li>"
        );
    }

    #[test]
    fn test_raw_html_is_escaped() {
        assert_eq!(
            render_markdown("<script>alert('x')</script>"),
            "&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"
        );
        assert_eq!(render_markdown("**<b>**"), "<strong>&lt;b&gt;</strong>");
    }

    #[test]
    fn test_stash_markers_in_input_are_dropped() {
        let sneaky = format!("{}0{} `a`", STASH_OPEN, STASH_CLOSE);
        assert_eq!(render_markdown(&sneaky), "0 <code>a</code>");
    }

    #[test]
    fn test_visible_text_round_trip() {
        let source = "**広島**は`3000円`です。\n- [詳細](https://example.com) & *お得*";
        let html = render_markdown(source);
        assert_eq!(
            visible_text(&html),
            "広島は3000円です。\n詳細 & お得"
        );
    }

    #[test]
    fn test_table_classes_and_headings() {
        let table = RenderTable::default()
            .with_class(NodeKind::Bold, "font-bold")
            .with_class(NodeKind::Heading(2), "title");
        assert_eq!(table.wrap(NodeKind::Bold, "a"), "<strong class=\"font-bold\">a</strong>");
        assert_eq!(table.wrap(NodeKind::Heading(2), "h"), "<h2 class=\"title\">h</h2>");
        assert_eq!(table.wrap(NodeKind::Heading(9), "h"), "<h3>h</h3>");
        assert_eq!(table.wrap(NodeKind::Blockquote, "q"), "<blockquote>q</blockquote>");
        assert_eq!(table.wrap(NodeKind::TableCell, "c"), "<td>c</td>");

        let renderer = MarkdownRenderer::new(table);
        assert_eq!(renderer.render("**a**"), "<strong class=\"font-bold\">a</strong>");
    }

    #[test]
    fn test_pipeline_order_is_fixed() {
        assert_eq!(PIPELINE[0], MarkdownPass::CodeBlock);
        assert_eq!(PIPELINE[1], MarkdownPass::CodeInline);
        assert_eq!(PIPELINE[2], MarkdownPass::Link);
        assert_eq!(PIPELINE.last(), Some(&MarkdownPass::LineBreak));
    }
}
