//! Pure HTML-to-text helpers for the web search tool
//!
//! Nothing here touches the network; every function is total and never
//! panics on malformed markup.

use super::WebSnippet;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_SNIPPET_CHARS: usize = 300;
pub const MAX_CONTENT_CHARS: usize = 1000;
pub const MAX_SEGMENTS: usize = 10;
pub const MAX_ENGINE_RESULTS: usize = 5;

/// Terms that make a sentence relevant regardless of the query
const ANCHOR_TERMS: [&str; 3] = ["tabiwa", "パス", "フリー"];

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("valid regex"));
static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\s([^>]*)>(.*?)</a>").expect("valid regex"));
static SNIPPET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<(?:a|div|td|span)\s[^>]*class="[^"]*\bresult__snippet\b[^"]*"[^>]*>(.*?)</(?:a|div|td|span)>"#,
    )
    .expect("valid regex")
});
static TITLE_CLASS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"class="[^"]*\bresult__a\b[^"]*""#).expect("valid regex"));
static HREF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href="([^"]*)""#).expect("valid regex"));

/// Take at most `max_chars` Unicode scalar values
pub fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

/// Decode named and numeric character references
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

/// Visible text of an HTML fragment: scripts, styles and tags removed,
/// entities decoded, whitespace collapsed
pub fn strip_html(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let without_styles = STYLE_RE.replace_all(&without_scripts, "");
    let without_tags = TAG_RE.replace_all(&without_styles, " ");
    collapse_whitespace(&decode_entities(&without_tags))
}

/// Text of an inline fragment such as a result title; tags vanish without
/// leaving a gap
fn clean_fragment(html: &str) -> String {
    collapse_whitespace(&decode_entities(&TAG_RE.replace_all(html, "")))
}

/// Sentences of `text` mentioning the query or an anchor term, joined with
/// `。` and capped at [`MAX_CONTENT_CHARS`]. `None` when nothing matched.
pub fn extract_relevant_segments(text: &str, query: &str) -> Option<String> {
    let query = query.to_lowercase();
    let relevant: Vec<&str> = text
        .split(['。', '\n'])
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            let lower = segment.to_lowercase();
            lower.contains(&query) || ANCHOR_TERMS.iter().any(|term| lower.contains(term))
        })
        .take(MAX_SEGMENTS)
        .collect();

    if relevant.is_empty() {
        None
    } else {
        Some(truncate_chars(&relevant.join("。"), MAX_CONTENT_CHARS))
    }
}

/// Resolve a result link, unwrapping the `//duckduckgo.com/l/?uddg=` redirect.
///
/// Returns `None` when the target is not an absolute http(s) URL.
pub fn decode_result_url(href: &str) -> Option<String> {
    let href = decode_entities(href.trim());
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    };
    let parsed = Url::parse(&absolute).ok()?;

    let is_redirect = parsed
        .host_str()
        .is_some_and(|host| host.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/");
    let target = if is_redirect {
        let encoded = parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())?;
        Url::parse(&encoded).ok()?
    } else {
        parsed
    };

    match target.scheme() {
        "http" | "https" if target.host_str().is_some() => Some(target.to_string()),
        _ => None,
    }
}

/// Parse a search-engine results page into at most [`MAX_ENGINE_RESULTS`]
/// snippets. Entries whose URL cannot be decoded, or whose title or snippet
/// is empty after cleanup, are skipped.
pub fn parse_engine_results(html: &str) -> Vec<WebSnippet> {
    let titles: Vec<(usize, usize, &str, &str)> = ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let attrs = caps.get(1)?.as_str();
            if !TITLE_CLASS_RE.is_match(attrs) {
                return None;
            }
            let href = HREF_RE.captures(attrs)?.get(1)?.as_str();
            Some((whole.start(), whole.end(), href, caps.get(2)?.as_str()))
        })
        .collect();

    let mut results = Vec::new();
    for (index, (_, end, href, title_html)) in titles.iter().enumerate() {
        if results.len() >= MAX_ENGINE_RESULTS {
            break;
        }
        let next_start = titles
            .get(index + 1)
            .map(|(start, ..)| *start)
            .unwrap_or(html.len());
        let Some(snippet_html) = html
            .get(*end..next_start)
            .and_then(|region| SNIPPET_RE.captures(region))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };

        let Some(url) = decode_result_url(href) else {
            tracing::debug!(href, "Skipping result with undecodable URL");
            continue;
        };
        let title = truncate_chars(&clean_fragment(title_html), MAX_TITLE_CHARS);
        let snippet = truncate_chars(&clean_fragment(snippet_html), MAX_SNIPPET_CHARS);
        if title.is_empty() || snippet.is_empty() {
            continue;
        }
        results.push(WebSnippet {
            title,
            snippet,
            url,
        });
    }
    results
}
