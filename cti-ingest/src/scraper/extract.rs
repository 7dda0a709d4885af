//! Readable-text extraction from article HTML
//!
//! Prefers main-content regions and strips script/style/navigation
//! noise. All helpers are synchronous: `scraper::Html` is not Send, so
//! parsing must never be held across an await point.

use scraper::{ElementRef, Html, Node, Selector};

/// Content containers tried in order before falling back to the whole body
const CONTENT_SELECTORS: [&str; 6] = [
    "article",
    "main",
    "div.post-content",
    "div.entry-content",
    "div.article-body",
    "body",
];

/// Elements whose text is never article content
const SKIP_TAGS: [&str; 8] = [
    "script", "style", "nav", "header", "footer", "aside", "noscript", "form",
];

/// Elements that end a line of text
const BLOCK_TAGS: [&str; 13] = [
    "p", "div", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "tr", "blockquote",
];

/// Extract readable text from an article page.
///
/// Input that is not HTML at all comes back as its own text content.
pub fn extract_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let mut out = String::new();

    for sel_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(sel_str) else {
            continue;
        };
        if let Some(element) = doc.select(&selector).next() {
            collect_text(element, &mut out);
            if !out.trim().is_empty() {
                break;
            }
        }
    }

    if out.trim().is_empty() {
        collect_text(doc.root_element(), &mut out);
    }

    normalize_whitespace(&out)
}

/// Extract a page title: <title>, og:title, or the first <h1>
pub fn extract_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("title") {
        if let Some(element) = doc.select(&selector).next() {
            let title = element.text().collect::<String>();
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[property="og:title"]"#) {
        if let Some(element) = doc.select(&selector).next() {
            if let Some(content) = element.value().attr("content") {
                let content = content.trim();
                if !content.is_empty() {
                    return Some(content.to_string());
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("h1") {
        if let Some(element) = doc.select(&selector).next() {
            let title = element.text().collect::<String>();
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }

    None
}

/// Walk an element's subtree collecting text, skipping noise elements
fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    let tag = child_el.value().name();
                    if SKIP_TAGS.contains(&tag) {
                        continue;
                    }
                    collect_text(child_el, out);
                    if BLOCK_TAGS.contains(&tag) {
                        out.push('\n');
                    }
                }
            }
            _ => {}
        }
    }
}

/// Trim lines and drop blanks; block elements already provide the
/// line structure.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>APT99 targets healthcare | Threat Blog</title>
  <meta property="og:title" content="APT99 targets healthcare">
  <style>body { color: red; }</style>
</head>
<body>
  <nav><a href="/">Home</a><a href="/about">About</a></nav>
  <article>
    <h1>APT99 targets healthcare</h1>
    <p>The actor delivered a loader via spearphishing.</p>
    <p>Persistence used scheduled tasks.</p>
    <script>trackPageView();</script>
  </article>
  <footer>Copyright 2026</footer>
</body>
</html>"#;

    #[test]
    fn extracts_article_content_only() {
        let text = extract_text(ARTICLE_HTML);
        assert!(text.contains("loader via spearphishing"));
        assert!(text.contains("scheduled tasks"));
        // Navigation, script and footer noise must be gone.
        assert!(!text.contains("About"));
        assert!(!text.contains("trackPageView"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn paragraphs_become_lines() {
        let text = extract_text(ARTICLE_HTML);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.len() >= 3);
        assert!(lines.iter().any(|l| l.starts_with("The actor delivered")));
    }

    #[test]
    fn falls_back_to_body_without_article() {
        let html = "<html><body><p>Just a paragraph.</p></body></html>";
        let text = extract_text(html);
        assert_eq!(text, "Just a paragraph.");
    }

    #[test]
    fn plain_text_input_survives() {
        let text = extract_text("IOC list: 203.0.113.5");
        assert!(text.contains("203.0.113.5"));
    }

    #[test]
    fn title_prefers_title_tag() {
        assert_eq!(
            extract_title(ARTICLE_HTML).as_deref(),
            Some("APT99 targets healthcare | Threat Blog")
        );
    }

    #[test]
    fn title_falls_back_to_h1() {
        let html = "<html><body><h1>Fallback heading</h1></body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Fallback heading"));
        assert!(extract_title("<html><body><p>nothing</p></body></html>").is_none());
    }

    #[test]
    fn whitespace_is_normalized() {
        let html = "<html><body><article><p>  one  </p>\n\n\n<p>two</p></article></body></html>";
        let text = extract_text(html);
        assert_eq!(text, "one\ntwo");
    }
}
