//! HTML text extraction

use scraper::{Html, Selector};

/// Extract plain text from HTML content.
///
/// The `<body>` is rendered through html2text so lists and tables keep a
/// readable shape; boilerplate whitespace is collapsed afterwards.
pub fn extract_text_from_html(content: &str) -> String {
    let document = Html::parse_document(content);

    let body_selector = Selector::parse("body").ok();
    let root = body_selector
        .as_ref()
        .and_then(|s| document.select(s).next())
        .map(|e| e.html())
        .unwrap_or_else(|| content.to_string());

    let text = html2text::from_read(root.as_bytes(), 80).unwrap_or_else(|_| root.clone());
    normalize_whitespace(&text)
}

/// Extract the document title, if any
pub fn html_title(content: &str) -> Option<String> {
    let document = Html::parse_document(content);
    let selector = Selector::parse("title").ok()?;
    let elem = document.select(&selector).next()?;
    let title = elem.text().collect::<String>().trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Normalize whitespace in text: runs of spaces become one space, blank
/// lines become exactly one paragraph break
pub fn normalize_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_was_whitespace = true;
    let mut newline_count = 0;

    for c in text.chars() {
        if c.is_whitespace() {
            if c == '\n' {
                newline_count += 1;
            }
            last_was_whitespace = true;
        } else {
            if last_was_whitespace && !result.is_empty() {
                if newline_count >= 2 {
                    result.push_str("\n\n");
                } else if newline_count == 1 {
                    result.push('\n');
                } else {
                    result.push(' ');
                }
            }
            newline_count = 0;
            result.push(c);
            last_was_whitespace = false;
        }
    }

    result.trim().to_string()
}
