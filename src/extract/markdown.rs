//! Markdown text extraction

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// Render Markdown to plain text, keeping headings, list items, and code
/// blocks as readable lines
pub fn extract_text_from_markdown(content: &str) -> String {
    let parser = Parser::new(content);
    let mut parts: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => parts.push("\n".to_string()),
            Event::End(TagEnd::Heading(_)) => parts.push("\n".to_string()),
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
                parts.push("\n".to_string());
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                parts.push("\n".to_string());
            }
            Event::Text(text) => parts.push(text.to_string()),
            Event::Code(code) => parts.push(code.to_string()),
            Event::SoftBreak | Event::HardBreak => parts.push(if in_code_block {
                "".to_string()
            } else {
                " ".to_string()
            }),
            Event::End(TagEnd::Paragraph) => parts.push("\n\n".to_string()),
            Event::Start(Tag::Item) => parts.push("- ".to_string()),
            Event::End(TagEnd::Item) => parts.push("\n".to_string()),
            Event::End(TagEnd::List(_)) => parts.push("\n".to_string()),
            _ => {}
        }
    }

    parts.join("").trim().to_string()
}

/// The first level-1 heading, commonly the document title
pub fn markdown_title(content: &str) -> Option<String> {
    let parser = Parser::new(content);
    let mut in_h1 = false;
    let mut title = String::new();

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. })
                if level == pulldown_cmark::HeadingLevel::H1 =>
            {
                in_h1 = true;
            }
            Event::End(TagEnd::Heading(_)) if in_h1 => {
                let trimmed = title.trim().to_string();
                return if trimmed.is_empty() { None } else { Some(trimmed) };
            }
            Event::Text(text) | Event::Code(text) if in_h1 => title.push_str(&text),
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_basic() {
        let md = "# Title\n\nSome **bold** paragraph.\n\n- item one\n- item two\n";
        let text = extract_text_from_markdown(md);
        assert!(text.contains("Title"));
        assert!(text.contains("bold paragraph"));
        assert!(text.contains("- item one"));
        assert!(!text.contains("**"));
    }

    #[test]
    fn test_code_block_kept() {
        let md = "```rust\nfn main() {}\n```";
        let text = extract_text_from_markdown(md);
        assert!(text.contains("fn main"));
    }

    #[test]
    fn test_markdown_title() {
        assert_eq!(
            markdown_title("# Leave Policy\n\nbody"),
            Some("Leave Policy".to_string())
        );
        assert_eq!(markdown_title("no heading here"), None);
    }
}
