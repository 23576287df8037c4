use std::sync::LazyLock;

use regex::Regex;

static LABELED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap());

static GENERIC_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());

static INFO_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+.-]+$").unwrap());

/// How a structured payload is recovered from model text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtractionStrategy {
    /// Labeled ```json block, then any fenced block, then fence stripping
    #[default]
    Layered,
    /// Only strip fence markers at the start and end of the response
    StripFences,
}

/// Recover the text believed to hold a JSON payload.
///
/// Does not check that the result parses; callers treat a parse failure as a
/// malformed payload.
pub fn extract_payload(content: &str, strategy: ExtractionStrategy) -> String {
    match strategy {
        ExtractionStrategy::Layered => labeled_block(content)
            .or_else(|| generic_block(content))
            .unwrap_or_else(|| strip_fences(content)),
        ExtractionStrategy::StripFences => strip_fences(content),
    }
}

fn labeled_block(content: &str) -> Option<String> {
    LABELED_BLOCK
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|body| !body.is_empty())
        .map(str::to_string)
}

fn generic_block(content: &str) -> Option<String> {
    let inner = GENERIC_BLOCK.captures(content)?.get(1)?.as_str();

    // Drop a language tag on the opening fence line, e.g. ```javascript
    let body = match inner.split_once('\n') {
        Some((first, rest)) if INFO_STRING.is_match(first.trim()) => rest,
        _ => inner,
    };

    let body = body.trim();
    if body.is_empty() { None } else { Some(body.to_string()) }
}

fn strip_fences(content: &str) -> String {
    let mut text = content.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    let text = text.trim();
    text.strip_suffix("```").unwrap_or(text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labeled_block_wins() {
        let content = "Here you go:\n```text\nnot this\n```\n```json\n  [{\"a\": 1}]  \n```\nDone.";
        assert_eq!(
            extract_payload(content, ExtractionStrategy::Layered),
            "[{\"a\": 1}]"
        );
    }

    #[test]
    fn test_empty_labeled_block_falls_through() {
        assert_eq!(labeled_block("```json\n```"), None);
        assert_eq!(labeled_block("```json   ```"), None);
        assert_eq!(
            extract_payload("```json\n```\n[1]", ExtractionStrategy::Layered),
            "```\n[1]"
        );
    }

    #[test]
    fn test_generic_block() {
        let content = "Result:\n```\n[1, 2, 3]\n```";
        assert_eq!(extract_payload(content, ExtractionStrategy::Layered), "[1, 2, 3]");
    }

    #[test]
    fn test_generic_block_with_other_language_tag() {
        let content = "```javascript\n[1]\n```";
        assert_eq!(extract_payload(content, ExtractionStrategy::Layered), "[1]");
    }

    #[test]
    fn test_inline_generic_block_keeps_payload() {
        let content = "```[1,2]```";
        assert_eq!(extract_payload(content, ExtractionStrategy::Layered), "[1,2]");
    }

    #[test]
    fn test_no_fences_returns_trimmed_input() {
        let content = "  [{\"start\": 0.0}]\n";
        assert_eq!(
            extract_payload(content, ExtractionStrategy::Layered),
            "[{\"start\": 0.0}]"
        );
    }

    #[test]
    fn test_unterminated_fence_is_stripped() {
        let content = "```json\n[1, 2]";
        assert_eq!(extract_payload(content, ExtractionStrategy::Layered), "[1, 2]");
    }

    #[test]
    fn test_strip_fences_strategy_ignores_inner_blocks() {
        let content = "```json\n[1]\n```";
        assert_eq!(extract_payload(content, ExtractionStrategy::StripFences), "[1]");

        let chatty = "Sure!\n```json\n[1]\n```";
        assert_eq!(
            extract_payload(chatty, ExtractionStrategy::StripFences),
            "Sure!\n```json\n[1]"
        );
    }
}
