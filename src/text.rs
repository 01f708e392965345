//! Small text helpers shared by retrieval and synthesis

/// Words that introduce a chapter or paragraph label rather than name it
const LABEL_PREFIXES: &[&str] = &[
    "chapter", "ch", "paragraph", "para", "section", "глава", "гл", "параграф", "раздел",
];

/// First `max_chars` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Like [`truncate_chars`] but marks truncation with `...`
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

/// Identifier of a chapter or paragraph label, for comparisons
///
/// `"Глава 5. Древний Рим"`, `"chapter 5"` and `"5"` all reduce to `"5"`;
/// `"§ 12"` and `"§12"` reduce to `"12"`. Returns an empty string for labels
/// with no identifier.
pub fn label_id(label: &str) -> String {
    let lowered = label.to_lowercase().replace('§', " ");
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .find(|t| !LABEL_PREFIXES.contains(t))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("Цезарь", 3), "Цез");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_with_ellipsis("Цезарь", 3), "Цез...");
        assert_eq!(truncate_with_ellipsis("Рим", 3), "Рим");
    }

    #[test]
    fn test_label_id() {
        assert_eq!(label_id("Глава 5. Древний Рим"), "5");
        assert_eq!(label_id("Chapter IV: The Empire"), "iv");
        assert_eq!(label_id("§ 12"), "12");
        assert_eq!(label_id("§12"), "12");
        assert_eq!(label_id("гл. 3"), "3");
        assert_eq!(label_id(""), "");
        assert_eq!(label_id("§"), "");
    }
}
