//! Free-text cleanup for the full-text index.
//!
//! Characters that carry meaning in the index query syntax or in SQL are
//! stripped, never rejected: any input compiles.

/// Remove `;`, `--`, quotes and `#`, collapsing the gaps to single spaces.
pub fn sanitize(text: &str) -> String {
    let stripped = text
        .replace("--", " ")
        .replace([';', '\'', '"', '#'], " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace tokens of sanitized text that contain something searchable.
pub fn tokenize(text: &str) -> Vec<String> {
    sanitize(text)
        .split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_syntax() {
        assert_eq!(sanitize("beach; DROP TABLE images --"), "beach DROP TABLE images");
        assert_eq!(sanitize("o'brien \"party\" #2021"), "o brien party 2021");
        assert_eq!(sanitize("a-b"), "a-b");
    }

    #[test]
    fn test_all_special_input_degrades_to_nothing() {
        assert_eq!(sanitize(";;--'\"##"), "");
        assert!(tokenize(";;--'\"##").is_empty());
        assert!(tokenize("  ( ) * ").is_empty());
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Sunset  BEACH\tdog"), vec!["sunset", "beach", "dog"]);
    }
}
