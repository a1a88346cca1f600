//! Ingredient-name normalization for indexing and matching
//!
//! Turns display strings such as `"돼지고기 200g"` or `"간장 2큰술"` into bare
//! names (`"돼지고기"`, `"간장"`).

use once_cell::sync::Lazy;
use regex::Regex;

// Applied in order; each removal sees the previous one's output.
static QUANTITY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d+\.?\d*[a-zA-Z가-힣]*",
        r"\d+/\d+",
        r"(약간|T|t|컵|큰술|은술|숟가락|스푼|g|kg|ml|L)",
        r"\d+",
        r"[/~]+",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

static NAME_PREFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^(/~]+").ok());

/// Remove quantities and units. `None` if nothing is left.
pub fn strip_quantities(raw: &str) -> Option<String> {
    let stripped = QUANTITY_PATTERNS
        .iter()
        .fold(raw.to_string(), |acc, re| re.replace_all(&acc, "").into_owned());
    let trimmed = stripped.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// The part of an entry before any `(`, `/` or `~`, trimmed
pub fn extract_ingredient_name(raw: &str) -> String {
    NAME_PREFIX
        .as_ref()
        .and_then(|re| re.find(raw))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Normalize a list of display strings, dropping entries that end up empty
pub fn normalize_ingredients<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .filter_map(|entry| strip_quantities(&extract_ingredient_name(entry.as_ref())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quantities() {
        assert_eq!(strip_quantities("돼지고기 200g").as_deref(), Some("돼지고기"));
        assert_eq!(strip_quantities("양파 1개").as_deref(), Some("양파"));
        assert_eq!(strip_quantities("간장 2큰술").as_deref(), Some("간장"));
        assert_eq!(strip_quantities("소금 약간").as_deref(), Some("소금"));
        assert_eq!(strip_quantities("1/2").as_deref(), None);
        assert_eq!(strip_quantities("  ").as_deref(), None);
    }

    #[test]
    fn test_unit_letters_are_removed_anywhere() {
        // Unit removal is not word-bounded: ASCII unit letters go too
        assert_eq!(strip_quantities("Tofu").as_deref(), Some("ofu"));
    }

    #[test]
    fn test_extract_ingredient_name() {
        assert_eq!(extract_ingredient_name("대파(흰 부분) 1대"), "대파");
        assert_eq!(extract_ingredient_name("설탕/올리고당 1큰술"), "설탕");
        assert_eq!(extract_ingredient_name("물 2~3컵"), "물 2");
        assert_eq!(extract_ingredient_name("(선택) 깨"), "");
    }

    #[test]
    fn test_normalize_ingredients() {
        let raw = ["돼지고기 200g", "양파 1/2개", "(선택) 깨", "대파(흰 부분) 1대"];
        assert_eq!(normalize_ingredients(&raw), vec!["돼지고기", "양파", "대파"]);
    }
}
