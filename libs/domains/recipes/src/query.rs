/// Ordered ingredient names parsed from a raw comma-separated query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientQuery(Vec<String>);

impl IngredientQuery {
    /// Split on commas, trim, and drop empty segments.
    ///
    /// A query with nothing left after that keeps its trimmed original as
    /// the single ingredient.
    pub fn parse(raw: &str) -> Self {
        let segments: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Self(vec![raw.trim().to_string()]);
        }
        Self(segments)
    }

    pub fn ingredients(&self) -> &[String] {
        &self.0
    }

    /// The text that gets embedded: segments joined by single spaces
    pub fn embedding_text(&self) -> String {
        self.0.join(" ")
    }

    /// Case-insensitive AND-of-ORs containment.
    ///
    /// Every query ingredient must be a substring of at least one name.
    pub fn matches<S: AsRef<str>>(&self, names: &[S]) -> bool {
        if names.is_empty() {
            return false;
        }
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_lowercase()).collect();
        self.0.iter().all(|wanted| {
            let wanted = wanted.to_lowercase();
            names.iter().any(|name| name.contains(&wanted))
        })
    }
}
