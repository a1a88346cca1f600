use serde::{Deserialize, Deserializer, Serialize};

/// One (ingredient, quantity) pair from the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIngredient {
    pub ingredients: String,
    pub quantities: String,
}

impl UserIngredient {
    pub fn new(name: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            ingredients: name.into(),
            quantities: quantity.into(),
        }
    }
}

/// Inbound job: the JSON array of ingredients a user has
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationJob {
    pub items: Vec<UserIngredient>,
}

impl RecommendationJob {
    pub fn new(items: Vec<UserIngredient>) -> Self {
        Self { items }
    }

    /// A job from bare ingredient names, quantities left empty
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| UserIngredient::new(name, String::new()))
                .collect(),
        )
    }

    /// Comma-joined ingredient names, the search query for this job
    pub fn query(&self) -> String {
        self.items
            .iter()
            .map(|item| item.ingredients.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Metadata stored with each indexed recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    pub title: String,
    /// Normalized ingredient names, used for matching only
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Display strings with quantities
    #[serde(default)]
    pub raw_ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A retrieved recipe with its similarity score
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    pub raw_ingredients: Vec<String>,
    pub steps: Vec<String>,
    pub score: f32,
    pub ingredient_names: Vec<String>,
}

/// Search output, also the candidate documents handed to generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: String,
    pub title: String,
    pub ingredients: Vec<String>,
    pub steps: Vec<String>,
}

impl From<CandidateRecord> for RecipeSummary {
    fn from(candidate: CandidateRecord) -> Self {
        Self {
            id: candidate.id,
            title: candidate.title,
            ingredients: candidate.raw_ingredients,
            steps: candidate.steps,
        }
    }
}

/// Generated recommendation, published as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResult {
    #[serde(rename = "레시피 목록")]
    pub recipes: Vec<Recipe>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "레시피 id")]
    pub recipe_id: String,
    #[serde(rename = "레시피 이름")]
    pub name: String,
    #[serde(rename = "재료")]
    pub ingredients: Vec<Ingredient>,
    #[serde(rename = "조리 방법")]
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    #[serde(rename = "재료명")]
    pub name: String,
    #[serde(rename = "양")]
    pub amount: String,
}

/// A recipe as found in an index source file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRecipe {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
