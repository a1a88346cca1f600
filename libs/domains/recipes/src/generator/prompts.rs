//! Chat prompts for recipe generation.

use serde_json::{Value, json};

use crate::models::{RecipeSummary, UserIngredient};

pub const SYSTEM_PROMPT: &str = "당신은 주어진 재료로 만들 수 있는 레시피를 추천하는 요리 전문가입니다.
다음 요구사항에 맞춰 레시피를 추천해주세요:
- 서로 다른 유형의 레시피를 1개에서 5개 추천
- 비슷한 스타일의 레시피 반복 금지
- 추가 재료 최소화
- 각 레시피는 정확한 재료명과 양을 포함
- 조리 방법은 단계별로 다음 사항을 포함:
    - 사용된 재료와 양, 단위를 명확히 언급
    - 조리 온도나 불 세기
    - 대략적인 조리 시간
    - 질감, 색 변화 등의 상태 묘사
    - 가능한 한 자세히 단계별로 설명";

/// `"{name}: {quantity}"`, one line per ingredient
pub fn format_ingredients(items: &[UserIngredient]) -> String {
    items
        .iter()
        .map(|item| format!("{}: {}", item.ingredients, item.quantities))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn human_prompt(items: &[UserIngredient], candidates: &[RecipeSummary]) -> String {
    // serde_json never escapes non-ASCII, so the documents stay readable
    let documents = serde_json::to_string(candidates).unwrap_or_else(|_| "[]".to_string());
    format!(
        "사용자가 소지한 재료:\n{}\n\n관련 문서:\n{}",
        format_ingredients(items),
        documents
    )
}

/// Strict JSON schema for [`crate::models::RecommendationResult`]
pub fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "레시피 목록": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "레시피 id": { "type": "string" },
                        "레시피 이름": { "type": "string" },
                        "재료": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "재료명": { "type": "string" },
                                    "양": { "type": "string" }
                                },
                                "required": ["재료명", "양"],
                                "additionalProperties": false
                            }
                        },
                        "조리 방법": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["레시피 id", "레시피 이름", "재료", "조리 방법"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["레시피 목록"],
        "additionalProperties": false
    })
}
