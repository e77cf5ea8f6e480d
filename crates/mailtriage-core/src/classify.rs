//! Prompt construction and response parsing for the remote classifier.
//!
//! Transport lives in `mailtriage-local`; everything here is pure so it can be tested
//! without a network.

use crate::taxonomy::Taxonomy;
use crate::{Classification, ClassificationResult, RequestSubType};

pub const EDGE_CASE: &str = "Edge Case";
pub const MATCH_CONFIDENCE: f64 = 0.9;
pub const FALLBACK_CONFIDENCE: f64 = 0.0;

pub fn build_prompt(masked: &str, taxonomy: &Taxonomy) -> String {
    let categories = taxonomy
        .category_names()
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an AI trained to classify emails into the following categories:\n\
         [{categories}].\n\
         Given the following email content, classify it under one of the categories above.\n\
         If confidence is low, classify it as '{EDGE_CASE}'.\n\
         Email Content:\n\
         {masked}\n"
    )
}

pub fn edge_case() -> ClassificationResult {
    vec![Classification {
        request_type: EDGE_CASE.to_string(),
        confidence: FALLBACK_CONFIDENCE,
        request_sub_type: RequestSubType::Label("None".to_string()),
    }]
}

/// `candidates[0].content.parts[0].text`, if the response has that shape.
pub fn first_candidate_text(v: &serde_json::Value) -> Option<&str> {
    v.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

/// Map a successful generation response onto the taxonomy.
///
/// Any missing or malformed structure resolves to the "Edge Case" fallback.
pub fn parse_generation_response(v: &serde_json::Value, taxonomy: &Taxonomy) -> ClassificationResult {
    let Some(text) = first_candidate_text(v) else {
        return edge_case();
    };
    match taxonomy.first_substring_match(text.trim()) {
        Some(cat) => vec![Classification {
            request_type: cat.name().to_string(),
            confidence: MATCH_CONFIDENCE,
            request_sub_type: RequestSubType::List(cat.sub_type_names()),
        }],
        None => edge_case(),
    }
}
