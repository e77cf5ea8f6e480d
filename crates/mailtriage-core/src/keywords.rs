//! Deterministic keyword fields and local request-type resolution.

use crate::mask::{ci, ACCOUNT_NUMBER_PATTERN, AMOUNT_PATTERN, DATE_PATTERN, TRANSACTION_ID_PATTERN};
use crate::taxonomy::{Taxonomy, NO_SUB_TYPE_FOUND, UNKNOWN_REQUEST_TYPE};
use crate::KeywordResult;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

const MAX_MATCHES_PER_FIELD: usize = 3;

const FEE_TYPE_PATTERN: &str = r"\b(?:Late Fee|Processing Fee|Service Charge|Penalty)\b";

static FIELDS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("Amount", ci(AMOUNT_PATTERN)),
        ("Transaction ID", ci(TRANSACTION_ID_PATTERN)),
        ("Date", ci(DATE_PATTERN)),
        ("Account Number", ci(ACCOUNT_NUMBER_PATTERN)),
        ("Fee Type", ci(FEE_TYPE_PATTERN)),
    ]
});

pub fn extract_keywords(masked: &str, taxonomy: &Taxonomy) -> KeywordResult {
    let mut fields = BTreeMap::new();
    for (name, re) in FIELDS.iter() {
        let hits: Vec<String> = re
            .find_iter(masked)
            .take(MAX_MATCHES_PER_FIELD)
            .map(|m| m.as_str().to_string())
            .collect();
        if !hits.is_empty() {
            fields.insert(name.to_string(), hits);
        }
    }

    let (request_type, mut sub_types) = match taxonomy.first_match(masked) {
        Some(cat) => (cat.name().to_string(), cat.matching_sub_types(masked)),
        None => (UNKNOWN_REQUEST_TYPE.to_string(), Vec::new()),
    };
    if sub_types.is_empty() {
        sub_types.push(NO_SUB_TYPE_FOUND.to_string());
    }

    KeywordResult {
        fields,
        request_type,
        sub_types,
    }
}
