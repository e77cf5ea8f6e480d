//! PII masking.
//!
//! Rules run in a fixed order. The dashed account and SSN shapes must be replaced before
//! the generic digit-run rule, otherwise they would be swallowed as card numbers.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

pub const ACCOUNT_NUMBER: &str = "[ACCOUNT-NUMBER]";
pub const TRANSACTION_ID: &str = "[TRANSACTION-ID]";
pub const AMOUNT: &str = "[AMOUNT]";
pub const DATE: &str = "[DATE]";
pub const SSN: &str = "[SSN]";
pub const CARD_NUMBER: &str = "[CARD-NUMBER]";

pub(crate) const ACCOUNT_NUMBER_PATTERN: &str = r"\b\d{4}-\d{4}-\d{4}-\d{4}\b";
pub(crate) const TRANSACTION_ID_PATTERN: &str = r"TXN\d+";
pub(crate) const AMOUNT_PATTERN: &str = r"\$\d{1,3}(?:,\d{3})*(?:\.\d{2})?";
pub(crate) const DATE_PATTERN: &str =
    r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]* \d{1,2}, \d{4}\b";
const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const CARD_NUMBER_PATTERN: &str = r"\b\d{10,16}\b";

pub(crate) fn ci(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

struct Rule {
    name: &'static str,
    re: Regex,
    token: &'static str,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        ("account_number", ACCOUNT_NUMBER_PATTERN, ACCOUNT_NUMBER),
        ("transaction_id", TRANSACTION_ID_PATTERN, TRANSACTION_ID),
        ("amount", AMOUNT_PATTERN, AMOUNT),
        ("date", DATE_PATTERN, DATE),
        ("ssn", SSN_PATTERN, SSN),
        ("card_number", CARD_NUMBER_PATTERN, CARD_NUMBER),
    ]
    .into_iter()
    .map(|(name, pattern, token)| Rule {
        name,
        re: ci(pattern),
        token,
    })
    .collect()
});

/// How many substitutions each rule made. Never carries the masked values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaskReport {
    pub hits: Vec<(&'static str, usize)>,
}

impl MaskReport {
    pub fn total(&self) -> usize {
        self.hits.iter().map(|(_, n)| n).sum()
    }
}

pub fn mask(text: &str) -> String {
    mask_with_report(text).0
}

/// Run the ordered rules until a full pass changes nothing.
///
/// A token inserted by a later rule can open a word boundary for an earlier one
/// (`$1,2341234-5678-...` only exposes the account number once the amount is gone), so a
/// single pass is not enough. Every match contains a digit and no token does, which
/// bounds the number of passes.
pub fn mask_with_report(text: &str) -> (String, MaskReport) {
    let mut out = text.to_string();
    let mut counts = vec![0usize; RULES.len()];
    loop {
        let mut changed = false;
        for (i, rule) in RULES.iter().enumerate() {
            let n = rule.re.find_iter(&out).count();
            if n > 0 {
                out = rule.re.replace_all(&out, rule.token).into_owned();
                counts[i] += n;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    let hits = RULES
        .iter()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .map(|(rule, n)| (rule.name, n))
        .collect();
    (out, MaskReport { hits })
}
