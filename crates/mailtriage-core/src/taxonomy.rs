//! Two-level request taxonomy.
//!
//! Declaration order is match priority: the first category that matches wins, so the
//! categories live in a `Vec`, never in a map.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

/// Request type reported when no category matches locally.
pub const UNKNOWN_REQUEST_TYPE: &str = "Unknown";
/// Sub-type placeholder when the selected category has no matching sub type.
pub const NO_SUB_TYPE_FOUND: &str = "No Sub Type Found";

const STANDARD: &[(&str, &[&str])] = &[
    ("Adjustment", &[]),
    ("AU Transfer", &[]),
    (
        "Closing Notice",
        &["Reallocation Fees", "Amendment Fees", "Reallocation Principal"],
    ),
    ("Commitment Charge", &["Cashless Roll", "Decrease", "Increase"]),
    ("Fee Payment", &["Ongoing Fee", "Letter of Credit Fee"]),
    (
        "Money Movement-Inbound",
        &[
            "Principal",
            "Interest",
            "Principal + Interest",
            "Principal + Fee + Interest",
        ],
    ),
    ("Money Movement-Outbound", &["Timebound", "Foreign Currency"]),
];

static STANDARD_TAXONOMY: Lazy<Taxonomy> = Lazy::new(|| {
    let entries = STANDARD
        .iter()
        .map(|(name, subs)| (name.to_string(), subs.iter().map(|s| s.to_string()).collect()))
        .collect();
    // The table above is a compile-time constant; every term escapes to a valid pattern.
    Taxonomy::new(entries).unwrap_or_else(|e| panic!("standard taxonomy is invalid: {e}"))
});

/// A term plus its whole-word, case-insensitive matcher.
#[derive(Debug, Clone)]
struct Term {
    name: String,
    word: Regex,
}

impl Term {
    fn new(name: String) -> Result<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::Config("taxonomy terms must be non-empty".to_string()));
        }
        let word = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(trimmed)))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("taxonomy term {trimmed:?}: {e}")))?;
        Ok(Self { name, word })
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    term: Term,
    sub_types: Vec<Term>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.term.name
    }

    pub fn sub_type_names(&self) -> Vec<String> {
        self.sub_types.iter().map(|t| t.name.clone()).collect()
    }

    /// Whole-word, case-insensitive presence of the category name.
    pub fn matches(&self, text: &str) -> bool {
        self.term.word.is_match(text)
    }

    /// Sub types present in `text`, in declared order.
    pub fn matching_sub_types(&self, text: &str) -> Vec<String> {
        self.sub_types
            .iter()
            .filter(|t| t.word.is_match(text))
            .map(|t| t.name.clone())
            .collect()
    }
}

/// Immutable ordered sequence of (request type, sub types).
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Result<Self> {
        let mut categories = Vec::with_capacity(entries.len());
        for (name, subs) in entries {
            if categories.iter().any(|c: &Category| c.name() == name) {
                return Err(Error::Config(format!("duplicate taxonomy category {name:?}")));
            }
            let sub_types = subs.into_iter().map(Term::new).collect::<Result<Vec<_>>>()?;
            categories.push(Category {
                term: Term::new(name)?,
                sub_types,
            });
        }
        Ok(Self { categories })
    }

    /// The process-wide default taxonomy, built once on first use.
    pub fn standard() -> &'static Taxonomy {
        &STANDARD_TAXONOMY
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name() == name)
    }

    /// Priority search: first category (declared order) whose name is a whole word in `text`.
    pub fn first_match(&self, text: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.matches(text))
    }

    /// First category whose name occurs anywhere in `text`, ignoring case.
    ///
    /// Used on free-form generated text, where word boundaries are not reliable.
    pub fn first_substring_match(&self, text: &str) -> Option<&Category> {
        let lc = text.to_lowercase();
        self.categories
            .iter()
            .find(|c| lc.contains(&c.name().to_lowercase()))
    }
}
