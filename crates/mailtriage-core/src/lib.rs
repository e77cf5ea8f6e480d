use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod classify;
pub mod keywords;
pub mod mask;
pub mod normalize;
pub mod taxonomy;

pub use classify::{build_prompt, parse_generation_response};
pub use keywords::extract_keywords;
pub use mask::{mask, mask_with_report, MaskReport};
pub use normalize::normalize;
pub use taxonomy::{Category, Taxonomy};

/// Message for a communication with neither usable body text nor attachments.
pub const NO_CONTENT_MESSAGE: &str = "No valid email content or attachments provided";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),
    #[error("extraction failed for {source_label}: {detail}")]
    Extraction { source_label: String, detail: String },
    #[error("Google Gemini API Error: {0}")]
    Service(String),
    #[error("Google Gemini API Error: service unavailable after {attempts} attempts: {last}")]
    ServiceUnavailable { attempts: u32, last: String },
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Missing or empty content supplied by the caller.
    Client,
    /// Anything that went wrong while processing valid input.
    Processing,
}

impl Error {
    pub fn status_class(&self) -> StatusClass {
        match self {
            Error::InvalidInput(_) => StatusClass::Client,
            _ => StatusClass::Processing,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.status_class() {
            StatusClass::Client => 400,
            StatusClass::Processing => 500,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
            status: self.status_code(),
        }
    }
}

/// Serialized form of a failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

/// One uploaded file, fully materialized in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Client-supplied name. Only used for extension dispatch and labelling.
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    /// Lowercased extension including the leading dot, or "" when there is none.
    pub fn extension(&self) -> String {
        let name = self
            .filename
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.filename);
        match name.rfind('.') {
            Some(i) if i + 1 < name.len() => name[i..].to_ascii_lowercase(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawInput {
    pub body_html: String,
    /// Upload order is significant: it fixes the concatenation order.
    pub attachments: Vec<Attachment>,
}

impl RawInput {
    pub fn is_empty(&self) -> bool {
        self.body_html.trim().is_empty() && self.attachments.is_empty()
    }
}

/// What extraction produced for a single source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Extracted {
        engine: &'static str,
        text: String,
        warnings: Vec<&'static str>,
    },
    Unsupported {
        extension: String,
    },
    Failed {
        code: &'static str,
        detail: String,
    },
}

impl SourceOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            SourceOutcome::Extracted { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Per-source diagnostics attached to a successful report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceReport {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    pub text_chars: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordResult {
    /// Field name -> up to three verbatim matches. Absent fields had no match.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(rename = "Request Type")]
    pub request_type: String,
    #[serde(rename = "Sub Type")]
    pub sub_types: Vec<String>,
}

/// Sub type payload of a remote classification.
///
/// A matched category reports its full sub-type list; the fallback reports the bare
/// string "None".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RequestSubType {
    List(Vec<String>),
    Label(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    #[serde(rename = "Request Type")]
    pub request_type: String,
    /// Fixed value: 0.9 for a category hit, 0 for the fallback. Not a probability.
    #[serde(rename = "Confidence")]
    pub confidence: f64,
    #[serde(rename = "Request Sub Type")]
    pub request_sub_type: RequestSubType,
}

pub type ClassificationResult = Vec<Classification>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageReport {
    pub classification: ClassificationResult,
    #[serde(rename = "keywordsFromEmail")]
    pub keywords_from_email: KeywordResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceReport>,
}

/// Secondary classifier over already-masked text.
#[async_trait::async_trait]
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn classify(&self, masked: &str, taxonomy: &Taxonomy) -> Result<ClassificationResult>;
}

/// Image -> text. Errors are stable codes suitable for warnings.
pub trait OcrEngine: Send + Sync {
    fn image_to_text(&self, bytes: &[u8], suffix: &str) -> std::result::Result<String, &'static str>;
}
