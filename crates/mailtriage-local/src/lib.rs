//! Local backends for mailtriage: document extraction (html2text, pdf-extract, tesseract
//! shellouts), the Gemini classifier over reqwest, and the request pipeline.

pub mod config;
pub mod extract;
pub mod gemini;
pub mod ocr;
pub mod pipeline;
pub mod shellout;

pub use config::{FailurePolicy, GeminiConfig, SourcePolicy, UnsupportedPolicy};
pub use gemini::GeminiClassifier;
pub use ocr::TesseractOcr;
pub use pipeline::{Extraction, Pipeline};
