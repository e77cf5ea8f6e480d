//! Orchestration: extract -> normalize -> mask -> (keywords, remote classification).
//!
//! Sources are processed strictly in order (body first, then attachments in upload
//! order). A request either yields a full [`TriageReport`] or a single [`Error`].

use crate::config::{FailurePolicy, SourcePolicy, UnsupportedPolicy};
use crate::extract::{extract_from_body, extract_from_file, UNSUPPORTED_FILE_FORMAT};
use crate::gemini::GeminiClassifier;
use crate::ocr::TesseractOcr;
use mailtriage_core::{
    extract_keywords, mask_with_report, normalize, Classifier, Error, OcrEngine, RawInput,
    Result, SourceOutcome, SourceReport, Taxonomy, TriageReport, NO_CONTENT_MESSAGE,
};
use std::sync::Arc;
use std::time::Duration;

/// Text that survived the source policy, plus what happened to every source.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub texts: Vec<String>,
    pub sources: Vec<SourceReport>,
}

impl Extraction {
    /// Non-empty extracts joined by a blank line.
    pub fn joined(&self) -> String {
        self.texts.join("\n\n")
    }
}

/// Under the inline policy, broken inline images get a diagnostic line each, after the
/// text that did extract.
fn with_diagnostics(text: String, prefix: &str, warnings: &[&'static str]) -> String {
    let mut lines: Vec<String> = Vec::new();
    if !text.trim().is_empty() {
        lines.push(text);
    }
    lines.extend(
        warnings
            .iter()
            .filter(|w| w.starts_with("inline_image_"))
            .map(|w| format!("{prefix}: {w}")),
    );
    lines.join("\n")
}

pub struct Pipeline {
    taxonomy: Arc<Taxonomy>,
    ocr: Box<dyn OcrEngine>,
    classifier: Box<dyn Classifier>,
    policy: SourcePolicy,
}

impl Pipeline {
    pub fn new(classifier: Box<dyn Classifier>) -> Self {
        Self {
            taxonomy: Arc::new(Taxonomy::standard().clone()),
            ocr: Box::new(TesseractOcr),
            classifier,
            policy: SourcePolicy::default(),
        }
    }

    /// Gemini classifier, tesseract OCR and source policy, all from the environment.
    pub fn from_env() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mailtriage/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        let classifier = GeminiClassifier::from_env(client)?;
        Ok(Self::new(Box::new(classifier)).with_policy(SourcePolicy::from_env()?))
    }

    pub fn with_ocr(mut self, ocr: Box<dyn OcrEngine>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: Arc<Taxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn policy(&self) -> SourcePolicy {
        self.policy
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn apply_policy(
        &self,
        label: String,
        diagnostic_prefix: &str,
        outcome: SourceOutcome,
        out: &mut Extraction,
    ) -> Result<()> {
        let mut report = SourceReport {
            label,
            engine: None,
            text_chars: 0,
            warnings: Vec::new(),
            failure: None,
        };
        let text = match outcome {
            SourceOutcome::Extracted {
                engine,
                text,
                warnings,
            } => {
                report.engine = Some(engine.to_string());
                report.warnings = warnings.iter().map(|w| w.to_string()).collect();
                Some(match self.policy.on_failure {
                    FailurePolicy::Inline => with_diagnostics(text, diagnostic_prefix, &warnings),
                    _ => text,
                })
            }
            SourceOutcome::Unsupported { extension } => {
                report.failure = Some(format!("unsupported_format:{extension}"));
                match self.policy.on_unsupported {
                    UnsupportedPolicy::Placeholder => Some(UNSUPPORTED_FILE_FORMAT.to_string()),
                    UnsupportedPolicy::Skip => None,
                    UnsupportedPolicy::Abort => {
                        return Err(Error::Extraction {
                            source_label: report.label,
                            detail: format!("unsupported file format {extension:?}"),
                        })
                    }
                }
            }
            SourceOutcome::Failed { code, detail } => {
                tracing::warn!(source = %report.label, code, "source extraction failed");
                report.failure = Some(code.to_string());
                match self.policy.on_failure {
                    FailurePolicy::Skip => None,
                    FailurePolicy::Inline => Some(format!("{diagnostic_prefix}: {detail}")),
                    FailurePolicy::Abort => {
                        return Err(Error::Extraction {
                            source_label: report.label,
                            detail: format!("{code}: {detail}"),
                        })
                    }
                }
            }
        };

        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            report.text_chars = text.chars().count();
            out.texts.push(text);
        }
        tracing::debug!(
            source = %report.label,
            engine = report.engine.as_deref().unwrap_or("-"),
            chars = report.text_chars,
            "source processed"
        );
        out.sources.push(report);
        Ok(())
    }

    /// Extract every source in order and apply the source policy.
    pub fn extract(&self, raw: &RawInput) -> Result<Extraction> {
        let mut out = Extraction::default();
        let body = extract_from_body(&raw.body_html, self.ocr.as_ref());
        self.apply_policy(
            "body".to_string(),
            "Error processing email body",
            body,
            &mut out,
        )?;
        for (i, attachment) in raw.attachments.iter().enumerate() {
            let outcome = extract_from_file(attachment, self.ocr.as_ref());
            self.apply_policy(
                format!("attachment[{i}]:{}", attachment.filename),
                "Error processing file",
                outcome,
                &mut out,
            )?;
        }
        Ok(out)
    }

    pub async fn run(&self, raw: &RawInput) -> Result<TriageReport> {
        if raw.is_empty() {
            return Err(Error::InvalidInput(NO_CONTENT_MESSAGE.to_string()));
        }

        let extraction = self.extract(raw)?;
        if extraction.texts.is_empty() {
            return Err(Error::InvalidInput(NO_CONTENT_MESSAGE.to_string()));
        }

        let normalized = normalize(&extraction.joined());
        let (masked, mask_report) = mask_with_report(&normalized);
        tracing::info!(
            sources = extraction.sources.len(),
            chars = masked.chars().count(),
            masked = mask_report.total(),
            "communication prepared"
        );
        for (rule, n) in &mask_report.hits {
            tracing::debug!(rule, n, "pii masked");
        }

        let keywords = extract_keywords(&masked, &self.taxonomy);
        let classification = self.classifier.classify(&masked, &self.taxonomy).await?;
        tracing::info!(
            classifier = self.classifier.name(),
            local = %keywords.request_type,
            remote = classification
                .first()
                .map(|c| c.request_type.as_str())
                .unwrap_or("-"),
            "communication classified"
        );

        Ok(TriageReport {
            classification,
            keywords_from_email: keywords,
            sources: extraction.sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailtriage_core::classify::edge_case;
    use mailtriage_core::{Attachment, ClassificationResult};
    use std::sync::Mutex;

    /// Records the masked text it was given and answers with the fallback.
    #[derive(Default)]
    struct RecordingClassifier {
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait::async_trait]
    impl Classifier for RecordingClassifier {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn classify(&self, masked: &str, _: &Taxonomy) -> Result<ClassificationResult> {
            self.seen.lock().unwrap().push(masked.to_string());
            Ok(edge_case())
        }
    }

    struct FailingClassifier;

    #[async_trait::async_trait]
    impl Classifier for FailingClassifier {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn classify(&self, _: &str, _: &Taxonomy) -> Result<ClassificationResult> {
            Err(Error::Service("generateContent HTTP 403 Forbidden".to_string()))
        }
    }

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn image_to_text(&self, _: &[u8], _: &str) -> std::result::Result<String, &'static str> {
            Err("ocr_disabled")
        }
    }

    fn pipeline_with(seen: Arc<Mutex<Vec<String>>>) -> Pipeline {
        Pipeline::new(Box::new(RecordingClassifier { seen })).with_ocr(Box::new(NoOcr))
    }

    fn raw(body: &str, attachments: Vec<Attachment>) -> RawInput {
        RawInput {
            body_html: body.to_string(),
            attachments,
        }
    }

    #[tokio::test]
    async fn empty_input_is_a_client_error() {
        let p = pipeline_with(Arc::default());
        let err = p.run(&raw("", vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), NO_CONTENT_MESSAGE);
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn markup_only_body_is_a_client_error() {
        let p = pipeline_with(Arc::default());
        let err = p.run(&raw("<div>  </div>", vec![])).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn classifier_only_ever_sees_masked_normalized_text_in_source_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline_with(seen.clone());
        let input = raw(
            "<p>Commitment   Charge</p><p>SSN 123-45-6789</p>",
            vec![
                Attachment::new("a.txt", b"Please INCREASE by $1,234.56".to_vec()),
                Attachment::new("b.eml", b"acct 1234-5678-9012-3456".to_vec()),
            ],
        );
        let report = p.run(&input).await.unwrap();
        let masked = seen.lock().unwrap()[0].clone();

        assert!(!masked.contains("123-45-6789"));
        assert!(!masked.contains("1,234.56"));
        assert!(!masked.contains("1234-5678"));
        let body_at = masked.find("commitment charge").unwrap();
        let a_at = masked.find("please increase by [AMOUNT]").unwrap();
        let b_at = masked.find("[ACCOUNT-NUMBER]").unwrap();
        assert!(body_at < a_at && a_at < b_at);

        assert_eq!(report.keywords_from_email.request_type, "Commitment Charge");
        assert_eq!(report.keywords_from_email.sub_types, vec!["Increase"]);
        assert_eq!(report.classification, edge_case());
        assert_eq!(report.sources.len(), 3);
    }

    #[tokio::test]
    async fn unsupported_attachment_uses_placeholder_by_default() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline_with(seen.clone());
        let report = p
            .run(&raw("", vec![Attachment::new("sheet.xlsx", b"PK".to_vec())]))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap()[0], "unsupported file format");
        assert_eq!(
            report.sources[1].failure.as_deref(),
            Some("unsupported_format:.xlsx")
        );
    }

    #[tokio::test]
    async fn unsupported_attachment_can_abort_or_be_skipped() {
        let input = raw("<p>Fee Payment</p>", vec![Attachment::new("x.doc", b"d".to_vec())]);

        let abort = pipeline_with(Arc::default()).with_policy(SourcePolicy {
            on_unsupported: UnsupportedPolicy::Abort,
            ..SourcePolicy::default()
        });
        let err = abort.run(&input).await.unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }));
        assert_eq!(err.status_code(), 500);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let skip = pipeline_with(seen.clone()).with_policy(SourcePolicy {
            on_unsupported: UnsupportedPolicy::Skip,
            ..SourcePolicy::default()
        });
        skip.run(&input).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0], "fee payment");
    }

    #[tokio::test]
    async fn failed_sources_follow_the_failure_policy() {
        let input = raw(
            "<p>AU Transfer</p>",
            vec![Attachment::new("scan.png", b"not an image".to_vec())],
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let report = pipeline_with(seen.clone()).run(&input).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0], "au transfer");
        assert_eq!(report.sources[1].failure.as_deref(), Some("image_decode_failed"));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let inline = pipeline_with(seen.clone()).with_policy(SourcePolicy {
            on_failure: FailurePolicy::Inline,
            ..SourcePolicy::default()
        });
        inline.run(&input).await.unwrap();
        assert_eq!(
            seen.lock().unwrap()[0],
            "au transfer error processing file: attachment is not a recognizable image"
        );

        let abort = pipeline_with(Arc::default()).with_policy(SourcePolicy {
            on_failure: FailurePolicy::Abort,
            ..SourcePolicy::default()
        });
        assert!(matches!(
            abort.run(&input).await,
            Err(Error::Extraction { .. })
        ));
    }

    #[tokio::test]
    async fn broken_inline_images_are_noted_only_under_the_inline_policy() {
        let html = "<p>Adjustment</p><img src=\"data:image/png;base64,@@@\">";

        let seen = Arc::new(Mutex::new(Vec::new()));
        let report = pipeline_with(seen.clone()).run(&raw(html, vec![])).await.unwrap();
        assert_eq!(seen.lock().unwrap()[0], "adjustment");
        assert_eq!(report.sources[0].warnings, vec!["inline_image_decode_failed"]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let inline = pipeline_with(seen.clone()).with_policy(SourcePolicy {
            on_failure: FailurePolicy::Inline,
            ..SourcePolicy::default()
        });
        inline.run(&raw(html, vec![])).await.unwrap();
        assert_eq!(
            seen.lock().unwrap()[0],
            "adjustment error processing email body: inline_image_decode_failed"
        );
    }

    /// OCR that runs but finds no text, like tesseract on a blank scan.
    struct BlankOcr;

    impl OcrEngine for BlankOcr {
        fn image_to_text(&self, _: &[u8], _: &str) -> std::result::Result<String, &'static str> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn blank_scan_does_not_trip_the_abort_policy() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let p = Pipeline::new(Box::new(RecordingClassifier { seen: seen.clone() }))
            .with_ocr(Box::new(BlankOcr))
            .with_policy(SourcePolicy {
                on_failure: FailurePolicy::Abort,
                on_unsupported: UnsupportedPolicy::Abort,
            });
        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
        let report = p
            .run(&raw("<p>Fee Payment</p>", vec![Attachment::new("scan.png", png)]))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap()[0], "fee payment");
        assert_eq!(report.sources[1].engine.as_deref(), Some("image_ocr"));
        assert_eq!(report.sources[1].text_chars, 0);
        assert_eq!(report.sources[1].failure, None);
    }

    #[tokio::test]
    async fn custom_taxonomy_drives_local_matching() {
        let taxonomy = Taxonomy::new(vec![
            ("Payoff Quote".to_string(), vec!["Full".to_string(), "Partial".to_string()]),
            ("Fee Payment".to_string(), vec![]),
        ])
        .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline_with(seen).with_taxonomy(Arc::new(taxonomy));
        assert_eq!(p.taxonomy().category_names(), vec!["Payoff Quote", "Fee Payment"]);

        let report = p
            .run(&raw("<p>Need a partial payoff quote; also a fee payment</p>", vec![]))
            .await
            .unwrap();
        assert_eq!(report.keywords_from_email.request_type, "Payoff Quote");
        assert_eq!(report.keywords_from_email.sub_types, vec!["Partial"]);
    }

    #[tokio::test]
    async fn only_failed_sources_left_is_a_client_error_when_skipped() {
        let p = pipeline_with(Arc::default());
        let err = p
            .run(&raw("", vec![Attachment::new("bad.txt", vec![0xff])]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn classifier_errors_surface_instead_of_degrading() {
        let p = Pipeline::new(Box::new(FailingClassifier)).with_ocr(Box::new(NoOcr));
        let err = p.run(&raw("<p>Adjustment</p>", vec![])).await.unwrap_err();
        assert!(matches!(err, Error::Service(_)));
        assert!(err.to_string().starts_with("Google Gemini API Error:"));
    }
}
