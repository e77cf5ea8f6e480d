//! Per-source text extraction.
//!
//! Every entry point returns a [`SourceOutcome`] value; nothing here raises. Whether a
//! failed source aborts the request is decided by the pipeline's source policy.

use crate::ocr::{bytes_look_like_image, suffix_for_image};
use crate::shellout;
use base64::Engine;
use html2text::render::TrivialDecorator;
use mailtriage_core::{Attachment, OcrEngine, SourceOutcome};
use std::io::Cursor;

/// Sentinel folded into the text stream for attachments we cannot read.
pub const UNSUPPORTED_FILE_FORMAT: &str = "Unsupported file format";

/// Wide enough that html2text never re-wraps real prose.
const RENDER_WIDTH: usize = 10_000;

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Only removes a block when its close tag exists; ASCII-case-insensitive on the tag.
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            out.push_str(&html[i..start]);
            i = after_open + rel_end + close_pat.len();
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

/// Convert HTML markup to its visible text.
///
/// Links render as their anchor text only: no reference markers, no footnoted `href`s.
pub fn html_to_text(html: &str) -> Result<String, String> {
    let html = strip_tag_blocks(&strip_tag_blocks(html, "script"), "style");
    html2text::config::with_decorator(TrivialDecorator::new())
        .no_table_borders()
        .string_from_read(Cursor::new(html.as_bytes()), RENDER_WIDTH)
        .map_err(|e| e.to_string())
}

/// `src` values of `<img>` elements that carry an inline `data:image/...` payload.
pub fn inline_image_sources(html: &str) -> Vec<String> {
    let doc = html_scraper::Html::parse_document(html);
    let Ok(sel) = html_scraper::Selector::parse("img[src]") else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| src.starts_with("data:image"))
        .map(str::to_string)
        .collect()
}

/// Decode the base64 payload of a `data:` URI.
pub fn decode_data_uri(src: &str) -> Result<Vec<u8>, &'static str> {
    let (_, payload) = src.split_once(',').ok_or("inline_image_decode_failed")?;
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| "inline_image_decode_failed")
}

/// Body HTML -> text, followed by OCR text of every inline image (one line each).
///
/// A broken inline image only adds a warning; the rest of the body still counts.
pub fn extract_from_body(html: &str, ocr: &dyn OcrEngine) -> SourceOutcome {
    if !has_any_text(html) {
        return SourceOutcome::Extracted {
            engine: "html2text",
            text: String::new(),
            warnings: Vec::new(),
        };
    }

    let mut text = match html_to_text(html) {
        Ok(t) => t,
        Err(detail) => {
            return SourceOutcome::Failed {
                code: "html_parse_failed",
                detail,
            }
        }
    };
    let mut warnings: Vec<&'static str> = Vec::new();

    for src in inline_image_sources(html) {
        let bytes = match decode_data_uri(&src) {
            Ok(b) => b,
            Err(code) => {
                warnings.push(code);
                continue;
            }
        };
        if !bytes_look_like_image(&bytes) {
            warnings.push("inline_image_not_an_image");
            continue;
        }
        match ocr.image_to_text(&bytes, suffix_for_image(&bytes)) {
            Ok(t) if has_any_text(&t) => {
                text.push('\n');
                text.push_str(&t);
            }
            Ok(_) => {}
            Err(code) => {
                tracing::debug!(code, "inline image OCR failed");
                warnings.push("inline_image_ocr_failed");
            }
        }
    }

    SourceOutcome::Extracted {
        engine: "html2text",
        text: text.trim().to_string(),
        warnings,
    }
}

/// Text layer of every page, in page order, one page per line group.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, String> {
    // pdf-extract can panic on malformed documents; contain it to this source.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| "pdf parser panicked".to_string())?
        .map_err(|e| e.to_string())?;
    Ok(pages.join("\n"))
}

fn extract_pdf(bytes: &[u8]) -> SourceOutcome {
    match pdf_to_text(bytes) {
        Ok(text) => SourceOutcome::Extracted {
            engine: "pdf-extract",
            text,
            warnings: Vec::new(),
        },
        Err(detail) => match shellout::pdftotext(bytes) {
            Ok(text) => SourceOutcome::Extracted {
                engine: "pdf-pdftotext",
                text,
                warnings: vec!["pdf_extract_failed", "pdf_shellout_used"],
            },
            Err(code) => {
                tracing::debug!(code, "pdf shellout fallback unavailable");
                SourceOutcome::Failed {
                    code: "pdf_extract_failed",
                    detail,
                }
            }
        },
    }
}

fn extract_image(bytes: &[u8], suffix: &str, ocr: &dyn OcrEngine) -> SourceOutcome {
    if !bytes_look_like_image(bytes) {
        return SourceOutcome::Failed {
            code: "image_decode_failed",
            detail: "attachment is not a recognizable image".to_string(),
        };
    }
    match ocr.image_to_text(bytes, suffix) {
        Ok(text) => SourceOutcome::Extracted {
            engine: "image_ocr",
            text,
            warnings: Vec::new(),
        },
        Err(code) => SourceOutcome::Failed {
            code,
            detail: format!("OCR failed ({code})"),
        },
    }
}

/// Dispatch purely on the file-name extension.
pub fn extract_from_file(attachment: &Attachment, ocr: &dyn OcrEngine) -> SourceOutcome {
    let ext = attachment.extension();
    match ext.as_str() {
        ".txt" | ".eml" => match String::from_utf8(attachment.bytes.clone()) {
            Ok(text) => SourceOutcome::Extracted {
                engine: "text",
                text,
                warnings: Vec::new(),
            },
            Err(e) => SourceOutcome::Failed {
                code: "text_decode_failed",
                detail: e.to_string(),
            },
        },
        ".pdf" => extract_pdf(&attachment.bytes),
        ".png" | ".jpg" | ".jpeg" => extract_image(&attachment.bytes, &ext, ocr),
        _ => SourceOutcome::Unsupported { extension: ext },
    }
}
