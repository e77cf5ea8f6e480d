use crate::shellout;
use mailtriage_core::OcrEngine;

/// OCR via the local `tesseract` binary, when installed and not disabled
/// (`MAILTRIAGE_OCR=off`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TesseractOcr;

impl OcrEngine for TesseractOcr {
    fn image_to_text(&self, bytes: &[u8], suffix: &str) -> Result<String, &'static str> {
        shellout::tesseract_ocr(bytes, suffix)
    }
}

/// Best-effort sniff for the image formats we hand to OCR.
pub fn bytes_look_like_image(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"\xff\xd8\xff")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}

/// Temp-file suffix for sniffed image bytes; tesseract picks its decoder from content.
pub fn suffix_for_image(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\xff\xd8\xff") {
        ".jpg"
    } else if bytes.starts_with(b"GIF8") {
        ".gif"
    } else if bytes.starts_with(b"RIFF") {
        ".webp"
    } else {
        ".png"
    }
}
