//! Bounded shellouts to well-known local CLIs (`tesseract`, `pdftotext`).
//!
//! Input bytes are written to a generated temp file; client-supplied names never reach
//! the filesystem.

use crate::config::{env, env_u64, env_usize};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_ms, 50, 300_000))
}

pub fn max_chars_from_env(key: &str, default_chars: usize) -> usize {
    env_usize(key, default_chars, 200, 2_000_000)
}

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

/// `off` disables a shellout; anything else (including unset) means `auto`.
pub fn mode_enabled(key: &str) -> bool {
    !matches!(env(key).as_deref().map(str::to_ascii_lowercase).as_deref(), Some("off"))
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            "shellout_tool_not_found"
        } else {
            "shellout_spawn_failed"
        }
    })?;

    // Drain stdout on a helper thread so a chatty tool cannot block on a full pipe. Bytes
    // past the cap are read and discarded; closing early would fail the tool with EPIPE.
    let stdout = child.stdout.take();
    let reader = std::thread::spawn(move || {
        use std::io::Read;
        let mut out = Vec::new();
        if let Some(mut s) = stdout {
            let _ = (&mut s).take(max_stdout_bytes as u64).read_to_end(&mut out);
            let _ = std::io::copy(&mut s, &mut std::io::sink());
        }
        out
    });

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|_| "shellout_wait_failed")? {
            if !status.success() {
                return Err("shellout_nonzero_exit");
            }
            break;
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    }

    reader.join().map_err(|_| "shellout_read_failed")
}

pub fn write_temp_file(bytes: &[u8], suffix: &str) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("mailtriage-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "shellout_tempfile_write_failed")?;
    Ok(tmp)
}

/// Decode tool output and cap it at `max_chars`. A tool that ran fine but printed
/// nothing (a blank scan, an image-only PDF) yields empty text, not an error.
fn clip(out: &[u8], max_chars: usize) -> String {
    String::from_utf8_lossy(out).chars().take(max_chars).collect()
}

/// `tesseract <file> stdout`.
pub fn tesseract_ocr(bytes: &[u8], suffix: &str) -> Result<String, &'static str> {
    if !mode_enabled("MAILTRIAGE_OCR") {
        return Err("ocr_disabled");
    }
    if !has("tesseract") {
        return Err("tesseract_not_found");
    }
    let timeout = timeout_from_env_ms("MAILTRIAGE_OCR_TIMEOUT_MS", 30_000);
    let max_chars = max_chars_from_env("MAILTRIAGE_OCR_MAX_CHARS", 50_000);
    let max_stdout_bytes = max_chars.saturating_mul(4).clamp(1_000, 4_000_000);
    let tmp = write_temp_file(bytes, suffix)?;

    let mut cmd = Command::new("tesseract");
    cmd.arg(tmp.path()).arg("stdout");
    let out = run_stdout_bounded(cmd, timeout, max_stdout_bytes)?;
    Ok(clip(&out, max_chars))
}

/// `pdftotext -layout -enc UTF-8 <file> -`, used when the pure-Rust parser fails.
pub fn pdftotext(bytes: &[u8]) -> Result<String, &'static str> {
    if !mode_enabled("MAILTRIAGE_PDF_SHELLOUT") {
        return Err("pdf_shellout_disabled");
    }
    if !has("pdftotext") {
        return Err("pdf_shellout_tool_not_found");
    }
    let timeout = timeout_from_env_ms("MAILTRIAGE_PDF_SHELLOUT_TIMEOUT_MS", 20_000);
    let max_chars = max_chars_from_env("MAILTRIAGE_PDF_MAX_CHARS", 500_000);
    let max_stdout_bytes = max_chars.saturating_mul(4).clamp(1_000, 8_000_000);
    let tmp = write_temp_file(bytes, ".pdf")?;

    let mut cmd = Command::new("pdftotext");
    cmd.args(["-layout", "-enc", "UTF-8"]).arg(tmp.path()).arg("-");
    let out = run_stdout_bounded(cmd, timeout, max_stdout_bytes)?;
    Ok(clip(&out, max_chars))
}
