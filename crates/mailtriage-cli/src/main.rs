use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailtriage_core::{Attachment, Error, RawInput, NO_CONTENT_MESSAGE};
use mailtriage_local::{FailurePolicy, Pipeline, UnsupportedPolicy};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mailtriage")]
#[command(
    about = "Triage servicing emails: extract text, mask PII, classify request type (JSON out)",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify one communication (HTML body plus attachments) and print the report.
    Process(ProcessCmd),
    /// Mask PII in stdin and print the masked text.
    Mask(MaskCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ProcessCmd {
    /// File holding the email body HTML.
    #[arg(long)]
    body: Option<PathBuf>,
    /// Attachment file (repeatable; processed in the order given).
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
    /// What to do with a source whose extraction failed. Allowed: skip, inline, abort
    #[arg(long, env = "MAILTRIAGE_ON_SOURCE_ERROR")]
    on_source_error: Option<FailurePolicy>,
    /// What to do with an attachment of unsupported type. Allowed: placeholder, skip, abort
    #[arg(long, env = "MAILTRIAGE_ON_UNSUPPORTED")]
    on_unsupported: Option<UnsupportedPolicy>,
    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(clap::Args, Debug)]
struct MaskCmd {
    /// Lowercase and collapse whitespace before masking.
    #[arg(long, default_value_t = false)]
    normalize: bool,
    /// Print per-rule hit counts to stderr.
    #[arg(long, default_value_t = false)]
    report: bool,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in `KEY=VALUE` env file. Never overrides the process env and never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("MAILTRIAGE_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim().trim_matches('"'));
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json(v: &serde_json::Value, pretty: bool) -> Result<()> {
    let s = if pretty {
        serde_json::to_string_pretty(v)?
    } else {
        serde_json::to_string(v)?
    };
    println!("{s}");
    Ok(())
}

/// Client errors exit 2, processing errors exit 1.
fn emit_error(e: &Error, pretty: bool) -> Result<ExitCode> {
    tracing::warn!(status = e.status_code(), "request failed");
    print_json(&serde_json::to_value(e.to_body())?, pretty)?;
    Ok(ExitCode::from(if e.status_code() == 400 { 2 } else { 1 }))
}

fn read_input(args: &ProcessCmd) -> Result<RawInput> {
    let body_html = match &args.body {
        Some(p) => std::fs::read_to_string(p)
            .with_context(|| format!("read body file {}", p.display()))?,
        None => String::new(),
    };
    let mut attachments = Vec::with_capacity(args.attachments.len());
    for p in &args.attachments {
        let bytes =
            std::fs::read(p).with_context(|| format!("read attachment {}", p.display()))?;
        let filename = p
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        attachments.push(Attachment::new(filename, bytes));
    }
    Ok(RawInput {
        body_html,
        attachments,
    })
}

async fn process(args: ProcessCmd) -> Result<ExitCode> {
    let raw = read_input(&args)?;
    // Reject empty requests before any classifier configuration is required.
    if raw.is_empty() {
        return emit_error(
            &Error::InvalidInput(NO_CONTENT_MESSAGE.to_string()),
            args.pretty,
        );
    }

    let pipeline = match Pipeline::from_env() {
        Ok(p) => p,
        Err(e) => return emit_error(&e, args.pretty),
    };
    let mut policy = pipeline.policy();
    if let Some(p) = args.on_source_error {
        policy.on_failure = p;
    }
    if let Some(p) = args.on_unsupported {
        policy.on_unsupported = p;
    }
    let pipeline = pipeline.with_policy(policy);

    match pipeline.run(&raw).await {
        Ok(report) => {
            print_json(&serde_json::to_value(&report)?, args.pretty)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => emit_error(&e, args.pretty),
    }
}

fn mask(args: MaskCmd) -> Result<ExitCode> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("read stdin")?;
    let text = if args.normalize {
        mailtriage_core::normalize(&input)
    } else {
        input
    };
    let (masked, report) = mailtriage_core::mask_with_report(&text);
    print!("{masked}");
    if args.report {
        eprintln!("{}", serde_json::to_string(&report)?);
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => process(args).await,
        Commands::Mask(args) => mask(args),
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "mailtriage",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("mailtriage {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
