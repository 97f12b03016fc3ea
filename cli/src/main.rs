//! ditz - Command-line front end for the media ingest engine.
//!
//! Copies the media found on one or more cards to one or more backup roots,
//! laying files out with templates, and reports job progress on stderr.

mod config;

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use ditz_engine::{
    spawn_job, template::referenced_tokens, ChecksumAlgorithm, IngestRequest, MediaType,
    TemplateSet, TokenSet, TokenValue,
};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::config::IngestConfig;

/// ditz - Copy media cards to backup drives
#[derive(Parser, Debug)]
#[command(name = "ditz")]
#[command(version = "0.1.0")]
#[command(about = "Ingest video, audio and photo files into templated folders")]
struct Args {
    /// Source directory or file (repeatable)
    #[arg(long, value_name = "PATH", required = true)]
    src: Vec<PathBuf>,

    /// Destination root (repeatable); every file is copied to each one
    #[arg(long, value_name = "PATH")]
    dst: Vec<PathBuf>,

    /// JSON preset with templates, custom tokens and verification settings
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Folder template for video files
    #[arg(long, value_name = "TEMPLATE")]
    video_template: Option<String>,

    /// Folder template for audio files
    #[arg(long, value_name = "TEMPLATE")]
    audio_template: Option<String>,

    /// Folder template for photo files
    #[arg(long, value_name = "TEMPLATE")]
    photo_template: Option<String>,

    /// Folder template for unclassified files
    #[arg(long, value_name = "TEMPLATE")]
    other_template: Option<String>,

    /// Filename template; `{ext}` is appended when the template omits it
    #[arg(long, value_name = "TEMPLATE")]
    filename_template: Option<String>,

    /// Custom token value (repeatable)
    #[arg(long = "token", value_name = "KEY=VALUE")]
    tokens: Vec<String>,

    /// Print the custom tokens the templates need, then exit
    #[arg(long)]
    list_tokens: bool,

    /// Verify every copy by comparing checksums
    #[arg(long)]
    verify: bool,

    /// Checksum algorithm for verification: sha256, blake3, md5
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<String>,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

/// Terminal progress rendering for the job event stream
struct CliProgress {
    start_time: Instant,
    last_percent: Option<u8>,
}

impl CliProgress {
    fn new() -> Self {
        CliProgress {
            start_time: Instant::now(),
            last_percent: None,
        }
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u8) -> String {
        let filled = usize::from(percent.min(100) / 5);
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
    }

    fn update(&mut self, percent: u8) {
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        eprint!("\rProgress: {}", Self::progress_bar(percent));
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn finish(&self, outcome: &Result<(), String>) {
        if self.last_percent.is_some() {
            eprintln!();
        }
        match outcome {
            Ok(()) => eprintln!("Ingest complete!"),
            Err(_) => eprintln!("Ingest stopped."),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Tests may install a subscriber more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Parse and validate command-line arguments, then run the job
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Split a `KEY=VALUE` argument into a typed token.
fn parse_token(arg: &str) -> Result<(String, TokenValue), String> {
    let (key, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("Invalid token '{}'. Expected KEY=VALUE", arg))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid token '{}'. Key must not be empty", arg));
    }
    Ok((key.to_string(), TokenValue::parse_literal(value)))
}

/// Merge preset, flags and defaults into the engine request.
fn build_request(args: &Args, preset: &IngestConfig) -> Result<IngestRequest, String> {
    let mut templates = preset.templates()?;
    let overrides = [
        (MediaType::Video, &args.video_template),
        (MediaType::Audio, &args.audio_template),
        (MediaType::Photo, &args.photo_template),
        (MediaType::Other, &args.other_template),
    ];
    for (media_type, template) in overrides {
        if let Some(template) = template {
            templates = templates.with_folder_template(media_type, template.clone());
        }
    }
    if let Some(filename) = &args.filename_template {
        templates = templates.with_filename_template(filename.clone());
    }
    let templates = with_extension(templates)?;

    let mut custom_tokens = preset.custom_tokens.clone();
    for arg in &args.tokens {
        let (key, value) = parse_token(arg)?;
        custom_tokens.insert(key, value);
    }

    let verify = args.verify || preset.verify.unwrap_or(false);
    let algorithm = match &args.hash {
        Some(name) => name.parse::<ChecksumAlgorithm>()?,
        None => preset.hash.unwrap_or_default(),
    };

    Ok(IngestRequest::new(args.src.clone(), args.dst.clone())
        .with_templates(templates)
        .with_custom_tokens(custom_tokens)
        .with_verify(verify)
        .with_checksum_algorithm(algorithm))
}

/// Destination files keep their source extension unless the filename
/// template already places `{ext}` itself.
fn with_extension(templates: TemplateSet) -> Result<TemplateSet, String> {
    let names = referenced_tokens(&templates.filename_template).map_err(|e| e.to_string())?;
    if names.iter().any(|name| name == "ext") {
        return Ok(templates);
    }
    let filename = format!("{}{{ext}}", templates.filename_template);
    Ok(templates.with_filename_template(filename))
}

fn missing_tokens(templates: &TemplateSet, custom: &TokenSet) -> Result<Vec<String>, String> {
    let needed = templates.custom_token_names().map_err(|e| e.to_string())?;
    Ok(needed.into_iter().filter(|name| !custom.contains(name)).collect())
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<(), String> {
    let preset = match &args.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    let request = build_request(args, &preset)?;

    if args.list_tokens {
        let names = request
            .templates
            .custom_token_names()
            .map_err(|e| e.to_string())?;
        for name in names {
            let status = if request.custom_tokens.contains(&name) { "set" } else { "missing" };
            println!("{}\t{}", name, status);
        }
        return Ok(());
    }

    if args.dst.is_empty() {
        return Err("At least one --dst is required".to_string());
    }

    let missing = missing_tokens(&request.templates, &request.custom_tokens)?;
    if !missing.is_empty() {
        return Err(format!(
            "Templates reference tokens with no value: {} (pass --token NAME=VALUE)",
            missing.join(", ")
        ));
    }

    info!(
        sources = args.src.len(),
        destinations = args.dst.len(),
        verify = request.verify,
        hash = %request.checksum_algorithm,
        "starting ingest"
    );
    debug!(tokens = ?request.custom_tokens, templates = ?request.templates, "resolved request");

    let mut progress = CliProgress::new();
    let outcome = spawn_job(request).wait_with(|percent| progress.update(percent));
    progress.finish(&outcome);
    match &outcome {
        Ok(()) => info!(
            elapsed = %CliProgress::format_duration(progress.start_time.elapsed()),
            "ingest finished"
        ),
        Err(msg) => error!(error = %msg, "ingest failed"),
    }
    outcome
}
