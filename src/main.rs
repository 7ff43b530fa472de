use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use agora::config::AgoraConfig;
use agora::photo::{
    claim_output_name, CompressionInput, CompressionOutput, ImageCompressor, THUMBNAIL_PREFIX,
};
use agora::quota::PhotoQuota;
use agora::ratelimit::{ActionClass, ActionGuard, Actor, RateLimiter, Role};

#[derive(Parser)]
#[command(name = "agora", version, about = "Forum photo compression and rate limiting tools")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress photos and write main images and thumbnails
    Compress {
        /// Image files to compress
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output directory
        #[arg(long, short)]
        out: PathBuf,

        /// Photos the uploader already stores, for the quota check
        #[arg(long, default_value_t = 0)]
        existing: u32,
    },

    /// Print the effective rate limit rules
    Limits,

    /// Run repeated checks for one actor against the rate limiter
    Simulate {
        /// Action class (post, thread, photo_upload, report, password_change, search)
        #[arg(long)]
        action: ActionClass,

        #[arg(long, default_value = "demo-user")]
        actor: String,

        #[arg(long, default_value_t = 10)]
        attempts: u32,

        /// Treat the actor as a freshly created account
        #[arg(long)]
        new_account: bool,

        /// Pause between attempts in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => AgoraConfig::from_file(&path.to_string_lossy())?,
        None => AgoraConfig::default(),
    };
    info!(config = ?cli.config, "Configuration loaded");

    match cli.command {
        Command::Compress {
            files,
            out,
            existing,
        } => compress(&config, files, &out, existing).await,
        Command::Limits => {
            print!("{}", serde_yaml::to_string(&config.rate_limiting.policies)?);
            Ok(())
        }
        Command::Simulate {
            action,
            actor,
            attempts,
            new_account,
            interval_ms,
        } => {
            simulate(&config, action, actor, attempts, new_account, interval_ms).await;
            Ok(())
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn failure(file: &str, status: &str, reason: impl ToString) -> Value {
    json!({ "file": file, "status": status, "error": reason.to_string() })
}

async fn compress(
    config: &AgoraConfig,
    files: Vec<PathBuf>,
    out: &Path,
    existing: u32,
) -> anyhow::Result<()> {
    let summary = compress_files(config, &files, out, existing).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Compress `files` into `out` and return one summary entry per file.
///
/// Only files that read and validate count against the photo quota. A
/// failure on one file is recorded in its entry and the batch goes on.
async fn compress_files(
    config: &AgoraConfig,
    files: &[PathBuf],
    out: &Path,
    existing: u32,
) -> anyhow::Result<Vec<Value>> {
    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("creating output directory {}", out.display()))?;

    let compressor = ImageCompressor::new(config.compression.clone());
    let mut summary = Vec::with_capacity(files.len());
    let mut inputs = Vec::with_capacity(files.len());

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                summary.push(failure(&name, "error", e));
                continue;
            }
        };

        let input = CompressionInput::new(data, content_type_for(path), name.clone());
        match compressor.validate(&input) {
            Some(reason) => summary.push(failure(&name, "rejected", reason)),
            None => inputs.push(input),
        }
    }

    let quota = PhotoQuota::from_config(&config.photos);
    let decision = quota.check(existing, inputs.len());
    if let Some(message) = quota.rejection_message(&decision) {
        warn!(accepted = decision.accepted, rejected = decision.rejected, "{}", message);
        for input in inputs.drain(decision.accepted..) {
            summary.push(failure(&input.file_name, "rejected", &message));
        }
    }

    let mut taken = HashSet::new();
    for item in compressor.compress_batch(inputs).await {
        let mut output = match item.result {
            Ok(output) => output,
            Err(e) => {
                warn!(file = %item.file_name, error = %e, "Photo skipped");
                summary.push(failure(&item.file_name, "error", e));
                continue;
            }
        };

        output.file_name = claim_output_name(&output.file_name, &mut taken);
        if let Err(e) = write_output(out, &output).await {
            warn!(file = %item.file_name, error = %e, "Photo not written");
            summary.push(failure(&item.file_name, "error", format!("{:#}", e)));
            continue;
        }

        info!(
            file = %item.file_name,
            output = %output.file_name,
            compressed_size = output.compressed_size,
            "Photo compressed"
        );
        summary.push(json!({
            "file": item.file_name,
            "status": "ok",
            "output": output.file_name,
            "format": output.format,
            "width": output.width,
            "height": output.height,
            "quality": output.quality,
            "original_size": output.original_size,
            "compressed_size": output.compressed_size,
            "thumbnail_size": output.thumbnail_size,
            "savings_percent": (output.savings_percent() * 10.0).round() / 10.0,
        }));
    }

    Ok(summary)
}

async fn write_output(dir: &Path, output: &CompressionOutput) -> anyhow::Result<()> {
    let main_path = dir.join(&output.file_name);
    let thumb_path = dir.join(format!("{}{}", THUMBNAIL_PREFIX, output.file_name));

    tokio::fs::write(&main_path, &output.data)
        .await
        .with_context(|| format!("writing {}", main_path.display()))?;
    tokio::fs::write(&thumb_path, &output.thumbnail)
        .await
        .with_context(|| format!("writing {}", thumb_path.display()))?;
    Ok(())
}

async fn simulate(
    config: &AgoraConfig,
    action: ActionClass,
    actor_id: String,
    attempts: u32,
    new_account: bool,
    interval_ms: u64,
) {
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limiting));
    let guard = ActionGuard::new(limiter, &config.rate_limiting);

    let created_at_ms = if new_account {
        chrono::Utc::now().timestamp_millis()
    } else {
        0
    };
    let actor = Actor::new(actor_id, Role::Member, created_at_ms);
    let rule = guard.rule_for(&actor, action);
    info!(
        action = %action,
        requests_per_unit = rule.requests_per_unit,
        unit = ?rule.unit,
        "Simulating"
    );

    for attempt in 1..=attempts {
        let result = guard.admit(&actor, action).await;
        match result.retry_message() {
            None => println!("{:>4}  allowed  remaining={}", attempt, result.remaining),
            Some(message) => println!("{:>4}  denied   {}", attempt, message),
        }

        if interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_photo(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(64, 48, Rgb([40, 120, 200]))
            .save(&path)
            .unwrap();
        path
    }

    fn config_with_quota(quota: u32) -> AgoraConfig {
        let mut config = AgoraConfig::default();
        config.photos.quota = quota;
        config
    }

    fn entry<'a>(summary: &'a [Value], file: &str) -> &'a Value {
        summary
            .iter()
            .find(|e| e["file"] == file)
            .unwrap_or_else(|| panic!("no summary entry for {}", file))
    }

    #[tokio::test]
    async fn test_invalid_files_do_not_use_quota() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let notes = input.path().join("notes.txt");
        std::fs::write(&notes, "not a photo").unwrap();
        let good = write_photo(input.path(), "good.jpg");

        let summary = compress_files(&config_with_quota(1), &[notes, good], out.path(), 0)
            .await
            .unwrap();

        assert_eq!(summary.len(), 2);
        assert_eq!(entry(&summary, "notes.txt")["status"], "rejected");
        assert_eq!(entry(&summary, "good.jpg")["status"], "ok");
        assert!(out.path().join("good.jpg").exists());
    }

    #[tokio::test]
    async fn test_quota_rejects_surplus_valid_files() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let files = vec![
            write_photo(input.path(), "one.jpg"),
            write_photo(input.path(), "two.jpg"),
            write_photo(input.path(), "three.jpg"),
        ];

        let summary = compress_files(&config_with_quota(10), &files, out.path(), 8)
            .await
            .unwrap();

        assert_eq!(entry(&summary, "one.jpg")["status"], "ok");
        assert_eq!(entry(&summary, "two.jpg")["status"], "ok");
        let rejected = entry(&summary, "three.jpg");
        assert_eq!(rejected["status"], "rejected");
        assert_eq!(
            rejected["error"],
            "Only 2 of your 3 photos can be uploaded (limit 10)."
        );
    }

    #[tokio::test]
    async fn test_write_failure_only_affects_that_file() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let files = vec![
            write_photo(input.path(), "blocked.jpg"),
            write_photo(input.path(), "fine.jpg"),
        ];
        // A directory where the main image should go
        std::fs::create_dir(out.path().join("blocked.jpg")).unwrap();

        let summary = compress_files(&AgoraConfig::default(), &files, out.path(), 0)
            .await
            .unwrap();

        assert_eq!(summary.len(), 2);
        let blocked = entry(&summary, "blocked.jpg");
        assert_eq!(blocked["status"], "error");
        assert!(blocked["error"].as_str().unwrap().contains("blocked.jpg"));
        assert_eq!(entry(&summary, "fine.jpg")["status"], "ok");
        assert!(out.path().join("thumb-fine.jpg").exists());
    }

    #[tokio::test]
    async fn test_colliding_output_names_are_kept_apart() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let files = vec![
            write_photo(input.path(), "a.png"),
            write_photo(input.path(), "a.jpg"),
        ];

        let summary = compress_files(&AgoraConfig::default(), &files, out.path(), 0)
            .await
            .unwrap();

        assert_eq!(entry(&summary, "a.png")["output"], "a.jpg");
        assert_eq!(entry(&summary, "a.jpg")["output"], "a-1.jpg");
        for name in ["a.jpg", "thumb-a.jpg", "a-1.jpg", "thumb-a-1.jpg"] {
            assert!(out.path().join(name).exists(), "{} missing", name);
        }
    }
}
