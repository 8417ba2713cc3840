use crate::config::{LogRotation, LoggingConfig};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "search-fusion.log";

/// Flushes buffered log lines when dropped; hold it until shutdown.
#[allow(dead_code)]
pub struct LogGuard(tracing_appender::non_blocking::WorkerGuard);

/// Initialize logging.
///
/// With `file = false`, logs go to stderr. Otherwise they are written to
/// `~/.config/search-fusion/search-fusion.log` (or `path`) using the
/// configured rotation.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let filter = build_filter(&config.level);

    if !config.file {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(writer)
            .try_init()
            .ok(); // If already initialized (e.g., in tests), don't crash.
        return Ok(LogGuard(guard));
    }

    let rotation = config.rotation.unwrap_or(LogRotation::Session);
    let (writer, log_path_for_display, guard) = open_writer(config, rotation)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer)
        .try_init()
        .ok();

    tracing::info!(log_file = %log_path_for_display.display(), rotation = ?rotation, "writing logs to file");

    Ok(LogGuard(guard))
}

/// `RUST_LOG` wins; otherwise our crate at `level`, warn for everything else.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("search_fusion={level},warn")))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn open_writer(
    config: &LoggingConfig,
    rotation: LogRotation,
) -> Result<(NonBlocking, PathBuf, tracing_appender::non_blocking::WorkerGuard)> {
    let base = resolve_base_log_path(config.path.as_deref())?;

    match rotation {
        LogRotation::None => {
            ensure_parent_dir(&base)?;
            let file = open_append(&base)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            Ok((non_blocking, base, guard))
        }
        LogRotation::Daily => {
            let (dir, base_name) = split_dir_and_name(&base)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            // Clean up before opening new writer to keep directory tidy.
            cleanup_rotated_logs(&dir, RotationKind::Daily { base_name: base_name.clone() }, config.keep)?;

            let appender = tracing_appender::rolling::daily(&dir, &base_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            Ok((non_blocking, base, guard))
        }
        LogRotation::Session => {
            let (dir, base_name) = split_dir_and_name(&base)?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            cleanup_rotated_logs(
                &dir,
                RotationKind::Session {
                    base_name: base_name.clone(),
                },
                config.keep,
            )?;

            let session_path = build_session_log_path(&dir, &base_name);
            let file = open_append(&session_path)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            Ok((non_blocking, session_path, guard))
        }
    }
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

fn default_log_path() -> Result<PathBuf> {
    let config_path = crate::config::config_path()?;
    Ok(config_path.with_file_name(LOG_FILE_NAME))
}

fn resolve_base_log_path(config_value: Option<&str>) -> Result<PathBuf> {
    let Some(raw) = config_value else {
        return default_log_path();
    };

    let path = PathBuf::from(expand_tilde(raw));

    // A trailing separator or an existing directory means "put the log in here".
    if raw.ends_with(std::path::MAIN_SEPARATOR) || path.is_dir() {
        return Ok(path.join(LOG_FILE_NAME));
    }

    Ok(path)
}

fn expand_tilde(raw: &str) -> String {
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let suffix = raw.strip_prefix('~').unwrap_or("");
            return format!("{}{}", home.display(), suffix);
        }
    }
    raw.to_string()
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }
    Ok(())
}

fn split_dir_and_name(path: &Path) -> Result<(PathBuf, String)> {
    let dir = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .context("Invalid logging.path: not valid UTF-8")?
        .to_string();
    Ok((dir, name))
}

fn build_session_log_path(dir: &Path, base_name: &str) -> PathBuf {
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    dir.join(format!("{base_name}.session-{ts}"))
}

enum RotationKind {
    Daily { base_name: String },
    Session { base_name: String },
}

fn cleanup_rotated_logs(dir: &Path, kind: RotationKind, keep: Option<usize>) -> Result<()> {
    let keep = keep.unwrap_or(match kind {
        RotationKind::Daily { .. } => 7,
        RotationKind::Session { .. } => 20,
    });

    if keep == 0 {
        return Ok(());
    }

    let prefix = match &kind {
        // tracing_appender::rolling::daily uses: `{base_name}.{YYYY-MM-DD}`
        RotationKind::Daily { base_name } => format!("{base_name}."),
        RotationKind::Session { base_name } => format!("{base_name}.session-"),
    };

    let mut candidates: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {}", dir.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else { continue };
        if name.starts_with(&prefix) {
            candidates.push(name.to_string());
        }
    }

    candidates.sort();
    candidates.reverse(); // newest first (lexicographic works for our suffix formats)

    for name in candidates.iter().skip(keep) {
        let path = dir.join(name);
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::debug!(error = %e, file = %path.display(), "failed to remove old log file");
        }
    }

    Ok(())
}

/// Query parameters whose values are treated as credentials.
const SECRET_PARAMS: &[&str] = &["key=", "api_key=", "apikey=", "token=", "access_token="];

/// Best-effort redaction of API keys in error text and URLs.
///
/// Masks `sk-...` style tokens and the values of credential query
/// parameters such as Google's `key=`.
pub fn redact_secrets(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut last = 0usize;
    let mut i = 0usize;

    while i < input.len() {
        let rest = &input[i..];

        if rest.starts_with("sk-") && i + 3 < input.len() {
            let j = scan_token(bytes, i + 3);

            // Require a minimum length to reduce false positives.
            if j.saturating_sub(i + 3) >= 8 {
                out.push_str(&input[last..i]);
                out.push_str("sk-***REDACTED***");
                last = j;
                i = j;
                continue;
            }
        }

        let at_param_start = i == 0 || matches!(bytes[i - 1], b'?' | b'&');
        if at_param_start {
            if let Some(param) = SECRET_PARAMS.iter().find(|p| rest.starts_with(**p)) {
                let value_start = i + param.len();
                let j = scan_token(bytes, value_start);
                if j > value_start {
                    out.push_str(&input[last..value_start]);
                    out.push_str("***REDACTED***");
                    last = j;
                    i = j;
                    continue;
                }
            }
        }

        match rest.chars().next() {
            Some(ch) => i += ch.len_utf8(),
            None => break,
        }
    }

    out.push_str(&input[last..]);
    out
}

fn scan_token(bytes: &[u8], mut j: usize) -> usize {
    while j < bytes.len() {
        match bytes[j] {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'%' => j += 1,
            _ => break,
        }
    }
    j
}
