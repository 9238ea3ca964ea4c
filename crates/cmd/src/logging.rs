// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging initialization for the shopsign CLI
//!
//! Standard output carries command results only, so logs go to a file and,
//! on request, to stderr.
//!
//! # Configuration
//!
//! - `RUST_LOG`: Log level filter (default: `warn`)
//!   - `RUST_LOG=shopsign_sdk=debug` logs the canonical string of every
//!     signed request, with the secret masked
//!
//! - `LOG_DIR`: Root directory for log files (default: `{project_root}/logs`)
//!   - Log files are created in `{LOG_DIR}/shopsign/`
//!
//! - `LOG_TO_CONSOLE`: Enable stderr output (default: `false`)
//!   - `true`, `1` or `yes`; the `--verbose` flag has the same effect
//!   - Forced on when the log directory cannot be written
//!
//! # Log File Format
//!
//! - Rotation: one file per day (UTC), `shopsign.{date}.log`
//! - Format: UTC timestamp, thread ID, log level, module path, message

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::{
	non_blocking,
	rolling::{self, Rotation},
};
use tracing_subscriber::{
	EnvFilter, fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt,
};

use crate::config::{DEFAULT_LOG_LEVEL, DEFAULT_LOG_TO_CONSOLE, LOG_COMPONENT_NAME};

// Store log guard to prevent log loss on program exit
static LOG_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

/// Find project root directory by walking up from the current directory
/// to the nearest `Cargo.toml`, falling back to the current directory.
fn find_project_root() -> std::path::PathBuf {
	if let Ok(mut current_dir) = env::current_dir() {
		loop {
			if current_dir.join("Cargo.toml").exists() {
				return current_dir;
			}
			if let Some(parent) = current_dir.parent() {
				current_dir = parent.to_path_buf();
			} else {
				break;
			}
		}
	}

	env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf())
}

fn get_log_root() -> String {
	env::var("LOG_DIR").unwrap_or_else(|_| {
		let project_root = find_project_root();
		project_root.join("logs").to_string_lossy().to_string()
	})
}

fn parse_flag(value: &str) -> bool {
	matches!(value, "true" | "1" | "yes")
}

/// Setup daily-rolling file logging layer.
fn setup_file_logging(log_dir: &Path) -> Result<non_blocking::NonBlocking> {
	std::fs::create_dir_all(log_dir)
		.with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

	let file_appender = rolling::RollingFileAppender::builder()
		.rotation(Rotation::DAILY)
		.filename_prefix(LOG_COMPONENT_NAME.to_string())
		.filename_suffix(".log")
		.build(log_dir)
		.with_context(|| {
			format!(
				"Failed to create rolling file appender in {}",
				log_dir.display()
			)
		})?;

	let (file_writer, guard) = non_blocking(file_appender);
	LOG_GUARD.set(guard).ok();

	Ok(file_writer)
}

/// Stderr output is forced when the log file cannot be opened.
fn console_enabled(verbose: bool, requested: bool, file_logging: bool) -> bool {
	verbose || requested || !file_logging
}

/// Initialize logging with file output and optional stderr output
///
/// `verbose` forces stderr output regardless of `LOG_TO_CONSOLE`. A log
/// directory that cannot be written does not fail the command: logging
/// falls back to stderr and a warning is emitted.
pub fn init_logging(verbose: bool) {
	dotenv::dotenv().ok();

	let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

	let log_root = get_log_root();
	let log_dir = Path::new(&log_root).join(LOG_COMPONENT_NAME);
	let (file_writer, file_error) = match setup_file_logging(&log_dir) {
		Ok(writer) => (Some(writer), None),
		Err(e) => (None, Some(e)),
	};

	let log_to_console = console_enabled(
		verbose,
		env::var("LOG_TO_CONSOLE")
			.map(|v| parse_flag(&v))
			.unwrap_or(DEFAULT_LOG_TO_CONSOLE),
		file_writer.is_some(),
	);

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

	let file_layer = file_writer.map(|writer| {
		fmt::layer()
			.with_writer(writer)
			.with_timer(fmt::time::UtcTime::rfc_3339())
			.with_thread_ids(true)
			.with_target(true)
			.with_thread_names(false)
			.with_ansi(false)
	});
	let console_layer = log_to_console.then(|| {
		fmt::layer()
			.with_writer(std::io::stderr)
			.with_timer(fmt::time::UtcTime::rfc_3339())
			.with_thread_ids(true)
			.with_target(true)
			.with_thread_names(false)
			.with_ansi(true)
	});

	Registry::default()
		.with(filter)
		.with(file_layer)
		.with(console_layer)
		.init();

	info!(target: "shopsign", "Log level: {}", log_level);
	match file_error {
		None => info!(target: "shopsign", "Log directory: {}", log_dir.display()),
		Some(e) => warn!(target: "shopsign", "File logging disabled: {:#}", e),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_flag() {
		assert!(parse_flag("true"));
		assert!(parse_flag("1"));
		assert!(parse_flag("yes"));
		assert!(!parse_flag("no"));
		assert!(!parse_flag(""));
	}

	#[test]
	fn test_unwritable_log_dir_falls_back_to_console() {
		let blocker =
			env::temp_dir().join(format!("shopsign-log-blocker-{}", std::process::id()));
		std::fs::write(&blocker, b"").unwrap();

		let result = setup_file_logging(&blocker.join(LOG_COMPONENT_NAME));
		std::fs::remove_file(&blocker).ok();

		assert!(result.is_err());
		assert!(console_enabled(false, false, false));
		assert!(!console_enabled(false, false, true));
		assert!(console_enabled(true, false, true));
	}
}
