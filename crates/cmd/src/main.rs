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

//! Shopsign command-line tool
//!
//! Signs marketplace open-API requests the same way the server verifies
//! them, prints signatures or signed URLs, and can dispatch the signed
//! request.
//!
//! Configuration is read from `.env`, an optional `--config` file and
//! `SHOPSIGN_*` environment variables; flags override all of them.

mod cli;
mod commands;
mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use crate::{cli::Cli, config::ShopsignConfig, logging::init_logging};

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize logging first
	init_logging(cli.verbose);

	let config =
		ShopsignConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
	info!(target: "shopsign", "Using open API at {}", config.base_url);

	let output = commands::run(cli.command, &config).await?;
	println!("{}", output);

	Ok(())
}
