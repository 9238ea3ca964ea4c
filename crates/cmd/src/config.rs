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

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use shopsign_sdk::{
	ClientConfig, UnresolvedPolicy,
	client::{DEFAULT_AUTH_URL, DEFAULT_BASE_URL},
};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "shopsign";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Prefix of configuration environment variables (`SHOPSIGN_APP_SECRET`, ...)
pub const ENV_PREFIX: &str = "SHOPSIGN";

/// Default HTTP timeout in seconds (can be overridden by SHOPSIGN_TIMEOUT_SECS)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default unresolved-variable policy (can be overridden by SHOPSIGN_UNRESOLVED)
pub const DEFAULT_UNRESOLVED: &str = "null";

/// Shopsign configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopsignConfig {
	/// Open-API base URL
	pub base_url: String,
	/// Token refresh endpoint
	pub auth_url: String,
	/// Application key, sent as `app_key`
	pub app_key: String,
	/// Application secret used as the HMAC key
	pub app_secret: String,
	/// Access token sent in the `x-tts-access-token` header
	pub access_token: Option<String>,
	/// HTTP timeout in seconds
	pub timeout_secs: u64,
	/// Unresolved-variable policy: `null`, `empty` or `reject`
	pub unresolved: String,
}

impl Default for ShopsignConfig {
	fn default() -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			auth_url: DEFAULT_AUTH_URL.to_string(),
			app_key: String::new(),
			app_secret: String::new(),
			access_token: None,
			timeout_secs: DEFAULT_TIMEOUT_SECS,
			unresolved: DEFAULT_UNRESOLVED.to_string(),
		}
	}
}

impl ShopsignConfig {
	/// Load `.env`, then the optional file, then `SHOPSIGN_*` variables.
	/// Later sources win.
	pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
		dotenv::dotenv().ok();

		let mut builder = config::Config::builder();
		if let Some(path) = path {
			builder = builder.add_source(config::File::with_name(path));
		}
		let cfg = builder
			.add_source(config::Environment::with_prefix(ENV_PREFIX))
			.build()?;

		cfg.try_deserialize()
	}

	pub fn unresolved_policy(&self) -> Result<UnresolvedPolicy> {
		self.unresolved
			.parse()
			.map_err(|e: String| anyhow::anyhow!(e))
	}

	/// Client configuration with the secret replaced by `secret`, if given
	pub fn client_config_with_secret(&self, secret: Option<&str>) -> Result<ClientConfig> {
		match secret.filter(|s| !s.is_empty()) {
			Some(secret) => Self {
				app_secret: secret.to_string(),
				..self.clone()
			}
			.client_config(),
			None => self.client_config(),
		}
	}

	/// Client configuration; fails when no secret is configured
	pub fn client_config(&self) -> Result<ClientConfig> {
		if self.app_secret.is_empty() {
			bail!("Missing app secret (set {}_APP_SECRET)", ENV_PREFIX);
		}

		let mut client = ClientConfig::new(self.app_key.clone(), self.app_secret.clone());
		client.base_url = self.base_url.clone();
		client.access_token = self.access_token.clone();
		client.timeout = Duration::from_secs(self.timeout_secs);
		client.unresolved = self.unresolved_policy()?;
		Ok(client)
	}
}
