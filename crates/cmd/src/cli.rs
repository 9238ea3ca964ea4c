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

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use shopsign_sdk::UnresolvedPolicy;

/// Sign and send marketplace open-API requests
#[derive(Debug, Parser)]
#[command(name = "shopsign", version)]
pub struct Cli {
	/// Configuration file (TOML, YAML or JSON); SHOPSIGN_* variables override it
	#[arg(long, global = true)]
	pub config: Option<String>,

	/// Also write logs to stderr
	#[arg(short, long, global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Print the signature of a request
	Sign(SignArgs),
	/// Print the signed URL of a request
	Url(RequestArgs),
	/// Sign a request, send it, and print the response data
	Send(SendArgs),
	/// List the shops the application is authorised for
	Shops,
	/// Exchange a refresh token for a new access token
	RefreshToken {
		#[arg(long)]
		refresh_token: String,
	},
}

/// Description of the request to sign
#[derive(Debug, Clone, Args)]
pub struct RequestArgs {
	/// Request path, without query string
	#[arg(long)]
	pub path: String,

	/// Raw query string, e.g. `app_key={{app_key}}&page_size=5`
	#[arg(long)]
	pub query: Option<String>,

	/// Additional query member `key=value` (repeatable)
	#[arg(long = "param", value_name = "KEY=VALUE")]
	pub params: Vec<String>,

	/// Request body
	#[arg(long, conflicts_with = "body_file")]
	pub body: Option<String>,

	/// Read the request body from a file
	#[arg(long)]
	pub body_file: Option<PathBuf>,

	/// Unix seconds to sign with; defaults to now
	#[arg(long)]
	pub timestamp: Option<i64>,

	/// Request-scope variable `key=value` (repeatable)
	#[arg(long = "var", value_name = "KEY=VALUE")]
	pub vars: Vec<String>,

	/// Environment scope file (JSON object or exported environment)
	#[arg(long)]
	pub env_file: Option<PathBuf>,

	/// Global scope file (JSON object or exported globals)
	#[arg(long)]
	pub globals_file: Option<PathBuf>,

	/// Application secret; overrides the configured one
	#[arg(long)]
	pub secret: Option<String>,

	/// What an undefined variable signs as: null, empty or reject
	#[arg(long)]
	pub unresolved: Option<UnresolvedPolicy>,
}

#[derive(Debug, Clone, Args)]
pub struct SignArgs {
	#[command(flatten)]
	pub request: RequestArgs,

	/// Also print the canonical string
	#[arg(long)]
	pub show_canonical: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HttpMethod {
	Get,
	Post,
}

#[derive(Debug, Clone, Args)]
pub struct SendArgs {
	#[arg(long, value_enum, default_value_t = HttpMethod::Get)]
	pub method: HttpMethod,

	#[command(flatten)]
	pub request: RequestArgs,
}

#[cfg(test)]
mod tests {
	use clap::CommandFactory;

	use super::*;

	#[test]
	fn test_cli_definition_is_valid() {
		Cli::command().debug_assert();
	}

	#[test]
	fn test_parse_sign() {
		let cli = Cli::try_parse_from([
			"shopsign",
			"sign",
			"--path",
			"/open/api/orders/search",
			"--query",
			"foo=1&bar=2",
			"--param",
			"page_size=5",
			"--timestamp",
			"1700000000",
			"--secret",
			"abc",
			"--unresolved",
			"reject",
			"--show-canonical",
		])
		.unwrap();

		let Command::Sign(args) = cli.command else {
			panic!("expected sign command");
		};
		assert!(args.show_canonical);
		assert_eq!(args.request.params, vec!["page_size=5".to_string()]);
		assert_eq!(args.request.timestamp, Some(1_700_000_000));
		assert_eq!(args.request.unresolved, Some(UnresolvedPolicy::Reject));
	}

	#[test]
	fn test_body_conflicts_with_body_file() {
		let result = Cli::try_parse_from([
			"shopsign",
			"url",
			"--path",
			"/p",
			"--body",
			"{}",
			"--body-file",
			"body.json",
		]);
		assert!(result.is_err());
	}

	#[test]
	fn test_parse_send_method() {
		let cli =
			Cli::try_parse_from(["shopsign", "send", "--method", "post", "--path", "/p"]).unwrap();
		let Command::Send(args) = cli.command else {
			panic!("expected send command");
		};
		assert_eq!(args.method, HttpMethod::Post);
	}
}
