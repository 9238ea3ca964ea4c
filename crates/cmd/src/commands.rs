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

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Method;
use shopsign_sdk::{
	Client, QueryParam, RequestSigner, ScopedVariables, SigningInput, VariableResolver,
	VariableScope, client::now_unix, parse_query, variables::parse_scope_json,
};
use tracing::{debug, info};

use crate::cli::{Command, HttpMethod, RequestArgs, SendArgs, SignArgs};
use crate::config::ShopsignConfig;

/// Variable the secret is looked up under when neither flag nor
/// configuration provides one
const SECRET_VARIABLE: &str = "app_secret";

/// Run a subcommand and return what it prints
pub async fn run(command: Command, config: &ShopsignConfig) -> Result<String> {
	match command {
		Command::Sign(args) => sign(&args, config),
		Command::Url(args) => url(&args, config),
		Command::Send(args) => send(&args, config).await,
		Command::Shops => shops(config).await,
		Command::RefreshToken { refresh_token } => {
			refresh_token_pair(&refresh_token, config).await
		}
	}
}

fn sign(args: &SignArgs, config: &ShopsignConfig) -> Result<String> {
	let prepared = Prepared::from_args(&args.request)?;
	let signer = build_signer(&args.request, config, &prepared.variables)?;
	let input = prepared.input(&args.request.path);

	let signature = signer
		.sign(&prepared.variables, &input)
		.context("Failed to sign request")?;

	if args.show_canonical {
		let canonical = signer.canonicalize(&prepared.variables, &input)?;
		return Ok(format!("{}\n{}", canonical.canonical, signature));
	}
	Ok(signature)
}

fn url(args: &RequestArgs, config: &ShopsignConfig) -> Result<String> {
	let prepared = Prepared::from_args(args)?;
	let signer = build_signer(args, config, &prepared.variables)?;

	let signed = signer
		.sign_request(&prepared.variables, &prepared.input(&args.path))
		.context("Failed to sign request")?;
	let url = signed
		.url(&config.base_url)
		.with_context(|| format!("Invalid base URL: {}", config.base_url))?;
	Ok(url.to_string())
}

async fn send(args: &SendArgs, config: &ShopsignConfig) -> Result<String> {
	let request = &args.request;
	let prepared = Prepared::from_args(request)?;

	let mut client_config = config.client_config_with_secret(request.secret.as_deref())?;
	if let Some(policy) = request.unresolved {
		client_config.unresolved = policy;
	}
	let client = Client::new(client_config)?.with_variables(prepared.variables.clone());

	let signed = client.build_signed(
		&request.path,
		&prepared.query,
		&prepared.body,
		prepared.timestamp,
	)?;
	let method = match args.method {
		HttpMethod::Get => Method::GET,
		HttpMethod::Post => Method::POST,
	};
	info!(method = %method, path = %request.path, "dispatching request");

	let data: serde_json::Value = client.execute(method, &signed).await?;
	Ok(serde_json::to_string_pretty(&data)?)
}

async fn shops(config: &ShopsignConfig) -> Result<String> {
	let client = Client::new(config.client_config()?)?;
	let shops = client.authorized_shops().await?;

	Ok(shops
		.iter()
		.map(|shop| format!("{}\t{}\t{}\t{}", shop.cipher, shop.id, shop.region, shop.name))
		.collect::<Vec<_>>()
		.join("\n"))
}

async fn refresh_token_pair(refresh_token: &str, config: &ShopsignConfig) -> Result<String> {
	let client = Client::new(config.client_config()?)?;
	let tokens = client
		.refresh_access_token(&config.auth_url, refresh_token)
		.await?;
	Ok(serde_json::to_string_pretty(&tokens)?)
}

/// Inputs of one request, gathered from flags and files
#[derive(Debug)]
struct Prepared {
	variables: ScopedVariables,
	query: Vec<QueryParam>,
	body: String,
	timestamp: i64,
}

impl Prepared {
	fn from_args(args: &RequestArgs) -> Result<Self> {
		Ok(Self {
			variables: load_variables(args)?,
			query: collect_query(args),
			body: read_body(args)?,
			timestamp: args.timestamp.unwrap_or_else(now_unix),
		})
	}

	fn input<'a>(&'a self, path: &'a str) -> SigningInput<'a> {
		SigningInput {
			path,
			query: &self.query,
			body: &self.body,
			timestamp: self.timestamp,
		}
	}
}

fn build_signer(
	args: &RequestArgs,
	config: &ShopsignConfig,
	variables: &ScopedVariables,
) -> Result<RequestSigner> {
	let secret = resolve_secret(args.secret.as_deref(), config, variables)?;
	let policy = match args.unresolved {
		Some(policy) => policy,
		None => config.unresolved_policy()?,
	};
	Ok(RequestSigner::new(secret)?.with_policy(policy))
}

/// Secret from the flag, then the configuration, then the `app_secret`
/// variable.
fn resolve_secret(
	flag: Option<&str>,
	config: &ShopsignConfig,
	variables: &ScopedVariables,
) -> Result<String> {
	if let Some(secret) = flag.filter(|s| !s.is_empty()) {
		return Ok(secret.to_string());
	}
	if !config.app_secret.is_empty() {
		return Ok(config.app_secret.clone());
	}
	if let Some(secret) = variables.resolve(SECRET_VARIABLE).filter(|s| !s.is_empty()) {
		debug!("using app secret from variable scopes");
		return Ok(secret);
	}
	bail!(
		"Missing app secret: pass --secret, set SHOPSIGN_APP_SECRET or define {}",
		SECRET_VARIABLE
	)
}

fn load_variables(args: &RequestArgs) -> Result<ScopedVariables> {
	let mut variables = ScopedVariables::new();

	if let Some(path) = &args.env_file {
		variables.replace_scope(VariableScope::Environment, load_scope_file(path)?);
	}
	if let Some(path) = &args.globals_file {
		variables.replace_scope(VariableScope::Global, load_scope_file(path)?);
	}
	for assignment in &args.vars {
		let (key, value) = parse_assignment(assignment)?;
		variables.set(VariableScope::Request, key, value);
	}

	Ok(variables)
}

fn load_scope_file(path: &Path) -> Result<std::collections::HashMap<String, String>> {
	let raw = fs::read_to_string(path)
		.with_context(|| format!("Failed to read scope file: {}", path.display()))?;
	parse_scope_json(&raw).with_context(|| format!("Invalid scope file: {}", path.display()))
}

fn parse_assignment(assignment: &str) -> Result<(&str, &str)> {
	let (key, value) = assignment
		.split_once('=')
		.ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", assignment))?;
	if key.is_empty() {
		bail!("Empty variable name in '{}'", assignment);
	}
	Ok((key, value))
}

fn collect_query(args: &RequestArgs) -> Vec<QueryParam> {
	let mut query = args.query.as_deref().map(parse_query).unwrap_or_default();
	query.extend(args.params.iter().map(String::as_str).map(QueryParam::parse));
	query
}

fn read_body(args: &RequestArgs) -> Result<String> {
	match (&args.body, &args.body_file) {
		(Some(body), _) => Ok(body.clone()),
		(None, Some(path)) => fs::read_to_string(path)
			.with_context(|| format!("Failed to read body file: {}", path.display())),
		(None, None) => Ok(String::new()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const VECTOR_SIGNATURE: &str =
		"85975148d8825eeb46a1bdce91edcb146c044db1e0980f0ecbe8e9ac26ad7865";

	fn request_args() -> RequestArgs {
		RequestArgs {
			path: "/open/api/orders/search".to_string(),
			query: Some("foo=1".to_string()),
			params: vec!["bar=2".to_string()],
			body: None,
			body_file: None,
			timestamp: Some(1_700_000_000),
			vars: vec![],
			env_file: None,
			globals_file: None,
			secret: Some("abc".to_string()),
			unresolved: None,
		}
	}

	#[test]
	fn test_sign_command() {
		let args = SignArgs {
			request: request_args(),
			show_canonical: false,
		};
		let output = sign(&args, &ShopsignConfig::default()).unwrap();
		assert_eq!(output, VECTOR_SIGNATURE);
	}

	#[test]
	fn test_sign_command_shows_canonical() {
		let args = SignArgs {
			request: request_args(),
			show_canonical: true,
		};
		let output = sign(&args, &ShopsignConfig::default()).unwrap();
		let mut lines = output.lines();
		assert_eq!(
			lines.next(),
			Some("abc/open/api/orders/searchbar2foo1timestamp1700000000abc")
		);
		assert_eq!(lines.next(), Some(VECTOR_SIGNATURE));
	}

	#[test]
	fn test_url_command() {
		let config = ShopsignConfig {
			base_url: "https://open-api.example.com".to_string(),
			..ShopsignConfig::default()
		};
		let output = url(&request_args(), &config).unwrap();
		assert_eq!(
			output,
			format!(
				"https://open-api.example.com/open/api/orders/search?bar=2&foo=1&timestamp=1700000000&sign={}",
				VECTOR_SIGNATURE
			)
		);
	}

	#[test]
	fn test_secret_precedence() {
		let mut vars = ScopedVariables::new();
		vars.set(VariableScope::Environment, "app_secret", "from-vars");
		let mut config = ShopsignConfig::default();

		assert_eq!(resolve_secret(None, &config, &vars).unwrap(), "from-vars");

		config.app_secret = "from-config".to_string();
		assert_eq!(resolve_secret(None, &config, &vars).unwrap(), "from-config");
		assert_eq!(
			resolve_secret(Some("from-flag"), &config, &vars).unwrap(),
			"from-flag"
		);
	}

	#[test]
	fn test_missing_secret_is_fatal() {
		let mut args = request_args();
		args.secret = None;
		let result = sign(
			&SignArgs {
				request: args,
				show_canonical: false,
			},
			&ShopsignConfig::default(),
		);
		assert!(result.is_err());
	}

	#[test]
	fn test_request_vars_resolve_placeholders() {
		let mut args = request_args();
		args.query = Some("foo={{foo}}".to_string());
		args.vars = vec!["foo=1".to_string()];
		let output = sign(
			&SignArgs {
				request: args,
				show_canonical: false,
			},
			&ShopsignConfig::default(),
		)
		.unwrap();
		assert_eq!(output, VECTOR_SIGNATURE);
	}

	#[test]
	fn test_env_file_scope() {
		let path =
			std::env::temp_dir().join(format!("shopsign-env-{}.json", std::process::id()));
		fs::write(
			&path,
			r#"{"name":"test","values":[{"key":"bar","value":"2","enabled":true}]}"#,
		)
		.unwrap();

		let mut args = request_args();
		args.params = vec!["bar".to_string()];
		args.env_file = Some(path.clone());
		let output = sign(
			&SignArgs {
				request: args,
				show_canonical: false,
			},
			&ShopsignConfig::default(),
		);
		fs::remove_file(&path).ok();

		assert_eq!(output.unwrap(), VECTOR_SIGNATURE);
	}

	#[test]
	fn test_parse_assignment() {
		assert_eq!(parse_assignment("a=b=c").unwrap(), ("a", "b=c"));
		assert_eq!(parse_assignment("a=").unwrap(), ("a", ""));
		assert!(parse_assignment("novalue").is_err());
		assert!(parse_assignment("=x").is_err());
	}
}
