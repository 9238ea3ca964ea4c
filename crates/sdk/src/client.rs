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

use reqwest::{Client as ReqwestClient, Method};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, info};

use crate::signing::{RequestSigner, SigningError, SigningInput, UnresolvedPolicy};
use crate::types::{
	ApiResponse, AuthorizedShop, AuthorizedShops, QueryParam, SignedRequest, TokenPair,
};
use crate::variables::ScopedVariables;

/// Default open-API base URL
pub const DEFAULT_BASE_URL: &str = "https://open-api.tiktokglobalshop.com";

/// Default token refresh endpoint
pub const DEFAULT_AUTH_URL: &str = "https://auth.tiktok-shops.com/api/v2/token/refresh";

/// Path of the authorised shops endpoint
pub const AUTHORIZED_SHOPS_PATH: &str = "/authorization/202309/shops";

/// Header carrying the access token
pub const ACCESS_TOKEN_HEADER: &str = "x-tts-access-token";

/// Query parameter carrying the application key
pub const APP_KEY_PARAM: &str = "app_key";

/// Error types for client operations
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Server error: {0}")]
	Server(String),
	#[error("API error {code}: {message}")]
	Api { code: i64, message: String },
	#[error("Signing error: {0}")]
	Signing(#[from] SigningError),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub base_url: String,
	pub app_key: String,
	pub app_secret: String,
	pub access_token: Option<String>,
	pub timeout: Duration,
	pub unresolved: UnresolvedPolicy,
}

impl ClientConfig {
	pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
		Self {
			base_url: DEFAULT_BASE_URL.to_string(),
			app_key: app_key.into(),
			app_secret: app_secret.into(),
			access_token: None,
			timeout: Duration::from_secs(30),
			unresolved: UnresolvedPolicy::default(),
		}
	}
}

/// Client for the marketplace open API
///
/// Every call is signed with the application secret before it is sent.
/// Query values may reference variables (`{{shop_cipher}}`), which are
/// resolved through the client's [`ScopedVariables`].
pub struct Client {
	config: ClientConfig,
	signer: RequestSigner,
	variables: ScopedVariables,
	client: ReqwestClient,
}

impl Client {
	/// Create a new client. Fails if the secret is empty.
	pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
		let signer =
			RequestSigner::new(config.app_secret.clone())?.with_policy(config.unresolved);
		let client = ReqwestClient::builder()
			.timeout(config.timeout)
			.build()
			.map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			config,
			signer,
			variables: ScopedVariables::new(),
			client,
		})
	}

	/// Replace the variables used to resolve query placeholders
	pub fn with_variables(mut self, variables: ScopedVariables) -> Self {
		self.variables = variables;
		self
	}

	pub fn variables_mut(&mut self) -> &mut ScopedVariables {
		&mut self.variables
	}

	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	pub fn signer(&self) -> &RequestSigner {
		&self.signer
	}

	/// Resolve and sign a request without sending it.
	///
	/// `app_key` is added to the query unless already present.
	pub fn build_signed(
		&self,
		path: &str,
		query: &[QueryParam],
		body: &str,
		timestamp: i64,
	) -> Result<SignedRequest, ClientError> {
		let mut members = Vec::with_capacity(query.len() + 1);
		if !query.iter().any(|param| param.key == APP_KEY_PARAM) {
			members.push(QueryParam::new(APP_KEY_PARAM, self.config.app_key.clone()));
		}
		members.extend_from_slice(query);

		let signed = self.signer.sign_request(
			&self.variables,
			&SigningInput {
				path,
				query: &members,
				body,
				timestamp,
			},
		)?;
		Ok(signed)
	}

	/// Send a signed GET request and unwrap the response envelope
	pub async fn get<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[QueryParam],
	) -> Result<T, ClientError> {
		let signed = self.build_signed(path, query, "", now_unix())?;
		self.execute(Method::GET, &signed).await
	}

	/// Send a signed POST request with a JSON body and unwrap the response
	/// envelope
	pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
		&self,
		path: &str,
		query: &[QueryParam],
		body: &B,
	) -> Result<T, ClientError> {
		let body = serde_json::to_string(body)
			.map_err(|e| ClientError::Serialization(format!("Failed to encode body: {}", e)))?;
		let signed = self.build_signed(path, query, &body, now_unix())?;
		self.execute(Method::POST, &signed).await
	}

	/// Send an already signed request.
	///
	/// The body that was signed is sent byte for byte, whatever the method.
	/// An empty body is not sent.
	pub async fn execute<T: DeserializeOwned>(
		&self,
		method: Method,
		signed: &SignedRequest,
	) -> Result<T, ClientError> {
		let url = signed
			.url(&self.config.base_url)
			.map_err(|e| ClientError::Network(format!("Invalid URL: {}", e)))?;

		info!(
			method = %method,
			path = %signed.path,
			timestamp = signed.timestamp,
			"sending signed request"
		);

		let mut request = self
			.client
			.request(method.clone(), url)
			.header(reqwest::header::CONTENT_TYPE, "application/json");
		if let Some(token) = &self.config.access_token {
			request = request.header(ACCESS_TOKEN_HEADER, token);
		}
		if !signed.body.is_empty() {
			request = request.body(signed.body.clone());
		}

		let response = request
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;

		if !response.status().is_success() {
			let status = response.status();
			let error_text = response
				.text()
				.await
				.unwrap_or_else(|_| format!("HTTP {}", status));
			return Err(ClientError::Server(format!("{}: {}", status, error_text)));
		}

		let envelope: ApiResponse<T> = response
			.json()
			.await
			.map_err(|e| ClientError::Serialization(format!("Failed to parse response: {}", e)))?;

		unwrap_envelope(envelope)
	}

	/// List the shops the application is authorised for
	pub async fn authorized_shops(&self) -> Result<Vec<AuthorizedShop>, ClientError> {
		let shops: AuthorizedShops = self.get(AUTHORIZED_SHOPS_PATH, &[]).await?;
		debug!(count = shops.shops.len(), "received authorized shops");
		Ok(shops.shops)
	}

	/// Cipher of the single authorised shop.
	///
	/// Fails when the application is authorised for no shop or for more
	/// than one, since the caller cannot tell which one is meant.
	pub async fn shop_cipher(&self) -> Result<String, ClientError> {
		single_shop_cipher(self.authorized_shops().await?)
	}

	/// Exchange a refresh token for a new token pair.
	///
	/// The token endpoint authenticates with the application secret in the
	/// query and is not signed.
	pub async fn refresh_access_token(
		&self,
		auth_url: &str,
		refresh_token: &str,
	) -> Result<TokenPair, ClientError> {
		info!("refreshing access token");

		let response = self
			.client
			.get(auth_url)
			.query(&[
				(APP_KEY_PARAM, self.config.app_key.as_str()),
				("app_secret", self.config.app_secret.as_str()),
				("refresh_token", refresh_token),
				("grant_type", "refresh_token"),
			])
			.send()
			.await
			.map_err(|e| ClientError::Network(format!("Request failed: {}", e)))?;

		if !response.status().is_success() {
			let status = response.status();
			return Err(ClientError::Server(format!("HTTP {}", status)));
		}

		let envelope: ApiResponse<TokenPair> = response
			.json()
			.await
			.map_err(|e| ClientError::Serialization(format!("Failed to parse response: {}", e)))?;

		unwrap_envelope(envelope)
	}
}

fn unwrap_envelope<T>(envelope: ApiResponse<T>) -> Result<T, ClientError> {
	if envelope.code != 0 {
		return Err(ClientError::Api {
			code: envelope.code,
			message: envelope.message,
		});
	}
	envelope
		.data
		.ok_or_else(|| ClientError::InvalidResponse("response has no data".to_string()))
}

fn single_shop_cipher(mut shops: Vec<AuthorizedShop>) -> Result<String, ClientError> {
	match shops.len() {
		1 => Ok(shops.remove(0).cipher),
		0 => Err(ClientError::InvalidResponse(
			"application is not authorized for any shop".to_string(),
		)),
		n => Err(ClientError::InvalidResponse(format!(
			"application is authorized for {} shops, expected one",
			n
		))),
	}
}

/// Get the current Unix timestamp in seconds.
pub fn now_unix() -> i64 {
	chrono::Utc::now().timestamp()
}

/// Synchronous client wrapper (for compatibility)
///
/// This wraps the async client and runs it in a tokio runtime.
/// For new code, prefer using the async Client directly.
pub struct SyncClient {
	client: Client,
	runtime: tokio::runtime::Runtime,
}

impl SyncClient {
	/// Create a new synchronous client
	pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
		let runtime = tokio::runtime::Runtime::new()
			.map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;
		Ok(Self {
			client: Client::new(config)?,
			runtime,
		})
	}

	pub fn client(&self) -> &Client {
		&self.client
	}

	/// Send a signed GET request (synchronous)
	pub fn get<T: DeserializeOwned>(
		&self,
		path: &str,
		query: &[QueryParam],
	) -> Result<T, ClientError> {
		self.runtime.block_on(self.client.get(path, query))
	}

	/// Send a signed POST request (synchronous)
	pub fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
		&self,
		path: &str,
		query: &[QueryParam],
		body: &B,
	) -> Result<T, ClientError> {
		self.runtime.block_on(self.client.post(path, query, body))
	}

	/// Cipher of the single authorised shop (synchronous)
	pub fn shop_cipher(&self) -> Result<String, ClientError> {
		self.runtime.block_on(self.client.shop_cipher())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::variables::VariableScope;

	fn config() -> ClientConfig {
		ClientConfig::new("key1", "abc")
	}

	fn shop(cipher: &str) -> AuthorizedShop {
		AuthorizedShop {
			id: "1".to_string(),
			name: String::new(),
			region: String::new(),
			seller_type: String::new(),
			cipher: cipher.to_string(),
			code: String::new(),
		}
	}

	#[test]
	fn test_client_creation() {
		let client = Client::new(config()).unwrap();
		assert_eq!(client.config().base_url, DEFAULT_BASE_URL);
	}

	#[test]
	fn test_client_rejects_empty_secret() {
		let result = Client::new(ClientConfig::new("key1", ""));
		assert!(matches!(
			result,
			Err(ClientError::Signing(SigningError::MissingSecret))
		));
	}

	#[test]
	fn test_build_signed_adds_app_key() {
		let client = Client::new(config()).unwrap();
		let signed = client
			.build_signed("/order/202309/orders/search", &[], "", 1_700_000_000)
			.unwrap();
		assert_eq!(signed.params["app_key"], "key1");
		assert_eq!(signed.params["timestamp"], "1700000000");

		let canonical = client
			.signer()
			.canonicalize(
				&ScopedVariables::new(),
				&SigningInput {
					path: "/order/202309/orders/search",
					query: &[QueryParam::new("app_key", "key1")],
					body: "",
					timestamp: 1_700_000_000,
				},
			)
			.unwrap();
		assert_eq!(
			canonical.canonical,
			"abc/order/202309/orders/searchapp_keykey1timestamp1700000000abc"
		);
	}

	#[test]
	fn test_build_signed_keeps_explicit_app_key() {
		let client = Client::new(config()).unwrap();
		let signed = client
			.build_signed("/p", &[QueryParam::new("app_key", "other")], "", 1)
			.unwrap();
		assert_eq!(signed.params["app_key"], "other");
	}

	#[test]
	fn test_build_signed_resolves_client_variables() {
		let mut client = Client::new(config()).unwrap();
		client
			.variables_mut()
			.set(VariableScope::Environment, "shop_cipher", "GCP_1");

		let signed = client
			.build_signed(
				"/p",
				&[QueryParam::new("shop_cipher", "{{shop_cipher}}")],
				"",
				1,
			)
			.unwrap();
		assert_eq!(signed.params["shop_cipher"], "GCP_1");
	}

	#[test]
	fn test_unwrap_envelope() {
		let ok = ApiResponse {
			code: 0,
			message: "Success".to_string(),
			request_id: None,
			data: Some(5),
		};
		assert_eq!(unwrap_envelope(ok).unwrap(), 5);

		let err: ApiResponse<i32> = ApiResponse {
			code: 106001,
			message: "invalid sign".to_string(),
			request_id: None,
			data: None,
		};
		assert!(matches!(
			unwrap_envelope(err),
			Err(ClientError::Api { code: 106001, .. })
		));
	}

	#[test]
	fn test_single_shop_cipher() {
		assert_eq!(single_shop_cipher(vec![shop("GCP_1")]).unwrap(), "GCP_1");
		assert!(single_shop_cipher(vec![]).is_err());
		assert!(single_shop_cipher(vec![shop("a"), shop("b")]).is_err());
	}

	/// Accept one connection, capture the raw request and answer with a
	/// success envelope.
	fn serve_once() -> (String, std::thread::JoinHandle<String>) {
		use std::io::{Read, Write};

		let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = std::thread::spawn(move || {
			let (mut stream, _) = listener.accept().unwrap();
			let mut raw = Vec::new();
			let mut buf = [0u8; 1024];
			loop {
				let n = stream.read(&mut buf).unwrap();
				raw.extend_from_slice(&buf[..n]);
				let text = String::from_utf8_lossy(&raw).to_string();
				if let Some(head_end) = text.find("\r\n\r\n") {
					let length = text[..head_end]
						.lines()
						.find_map(|line| {
							let (name, value) = line.split_once(':')?;
							name.eq_ignore_ascii_case("content-length")
								.then(|| value.trim().parse::<usize>().ok())
								.flatten()
						})
						.unwrap_or(0);
					if raw.len() >= head_end + 4 + length || n == 0 {
						break;
					}
				}
				if n == 0 {
					break;
				}
			}

			let body = r#"{"code":0,"message":"Success","data":{"ok":true}}"#;
			let response = format!(
				"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
				body.len(),
				body
			);
			stream.write_all(response.as_bytes()).unwrap();
			String::from_utf8_lossy(&raw).to_string()
		});
		(format!("http://{}", addr), handle)
	}

	#[tokio::test]
	async fn test_execute_sends_signed_body_with_get() {
		let (base_url, server) = serve_once();
		let mut config = config();
		config.base_url = base_url;
		let client = Client::new(config).unwrap();

		let signed = client.build_signed("/p", &[], r#"{"x":1}"#, 1).unwrap();
		let data: serde_json::Value = client.execute(Method::GET, &signed).await.unwrap();
		assert_eq!(data["ok"], true);

		let raw = server.join().unwrap();
		assert!(raw.starts_with("GET /p?"));
		assert!(raw.contains(&format!("sign={}", signed.sign)));
		assert!(raw.ends_with("\r\n\r\n{\"x\":1}"));
	}

	#[test]
	fn test_sync_client_creation() {
		let client = SyncClient::new(config());
		assert!(client.is_ok());
	}
}
