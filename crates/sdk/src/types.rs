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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::signing::{ACCESS_TOKEN_PARAM, SIGN_PARAM};

/// One query member of an outgoing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
	pub key: String,
	/// `None` for a key-only member (`?flag`)
	pub value: Option<String>,
}

impl QueryParam {
	pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: Some(value.into()),
		}
	}

	pub fn key_only(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			value: None,
		}
	}

	/// Parse a single `key=value` or `key` member
	pub fn parse(member: &str) -> Self {
		match member.split_once('=') {
			Some((key, value)) => Self::new(key, value),
			None => Self::key_only(member),
		}
	}
}

/// Split a raw query string into members, in order.
///
/// A leading `?` is ignored. Values are kept exactly as written: no
/// percent-decoding, since the signature covers the values as sent.
pub fn parse_query(query: &str) -> Vec<QueryParam> {
	query
		.strip_prefix('?')
		.unwrap_or(query)
		.split('&')
		.filter(|member| !member.is_empty())
		.map(QueryParam::parse)
		.collect()
}

/// A request whose query parameters have been resolved and signed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
	/// Request path
	pub path: String,
	/// Resolved query parameters, including `timestamp`, excluding `sign`
	pub params: BTreeMap<String, String>,
	/// `access_token` query value, sent but never signed
	pub access_token: Option<String>,
	/// Body after placeholder substitution
	pub body: String,
	/// Unix seconds used for signing
	pub timestamp: i64,
	/// Lowercase hex HMAC-SHA256 signature
	pub sign: String,
}

impl SignedRequest {
	/// Query pairs to send: the signed parameters, then `access_token` if
	/// present, then `sign`
	pub fn query_pairs(&self) -> Vec<(&str, &str)> {
		self.params
			.iter()
			.map(|(k, v)| (k.as_str(), v.as_str()))
			.chain(
				self.access_token
					.as_deref()
					.map(|token| (ACCESS_TOKEN_PARAM, token)),
			)
			.chain(std::iter::once((SIGN_PARAM, self.sign.as_str())))
			.collect()
	}

	/// Full URL of the request against `base_url`, with a percent-encoded
	/// query string
	pub fn url(&self, base_url: &str) -> Result<Url, url::ParseError> {
		let joined = format!("{}{}", base_url.trim_end_matches('/'), self.path);
		Url::parse_with_params(&joined, self.query_pairs())
	}
}

/// Envelope every open-API response is wrapped in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
	/// `0` on success
	pub code: i64,
	#[serde(default)]
	pub message: String,
	pub request_id: Option<String>,
	pub data: Option<T>,
}

/// Shop the application is authorised for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedShop {
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub region: String,
	#[serde(default)]
	pub seller_type: String,
	/// Opaque per-shop identifier, sent as the `shop_cipher` parameter
	pub cipher: String,
	#[serde(default)]
	pub code: String,
}

/// Payload of the authorised shops endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedShops {
	#[serde(default)]
	pub shops: Vec<AuthorizedShop>,
}

/// Access and refresh token returned by the token refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	pub access_token: String,
	pub refresh_token: String,
	/// Unix seconds
	#[serde(default)]
	pub access_token_expire_in: Option<i64>,
	/// Unix seconds
	#[serde(default)]
	pub refresh_token_expire_in: Option<i64>,
}
