// Copyright 2025 chenjjiaa
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

//! HMAC-SHA256 request signing for the open API
//!
//! # Canonical string
//!
//! ```text
//! {SECRET}{PATH}{KEY_1}{VALUE_1}...{KEY_N}{VALUE_N}{BODY}{SECRET}
//! ```
//!
//! - Keys are the resolved query parameters minus `sign` and `access_token`,
//!   sorted by byte order. The server performs the identical sort, so no
//!   locale-aware or case-insensitive ordering is allowed.
//! - `timestamp` is always present and always carries the timestamp passed
//!   to the signer, whatever the query listed.
//! - There are no separators anywhere.
//!
//! The signature is the lowercase hex HMAC-SHA256 of the canonical string,
//! keyed by the secret.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, trace, warn};

use crate::template;
use crate::types::{QueryParam, SignedRequest};
use crate::variables::{ScopedVariables, VariableResolver, VariableScope};

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the signature itself
pub const SIGN_PARAM: &str = "sign";

/// Query parameter carrying the access token; never signed
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Query parameter the signing timestamp is injected into
pub const TIMESTAMP_PARAM: &str = "timestamp";

/// Stringification of an unresolved value under [`UnresolvedPolicy::NullLiteral`]
pub const NULL_LITERAL: &str = "null";

/// Error types for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
	#[error("Missing secret")]
	MissingSecret,
	#[error("Unresolved variable: {0}")]
	UnresolvedVariable(String),
	#[error("Signature format error: {0}")]
	SignatureFormat(String),
}

/// What a parameter value becomes when no scope defines it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
	/// Sign the literal text `null`
	#[default]
	NullLiteral,
	/// Sign an empty value
	Empty,
	/// Refuse to sign
	Reject,
}

impl std::str::FromStr for UnresolvedPolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"null" | "null-literal" => Ok(UnresolvedPolicy::NullLiteral),
			"empty" => Ok(UnresolvedPolicy::Empty),
			"reject" => Ok(UnresolvedPolicy::Reject),
			other => Err(format!("unknown unresolved-variable policy: {}", other)),
		}
	}
}

/// Everything about one outgoing request that goes into its signature,
/// except the secret.
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
	/// Request path, without query string or fragment
	pub path: &'a str,
	/// Query members in request order
	pub query: &'a [QueryParam],
	/// Raw request body, placeholders not yet substituted
	pub body: &'a str,
	/// Unix seconds
	pub timestamp: i64,
}

/// The resolved parameters, substituted body and canonical string for one
/// request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
	pub params: BTreeMap<String, String>,
	pub body: String,
	pub canonical: String,
}

/// Signs open-API requests with a shared secret.
///
/// The signer holds no mutable state and is safe to share across threads.
#[derive(Clone)]
pub struct RequestSigner {
	secret: String,
	policy: UnresolvedPolicy,
}

impl std::fmt::Debug for RequestSigner {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestSigner")
			.field("secret", &"<redacted>")
			.field("policy", &self.policy)
			.finish()
	}
}

impl RequestSigner {
	/// Create a signer. Fails with [`SigningError::MissingSecret`] on an
	/// empty secret.
	pub fn new(secret: impl Into<String>) -> Result<Self, SigningError> {
		let secret = secret.into();
		if secret.is_empty() {
			return Err(SigningError::MissingSecret);
		}
		Ok(Self {
			secret,
			policy: UnresolvedPolicy::default(),
		})
	}

	/// Set the policy for parameter values no scope defines
	pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
		self.policy = policy;
		self
	}

	pub fn policy(&self) -> UnresolvedPolicy {
		self.policy
	}

	/// Resolve the effective value of every query member.
	///
	/// `sign` and `access_token` never take part, so they are neither
	/// resolved nor returned. The result always contains `timestamp`. Later
	/// duplicates of a key replace earlier ones.
	pub fn resolve_params<R: VariableResolver + ?Sized>(
		&self,
		resolver: &R,
		query: &[QueryParam],
		timestamp: i64,
	) -> Result<BTreeMap<String, String>, SigningError> {
		let mut params = BTreeMap::new();

		for param in query {
			if matches!(
				param.key.as_str(),
				TIMESTAMP_PARAM | SIGN_PARAM | ACCESS_TOKEN_PARAM
			) {
				continue;
			}

			let value = match lookup_value(resolver, param) {
				Some(v) => v,
				None => self.unresolved(&param.key)?,
			};
			params.insert(param.key.clone(), value);
		}

		params.insert(TIMESTAMP_PARAM.to_string(), timestamp.to_string());

		Ok(params)
	}

	fn unresolved(&self, key: &str) -> Result<String, SigningError> {
		match self.policy {
			UnresolvedPolicy::NullLiteral => {
				warn!(key, "parameter not defined in any scope, signing as null");
				Ok(NULL_LITERAL.to_string())
			}
			UnresolvedPolicy::Empty => {
				warn!(key, "parameter not defined in any scope, signing as empty");
				Ok(String::new())
			}
			UnresolvedPolicy::Reject => Err(SigningError::UnresolvedVariable(key.to_string())),
		}
	}

	/// Build the canonical string for a request.
	pub fn canonicalize<R: VariableResolver + ?Sized>(
		&self,
		resolver: &R,
		input: &SigningInput,
	) -> Result<CanonicalRequest, SigningError> {
		let params = self.resolve_params(resolver, input.query, input.timestamp)?;
		let body = template::substitute(input.body, resolver);
		let canonical = build_canonical_string(&self.secret, input.path, &params, &body);

		Ok(CanonicalRequest {
			params,
			body,
			canonical,
		})
	}

	/// Sign a request. Returns the lowercase hex signature.
	pub fn sign<R: VariableResolver + ?Sized>(
		&self,
		resolver: &R,
		input: &SigningInput,
	) -> Result<String, SigningError> {
		let request = self.canonicalize(resolver, input)?;
		debug!(
			path = input.path,
			canonical = %redact(&request.canonical, &self.secret),
			"signing request"
		);
		Ok(hex::encode(self.mac(&request.canonical)?.finalize().into_bytes()))
	}

	/// Sign a request and keep the resolved parameters and body alongside
	/// the signature, ready to be dispatched.
	pub fn sign_request<R: VariableResolver + ?Sized>(
		&self,
		resolver: &R,
		input: &SigningInput,
	) -> Result<SignedRequest, SigningError> {
		let request = self.canonicalize(resolver, input)?;
		let sign = hex::encode(self.mac(&request.canonical)?.finalize().into_bytes());
		let access_token = input
			.query
			.iter()
			.rev()
			.find(|param| param.key == ACCESS_TOKEN_PARAM)
			.and_then(|param| lookup_value(resolver, param));

		Ok(SignedRequest {
			path: input.path.to_string(),
			params: request.params,
			access_token,
			body: request.body,
			timestamp: input.timestamp,
			sign,
		})
	}

	/// Verify a hex signature for a request.
	///
	/// The comparison runs in constant time.
	pub fn verify<R: VariableResolver + ?Sized>(
		&self,
		resolver: &R,
		input: &SigningInput,
		signature: &str,
	) -> Result<bool, SigningError> {
		let expected = hex::decode(signature)
			.map_err(|e| SigningError::SignatureFormat(format!("Invalid hex: {}", e)))?;
		let request = self.canonicalize(resolver, input)?;
		Ok(self.mac(&request.canonical)?.verify_slice(&expected).is_ok())
	}

	fn mac(&self, canonical: &str) -> Result<HmacSha256, SigningError> {
		let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
			.map_err(|_| SigningError::MissingSecret)?;
		mac.update(canonical.as_bytes());
		Ok(mac)
	}
}

/// Effective value of one query member, `None` when no scope defines it.
///
/// An absent, empty or `{{key}}` value is looked up by the member's own key;
/// whatever comes back is then run through placeholder substitution.
fn lookup_value<R: VariableResolver + ?Sized>(
	resolver: &R,
	param: &QueryParam,
) -> Option<String> {
	let literal = param.value.as_deref().unwrap_or("");
	let value = if literal.is_empty() || template::is_placeholder_for(literal, &param.key) {
		trace!(key = %param.key, "resolving parameter from variable scopes");
		resolver.resolve(&param.key)?
	} else {
		literal.to_string()
	};
	Some(template::substitute(&value, resolver))
}

/// Concatenate secret, path, sorted key/value pairs, body and secret.
pub fn build_canonical_string(
	secret: &str,
	path: &str,
	params: &BTreeMap<String, String>,
	body: &str,
) -> String {
	let pairs_len: usize = params.iter().map(|(k, v)| k.len() + v.len()).sum();
	let mut canonical =
		String::with_capacity(secret.len() * 2 + path.len() + pairs_len + body.len());

	canonical.push_str(secret);
	canonical.push_str(path);
	for (key, value) in params {
		canonical.push_str(key);
		canonical.push_str(value);
	}
	canonical.push_str(body);
	canonical.push_str(secret);

	canonical
}

/// Mask the leading and trailing secret of a canonical string. Occurrences
/// of the secret text inside parameters or the body are left alone.
fn redact(canonical: &str, secret: &str) -> String {
	canonical
		.strip_prefix(secret)
		.and_then(|rest| rest.strip_suffix(secret))
		.map(|inner| format!("***{}***", inner))
		.unwrap_or_else(|| "***".to_string())
}

/// Sign a request and publish the result into the request-local scope.
///
/// Writes `timestamp` before signing so that `{{timestamp}}` references in
/// the body or other parameters see the signing time, then writes `sign`.
pub fn pre_request(
	signer: &RequestSigner,
	vars: &mut ScopedVariables,
	input: &SigningInput,
) -> Result<String, SigningError> {
	vars.set(
		VariableScope::Request,
		TIMESTAMP_PARAM,
		input.timestamp.to_string(),
	);
	let sign = signer.sign(&*vars, input)?;
	vars.set(VariableScope::Request, SIGN_PARAM, sign.clone());
	Ok(sign)
}
