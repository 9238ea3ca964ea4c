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

//! Shopsign SDK - request signing for the marketplace open API
//!
//! This crate provides the HMAC-SHA256 request signer, the variable scopes
//! and `{{var}}` substitution it resolves parameter values through, and a
//! typed client that dispatches signed requests.
//!
//! The SDK is designed to be lightweight and embeddable:
//! - No background threads
//! - No runtime initialization
//! - No environment or configuration loading
//!
//! # Example
//!
//! ```rust
//! use shopsign_sdk::{QueryParam, RequestSigner, ScopedVariables, SigningInput};
//!
//! let signer = RequestSigner::new("abc").unwrap();
//! let query = vec![QueryParam::new("foo", "1"), QueryParam::new("bar", "2")];
//! let signature = signer
//! 	.sign(
//! 		&ScopedVariables::new(),
//! 		&SigningInput {
//! 			path: "/open/api/orders/search",
//! 			query: &query,
//! 			body: "",
//! 			timestamp: 1_700_000_000,
//! 		},
//! 	)
//! 	.unwrap();
//! assert_eq!(signature.len(), 64);
//! ```

pub mod client;
pub mod signing;
pub mod template;
pub mod types;
pub mod variables;

pub use client::{Client, ClientConfig, ClientError, SyncClient};
pub use signing::{
	CanonicalRequest, RequestSigner, SigningError, SigningInput, UnresolvedPolicy, pre_request,
};
pub use types::*;
pub use variables::{ScopedVariables, VariableResolver, VariableScope, VariablesError};
