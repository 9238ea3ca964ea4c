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

//! Variable scopes used to resolve placeholder values
//!
//! Parameter values and request bodies may reference variables by name
//! (`{{shop_cipher}}`). Names are looked up through a [`VariableResolver`].
//! The standard resolver, [`ScopedVariables`], holds three scopes queried in
//! fixed precedence order:
//!
//! 1. **Request** - variables local to the request being prepared
//! 2. **Environment** - the active environment
//! 3. **Global** - variables shared by every environment
//!
//! The first scope that defines a name wins.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use thiserror::Error;

/// Error types for loading variable scopes
#[derive(Debug, Error)]
pub enum VariablesError {
	#[error("Invalid JSON: {0}")]
	Json(#[from] serde_json::Error),
	#[error("Invalid scope format: {0}")]
	InvalidFormat(String),
}

/// Looks up a variable value by name.
///
/// Implementations must be free of side effects: the signer may query the
/// same name several times while preparing one request.
pub trait VariableResolver {
	/// Return the value bound to `key`, or `None` if no binding exists.
	fn resolve(&self, key: &str) -> Option<String>;
}

impl VariableResolver for HashMap<String, String> {
	fn resolve(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}

impl VariableResolver for BTreeMap<String, String> {
	fn resolve(&self, key: &str) -> Option<String> {
		self.get(key).cloned()
	}
}

impl<R: VariableResolver + ?Sized> VariableResolver for &R {
	fn resolve(&self, key: &str) -> Option<String> {
		(**self).resolve(key)
	}
}

/// Variable scope, in lookup precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableScope {
	Request,
	Environment,
	Global,
}

impl VariableScope {
	/// All scopes, highest precedence first
	pub const ORDER: [VariableScope; 3] = [
		VariableScope::Request,
		VariableScope::Environment,
		VariableScope::Global,
	];

	fn index(self) -> usize {
		match self {
			VariableScope::Request => 0,
			VariableScope::Environment => 1,
			VariableScope::Global => 2,
		}
	}
}

/// Three ordered variable scopes: request-local, environment, global
#[derive(Debug, Clone, Default)]
pub struct ScopedVariables {
	scopes: [HashMap<String, String>; 3],
}

impl ScopedVariables {
	/// Create empty scopes
	pub fn new() -> Self {
		Self::default()
	}

	/// Create scopes from pre-populated environment and global maps
	pub fn with_scopes(
		environment: HashMap<String, String>,
		globals: HashMap<String, String>,
	) -> Self {
		Self {
			scopes: [HashMap::new(), environment, globals],
		}
	}

	/// Bind `key` to `value` in the given scope, replacing any previous binding
	pub fn set(&mut self, scope: VariableScope, key: impl Into<String>, value: impl Into<String>) {
		self.scopes[scope.index()].insert(key.into(), value.into());
	}

	/// Get a value from one scope only
	pub fn get(&self, scope: VariableScope, key: &str) -> Option<&str> {
		self.scopes[scope.index()].get(key).map(String::as_str)
	}

	/// Remove a binding from one scope
	pub fn remove(&mut self, scope: VariableScope, key: &str) -> Option<String> {
		self.scopes[scope.index()].remove(key)
	}

	/// Borrow the whole map behind a scope
	pub fn scope(&self, scope: VariableScope) -> &HashMap<String, String> {
		&self.scopes[scope.index()]
	}

	/// Replace all bindings of a scope
	pub fn replace_scope(&mut self, scope: VariableScope, values: HashMap<String, String>) {
		self.scopes[scope.index()] = values;
	}

	/// Find the scope that currently provides `key`
	pub fn defining_scope(&self, key: &str) -> Option<VariableScope> {
		VariableScope::ORDER
			.into_iter()
			.find(|scope| self.scopes[scope.index()].contains_key(key))
	}
}

impl VariableResolver for ScopedVariables {
	fn resolve(&self, key: &str) -> Option<String> {
		self.defining_scope(key)
			.and_then(|scope| self.get(scope, key))
			.map(str::to_string)
	}
}

/// One entry of an exported environment or globals file
#[derive(Debug, Deserialize)]
struct ExportedVariable {
	key: String,
	#[serde(default)]
	value: serde_json::Value,
	#[serde(default = "enabled_by_default")]
	enabled: bool,
}

fn enabled_by_default() -> bool {
	true
}

/// Parse a scope from JSON.
///
/// Two layouts are accepted:
///
/// - a flat object: `{"app_key": "k", "page_size": 5}`
/// - an exported environment: `{"name": "...", "values": [{"key": "app_key", "value": "k", "enabled": true}]}`
///
/// Non-string scalars are stringified. `null` values and disabled entries
/// are skipped.
pub fn parse_scope_json(input: &str) -> Result<HashMap<String, String>, VariablesError> {
	let root: serde_json::Value = serde_json::from_str(input)?;
	let serde_json::Value::Object(mut map) = root else {
		return Err(VariablesError::InvalidFormat(
			"expected a JSON object at the top level".to_string(),
		));
	};

	if map.get("values").is_some_and(serde_json::Value::is_array)
		&& let Some(values) = map.remove("values")
	{
		let entries: Vec<ExportedVariable> = serde_json::from_value(values)?;
		return Ok(entries
			.into_iter()
			.filter(|entry| entry.enabled)
			.filter_map(|entry| scalar_to_string(&entry.value).map(|v| (entry.key, v)))
			.collect());
	}

	let mut scope = HashMap::with_capacity(map.len());
	for (key, value) in map {
		if value.is_object() || value.is_array() {
			return Err(VariablesError::InvalidFormat(format!(
				"value of '{}' must be a scalar",
				key
			)));
		}
		if let Some(v) = scalar_to_string(&value) {
			scope.insert(key, v);
		}
	}
	Ok(scope)
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
	match value {
		serde_json::Value::Null => None,
		serde_json::Value::String(s) => Some(s.clone()),
		other => Some(other.to_string()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_request_scope_shadows_environment_and_global() {
		let mut vars = ScopedVariables::new();
		vars.set(VariableScope::Global, "shop", "global");
		vars.set(VariableScope::Environment, "shop", "env");
		vars.set(VariableScope::Request, "shop", "local");

		assert_eq!(vars.resolve("shop").as_deref(), Some("local"));
		assert_eq!(vars.defining_scope("shop"), Some(VariableScope::Request));
	}

	#[test]
	fn test_falls_through_to_global() {
		let mut vars = ScopedVariables::new();
		vars.set(VariableScope::Global, "app_key", "g");

		assert_eq!(vars.resolve("app_key").as_deref(), Some("g"));
		assert_eq!(vars.defining_scope("app_key"), Some(VariableScope::Global));
		assert_eq!(vars.resolve("missing"), None);
	}

	#[test]
	fn test_empty_value_is_still_a_binding() {
		let mut vars = ScopedVariables::new();
		vars.set(VariableScope::Request, "k", "");
		vars.set(VariableScope::Environment, "k", "env");

		assert_eq!(vars.resolve("k").as_deref(), Some(""));
	}

	#[test]
	fn test_remove_uncovers_lower_scope() {
		let mut vars = ScopedVariables::new();
		vars.set(VariableScope::Request, "k", "local");
		vars.set(VariableScope::Environment, "k", "env");

		assert_eq!(vars.remove(VariableScope::Request, "k").as_deref(), Some("local"));
		assert_eq!(vars.resolve("k").as_deref(), Some("env"));
	}

	#[test]
	fn test_parse_flat_scope() {
		let scope = parse_scope_json(r#"{"app_key":"abc","page_size":5,"debug":true,"gone":null}"#)
			.unwrap();
		assert_eq!(scope.get("app_key").map(String::as_str), Some("abc"));
		assert_eq!(scope.get("page_size").map(String::as_str), Some("5"));
		assert_eq!(scope.get("debug").map(String::as_str), Some("true"));
		assert!(!scope.contains_key("gone"));
	}

	#[test]
	fn test_parse_exported_environment() {
		let input = r#"{
			"name": "prod",
			"values": [
				{"key": "app_key", "value": "abc", "enabled": true},
				{"key": "old_key", "value": "zzz", "enabled": false},
				{"key": "shop_cipher", "value": "GCP_1"}
			]
		}"#;
		let scope = parse_scope_json(input).unwrap();
		assert_eq!(scope.len(), 2);
		assert_eq!(scope.get("shop_cipher").map(String::as_str), Some("GCP_1"));
		assert!(!scope.contains_key("old_key"));
	}

	#[test]
	fn test_parse_rejects_nested_values() {
		let err = parse_scope_json(r#"{"a":{"b":1}}"#).unwrap_err();
		assert!(matches!(err, VariablesError::InvalidFormat(_)));

		let err = parse_scope_json("[1,2]").unwrap_err();
		assert!(matches!(err, VariablesError::InvalidFormat(_)));
	}
}
