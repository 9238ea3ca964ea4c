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

//! `{{name}}` placeholder substitution
//!
//! A placeholder is `{{`, a name that contains no `{` or `}`, then `}}`.
//! Placeholders whose name resolves are replaced by the value; the rest are
//! left verbatim. Values may themselves contain placeholders, so the pass is
//! repeated until the output is stable, at most [`MAX_SUBSTITUTION_PASSES`]
//! times.

use crate::variables::VariableResolver;

/// Upper bound on substitution passes; stops self-referencing variables.
pub const MAX_SUBSTITUTION_PASSES: usize = 19;

/// Replace every resolvable `{{name}}` in `input`.
pub fn substitute<R: VariableResolver + ?Sized>(input: &str, resolver: &R) -> String {
	let mut current = input.to_string();
	for _ in 0..MAX_SUBSTITUTION_PASSES {
		let (next, replaced) = substitute_once(&current, resolver);
		if replaced == 0 || next == current {
			return next;
		}
		current = next;
	}
	current
}

/// Single left-to-right pass. Returns the output and the number of
/// placeholders replaced.
fn substitute_once<R: VariableResolver + ?Sized>(input: &str, resolver: &R) -> (String, usize) {
	let bytes = input.as_bytes();
	let mut out = String::with_capacity(input.len());
	let mut copied = 0;
	let mut replaced = 0;
	let mut i = 0;

	while i + 1 < bytes.len() {
		if bytes[i] != b'{' || bytes[i + 1] != b'{' {
			i += 1;
			continue;
		}
		let Some(end) = placeholder_end(bytes, i) else {
			i += 1;
			continue;
		};
		let name = &input[i + 2..end];
		if let Some(value) = resolver.resolve(name) {
			out.push_str(&input[copied..i]);
			out.push_str(&value);
			copied = end + 2;
			replaced += 1;
		}
		i = end + 2;
	}

	out.push_str(&input[copied..]);
	(out, replaced)
}

/// Index of the closing `}}` for a placeholder opening at `start`.
fn placeholder_end(bytes: &[u8], start: usize) -> Option<usize> {
	let mut j = start + 2;
	while j < bytes.len() {
		match bytes[j] {
			b'{' => return None,
			b'}' => {
				return (bytes.get(j + 1) == Some(&b'}')).then_some(j);
			}
			_ => j += 1,
		}
	}
	None
}

/// If the whole of `value` is a single placeholder, return its name.
pub fn placeholder_name(value: &str) -> Option<&str> {
	let inner = value.strip_prefix("{{")?.strip_suffix("}}")?;
	(!inner.contains(['{', '}'])).then_some(inner)
}

/// True when `value` is exactly the placeholder for `key` (`{{key}}`).
pub fn is_placeholder_for(value: &str, key: &str) -> bool {
	placeholder_name(value) == Some(key)
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;

	fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn test_replaces_known_placeholders() {
		let v = vars(&[("shop", "GCP_1"), ("size", "5")]);
		assert_eq!(
			substitute("cipher={{shop}}&size={{size}}", &v),
			"cipher=GCP_1&size=5"
		);
	}

	#[test]
	fn test_leaves_unknown_placeholders() {
		let v = vars(&[("a", "1")]);
		assert_eq!(substitute("{{a}}-{{b}}", &v), "1-{{b}}");
	}

	#[test]
	fn test_nested_references_resolve() {
		let v = vars(&[("outer", "x{{inner}}"), ("inner", "y")]);
		assert_eq!(substitute("{{outer}}", &v), "xy");
	}

	#[test]
	fn test_self_reference_terminates() {
		let v = vars(&[("loop", "{{loop}}")]);
		assert_eq!(substitute("{{loop}}", &v), "{{loop}}");

		let v = vars(&[("grow", "a{{grow}}")]);
		let out = substitute("{{grow}}", &v);
		assert_eq!(out.matches('a').count(), MAX_SUBSTITUTION_PASSES);
	}

	#[test]
	fn test_braces_inside_name_are_not_placeholders() {
		let v = vars(&[("a", "1")]);
		assert_eq!(substitute("{{{a}}", &v), "{1");
		assert_eq!(substitute("{{a}", &v), "{{a}");
		assert_eq!(substitute(r#"{"k":{"x":1}}"#, &v), r#"{"k":{"x":1}}"#);
	}

	#[test]
	fn test_multibyte_text_is_preserved() {
		let v = vars(&[("name", "Jürgen")]);
		assert_eq!(substitute("größe {{name}} ✓", &v), "größe Jürgen ✓");
	}

	#[test]
	fn test_placeholder_name() {
		assert_eq!(placeholder_name("{{app_key}}"), Some("app_key"));
		assert_eq!(placeholder_name("x{{app_key}}"), None);
		assert_eq!(placeholder_name("{{a}}{{b}}"), None);
		assert!(is_placeholder_for("{{shop_cipher}}", "shop_cipher"));
		assert!(!is_placeholder_for("{{shop_cipher}}", "app_key"));
	}
}
