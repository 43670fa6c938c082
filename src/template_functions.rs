//! Helper functions callable from alert templates.
//!
//! Every helper is registered twice with tera: as a filter, where the piped
//! value binds to the helper's subject parameter, and as a function taking
//! only named arguments. `{{ groupLabels | values | join(sep=" ") }}` and
//! `{{ join(sep=" ", list=groupLabels | values) }}` are equivalent.

use std::collections::HashMap;

use regex::Regex;
use serde::de::DeserializeOwned;
use tera::{Error, Tera, Value};

use crate::label_set::LabelSet;

/// signature shared by all helpers, arguments are passed by name
pub type HelperFn = fn(&HashMap<String, Value>) -> tera::Result<Value>;

#[derive(Debug, Clone, Copy)]
/// a named pure function exposed to templates
pub struct Helper {
	/// name under which templates call the helper
	pub name: &'static str,
	/// parameter receiving the piped value when used as a filter
	pub subject: &'static str,
	/// whether the helper takes a regular expression as `pattern` argument
	pub takes_pattern: bool,
	/// the implementation
	pub call: HelperFn,
}

/// Registry of the helpers templates may call. Nothing outside of this
/// registry is callable from a template.
#[derive(Debug, Clone)]
pub struct FunctionLibrary {
	helpers: Vec<Helper>,
}

impl FunctionLibrary {
	/// string helpers together with the label set accessors and `len`
	pub fn standard() -> Self {
		let helper = |name: &'static str, subject: &'static str, call: HelperFn| Helper {
			name,
			subject,
			takes_pattern: false,
			call,
		};
		let pattern_helper = |name: &'static str, call: HelperFn| Helper {
			name,
			subject: "text",
			takes_pattern: true,
			call,
		};

		Self {
			helpers: vec![
				helper("toUpper", "text", to_upper),
				helper("toLower", "text", to_lower),
				helper("title", "text", title),
				helper("join", "list", join),
				pattern_helper("match", is_match),
				pattern_helper("reReplaceAll", re_replace_all),
				helper("names", "labels", names),
				helper("values", "labels", values),
				helper("remove", "labels", remove),
				helper("len", "value", len),
			],
		}
	}

	pub fn get(&self, name: &str) -> Option<&Helper> {
		self.helpers.iter().find(|helper| helper.name == name)
	}

	/// Registers every helper as tera filter and tera function.
	pub fn install(&self, tera: &mut Tera) {
		for helper in self.helpers.iter().copied() {
			tera.register_filter(helper.name, move |value: &Value, args: &HashMap<String, Value>| {
				let mut args = args.clone();
				args.insert(helper.subject.to_owned(), value.clone());
				(helper.call)(&args)
			});
			tera.register_function(helper.name, move |args: &HashMap<String, Value>| {
				(helper.call)(args)
			});
		}
	}
}

/// fetches and deserializes a named argument
fn arg<T: DeserializeOwned>(args: &HashMap<String, Value>, helper: &str, key: &str) -> tera::Result<T> {
	let value = args
		.get(key)
		.ok_or_else(|| Error::msg(format!("`{helper}` is missing argument `{key}`")))?;

	tera::from_value(value.clone())
		.map_err(|err| Error::chain(format!("`{helper}` got an invalid `{key}` argument"), err))
}

fn to_upper(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let text: String = arg(args, "toUpper", "text")?;
	Ok(Value::String(text.to_uppercase()))
}

fn to_lower(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let text: String = arg(args, "toLower", "text")?;
	Ok(Value::String(text.to_lowercase()))
}

/// upper cases the first letter of every whitespace separated word
fn title(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let text: String = arg(args, "title", "text")?;

	let mut titled = String::with_capacity(text.len());
	let mut word_start = true;
	for c in text.chars() {
		if word_start {
			titled.extend(c.to_uppercase());
		} else {
			titled.push(c);
		}
		word_start = c.is_whitespace();
	}

	Ok(Value::String(titled))
}

fn join(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let sep: String = arg(args, "join", "sep")?;
	let list: Vec<Value> = arg(args, "join", "list")?;

	let parts: Vec<String> = list
		.into_iter()
		.map(|value| match value {
			Value::String(s) => s,
			other => other.to_string(),
		})
		.collect();

	Ok(Value::String(parts.join(&sep)))
}

/// a pattern that fails to compile is an ordinary render error
fn is_match(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let pattern: String = arg(args, "match", "pattern")?;
	let text: String = arg(args, "match", "text")?;

	let regex = Regex::new(&pattern)
		.map_err(|err| Error::chain(format!("`match` got an invalid pattern {pattern:?}"), err))?;

	Ok(Value::Bool(regex.is_match(&text)))
}

/// Replaces every match of `pattern` in `text`, `$1` style references in
/// `replacement` expand to capture groups.
///
/// # Panics
///
/// If `pattern` is not a valid regular expression. Literal patterns are
/// validated when templates are compiled so only patterns computed at render
/// time can get here.
fn re_replace_all(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let pattern: String = arg(args, "reReplaceAll", "pattern")?;
	let replacement: String = arg(args, "reReplaceAll", "replacement")?;
	let text: String = arg(args, "reReplaceAll", "text")?;

	#[allow(clippy::expect_used)]
	let regex = Regex::new(&pattern).expect("reReplaceAll: pattern must be a valid regular expression");

	Ok(Value::String(regex.replace_all(&text, replacement.as_str()).into_owned()))
}

fn names(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let labels: LabelSet = arg(args, "names", "labels")?;
	Ok(Value::from(labels.names()))
}

fn values(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let labels: LabelSet = arg(args, "values", "labels")?;
	Ok(Value::from(labels.values()))
}

fn remove(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let labels: LabelSet = arg(args, "remove", "labels")?;
	let names: Vec<String> = arg(args, "remove", "names")?;
	let remaining = labels
		.remove(&names)
		.iter()
		.map(|(name, value)| (name.clone(), Value::String(value.clone())))
		.collect();

	Ok(Value::Object(remaining))
}

/// length of a list, map or string (in bytes)
fn len(args: &HashMap<String, Value>) -> tera::Result<Value> {
	let value: Value = arg(args, "len", "value")?;

	let len = match &value {
		Value::Array(items) => items.len(),
		Value::Object(map) => map.len(),
		Value::String(s) => s.len(),
		other => return Err(Error::msg(format!("`len` can't measure {other}"))),
	};

	Ok(Value::from(len))
}
