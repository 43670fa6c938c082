//! label maps of alerts and alert groups
//!
//! Labels are kept sorted by name so everything derived from a [LabelSet]
//! (names, values, rendered templates) is stable for identical input.
use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
/// label name to label value mapping ordered by label name
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
	/// label names in lexicographic order
	pub fn names(&self) -> Vec<&str> {
		self.0.keys().map(String::as_str).collect()
	}

	/// label values, positionally aligned with [LabelSet::names]
	pub fn values(&self) -> Vec<&str> {
		self.0.values().map(String::as_str).collect()
	}

	/// Returns a new `LabelSet` without the given label names. Names which
	/// aren't part of the set are ignored.
	///
	/// # Arguments
	///
	/// * `names` - label names to leave out
	pub fn remove<S: AsRef<str>>(&self, names: &[S]) -> Self {
		self.0
			.iter()
			.filter(|(name, _)| !names.iter().any(|removed| removed.as_ref() == name.as_str()))
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect()
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.get(name).map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
		self.0.iter()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(iter.into_iter().map(|(name, value)| (name.into(), value.into())).collect())
	}
}
