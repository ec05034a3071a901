use std::collections::HashSet;

use serde_json::Value;

use crate::record::{RecordId, RecordRef, TYPE_DOCUMENT};

/// Maximum number of ranked candidates considered per source record.
pub const MAX_CANDIDATES: u32 = 100;

/// Payload fields a candidate hit must carry: its identity and owning collection.
pub const RESULT_FIELDS: [&str; 2] = ["id", "collection_id"];

const MAX_QUERY_TERMS: usize = 256;
const SKIPPED_PROPERTIES: [&str; 2] = ["sourceUrl", "url"];

/// Backend-neutral description of "find records similar to this one".
///
/// The index decides how the text is scored; the query only states what to match against, what to
/// exclude, and which fields to return.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityQuery {
	pub text: String,
	pub exclude_ids: Vec<String>,
	pub exclude_types: Vec<String>,
	pub result_fields: Vec<String>,
	pub limit: u32,
}

/// Builds the similarity query for a record, or `None` when the record carries nothing to match on.
pub fn build_query(record: &RecordRef) -> Option<SimilarityQuery> {
	let mut seen = HashSet::new();
	let mut terms = Vec::new();
	let mut push = |value: &str| {
		let value = value.trim();

		if value.is_empty() || terms.len() >= MAX_QUERY_TERMS {
			return;
		}
		if seen.insert(value.to_lowercase()) {
			terms.push(value.to_string());
		}
	};

	if let Some(title) = record.title.as_deref() {
		push(title);
	}

	for (key, value) in &record.properties {
		if SKIPPED_PROPERTIES.contains(&key.as_str()) {
			continue;
		}

		match value {
			Value::String(text) => push(text),
			Value::Array(items) => items.iter().filter_map(Value::as_str).for_each(&mut push),
			_ => {},
		}
	}
	for country in &record.countries {
		push(country);
	}

	if terms.is_empty() {
		return None;
	}

	// Candidates are entities only, so a document can never come back as its own match.
	let exclude_ids = match &record.id {
		RecordId::Entity(id) => vec![id.clone()],
		RecordId::Document(_) => Vec::new(),
	};

	Some(SimilarityQuery {
		text: terms.join(" "),
		exclude_ids,
		exclude_types: vec![TYPE_DOCUMENT.to_string()],
		result_fields: RESULT_FIELDS.iter().map(|field| field.to_string()).collect(),
		limit: MAX_CANDIDATES,
	})
}
