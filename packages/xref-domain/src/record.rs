use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TYPE_DOCUMENT: &str = "document";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed record reference: {message}")]
pub struct MalformedRecord {
	pub message: String,
}
impl MalformedRecord {
	fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Identity of the record being cross-referenced.
///
/// Documents are keyed by their numeric document id, every other record type by its entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordId {
	Entity(String),
	Document(i64),
}
impl RecordId {
	pub fn entity_id(&self) -> Option<&str> {
		match self {
			Self::Entity(id) => Some(id.as_str()),
			Self::Document(_) => None,
		}
	}

	pub fn document_id(&self) -> Option<i64> {
		match self {
			Self::Entity(_) => None,
			Self::Document(id) => Some(*id),
		}
	}
}
impl Display for RecordId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Entity(id) => write!(f, "entity:{id}"),
			Self::Document(id) => write!(f, "document:{id}"),
		}
	}
}

/// A record as unpacked from the search index.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRef {
	pub id: RecordId,
	pub record_type: String,
	pub collection_id: i64,
	pub title: Option<String>,
	pub schema: Option<String>,
	pub countries: Vec<String>,
	pub properties: Map<String, Value>,
}
impl RecordRef {
	/// Unpacks an index payload of the shape
	/// `{id, $type, name|title, collection_id, properties, countries, schema}`.
	pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, MalformedRecord> {
		let record_type = payload
			.get("$type")
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|value| !value.is_empty())
			.ok_or_else(|| MalformedRecord::new("record is missing $type"))?
			.to_string();
		let raw_id = payload.get("id").ok_or_else(|| MalformedRecord::new("record is missing id"))?;
		let id = if record_type == TYPE_DOCUMENT {
			RecordId::Document(document_id(raw_id)?)
		} else {
			RecordId::Entity(entity_id(raw_id)?)
		};
		let collection_id = payload
			.get("collection_id")
			.and_then(integer_value)
			.ok_or_else(|| MalformedRecord::new(format!("{id} is missing collection_id")))?;
		let title = ["name", "title"]
			.iter()
			.filter_map(|key| payload.get(*key).and_then(Value::as_str))
			.map(str::trim)
			.find(|value| !value.is_empty())
			.map(str::to_string);
		let schema = payload.get("schema").and_then(Value::as_str).map(str::to_string);
		let countries = string_list(payload.get("countries"));
		let properties =
			payload.get("properties").and_then(Value::as_object).cloned().unwrap_or_default();

		Ok(Self { id, record_type, collection_id, title, schema, countries, properties })
	}

	pub fn is_document(&self) -> bool {
		matches!(self.id, RecordId::Document(_))
	}

	/// Values of one property, flattened to strings. Missing properties yield an empty list.
	pub fn property_values(&self, key: &str) -> Vec<String> {
		string_list(self.properties.get(key))
	}
}

pub fn integer_value(value: &Value) -> Option<i64> {
	match value {
		Value::Number(number) => number
			.as_i64()
			.or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
		Value::String(text) => text.trim().parse().ok(),
		_ => None,
	}
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
	match value {
		Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
		Some(Value::Array(items)) => items
			.iter()
			.filter_map(Value::as_str)
			.map(str::trim)
			.filter(|text| !text.is_empty())
			.map(str::to_string)
			.collect(),
		_ => Vec::new(),
	}
}

fn entity_id(raw: &Value) -> Result<String, MalformedRecord> {
	let id = match raw {
		Value::String(text) => text.trim().to_string(),
		Value::Number(number) => number.to_string(),
		_ => String::new(),
	};

	if id.is_empty() {
		return Err(MalformedRecord::new("entity id must be a non-empty string"));
	}

	Ok(id)
}

fn document_id(raw: &Value) -> Result<i64, MalformedRecord> {
	integer_value(raw)
		.ok_or_else(|| MalformedRecord::new(format!("document id {raw} is not an integer")))
}
