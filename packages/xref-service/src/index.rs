use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Document, Filter, PayloadIncludeSelector, PointId, Query, QueryPointsBuilder,
	ScrollPointsBuilder, Value as QdrantValue, point_id::PointIdOptions,
	value::Kind, with_payload_selector::SelectorOptions,
};
use serde_json::{Map, Number, Value};

use crate::{BoxFuture, Payload, RecordIndex, Result, ScrollCursor, ScrollPage, SearchHit};
use xref_domain::{record::integer_value, similarity::SimilarityQuery};
use xref_storage::qdrant::{BM25_MODEL, BM25_VECTOR_NAME, QdrantStore};

const TYPE_FIELD: &str = "\"$type\"";
const ID_FIELD: &str = "id";
const COLLECTION_FIELD: &str = "collection_id";
const FETCH_PAGE_SIZE: u32 = 256;

/// Record index backed by a Qdrant collection with a BM25 sparse vector.
pub struct QdrantIndex {
	store: QdrantStore,
}
impl QdrantIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}
}
impl RecordIndex for QdrantIndex {
	fn search<'a>(&'a self, query: &'a SimilarityQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move {
			let mut must_not = Vec::new();

			if !query.exclude_ids.is_empty() {
				must_not.extend(id_conditions(&query.exclude_ids));
			}
			if !query.exclude_types.is_empty() {
				must_not.push(Condition::matches(TYPE_FIELD, query.exclude_types.clone()));
			}

			let request = QueryPointsBuilder::new(self.store.collection.clone())
				.query(Query::new_nearest(Document::new(query.text.clone(), BM25_MODEL)))
				.using(BM25_VECTOR_NAME)
				.filter(Filter::must_not(must_not))
				.limit(u64::from(query.limit))
				.with_payload(include_fields(&query.result_fields));
			let response = self.store.client.query(request).await?;
			let hits = response
				.result
				.into_iter()
				.filter_map(|point| {
					let match_id = payload_id(&point.payload).or_else(|| point_id_text(point.id))?;
					let collection_id = point
						.payload
						.get(COLLECTION_FIELD)
						.and_then(|value| integer_value(&to_json(value)));

					Some(SearchHit { match_id, score: Some(f64::from(point.score)), collection_id })
				})
				.collect();

			Ok(hits)
		})
	}

	fn scroll<'a>(
		&'a self,
		collection_id: i64,
		cursor: Option<&'a ScrollCursor>,
		page_size: u32,
	) -> BoxFuture<'a, Result<ScrollPage>> {
		Box::pin(async move {
			let mut request = ScrollPointsBuilder::new(self.store.collection.clone())
				.filter(Filter::must([Condition::matches(COLLECTION_FIELD, collection_id)]))
				.limit(page_size)
				.with_payload(true);

			if let Some(cursor) = cursor {
				request = request.offset(cursor.to_point_id());
			}

			let response = self.store.client.scroll(request).await?;
			let records =
				response.result.into_iter().map(|point| to_payload(point.payload)).collect();
			let next = response.next_page_offset.and_then(ScrollCursor::from_point_id);

			Ok(ScrollPage { records, next })
		})
	}

	fn fetch<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Payload>>> {
		Box::pin(async move {
			let mut out = Vec::new();

			for chunk in ids.chunks(FETCH_PAGE_SIZE as usize) {
				let mut offset: Option<PointId> = None;

				loop {
					let mut request = ScrollPointsBuilder::new(self.store.collection.clone())
						.filter(Filter::should(id_conditions(chunk)))
						.limit(FETCH_PAGE_SIZE)
						.with_payload(true);

					if let Some(offset) = offset.take() {
						request = request.offset(offset);
					}

					let response = self.store.client.scroll(request).await?;

					out.extend(response.result.into_iter().map(|point| to_payload(point.payload)));

					match response.next_page_offset {
						Some(next) => offset = Some(next),
						None => break,
					}
				}
			}

			Ok(out)
		})
	}
}

/// Payload `id` conditions for `ids`, one per value kind a record may store its id as.
///
/// A keyword match never matches an integer payload, so ids that parse as `i64` get a second,
/// integer condition. Callers combine them with `should` or `must_not`.
fn id_conditions(ids: &[String]) -> Vec<Condition> {
	let numeric = ids.iter().filter_map(|id| id.parse::<i64>().ok()).collect::<Vec<_>>();
	let mut conditions = vec![Condition::matches(ID_FIELD, ids.to_vec())];

	if !numeric.is_empty() {
		conditions.push(Condition::matches(ID_FIELD, numeric));
	}

	conditions
}

fn include_fields(fields: &[String]) -> SelectorOptions {
	SelectorOptions::Include(PayloadIncludeSelector { fields: fields.to_vec() })
}

fn payload_id(payload: &HashMap<String, QdrantValue>) -> Option<String> {
	match payload.get(ID_FIELD)?.kind.as_ref()? {
		Kind::StringValue(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
		Kind::IntegerValue(value) => Some(value.to_string()),
		_ => None,
	}
}

fn point_id_text(point_id: Option<PointId>) -> Option<String> {
	match point_id?.point_id_options? {
		PointIdOptions::Num(num) => Some(num.to_string()),
		PointIdOptions::Uuid(uuid) => Some(uuid),
	}
}

fn to_payload(payload: HashMap<String, QdrantValue>) -> Payload {
	payload.iter().map(|(key, value)| (key.clone(), to_json(value))).collect()
}

fn to_json(value: &QdrantValue) -> Value {
	match value.kind.as_ref() {
		None | Some(Kind::NullValue(_)) => Value::Null,
		Some(Kind::BoolValue(flag)) => Value::Bool(*flag),
		Some(Kind::IntegerValue(number)) => Value::from(*number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(*number).map_or(Value::Null, Value::Number),
		Some(Kind::StringValue(text)) => Value::String(text.clone()),
		Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
		Some(Kind::StructValue(object)) => Value::Object(
			object
				.fields
				.iter()
				.map(|(key, value)| (key.clone(), to_json(value)))
				.collect::<Map<_, _>>(),
		),
	}
}
