use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Match {
	pub id: Uuid,
	pub entity_id: Option<String>,
	pub document_id: Option<i64>,
	pub collection_id: i64,
	pub match_id: String,
	pub match_collection_id: Option<i64>,
	pub score: Option<f64>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// One candidate hit, before it is stamped with its source record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
	pub match_id: String,
	pub match_collection_id: Option<i64>,
	pub score: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Collection {
	pub collection_id: i64,
	pub label: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub deleted_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Permission {
	pub permission_id: Uuid,
	pub role_id: i64,
	pub collection_id: i64,
	pub read: bool,
	pub write: bool,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub deleted_at: Option<OffsetDateTime>,
}

/// Row of the grouped summary: a matched collection and how many matches point into it.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CollectionMatchCount {
	pub collection_id: i64,
	pub label: String,
	pub matches: i64,
}
