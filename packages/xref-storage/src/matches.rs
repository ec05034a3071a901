use sqlx::{Connection, PgConnection, PgExecutor, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{CollectionMatchCount, Match, NewMatch},
};
use xref_domain::{authz::Authz, record::RecordId};

const MATCH_COLUMNS: &str = "\
SELECT
	id,
	entity_id,
	document_id,
	collection_id,
	match_id,
	match_collection_id,
	score,
	created_at,
	updated_at
FROM matches";

/// Replaces every stored match of `source` with `matches`.
///
/// The delete and the insert run inside one transaction scope on `conn`. When `conn` already has
/// an open transaction this becomes a savepoint, so a failure rolls back only this record.
pub async fn replace_matches(
	conn: &mut PgConnection,
	source: &RecordId,
	collection_id: i64,
	matches: &[NewMatch],
) -> Result<u64> {
	let mut tx = conn.begin().await?;
	let now = OffsetDateTime::now_utc();

	delete_for_source(&mut *tx, source).await?;

	let inserted = insert_matches(&mut *tx, source, collection_id, matches, now).await?;

	tx.commit().await?;

	Ok(inserted)
}

pub async fn delete_for_source<'e, E>(executor: E, source: &RecordId) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = match source {
		RecordId::Entity(entity_id) =>
			sqlx::query("DELETE FROM matches WHERE entity_id = $1 AND document_id IS NULL")
				.bind(entity_id.as_str())
				.execute(executor)
				.await?,
		RecordId::Document(document_id) =>
			sqlx::query("DELETE FROM matches WHERE document_id = $1 AND entity_id IS NULL")
				.bind(*document_id)
				.execute(executor)
				.await?,
	};

	Ok(result.rows_affected())
}

pub async fn insert_matches<'e, E>(
	executor: E,
	source: &RecordId,
	collection_id: i64,
	matches: &[NewMatch],
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	if matches.is_empty() {
		return Ok(0);
	}

	let mut builder = QueryBuilder::<Postgres>::new(
		"\
INSERT INTO matches (
	id,
	entity_id,
	document_id,
	collection_id,
	match_id,
	match_collection_id,
	score,
	created_at,
	updated_at
) ",
	);

	builder.push_values(matches, |mut row, candidate| {
		row.push_bind(Uuid::new_v4())
			.push_bind(source.entity_id().map(str::to_string))
			.push_bind(source.document_id())
			.push_bind(collection_id)
			.push_bind(candidate.match_id.clone())
			.push_bind(candidate.match_collection_id)
			.push_bind(candidate.score)
			.push_bind(now)
			.push_bind(now);
	});

	let result = builder.build().execute(executor).await?;

	Ok(result.rows_affected())
}

pub async fn list_for_source<'e, E>(executor: E, source: &RecordId) -> Result<Vec<Match>>
where
	E: PgExecutor<'e>,
{
	let rows = match source {
		RecordId::Entity(entity_id) => sqlx::query_as::<_, Match>(&format!(
			"\
{MATCH_COLUMNS}
WHERE entity_id = $1 AND document_id IS NULL
ORDER BY score DESC NULLS LAST, match_id"
		))
		.bind(entity_id.as_str())
		.fetch_all(executor)
		.await?,
		RecordId::Document(document_id) => sqlx::query_as::<_, Match>(&format!(
			"\
{MATCH_COLUMNS}
WHERE document_id = $1 AND entity_id IS NULL
ORDER BY score DESC NULLS LAST, match_id"
		))
		.bind(*document_id)
		.fetch_all(executor)
		.await?,
	};

	Ok(rows)
}

/// Scored entity-sourced matches of `collection_id` that point into `other_id`, best score first.
///
/// Uses the same row filter as [`group_by_collection`], so a sheet never lists more rows than its
/// summary count.
pub async fn find_by_collection<'e, E>(
	executor: E,
	collection_id: i64,
	other_id: i64,
	limit: i64,
) -> Result<Vec<Match>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, Match>(&format!(
		"\
{MATCH_COLUMNS}
WHERE collection_id = $1
	AND document_id IS NULL
	AND match_collection_id = $2
	AND score IS NOT NULL
ORDER BY score DESC, id
LIMIT $3"
	))
	.bind(collection_id)
	.bind(other_id)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Match counts of `collection_id` per matched collection, largest first.
///
/// Self-collection matches and document-sourced rows are left out. Callers that are not admins
/// only see collections one of their roles can read; the rest are dropped silently.
pub async fn group_by_collection<'e, E>(
	executor: E,
	collection_id: i64,
	authz: &Authz,
) -> Result<Vec<CollectionMatchCount>>
where
	E: PgExecutor<'e>,
{
	let mut builder = QueryBuilder::<Postgres>::new(
		"\
SELECT
	c.collection_id,
	c.label,
	count(*) AS matches
FROM matches m
JOIN collections c ON c.collection_id = m.match_collection_id
WHERE m.collection_id = ",
	);

	builder.push_bind(collection_id);
	builder.push(
		"
	AND m.document_id IS NULL
	AND m.score IS NOT NULL
	AND c.deleted_at IS NULL
	AND m.match_collection_id <> ",
	);
	builder.push_bind(collection_id);

	push_visibility_filter(&mut builder, authz);

	builder.push(
		"
GROUP BY c.collection_id, c.label
ORDER BY matches DESC, c.collection_id",
	);

	let rows = builder.build_query_as::<CollectionMatchCount>().fetch_all(executor).await?;

	Ok(rows)
}

fn push_visibility_filter(builder: &mut QueryBuilder<'_, Postgres>, authz: &Authz) {
	if authz.is_admin {
		return;
	}

	builder.push(
		"
	AND EXISTS (
		SELECT 1
		FROM permissions p
		WHERE p.collection_id = m.match_collection_id
			AND p.deleted_at IS NULL
			AND p.read
			AND p.role_id = ANY(",
	);
	builder.push_bind(authz.role_ids());
	builder.push("))");
}
