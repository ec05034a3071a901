use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{Collection, Permission},
};

pub async fn upsert_collection<'e, E>(executor: E, collection_id: i64, label: &str) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let label = label.trim();

	if label.is_empty() {
		return Err(Error::InvalidArgument("collection label must not be empty".to_string()));
	}

	sqlx::query(
		"\
INSERT INTO collections (collection_id, label)
VALUES ($1, $2)
ON CONFLICT (collection_id) DO UPDATE
SET
	label = EXCLUDED.label,
	updated_at = now(),
	deleted_at = NULL",
	)
	.bind(collection_id)
	.bind(label)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_collection<'e, E>(executor: E, collection_id: i64) -> Result<Collection>
where
	E: PgExecutor<'e>,
{
	sqlx::query_as::<_, Collection>(
		"\
SELECT
	collection_id,
	label,
	created_at,
	updated_at,
	deleted_at
FROM collections
WHERE collection_id = $1
	AND deleted_at IS NULL",
	)
	.bind(collection_id)
	.fetch_optional(executor)
	.await?
	.ok_or_else(|| Error::NotFound(format!("collection {collection_id}")))
}

/// Removes a collection row. Matches sourced from or pointing into it cascade away with it.
pub async fn delete_collection<'e, E>(executor: E, collection_id: i64) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM collections WHERE collection_id = $1")
		.bind(collection_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected())
}

pub async fn grant_read<'e, E>(executor: E, role_id: i64, collection_id: i64) -> Result<Permission>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Permission>(
		"\
INSERT INTO permissions (permission_id, role_id, collection_id, read, write)
VALUES ($1, $2, $3, true, false)
RETURNING
	permission_id,
	role_id,
	collection_id,
	read,
	write,
	created_at,
	updated_at,
	deleted_at",
	)
	.bind(Uuid::new_v4())
	.bind(role_id)
	.bind(collection_id)
	.fetch_one(executor)
	.await?;

	Ok(row)
}

pub async fn revoke_permission<'e, E>(executor: E, permission_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	let now = OffsetDateTime::now_utc();
	let result = sqlx::query(
		"\
UPDATE permissions
SET
	deleted_at = $2,
	updated_at = $2
WHERE permission_id = $1
	AND deleted_at IS NULL",
	)
	.bind(permission_id)
	.bind(now)
	.execute(executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(Error::NotFound(format!("active permission {permission_id}")));
	}

	Ok(())
}
