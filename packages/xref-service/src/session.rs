use sqlx::{PgPool, Postgres, Transaction};

use crate::{BoxFuture, CollectionRef, MatchReader, MatchWriter, Result};
use xref_domain::{authz::Authz, record::RecordRef};
use xref_storage::{
	collections, matches,
	models::{CollectionMatchCount, Match, NewMatch},
};

/// Postgres match writer.
///
/// Holds one session transaction that is opened on the first write and committed at every
/// checkpoint. Each record is replaced inside a savepoint of that transaction.
pub struct PgMatchWriter {
	pool: PgPool,
	tx: Option<Transaction<'static, Postgres>>,
}
impl PgMatchWriter {
	pub fn new(pool: PgPool) -> Self {
		Self { pool, tx: None }
	}
}
impl MatchWriter for PgMatchWriter {
	fn replace<'a>(
		&'a mut self,
		record: &'a RecordRef,
		matches: &'a [NewMatch],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let tx = match self.tx.take() {
				Some(tx) => tx,
				None => self.pool.begin().await?,
			};
			let tx = self.tx.insert(tx);

			matches::replace_matches(&mut **tx, &record.id, record.collection_id, matches).await?;

			Ok(())
		})
	}

	fn checkpoint(&mut self) -> BoxFuture<'_, Result<()>> {
		Box::pin(async move {
			if let Some(tx) = self.tx.take() {
				tx.commit().await?;
			}

			Ok(())
		})
	}
}

pub struct PgMatchReader {
	pool: PgPool,
}
impl PgMatchReader {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}
}
impl MatchReader for PgMatchReader {
	fn collection(&self, collection_id: i64) -> BoxFuture<'_, Result<CollectionRef>> {
		Box::pin(async move {
			let collection = collections::get_collection(&self.pool, collection_id).await?;

			Ok(CollectionRef { collection_id: collection.collection_id, label: collection.label })
		})
	}

	fn group_by_collection<'a>(
		&'a self,
		collection_id: i64,
		authz: &'a Authz,
	) -> BoxFuture<'a, Result<Vec<CollectionMatchCount>>> {
		Box::pin(async move {
			Ok(matches::group_by_collection(&self.pool, collection_id, authz).await?)
		})
	}

	fn find_by_collection(
		&self,
		collection_id: i64,
		other_id: i64,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Match>>> {
		Box::pin(async move {
			Ok(matches::find_by_collection(&self.pool, collection_id, other_id, i64::from(limit))
				.await?)
		})
	}
}
