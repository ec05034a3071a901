pub mod excel;
pub mod index;
pub mod report;
pub mod session;
pub mod xref;

mod error;

pub use error::{Error, Result};
pub use index::QdrantIndex;
pub use report::{CollectionRef, DetailRow, DetailSheet, RecordCells, SummaryRow, XrefReport};
pub use session::{PgMatchReader, PgMatchWriter};
pub use xref::{CHECKPOINT_INTERVAL, XrefStats};

use std::{future::Future, pin::Pin, sync::Arc};

use qdrant_client::qdrant::{PointId, point_id::PointIdOptions};
use serde_json::{Map, Value};

use xref_config::Config;
use xref_domain::{authz::Authz, record::RecordRef, similarity::SimilarityQuery};
use xref_storage::{
	db::Db,
	models::{CollectionMatchCount, Match, NewMatch},
	qdrant::QdrantStore,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Raw index payload of one record.
pub type Payload = Map<String, Value>;

/// Read side of the search index.
pub trait RecordIndex
where
	Self: Send + Sync,
{
	/// Ranked candidates for a similarity query, best first.
	fn search<'a>(&'a self, query: &'a SimilarityQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>>;

	/// One page of the records owned by `collection_id`, of every record type.
	fn scroll<'a>(
		&'a self,
		collection_id: i64,
		cursor: Option<&'a ScrollCursor>,
		page_size: u32,
	) -> BoxFuture<'a, Result<ScrollPage>>;

	/// Payloads of the records with the given ids. Unknown ids are absent from the result.
	fn fetch<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Payload>>>;
}

/// Write side of the match store.
///
/// `replace` is atomic per record. Writes become durable at the next `checkpoint`; dropping a
/// writer discards everything written since the last one.
pub trait MatchWriter
where
	Self: Send,
{
	fn replace<'a>(
		&'a mut self,
		record: &'a RecordRef,
		matches: &'a [NewMatch],
	) -> BoxFuture<'a, Result<()>>;

	fn checkpoint(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Read side of the match store, as consumed by the report.
pub trait MatchReader
where
	Self: Send + Sync,
{
	fn collection(&self, collection_id: i64) -> BoxFuture<'_, Result<CollectionRef>>;

	fn group_by_collection<'a>(
		&'a self,
		collection_id: i64,
		authz: &'a Authz,
	) -> BoxFuture<'a, Result<Vec<CollectionMatchCount>>>;

	fn find_by_collection(
		&self,
		collection_id: i64,
		other_id: i64,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Match>>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
	pub match_id: String,
	pub score: Option<f64>,
	pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollCursor {
	Num(u64),
	Uuid(String),
}
impl ScrollCursor {
	pub fn from_point_id(point_id: PointId) -> Option<Self> {
		match point_id.point_id_options? {
			PointIdOptions::Num(num) => Some(Self::Num(num)),
			PointIdOptions::Uuid(uuid) => Some(Self::Uuid(uuid)),
		}
	}

	pub fn to_point_id(&self) -> PointId {
		match self {
			Self::Num(num) => PointId::from(*num),
			Self::Uuid(uuid) => PointId::from(uuid.clone()),
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
	pub records: Vec<Payload>,
	pub next: Option<ScrollCursor>,
}

pub struct XrefService {
	pub cfg: Config,
	pub db: Db,
	pub index: Arc<dyn RecordIndex>,
}
impl XrefService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		Self::with_index(cfg, db, Arc::new(QdrantIndex::new(qdrant)))
	}

	pub fn with_index(cfg: Config, db: Db, index: Arc<dyn RecordIndex>) -> Self {
		Self { cfg, db, index }
	}

	pub fn writer(&self) -> PgMatchWriter {
		PgMatchWriter::new(self.db.pool.clone())
	}

	pub fn reader(&self) -> PgMatchReader {
		PgMatchReader::new(self.db.pool.clone())
	}
}
