use crate::{MatchWriter, RecordIndex, Result, ScrollCursor, SearchHit, XrefService};
use xref_domain::{record::RecordRef, similarity};
use xref_storage::{collections, models::NewMatch};

/// Number of scanned records between two checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XrefStats {
	pub scanned: u64,
	pub processed: u64,
	pub skipped: u64,
	pub match_rows: u64,
	pub checkpoints: u64,
}

/// Matches one record against the index and replaces its stored matches.
///
/// Returns the number of match rows written. A record with nothing to query on still has its old
/// matches removed.
pub async fn xref_item(
	index: &dyn RecordIndex,
	writer: &mut dyn MatchWriter,
	record: &RecordRef,
) -> Result<u64> {
	let hits = match similarity::build_query(record) {
		Some(query) => index.search(&query).await?,
		None => {
			tracing::debug!(record = %record.id, "Record has no query text.");

			Vec::new()
		},
	};
	let matches = hits.into_iter().map(new_match).collect::<Vec<_>>();

	writer.replace(record, &matches).await?;

	tracing::debug!(
		record = %record.id,
		record_type = record.record_type.as_str(),
		matches = matches.len(),
		"Record cross-referenced."
	);

	Ok(matches.len() as u64)
}

/// Cross-references every record the index holds for `collection_id`.
///
/// Records are processed one at a time in scroll order. The writer is checkpointed after every
/// [`CHECKPOINT_INTERVAL`] scanned records and once after the last one. Payloads that cannot be
/// turned into a record are skipped.
pub async fn xref_collection(
	index: &dyn RecordIndex,
	writer: &mut dyn MatchWriter,
	collection_id: i64,
	page_size: u32,
) -> Result<XrefStats> {
	let mut stats = XrefStats::default();
	let mut cursor: Option<ScrollCursor> = None;

	loop {
		let page = index.scroll(collection_id, cursor.as_ref(), page_size).await?;

		if page.records.is_empty() {
			break;
		}

		for payload in &page.records {
			stats.scanned += 1;

			match RecordRef::from_payload(payload) {
				Ok(record) => {
					stats.match_rows += xref_item(index, writer, &record).await?;
					stats.processed += 1;
				},
				Err(err) => {
					tracing::warn!(collection_id, error = %err, "Skipping malformed record.");

					stats.skipped += 1;
				},
			}

			if stats.scanned % CHECKPOINT_INTERVAL == 0 {
				writer.checkpoint().await?;

				stats.checkpoints += 1;

				tracing::info!(collection_id, scanned = stats.scanned, "Xref checkpoint.");
			}
		}

		match page.next {
			Some(next) => cursor = Some(next),
			None => break,
		}
	}

	writer.checkpoint().await?;

	stats.checkpoints += 1;

	Ok(stats)
}

impl XrefService {
	/// Cross-references a single record and commits the result.
	pub async fn xref_item(&self, record: &RecordRef) -> Result<u64> {
		let mut writer = self.writer();
		let rows = xref_item(self.index.as_ref(), &mut writer, record).await?;

		writer.checkpoint().await?;

		Ok(rows)
	}

	pub async fn xref_collection(&self, collection_id: i64) -> Result<XrefStats> {
		collections::get_collection(&self.db.pool, collection_id).await?;

		tracing::info!(collection_id, "Xref started.");

		let mut writer = self.writer();
		let stats = xref_collection(
			self.index.as_ref(),
			&mut writer,
			collection_id,
			self.cfg.xref.scan_page_size,
		)
		.await?;

		tracing::info!(
			collection_id,
			scanned = stats.scanned,
			processed = stats.processed,
			skipped = stats.skipped,
			match_rows = stats.match_rows,
			checkpoints = stats.checkpoints,
			"Xref finished."
		);

		Ok(stats)
	}
}

fn new_match(hit: SearchHit) -> NewMatch {
	NewMatch { match_id: hit.match_id, match_collection_id: hit.collection_id, score: hit.score }
}
