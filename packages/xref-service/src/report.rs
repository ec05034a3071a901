use std::{
	collections::{BTreeSet, HashMap},
	io::Cursor,
};

use crate::{MatchReader, RecordIndex, Result, XrefService, excel};
use xref_config::Config;
use xref_domain::{
	authz::Authz,
	links,
	record::{RecordId, RecordRef},
};

const SOURCE_URL_PROPERTY: &str = "sourceUrl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
	pub collection_id: i64,
	pub label: String,
}

/// Everything the spreadsheet renders, resolved ahead of time.
#[derive(Debug, Clone, PartialEq)]
pub struct XrefReport {
	pub collection: CollectionRef,
	pub summary: Vec<SummaryRow>,
	pub sheets: Vec<DetailSheet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
	pub collection_id: i64,
	pub label: String,
	pub url: String,
	pub matches: i64,
	pub sheet_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailSheet {
	pub name: String,
	pub source_label: String,
	pub match_label: String,
	pub rows: Vec<DetailRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailRow {
	pub score: Option<f64>,
	pub source: RecordCells,
	pub matched: RecordCells,
}

/// Display values of one side of a match row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCells {
	pub name: String,
	pub url: String,
	pub schema_label: String,
	pub countries: String,
	pub source_url: Option<String>,
}
impl RecordCells {
	fn new(record: &RecordRef, cfg: &Config) -> Self {
		let id = match &record.id {
			RecordId::Entity(id) => id.clone(),
			RecordId::Document(id) => id.to_string(),
		};
		let schema = record.schema.as_deref().unwrap_or(record.record_type.as_str());
		let schema_label = cfg.schemata.get(schema).cloned().unwrap_or_else(|| schema.to_string());
		let source_urls = record.property_values(SOURCE_URL_PROPERTY);

		Self {
			name: record.title.clone().unwrap_or_else(|| id.clone()),
			url: links::entity_url(&cfg.report.ui_base_url, &id),
			schema_label,
			countries: record.countries.join(", ").to_uppercase(),
			source_url: (!source_urls.is_empty()).then(|| source_urls.join(", ")),
		}
	}
}

/// Resolves the summary and every detail sheet of `collection_id` as seen by `authz`.
pub async fn assemble(
	reader: &dyn MatchReader,
	index: &dyn RecordIndex,
	cfg: &Config,
	collection_id: i64,
	authz: &Authz,
) -> Result<XrefReport> {
	let collection = reader.collection(collection_id).await?;
	let counts = reader.group_by_collection(collection_id, authz).await?;
	let mut summary = Vec::with_capacity(counts.len());
	let mut sheets = Vec::with_capacity(counts.len());

	for count in counts {
		let sheet_name = links::sheet_name(count.collection_id, &count.label);
		let limit = cfg.report.max_matches_per_sheet;
		let matches = reader.find_by_collection(collection_id, count.collection_id, limit).await?;
		let ids = matches
			.iter()
			.filter_map(|row| row.entity_id.clone())
			.chain(matches.iter().map(|row| row.match_id.clone()))
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect::<Vec<_>>();
		let records = load_records(index, &ids).await?;
		let mut rows = Vec::with_capacity(matches.len());

		for row in &matches {
			let source = row.entity_id.as_deref().and_then(|id| records.get(id));
			let matched = records.get(row.match_id.as_str());
			let (Some(source), Some(matched)) = (source, matched) else {
				tracing::debug!(
					collection_id,
					match_id = row.match_id.as_str(),
					"Skipping match row with unindexed records."
				);

				continue;
			};

			rows.push(DetailRow {
				score: row.score,
				source: RecordCells::new(source, cfg),
				matched: RecordCells::new(matched, cfg),
			});
		}

		summary.push(SummaryRow {
			collection_id: count.collection_id,
			label: count.label.clone(),
			url: links::collection_url(&cfg.report.ui_base_url, count.collection_id),
			matches: count.matches,
			sheet_name: sheet_name.clone(),
		});
		sheets.push(DetailSheet {
			name: sheet_name,
			source_label: collection.label.clone(),
			match_label: count.label,
			rows,
		});
	}

	Ok(XrefReport { collection, summary, sheets })
}

impl XrefService {
	/// Renders the xref report of `collection_id` into an in-memory workbook positioned at 0.
	pub async fn generate_excel(
		&self,
		collection_id: i64,
		authz: &Authz,
	) -> Result<Cursor<Vec<u8>>> {
		let reader = self.reader();
		let report =
			assemble(&reader, self.index.as_ref(), &self.cfg, collection_id, authz).await?;
		let buffer = excel::render(&report)?;

		tracing::info!(
			collection_id,
			sheets = report.sheets.len(),
			bytes = buffer.len(),
			"Xref report generated."
		);

		Ok(Cursor::new(buffer))
	}
}

async fn load_records(
	index: &dyn RecordIndex,
	ids: &[String],
) -> Result<HashMap<String, RecordRef>> {
	if ids.is_empty() {
		return Ok(HashMap::new());
	}

	let payloads = index.fetch(ids).await?;
	let mut records = HashMap::with_capacity(payloads.len());

	for payload in &payloads {
		match RecordRef::from_payload(payload) {
			Ok(record) =>
				if let RecordId::Entity(id) = &record.id {
					records.insert(id.clone(), record);
				},
			Err(err) => tracing::warn!(error = %err, "Skipping malformed indexed record."),
		}
	}

	Ok(records)
}
