use std::{
	collections::{BTreeMap, HashMap},
	sync::{Arc, Mutex},
};

use serde_json::{Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use xref_config::{Config, Postgres, Qdrant, Report, Service, Storage, Xref};
use xref_domain::{
	authz::Authz,
	record::{RecordId, RecordRef},
	similarity::SimilarityQuery,
};
use xref_service::{
	BoxFuture, CollectionRef, DetailRow, Error, MatchReader, MatchWriter, Payload, RecordCells,
	RecordIndex, Result, ScrollCursor, ScrollPage, SearchHit, SummaryRow, XrefService, excel,
	report, xref,
};
use xref_storage::{
	collections,
	db::Db,
	matches,
	models::{CollectionMatchCount, Match, NewMatch},
};
use xref_testkit::TestDatabase;

#[derive(Default)]
struct FakeIndex {
	records: Vec<Payload>,
	hits: HashMap<String, Vec<SearchHit>>,
	failing_text: Option<String>,
	queries: Mutex<Vec<SimilarityQuery>>,
}
impl FakeIndex {
	fn with_records(records: Vec<Payload>) -> Self {
		Self { records, ..Default::default() }
	}

	fn hits_for(mut self, text: &str, hits: Vec<SearchHit>) -> Self {
		self.hits.insert(text.to_string(), hits);

		self
	}

	fn recorded_queries(&self) -> Vec<SimilarityQuery> {
		self.queries.lock().expect("Query log poisoned.").clone()
	}
}
impl RecordIndex for FakeIndex {
	fn search<'a>(&'a self, query: &'a SimilarityQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		self.queries.lock().expect("Query log poisoned.").push(query.clone());

		let result = if self.failing_text.as_deref() == Some(query.text.as_str()) {
			Err(Error::Index { message: "Index unavailable.".to_string() })
		} else {
			Ok(self.hits.get(&query.text).cloned().unwrap_or_default())
		};

		Box::pin(async move { result })
	}

	fn scroll<'a>(
		&'a self,
		collection_id: i64,
		cursor: Option<&'a ScrollCursor>,
		page_size: u32,
	) -> BoxFuture<'a, Result<ScrollPage>> {
		let owned = self
			.records
			.iter()
			.filter(|payload| payload.get("collection_id") == Some(&json!(collection_id)))
			.cloned()
			.collect::<Vec<_>>();
		let start = match cursor {
			Some(ScrollCursor::Num(offset)) => *offset as usize,
			_ => 0,
		};
		let end = (start + page_size as usize).min(owned.len());
		let records = owned.get(start..end).map(<[Payload]>::to_vec).unwrap_or_default();
		let next = (end < owned.len()).then_some(ScrollCursor::Num(end as u64));

		Box::pin(async move { Ok(ScrollPage { records, next }) })
	}

	fn fetch<'a>(&'a self, ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Payload>>> {
		let found = self
			.records
			.iter()
			.filter(|payload| {
				let id = payload.get("id").and_then(Value::as_str);

				id.is_some_and(|id| ids.iter().any(|wanted| wanted == id))
			})
			.cloned()
			.collect();

		Box::pin(async move { Ok(found) })
	}
}

/// Buffers replaces until a checkpoint, like the Postgres session writer.
#[derive(Default)]
struct FakeWriter {
	committed: BTreeMap<String, Vec<NewMatch>>,
	pending: BTreeMap<String, Vec<NewMatch>>,
	replaces: u64,
	checkpoints_at: Vec<u64>,
}
impl MatchWriter for FakeWriter {
	fn replace<'a>(
		&'a mut self,
		record: &'a RecordRef,
		matches: &'a [NewMatch],
	) -> BoxFuture<'a, Result<()>> {
		self.pending.insert(record.id.to_string(), matches.to_vec());
		self.replaces += 1;

		Box::pin(async move { Ok(()) })
	}

	fn checkpoint(&mut self) -> BoxFuture<'_, Result<()>> {
		let pending = std::mem::take(&mut self.pending);

		self.committed.extend(pending);
		self.checkpoints_at.push(self.replaces);

		Box::pin(async move { Ok(()) })
	}
}

struct FakeReader {
	collection: CollectionRef,
	counts: Vec<CollectionMatchCount>,
	matches: Vec<Match>,
}
impl MatchReader for FakeReader {
	fn collection(&self, collection_id: i64) -> BoxFuture<'_, Result<CollectionRef>> {
		let result = if collection_id == self.collection.collection_id {
			Ok(self.collection.clone())
		} else {
			Err(Error::NotFound { message: format!("Collection {collection_id} not found.") })
		};

		Box::pin(async move { result })
	}

	fn group_by_collection<'a>(
		&'a self,
		_collection_id: i64,
		authz: &'a Authz,
	) -> BoxFuture<'a, Result<Vec<CollectionMatchCount>>> {
		let counts = if authz.is_admin { self.counts.clone() } else { Vec::new() };

		Box::pin(async move { Ok(counts) })
	}

	fn find_by_collection(
		&self,
		collection_id: i64,
		other_id: i64,
		limit: u32,
	) -> BoxFuture<'_, Result<Vec<Match>>> {
		let rows = self
			.matches
			.iter()
			.filter(|row| {
				row.collection_id == collection_id && row.match_collection_id == Some(other_id)
			})
			.take(limit as usize)
			.cloned()
			.collect();

		Box::pin(async move { Ok(rows) })
	}
}

fn person(id: &str, name: &str, collection_id: i64) -> Payload {
	payload(json!({"id": id, "$type": "Person", "name": name, "collection_id": collection_id}))
}

fn payload(value: Value) -> Payload {
	value.as_object().cloned().expect("Payload must be an object.")
}

fn hit(match_id: &str, collection_id: i64, score: f64) -> SearchHit {
	SearchHit {
		match_id: match_id.to_string(),
		score: Some(score),
		collection_id: Some(collection_id),
	}
}

fn stored_match(source: &str, match_id: &str, match_collection_id: i64, score: f64) -> Match {
	let now = OffsetDateTime::now_utc();

	Match {
		id: Uuid::new_v4(),
		entity_id: Some(source.to_string()),
		document_id: None,
		collection_id: 5,
		match_id: match_id.to_string(),
		match_collection_id: Some(match_collection_id),
		score: Some(score),
		created_at: now,
		updated_at: now,
	}
}

fn test_config() -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres { dsn: "postgres://localhost/xref".to_string(), pool_max_conns: 1 },
			qdrant: Qdrant {
				url: "http://127.0.0.1:6334".to_string(),
				collection: "records".to_string(),
			},
		},
		xref: Xref::default(),
		report: Report {
			ui_base_url: "https://search.example.org".to_string(),
			max_matches_per_sheet: 1_000,
		},
		schemata: BTreeMap::from([("LegalEntity".to_string(), "Legal entity".to_string())]),
	}
}

#[tokio::test]
async fn xref_item_replaces_matches_for_the_record() {
	let e1 = RecordRef::from_payload(&person("e1", "Jane Doe", 5)).expect("Record should parse.");
	let index = FakeIndex::with_records(Vec::new())
		.hits_for("Jane Doe", vec![hit("e2", 7, 9.1), hit("e3", 7, 4.0)]);
	let mut writer = FakeWriter::default();
	let rows = xref::xref_item(&index, &mut writer, &e1).await.expect("Xref should succeed.");

	assert_eq!(rows, 2);
	assert_eq!(writer.pending["entity:e1"], vec![
		NewMatch { match_id: "e2".to_string(), match_collection_id: Some(7), score: Some(9.1) },
		NewMatch { match_id: "e3".to_string(), match_collection_id: Some(7), score: Some(4.0) },
	]);

	let queries = index.recorded_queries();
	let query = &queries[0];

	assert_eq!(query.exclude_ids, vec!["e1".to_string()]);
	assert_eq!(query.exclude_types, vec!["document".to_string()]);
	assert_eq!(query.limit, 100);

	let empty = FakeIndex::default();
	let rows = xref::xref_item(&empty, &mut writer, &e1).await.expect("Xref should succeed.");

	assert_eq!(rows, 0);
	assert!(writer.pending["entity:e1"].is_empty());
}

#[tokio::test]
async fn repeated_hits_are_stored_as_separate_rows() {
	let e1 = RecordRef::from_payload(&person("e1", "Jane Doe", 5)).expect("Record should parse.");
	let index = FakeIndex::with_records(Vec::new())
		.hits_for("Jane Doe", vec![hit("e2", 7, 9.1), hit("e2", 7, 3.0)]);
	let mut writer = FakeWriter::default();
	let rows = xref::xref_item(&index, &mut writer, &e1).await.expect("Xref should succeed.");

	assert_eq!(rows, 2);
	assert_eq!(writer.pending["entity:e1"], vec![
		NewMatch { match_id: "e2".to_string(), match_collection_id: Some(7), score: Some(9.1) },
		NewMatch { match_id: "e2".to_string(), match_collection_id: Some(7), score: Some(3.0) },
	]);
}

#[tokio::test]
async fn document_records_are_keyed_by_document_id() {
	let doc = RecordRef::from_payload(&payload(json!({
		"id": "100",
		"$type": "document",
		"title": "Annual report",
		"collection_id": 5,
	})))
	.expect("Record should parse.");
	let index = FakeIndex::default().hits_for("Annual report", vec![hit("e8", 9, 7.7)]);
	let mut writer = FakeWriter::default();

	xref::xref_item(&index, &mut writer, &doc).await.expect("Xref should succeed.");

	assert_eq!(writer.pending["document:100"].len(), 1);
	assert!(index.recorded_queries()[0].exclude_ids.is_empty());
}

#[tokio::test]
async fn record_without_query_text_clears_its_matches() {
	let bare = RecordRef::from_payload(&payload(json!({
		"id": "e9",
		"$type": "Person",
		"collection_id": 5,
	})))
	.expect("Record should parse.");
	let index = FakeIndex::default();
	let mut writer = FakeWriter::default();

	writer.pending.insert("entity:e9".to_string(), vec![NewMatch {
		match_id: "e2".to_string(),
		match_collection_id: Some(7),
		score: Some(1.0),
	}]);

	let rows = xref::xref_item(&index, &mut writer, &bare).await.expect("Xref should succeed.");

	assert_eq!(rows, 0);
	assert!(writer.pending["entity:e9"].is_empty());
	assert!(index.recorded_queries().is_empty());
}

#[tokio::test]
async fn collection_scan_checkpoints_every_thousand_records() {
	let records = (0..2_500).map(|i| person(&format!("e{i}"), &format!("Person {i}"), 5)).collect();
	let index = FakeIndex::with_records(records);
	let mut writer = FakeWriter::default();
	let stats =
		xref::xref_collection(&index, &mut writer, 5, 300).await.expect("Scan should succeed.");

	assert_eq!(writer.checkpoints_at, vec![1_000, 2_000, 2_500]);
	assert_eq!(stats.scanned, 2_500);
	assert_eq!(stats.processed, 2_500);
	assert_eq!(stats.checkpoints, 3);
	assert_eq!(writer.committed.len(), 2_500);
	assert!(writer.pending.is_empty());
}

#[tokio::test]
async fn collection_scan_only_touches_its_own_records() {
	let index = FakeIndex::with_records(vec![
		person("e1", "Jane Doe", 5),
		person("e2", "Jane Doe", 7),
		person("e3", "John Roe", 5),
	])
	.hits_for("Jane Doe", vec![hit("e2", 7, 9.1)]);
	let mut writer = FakeWriter::default();
	let stats =
		xref::xref_collection(&index, &mut writer, 5, 500).await.expect("Scan should succeed.");

	assert_eq!(stats.scanned, 2);
	assert_eq!(stats.match_rows, 1);
	assert_eq!(writer.committed.keys().collect::<Vec<_>>(), vec!["entity:e1", "entity:e3"]);
	assert_eq!(writer.checkpoints_at, vec![2]);
}

#[tokio::test]
async fn rerunning_a_scan_is_idempotent() {
	let index = FakeIndex::with_records(vec![person("e1", "Jane Doe", 5), person("e3", "Roe", 5)])
		.hits_for("Jane Doe", vec![hit("e2", 7, 9.1), hit("e4", 9, 2.0)]);
	let mut writer = FakeWriter::default();

	xref::xref_collection(&index, &mut writer, 5, 1).await.expect("Scan should succeed.");

	let first = writer.committed.clone();

	xref::xref_collection(&index, &mut writer, 5, 1).await.expect("Scan should succeed.");

	assert_eq!(writer.committed, first);
}

#[tokio::test]
async fn malformed_records_are_skipped() {
	let index = FakeIndex::with_records(vec![
		person("e1", "Jane Doe", 5),
		payload(json!({"$type": "Person", "name": "No identity", "collection_id": 5})),
		payload(json!({"id": "abc", "$type": "document", "title": "Bad id", "collection_id": 5})),
		person("e3", "John Roe", 5),
	]);
	let mut writer = FakeWriter::default();
	let stats =
		xref::xref_collection(&index, &mut writer, 5, 10).await.expect("Scan should succeed.");

	assert_eq!(stats.scanned, 4);
	assert_eq!(stats.processed, 2);
	assert_eq!(stats.skipped, 2);
	assert_eq!(writer.committed.len(), 2);
}

#[tokio::test]
async fn index_failure_aborts_the_scan_without_partial_replace() {
	let mut index = FakeIndex::with_records(vec![
		person("e1", "Jane Doe", 5),
		person("e2", "Broken", 5),
		person("e3", "John Roe", 5),
	]);

	index.failing_text = Some("Broken".to_string());

	let mut writer = FakeWriter::default();
	let err = xref::xref_collection(&index, &mut writer, 5, 10)
		.await
		.expect_err("Scan should fail on index error.");

	assert!(matches!(err, Error::Index { .. }));
	assert!(writer.committed.is_empty());
	assert!(writer.checkpoints_at.is_empty());
	assert_eq!(writer.pending.keys().collect::<Vec<_>>(), vec!["entity:e1"]);
}

#[tokio::test]
async fn report_lists_visible_collections_and_indexed_rows() {
	let index = FakeIndex::with_records(vec![
		payload(json!({
			"id": "e1",
			"$type": "Person",
			"schema": "Person",
			"name": "Jane Doe",
			"countries": ["gb"],
			"properties": {
				"sourceUrl": ["https://registry.example.org/e1", "https://archive.example.org/e1"],
			},
			"collection_id": 5,
		})),
		payload(json!({
			"id": "e2",
			"$type": "LegalEntity",
			"schema": "LegalEntity",
			"collection_id": 7,
		})),
		person("e4", "J. Doe", 9),
	]);
	let reader = FakeReader {
		collection: CollectionRef { collection_id: 5, label: "Registry".to_string() },
		counts: vec![
			CollectionMatchCount { collection_id: 7, label: "Sanctions".to_string(), matches: 2 },
			CollectionMatchCount {
				collection_id: 9,
				label: "Leaks: 2024/Q1".to_string(),
				matches: 1,
			},
		],
		matches: vec![
			stored_match("e1", "e2", 7, 9.1),
			stored_match("e1", "e3", 7, 4.0),
			stored_match("e1", "e4", 9, 3.3),
		],
	};
	let cfg = test_config();
	let built = report::assemble(&reader, &index, &cfg, 5, &Authz::admin())
		.await
		.expect("Report should assemble.");

	assert_eq!(built.summary, vec![
		SummaryRow {
			collection_id: 7,
			label: "Sanctions".to_string(),
			url: "https://search.example.org/collections/7".to_string(),
			matches: 2,
			sheet_name: "7. Sanctions".to_string(),
		},
		SummaryRow {
			collection_id: 9,
			label: "Leaks: 2024/Q1".to_string(),
			url: "https://search.example.org/collections/9".to_string(),
			matches: 1,
			sheet_name: "9. Leaks  2024 Q1".to_string(),
		},
	]);

	let sanctions = &built.sheets[0];

	assert_eq!(sanctions.source_label, "Registry");
	assert_eq!(sanctions.match_label, "Sanctions");
	// e3 is no longer indexed, so only one of the two stored rows renders.
	assert_eq!(sanctions.rows, vec![DetailRow {
		score: Some(9.1),
		source: RecordCells {
			name: "Jane Doe".to_string(),
			url: "https://search.example.org/entities/e1".to_string(),
			schema_label: "Person".to_string(),
			countries: "GB".to_string(),
			source_url: Some(
				"https://registry.example.org/e1, https://archive.example.org/e1".to_string(),
			),
		},
		matched: RecordCells {
			name: "e2".to_string(),
			url: "https://search.example.org/entities/e2".to_string(),
			schema_label: "Legal entity".to_string(),
			countries: String::new(),
			source_url: None,
		},
	}]);
	assert_eq!(built.sheets[1].rows.len(), 1);

	let bytes = excel::render(&built).expect("Report should render.");

	assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn report_for_caller_without_access_has_only_a_summary() {
	let reader = FakeReader {
		collection: CollectionRef { collection_id: 5, label: "Registry".to_string() },
		counts: vec![CollectionMatchCount {
			collection_id: 7,
			label: "Sanctions".to_string(),
			matches: 2,
		}],
		matches: vec![stored_match("e1", "e2", 7, 9.1)],
	};
	let cfg = test_config();
	let built = report::assemble(&reader, &FakeIndex::default(), &cfg, 5, &Authz::with_roles([3]))
		.await
		.expect("Report should assemble.");

	assert!(built.summary.is_empty());
	assert!(built.sheets.is_empty());
}

#[tokio::test]
async fn report_for_unknown_collection_fails() {
	let reader = FakeReader {
		collection: CollectionRef { collection_id: 5, label: "Registry".to_string() },
		counts: Vec::new(),
		matches: Vec::new(),
	};
	let cfg = test_config();
	let err = report::assemble(&reader, &FakeIndex::default(), &cfg, 6, &Authz::admin())
		.await
		.expect_err("Unknown collection should fail.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set XREF_PG_DSN to run."]
async fn service_persists_scan_and_renders_report() {
	let Some(base_dsn) = xref_testkit::env_dsn() else {
		eprintln!("Skipping service_persists_scan_and_renders_report; set XREF_PG_DSN to run.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let mut cfg = test_config();

	cfg.storage.postgres.dsn = test_db.dsn().to_string();

	let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	for (collection_id, label) in [(5, "Registry"), (7, "Sanctions")] {
		collections::upsert_collection(&db.pool, collection_id, label)
			.await
			.expect("Failed to insert collection.");
	}

	let index = FakeIndex::with_records(vec![
		person("e1", "Jane Doe", 5),
		person("e2", "Jane Doe", 7),
		person("e3", "J. Doe", 7),
	])
	.hits_for("Jane Doe", vec![hit("e2", 7, 9.1), hit("e3", 7, 4.0)]);
	let service = XrefService::with_index(cfg, db, Arc::new(index));
	let stats = service.xref_collection(5).await.expect("Scan should succeed.");

	assert_eq!(stats.match_rows, 2);

	let source = RecordId::Entity("e1".to_string());
	let rows = matches::list_for_source(&service.db.pool, &source).await.expect("Failed to list.");

	assert_eq!(rows.iter().map(|row| row.score).collect::<Vec<_>>(), vec![Some(9.1), Some(4.0)]);

	// A rerun must leave the same rows behind.
	service.xref_collection(5).await.expect("Scan should succeed.");

	let rerun = matches::list_for_source(&service.db.pool, &source).await.expect("Failed to list.");

	assert_eq!(rerun.len(), 2);

	let buffer =
		service.generate_excel(5, &Authz::admin()).await.expect("Report should generate.");

	assert_eq!(buffer.position(), 0);
	assert!(buffer.get_ref().starts_with(b"PK"));
	assert!(matches!(
		service.generate_excel(404, &Authz::admin()).await,
		Err(Error::NotFound { .. })
	));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
