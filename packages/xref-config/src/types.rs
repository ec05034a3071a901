use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub xref: Xref,
	pub report: Report,
	/// Optional. Map keys are index schema names, values are human-readable labels.
	#[serde(default)]
	pub schemata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct Xref {
	/// Number of records fetched per scroll request during a collection scan.
	#[serde(default = "default_scan_page_size")]
	pub scan_page_size: u32,
}
impl Default for Xref {
	fn default() -> Self {
		Self { scan_page_size: default_scan_page_size() }
	}
}

#[derive(Debug, Deserialize)]
pub struct Report {
	/// Base URL of the user interface; collection and entity links are built under it.
	pub ui_base_url: String,
	#[serde(default = "default_max_matches_per_sheet")]
	pub max_matches_per_sheet: u32,
}

fn default_scan_page_size() -> u32 {
	500
}

fn default_max_matches_per_sheet() -> u32 {
	1_000
}
