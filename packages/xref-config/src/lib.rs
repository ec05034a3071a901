mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Postgres, Qdrant, Report, Service, Storage, Xref};

use std::{fs, path::Path};

pub const MAX_SCAN_PAGE_SIZE: u32 = 10_000;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.log_level", &cfg.service.log_level),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("storage.qdrant.collection", &cfg.storage.qdrant.collection),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.xref.scan_page_size == 0 || cfg.xref.scan_page_size > MAX_SCAN_PAGE_SIZE {
		return Err(Error::Validation {
			message: format!("xref.scan_page_size must be in the range 1-{MAX_SCAN_PAGE_SIZE}."),
		});
	}
	if cfg.report.max_matches_per_sheet == 0 {
		return Err(Error::Validation {
			message: "report.max_matches_per_sheet must be greater than zero.".to_string(),
		});
	}
	if !(cfg.report.ui_base_url.starts_with("http://")
		|| cfg.report.ui_base_url.starts_with("https://"))
	{
		return Err(Error::Validation {
			message: "report.ui_base_url must be an absolute http(s) URL.".to_string(),
		});
	}

	for (schema, label) in &cfg.schemata {
		if label.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("schemata.{schema} label must be non-empty."),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.report.ui_base_url.trim().trim_end_matches('/').to_string();

	cfg.report.ui_base_url = trimmed;
}
