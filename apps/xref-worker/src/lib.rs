use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use xref_domain::authz::Authz;
use xref_service::XrefService;
use xref_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = xref_cli::VERSION,
	rename_all = "kebab",
	styles = xref_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Cross-reference every indexed record of a collection.
	Xref {
		#[arg(long, value_name = "ID")]
		collection: i64,
	},
	/// Write the xref report of a collection as an xlsx workbook.
	Report {
		#[arg(long, value_name = "ID")]
		collection: i64,
		#[arg(long, short = 'o', value_name = "FILE")]
		output: PathBuf,
		/// Include every matched collection regardless of permissions.
		#[arg(long)]
		admin: bool,
		/// Role whose read permissions decide which matched collections are listed.
		#[arg(long = "role", value_name = "ID", conflicts_with = "admin")]
		roles: Vec<i64>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = xref_config::load(&args.config)?;

	init_tracing(&config);

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;
	let service = XrefService::new(config, db, qdrant);

	match args.command {
		Command::Xref { collection } => {
			let stats = service.xref_collection(collection).await?;

			tracing::info!(
				collection_id = collection,
				scanned = stats.scanned,
				skipped = stats.skipped,
				"Collection cross-referenced."
			);
		},
		Command::Report { collection, output, admin, roles } => {
			let authz = if admin { Authz::admin() } else { Authz::with_roles(roles) };
			let buffer = service.generate_excel(collection, &authz).await?;

			fs::write(&output, buffer.into_inner())
				.wrap_err_with(|| format!("Failed to write report to {}.", output.display()))?;

			tracing::info!(
				collection_id = collection,
				output = %output.display(),
				"Report written."
			);
		},
	}

	Ok(())
}

fn init_tracing(config: &xref_config::Config) {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).init();
}
