use xref_domain::record::MalformedRecord;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error(transparent)]
	MalformedRecord(#[from] MalformedRecord),
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Index error: {message}")]
	Index { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Report error: {message}")]
	Report { message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Index { message: err.to_string() }
	}
}

impl From<rust_xlsxwriter::XlsxError> for Error {
	fn from(err: rust_xlsxwriter::XlsxError) -> Self {
		Self::Report { message: err.to_string() }
	}
}

impl From<xref_storage::Error> for Error {
	fn from(err: xref_storage::Error) -> Self {
		match err {
			xref_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			xref_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			xref_storage::Error::NotFound(message) => Self::NotFound { message },
			xref_storage::Error::Qdrant(inner) => Self::Index { message: inner.to_string() },
		}
	}
}
