pub mod collections;
pub mod db;
pub mod matches;
pub mod models;
pub mod qdrant;
pub mod schema;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
