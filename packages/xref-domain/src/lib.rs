pub mod authz;
pub mod links;
pub mod record;
pub mod similarity;
