pub mod record_store;
pub mod utils;

pub use record_store::{compile, CompiledQuery, PgRecordStore};
