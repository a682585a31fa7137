/// JSON file implementation of the record store.
pub mod file_store;
/// Persisted record definitions.
pub mod models;
/// Whole-collection persistence abstraction.
pub mod record_store;
/// Storage error types shared by every backend.
pub mod storage;
