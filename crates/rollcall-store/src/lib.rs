//! rollcall-store: Durable attendance log.
//!
//! A `RecordStore` keeps the full record collection as one JSON document
//! behind a string key-value backend (`SqliteStore` on disk, `MemoryStore`
//! for tests).

pub mod kv;
pub mod records;

pub use kv::{KeyValueStore, MemoryStore, SqliteStore, StoreError};
pub use records::{RecordStore, RecordStoreError, RECORDS_KEY};
