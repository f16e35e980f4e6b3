// Service exports
pub mod import;
pub mod store;

pub use import::{load_export, parse_export, ImportError, ImportedData};
pub use store::{snapshot, AytoStore, MemoryStore, StoreError};
