pub mod memory;
pub mod notion;
pub mod traits;

pub use memory::MemoryStore;
pub use notion::NotionStore;
pub use traits::{NewRecord, RecordPage, RecordStore, RecordUpdate, StoredRecord};
