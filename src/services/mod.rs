pub mod admin;
pub mod chat;
pub mod diary;
pub mod games;
pub mod memory_document;
pub mod repair;

pub use admin::{AdminService, SettingsUpdate};
pub use chat::ChatService;
pub use diary::DiaryService;
pub use games::GameService;
pub use memory_document::{MemoryDocument, MemoryStore, MEMORY_BACKUP_KEY};
pub use repair::{PurgeReport, RepairService, RetentionRange};
