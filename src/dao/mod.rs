/// Database model definitions.
pub mod models;
/// Quiz, session, roster and response storage.
pub mod quiz_store;
/// Storage abstraction layer for database operations.
pub mod storage;
