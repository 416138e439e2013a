/// Database model definitions.
pub mod models;
/// Final scores, subjects and account memberships storage.
pub mod score_store;
/// Storage abstraction layer for database operations.
pub mod storage;
