/// Read-only access to quiz content and user identity.
pub mod content;
/// Key/value persistence for session snapshots.
pub mod session_store;
/// Storage abstraction layer shared by the backends.
pub mod storage;
