//! Persistence layer — session state for in-flight surveys.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlSessionStore;
pub use memory::InMemorySessionStore;
pub use traits::SessionStore;
