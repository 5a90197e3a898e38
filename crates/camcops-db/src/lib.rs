//! Camcops-db: threaded, optionally encrypted SQLite access for CamCOPS.
//!
//! Provides a [`DatabaseManager`] that owns one SQLCipher connection, either
//! on the calling thread or on a dedicated worker thread, plus a small
//! active-record layer ([`DatabaseObject`]) that builds and migrates its own
//! tables.
//!
//! # Core Invariants
//!
//! 1. **One Connection**: every statement for a database runs on the single
//!    connection owned by its manager
//! 2. **FIFO**: in threaded mode, requests execute in submission order
//! 3. **Additive Migration**: declared fields are added or retyped, never
//!    silently dropped unless the caller asks for a rebuild to do so
//! 4. **Schema Errors Are Fatal**: a contradictory table declaration yields
//!    [`DatabaseError::SchemaContractViolation`]
//!
//! # Architecture
//!
//! ```text
//! DatabaseObject / Blob / StoredVarStore
//!         |
//!   DatabaseManager --(direct)--> Connection
//!         |
//!      (threaded)
//!         v
//!   DatabaseWorkerThread --> Connection
//! ```
//!
//! [`FieldRef`] sits on top and gives editors a uniform, observable handle
//! on any one value.

pub mod blob;
pub mod driver;
pub mod encryption;
pub mod error;
pub mod field;
pub mod fieldref;
pub mod manager;
pub mod object;
pub mod query_result;
pub mod request;
pub mod schema;
pub mod sqlargs;
pub mod stored_var;
pub mod value;
pub mod worker;

#[cfg(test)]
mod tests;

pub use blob::Blob;
pub use driver::{exec_query, ConnectionFactory, MemoryDriver, SqlCipherDriver};
pub use encryption::encrypt_plain_database_in_place;
pub use error::{DatabaseError, DatabaseResult};
pub use field::{Field, FieldType};
pub use fieldref::{FieldRef, FieldRefEvent, FieldRefPtr, FieldRefSignal, Originator, SubscriptionId};
pub use manager::DatabaseManager;
pub use object::{DatabaseObject, DatabaseObjectPtr, ObjectOptions};
pub use query_result::{FetchMode, QueryResult};
pub use request::ThreadedQueryRequest;
pub use sqlargs::{OrderBy, SqlArgs, WhereConditions};
pub use stored_var::StoredVarStore;
pub use value::{Value, Version};
pub use worker::DatabaseWorkerThread;
