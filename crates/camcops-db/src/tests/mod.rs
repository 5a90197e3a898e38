//! Scenario tests for the database layer.
//!
//! - `harness.rs`    - Shared databases and a sample `person` record
//! - `records.rs`    - Create, load, insert/update and dirty tracking
//! - `migration.rs`  - Table creation, column add/drop/retype, renames
//! - `ordering.rs`   - Threaded manager request ordering
//! - `encryption.rs` - SQLCipher keying, export and rekeying
//! - `opening.rs`    - Opening files, and reporting failure to open
//! - `fieldrefs.rs`  - FieldRef bindings to records, BLOBs and stored vars

mod fieldrefs;
mod migration;
