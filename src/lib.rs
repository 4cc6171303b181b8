//! Tool dispatch and validated mutation over a simulated back-office
//! database.
//!
//! A suite (`hr`, `incident`, `smart_home`) is a catalog of tools. Finders
//! read the database document; managers run a validation cascade and then
//! write. Every call returns a JSON envelope string, never an error.

pub mod approval;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod schema;
pub mod session;
pub mod suites;
pub mod tools;
pub mod types;
pub mod validate;
