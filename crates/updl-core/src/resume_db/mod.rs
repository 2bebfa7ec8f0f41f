//! Persistent resume records (SQLite via sqlx).
//!
//! One row per request key: the last response status and headers, and the
//! path of the file holding the bytes received so far.

pub mod db;
mod records;
pub mod types;

pub use db::*;
pub use types::*;
