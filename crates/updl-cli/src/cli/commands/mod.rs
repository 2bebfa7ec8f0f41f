//! CLI command handlers, one per file.

mod checksum;
mod fetch;
mod forget;
mod status;

pub use checksum::run_checksum;
pub use fetch::run_fetch;
pub use forget::run_forget;
pub use status::run_status;
