pub mod config;
pub mod logging;

pub mod checksum;
pub mod conditional;
pub mod error;
pub mod operation;
pub mod request;
pub mod response;
pub mod resume_db;
pub mod resume_store;
pub mod retry;
pub mod storage;
pub mod transport;

pub use error::{DownloadError, StoreError};
pub use operation::{DownloadOperation, DownloadedFile, OperationConfig, OperationState};
pub use request::DownloadRequest;
