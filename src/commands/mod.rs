//! CLI commands implementation

pub mod admin;
pub mod ask;
pub mod ingest;
pub mod init;
pub mod reprocess;
pub mod status;

pub use admin::*;
pub use ask::*;
pub use ingest::*;
pub use init::*;
pub use reprocess::*;
pub use status::*;
