//! CLI commands implementation

pub mod init;
pub mod query;
pub mod status;
pub mod worker;

pub use init::*;
pub use query::*;
pub use status::*;
pub use worker::*;
