pub mod error;
pub mod lsn;
pub mod types;

pub use error::{Result, RouterError};
pub use lsn::LogPosition;
pub use types::NodeRole;
