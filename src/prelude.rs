//! Everything a request handler needs, in one import.
//!
//! ```ignore
//! use lsn_router::prelude::*;
//! ```

pub use crate::{
    LifecycleHook, LogPosition, NodeRole, PositionCache, ReadWriteRouter, ReplicationStatusSource,
    RequestContext, Result, RouterConfig, RouterError, ScalarQuery,
};
