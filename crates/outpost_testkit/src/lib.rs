//! # Outpost Testkit
//!
//! Test utilities for Outpost.
//!
//! This crate provides:
//! - A scripted sync server behind the engine's HTTP seam
//! - Definition and response fixtures
//! - A temporary client environment
//! - Property-based generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use outpost_testkit::prelude::*;
//!
//! #[test]
//! fn bootstrap() {
//!     let env = TestEnv::new();
//!     env.server.reply_commands(&bootstrap_response(&[tracker_schema()], &[]));
//!     env.server.reply_commands(&empty_response());
//!     assert!(env.sync(SyncDirection::TwoWay).succeeded());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
    pub use outpost_sync_protocol::{Command, DmlOp, SyncDirection};
}

pub use fixtures::*;
pub use generators::*;
pub use server::*;
