// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! restyle - hairstyle transformation job orchestrator
//!
//! This crate coordinates AI hairstyle transformations: it submits jobs to a
//! serverless GPU inference provider, mirrors each job in a local store and
//! reconciles the store from the provider's webhook while clients poll.
//!
//! # Architecture
//!
//! ```text
//! client → POST /transform → inference provider (async run)
//!                 │                    │
//!                 └─ PENDING row       └─→ POST /webhook → COMPLETED | FAILED
//! client ← poll GET /jobs/:id ←──────────── job store
//! ```

pub mod api;
pub mod assets;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod poller;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod submitter;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::poller::{PollState, StatusPoller};
    pub use crate::store::Store;
    pub use crate::submitter::{JobSubmitter, TransformRequest};
}
