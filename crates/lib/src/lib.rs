//! convoy-lib: shared desired state and per-target rectification for convoy
//!
//! This crate provides the pieces the convoy server and CLI are built from:
//! - `gdm`: the Global Deployment Manifest and deployment model
//! - `etag` / `merge`: fingerprint + canary codec and the three-way putback merge
//! - `state`: the backing store for the GDM
//! - `queue`: per-target FIFO queues of rectifications, each with its own worker
//! - `rectify`: resolving rectifications against clusters
//! - `server` / `client`: the HTTP surface and a client for it

pub mod client;
pub mod config;
pub mod consts;
pub mod etag;
pub mod gdm;
pub mod merge;
pub mod platform;
pub mod queue;
pub mod rectify;
pub mod server;
pub mod state;
pub mod util;
