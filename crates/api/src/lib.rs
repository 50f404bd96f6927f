// Path: crates/api/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Capability traits consumed and exposed by Meridian storage components.
//!
//! Backends are modeled as narrow trait objects so that concrete
//! implementations (local Merkle stores, remote gRPC-style clients,
//! consensus feeds) stay swappable and mockable.

pub mod checkpoint;
pub mod client;
pub mod lifecycle;
pub mod policy;
pub mod roothash;
pub mod storage;
