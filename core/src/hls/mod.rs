//! HLS packaging, just-in-time key delivery, and artifact lifecycle
//!
//! The packager turns watermarked PCM into a directory of AES-128
//! encrypted segments plus a manifest; the alias store releases segment
//! keys only to bound callers; the reaper bounds how long segments live
//! on disk.

pub mod alias;
pub mod packager;
pub mod reaper;
pub mod transcode;

pub use alias::{AliasResolution, KeyAliasStore};
pub use packager::PackagedRender;
