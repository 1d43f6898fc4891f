//! Artifact naming and serialization.
//!
//! - [`sanitize`]: sheet name to filesystem-safe token
//! - [`writer`]: one delimited-text artifact per sheet, staged then renamed into place

pub mod sanitize;
pub mod writer;

pub use sanitize::sanitize;
pub use writer::{ArtifactWriter, StagedArtifact};
