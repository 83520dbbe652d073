//! Artifact loading: headers and the opened-artifact handle.

pub mod header;
pub mod loader;

pub use header::{BootImageHeader, Header, OatHeader, VdexHeader};
pub use loader::{ArtifactSource, OatFile};
