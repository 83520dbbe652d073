pub mod artifact;
pub mod bcp;
pub mod context;
pub mod dex;
pub mod error;
pub mod evaluator;
pub mod location;
pub mod logging;
pub mod resolver;
pub mod state;

pub use context::ClassLoaderContext;
pub use error::{OatscopeError, Result};
pub use resolver::{ArtifactDescriptors, ArtifactResolver};
pub use state::{PlatformSnapshot, PlatformState, RuntimeOptions};
