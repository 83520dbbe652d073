pub mod dexopt;
pub mod filter;
pub mod isa;
pub mod optimization;

pub use dexopt::*;
pub use filter::*;
pub use isa::*;
pub use optimization::*;
