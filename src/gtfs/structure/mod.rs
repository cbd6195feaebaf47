pub mod objects;
pub mod realtime;
mod serde_helpers;

pub use objects::*;
