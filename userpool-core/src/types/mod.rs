mod identity;
mod lease;
mod primitives;

pub use identity::*;
pub use lease::*;
pub use primitives::*;
