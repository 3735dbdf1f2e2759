mod device;
mod error;
mod pipeline;
mod sbt;
mod ty;

pub use device::*;
pub use error::*;
pub use pipeline::*;
pub use sbt::*;
pub use ty::*;
