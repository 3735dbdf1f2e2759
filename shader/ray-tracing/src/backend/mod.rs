mod naive;
pub use naive::*;
