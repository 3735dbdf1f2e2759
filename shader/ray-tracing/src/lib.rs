use std::sync::Arc;

use strata_geometry::*;

mod api;
pub use api::*;
mod accelerator;
pub use accelerator::*;
mod backend;
pub use backend::*;
