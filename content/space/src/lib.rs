pub mod bvh;
pub mod utils;
