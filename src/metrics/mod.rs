pub mod aggregate;
pub mod cost;
pub mod types;

pub use types::*;
