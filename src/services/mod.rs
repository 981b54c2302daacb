pub mod generator; // Phase sequencing over planner and transformer
pub mod multi_dataset; // Concurrent planning of independent table families
pub mod transform; // Dialect registry and SQL rendering

pub use generator::*;
pub use multi_dataset::*;
pub use transform::*;
