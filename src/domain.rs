pub mod field;
pub mod hierarchy;
pub mod index_box;

pub use field::{Centering, MultiField};
pub use hierarchy::LevelHierarchy;
pub use index_box::{IndexBox, IntVect};
