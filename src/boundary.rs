pub mod table;

pub use table::{BoundaryConfig, BoundaryTable, RegType};
