pub mod field;
pub mod grid2d;

pub use field::FlowField;
pub use grid2d::{DomainBounds2D, Grid2D, GridDimensions2D, GridSpacing};
