pub mod geometry;
pub mod measurement;
pub mod region;

pub use geometry::{BoundingBox, Line};
pub use measurement::{Measurement, MeasurementError};
pub use region::{validate_name, Region};
