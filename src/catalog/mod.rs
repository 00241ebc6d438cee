//! Course catalog domain: the course record and the filter taxonomy

mod course;
pub mod filters;

pub use course::{Course, DurationBand};
pub use filters::{CourseFilter, FilterError, PriceRange};
