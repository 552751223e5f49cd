pub mod catalog;
pub mod course;
pub mod registry;
pub mod sheet;
pub mod z_table;

pub use catalog::{validate_catalog, CourseCatalog};
pub use course::{Course, CourseRow, GroupMapping, Meeting, PriceParams};
pub use registry::DataRegistry;
pub use z_table::ZScoreTable;
