pub mod core;
pub mod marks;
pub mod reports;
pub mod store;
pub mod students;
pub mod subjects;
