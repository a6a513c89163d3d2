pub mod json;
pub mod sigtypes;
pub mod wfdb;
