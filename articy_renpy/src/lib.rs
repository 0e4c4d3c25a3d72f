pub mod model;
pub mod report;
pub mod resolve;
pub mod structure;
