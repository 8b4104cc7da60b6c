pub mod dataset;
pub mod inspection;
pub mod models;
pub mod report;
