pub mod detection;
pub mod job;
pub mod report;
pub mod response;
