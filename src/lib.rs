//! Starts an RDS snapshot export to S3 whenever a snapshot lifecycle
//! notification calls for one.

pub mod app;
pub mod client;
pub mod conf;
pub mod error;
pub mod filter;
pub mod policy;
pub mod task;
