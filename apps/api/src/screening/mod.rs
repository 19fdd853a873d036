//! CV Screening Pipeline: ingestion → analysis → aggregation → dispatch.

pub mod analyzer;
pub mod dispatch;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod queries;
pub mod report;
