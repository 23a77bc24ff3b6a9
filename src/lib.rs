pub mod cli;
pub mod config;
mod db;
pub mod embed;
pub mod error;
pub mod ingest;
mod metrics;
pub mod normalize;
pub mod record;
pub mod retrieval;
pub mod storage;
pub mod store;
pub mod summarize;
pub mod utils;

pub use config::Opts;
pub use ingest::{IngestPipeline, IngestResult};
pub use retrieval::Retriever;
