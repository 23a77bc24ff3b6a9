mod info;
mod ingest;
mod search;

pub use info::*;
pub use ingest::*;
pub use search::*;

use clap::ValueEnum;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>>;
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
