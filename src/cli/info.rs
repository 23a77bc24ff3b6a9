use anyhow::Result;
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::store::LocalStore;

#[derive(Parser, Debug, Clone)]
pub struct InfoCommand {}

impl SubCommandExtend for InfoCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let store = LocalStore::open(opts.conf_dir.database()).await?;
        let collections = store.collections().await?;
        if collections.is_empty() {
            println!("暂无集合");
            return Ok(());
        }
        println!("集合\t度量\t维度\t数量");
        for info in collections {
            println!("{}\t{}\t{}\t{}", info.name, info.metric, info.dimensions, info.entries);
        }
        Ok(())
    }
}
