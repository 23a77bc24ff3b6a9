use clap::Parser;
use imembed::Opts;
use imembed::cli::SubCommandExtend;
use imembed::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Ingest(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Info(config) => config.run(&opts).await,
    }
}
