use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use indicatif::ProgressBar;
use log::{error, info};
use tokio::task::spawn_blocking;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{EmbedOptions, NormalizeOptions, Opts, StoreOptions};
use crate::embed::HttpEmbedder;
use crate::ingest::{IngestFailure, IngestPipeline, IngestResult, IngestStage};
use crate::record::{build_records, derive_identifier};
use crate::storage::{LocalObjectStore, ObjectStore, filter_image_keys, stage_objects};
use crate::store::LocalStore;
use crate::utils::pb_style;
use crate::{metrics, utils};

#[derive(Parser, Debug, Clone)]
pub struct IngestCommand {
    #[command(flatten)]
    pub normalize: NormalizeOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub store: StoreOptions,
    /// 对象存储根目录，每个子目录为一个 bucket
    pub root: PathBuf,
    /// bucket 名称
    pub bucket: String,
    /// 只导入以此开头的 key
    #[arg(long, default_value = "")]
    pub prefix: String,
    /// 最多列出的 key 数量
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub max_keys: usize,
    /// 每个批次的图片数量
    #[arg(short, long, value_name = "SIZE", default_value = "32")]
    pub batch_size: NonZeroUsize,
    /// 批次内同时处理的图片数量，默认为 CPU 核心数
    #[arg(short = 'j', long, value_name = "N", default_value_t = default_concurrency())]
    pub concurrency: NonZeroUsize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
    /// 导入完成后推送指标到 prometheus pushgateway
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH")]
    pub prometheus_auth: Option<String>,
}

impl SubCommandExtend for IngestCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let objects = LocalObjectStore::new(&self.root);
        let keys = objects.list(&self.bucket, &self.prefix, self.max_keys).await?;
        let keys = filter_image_keys(keys);
        info!("共 {} 张图片待导入", keys.len());

        let pb = ProgressBar::new(keys.len() as u64).with_style(pb_style());
        pb.set_message("下载图片");
        let staged =
            stage_objects(&objects, &self.bucket, &keys, &opts.conf_dir.staging(), &pb).await?;
        pb.finish_and_clear();

        let records = build_records(staged.sources, staged.payloads)?;

        let store = LocalStore::open(opts.conf_dir.database()).await?;
        let collection = store
            .get_or_create_collection(&self.store.collection, self.store.metric, self.embed.dimensions)
            .await?;
        let embedder = HttpEmbedder::new((&self.embed).into())?;

        let pb = ProgressBar::new(records.len() as u64).with_style(pb_style());
        let pipeline = IngestPipeline::new(Arc::new(embedder), Arc::new(collection))
            .normalizer((&self.normalize).into())
            .concurrency(self.concurrency)
            .progress(pb.clone());
        let mut result = pipeline.ingest(&records, self.batch_size).await;
        pb.finish_with_message("图片导入完成");

        for (source, reason) in staged.failed {
            result.record_failure(
                derive_identifier(&source),
                IngestFailure::new(IngestStage::Read, format!("{}: {}", source, reason)),
            );
        }

        print_result(&result, self.output_format)?;

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| "imembed".to_string());
            let auth = match &self.prometheus_auth {
                Some(s) => {
                    let (username, password) =
                        s.split_once(':').ok_or_else(|| anyhow!("认证信息格式错误"))?;
                    Some((username.to_string(), password.to_string()))
                }
                None => None,
            };
            let r = spawn_blocking(move || metrics::push(&url, &instance, auth)).await?;
            if let Err(e) = r {
                error!("推送指标失败: {e}");
            }
        }

        Ok(())
    }
}

fn default_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn print_result(result: &IngestResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            println!("成功: {}", result.succeeded.len());
            println!("失败: {}", result.failed.len());
            for (identifier, failure) in &result.failed {
                println!("{}\t{}\t{}", failure.stage, identifier, utils::truncate(&failure.reason, 120));
            }
        }
    }
    Ok(())
}
