use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{debug, warn};
use serde_json::json;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{EmbedOptions, NormalizeOptions, Opts, StoreOptions, SummaryOptions};
use crate::embed::HttpEmbedder;
use crate::normalize::ImageNormalizer;
use crate::retrieval::Retriever;
use crate::store::{Hit, LocalStore};
use crate::summarize::{HttpSummarizer, SummaryImage, summarize_or_none};

const NO_SUMMARY: &str = "no summary available";

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub store: StoreOptions,
    #[command(flatten)]
    pub normalize: NormalizeOptions,
    #[command(flatten)]
    pub summary: SummaryOptions,
    /// 查询文本
    pub text: String,
    /// 返回的结果数量
    #[arg(short, value_name = "K", default_value_t = 5)]
    pub k: usize,
    /// 使用视觉模型总结检索结果
    #[arg(long)]
    pub summarize: bool,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let store = LocalStore::open(opts.conf_dir.database()).await?;
        let collection = store
            .get_or_create_collection(&self.store.collection, self.store.metric, self.embed.dimensions)
            .await?;
        let embedder = HttpEmbedder::new((&self.embed).into())?;

        let retriever = Retriever::new(Arc::new(embedder), Arc::new(collection));
        let hits = retriever.query(&self.text, self.k).await?;

        let summary = match self.summarize {
            true => Some(self.summarize_hits(opts, &hits).await.unwrap_or_else(|| NO_SUMMARY.to_string())),
            false => None,
        };

        print_result(&hits, summary.as_deref(), self.output_format)
    }
}

impl SearchCommand {
    async fn summarize_hits(&self, opts: &Opts, hits: &[Hit]) -> Option<String> {
        let Some(config) = self.summary.config() else {
            warn!("未配置视觉模型地址，跳过总结");
            return None;
        };
        let summarizer = match HttpSummarizer::new(config) {
            Ok(summarizer) => summarizer,
            Err(e) => {
                warn!("创建视觉模型客户端失败: {}", e);
                return None;
            }
        };

        let normalizer = ImageNormalizer::from(&self.normalize);
        let mut images = vec![];
        for hit in hits.iter().take(self.summary.max_images) {
            let path = opts.conf_dir.staging().join(&hit.identifier);
            let jpeg = match tokio::fs::read(&path).await {
                Ok(raw) => normalizer.normalize(&raw),
                Err(e) => {
                    debug!("读取暂存图片失败: {}: {}", path.display(), e);
                    continue;
                }
            };
            match jpeg {
                Ok(jpeg) => images.push(SummaryImage { identifier: hit.identifier.clone(), jpeg }),
                Err(e) => debug!("归一化图片失败: {}: {}", hit.identifier, e),
            }
        }

        summarize_or_none(&summarizer, &self.text, &images).await
    }
}

fn print_result(hits: &[Hit], summary: Option<&str>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = json!({
                "result": hits,
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Table => {
            for (i, hit) in hits.iter().enumerate() {
                println!("S{}\t{:.4}\t{}\t{}", i + 1, hit.distance, hit.identifier, hit.metadata.source_locator);
            }
            if let Some(summary) = summary {
                println!();
                println!("{}", summary);
            }
        }
    }
    Ok(())
}
