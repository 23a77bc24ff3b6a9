use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::embed::HttpEmbedderConfig;
use crate::normalize::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_EDGE, ImageNormalizer};
use crate::store::Distance;
use crate::summarize::HttpSummarizerConfig;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "imembed", "imembed").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_config_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap_or(".imembed")
}

#[derive(Parser, Debug, Clone)]
pub struct NormalizeOptions {
    /// 图片最长边上限，超过时等比缩小
    #[arg(long, value_name = "PIXELS", default_value_t = DEFAULT_MAX_EDGE)]
    pub max_edge: u32,
    /// 归一化后的 JPEG 质量
    #[arg(long, value_name = "QUALITY", default_value_t = DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,
}

impl From<&NormalizeOptions> for ImageNormalizer {
    fn from(opts: &NormalizeOptions) -> Self {
        ImageNormalizer::new(opts.max_edge, opts.jpeg_quality)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// 多模态嵌入服务地址
    #[arg(long, value_name = "URL", env = "IMEMBED_EMBED_ENDPOINT", default_value = "http://127.0.0.1:8080/embed")]
    pub embed_endpoint: String,
    /// 嵌入模型名称
    #[arg(long, value_name = "MODEL", env = "IMEMBED_EMBED_MODEL")]
    pub embed_model: Option<String>,
    /// 嵌入服务鉴权 token
    #[arg(long, value_name = "TOKEN", env = "IMEMBED_EMBED_API_KEY", hide_env_values = true)]
    pub embed_api_key: Option<String>,
    /// 嵌入向量维度，图片和文本必须一致
    #[arg(long, value_name = "N", default_value_t = 1024)]
    pub dimensions: usize,
    /// 嵌入请求超时，单位为秒
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub embed_timeout: u64,
}

impl From<&EmbedOptions> for HttpEmbedderConfig {
    fn from(opts: &EmbedOptions) -> Self {
        HttpEmbedderConfig {
            endpoint: opts.embed_endpoint.clone(),
            model: opts.embed_model.clone(),
            dimensions: opts.dimensions,
            api_key: opts.embed_api_key.clone(),
            timeout: Duration::from_secs(opts.embed_timeout),
        }
    }
}

#[derive(Parser, Debug, Clone)]
pub struct StoreOptions {
    /// 集合名称
    #[arg(long, default_value = "images")]
    pub collection: String,
    /// 距离度量，必须与嵌入模型匹配
    #[arg(long, value_enum, default_value_t = Distance::Cosine)]
    pub metric: Distance,
}

#[derive(Parser, Debug, Clone)]
pub struct SummaryOptions {
    /// 视觉模型 chat completions 接口地址，不填则不生成总结
    #[arg(long, value_name = "URL", env = "IMEMBED_VISION_ENDPOINT")]
    pub vision_endpoint: Option<String>,
    /// 视觉模型鉴权 token
    #[arg(long, value_name = "TOKEN", env = "IMEMBED_VISION_API_KEY", hide_env_values = true)]
    pub vision_api_key: Option<String>,
    /// 视觉模型名称
    #[arg(long, value_name = "MODEL", default_value = "gpt-4o-mini")]
    pub vision_model: String,
    /// 交给视觉模型的最大图片数量
    #[arg(long, value_name = "N", default_value_t = 3)]
    pub max_images: usize,
    /// 总结最大 token 数
    #[arg(long, value_name = "N", default_value_t = 512)]
    pub max_tokens: u32,
}

impl SummaryOptions {
    pub fn config(&self) -> Option<HttpSummarizerConfig> {
        let endpoint = self.vision_endpoint.clone()?;
        Some(HttpSummarizerConfig {
            endpoint,
            model: self.vision_model.clone(),
            api_key: self.vision_api_key.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(60),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imembed", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imembed 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从对象存储导入图片到向量库
    Ingest(IngestCommand),
    /// 使用自然语言检索图片
    Search(SearchCommand),
    /// 显示向量库中的集合
    Info(InfoCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("imembed.db")
    }

    /// 返回暂存目录的路径
    pub fn staging(&self) -> PathBuf {
        self.path.join("staging")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
