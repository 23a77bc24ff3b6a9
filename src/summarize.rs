use std::fmt::Write;
use std::future::Future;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::SummarizationError;

/// 交给视觉模型的一张图片，`jpeg` 为归一化后的数据
#[derive(Debug, Clone)]
pub struct SummaryImage {
    pub identifier: String,
    pub jpeg: Vec<u8>,
}

/// 视觉模型总结服务
pub trait Summarizer: Send + Sync {
    /// 根据检索结果生成总结，文本中用 S1、S2…… 按顺序指代图片
    fn summarize(
        &self,
        query: &str,
        images: &[SummaryImage],
    ) -> impl Future<Output = Result<String, SummarizationError>> + Send;
}

/// 生成提示词，图片按检索顺序编号为 S1、S2……
pub fn build_prompt(query: &str, images: &[SummaryImage]) -> String {
    let mut prompt = format!(
        "The following {} images were retrieved for the query \"{}\", ordered from most to least relevant.\n",
        images.len(),
        query
    );
    for (i, image) in images.iter().enumerate() {
        let _ = writeln!(prompt, "S{}: {}", i + 1, image.identifier);
    }
    prompt.push_str(
        "Summarize what the images show and how they relate to the query. \
         Refer to each image by its label (S1, S2, ...).",
    );
    prompt
}

/// 总结失败时记录日志并返回 None，不影响检索结果
pub async fn summarize_or_none<S: Summarizer>(
    summarizer: &S,
    query: &str,
    images: &[SummaryImage],
) -> Option<String> {
    match summarizer.summarize(query, images).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            warn!("生成总结失败: {}", e);
            None
        }
    }
}

/// 视觉模型服务配置
#[derive(Debug, Clone)]
pub struct HttpSummarizerConfig {
    /// chat completions 接口地址
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// 兼容 OpenAI chat completions 接口的视觉模型
pub struct HttpSummarizer {
    client: Client,
    config: HttpSummarizerConfig,
}

impl HttpSummarizer {
    pub fn new(config: HttpSummarizerConfig) -> Result<Self, SummarizationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn request_body(&self, query: &str, images: &[SummaryImage]) -> Value {
        let mut content = vec![json!({ "type": "text", "text": build_prompt(query, images) })];
        for image in images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/jpeg;base64,{}", STANDARD.encode(&image.jpeg)) },
            }));
        }
        json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

impl Summarizer for HttpSummarizer {
    async fn summarize(&self, query: &str, images: &[SummaryImage]) -> Result<String, SummarizationError> {
        if images.is_empty() {
            return Err(SummarizationError::NoImages);
        }
        debug!("请求视觉模型总结: {} 张图片", images.len());

        let mut request = self.client.post(&self.config.endpoint).json(&self.request_body(query, images));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SummarizationError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummarizationError::Status { status: status.as_u16(), body });
        }

        let text = response.text().await?;
        let response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| SummarizationError::MalformedResponse(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| SummarizationError::MalformedResponse("响应中没有文本".to_string()))
    }
}
