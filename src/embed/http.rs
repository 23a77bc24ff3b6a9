use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::error::EmbeddingError;
use crate::store::EmbeddingVector;

/// HTTP 嵌入服务配置
#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    /// 服务地址
    pub endpoint: String,
    /// 模型名称，不填时由服务决定
    pub model: Option<String>,
    /// 输出向量维度
    pub dimensions: usize,
    /// Bearer token
    pub api_key: Option<String>,
    /// 请求超时
    pub timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_image: Option<String>,
    embedding_config: EmbeddingConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingConfig {
    output_embedding_length: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// 通过 JSON HTTP 接口调用的多模态嵌入服务
///
/// 请求体为 `{"inputText": ...}` 或 `{"inputImage": <base64>}`，响应体为 `{"embedding": [...]}`。
/// 不做重试，失败由调用方记录。
pub struct HttpEmbedder {
    client: Client,
    config: HttpEmbedderConfig,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn request(&self, body: &EmbeddingRequest<'_>) -> Result<EmbeddingVector, EmbeddingError> {
        let mut request = self.client.post(&self.config.endpoint).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status: status.as_u16(), body });
        }

        let text = response.text().await?;
        let response: EmbeddingResponse = serde_json::from_str(&text)
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        if response.embedding.len() != self.config.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimensions,
                actual: response.embedding.len(),
            });
        }
        Ok(response.embedding)
    }

    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig { output_embedding_length: self.config.dimensions }
    }
}

impl Embedder for HttpEmbedder {
    async fn embed_image(&self, image: &[u8]) -> Result<EmbeddingVector, EmbeddingError> {
        debug!("请求图片嵌入: {} 字节", image.len());
        let body = EmbeddingRequest {
            model_id: self.config.model.as_deref(),
            input_text: None,
            input_image: Some(STANDARD.encode(image)),
            embedding_config: self.embedding_config(),
        };
        self.request(&body).await
    }

    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        debug!("请求文本嵌入: {}", text);
        let body = EmbeddingRequest {
            model_id: self.config.model.as_deref(),
            input_text: Some(text),
            input_image: None,
            embedding_config: self.embedding_config(),
        };
        self.request(&body).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_body() {
        let body = EmbeddingRequest {
            model_id: None,
            input_text: Some("a red car"),
            input_image: None,
            embedding_config: EmbeddingConfig { output_embedding_length: 384 },
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "inputText": "a red car",
                "embeddingConfig": { "outputEmbeddingLength": 384 },
            })
        );
    }

    #[test]
    fn test_image_is_base64() {
        let body = EmbeddingRequest {
            model_id: Some("titan-embed-image-v1"),
            input_text: None,
            input_image: Some(STANDARD.encode([0xffu8, 0xd8, 0xff])),
            embedding_config: EmbeddingConfig { output_embedding_length: 3 },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["inputImage"], "/9j/");
        assert_eq!(value["modelId"], "titan-embed-image-v1");
        assert!(value.get("inputText").is_none());
    }
}
