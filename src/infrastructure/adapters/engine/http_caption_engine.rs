//! HTTP Caption Engine - 调用外部描述服务
//!
//! 外部 API:
//! POST http://localhost:8000/api/caption
//! Request: multipart/form-data, 字段 `image`
//! Response: {"caption": "..."}

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::application::ports::{CaptionEnginePort, CaptionRequest, EngineError};

#[derive(Debug, Deserialize)]
struct CaptionHttpResponse {
    caption: String,
}

/// HTTP 引擎配置
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    /// 服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpEngineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 描述引擎
pub struct HttpCaptionEngine {
    client: Client,
    config: HttpEngineConfig,
}

impl HttpCaptionEngine {
    pub fn new(config: HttpEngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::NetworkError(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn caption_url(&self) -> String {
        format!("{}/api/caption", self.config.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }
}

fn mime_for(request: &CaptionRequest) -> &'static str {
    match request
        .image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl CaptionEnginePort for HttpCaptionEngine {
    async fn caption(&self, request: &CaptionRequest) -> Result<String, EngineError> {
        let data = tokio::fs::read(&request.image_path)
            .await
            .map_err(|e| EngineError::IoError(format!("{}: {}", request.image_path.display(), e)))?;

        let file_name = request
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(mime_for(request))
            .map_err(|e| EngineError::NetworkError(e.to_string()))?;
        let form = Form::new().part("image", part);

        tracing::debug!(
            task_id = %request.task_id,
            url = %self.caption_url(),
            "Sending caption request"
        );

        let response = self
            .client
            .post(self.caption_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout(Duration::from_secs(self.config.timeout_secs))
                } else if e.is_connect() {
                    EngineError::NetworkError(format!("Cannot connect to caption service: {}", e))
                } else {
                    EngineError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Failed(format!("HTTP {}: {}", status, error_text)));
        }

        let body: CaptionHttpResponse = response
            .json()
            .await
            .map_err(|e| EngineError::InvalidOutput(e.to_string()))?;

        let caption = body.caption.trim();
        if caption.is_empty() {
            return Err(EngineError::InvalidOutput("empty caption".to_string()));
        }
        Ok(caption.to_string())
    }

    fn name(&self) -> &'static str {
        "http"
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::path::PathBuf;
    use tempfile::tempdir;

    async fn fake_service(mut multipart: Multipart) -> Result<Json<serde_json::Value>, StatusCode> {
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("image") {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                return Ok(Json(serde_json::json!({
                    "caption": format!("{} bytes from {}", bytes.len(), file_name)
                })));
            }
        }
        Err(StatusCode::UNPROCESSABLE_ENTITY)
    }

    async fn spawn_service() -> String {
        let app = Router::new().route("/api/caption", post(fake_service));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_config_builder() {
        let config = HttpEngineConfig::new("http://example.com:9000/").with_timeout(60);
        assert_eq!(config.timeout_secs, 60);
        let engine = HttpCaptionEngine::new(config).unwrap();
        assert_eq!(engine.caption_url(), "http://example.com:9000/api/caption");
    }

    #[tokio::test]
    async fn test_caption_via_multipart() {
        let base_url = spawn_service().await;
        let dir = tempdir().unwrap();
        let image_path = dir.path().join("cat.png");
        std::fs::write(&image_path, b"12345").unwrap();

        let engine = HttpCaptionEngine::new(HttpEngineConfig::new(base_url)).unwrap();
        let caption = engine
            .caption(&CaptionRequest {
                task_id: "t".to_string(),
                image_path,
            })
            .await
            .unwrap();
        assert_eq!(caption, "5 bytes from cat.png");
    }

    #[tokio::test]
    async fn test_missing_image_is_io_error() {
        let engine = HttpCaptionEngine::new(HttpEngineConfig::new("http://127.0.0.1:9")).unwrap();
        let result = engine
            .caption(&CaptionRequest {
                task_id: "t".to_string(),
                image_path: PathBuf::from("/nonexistent/cat.png"),
            })
            .await;
        assert!(matches!(result, Err(EngineError::IoError(_))));
    }
}
