//! OpenAI 호환 chat completions 게이트웨이
//!
//! `POST {gateway_url}`에 `{ model, messages }`를 보내고
//! `choices[0].message.content`를 응답 텍스트로 돌려줍니다.
//!
//! # 상태 코드 매핑
//!
//! - 429: 요청 한도 초과
//! - 402: 크레딧 소진
//! - 그 외 2xx가 아닌 코드: `LLM API error: {status}`

use std::time::Duration;

use ecuscan_core::config::AnalysisConfig;
use ecuscan_core::error::AnalysisError;
use ecuscan_core::pipeline::BoxFuture;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::gateway::{AnalysisPrompt, LlmGateway};

const USER_AGENT: &str = concat!("ecuscan/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

/// chat completions 엔드포인트를 호출하는 [`LlmGateway`] 구현
#[derive(Debug, Clone)]
pub struct ChatGateway {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
}

impl ChatGateway {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Engine(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// 분석 설정의 `gateway_*` 값으로 게이트웨이를 만듭니다.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::new(
            config.gateway_url.trim(),
            config.gateway_model.as_str(),
            config.gateway_api_key.as_str(),
            config.gateway_timeout(),
        )
    }

    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "gateway request failed");
            AnalysisError::Engine(format!("LLM request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %detail, "gateway returned error status");
            return Err(status_error(status));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
        let content = message_content(&payload)?;
        debug!(chars = content.len(), "gateway response received");
        Ok(content)
    }
}

/// 실패 상태 코드를 사용자에게 보여줄 에러로 바꿉니다.
pub fn status_error(status: StatusCode) -> AnalysisError {
    let message = match status {
        StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded. Please try again later.".to_owned(),
        StatusCode::PAYMENT_REQUIRED => {
            "AI credits exhausted. Please add funds to continue.".to_owned()
        }
        other => format!("LLM API error: {}", other.as_u16()),
    };
    AnalysisError::Engine(message)
}

/// `choices[0].message.content`를 꺼냅니다.
pub fn message_content(payload: &Value) -> Result<String, AnalysisError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AnalysisError::Engine("No content in LLM response".to_owned()))
}

impl LlmGateway for ChatGateway {
    fn name(&self) -> &str {
        "ai"
    }

    fn analyze<'a>(
        &'a self,
        prompt: &'a AnalysisPrompt,
    ) -> BoxFuture<'a, Result<String, AnalysisError>> {
        Box::pin(async move {
            self.complete(vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ])
            .await
        })
    }

    fn enrich<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, AnalysisError>> {
        Box::pin(async move {
            self.complete(vec![ChatMessage {
                role: "user",
                content: prompt,
            }])
            .await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use serde_json::json;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn chat(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let reply = format!("{} messages", body["messages"].as_array().unwrap().len());
        captured.requests.lock().unwrap().push((auth, body));
        Json(json!({ "choices": [{ "message": { "role": "assistant", "content": reply } }] }))
    }

    async fn serve(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn gateway(url: &str) -> ChatGateway {
        ChatGateway::new(url, "google/gemini-2.5-flash", "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn analyze_sends_system_and_user_messages() {
        let captured = Captured::default();
        let url = serve(
            axum::Router::new()
                .route("/v1/chat/completions", post(chat))
                .with_state(captured.clone()),
        )
        .await;

        let prompt = AnalysisPrompt {
            system: "sys".to_owned(),
            user: "usr".to_owned(),
        };
        let text = gateway(&url).analyze(&prompt).await.unwrap();
        assert_eq!(text, "2 messages");

        let requests = captured.requests.lock().unwrap();
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "google/gemini-2.5-flash");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[tokio::test]
    async fn enrich_sends_single_user_message() {
        let captured = Captured::default();
        let url = serve(
            axum::Router::new()
                .route("/v1/chat/completions", post(chat))
                .with_state(captured.clone()),
        )
        .await;

        let text = gateway(&url).enrich("explain CWE-121").await.unwrap();
        assert_eq!(text, "1 messages");
        let requests = captured.requests.lock().unwrap();
        assert_eq!(requests[0].1["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn rate_limit_status_is_reported() {
        let url = serve(axum::Router::new().route(
            "/v1/chat/completions",
            post(|| async { StatusCode::TOO_MANY_REQUESTS }),
        ))
        .await;

        let err = gateway(&url).enrich("x").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "engine failure: Rate limit exceeded. Please try again later."
        );
    }

    #[test]
    fn status_codes_map_to_messages() {
        assert!(
            status_error(StatusCode::PAYMENT_REQUIRED)
                .to_string()
                .contains("AI credits exhausted")
        );
        assert!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR)
                .to_string()
                .contains("LLM API error: 500")
        );
    }

    #[test]
    fn missing_content_is_an_error() {
        let err = message_content(&json!({ "choices": [] })).unwrap_err();
        assert!(err.to_string().contains("No content in LLM response"));
        assert_eq!(
            message_content(&json!({ "choices": [{ "message": { "content": "{}" } }] })).unwrap(),
            "{}"
        );
    }
}
