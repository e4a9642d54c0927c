use super::RiskAnalyst;
use crate::errors::{EngineError, EngineResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;

/// Gemini REST client (generateContent). All methods return Result, never panic.
#[derive(Clone)]
pub struct GeminiAnalyst {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiAnalyst {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(20))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Key travels in the `x-goog-api-key` header, never in the URL.
    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn generate(&self, prompt: &str) -> EngineResult<String> {
        let url = self.endpoint();
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "thinkingConfig": { "thinkingBudget": 0 } }
        });

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Commentary(format!("HTTP {status}: {body}")));
        }

        let raw = resp
            .text()
            .await
            .map_err(|e| EngineError::Commentary(format!("read body: {e}")))?;
        extract_text(&raw)
    }
}

impl RiskAnalyst for GeminiAnalyst {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn analyze<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, EngineResult<String>> {
        self.generate(prompt).boxed()
    }
}

// Response format (trimmed):
// {
//   "candidates": [
//     { "content": { "parts": [ { "text": "..." } ], "role": "model" }, "finishReason": "STOP" }
//   ]
// }

#[derive(serde::Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(serde::Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(serde::Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(serde::Deserialize)]
struct Part {
    text: Option<String>,
}

/// Concatenate the text parts of the first candidate. A response with no
/// candidates yields an empty string, which callers map to a placeholder.
fn extract_text(raw: &str) -> EngineResult<String> {
    let resp: GenerateResponse = serde_json::from_str(raw)?;

    let text = resp
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<String>();

    Ok(text.trim().to_string())
}
