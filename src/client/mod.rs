use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::execution::errors::SettlementError;
use crate::scoring::pitch::{clamp_score, PitchEvaluator};

const SYSTEM_PROMPT: &str = "Score this token sale pitch from 0-100 based on innovation, feasibility, and market potential. Consider technical merit, business model, and competitive advantage. Return only the numeric score.";

// ==================================================
// CHAT COMPLETION WIRE TYPES
// ==================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

// ==================================================
// CLIENT
// ==================================================

/// OpenAI-compatible chat completion endpoint used as the primary pitch scorer.
#[derive(Clone)]
pub struct RemotePitchEvaluator {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl RemotePitchEvaluator {
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        timeout_ms: u64,
    ) -> Result<Self, SettlementError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SettlementError::Config(format!("pitch evaluator endpoint: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SettlementError::Config(format!("http client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Pulls the first number out of a model reply such as "82" or "Score: 82.5".
pub fn parse_score(reply: &str) -> Option<Decimal> {
    let trimmed = reply.trim();
    if let Ok(d) = Decimal::from_str(trimmed) {
        return Some(d);
    }
    let start = trimmed.find(|c: char| c.is_ascii_digit())?;
    let rest = &trimmed[start..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    Decimal::from_str(rest[..end].trim_end_matches('.')).ok()
}

#[async_trait]
impl PitchEvaluator for RemotePitchEvaluator {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn evaluate(&self, pitch: &str) -> Result<Decimal, SettlementError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: pitch,
                },
            ],
            max_tokens: 10,
            temperature: 0.1,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SettlementError::ScoringUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let err = response.text().await.unwrap_or_default();
            return Err(SettlementError::ScoringUnavailable(format!(
                "{}: {}",
                status, err
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SettlementError::ScoringUnavailable(e.to_string()))?;

        let reply = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| SettlementError::ScoringUnavailable("empty completion".into()))?;
        debug!("pitch evaluator replied {:?}", reply);

        let score = parse_score(reply).ok_or_else(|| {
            SettlementError::ScoringUnavailable(format!("non-numeric reply {:?}", reply))
        })?;

        info!("🧠 Remote pitch score: {}", score);
        Ok(clamp_score(score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_plain_and_decorated_scores() {
        assert_eq!(parse_score("82"), Some(dec!(82)));
        assert_eq!(parse_score(" 82.5\n"), Some(dec!(82.5)));
        assert_eq!(parse_score("Score: 71."), Some(dec!(71)));
        assert_eq!(parse_score("no idea"), None);
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let err = RemotePitchEvaluator::new("not a url", "gpt", "sk-x", 100).err();
        assert!(matches!(err, Some(SettlementError::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_unavailable() {
        // Port 9 (discard) on loopback refuses connections on test hosts.
        let eval = RemotePitchEvaluator::new("http://127.0.0.1:9/v1/chat/completions", "gpt", "sk-x", 500)
            .unwrap();
        let err = eval.evaluate("pitch").await.unwrap_err();
        assert!(matches!(err, SettlementError::ScoringUnavailable(_)));
    }
}
