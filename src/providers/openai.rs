use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{CompletionClient, CompletionRequest, EmbeddingClient};

const SYSTEM_PROMPT: &str = "You answer questions using only the numbered context passages you are given. Cite passages as [n] and say so when the context does not contain the answer.";

/// Blocking HTTP client for OpenAI-compatible endpoints, with bounded retry on
/// rate limiting and server errors.
struct OpenAiHttp {
    client: Client,
    base_url: String,
    max_retries: usize,
}

impl OpenAiHttp {
    fn new(api_key: String, base_url: String, timeout: Duration, max_retries: usize) -> Result<Self> {
        ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build OpenAI HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: max_retries.max(1),
        })
    }

    fn post_json<T: Serialize>(&self, route: &str, body: &T) -> Result<Response> {
        let endpoint = format!("{}/{route}", self.base_url);
        let mut attempt = 0usize;
        loop {
            match self.client.post(&endpoint).json(body).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }

                    let text = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, route, "OpenAI request throttled; retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    bail!("OpenAI {route} request failed ({status}): {text}");
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, route, "OpenAI request failed; retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(err).with_context(|| format!("failed to call OpenAI {route}"));
                }
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

pub struct OpenAiEmbedder {
    http: OpenAiHttp,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        ensure!(!model.trim().is_empty(), "missing OpenAI embedding model name");
        Ok(Self {
            http: OpenAiHttp::new(api_key, base_url, timeout, max_retries)?,
            model,
        })
    }
}

impl EmbeddingClient for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors
            .pop()
            .context("OpenAI returned no embedding for a single input")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut parsed: EmbeddingResponse = self
            .http
            .post_json("embeddings", &request)?
            .json()
            .context("failed to parse OpenAI embedding response")?;
        parsed.data.sort_by_key(|entry| entry.index);
        ensure!(
            parsed.data.len() == texts.len(),
            "OpenAI returned {} embeddings for {} inputs",
            parsed.data.len(),
            texts.len()
        );

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

pub struct OpenAiCompletion {
    http: OpenAiHttp,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        ensure!(!model.trim().is_empty(), "missing OpenAI completion model name");
        Ok(Self {
            http: OpenAiHttp::new(api_key, base_url, timeout, max_retries)?,
            model,
        })
    }
}

impl CompletionClient for OpenAiCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        };

        let parsed: ChatResponse = self
            .http
            .post_json("chat/completions", &body)?
            .json()
            .context("failed to parse OpenAI chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("OpenAI chat response contained no choices")
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
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
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}
