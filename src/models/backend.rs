//! OpenAI-compatible chat completion backend.
//!
//! Talks to any endpoint exposing `GET /models` and a streaming
//! `POST /chat/completions` (GitHub Models, OpenAI, local gateways).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{ChatMessage, ModelBackend, ModelInfo, TextStream};
use crate::error::BackendError;
use crate::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling settings sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 4096,
        }
    }
}

/// Backend for OpenAI-style HTTP APIs.
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    options: GenerationOptions,
}

impl OpenAiCompatBackend {
    /// Create a backend rooted at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_token: Option<String>,
        options: GenerationOptions,
    ) -> Result<Self> {
        // No overall timeout: generations stream for as long as the model talks.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::request(endpoint, e))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token: api_token.filter(|t| !t.is_empty()),
            options,
        })
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoint)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body: truncate(&body, 500),
        }
        .into())
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    async fn list_models(&self, vendor_filter: Option<&str>) -> Result<Vec<ModelInfo>> {
        let url = self.url("models");
        tracing::debug!(%url, "Discovering models");

        let response = self
            .authorized(self.client.get(&url))
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .map_err(|e| BackendError::request(&url, e))?;
        let response = Self::check_status(response).await?;

        let listing: ModelListing = response
            .json()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))?;

        let models = listing.into_models();
        Ok(filter_by_vendor(models, vendor_filter))
    }

    async fn generate(
        &self,
        model: &ModelInfo,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        let url = self.url("chat/completions");
        let body = CompletionRequest {
            model: &model.id,
            messages,
            stream: true,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };

        tracing::debug!(model = %model.id, messages = messages.len(), "Starting completion");

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::request(&url, e))?;
        let response = Self::check_status(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(sse_text_stream(body, cancel))
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

/// `GET /models` comes back either as a bare array or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModelListing {
    Bare(Vec<RawModel>),
    Wrapped { data: Vec<RawModel> },
}

impl ModelListing {
    fn into_models(self) -> Vec<ModelInfo> {
        let raw = match self {
            Self::Bare(models) | Self::Wrapped { data: models } => models,
        };
        raw.into_iter().map(RawModel::into_info).collect()
    }
}

#[derive(Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "display_name")]
    friendly_name: Option<String>,
    #[serde(default, alias = "owned_by", alias = "vendor")]
    publisher: Option<String>,
    #[serde(default, alias = "context_length")]
    max_input_tokens: Option<usize>,
}

impl RawModel {
    fn into_info(self) -> ModelInfo {
        // Registries with URI ids put the matchable short name in `name`; the id
        // itself is what completion requests must carry.
        let family = self.name.unwrap_or_else(|| self.id.clone());
        ModelInfo {
            id: self.id,
            name: self.friendly_name.unwrap_or_else(|| family.clone()),
            family,
            vendor: self.publisher.unwrap_or_default(),
            max_input_tokens: self.max_input_tokens,
        }
    }
}

fn filter_by_vendor(models: Vec<ModelInfo>, vendor_filter: Option<&str>) -> Vec<ModelInfo> {
    let Some(vendor) = vendor_filter.map(str::to_lowercase) else {
        return models;
    };
    models
        .into_iter()
        .filter(|m| m.vendor.to_lowercase().contains(&vendor))
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// A decoded server-sent event from a completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A piece of generated text.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Incremental decoder for `data:` lines of a chat completion stream.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

#[derive(Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning the events completed by them.
    ///
    /// # Errors
    ///
    /// Returns an error for an undecodable data line or an in-band error object.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = Self::decode_line(line.trim_end())? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Decode whatever is left after the body ended without a newline.
    ///
    /// # Errors
    ///
    /// Same as [`SseDecoder::push`].
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest);
        Self::decode_line(line.trim())
    }

    fn decode_line(line: &str) -> Result<Option<SseEvent>> {
        let Some(data) = line.strip_prefix("data:") else {
            // Comments, `event:` and `id:` lines, blank separators.
            return Ok(None);
        };
        let data = data.trim_start();
        if data.is_empty() {
            return Ok(None);
        }
        if data == "[DONE]" {
            return Ok(Some(SseEvent::Done));
        }

        let chunk: CompletionChunk =
            serde_json::from_str(data).map_err(|e| BackendError::Decode(e.to_string()))?;
        if let Some(error) = chunk.error {
            return Err(BackendError::Stream(error.to_string()).into());
        }

        let text: String = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .collect();
        Ok((!text.is_empty()).then_some(SseEvent::Delta(text)))
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    queued: VecDeque<String>,
    finished: bool,
    cancel: CancellationToken,
}

impl StreamState {
    fn absorb(&mut self, events: Vec<SseEvent>) {
        for event in events {
            match event {
                SseEvent::Delta(text) => self.queued.push_back(text),
                SseEvent::Done => self.finished = true,
            }
        }
    }
}

fn sse_text_stream(
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    cancel: CancellationToken,
) -> TextStream {
    let state = StreamState {
        body,
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
        cancel,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.queued.pop_front() {
                return Some((Ok(text), st));
            }
            if st.finished {
                return None;
            }

            let next = tokio::select! {
                biased;
                () = st.cancel.cancelled() => {
                    st.finished = true;
                    return Some((Err(BackendError::Stream("cancelled".into()).into()), st));
                }
                next = st.body.next() => next,
            };

            match next {
                Some(Ok(bytes)) => match st.decoder.push(&bytes) {
                    Ok(events) => st.absorb(events),
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(BackendError::Stream(e.to_string()).into()), st));
                }
                None => {
                    st.finished = true;
                    match st.decoder.finish() {
                        Ok(event) => st.absorb(event.into_iter().collect()),
                        Err(e) => return Some((Err(e), st)),
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]})
        )
    }

    #[test]
    fn test_decoder_reads_deltas_and_done() {
        let mut decoder = SseDecoder::new();
        let payload = format!("{}{}data: [DONE]\n\n", delta_line("Hello"), delta_line(", world"));

        let events = decoder.push(payload.as_bytes()).unwrap();
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hello".into()),
                SseEvent::Delta(", world".into()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_decoder_handles_split_lines_and_utf8() {
        let mut decoder = SseDecoder::new();
        let payload = delta_line("Résumé des résultats");
        let bytes = payload.as_bytes();

        // Split inside the two-byte 'é'.
        let split = payload.find('é').unwrap() + 1;
        assert!(decoder.push(&bytes[..split]).unwrap().is_empty());
        let events = decoder.push(&bytes[split..]).unwrap();

        assert_eq!(events, vec![SseEvent::Delta("Résumé des résultats".into())]);
    }

    #[test]
    fn test_decoder_skips_non_data_lines_and_empty_deltas() {
        let mut decoder = SseDecoder::new();
        let payload = ": keep-alive\nevent: message\n\
                       data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                       data: {\"choices\":[]}\n\n";

        assert!(decoder.push(payload.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = SseDecoder::new();
        let err = decoder.push(b"data: {not json\n").unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[test]
    fn test_decoder_surfaces_inline_error() {
        let mut decoder = SseDecoder::new();
        let err = decoder
            .push(b"data: {\"error\":{\"message\":\"rate limited\"}}\n")
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_decoder_finish_reads_unterminated_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some(SseEvent::Done));
    }

    #[test]
    fn test_model_listing_wrapped() {
        let listing: ModelListing = serde_json::from_str(
            r#"{"object":"list","data":[{"id":"gpt-4o","owned_by":"openai"}]}"#,
        )
        .unwrap();
        let models = listing.into_models();

        assert_eq!(models.len(), 1);
        assert_eq!(models[0].family, "gpt-4o");
        assert_eq!(models[0].id, "gpt-4o");
        assert_eq!(models[0].vendor, "openai");
    }

    #[test]
    fn test_model_listing_bare_registry() {
        let listing: ModelListing = serde_json::from_str(
            r#"[{"id":"azureml://registries/azure-openai/models/gpt-4o/versions/2",
                 "name":"gpt-4o","friendly_name":"OpenAI GPT-4o","publisher":"OpenAI"},
                {"id":"azureml://registries/meta/models/llama-3/versions/1",
                 "name":"Meta-Llama-3-70B-Instruct","publisher":"Meta"}]"#,
        )
        .unwrap();
        let models = listing.into_models();

        assert_eq!(
            models[0].id,
            "azureml://registries/azure-openai/models/gpt-4o/versions/2"
        );
        assert_eq!(models[0].family, "gpt-4o");
        assert_eq!(models[0].name, "OpenAI GPT-4o");
        assert_eq!(
            models[1].id,
            "azureml://registries/meta/models/llama-3/versions/1"
        );
        assert_eq!(models[1].family, "Meta-Llama-3-70B-Instruct");
        assert_eq!(models[1].name, "Meta-Llama-3-70B-Instruct");
    }

    #[test]
    fn test_filter_by_vendor() {
        let models = vec![
            ModelInfo::new("gpt-4o").with_vendor("OpenAI"),
            ModelInfo::new("claude-sonnet-4.6").with_vendor("Anthropic"),
        ];

        let all = filter_by_vendor(models.clone(), None);
        assert_eq!(all.len(), 2);

        let only = filter_by_vendor(models, Some("anthropic"));
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].family, "claude-sonnet-4.6");
    }

    #[test]
    fn test_backend_trims_endpoint() {
        let backend =
            OpenAiCompatBackend::new("http://localhost:9/", None, GenerationOptions::default())
                .unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:9");
        assert_eq!(backend.url("models"), "http://localhost:9/models");
    }

    #[tokio::test]
    async fn test_sse_stream_yields_text_until_done() {
        let chunks: Vec<reqwest::Result<Vec<u8>>> = vec![
            Ok(delta_line("The paper ").into_bytes()),
            Ok(delta_line("argues").into_bytes()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(delta_line("ignored").into_bytes()),
        ];
        let text: Vec<String> = sse_text_stream(stream::iter(chunks).boxed(), CancellationToken::new())
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(text, vec!["The paper ", "argues"]);
    }

    #[tokio::test]
    async fn test_sse_stream_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let pending = stream::pending::<reqwest::Result<Vec<u8>>>().boxed();
        let mut text = sse_text_stream(pending, cancel.clone());

        cancel.cancel();
        let first = text.next().await.unwrap();
        assert!(first.is_err());
        assert!(text.next().await.is_none());
    }
}
