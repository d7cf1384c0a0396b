//! Gemini REST client: `generateContent` plus the Files API.

use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use tenderflow_shared::{
    DEFAULT_COMPANY_PROFILE, DeadlineInfo, FormDetection, GeminiConfig, Result, TenderflowError,
};

use crate::prompts;
use crate::{ClassificationOracle, RelevanceJudgment, RemoteDocument};

const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const PDF_MIME: &str = "application/pdf";
const DEFAULT_RELEVANCE_WINDOW: usize = 6_000;

/// Blocking client for the Gemini generative API.
///
/// Inherent `request_*` methods surface every failure; the
/// [`ClassificationOracle`] impl turns failures into safe defaults.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    poll_interval: Duration,
    poll_max_attempts: u32,
    company_profile: String,
    relevance_window_chars: usize,
}

impl GeminiClient {
    /// Build a client from the `[gemini]` config section and a resolved API key.
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("Tenderflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TenderflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            poll_interval: Duration::from_millis(config.upload_poll_interval_ms),
            poll_max_attempts: config.upload_poll_max_attempts.max(1),
            company_profile: DEFAULT_COMPANY_PROFILE.to_string(),
            relevance_window_chars: DEFAULT_RELEVANCE_WINDOW,
        })
    }

    /// Override the buyer profile and text window used for relevance judgments.
    pub fn with_relevance_profile(mut self, profile: impl Into<String>, window_chars: usize) -> Self {
        self.company_profile = profile.into();
        self.relevance_window_chars = window_chars;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    // -- generateContent ----------------------------------------------------

    /// Ask whether `text` is relevant to the buyer profile.
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    pub fn request_relevance(&self, text: &str) -> Result<RelevanceJudgment> {
        let prompt = prompts::relevance(&self.company_profile, text, self.relevance_window_chars);
        let answer = self.generate(vec![Part::Text(prompt)], None)?;

        let parsed: Value = serde_json::from_str(prompts::strip_fences(&answer))
            .map_err(|e| TenderflowError::parse(format!("relevance answer is not JSON: {e}")))?;
        Ok(RelevanceJudgment {
            is_relevant: parsed["is_relevant"].as_bool().unwrap_or(false),
            reasoning: parsed["reasoning"].as_str().unwrap_or_default().to_string(),
        })
    }

    /// Detect bidder-actionable forms in an uploaded document.
    #[instrument(skip_all, fields(model = %self.model, file = %document.name))]
    pub fn request_forms(&self, document: &RemoteDocument) -> Result<Vec<FormDetection>> {
        let answer = self.generate(
            vec![Part::file(document), Part::Text(prompts::FORM_DETECTION.to_string())],
            Some(prompts::forms_schema()),
        )?;
        let parsed: FormsAnswer = serde_json::from_str(&answer)
            .map_err(|e| TenderflowError::parse(format!("form detection answer: {e}")))?;
        debug!(
            reported = parsed.total_forms_found,
            returned = parsed.forms.len(),
            explanation = %parsed.explanation,
            "forms detected"
        );
        Ok(parsed.forms)
    }

    /// Extract the submission deadline of an uploaded document.
    #[instrument(skip_all, fields(model = %self.model, file = %document.name))]
    pub fn request_deadline(&self, document: &RemoteDocument) -> Result<DeadlineInfo> {
        let answer = self.generate(
            vec![Part::file(document), Part::Text(prompts::DEADLINE.to_string())],
            Some(prompts::deadline_schema()),
        )?;
        serde_json::from_str(&answer)
            .map_err(|e| TenderflowError::parse(format!("deadline answer: {e}")))
    }

    fn generate(&self, parts: Vec<Part>, schema: Option<Value>) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: schema.map(|response_schema| GenerationConfig {
                response_mime_type: "application/json",
                response_schema,
            }),
        };

        let response = self.send(self.client.post(&url).json(&body))?;
        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| TenderflowError::parse(format!("generateContent response: {e}")))?;

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(TenderflowError::Oracle("empty response from model".into()));
        }
        Ok(text)
    }

    // -- Files API ----------------------------------------------------------

    /// Upload a PDF through the resumable protocol and wait until it is `ACTIVE`.
    #[instrument(skip_all, fields(path = %path.display(), display_name = %display_name))]
    pub fn upload_file(&self, path: &Path, display_name: &str) -> Result<RemoteDocument> {
        let bytes = std::fs::read(path).map_err(|e| TenderflowError::io(path, e))?;

        let start = self.send(
            self.client
                .post(format!("{}/upload/v1beta/files", self.base_url))
                .header("X-Goog-Upload-Protocol", "resumable")
                .header("X-Goog-Upload-Command", "start")
                .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
                .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
                .json(&serde_json::json!({ "file": { "display_name": display_name } })),
        )?;
        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| TenderflowError::Oracle("upload start returned no upload URL".into()))?;

        let finished = self.send(
            self.client
                .post(&upload_url)
                .header("X-Goog-Upload-Offset", "0")
                .header("X-Goog-Upload-Command", "upload, finalize")
                .body(bytes),
        )?;
        let envelope: FileEnvelope = finished
            .json()
            .map_err(|e| TenderflowError::parse(format!("upload response: {e}")))?;

        let file = self.wait_until_active(envelope.file)?;
        info!(file = %file.name, "document uploaded");
        Ok(RemoteDocument {
            name: file.name,
            uri: file.uri,
            mime_type: file.mime_type.unwrap_or_else(|| PDF_MIME.to_string()),
        })
    }

    fn wait_until_active(&self, mut file: RemoteFile) -> Result<RemoteFile> {
        let mut attempts = 0;
        loop {
            match file.state.as_deref() {
                Some("PROCESSING") => {}
                Some("FAILED") => {
                    return Err(TenderflowError::Oracle(format!(
                        "processing of {} failed",
                        file.name
                    )));
                }
                // ACTIVE, or no state reported at all.
                _ => return Ok(file),
            }

            attempts += 1;
            if attempts > self.poll_max_attempts {
                return Err(TenderflowError::Oracle(format!(
                    "{} still processing after {} polls",
                    file.name, self.poll_max_attempts
                )));
            }
            std::thread::sleep(self.poll_interval);

            let url = format!("{}/v1beta/{}", self.base_url, file.name);
            file = self
                .send(self.client.get(&url))?
                .json()
                .map_err(|e| TenderflowError::parse(format!("file status response: {e}")))?;
            debug!(file = %file.name, state = ?file.state, attempts, "upload state polled");
        }
    }

    /// Delete an uploaded file.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        let url = format!("{}/v1beta/{}", self.base_url, name);
        self.send(self.client.delete(&url))?;
        Ok(())
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    TenderflowError::Network(format!("request to {} timed out", self.base_url))
                } else if e.is_connect() {
                    TenderflowError::Network(format!("cannot reach {}", self.base_url))
                } else {
                    TenderflowError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(TenderflowError::Oracle(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

impl ClassificationOracle for GeminiClient {
    fn judge_relevance(&self, text: &str) -> RelevanceJudgment {
        self.request_relevance(text).unwrap_or_else(|e| {
            warn!(error = %e, "relevance judgment failed");
            RelevanceJudgment::failed(e)
        })
    }

    fn upload(&self, path: &Path, display_name: &str) -> Result<RemoteDocument> {
        self.upload_file(path, display_name)
    }

    fn detect_forms(&self, document: &RemoteDocument) -> Vec<FormDetection> {
        self.request_forms(document).unwrap_or_else(|e| {
            warn!(error = %e, file = %document.name, "form detection failed");
            Vec::new()
        })
    }

    fn extract_deadline(&self, document: &RemoteDocument) -> DeadlineInfo {
        self.request_deadline(document).unwrap_or_else(|e| {
            warn!(error = %e, file = %document.name, "deadline extraction failed");
            DeadlineInfo::not_found()
        })
    }

    fn release(&self, document: &RemoteDocument) {
        if let Err(e) = self.delete_file(&document.name) {
            debug!(error = %e, file = %document.name, "failed to release remote file");
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part {
    Text(String),
    FileData(FileData),
}

impl Part {
    fn file(document: &RemoteDocument) -> Self {
        Self::FileData(FileData {
            mime_type: document.mime_type.clone(),
            file_uri: document.uri.clone(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct FormsAnswer {
    #[serde(default)]
    total_forms_found: i64,
    #[serde(default)]
    forms: Vec<FormDetection>,
    #[serde(default)]
    explanation: String,
}

#[derive(Deserialize)]
struct FileEnvelope {
    file: RemoteFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    mime_type: Option<String>,
    state: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> GeminiConfig {
        GeminiConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            upload_poll_interval_ms: 1,
            upload_poll_max_attempts: 3,
            ..GeminiConfig::default()
        }
    }

    fn answer(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }))
    }

    fn document() -> RemoteDocument {
        RemoteDocument {
            name: "files/abc".into(),
            uri: "https://example.test/files/abc".into(),
            mime_type: PDF_MIME.into(),
        }
    }

    /// Run blocking client calls off the async test thread.
    async fn blocking<T: Send + 'static>(
        base: String,
        f: impl FnOnce(GeminiClient) -> T + Send + 'static,
    ) -> T {
        tokio::task::spawn_blocking(move || {
            let client = GeminiClient::new(&config(&base), "test-key")
                .unwrap()
                .with_relevance_profile("PROFILE", 100);
            f(client)
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn relevance_parses_fenced_answer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(answer(
                "```json\n{\"is_relevant\": true, \"reasoning\": \"UPI switch\", \"confidence\": \"high\"}\n```",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let judgment = blocking(server.uri(), |c| c.judge_relevance("payment switch")).await;
        assert!(judgment.is_relevant);
        assert_eq!(judgment.reasoning, "UPI switch");
    }

    #[tokio::test]
    async fn relevance_defaults_missing_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer("{\"confidence\": \"low\"}"))
            .mount(&server)
            .await;

        let judgment = blocking(server.uri(), |c| c.judge_relevance("text")).await;
        assert_eq!(
            judgment,
            RelevanceJudgment {
                is_relevant: false,
                reasoning: String::new()
            }
        );
    }

    #[tokio::test]
    async fn relevance_error_degrades_to_not_relevant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let judgment = blocking(server.uri(), |c| c.judge_relevance("text")).await;
        assert!(!judgment.is_relevant);
        assert!(judgment.reasoning.starts_with("Gemini error:"));
        assert!(judgment.reasoning.contains("429"));
    }

    #[tokio::test]
    async fn forms_request_carries_file_and_schema() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(answer(
                &json!({
                    "total_forms_found": 2,
                    "forms": [
                        { "form_title": "ANNEXURE-I", "start_page": 3, "end_page": 4, "confidence": "high" },
                        { "form_title": "Financial Bid", "start_page": 9, "end_page": 9, "confidence": "low" }
                    ],
                    "explanation": "two annexures"
                })
                .to_string(),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let forms = blocking(server.uri(), |c| c.detect_forms(&document())).await;
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].form_title, "ANNEXURE-I");
        assert_eq!((forms[0].start_page, forms[0].end_page), (3, 4));

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body["contents"][0]["parts"][0]["fileData"]["fileUri"],
            "https://example.test/files/abc"
        );
        assert!(body["generationConfig"]["responseSchema"]["properties"]["forms"].is_object());
    }

    #[tokio::test]
    async fn forms_error_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer("not json"))
            .mount(&server)
            .await;

        let forms = blocking(server.uri(), |c| c.detect_forms(&document())).await;
        assert!(forms.is_empty());
    }

    #[tokio::test]
    async fn deadline_parses_and_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(answer(
                &json!({
                    "deadline_found": true,
                    "deadline_date": "15-11-2026 15:00",
                    "bid_opening_date": null,
                    "deadline_text": "Bid End Date/Time",
                    "explanation": "from bid details table"
                })
                .to_string(),
            ))
            .mount(&server)
            .await;

        let info = blocking(server.uri(), |c| c.extract_deadline(&document())).await;
        assert!(info.deadline_found);
        assert_eq!(info.deadline_date.as_deref(), Some("15-11-2026 15:00"));

        let unreachable = blocking("http://127.0.0.1:9".into(), |c| {
            c.extract_deadline(&document())
        })
        .await;
        assert_eq!(unreachable, DeadlineInfo::not_found());
    }

    #[tokio::test]
    async fn upload_polls_until_active() {
        let server = MockServer::start().await;
        let session = format!("{}/upload-session/1", server.uri());

        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .and(header("X-Goog-Upload-Command", "start"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session.as_str()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload-session/1"))
            .and(headers("X-Goog-Upload-Command", vec!["upload", "finalize"]))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": { "name": "files/xyz", "uri": "https://files/xyz", "mimeType": "application/pdf", "state": "PROCESSING" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "files/xyz", "uri": "https://files/xyz", "mimeType": "application/pdf", "state": "ACTIVE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("tender.pdf");
        std::fs::write(&pdf, b"%PDF-1.5 test").unwrap();

        let uploaded = blocking(server.uri(), move |c| c.upload(&pdf, "tender.pdf"))
            .await
            .unwrap();
        assert_eq!(uploaded.name, "files/xyz");
        assert_eq!(uploaded.uri, "https://files/xyz");
    }

    #[tokio::test]
    async fn upload_failed_state_is_an_error() {
        let server = MockServer::start().await;
        let session = format!("{}/session", server.uri());
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file": { "name": "files/bad", "uri": "u", "state": "FAILED" }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("t.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let result = blocking(server.uri(), move |c| c.upload(&pdf, "t.pdf")).await;
        assert!(matches!(result, Err(TenderflowError::Oracle(_))));
    }

    #[tokio::test]
    async fn upload_gives_up_after_max_polls() {
        let server = MockServer::start().await;
        let session = format!("{}/session", server.uri());
        let processing = json!({ "name": "files/slow", "uri": "u", "state": "PROCESSING" });
        Mock::given(method("POST"))
            .and(path("/upload/v1beta/files"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-goog-upload-url", session.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "file": processing.clone() })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1beta/files/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(processing))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("slow.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();

        let result = blocking(server.uri(), move |c| c.upload(&pdf, "slow.pdf")).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("still processing"));
    }

    #[tokio::test]
    async fn release_swallows_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1beta/files/abc"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        blocking(server.uri(), |c| c.release(&document())).await;
    }
}
