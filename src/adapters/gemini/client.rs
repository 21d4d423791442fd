use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine};
use serde_json::{json, Value};
use std::time::Duration;

use crate::application::ports::VerificationBackendPort;
use crate::domain::verification::{parse_verdict, AttemptOutcome, FailureKind};

pub const API_KEY_HEADER: &str = "x-goog-api-key";

const VERIFICATION_PROMPT: &str = r#"You are an image verification engine in a fire safety system.
This is NOT a conversation. Do NOT ask questions. Do NOT request additional inputs.
Your only task is to analyze the provided image and determine whether it shows a real, uncontrolled fire emergency.
You must choose exactly one result and return STRICT JSON only.

Allowed values:
- REAL_FIRE
- NOT_REAL_FIRE

Response format:
{
  "result": "REAL_FIRE" | "NOT_REAL_FIRE",
  "reason": "brief visual reason only"
}

Do not explain outside JSON. Do not hallucinate context. Only analyze what is visible in the image."#;

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Cliente `generateContent` de Gemini. Un intento por llamada; la rotación
/// de credenciales y modelos es cosa del servicio de verificación.
pub struct GeminiVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiVerifier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

pub fn request_body(image_jpeg: &[u8]) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inline_data": { "mime_type": "image/jpeg", "data": BASE64_STANDARD.encode(image_jpeg) } },
                { "text": VERIFICATION_PROMPT }
            ]
        }],
        "generationConfig": {
            "temperature": 0.1,
            "responseMimeType": "application/json"
        },
        "safetySettings": SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect::<Vec<_>>()
    })
}

/// Clasifica una respuesta HTTP ya leída.
pub fn classify_response(status: u16, body: &str) -> AttemptOutcome {
    let data: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if (200..300).contains(&status) => {
            return AttemptOutcome::failed(FailureKind::MalformedResponse, format!("body is not JSON: {e}"));
        }
        Err(_) => Value::Null,
    };

    if (200..300).contains(&status) {
        let Some(text) = data["candidates"][0]["content"]["parts"][0]["text"].as_str() else {
            return AttemptOutcome::failed(FailureKind::MalformedResponse, "response without candidates");
        };
        return match parse_verdict(text) {
            Ok(verdict) => AttemptOutcome::Verdict(verdict),
            Err(e) => AttemptOutcome::failed(FailureKind::MalformedResponse, e),
        };
    }

    let message = data["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"));
    let lower = message.to_lowercase();

    let kind = if status == 429 || lower.contains("quota") {
        FailureKind::QuotaExceeded
    } else if ["leaked", "api key not valid", "api_key_invalid", "api key expired"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        FailureKind::CredentialRevoked
    } else if status == 404 || lower.contains("not found") {
        FailureKind::ModelUnavailable
    } else {
        FailureKind::Transport
    };
    AttemptOutcome::failed(kind, message)
}

#[async_trait]
impl VerificationBackendPort for GeminiVerifier {
    async fn classify(&self, credential: &str, model: &str, image_jpeg: &[u8]) -> AttemptOutcome {
        let sent = self
            .client
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, credential)
            .json(&request_body(image_jpeg))
            .send()
            .await;

        let res = match sent {
            Ok(res) => res,
            Err(e) if e.is_timeout() => return AttemptOutcome::failed(FailureKind::Timeout, e.to_string()),
            Err(e) => return AttemptOutcome::failed(FailureKind::Transport, e.to_string()),
        };

        let status = res.status().as_u16();
        match res.text().await {
            Ok(body) => classify_response(status, &body),
            Err(e) if e.is_timeout() => AttemptOutcome::failed(FailureKind::Timeout, e.to_string()),
            Err(e) => AttemptOutcome::failed(FailureKind::Transport, e.to_string()),
        }
    }
}
