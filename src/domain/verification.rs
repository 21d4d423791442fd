use serde::{Deserialize, Serialize};
use std::fmt;

/// Motivo fijo del veredicto por defecto cuando no se pudo verificar.
pub const FAIL_SAFE_REASON: &str =
    "Verification unavailable - defaulting to REAL FIRE for safety";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLabel {
    RealFire,
    NotRealFire,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub result: VerdictLabel,
    #[serde(default = "default_reason")]
    pub reason: String,
}

fn default_reason() -> String {
    "No reason provided".to_string()
}

impl Verdict {
    pub fn is_real_fire(&self) -> bool {
        self.result == VerdictLabel::RealFire
    }
}

/// Clasificación de un intento fallido contra la API remota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedResponse,
    QuotaExceeded,
    CredentialRevoked,
    ModelUnavailable,
    Timeout,
    Transport,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::MalformedResponse => "malformed response",
            FailureKind::QuotaExceeded => "quota exceeded",
            FailureKind::CredentialRevoked => "credential revoked",
            FailureKind::ModelUnavailable => "model unavailable",
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport error",
        };
        f.write_str(s)
    }
}

/// Qué cursor(es) avanza el rotador tras un intento.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStep {
    Credential,
    Model,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Verdict(Verdict),
    Failed { kind: FailureKind, detail: String },
}

impl AttemptOutcome {
    pub fn failed(kind: FailureKind, detail: impl Into<String>) -> Self {
        AttemptOutcome::Failed { kind, detail: detail.into() }
    }

    pub fn cursor_step(&self) -> CursorStep {
        match self {
            AttemptOutcome::Verdict(_) => CursorStep::Both,
            AttemptOutcome::Failed { kind: FailureKind::ModelUnavailable, .. } => CursorStep::Model,
            AttemptOutcome::Failed { .. } => CursorStep::Credential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_positive: bool,
    pub reason: String,
    pub error: Option<String>,
    pub fail_safe: bool,
    pub attempts: usize,
}

impl VerificationResult {
    pub fn confirmed(verdict: Verdict, attempts: usize) -> Self {
        Self {
            is_positive: verdict.is_real_fire(),
            reason: verdict.reason,
            error: None,
            fail_safe: false,
            attempts,
        }
    }

    /// Veredicto positivo por defecto, marcado como `fail_safe`.
    pub fn fail_safe(last_error: Option<String>, attempts: usize) -> Self {
        let last = last_error.unwrap_or_else(|| "no attempts were possible".to_string());
        Self {
            is_positive: true,
            reason: FAIL_SAFE_REASON.to_string(),
            error: Some(format!("All verification attempts failed. Last error: {last}")),
            fail_safe: true,
            attempts,
        }
    }
}

/// Interpreta el texto devuelto por el modelo. Acepta bloques ```json.
pub fn parse_verdict(text: &str) -> Result<Verdict, String> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    serde_json::from_str::<Verdict>(body.trim()).map_err(|e| format!("JSON parse error: {e}"))
}
