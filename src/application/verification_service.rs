use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::ports::VerificationBackendPort;
use crate::domain::verification::{AttemptOutcome, CursorStep, VerificationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RotationCursor {
    pub credential: usize,
    pub model: usize,
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub credential_index: usize,
    pub model_index: usize,
    pub credential: String,
    pub model: String,
}

/// Cursor compartido sobre el conjunto credencial × modelo.
///
/// El avance se calcula desde la combinación que se intentó, no desde la
/// posición vigente: dos intentos concurrentes sobre la misma combinación dejan
/// el cursor en el mismo sitio en vez de anularse entre sí.
pub struct FailoverRotator {
    credentials: Vec<String>,
    models: Vec<String>,
    cursor: Mutex<RotationCursor>,
}

impl FailoverRotator {
    pub fn new(credentials: Vec<String>, models: Vec<String>) -> Self {
        let keep = |v: Vec<String>| -> Vec<String> {
            v.into_iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        };
        Self {
            credentials: keep(credentials),
            models: keep(models),
            cursor: Mutex::new(RotationCursor::default()),
        }
    }

    /// Presupuesto de intentos por verificación: K × M.
    pub fn budget(&self) -> usize {
        self.credentials.len() * self.models.len()
    }

    #[cfg(test)]
    pub fn cursor(&self) -> RotationCursor {
        *self.cursor.lock()
    }

    pub fn next_attempt(&self) -> Option<Attempt> {
        if self.budget() == 0 {
            return None;
        }
        let c = *self.cursor.lock();
        Some(Attempt {
            credential_index: c.credential,
            model_index: c.model,
            credential: self.credentials[c.credential].clone(),
            model: self.models[c.model].clone(),
        })
    }

    /// Fija el cursor a un paso de la combinación intentada.
    pub fn record_outcome(&self, attempt: &Attempt, step: CursorStep) {
        if self.budget() == 0 {
            return;
        }
        let (k, m) = (self.credentials.len(), self.models.len());
        let next_credential = (attempt.credential_index + 1) % k;
        let next_model = (attempt.model_index + 1) % m;
        let mut c = self.cursor.lock();
        match step {
            CursorStep::Credential => {
                c.credential = next_credential;
                c.model = attempt.model_index;
            }
            CursorStep::Model => {
                c.credential = attempt.credential_index;
                c.model = next_model;
            }
            CursorStep::Both => {
                c.credential = next_credential;
                c.model = next_model;
            }
        }
    }
}

/// Verificación remota con rotación y veredicto por defecto positivo.
pub struct VerificationService {
    rotator: Arc<FailoverRotator>,
    backend: Arc<dyn VerificationBackendPort>,
}

impl VerificationService {
    pub fn new(rotator: Arc<FailoverRotator>, backend: Arc<dyn VerificationBackendPort>) -> Self {
        Self { rotator, backend }
    }

    #[cfg(test)]
    pub fn rotator(&self) -> &Arc<FailoverRotator> {
        &self.rotator
    }

    /// Siempre resuelve a un booleano: si se agota el presupuesto sin respuesta
    /// válida devuelve el veredicto de seguridad con el último error.
    pub async fn verify(&self, image_jpeg: &[u8]) -> VerificationResult {
        let budget = self.rotator.budget();
        let mut last_error: Option<String> = None;
        let mut attempts = 0;

        while attempts < budget {
            let Some(attempt) = self.rotator.next_attempt() else { break };
            attempts += 1;
            debug!(
                attempt = attempts,
                budget,
                model = %attempt.model,
                key_index = attempt.credential_index,
                "Verification attempt"
            );

            let outcome = self
                .backend
                .classify(&attempt.credential, &attempt.model, image_jpeg)
                .await;
            self.rotator.record_outcome(&attempt, outcome.cursor_step());

            match outcome {
                AttemptOutcome::Verdict(verdict) => {
                    info!(
                        real_fire = verdict.is_real_fire(),
                        model = %attempt.model,
                        reason = %verdict.reason,
                        "✅ Verification verdict"
                    );
                    return VerificationResult::confirmed(verdict, attempts);
                }
                AttemptOutcome::Failed { kind, detail } => {
                    warn!(
                        %kind,
                        model = %attempt.model,
                        key_index = attempt.credential_index,
                        "⚠️ Verification attempt failed: {}",
                        detail
                    );
                    last_error = Some(format!("{kind}: {detail}"));
                }
            }
        }

        let result = VerificationResult::fail_safe(last_error, attempts);
        error!(
            attempts,
            error = result.error.as_deref().unwrap_or_default(),
            "🔥 Verification unavailable, using fail-safe verdict"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::verification::{FailureKind, Verdict, VerdictLabel, FAIL_SAFE_REASON};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Backend guionizado: consume respuestas en orden y anota cada combinación usada.
    #[derive(Default)]
    struct ScriptedBackend {
        script: Mutex<VecDeque<AttemptOutcome>>,
        fallback: Option<AttemptOutcome>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn always(outcome: AttemptOutcome) -> Self {
            Self { fallback: Some(outcome), ..Default::default() }
        }

        fn scripted(items: Vec<AttemptOutcome>) -> Self {
            Self { script: Mutex::new(items.into()), ..Default::default() }
        }
    }

    #[async_trait]
    impl VerificationBackendPort for ScriptedBackend {
        async fn classify(&self, credential: &str, model: &str, _image: &[u8]) -> AttemptOutcome {
            self.calls.lock().push((credential.to_string(), model.to_string()));
            let next = self.script.lock().pop_front();
            next.or_else(|| self.fallback.clone())
                .unwrap_or_else(|| AttemptOutcome::failed(FailureKind::Transport, "script exhausted"))
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{i}")).collect()
    }

    fn models(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("model-{i}")).collect()
    }

    fn real_fire() -> AttemptOutcome {
        AttemptOutcome::Verdict(Verdict { result: VerdictLabel::RealFire, reason: "flames".into() })
    }

    fn service(k: usize, m: usize, backend: Arc<ScriptedBackend>) -> VerificationService {
        VerificationService::new(Arc::new(FailoverRotator::new(keys(k), models(m))), backend)
    }

    #[tokio::test]
    async fn all_quota_exhausts_budget_then_fails_safe() {
        let backend = Arc::new(ScriptedBackend::always(AttemptOutcome::failed(
            FailureKind::QuotaExceeded,
            "HTTP 429",
        )));
        let svc = service(2, 3, backend.clone());

        let res = svc.verify(b"jpeg").await;

        assert_eq!(backend.calls.lock().len(), 6);
        assert_eq!(res.attempts, 6);
        assert!(res.is_positive);
        assert!(res.fail_safe);
        assert_eq!(res.reason, FAIL_SAFE_REASON);
        assert!(res.error.as_deref().is_some_and(|e| e.contains("quota exceeded")));
    }

    #[tokio::test]
    async fn first_success_advances_both_cursors_once() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![real_fire()]));
        let svc = service(3, 3, backend.clone());

        let res = svc.verify(b"jpeg").await;

        assert!(res.is_positive && !res.fail_safe);
        assert_eq!(res.attempts, 1);
        assert_eq!(svc.rotator().cursor(), RotationCursor { credential: 1, model: 1 });
    }

    #[tokio::test]
    async fn mid_sequence_success_short_circuits() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            AttemptOutcome::failed(FailureKind::QuotaExceeded, "quota"),
            AttemptOutcome::Verdict(Verdict { result: VerdictLabel::NotRealFire, reason: "candle".into() }),
            real_fire(),
        ]));
        let svc = service(3, 2, backend.clone());

        let res = svc.verify(b"jpeg").await;

        assert!(!res.is_positive);
        assert_eq!(res.reason, "candle");
        assert_eq!(res.error, None);
        let calls = backend.calls.lock().clone();
        assert_eq!(
            calls,
            vec![("key-0".into(), "model-0".into()), ("key-1".into(), "model-0".into())]
        );
        // el intento exitoso usó (1, 0) y avanzó ambos cursores un paso
        assert_eq!(svc.rotator().cursor(), RotationCursor { credential: 2, model: 1 });
    }

    #[tokio::test]
    async fn model_unavailable_rotates_only_the_model() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            AttemptOutcome::failed(FailureKind::ModelUnavailable, "not found"),
            real_fire(),
        ]));
        let svc = service(2, 3, backend.clone());

        svc.verify(b"jpeg").await;

        let calls = backend.calls.lock().clone();
        assert_eq!(calls[0], ("key-0".into(), "model-0".into()));
        assert_eq!(calls[1], ("key-0".into(), "model-1".into()));
    }

    #[tokio::test]
    async fn malformed_and_revoked_rotate_the_credential() {
        let backend = Arc::new(ScriptedBackend::scripted(vec![
            AttemptOutcome::failed(FailureKind::MalformedResponse, "not json"),
            AttemptOutcome::failed(FailureKind::CredentialRevoked, "leaked"),
            real_fire(),
        ]));
        let svc = service(3, 1, backend.clone());

        let res = svc.verify(b"jpeg").await;

        assert_eq!(res.attempts, 3);
        let used: Vec<String> = backend.calls.lock().iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(used, vec!["key-0", "key-1", "key-2"]);
    }

    #[tokio::test]
    async fn empty_pool_fails_safe_without_calls() {
        let backend = Arc::new(ScriptedBackend::always(real_fire()));
        let svc = VerificationService::new(
            Arc::new(FailoverRotator::new(vec![" ".into()], models(2))),
            backend.clone(),
        );

        let res = svc.verify(b"jpeg").await;

        assert!(res.fail_safe && res.is_positive);
        assert_eq!(res.attempts, 0);
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_successes_never_fail_safe() {
        let backend = Arc::new(ScriptedBackend::always(real_fire()));
        let svc = Arc::new(service(3, 2, backend.clone()));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move { svc.verify(b"jpeg").await })
            })
            .collect();
        for t in tasks {
            let res = t.await.unwrap();
            assert!(!res.fail_safe);
            assert_eq!(res.attempts, 1);
        }

        assert_eq!(backend.calls.lock().len(), 10);
    }

    /// key-0 sin cuota; ambas llamadas esperan a la otra antes de responder.
    struct LockstepBackend {
        barrier: tokio::sync::Barrier,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VerificationBackendPort for LockstepBackend {
        async fn classify(&self, credential: &str, _model: &str, _image: &[u8]) -> AttemptOutcome {
            self.calls.lock().push(credential.to_string());
            if credential == "key-0" {
                self.barrier.wait().await;
                return AttemptOutcome::failed(FailureKind::QuotaExceeded, "HTTP 429");
            }
            real_fire()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_failures_on_same_pair_still_reach_the_healthy_key() {
        let backend = Arc::new(LockstepBackend {
            barrier: tokio::sync::Barrier::new(2),
            calls: Mutex::new(Vec::new()),
        });
        let svc = Arc::new(VerificationService::new(
            Arc::new(FailoverRotator::new(keys(2), models(1))),
            backend.clone(),
        ));

        let a = tokio::spawn({
            let svc = svc.clone();
            async move { svc.verify(b"jpeg").await }
        });
        let b = tokio::spawn({
            let svc = svc.clone();
            async move { svc.verify(b"jpeg").await }
        });

        for res in [a.await.unwrap(), b.await.unwrap()] {
            assert!(!res.fail_safe, "healthy key was never tried: {:?}", res.error);
            assert_eq!(res.attempts, 2);
        }
        let calls = backend.calls.lock().clone();
        assert_eq!(calls.iter().filter(|k| *k == "key-0").count(), 2);
        assert_eq!(calls.iter().filter(|k| *k == "key-1").count(), 2);
        assert_eq!(svc.rotator().cursor(), RotationCursor { credential: 0, model: 0 });
    }

    #[test]
    fn outcome_steps_from_the_attempted_pair() {
        let rotator = FailoverRotator::new(keys(3), models(2));
        let first = rotator.next_attempt().unwrap();
        // otra llamada ya movió el cursor
        rotator.record_outcome(&first, CursorStep::Credential);
        rotator.record_outcome(&first, CursorStep::Credential);
        assert_eq!(rotator.cursor(), RotationCursor { credential: 1, model: 0 });

        rotator.record_outcome(&first, CursorStep::Model);
        assert_eq!(rotator.cursor(), RotationCursor { credential: 0, model: 1 });
    }
}
