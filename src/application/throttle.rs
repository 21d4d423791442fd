use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::{
    alert::ApprovedAlert,
    camera::{CameraState, CameraStatus},
    detection::Detection,
};

pub type CameraHandle = Arc<Mutex<CameraState>>;

/// Registro explícito de cámaras. El estado se crea al registrar, nunca al leer;
/// los identificadores desconocidos resuelven a la cámara por defecto.
pub struct CameraRegistry {
    default_id: String,
    default: CameraHandle,
    cameras: RwLock<HashMap<String, CameraHandle>>,
}

impl CameraRegistry {
    pub fn new(default_id: impl Into<String>, known: impl IntoIterator<Item = String>) -> Self {
        let default_id = default_id.into();
        let default: CameraHandle = Arc::default();
        let mut cameras: HashMap<String, CameraHandle> = known
            .into_iter()
            .filter(|id| !id.trim().is_empty())
            .map(|id| (id, Arc::default()))
            .collect();
        cameras.insert(default_id.clone(), default.clone());
        Self { default_id, default, cameras: RwLock::new(cameras) }
    }

    pub fn register(&self, camera_id: &str) -> CameraHandle {
        self.cameras
            .write()
            .entry(camera_id.to_string())
            .or_default()
            .clone()
    }

    pub fn resolve(&self, camera_id: Option<&str>) -> (String, CameraHandle) {
        if let Some(id) = camera_id {
            if let Some(handle) = self.cameras.read().get(id) {
                return (id.to_string(), handle.clone());
            }
            debug!(camera = id, fallback = %self.default_id, "Cámara no registrada, usando la cámara por defecto");
        }
        (self.default_id.clone(), self.default.clone())
    }

    pub fn statuses(&self, now: Instant) -> Vec<CameraStatus> {
        let mut out: Vec<CameraStatus> = self
            .cameras
            .read()
            .iter()
            .map(|(id, handle)| {
                let st = handle.lock();
                CameraStatus {
                    camera_id: id.clone(),
                    skip_count: st.levers.skip_count,
                    scale_factor: st.levers.scale_factor,
                    seconds_since_alert: st
                        .last_alert
                        .map(|t| now.saturating_duration_since(t).as_secs_f64()),
                }
            })
            .collect();
        out.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        out
    }
}

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub confidence_threshold: f32,
    pub alertable_classes: HashSet<String>,
    pub throttle_window: Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            alertable_classes: ["fire", "smoke"].iter().map(|s| s.to_string()).collect(),
            throttle_window: Duration::from_secs(5),
        }
    }
}

/// Motor de decisión: selección de la mejor detección y ventana de silencio por cámara.
pub struct DecisionEngine {
    policy: AlertPolicy,
    registry: Arc<CameraRegistry>,
}

impl DecisionEngine {
    pub fn new(policy: AlertPolicy, registry: Arc<CameraRegistry>) -> Self {
        Self { policy, registry }
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    /// La de mayor confianza entre las alertables; en empate gana la primera.
    pub fn select_best<'a>(&self, detections: &'a [Detection]) -> Option<&'a Detection> {
        let mut best: Option<&Detection> = None;
        for det in detections {
            if !self.policy.alertable_classes.contains(&det.class_label)
                || det.confidence <= self.policy.confidence_threshold
            {
                continue;
            }
            if best.map_or(true, |b| det.confidence > b.confidence) {
                best = Some(det);
            }
        }
        best
    }

    /// Decide si la detección del frame produce una alerta nueva.
    /// El estado se marca antes de cualquier E/S: un envío lento no puede duplicar.
    pub fn evaluate(
        &self,
        camera_id: Option<&str>,
        detections: &[Detection],
        now: Instant,
    ) -> Option<ApprovedAlert> {
        let best = self.select_best(detections)?;
        let (camera_id, handle) = self.registry.resolve(camera_id);

        let mut state = handle.lock();
        if let Some(last) = state.last_alert {
            if now.saturating_duration_since(last) < self.policy.throttle_window {
                debug!(camera = %camera_id, "Alerta suprimida por la ventana de silencio");
                return None;
            }
        }
        state.last_alert = Some(now);
        drop(state);

        Some(ApprovedAlert { camera_id, detection: best.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BBox;
    use std::sync::Barrier;

    fn det(class: &str, conf: f32) -> Detection {
        Detection::new(class, conf, BBox::new(10.0, 10.0, 50.0, 50.0))
    }

    fn engine(known: &[&str]) -> DecisionEngine {
        let registry = CameraRegistry::new("default_camera_id", known.iter().map(|s| s.to_string()));
        DecisionEngine::new(AlertPolicy::default(), Arc::new(registry))
    }

    #[test]
    fn picks_highest_alertable_and_first_on_ties() {
        let e = engine(&[]);
        let dets = vec![det("person", 0.99), det("smoke", 0.8), det("fire", 0.9), det("smoke", 0.9)];
        let best = e.select_best(&dets).unwrap();
        assert_eq!(best.class_label, "fire");
        assert_eq!(best.confidence, 0.9);
    }

    #[test]
    fn below_threshold_never_alerts() {
        let e = engine(&["cam1"]);
        let t0 = Instant::now();
        for s in 0..20 {
            let now = t0 + Duration::from_secs(s * 10);
            assert!(e.evaluate(Some("cam1"), &[det("fire", 0.6)], now).is_none());
        }
        // el umbral es estricto
        assert!(e.evaluate(Some("cam1"), &[det("fire", 0.75)], t0).is_none());
    }

    #[test]
    fn throttle_window_scenario() {
        let e = engine(&["cam1"]);
        let t0 = Instant::now();
        let fire = [det("fire", 0.9)];

        let first = e.evaluate(Some("cam1"), &fire, t0);
        assert_eq!(first.map(|a| a.camera_id).as_deref(), Some("cam1"));
        assert!(e.evaluate(Some("cam1"), &fire, t0 + Duration::from_secs(3)).is_none());
        assert!(e.evaluate(Some("cam1"), &fire, t0 + Duration::from_secs(6)).is_some());
    }

    #[test]
    fn suppressed_frame_does_not_extend_window() {
        let e = engine(&["cam1"]);
        let t0 = Instant::now();
        let fire = [det("fire", 0.9)];
        assert!(e.evaluate(Some("cam1"), &fire, t0).is_some());
        assert!(e.evaluate(Some("cam1"), &fire, t0 + Duration::from_millis(4900)).is_none());
        assert!(e.evaluate(Some("cam1"), &fire, t0 + Duration::from_secs(5)).is_some());
    }

    #[test]
    fn cameras_are_throttled_independently() {
        let e = engine(&["cam1", "cam2"]);
        let t0 = Instant::now();
        let fire = [det("fire", 0.9)];
        assert!(e.evaluate(Some("cam1"), &fire, t0).is_some());
        assert!(e.evaluate(Some("cam2"), &fire, t0).is_some());
    }

    #[test]
    fn unknown_camera_falls_back_to_default() {
        let e = engine(&["cam1"]);
        let t0 = Instant::now();
        let fire = [det("fire", 0.9)];
        let a = e.evaluate(Some("ghost"), &fire, t0).unwrap();
        assert_eq!(a.camera_id, "default_camera_id");
        // comparte ventana con la cámara por defecto
        assert!(e.evaluate(None, &fire, t0 + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn registration_creates_state_once() {
        let registry = CameraRegistry::new("default_camera_id", Vec::new());
        let a = registry.register("cam9");
        let b = registry.register("cam9");
        assert!(Arc::ptr_eq(&a, &b));
        let ids: Vec<String> = registry.statuses(Instant::now()).into_iter().map(|s| s.camera_id).collect();
        assert_eq!(ids, vec!["cam9".to_string(), "default_camera_id".to_string()]);
    }

    #[test]
    fn concurrent_qualifying_detections_approve_exactly_one() {
        let e = Arc::new(engine(&["cam1"]));
        let now = Instant::now();
        let workers = 16;
        let barrier = Arc::new(Barrier::new(workers));

        let approved: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let e = e.clone();
                    let barrier = barrier.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        e.evaluate(Some("cam1"), &[det("fire", 0.95)], now).is_some() as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(approved, 1);
    }
}
