use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::adapters::video::VideoBackend;
use crate::application::{scheduler::SchedulerParams, throttle::AlertPolicy};
use crate::domain::model::{InferenceConfig, ModelId, YoloParams};

/// Configuración completa del servicio, leída de variables de entorno.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub temp_dir: String,
    pub snapshot_dir: String,
    pub static_dir: String,
    pub max_upload_bytes: usize,

    pub webcam_device: u32,
    pub video_backend: VideoBackend,
    pub ffmpeg_bin: String,
    pub jpeg_quality: u8,

    pub inference: InferenceConfig,
    pub detection_timeout: Duration,

    pub alert_policy: AlertPolicy,
    pub default_camera_id: String,
    pub camera_ids: Vec<String>,
    pub scheduler: SchedulerParams,

    pub alert_url: String,
    pub service_key: String,
    pub embed_snapshot: bool,
    pub dispatch_timeout: Duration,

    pub gemini_api_keys: Vec<String>,
    pub gemini_models: Vec<String>,
    pub gemini_base_url: String,
    pub verify_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lee la configuración con un proveedor de variables arbitrario.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let class_names = env.list("MODEL_CLASSES", "fire,smoke");
        let alert_classes: HashSet<String> = env.list("ALERT_CLASSES", "fire,smoke").into_iter().collect();

        let cfg = Self {
            host: env.string("HOST", "0.0.0.0"),
            port: env.parse("PORT", 8000)?,
            temp_dir: env.string("TEMP_DIR", "temp_videos"),
            snapshot_dir: env.string("SNAPSHOT_DIR", "saved_snapshots"),
            static_dir: env.string("STATIC_DIR", "static"),
            max_upload_bytes: env.parse::<usize>("MAX_UPLOAD_MB", 512)? * 1024 * 1024,

            webcam_device: env.parse("WEBCAM_DEVICE", 0)?,
            video_backend: env
                .string("VIDEO_BACKEND", "ffmpeg")
                .parse()
                .map_err(|e: String| anyhow::anyhow!("VIDEO_BACKEND: {e}"))?,
            ffmpeg_bin: env.string("FFMPEG_BIN", "ffmpeg"),
            jpeg_quality: env.parse("JPEG_QUALITY", 80)?,

            inference: InferenceConfig {
                model: ModelId {
                    name: "fire-smoke".into(),
                    onnx_path: env.string("MODEL_PATH", "models/best.onnx"),
                },
                params: YoloParams {
                    input_size: env.parse("MODEL_INPUT_SIZE", 640)?,
                    conf_threshold: env.parse("MODEL_CONF_THRESHOLD", 0.25)?,
                    iou_threshold: env.parse("MODEL_IOU_THRESHOLD", 0.45)?,
                    max_detections: env.parse("MODEL_MAX_DETECTIONS", 100)?,
                    class_names,
                },
            },
            detection_timeout: Duration::from_millis(env.parse("DETECTION_TIMEOUT_MS", 2000)?),

            alert_policy: AlertPolicy {
                confidence_threshold: env.parse("ALERT_CONFIDENCE_THRESHOLD", 0.75)?,
                alertable_classes: alert_classes,
                throttle_window: Duration::from_secs_f64(env.parse("THROTTLE_SECONDS", 5.0)?),
            },
            default_camera_id: env.string("DEFAULT_CAMERA_ID", "default_camera_id"),
            camera_ids: env.list("CAMERA_IDS", ""),
            scheduler: SchedulerParams {
                target_fps: env.parse("TARGET_FPS", 30.0)?,
                window: env.parse("ADAPT_WINDOW", 20)?,
                min_scale: env.parse("MIN_SCALE", 0.3)?,
                scale_step: env.parse("SCALE_STEP", 0.8)?,
                max_skip: env.parse("MAX_SKIP", 5)?,
            },

            alert_url: env.string("NEXTJS_API_URL", "http://localhost:3000/api/alerts/trigger"),
            service_key: env.string("SERVICE_KEY", "my_secret_service_key"),
            embed_snapshot: env.flag("EMBED_SNAPSHOT", false)?,
            dispatch_timeout: Duration::from_secs(env.parse("DISPATCH_TIMEOUT_SECS", 10)?),

            gemini_api_keys: env.list("GEMINI_API_KEYS", ""),
            gemini_models: env.list("GEMINI_MODELS", "gemini-2.0-flash,gemini-1.5-flash,gemini-1.5-pro"),
            gemini_base_url: env.string("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com"),
            verify_timeout: Duration::from_secs(env.parse("VERIFY_TIMEOUT_SECS", 30)?),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| -> Result<()> {
            if !(0.0..=1.0).contains(&v) {
                bail!("{name} debe estar en [0, 1], recibido {v}");
            }
            Ok(())
        };
        unit("MODEL_CONF_THRESHOLD", self.inference.params.conf_threshold)?;
        unit("MODEL_IOU_THRESHOLD", self.inference.params.iou_threshold)?;
        unit("ALERT_CONFIDENCE_THRESHOLD", self.alert_policy.confidence_threshold)?;

        let s = &self.scheduler;
        if !(s.min_scale > 0.0 && s.min_scale <= 1.0) {
            bail!("MIN_SCALE debe cumplir 0 < MIN_SCALE <= 1");
        }
        if !(s.scale_step > 0.0 && s.scale_step < 1.0) {
            bail!("SCALE_STEP debe cumplir 0 < SCALE_STEP < 1");
        }
        if s.target_fps <= 0.0 {
            bail!("TARGET_FPS debe ser positivo");
        }
        if s.window == 0 {
            bail!("ADAPT_WINDOW debe ser >= 1");
        }
        if self.detection_timeout.is_zero() || self.dispatch_timeout.is_zero() || self.verify_timeout.is_zero() {
            bail!("Los timeouts deben ser mayores que cero");
        }
        if self.alert_policy.throttle_window.is_zero() {
            bail!("THROTTLE_SECONDS debe ser mayor que cero");
        }
        if self.inference.params.class_names.is_empty() {
            bail!("MODEL_CLASSES no puede estar vacío");
        }
        if self.inference.params.input_size == 0 {
            bail!("MODEL_INPUT_SIZE debe ser positivo");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("JPEG_QUALITY debe estar en [1, 100]");
        }
        if self.default_camera_id.trim().is_empty() {
            bail!("DEFAULT_CAMERA_ID no puede estar vacío");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            Some(v) => v
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("Valor inválido para {key}: {v:?}")),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.raw(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(v) => bail!("Valor inválido para {key}: {v:?}"),
        }
    }

    fn list(&self, key: &str, default: &str) -> Vec<String> {
        self.string(key, default)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.alert_policy.confidence_threshold, 0.75);
        assert_eq!(cfg.alert_policy.throttle_window, Duration::from_secs(5));
        assert!(cfg.alert_policy.alertable_classes.contains("smoke"));
        assert_eq!(cfg.scheduler.max_skip, 5);
        assert_eq!(cfg.default_camera_id, "default_camera_id");
        assert_eq!(cfg.gemini_models.len(), 3);
        assert!(cfg.gemini_api_keys.is_empty());
        assert_eq!(cfg.video_backend, VideoBackend::Ffmpeg);
        assert!(!cfg.embed_snapshot);
    }

    #[test]
    fn lists_are_trimmed() {
        let cfg = load(&[("GEMINI_API_KEYS", " a, ,b "), ("CAMERA_IDS", "cam1,cam2")]).unwrap();
        assert_eq!(cfg.gemini_api_keys, vec!["a", "b"]);
        assert_eq!(cfg.camera_ids, vec!["cam1", "cam2"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("ALERT_CONFIDENCE_THRESHOLD", "1.5")]).is_err());
        assert!(load(&[("MIN_SCALE", "0")]).is_err());
        assert!(load(&[("SCALE_STEP", "1.0")]).is_err());
        assert!(load(&[("TARGET_FPS", "0")]).is_err());
        assert!(load(&[("ADAPT_WINDOW", "0")]).is_err());
        assert!(load(&[("PORT", "http")]).is_err());
        assert!(load(&[("EMBED_SNAPSHOT", "maybe")]).is_err());
        assert!(load(&[("MODEL_CLASSES", " , ")]).is_err());
        assert!(load(&[("VIDEO_BACKEND", "gstreamer")]).is_err());
    }
}
