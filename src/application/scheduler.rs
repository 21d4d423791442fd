use std::collections::VecDeque;
use std::time::Duration;

use crate::domain::camera::Levers;

/// Por debajo de esta latencia media se considera tasa ilimitada.
const LATENCY_FLOOR_SECS: f32 = 1e-6;

#[derive(Debug, Clone)]
pub struct SchedulerParams {
    pub target_fps: f32,
    pub window: usize,
    pub min_scale: f32,
    pub scale_step: f32,
    pub max_skip: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            window: 20,
            min_scale: 0.3,
            scale_step: 0.8,
            max_skip: 5,
        }
    }
}

/// Controlador adaptativo de salto de frames y escala de entrada.
///
/// Mantiene una ventana circular de latencias y, tras cada inferencia, mueve
/// como mucho una palanca: primero el salto de frames, después la escala.
#[derive(Debug)]
pub struct AdaptiveScheduler {
    params: SchedulerParams,
    samples: VecDeque<Duration>,
    levers: Levers,
}

impl AdaptiveScheduler {
    pub fn new(params: SchedulerParams) -> Self {
        let window = params.window.max(1);
        Self {
            params: SchedulerParams { window, ..params },
            samples: VecDeque::with_capacity(window),
            levers: Levers::default(),
        }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    pub fn levers(&self) -> Levers {
        self.levers
    }

    /// `frame_index` empieza en 1. Sin frame anotado previo siempre se infiere.
    pub fn should_infer(&self, frame_index: u64, has_previous: bool) -> bool {
        !has_previous || frame_index % (self.levers.skip_count as u64 + 1) == 0
    }

    pub fn achieved_rate(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f32 = self.samples.iter().map(Duration::as_secs_f32).sum();
        let avg = total / self.samples.len() as f32;
        if avg < LATENCY_FLOOR_SECS {
            Some(f32::INFINITY)
        } else {
            Some(1.0 / avg)
        }
    }

    /// Registra una latencia y devuelve las palancas resultantes.
    pub fn record(&mut self, latency: Duration) -> Levers {
        if self.samples.len() == self.params.window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
        self.adjust();
        self.levers
    }

    fn adjust(&mut self) {
        let Some(rate) = self.achieved_rate() else { return };
        let p = &self.params;
        let lv = &mut self.levers;

        if rate < p.target_fps * 0.8 {
            if lv.skip_count < p.max_skip {
                lv.skip_count += 1;
            } else {
                lv.scale_factor = (lv.scale_factor * p.scale_step).max(p.min_scale);
            }
        } else if rate > p.target_fps * 1.2 {
            if lv.skip_count > 0 {
                lv.skip_count -= 1;
            } else {
                lv.scale_factor = (lv.scale_factor / p.scale_step).min(1.0);
            }
        }
    }
}
