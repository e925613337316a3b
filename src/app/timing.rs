use std::time::{Duration, Instant};
use winit::window::Window;

/// Frame cadence bookkeeping, reported in the window title.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_fps_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    render_ms: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: String, now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_fps_time: now,
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            render_ms: 0.0,
            base_title,
        }
    }

    pub fn set_base_title(&mut self, title: String) {
        self.base_title = title;
    }

    pub fn set_render_ms(&mut self, render_ms: f32) {
        self.render_ms = render_ms;
    }

    /// Count a frame. Returns the fps once per half second.
    pub fn update(&mut self, now: Instant) -> Option<f32> {
        let dt = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::from_millis(16),
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt.as_secs_f32().max(0.0);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_fps_time);
        if elapsed.as_secs_f32() < 0.5 {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed.as_secs_f32();
        self.frame_count = 0;
        self.last_fps_time = now;
        Some(fps)
    }

    pub fn title(&self, fps: f32) -> String {
        format!(
            "{} - {:.1} fps (cadence {:.2} ms, render {:.2} ms)",
            self.base_title,
            fps,
            self.frame_dt * 1000.0,
            self.render_ms
        )
    }

    pub fn update_title(&mut self, window: &Window, now: Instant) {
        if let Some(fps) = self.update(now) {
            window.set_title(&self.title(fps));
        }
    }
}

/// Frame interval for a target rate; non-positive rates fall back to 60 Hz.
pub fn interval_for_fps(fps: f32) -> Duration {
    if fps.is_finite() && fps > 0.0 {
        Duration::from_secs_f32(1.0 / fps)
    } else {
        Duration::from_secs_f32(1.0 / 60.0)
    }
}

/// Frame interval matching the window's monitor.
pub fn monitor_frame_interval(window: &Window) -> Duration {
    window
        .current_monitor()
        .and_then(|monitor| monitor.refresh_rate_millihertz())
        .map(|millihz| millihz as f32 / 1000.0)
        .filter(|hz| *hz > 1.0)
        .map(interval_for_fps)
        .unwrap_or(Duration::from_millis(16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reported_every_half_second() {
        let t0 = Instant::now();
        let mut timing = FrameTiming::new("unitview".to_string(), t0);
        let mut reports = Vec::new();
        for frame in 1..=60u64 {
            if let Some(fps) = timing.update(t0 + Duration::from_millis(frame * 20)) {
                reports.push(fps);
            }
        }
        assert_eq!(reports.len(), 2);
        assert!((reports[0] - 50.0).abs() < 1.0);
        assert!((timing.frame_dt - 0.02).abs() < 1e-4);
        assert!(timing.title(50.0).starts_with("unitview - 50.0 fps"));
    }

    #[test]
    fn preload_interval() {
        assert!((interval_for_fps(25.0).as_secs_f32() - 0.04).abs() < 1e-6);
        assert_eq!(interval_for_fps(0.0), interval_for_fps(60.0));
    }
}
