//! Viewer tuning.
//!
//! Every constant that shapes the viewer lives in [`ViewerConfig`]. Two
//! built-in presets cover the hover-highlight showcase and the per-unit
//! viewer; a JSON file can override any subset of fields on top of either.

use crate::render::intro::Easing;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Showcase,
    Individual,
}

impl Preset {
    pub fn config(self) -> ViewerConfig {
        match self {
            Self::Showcase => ViewerConfig::showcase(),
            Self::Individual => ViewerConfig::individual(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Showcase => "showcase",
            Self::Individual => "individual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_deg: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Bounding-box diagonal after scaling.
    pub target_size: f32,
    pub converted_roughness: f32,
    pub converted_metalness: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_size: 12.0 * 1.8,
            converted_roughness: 0.7,
            converted_metalness: 0.0,
        }
    }
}

/// Camera path of the intro. Offsets and radii are multiples of the
/// model's bounding-sphere radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntroPath {
    Linear {
        start_offset: [f32; 3],
        end_offset: [f32; 3],
    },
    Orbit {
        radius: f32,
        height: f32,
        start_angle: f32,
        end_angle: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntroConfig {
    pub duration_secs: f32,
    pub easing: Easing,
    pub path: IntroPath,
    pub reset_duration_secs: f32,
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            duration_secs: 1.5,
            easing: Easing::EaseOutCubic,
            path: IntroPath::Linear {
                start_offset: [0.0, 0.4, 1.3],
                end_offset: [0.0, 0.5, 1.6],
            },
            reset_duration_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleMode {
    /// Turn the model about its vertical axis.
    SpinModel,
    /// Move the camera on the intro orbit.
    OrbitCamera,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    pub mode: IdleMode,
    /// Radians per second.
    pub rate: f32,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            mode: IdleMode::SpinModel,
            rate: 0.06,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub damping: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar: f32,
    pub max_polar: f32,
    pub screen_space_panning: bool,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            damping: 0.05,
            rotate_speed: 0.7,
            pan_speed: 0.8,
            zoom_speed: 0.8,
            min_distance: 0.5,
            max_distance: 20.0,
            min_polar: 0.0,
            max_polar: PI / 2.35,
            screen_space_panning: true,
        }
    }
}

/// Rotate speed, damping and pan speed used inside one distance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlFeel {
    pub rotate_speed: f32,
    pub damping: f32,
    pub pan_speed: f32,
}

impl ControlFeel {
    pub const fn new(rotate_speed: f32, damping: f32, pan_speed: f32) -> Self {
        Self {
            rotate_speed,
            damping,
            pan_speed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub enabled: bool,
    /// Far, mid, close and very-close thresholds as fractions of model size.
    pub band_fractions: [f32; 4],
    /// Far, mid, close, very-close and inside.
    pub bands: [ControlFeel; 5],
    /// Re-pivot once the target is closer than this fraction of the close threshold.
    pub repivot_fraction: f32,
    pub repivot_min_distance: f32,
    pub repivot_lerp: f32,
    /// Per-frame chance of the forward ray probe.
    pub probe_chance: f32,
    pub probe_wall_distance: f32,
    pub probe_target_fraction: f32,
    pub probe_step: f32,
    pub probe_wall_lerp: f32,
    pub probe_lerp: f32,
    pub probe_far_factor: f32,
    pub probe_center_lerp: f32,
    /// Snap the target to the model center when a gesture ends near the model.
    pub recenter_on_end: bool,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            band_fractions: [0.8, 0.4, 0.2, 0.1],
            bands: [
                ControlFeel::new(0.7, 0.05, 0.8),
                ControlFeel::new(0.65, 0.07, 0.7),
                ControlFeel::new(0.55, 0.12, 0.6),
                ControlFeel::new(0.4, 0.25, 0.4),
                ControlFeel::new(0.3, 0.35, 0.25),
            ],
            repivot_fraction: 0.3,
            repivot_min_distance: 0.6,
            repivot_lerp: 0.06,
            probe_chance: 0.02,
            probe_wall_distance: 1.5,
            probe_target_fraction: 0.6,
            probe_step: 0.7,
            probe_wall_lerp: 0.03,
            probe_lerp: 0.05,
            probe_far_factor: 1.5,
            probe_center_lerp: 0.03,
            recenter_on_end: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub color: [f32; 3],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub roughness: f32,
    pub metalness: f32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            color: srgb_hex(0xFFECB3),
            emissive: srgb_hex(0xFFD54F),
            emissive_intensity: 0.5,
            roughness: 0.5,
            metalness: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    pub enabled: bool,
    pub debounce_ms: u64,
    pub unit_min: u32,
    pub unit_max: u32,
    pub highlight: HighlightConfig,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
            unit_min: 1,
            unit_max: 69,
            highlight: HighlightConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: f32,
    pub main_intensity: f32,
    /// Main light offset from the model center in bounding-sphere radii.
    pub main_offset: [f32; 3],
    pub shadow_map_size: u32,
    /// Shadow frustum half-size in radii, never below `shadow_min_extent`.
    pub shadow_extent: f32,
    pub shadow_min_extent: f32,
    pub shadow_bias: f32,
    pub fill_intensity: f32,
    pub fill_position: [f32; 3],
    pub exposure: f32,
    pub background: [f32; 3],
    pub environment: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: 0.6,
            main_intensity: 1.0,
            main_offset: [2.5, 1.5, 2.5],
            shadow_map_size: 2048,
            shadow_extent: 2.0,
            shadow_min_extent: 0.0,
            shadow_bias: -0.0005,
            fill_intensity: 0.3,
            fill_position: [-15.0, 10.0, -15.0],
            exposure: 1.5,
            background: srgb_hex(0xF5F5F5),
            environment: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GroundPlacement {
    /// Square of `size` at height `y`.
    Fixed { size: f32, y: f32 },
    /// Square of `factor * max(width, depth)` just under the model.
    Fitted { factor: f32, drop: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub enabled: bool,
    pub placement: GroundPlacement,
    pub opacity: f32,
    /// Keep the orbit target from sinking below the ground.
    pub clamp_target: bool,
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            placement: GroundPlacement::Fixed {
                size: 200.0,
                y: -0.1,
            },
            opacity: 0.8,
            clamp_target: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub preload_fps: f32,
    /// Coalesce resize events and apply them this long after the last one.
    pub resize_throttle_ms: Option<u64>,
    pub model_switch_debounce_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            preload_fps: 30.0,
            resize_throttle_ms: None,
            model_switch_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub normalize: NormalizeConfig,
    pub intro: IntroConfig,
    pub idle: IdleConfig,
    pub controls: ControlsConfig,
    pub tuner: TunerConfig,
    pub picking: PickingConfig,
    pub lighting: LightingConfig,
    pub ground: GroundConfig,
    pub frame: FrameConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::showcase()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ViewerConfig {
    pub fn showcase() -> Self {
        Self {
            camera: CameraConfig::default(),
            normalize: NormalizeConfig::default(),
            intro: IntroConfig::default(),
            idle: IdleConfig::default(),
            controls: ControlsConfig::default(),
            tuner: TunerConfig::default(),
            picking: PickingConfig::default(),
            lighting: LightingConfig::default(),
            ground: GroundConfig::default(),
            frame: FrameConfig::default(),
        }
    }

    pub fn individual() -> Self {
        Self {
            camera: CameraConfig {
                fov_deg: 55.0,
                ..CameraConfig::default()
            },
            normalize: NormalizeConfig {
                target_size: 15.0,
                ..NormalizeConfig::default()
            },
            intro: IntroConfig {
                easing: Easing::EaseInOutQuad,
                path: IntroPath::Orbit {
                    radius: 2.2,
                    height: 0.7,
                    start_angle: -PI / 4.0,
                    end_angle: 0.0,
                },
                ..IntroConfig::default()
            },
            idle: IdleConfig {
                mode: IdleMode::OrbitCamera,
                rate: 0.12,
            },
            controls: ControlsConfig {
                zoom_speed: 1.8,
                pan_speed: 1.8,
                max_polar: PI / 2.2,
                ..ControlsConfig::default()
            },
            tuner: TunerConfig {
                enabled: false,
                recenter_on_end: false,
                ..TunerConfig::default()
            },
            picking: PickingConfig {
                enabled: false,
                ..PickingConfig::default()
            },
            lighting: LightingConfig {
                main_offset: [1.5, 2.0, 1.5],
                shadow_map_size: 1024,
                shadow_min_extent: 5.0,
                ..LightingConfig::default()
            },
            ground: GroundConfig {
                placement: GroundPlacement::Fitted {
                    factor: 3.0,
                    drop: 0.01,
                },
                opacity: 0.22,
                clamp_target: true,
                ..GroundConfig::default()
            },
            frame: FrameConfig {
                preload_fps: 24.0,
                resize_throttle_ms: Some(100),
                ..FrameConfig::default()
            },
        }
    }

    /// Read a JSON override file and lay it over `base`.
    ///
    /// Fields absent from the file keep the preset's value, at any depth.
    pub fn load(path: &Path, base: Preset) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_over(&raw, base).map_err(|source| ConfigError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json_over(raw: &str, base: Preset) -> Result<Self, serde_json::Error> {
        let overrides: serde_json::Value = serde_json::from_str(raw)?;
        let mut merged = serde_json::to_value(base.config())?;
        merge_json(&mut merged, overrides);
        serde_json::from_value(merged)
    }
}

fn merge_json(base: &mut serde_json::Value, overrides: serde_json::Value) {
    match (base, overrides) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    // Tagged enums are replaced whole so a variant switch never keeps stale fields.
                    Some(existing) if value.get("kind").is_none() => merge_json(existing, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overrides) => *base = overrides,
    }
}

/// Linear RGB from an sRGB `0xRRGGBB` literal.
pub fn srgb_hex(hex: u32) -> [f32; 3] {
    let channel = |shift: u32| {
        let c = ((hex >> shift) & 0xFF) as f32 / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    [channel(16), channel(8), channel(0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_where_the_viewers_differ() {
        let showcase = ViewerConfig::showcase();
        let individual = ViewerConfig::individual();
        assert_eq!(showcase.lighting.shadow_map_size, 2048);
        assert_eq!(individual.lighting.shadow_map_size, 1024);
        assert!((showcase.normalize.target_size - 21.6).abs() < 1e-4);
        assert_eq!(individual.normalize.target_size, 15.0);
        assert_eq!(individual.idle.mode, IdleMode::OrbitCamera);
        assert!(showcase.picking.enabled && !individual.picking.enabled);
        assert_eq!(individual.frame.resize_throttle_ms, Some(100));
    }

    #[test]
    fn partial_json_keeps_preset_values() {
        let raw = r#"{ "lighting": { "ambient": 0.3 }, "frame": { "preload_fps": 12 } }"#;
        let config =
            ViewerConfig::from_json_over(raw, Preset::Individual).expect("override should parse");
        assert_eq!(config.lighting.ambient, 0.3);
        assert_eq!(config.lighting.shadow_map_size, 1024);
        assert_eq!(config.frame.preload_fps, 12.0);
        assert_eq!(config.frame.resize_throttle_ms, Some(100));
        assert_eq!(config.camera.fov_deg, 55.0);
    }

    #[test]
    fn tagged_variant_is_replaced_whole() {
        let raw = r#"{ "ground": { "placement": { "kind": "fixed", "size": 50.0, "y": 0.0 } } }"#;
        let config = ViewerConfig::from_json_over(raw, Preset::Individual);
        assert!(matches!(
            config.map(|c| c.ground.placement),
            Ok(GroundPlacement::Fixed { size, .. }) if size == 50.0
        ));
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(ViewerConfig::from_json_over("{ nope", Preset::Showcase).is_err());
    }

    #[test]
    fn srgb_white_is_one() {
        assert_eq!(srgb_hex(0xFFFFFF), [1.0, 1.0, 1.0]);
        assert_eq!(srgb_hex(0x000000), [0.0, 0.0, 0.0]);
    }
}
