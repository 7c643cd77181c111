use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Tunable pipeline settings, optionally persisted as a TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub image: ImageSettings,
    #[serde(default)]
    pub overlay: OverlaySettings,
}

impl Settings {
    /// Loads settings from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Validates settings values and returns list of validation errors.
    /// Returns empty vec if settings are valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.capture.retry_count == 0 {
            errors.push("retry_count must be at least 1".to_string());
        }
        if self.capture.stale_threshold_hours == 0 {
            errors.push("stale_threshold_hours must be at least 1".to_string());
        }
        if self.acquisition.step_timeout_secs == 0 {
            errors.push("step_timeout_secs must be at least 1".to_string());
        }
        if self.image.target_width == 0 || self.image.target_height == 0 {
            errors.push("target_width and target_height must be at least 1".to_string());
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            errors.push("jpeg_quality must be between 1 and 100".to_string());
        }
        if !(2..=256).contains(&self.image.palette_colors) {
            errors.push("palette_colors must be between 2 and 256".to_string());
        }
        if !(self.overlay.font_size_ratio > 0.0 && self.overlay.font_size_ratio <= 1.0) {
            errors.push("font_size_ratio must be in (0, 1]".to_string());
        }
        if !(self.overlay.max_text_width_ratio > 0.0 && self.overlay.max_text_width_ratio <= 1.0)
        {
            errors.push("max_text_width_ratio must be in (0, 1]".to_string());
        }

        errors
    }

    /// Returns validated settings, replacing invalid values with defaults.
    pub fn with_defaults_for_invalid(&self) -> Self {
        let defaults = Self::default();
        let mut fixed = self.clone();

        if fixed.capture.retry_count == 0 {
            fixed.capture.retry_count = defaults.capture.retry_count;
        }
        if fixed.capture.stale_threshold_hours == 0 {
            fixed.capture.stale_threshold_hours = defaults.capture.stale_threshold_hours;
        }
        if fixed.acquisition.step_timeout_secs == 0 {
            fixed.acquisition.step_timeout_secs = defaults.acquisition.step_timeout_secs;
        }
        if fixed.image.target_width == 0 || fixed.image.target_height == 0 {
            fixed.image.target_width = defaults.image.target_width;
            fixed.image.target_height = defaults.image.target_height;
        }
        if !(1..=100).contains(&fixed.image.jpeg_quality) {
            fixed.image.jpeg_quality = defaults.image.jpeg_quality;
        }
        if !(2..=256).contains(&fixed.image.palette_colors) {
            fixed.image.palette_colors = defaults.image.palette_colors;
        }
        if !(fixed.overlay.font_size_ratio > 0.0 && fixed.overlay.font_size_ratio <= 1.0) {
            fixed.overlay.font_size_ratio = defaults.overlay.font_size_ratio;
        }
        if !(fixed.overlay.max_text_width_ratio > 0.0 && fixed.overlay.max_text_width_ratio <= 1.0)
        {
            fixed.overlay.max_text_width_ratio = defaults.overlay.max_text_width_ratio;
        }

        fixed
    }
}

/// Retry and staleness settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_stale_threshold_hours")]
    pub stale_threshold_hours: u32,
}

impl CaptureSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn stale_threshold(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::hours(i64::from(self.stale_threshold_hours))
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay_secs(),
            stale_threshold_hours: default_stale_threshold_hours(),
        }
    }
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_stale_threshold_hours() -> u32 {
    12
}

/// Browser driving settings. Selectors track the upstream page structure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSettings {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_container_selector")]
    pub container_selector: String,
    #[serde(default = "default_menu_button_selector")]
    pub menu_button_selector: String,
    #[serde(default = "default_export_option_text")]
    pub export_option_text: String,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub no_sandbox: bool,
    /// Browser binary; auto-detected (or `CHROME`) when unset.
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
}

impl AcquisitionSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            container_selector: default_container_selector(),
            menu_button_selector: default_menu_button_selector(),
            export_option_text: default_export_option_text(),
            step_timeout_secs: default_step_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            no_sandbox: false,
            chrome_executable: None,
        }
    }
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_container_selector() -> String {
    "#container3".to_string()
}

fn default_menu_button_selector() -> String {
    r#"button.highcharts-a11y-proxy-element[aria-label*="Détail des prochains jours"]"#.to_string()
}

fn default_export_option_text() -> String {
    "Télécharger l'image PNG".to_string()
}

fn default_step_timeout_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    1000
}

/// Output image geometry and encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default = "default_crop_bottom_px")]
    pub crop_bottom_px: u32,
    #[serde(default = "default_target_width")]
    pub target_width: u32,
    #[serde(default = "default_target_height")]
    pub target_height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_palette_colors")]
    pub palette_colors: u16,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            crop_bottom_px: default_crop_bottom_px(),
            target_width: default_target_width(),
            target_height: default_target_height(),
            jpeg_quality: default_jpeg_quality(),
            palette_colors: default_palette_colors(),
        }
    }
}

fn default_crop_bottom_px() -> u32 {
    40
}

fn default_target_width() -> u32 {
    720
}

fn default_target_height() -> u32 {
    437
}

fn default_jpeg_quality() -> u8 {
    75
}

fn default_palette_colors() -> u16 {
    256
}

/// Stale warning banner appearance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlaySettings {
    #[serde(default = "default_warning_text")]
    pub warning_text: String,
    #[serde(default = "default_font_path")]
    pub font_path: PathBuf,
    #[serde(default = "default_font_size_ratio")]
    pub font_size_ratio: f32,
    #[serde(default = "default_max_text_width_ratio")]
    pub max_text_width_ratio: f32,
    #[serde(default = "default_top_margin_ratio")]
    pub top_margin_ratio: f32,
    #[serde(default = "default_text_color")]
    pub text_color: [u8; 3],
    #[serde(default = "default_banner_alpha")]
    pub banner_alpha: u8,
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            warning_text: default_warning_text(),
            font_path: default_font_path(),
            font_size_ratio: default_font_size_ratio(),
            max_text_width_ratio: default_max_text_width_ratio(),
            top_margin_ratio: default_top_margin_ratio(),
            text_color: default_text_color(),
            banner_alpha: default_banner_alpha(),
            padding: default_padding(),
            stroke_width: default_stroke_width(),
        }
    }
}

fn default_warning_text() -> String {
    "DONNÉES PÉRIMÉES ET IMPRÉCISES".to_string()
}

fn default_font_path() -> PathBuf {
    PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf")
}

fn default_font_size_ratio() -> f32 {
    0.05
}

fn default_max_text_width_ratio() -> f32 {
    0.90
}

fn default_top_margin_ratio() -> f32 {
    0.02
}

fn default_text_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_banner_alpha() -> u8 {
    128
}

fn default_padding() -> u32 {
    10
}

fn default_stroke_width() -> u32 {
    2
}

/// Errors that can occur when loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
