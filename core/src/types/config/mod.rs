mod core;
mod settings;

pub use self::core::{
    COMPRESSED_FILE, Config, ConfigError, JPEG_FILE, MASTER_FILE, POINTER_FILE, PUBLIC_STATUS_FILE,
};
pub use self::settings::{
    AcquisitionSettings, CaptureSettings, ImageSettings, OverlaySettings, Settings,
    SettingsError,
};
