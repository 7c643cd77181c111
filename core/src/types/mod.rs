pub(crate) mod config;
pub use config::{
    AcquisitionSettings, COMPRESSED_FILE, CaptureSettings, Config, ConfigError, ImageSettings,
    JPEG_FILE, MASTER_FILE, OverlaySettings, POINTER_FILE, PUBLIC_STATUS_FILE, Settings,
    SettingsError,
};

pub(crate) mod station;
pub use station::{DEFAULT_STATION_NUMBER, GRAPH_URL_TEMPLATE, StationNumber, StationNumberError};

pub(crate) mod status;
pub use status::StatusRecord;
