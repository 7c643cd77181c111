pub mod core;
pub mod types;

pub use crate::core::acquisition::{BrowserExporter, ChartExporter};
pub use crate::core::{GraphCapture, RunOutcome};
