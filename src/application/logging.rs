//! Default [`LogHandler`] backed by `tracing`

use tracing::{debug, error, info, warn};

use crate::domain::LogHandler;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogHandler;

impl LogHandler for TracingLogHandler {
    fn debug(&self, message: &str) {
        debug!("{}", message);
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }

    fn feature_event(&self, feature: &str, charge_point_id: &str, text: &str) {
        info!(feature, charge_point_id, "{}", text);
    }
}

#[cfg(test)]
pub use recording::RecordingLogHandler;
