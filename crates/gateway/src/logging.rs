use crate::config::Config;
use common::TelemetryGuard;

pub fn setup_logging(config: &Config, telemetry: Option<&TelemetryGuard>) {
    common::setup_logging(config.log_level, config.environment, telemetry);
}
