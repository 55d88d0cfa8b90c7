//! Settings File
//!
//! Everything a session is started with, loadable from one TOML file:
//!
//! ```toml
//! [session]
//! tick_rate = 60
//! network_update_rate = 10.0
//!
//! [vehicle]
//! mass = 1000.0
//! [vehicle.steering]
//! model = "turning_radius"
//! minimum_turning_radius = 10.0
//!
//! [input]
//! MoveForward = [1.0, -1.0]
//! MoveRight = [1.0, -1.0]
//!
//! [world]
//! gravity = 9.81
//! ```
//!
//! Every section and field is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::network::session::SessionConfig;
use crate::vehicle::config::{ConfigError, StaticInputMapping, VehicleConfig, VehicleTuning, WorldSettings};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "KART_CONFIG";

/// Complete startup settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session loop rates and diagnostics.
    pub session: SessionConfig,
    /// Vehicle tuning.
    pub vehicle: VehicleTuning,
    /// Input-mapping table (axis name → scales).
    pub input: StaticInputMapping,
    /// World physics.
    pub world: WorldSettings,
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load from the file named by `KART_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check values that would make the session unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.tick_rate == 0 {
            return Err(ConfigError::InvalidTuning {
                name: "tick_rate",
                value: 0.0,
            });
        }
        self.vehicle.validate()
    }

    /// Resolve the vehicle configuration against the input table and world.
    pub fn vehicle_config(&self) -> Result<VehicleConfig, ConfigError> {
        VehicleConfig::new(&self.vehicle, &self.input, &self.world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::config::SteeringModel;
    use crate::vehicle::input::ControlAxis;

    #[test]
    fn test_empty_file_is_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.vehicle_config().unwrap(), VehicleConfig::default());
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml_str(
            r#"
            [session]
            tick_rate = 30
            network_update_rate = 5.0
            debug_dump_interval = 90
            record_inputs = false
            input_log_window = 600

            [vehicle]
            mass = 750.0
            [vehicle.steering]
            model = "fixed_rate"
            max_degrees_per_second = 120.0

            [input]
            MoveForward = [1.0, -0.5]
            MoveRight = [0.8, -0.8]

            [world]
            gravity = -3.7
            "#,
        )
        .unwrap();

        assert_eq!(settings.session.tick_rate, 30);
        assert!(!settings.session.record_inputs);
        assert_eq!(settings.session.input_log_window, 600);
        assert_eq!(
            settings.vehicle.steering,
            SteeringModel::FixedRate { max_degrees_per_second: 120.0 }
        );

        let config = settings.vehicle_config().unwrap();
        assert_eq!(config.mass, 750.0);
        assert_eq!(config.normal_force, 3.7);
        assert_eq!(config.bounds(ControlAxis::Throttle).min(), -0.5);
        assert_eq!(config.bounds(ControlAxis::Steering).max(), 0.8);
    }

    #[test]
    fn test_zero_tick_rate_rejected() {
        let err = Settings::from_toml_str("[session]\ntick_rate = 0").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTuning { name: "tick_rate", .. }));
    }

    #[test]
    fn test_malformed_file() {
        assert!(matches!(
            Settings::from_toml_str("[vehicle]\nmass = \"heavy\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Settings::load("/nonexistent/kart.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_sample_file_parses() {
        let settings = Settings::from_toml_str(include_str!("../config/kart.toml")).unwrap();
        assert!(settings.vehicle_config().is_ok());
    }
}
