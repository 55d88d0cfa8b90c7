//! Vehicle Configuration
//!
//! Tuning constants per vehicle type, plus the two startup collaborators the
//! configuration is derived from: the input-mapping table (axis bounds) and
//! the world's gravity (rolling-resistance normal force).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::vehicle::input::{AxisBounds, ControlAxis};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An axis has no scale values in the input mapping.
    #[error("input axis {0:?} has no mapped scales")]
    UnmappedAxis(String),

    /// A mapped scale is NaN or infinite.
    #[error("input axis {axis:?} has non-finite scale {scale}")]
    InvalidScale {
        /// Axis name.
        axis: String,
        /// Offending scale.
        scale: f32,
    },

    /// Bounds are non-finite or do not contain zero.
    #[error("invalid axis bounds [{min}, {max}]")]
    InvalidBounds {
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// A tuning constant is out of its legal range.
    #[error("invalid tuning value {name} = {value}")]
    InvalidTuning {
        /// Field name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// Settings file could not be read.
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid TOML for the settings schema.
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
}

// =============================================================================
// STEERING
// =============================================================================

/// How steering input turns the vehicle.
///
/// The two models are alternate configurations; a vehicle uses exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SteeringModel {
    /// Turn rate proportional to forward speed; a vehicle at rest cannot turn.
    TurningRadius {
        /// Radius of the tightest turn at full lock (m).
        minimum_turning_radius: f32,
    },
    /// Fixed yaw rate at full lock, independent of speed.
    FixedRate {
        /// Yaw rate at full lock (degrees/second).
        max_degrees_per_second: f32,
    },
}

impl Default for SteeringModel {
    fn default() -> Self {
        SteeringModel::TurningRadius {
            minimum_turning_radius: 10.0,
        }
    }
}

// =============================================================================
// TUNING
// =============================================================================

/// Per-vehicle-type tuning constants as written in settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleTuning {
    /// Force at full throttle per kilogram of mass (N/kg).
    pub driving_force_multiplier: f32,
    /// Vehicle mass (kg).
    pub mass: f32,
    /// Air resistance. Higher means more drag.
    pub drag_coefficient: f32,
    /// Tyre rolling resistance. Higher means more drag.
    pub rolling_coefficient: f32,
    /// Steering model and its parameter.
    pub steering: SteeringModel,
}

impl Default for VehicleTuning {
    fn default() -> Self {
        Self {
            driving_force_multiplier: 10.0,
            mass: 1000.0,
            drag_coefficient: 16.0,
            rolling_coefficient: 0.015,
            steering: SteeringModel::default(),
        }
    }
}

impl VehicleTuning {
    /// Check every constant is finite and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |name: &'static str, value: f32, positive: bool| {
            let ok = value.is_finite() && if positive { value > 0.0 } else { value >= 0.0 };
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidTuning { name, value })
            }
        };

        check("driving_force_multiplier", self.driving_force_multiplier, false)?;
        check("mass", self.mass, true)?;
        check("drag_coefficient", self.drag_coefficient, false)?;
        check("rolling_coefficient", self.rolling_coefficient, false)?;
        match self.steering {
            SteeringModel::TurningRadius { minimum_turning_radius } => {
                check("minimum_turning_radius", minimum_turning_radius, true)
            }
            SteeringModel::FixedRate { max_degrees_per_second } => {
                check("max_degrees_per_second", max_degrees_per_second, false)
            }
        }
    }
}

// =============================================================================
// STARTUP COLLABORATORS
// =============================================================================

/// Source of per-axis scale values (the host's input-mapping table).
pub trait InputMapping {
    /// All scales configured for the named axis, positive and negative.
    fn axis_scales(&self, axis_name: &str) -> Vec<f32>;
}

/// Input mapping held as a plain table, loadable from settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticInputMapping {
    axes: BTreeMap<String, Vec<f32>>,
}

impl StaticInputMapping {
    /// Empty mapping.
    pub fn new() -> Self {
        Self { axes: BTreeMap::new() }
    }

    /// Builder-style axis registration.
    pub fn with_axis(mut self, name: impl Into<String>, scales: Vec<f32>) -> Self {
        self.axes.insert(name.into(), scales);
        self
    }
}

impl Default for StaticInputMapping {
    /// Keyboard-style mapping: one key per direction at full scale.
    fn default() -> Self {
        Self::new()
            .with_axis(ControlAxis::Throttle.mapping_name(), vec![1.0, -1.0])
            .with_axis(ControlAxis::Steering.mapping_name(), vec![1.0, -1.0])
    }
}

impl InputMapping for StaticInputMapping {
    fn axis_scales(&self, axis_name: &str) -> Vec<f32> {
        self.axes.get(axis_name).cloned().unwrap_or_default()
    }
}

/// Source of the world's gravitational acceleration.
pub trait GravityProvider {
    /// Magnitude of gravitational acceleration (m/s²).
    fn gravity_magnitude(&self) -> f32;
}

/// World-level physical settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Gravitational acceleration (m/s²). Sign is ignored.
    pub gravity: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self { gravity: 9.81 }
    }
}

impl GravityProvider for WorldSettings {
    fn gravity_magnitude(&self) -> f32 {
        self.gravity.abs()
    }
}

// =============================================================================
// RESOLVED CONFIG
// =============================================================================

/// Immutable configuration a vehicle is simulated with.
///
/// Built once at startup; the axis bounds and normal force are resolved from
/// the collaborators here and never re-read.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VehicleConfig {
    /// Force at full throttle per kilogram of mass (N/kg).
    pub driving_force_multiplier: f32,
    /// Vehicle mass (kg).
    pub mass: f32,
    /// Air resistance coefficient.
    pub drag_coefficient: f32,
    /// Rolling resistance coefficient.
    pub rolling_coefficient: f32,
    /// Normal force for rolling resistance.
    pub normal_force: f32,
    /// Steering model.
    pub steering: SteeringModel,
    /// Legal throttle range (backward scale to forward scale).
    pub throttle_bounds: AxisBounds,
    /// Legal steering range (left scale to right scale).
    pub steering_bounds: AxisBounds,
}

impl VehicleConfig {
    /// Resolve tuning against the startup collaborators.
    pub fn new(
        tuning: &VehicleTuning,
        mapping: &dyn InputMapping,
        gravity: &dyn GravityProvider,
    ) -> Result<Self, ConfigError> {
        tuning.validate()?;

        let bounds_for = |axis: ControlAxis| {
            let name = axis.mapping_name();
            AxisBounds::from_scales(name, &mapping.axis_scales(name))
        };

        let normal_force = gravity.gravity_magnitude();
        if !normal_force.is_finite() {
            return Err(ConfigError::InvalidTuning {
                name: "gravity",
                value: normal_force,
            });
        }

        Ok(Self {
            driving_force_multiplier: tuning.driving_force_multiplier,
            mass: tuning.mass,
            drag_coefficient: tuning.drag_coefficient,
            rolling_coefficient: tuning.rolling_coefficient,
            normal_force,
            steering: tuning.steering,
            throttle_bounds: bounds_for(ControlAxis::Throttle)?,
            steering_bounds: bounds_for(ControlAxis::Steering)?,
        })
    }

    /// Bounds for one axis.
    #[inline]
    pub fn bounds(&self, axis: ControlAxis) -> AxisBounds {
        match axis {
            ControlAxis::Throttle => self.throttle_bounds,
            ControlAxis::Steering => self.steering_bounds,
        }
    }
}

impl Default for VehicleConfig {
    /// Default tuning, keyboard mapping, Earth gravity.
    fn default() -> Self {
        let tuning = VehicleTuning::default();
        Self {
            driving_force_multiplier: tuning.driving_force_multiplier,
            mass: tuning.mass,
            drag_coefficient: tuning.drag_coefficient,
            rolling_coefficient: tuning.rolling_coefficient,
            normal_force: WorldSettings::default().gravity_magnitude(),
            steering: tuning.steering,
            throttle_bounds: AxisBounds::UNIT,
            steering_bounds: AxisBounds::UNIT,
        }
    }
}
