//! Force Model
//!
//! Pure force terms acting on a vehicle. All vectors are world space, Newtons.
//! Resistive terms oppose the direction of travel and vanish at rest.

use glam::Vec3;

use crate::core::math::safe_normal;
use crate::vehicle::config::VehicleConfig;

/// Engine force along `forward` for the given throttle.
///
/// Magnitude is `driving_force_multiplier * mass * throttle`.
#[inline]
pub fn driving_force(throttle: f32, forward: Vec3, config: &VehicleConfig) -> Vec3 {
    forward * (config.driving_force_multiplier * config.mass * throttle)
}

/// Aerodynamic drag: `-v̂ * |v|² * drag_coefficient`.
#[inline]
pub fn air_resistance(velocity: Vec3, config: &VehicleConfig) -> Vec3 {
    -safe_normal(velocity) * velocity.length_squared() * config.drag_coefficient
}

/// Tyre rolling resistance: `-v̂ * rolling_coefficient * normal_force`.
#[inline]
pub fn rolling_resistance(velocity: Vec3, config: &VehicleConfig) -> Vec3 {
    -safe_normal(velocity) * config.rolling_coefficient * config.normal_force
}

/// Sum of all force terms.
#[inline]
pub fn net_force(throttle: f32, forward: Vec3, velocity: Vec3, config: &VehicleConfig) -> Vec3 {
    driving_force(throttle, forward, config)
        + air_resistance(velocity, config)
        + rolling_resistance(velocity, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_driving_force_magnitude() {
        let config = VehicleConfig::default();
        let force = driving_force(1.0, Vec3::X, &config);
        // 10 N/kg * 1000 kg
        assert_eq!(force, Vec3::new(10_000.0, 0.0, 0.0));

        let reverse = driving_force(-0.5, Vec3::X, &config);
        assert_eq!(reverse, Vec3::new(-5_000.0, 0.0, 0.0));
    }

    #[test]
    fn test_resistance_at_rest_is_zero() {
        let config = VehicleConfig::default();
        assert_eq!(air_resistance(Vec3::ZERO, &config), Vec3::ZERO);
        assert_eq!(rolling_resistance(Vec3::ZERO, &config), Vec3::ZERO);
        assert_eq!(net_force(0.0, Vec3::X, Vec3::ZERO, &config), Vec3::ZERO);
    }

    #[test]
    fn test_air_resistance_quadratic() {
        let config = VehicleConfig::default();
        let drag = air_resistance(Vec3::new(10.0, 0.0, 0.0), &config);
        // 10² * 16
        assert!((drag.x + 1600.0).abs() < 1e-2);
        assert_eq!(drag.y, 0.0);
    }

    #[test]
    fn test_rolling_resistance_constant_magnitude() {
        let config = VehicleConfig::default();
        let slow = rolling_resistance(Vec3::new(0.1, 0.0, 0.0), &config);
        let fast = rolling_resistance(Vec3::new(0.0, 40.0, 0.0), &config);
        let expected = config.rolling_coefficient * config.normal_force;
        assert!((slow.length() - expected).abs() < 1e-6);
        assert!((fast.length() - expected).abs() < 1e-6);
        assert!(fast.y < 0.0);
    }

    fn velocity_strategy() -> impl Strategy<Value = Vec3> {
        (-80.0f32..80.0, -80.0f32..80.0, -10.0f32..10.0)
            .prop_map(|(x, y, z)| Vec3::new(x, y, z))
            .prop_filter("non-zero", |v| v.length() > 1e-3)
    }

    proptest! {
        #[test]
        fn prop_air_resistance_anti_parallel(v in velocity_strategy()) {
            let config = VehicleConfig::default();
            let drag = air_resistance(v, &config);
            let cos = drag.normalize().dot(v.normalize());
            prop_assert!((cos + 1.0).abs() < 1e-4, "cos = {}", cos);
        }

        #[test]
        fn prop_rolling_resistance_anti_parallel(v in velocity_strategy()) {
            let config = VehicleConfig::default();
            let roll = rolling_resistance(v, &config);
            prop_assert!(roll.normalize().dot(v.normalize()) < -0.9999);
        }
    }
}
