//! Control Input and Validation
//!
//! Control axes, the validator that keeps authority-side input within the
//! configured legal bounds, and a delta-compressed log of applied input.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::vehicle::config::ConfigError;

// =============================================================================
// CONTROL AXES
// =============================================================================

/// Logical control axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAxis {
    /// Forward/backward (throttle).
    Throttle,
    /// Left/right (steering).
    Steering,
}

impl ControlAxis {
    /// Both axes, throttle first.
    pub const ALL: [ControlAxis; 2] = [ControlAxis::Throttle, ControlAxis::Steering];

    /// Axis name in the input-mapping configuration.
    pub fn mapping_name(self) -> &'static str {
        match self {
            ControlAxis::Throttle => "MoveForward",
            ControlAxis::Steering => "MoveRight",
        }
    }
}

impl fmt::Display for ControlAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlAxis::Throttle => f.write_str("throttle"),
            ControlAxis::Steering => f.write_str("steering"),
        }
    }
}

/// Throttle and steering for one step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Forward/backward intent.
    pub throttle: f32,
    /// Lateral intent.
    pub steering: f32,
}

impl ControlFrame {
    /// No input.
    pub const NEUTRAL: Self = Self {
        throttle: 0.0,
        steering: 0.0,
    };

    /// Create a frame.
    pub const fn new(throttle: f32, steering: f32) -> Self {
        Self { throttle, steering }
    }

    /// Value of one axis.
    #[inline]
    pub fn axis(&self, axis: ControlAxis) -> f32 {
        match axis {
            ControlAxis::Throttle => self.throttle,
            ControlAxis::Steering => self.steering,
        }
    }

    /// Overwrite one axis.
    #[inline]
    pub fn set_axis(&mut self, axis: ControlAxis, value: f32) {
        match axis {
            ControlAxis::Throttle => self.throttle = value,
            ControlAxis::Steering => self.steering = value,
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Outcome of validating one proposed control value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidationResult {
    /// Whether the proposed value was inside the bounds.
    pub accepted: bool,
    /// The value to apply; always inside the bounds.
    pub clamped_value: f32,
}

/// Validate `proposed` against `[min_bound, max_bound]`.
///
/// Accepted iff `min_bound <= proposed <= max_bound`. The clamped value is
/// always inside the bounds, including for NaN input, which is rejected and
/// replaced by neutral (zero clamped into the bounds). Bounds given in the
/// wrong order are swapped and a NaN bound counts as zero, so this never
/// panics.
pub fn validate(proposed: f32, min_bound: f32, max_bound: f32) -> ValidationResult {
    let (min_bound, max_bound) = ordered_bounds(min_bound, max_bound);

    if proposed.is_nan() {
        return ValidationResult {
            accepted: false,
            clamped_value: 0.0_f32.clamp(min_bound, max_bound),
        };
    }

    let accepted = min_bound <= proposed && proposed <= max_bound;
    ValidationResult {
        accepted,
        clamped_value: proposed.clamp(min_bound, max_bound),
    }
}

fn ordered_bounds(a: f32, b: f32) -> (f32, f32) {
    let a = if a.is_nan() { 0.0 } else { a };
    let b = if b.is_nan() { 0.0 } else { b };
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Legal range for one control axis.
///
/// Both ends are finite, `min <= 0 <= max`, so neutral input is always legal.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisBounds {
    min: f32,
    max: f32,
}

impl AxisBounds {
    /// The usual full-deflection range `[-1, 1]`.
    pub const UNIT: Self = Self { min: -1.0, max: 1.0 };

    /// Create bounds, rejecting inverted, non-finite, or zero-excluding ranges.
    pub fn new(min: f32, max: f32) -> Result<Self, ConfigError> {
        if !min.is_finite() || !max.is_finite() || min > 0.0 || max < 0.0 {
            return Err(ConfigError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Derive bounds from the scale values mapped to an axis.
    ///
    /// The largest positive scale is the maximum and the most negative scale
    /// the minimum. A side with no scale is capped at zero.
    pub fn from_scales(axis_name: &str, scales: &[f32]) -> Result<Self, ConfigError> {
        if scales.is_empty() {
            return Err(ConfigError::UnmappedAxis(axis_name.to_string()));
        }
        if let Some(bad) = scales.iter().find(|s| !s.is_finite()) {
            return Err(ConfigError::InvalidScale {
                axis: axis_name.to_string(),
                scale: *bad,
            });
        }

        let max = scales.iter().copied().fold(0.0_f32, f32::max);
        let min = scales.iter().copied().fold(0.0_f32, f32::min);
        Self::new(min, max)
    }

    /// Lower bound.
    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound.
    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Validate a proposed value against these bounds.
    #[inline]
    pub fn validate(&self, proposed: f32) -> ValidationResult {
        validate(proposed, self.min, self.max)
    }

    /// Clamp without reporting.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        self.validate(value).clamped_value
    }
}

impl Default for AxisBounds {
    fn default() -> Self {
        Self::UNIT
    }
}

// =============================================================================
// INPUT LOG
// =============================================================================

/// Control frame applied from a given tick onward.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlChange {
    /// First tick the frame applies to
    pub tick: u32,
    /// Controls from that tick on
    pub frame: ControlFrame,
}

/// Record of the controls an authority actually applied to one vehicle.
///
/// Only stores ticks where the input CHANGED. Used for replay and for
/// anti-cheat review after the fact. History older than [`Self::start_tick`]
/// can be dropped with [`Self::trim_before`] to keep long sessions bounded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ControlInputLog {
    start_tick: u32,
    end_tick: Option<u32>,
    changes: VecDeque<ControlChange>,

    #[serde(skip)]
    last_frame: Option<ControlFrame>,
}

impl ControlInputLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame applied at `tick`.
    ///
    /// A frame equal to the previous one only extends the end tick.
    pub fn record(&mut self, tick: u32, frame: ControlFrame) {
        if self.end_tick.is_none() {
            self.start_tick = tick;
        }
        self.end_tick = Some(tick);

        if self.last_frame != Some(frame) {
            self.changes.push_back(ControlChange { tick, frame });
            self.last_frame = Some(frame);
        }
    }

    /// First tick the log covers.
    pub fn start_tick(&self) -> u32 {
        self.start_tick
    }

    /// Last tick recorded, `None` while nothing has been recorded.
    pub fn end_tick(&self) -> Option<u32> {
        self.end_tick
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.end_tick.is_none()
    }

    /// Forget everything before `tick`, keeping the frame in effect at `tick`.
    pub fn trim_before(&mut self, tick: u32) {
        if tick <= self.start_tick {
            return;
        }
        let in_effect = self.changes.partition_point(|c| c.tick <= tick);
        if in_effect > 0 {
            self.changes.drain(..in_effect - 1);
            if let Some(first) = self.changes.front_mut() {
                first.tick = tick;
            }
        }
        self.start_tick = tick;
    }

    /// Frame in effect at `tick`; neutral before the first record.
    ///
    /// Ticks before [`Self::start_tick`] are no longer known after a trim.
    pub fn input_at(&self, tick: u32) -> ControlFrame {
        match self.changes.partition_point(|c| c.tick <= tick) {
            0 => ControlFrame::NEUTRAL,
            n => self.changes[n - 1].frame,
        }
    }

    /// Recorded changes in tick order.
    pub fn changes(&self) -> &VecDeque<ControlChange> {
        &self.changes
    }

    /// How many distinct frames are held.
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Iterate `(tick, frame)` from `start_tick` (or the log's own start, if
    /// later) through the end tick. Yields nothing for an empty log.
    pub fn replay_iter(&self, start_tick: u32) -> LogReplay<'_> {
        let start = start_tick.max(self.start_tick);
        LogReplay {
            log: self,
            tick: start,
            next_change: self.changes.partition_point(|c| c.tick < start),
            frame: match start {
                0 => ControlFrame::NEUTRAL,
                t => self.input_at(t - 1),
            },
        }
    }
}

/// Tick-by-tick walk over a [`ControlInputLog`].
pub struct LogReplay<'a> {
    log: &'a ControlInputLog,
    tick: u32,
    next_change: usize,
    frame: ControlFrame,
}

impl Iterator for LogReplay<'_> {
    type Item = (u32, ControlFrame);

    fn next(&mut self) -> Option<Self::Item> {
        let log = self.log;
        match log.end_tick {
            Some(end) if self.tick <= end => {}
            _ => return None,
        }
        let tick = self.tick;
        while let Some(change) = log.changes.get(self.next_change).filter(|c| c.tick <= tick) {
            self.frame = change.frame;
            self.next_change += 1;
        }

        let item = (self.tick, self.frame);
        self.tick += 1;
        Some(item)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_validate_inside_bounds() {
        let result = validate(0.5, -1.0, 1.0);
        assert!(result.accepted);
        assert_eq!(result.clamped_value, 0.5);

        // Edges are legal
        assert!(validate(1.0, -1.0, 1.0).accepted);
        assert!(validate(-1.0, -1.0, 1.0).accepted);
    }

    #[test]
    fn test_validate_out_of_bounds_clamps() {
        let result = validate(5.0, -1.0, 1.0);
        assert!(!result.accepted);
        assert_eq!(result.clamped_value, 1.0);

        let result = validate(-3.0, -0.5, 1.0);
        assert!(!result.accepted);
        assert_eq!(result.clamped_value, -0.5);
    }

    #[test]
    fn test_validate_nan_is_rejected_as_neutral() {
        let result = validate(f32::NAN, -1.0, 1.0);
        assert!(!result.accepted);
        assert_eq!(result.clamped_value, 0.0);
    }

    #[test]
    fn test_validate_infinity() {
        let result = validate(f32::INFINITY, -1.0, 1.0);
        assert!(!result.accepted);
        assert_eq!(result.clamped_value, 1.0);
    }

    #[test]
    fn test_bounds_from_scales() {
        let bounds = AxisBounds::from_scales("MoveForward", &[1.0, -0.5]).unwrap();
        assert_eq!(bounds.min(), -0.5);
        assert_eq!(bounds.max(), 1.0);

        // Forward only: backward capped at zero
        let bounds = AxisBounds::from_scales("MoveForward", &[0.8]).unwrap();
        assert_eq!(bounds.min(), 0.0);
        assert_eq!(bounds.max(), 0.8);
    }

    #[test]
    fn test_bounds_from_scales_errors() {
        assert!(matches!(
            AxisBounds::from_scales("MoveRight", &[]),
            Err(ConfigError::UnmappedAxis(name)) if name == "MoveRight"
        ));
        assert!(matches!(
            AxisBounds::from_scales("MoveRight", &[1.0, f32::NAN]),
            Err(ConfigError::InvalidScale { .. })
        ));
    }

    #[test]
    fn test_bounds_rejects_inverted() {
        assert!(AxisBounds::new(0.5, 1.0).is_err());
        assert!(AxisBounds::new(-1.0, -0.5).is_err());
        assert!(AxisBounds::new(-1.0, f32::INFINITY).is_err());
    }

    #[test]
    fn test_control_frame_axis_access() {
        let mut frame = ControlFrame::NEUTRAL;
        frame.set_axis(ControlAxis::Steering, -0.25);
        assert_eq!(frame.axis(ControlAxis::Steering), -0.25);
        assert_eq!(frame.axis(ControlAxis::Throttle), 0.0);
    }

    #[test]
    fn test_input_log_delta_compression() {
        let mut log = ControlInputLog::new();
        let frame = ControlFrame::new(1.0, 0.0);
        for tick in 0..4 {
            log.record(tick, frame);
        }
        assert_eq!(log.change_count(), 1);

        log.record(4, ControlFrame::new(1.0, 0.5));
        assert_eq!(log.change_count(), 2);
        assert_eq!(log.end_tick(), Some(4));
    }

    #[test]
    fn test_input_log_lookup() {
        let mut log = ControlInputLog::new();
        let frame1 = ControlFrame::new(0.5, 0.0);
        let frame2 = ControlFrame::new(-0.5, 0.0);
        log.record(10, frame1);
        log.record(20, frame2);

        assert_eq!(log.input_at(5), ControlFrame::NEUTRAL);
        assert_eq!(log.input_at(10), frame1);
        assert_eq!(log.input_at(15), frame1);
        assert_eq!(log.input_at(20), frame2);
        assert_eq!(log.input_at(100), frame2);
    }

    #[test]
    fn test_replay_holds_frame_between_changes() {
        let mut log = ControlInputLog::new();
        log.record(0, ControlFrame::new(0.1, 0.0));
        log.record(3, ControlFrame::new(0.2, 0.0));
        log.record(5, ControlFrame::new(0.2, 0.0));

        let frames: Vec<_> = log.replay_iter(0).collect();
        assert_eq!(frames.len(), 6);
        assert_eq!(frames[2].1.throttle, 0.1);
        assert_eq!(frames[3].1.throttle, 0.2);
        assert_eq!(frames[5].1.throttle, 0.2);

        let tail: Vec<_> = log.replay_iter(4).collect();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0], (4, ControlFrame::new(0.2, 0.0)));
    }

    #[test]
    fn test_empty_log_replays_nothing() {
        let log = ControlInputLog::new();
        assert!(log.is_empty());
        assert_eq!(log.end_tick(), None);
        assert_eq!(log.replay_iter(0).count(), 0);
    }

    #[test]
    fn test_trim_keeps_frame_in_effect() {
        let mut log = ControlInputLog::new();
        log.record(0, ControlFrame::new(0.1, 0.0));
        log.record(4, ControlFrame::new(0.2, 0.0));
        log.record(8, ControlFrame::new(0.3, 0.0));
        log.record(12, ControlFrame::new(0.3, 0.0));

        log.trim_before(6);
        assert_eq!(log.start_tick(), 6);
        assert_eq!(log.change_count(), 2);
        assert_eq!(log.input_at(6), ControlFrame::new(0.2, 0.0));

        // Replay starts at the trimmed start even when asked for earlier
        let frames: Vec<_> = log.replay_iter(0).collect();
        assert_eq!(frames.first(), Some(&(6, ControlFrame::new(0.2, 0.0))));
        assert_eq!(frames.last(), Some(&(12, ControlFrame::new(0.3, 0.0))));
        assert_eq!(frames.len(), 7);

        // Trimming backwards is a no-op
        log.trim_before(2);
        assert_eq!(log.start_tick(), 6);
    }

    #[test]
    fn test_validate_tolerates_bad_bounds() {
        let swapped = validate(0.5, 1.0, -1.0);
        assert!(swapped.accepted);
        assert_eq!(swapped.clamped_value, 0.5);

        let nan_min = validate(0.5, f32::NAN, 1.0);
        assert!(nan_min.accepted);

        let nan_both = validate(0.5, f32::NAN, f32::NAN);
        assert!(!nan_both.accepted);
        assert_eq!(nan_both.clamped_value, 0.0);
    }

    proptest! {
        #[test]
        fn prop_accepted_iff_in_bounds(
            p in -10.0f32..10.0,
            min in -5.0f32..0.0,
            max in 0.0f32..5.0,
        ) {
            let result = validate(p, min, max);
            prop_assert_eq!(result.accepted, min <= p && p <= max);
            prop_assert!(result.clamped_value >= min && result.clamped_value <= max);
            if result.accepted {
                prop_assert_eq!(result.clamped_value, p);
            }
        }

        #[test]
        fn prop_any_bounds_clamp_into_range(
            p in prop_oneof![Just(f32::NAN), -10.0f32..10.0],
            a in prop_oneof![Just(f32::NAN), -5.0f32..5.0],
            b in prop_oneof![Just(f32::NAN), -5.0f32..5.0],
        ) {
            let result = validate(p, a, b);
            let (lo, hi) = ordered_bounds(a, b);
            prop_assert!(result.clamped_value >= lo && result.clamped_value <= hi);
        }
    }
}
