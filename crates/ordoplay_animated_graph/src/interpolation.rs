// SPDX-License-Identifier: MIT OR Apache-2.0
//! Piecewise-linear interpolation between input and output breakpoints.

use serde::{Deserialize, Serialize};

/// What to do with inputs outside the breakpoint range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Extrapolate {
    /// Continue the nearest segment linearly
    #[default]
    Extend,
    /// Hold the nearest output breakpoint
    Clamp,
    /// Return the input unchanged
    Identity,
}

/// Configuration of an interpolation node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpolationConfig {
    /// Sorted input breakpoints
    pub input_range: Vec<f64>,
    /// Output breakpoint for each input breakpoint
    pub output_range: Vec<f64>,
    /// Policy below the first input breakpoint
    #[serde(default)]
    pub extrapolate_left: Extrapolate,
    /// Policy above the last input breakpoint
    #[serde(default)]
    pub extrapolate_right: Extrapolate,
}

impl InterpolationConfig {
    /// Create a config that extends in both directions
    pub fn new(input_range: Vec<f64>, output_range: Vec<f64>) -> Self {
        Self {
            input_range,
            output_range,
            extrapolate_left: Extrapolate::Extend,
            extrapolate_right: Extrapolate::Extend,
        }
    }

    /// Set both extrapolation policies
    pub fn with_extrapolate(mut self, left: Extrapolate, right: Extrapolate) -> Self {
        self.extrapolate_left = left;
        self.extrapolate_right = right;
        self
    }

    /// Check breakpoint invariants, returning a description of the first violation
    pub fn validate(&self) -> Result<(), String> {
        if self.input_range.len() < 2 {
            return Err(format!(
                "interpolation needs at least 2 breakpoints, got {}",
                self.input_range.len()
            ));
        }
        if self.input_range.len() != self.output_range.len() {
            return Err(format!(
                "inputRange has {} breakpoints but outputRange has {}",
                self.input_range.len(),
                self.output_range.len()
            ));
        }
        if self.input_range.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err("inputRange must be non-decreasing".to_string());
        }
        Ok(())
    }

    /// Map `x` through the breakpoints
    pub fn interpolate(&self, x: f64) -> f64 {
        let inputs = &self.input_range;
        let outputs = &self.output_range;
        let last = inputs.len() - 1;

        // First segment whose upper breakpoint is >= x, nearest segment otherwise
        let upper = inputs[1..last].partition_point(|&bp| bp < x) + 1;
        let i = upper - 1;

        let (in_min, in_max) = (inputs[i], inputs[i + 1]);
        let (out_min, out_max) = (outputs[i], outputs[i + 1]);

        if x < in_min {
            match self.extrapolate_left {
                Extrapolate::Identity => return x,
                Extrapolate::Clamp => return out_min,
                Extrapolate::Extend => {}
            }
        }
        if x > in_max {
            match self.extrapolate_right {
                Extrapolate::Identity => return x,
                Extrapolate::Clamp => return out_max,
                Extrapolate::Extend => {}
            }
        }

        if out_min == out_max {
            return out_min;
        }
        if in_min == in_max {
            return if x <= in_min { out_min } else { out_max };
        }

        let t = (x - in_min) / (in_max - in_min);
        out_min + t * (out_max - out_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(input: &[f64], output: &[f64]) -> InterpolationConfig {
        InterpolationConfig::new(input.to_vec(), output.to_vec())
    }

    #[test]
    fn test_unit_range() {
        let identity = config(&[0.0, 1.0], &[0.0, 1.0]);
        assert_eq!(identity.interpolate(0.5), 0.5);

        let scaled = config(&[0.0, 1.0], &[100.0, 200.0]);
        assert_eq!(scaled.interpolate(0.5), 150.0);
    }

    #[test]
    fn test_multiple_segments() {
        let cfg = config(&[-1.0, 1.0, 5.0], &[0.0, 10.0, 20.0]);
        assert_eq!(cfg.interpolate(0.0), 5.0);
        assert_eq!(cfg.interpolate(2.0), 12.5);
        assert_eq!(cfg.interpolate(1.0), 10.0);
        assert_eq!(cfg.interpolate(5.0), 20.0);
    }

    #[test]
    fn test_extend_extrapolation() {
        let cfg = config(&[10.0, 20.0], &[0.0, 1.0]);
        assert_eq!(cfg.interpolate(30.0), 2.0);
        assert_eq!(cfg.interpolate(5.0), -0.5);
    }

    #[test]
    fn test_extend_uses_nearest_segment() {
        let cfg = config(&[0.0, 1.0, 2.0], &[0.0, 10.0, 30.0]);
        assert_eq!(cfg.interpolate(3.0), 50.0);
        assert_eq!(cfg.interpolate(-1.0), -10.0);
    }

    #[test]
    fn test_clamp_and_identity() {
        let clamped = config(&[10.0, 20.0], &[0.0, 1.0])
            .with_extrapolate(Extrapolate::Clamp, Extrapolate::Clamp);
        assert_eq!(clamped.interpolate(30.0), 1.0);
        assert_eq!(clamped.interpolate(5.0), 0.0);

        let identity = config(&[10.0, 20.0], &[0.0, 1.0])
            .with_extrapolate(Extrapolate::Identity, Extrapolate::Extend);
        assert_eq!(identity.interpolate(5.0), 5.0);
        assert_eq!(identity.interpolate(30.0), 2.0);
    }

    #[test]
    fn test_validation() {
        assert!(config(&[0.0, 1.0], &[0.0, 1.0]).validate().is_ok());
        assert!(config(&[0.0], &[0.0]).validate().is_err());
        assert!(config(&[0.0, 1.0], &[0.0]).validate().is_err());
        assert!(config(&[1.0, 0.0], &[0.0, 1.0]).validate().is_err());
    }
}
