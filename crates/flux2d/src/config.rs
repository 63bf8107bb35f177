//! Simulation configuration.

use std::path::Path;

use glam::UVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which linear solver drives the pressure solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Conjugate gradient preconditioned with incomplete Poisson.
    #[default]
    ConjugateGradient,
    /// Damped Jacobi relaxation.
    Jacobi,
}

/// Configuration for a [`World`](crate::engine::World).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Grid dimensions in cells
    pub width: u32,
    pub height: u32,

    /// Time step in seconds
    #[serde(default = "default_dt")]
    pub dt: f32,

    #[serde(default)]
    pub solver: SolverKind,

    /// Iteration cap for the pressure solve
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Max-norm residual at which the solve stops
    #[serde(default = "default_error_tolerance")]
    pub error_tolerance: f32,

    /// Dilation rounds applied to the valid velocity region
    #[serde(default = "default_extrapolation_iterations")]
    pub extrapolation_iterations: u32,

    /// Damping factor of the Jacobi solver
    #[serde(default = "default_jacobi_omega")]
    pub jacobi_omega: f32,
}

fn default_dt() -> f32 {
    0.01
}

fn default_max_iterations() -> u32 {
    1000
}

fn default_error_tolerance() -> f32 {
    1e-5
}

fn default_extrapolation_iterations() -> u32 {
    10
}

fn default_jacobi_omega() -> f32 {
    2.0 / 3.0
}

impl WorldConfig {
    /// Config for a `width x height` grid with every other field defaulted.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            dt: default_dt(),
            solver: SolverKind::default(),
            max_iterations: default_max_iterations(),
            error_tolerance: default_error_tolerance(),
            extrapolation_iterations: default_extrapolation_iterations(),
            jacobi_omega: default_jacobi_omega(),
        }
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Save configuration to JSON file
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON file
    pub fn load_json(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no world can be built from.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidConfig(message));
        if self.width == 0 || self.height == 0 {
            return invalid(format!("grid size {}x{} is empty", self.width, self.height));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return invalid(format!("dt must be positive, got {}", self.dt));
        }
        if !(self.error_tolerance.is_finite() && self.error_tolerance >= 0.0) {
            return invalid(format!(
                "error_tolerance must be non-negative, got {}",
                self.error_tolerance
            ));
        }
        if !(self.jacobi_omega > 0.0 && self.jacobi_omega <= 1.0) {
            return invalid(format!("jacobi_omega must be in (0, 1], got {}", self.jacobi_omega));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config = WorldConfig::from_json(r#"{ "width": 64, "height": 32 }"#).unwrap();
        assert_eq!(config, WorldConfig::new(64, 32));
        assert_eq!(config.size(), UVec2::new(64, 32));
        assert_eq!(config.solver, SolverKind::ConjugateGradient);
    }

    #[test]
    fn test_solver_kind_is_snake_case() {
        let config =
            WorldConfig::from_json(r#"{ "width": 8, "height": 8, "solver": "jacobi" }"#).unwrap();
        assert_eq!(config.solver, SolverKind::Jacobi);
    }

    #[test]
    fn test_json_file_round_trip() {
        let mut config = WorldConfig::new(128, 96);
        config.dt = 0.005;
        config.max_iterations = 250;

        let path = std::env::temp_dir().join(format!("flux2d-config-{}.json", std::process::id()));
        config.save_json(&path).unwrap();
        let loaded = WorldConfig::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        for json in [
            r#"{ "width": 0, "height": 16 }"#,
            r#"{ "width": 16, "height": 0 }"#,
            r#"{ "width": 16, "height": 16, "dt": 0.0 }"#,
            r#"{ "width": 16, "height": 16, "dt": -0.01 }"#,
            r#"{ "width": 16, "height": 16, "error_tolerance": -1.0 }"#,
            r#"{ "width": 16, "height": 16, "jacobi_omega": 0.0 }"#,
            r#"{ "width": 16, "height": 16, "jacobi_omega": 1.5 }"#,
        ] {
            let err = WorldConfig::from_json(json).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{json}: got {err:?}");
        }
        assert!(WorldConfig::new(1, 1).validate().is_ok());
    }

    #[test]
    fn test_missing_size_is_an_error() {
        let err = WorldConfig::from_json(r#"{ "dt": 0.1 }"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)), "got {err:?}");
    }
}
