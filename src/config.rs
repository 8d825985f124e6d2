//! JSON run descriptions and the summary a run produces.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

use crate::backend::{Backend, BackendChoice};
use crate::boundary::{BoundarySetup, InletProfile};
use crate::derived::FlowStatistics;
use crate::domain::DomainBounds2D;
use crate::error::{CfdError, CfdResult};
use crate::solver::{SolverParams, SolverStats};

/// Named boundary setups, or a fully spelled-out one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "preset", rename_all = "snake_case")]
pub enum BoundaryPreset {
    Walls,
    LidDriven { lid_velocity: f64 },
    Channel { inlet: InletProfile },
    Periodic,
    Custom { setup: BoundarySetup },
}

impl BoundaryPreset {
    pub fn setup(&self) -> BoundarySetup {
        match self {
            BoundaryPreset::Walls => BoundarySetup::walls(),
            BoundaryPreset::LidDriven { lid_velocity } => BoundarySetup::lid_driven(*lid_velocity),
            BoundaryPreset::Channel { inlet } => BoundarySetup::channel(*inlet),
            BoundaryPreset::Periodic => BoundarySetup::periodic(),
            BoundaryPreset::Custom { setup } => setup.clone(),
        }
    }
}

/// Uniform values the field starts from, before boundary conditions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialState {
    pub u: f64,
    pub v: f64,
    pub p: f64,
}

/// Everything needed to run a simulation. Missing fields take the defaults
/// of the demo case: a 32x32 lid-driven cavity stepped with `projection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub nx: usize,
    pub ny: usize,
    pub bounds: DomainBounds2D,
    /// tanh clustering factor; a uniform grid when absent.
    pub stretching: Option<f64>,
    pub solver: String,
    pub steps: usize,
    pub params: SolverParams,
    pub boundaries: BoundaryPreset,
    /// Backend of the boundary engine, used for the initial field and every step.
    pub bc_backend: BackendChoice,
    pub initial: InitialState,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            nx: 32,
            ny: 32,
            bounds: DomainBounds2D::unit(),
            stretching: None,
            solver: "projection".to_string(),
            steps: 50,
            params: SolverParams::default(),
            boundaries: BoundaryPreset::LidDriven { lid_velocity: 1.0 },
            bc_backend: BackendChoice::Auto,
            initial: InitialState::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> CfdResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CfdError::InvalidArgument(format!("invalid run configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CfdResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| CfdError::Io(format!("{}: {}", path.display(), e)))?;
        info!("Loaded run configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Checks the parts that grid and solver construction do not already check.
    pub fn validate(&self) -> CfdResult<()> {
        if self.solver.is_empty() {
            return Err(CfdError::InvalidArgument("solver name must not be empty".to_string()));
        }
        if let Some(beta) = self.stretching {
            if !(beta.is_finite() && beta > 0.0) {
                return Err(CfdError::InvalidArgument(format!(
                    "stretching factor must be positive, got {}",
                    beta
                )));
            }
        }
        let InitialState { u, v, p } = self.initial;
        if ![u, v, p].iter().all(|x| x.is_finite()) {
            return Err(CfdError::InvalidArgument("initial state must be finite".to_string()));
        }
        self.params.validate()?;
        self.boundaries.setup().validate()
    }
}

/// Outcome of [`crate::simulation::SimulationContext::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub solver: String,
    pub backend: Backend,
    pub bc_backend: Backend,
    pub nx: usize,
    pub ny: usize,
    pub steps_completed: usize,
    pub time: f64,
    pub elapsed_ms: f64,
    pub last_stats: Option<SolverStats>,
    pub statistics: FlowStatistics,
}

impl RunSummary {
    pub fn to_json(&self) -> CfdResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CfdError::Io(format!("failed to serialize run summary: {}", e)))
    }

    /// Writes the summary as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: impl AsRef<Path>) -> CfdResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(json.as_bytes())?;
        writer.flush()?;
        info!("Run summary written to {}", path.display());
        Ok(())
    }
}
