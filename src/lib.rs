//! Two-dimensional incompressible flow solvers on structured grids, with
//! pluggable stepping algorithms and interchangeable execution backends.

pub mod backend;
pub mod boundary;
pub mod config;
pub mod derived;
pub mod domain;
pub mod error;
pub mod logging;
pub mod numerical;
pub mod poisson;
pub mod simulation;
pub mod solver;

pub use backend::{Backend, BackendChoice, BackendProbe, HostProbe};
pub use config::{RunConfig, RunSummary};
pub use domain::{DomainBounds2D, FlowField, Grid2D};
pub use error::{error_string, CfdError, CfdResult, StatusCode};
pub use simulation::{Simulation, SimulationContext};
pub use solver::{SolverInstance, SolverParams, SolverRegistry, SolverStats};
