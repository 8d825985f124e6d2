use serde::{Deserialize, Serialize};

use crate::error::{CfdError, CfdResult};

/// Boundary rule kind, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BcType {
    Periodic,
    Neumann,
    Dirichlet,
    #[serde(rename = "noslip")]
    NoSlip,
    Inlet,
    Outlet,
}

impl BcType {
    pub fn name(self) -> &'static str {
        match self {
            BcType::Periodic => "periodic",
            BcType::Neumann => "neumann",
            BcType::Dirichlet => "dirichlet",
            BcType::NoSlip => "noslip",
            BcType::Inlet => "inlet",
            BcType::Outlet => "outlet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Left,
    Right,
    Bottom,
    Top,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Left, Edge::Right, Edge::Bottom, Edge::Top];
}

/// Fixed values for the four edges. Left/right are written first, so the
/// bottom/top values own the corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DirichletValues {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl DirichletValues {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self { left, right, bottom, top }
    }

    pub fn uniform(value: f64) -> Self {
        Self::new(value, value, value, value)
    }

    pub fn on(&self, edge: Edge) -> f64 {
        match edge {
            Edge::Left => self.left,
            Edge::Right => self.right,
            Edge::Bottom => self.bottom,
            Edge::Top => self.top,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum InletProfile {
    /// Constant `(u, v)` along the whole edge.
    Uniform { u: f64, v: f64 },
    /// `4 s (1 - s) max_velocity` along the edge, pointing into the domain.
    Parabolic { max_velocity: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InletConfig {
    pub edge: Edge,
    #[serde(flatten)]
    pub profile: InletProfile,
}

impl InletConfig {
    pub fn uniform(edge: Edge, u: f64, v: f64) -> Self {
        Self { edge, profile: InletProfile::Uniform { u, v } }
    }

    pub fn parabolic(edge: Edge, max_velocity: f64) -> Self {
        Self { edge, profile: InletProfile::Parabolic { max_velocity } }
    }

    /// Velocity at normalized edge position `s` in `[0, 1]` (corner to corner).
    pub fn velocity_at(&self, s: f64) -> (f64, f64) {
        match self.profile {
            InletProfile::Uniform { u, v } => (u, v),
            InletProfile::Parabolic { max_velocity } => {
                let speed = 4.0 * s * (1.0 - s) * max_velocity;
                match self.edge {
                    Edge::Left => (speed, 0.0),
                    Edge::Right => (-speed, 0.0),
                    Edge::Bottom => (0.0, speed),
                    Edge::Top => (0.0, -speed),
                }
            }
        }
    }
}

/// One velocity boundary rule with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoundaryCondition {
    Periodic,
    Neumann,
    #[serde(rename = "noslip")]
    NoSlip,
    Dirichlet { u: DirichletValues, v: DirichletValues },
    Inlet(InletConfig),
    Outlet { edge: Edge },
}

impl BoundaryCondition {
    pub fn kind(&self) -> BcType {
        match self {
            BoundaryCondition::Periodic => BcType::Periodic,
            BoundaryCondition::Neumann => BcType::Neumann,
            BoundaryCondition::NoSlip => BcType::NoSlip,
            BoundaryCondition::Dirichlet { .. } => BcType::Dirichlet,
            BoundaryCondition::Inlet(_) => BcType::Inlet,
            BoundaryCondition::Outlet { .. } => BcType::Outlet,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PressureBoundary {
    #[default]
    Neumann,
    Periodic,
    Dirichlet(DirichletValues),
    /// Zero-gradient everywhere except `p = 0` on the outlet edge.
    Outlet { edge: Edge },
}

impl PressureBoundary {
    /// Pure Neumann and periodic pressure only fix `p` up to a constant.
    pub fn is_singular(&self) -> bool {
        matches!(self, PressureBoundary::Neumann | PressureBoundary::Periodic)
    }
}

/// Boundary treatment of one simulation: velocity rules applied in order, then the pressure rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySetup {
    pub velocity: Vec<BoundaryCondition>,
    #[serde(default)]
    pub pressure: PressureBoundary,
}

impl Default for BoundarySetup {
    fn default() -> Self {
        Self::walls()
    }
}

impl BoundarySetup {
    pub fn walls() -> Self {
        Self {
            velocity: vec![BoundaryCondition::NoSlip],
            pressure: PressureBoundary::Neumann,
        }
    }

    /// Closed cavity whose top wall slides with `lid_velocity`.
    pub fn lid_driven(lid_velocity: f64) -> Self {
        Self {
            velocity: vec![
                BoundaryCondition::NoSlip,
                BoundaryCondition::Dirichlet {
                    u: DirichletValues::new(0.0, 0.0, 0.0, lid_velocity),
                    v: DirichletValues::uniform(0.0),
                },
            ],
            pressure: PressureBoundary::Neumann,
        }
    }

    /// Left-to-right channel: walls top and bottom, inlet on the left, outlet on the right.
    pub fn channel(profile: InletProfile) -> Self {
        Self {
            velocity: vec![
                BoundaryCondition::NoSlip,
                BoundaryCondition::Inlet(InletConfig { edge: Edge::Left, profile }),
                BoundaryCondition::Outlet { edge: Edge::Right },
            ],
            pressure: PressureBoundary::Outlet { edge: Edge::Right },
        }
    }

    pub fn periodic() -> Self {
        Self {
            velocity: vec![BoundaryCondition::Periodic],
            pressure: PressureBoundary::Periodic,
        }
    }

    pub fn validate(&self) -> CfdResult<()> {
        if self.velocity.is_empty() {
            return Err(CfdError::InvalidArgument(
                "boundary setup needs at least one velocity condition".to_string(),
            ));
        }
        let finite = |d: &DirichletValues| [d.left, d.right, d.bottom, d.top].iter().all(|x| x.is_finite());
        for bc in &self.velocity {
            let ok = match bc {
                BoundaryCondition::Dirichlet { u, v } => finite(u) && finite(v),
                BoundaryCondition::Inlet(cfg) => match cfg.profile {
                    InletProfile::Uniform { u, v } => u.is_finite() && v.is_finite(),
                    InletProfile::Parabolic { max_velocity } => max_velocity.is_finite(),
                },
                _ => true,
            };
            if !ok {
                return Err(CfdError::InvalidArgument(format!(
                    "{} boundary has non-finite values",
                    bc.kind().name()
                )));
            }
        }
        if let PressureBoundary::Dirichlet(values) = &self.pressure {
            if !finite(values) {
                return Err(CfdError::InvalidArgument("pressure boundary has non-finite values".to_string()));
            }
        }
        Ok(())
    }
}
