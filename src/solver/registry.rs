use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendChoice, BackendProbe};
use crate::error::{CfdError, CfdResult};
use crate::numerical::Executor;
use crate::solver::explicit_euler::ExplicitEuler;
use crate::solver::projection::Projection;
use crate::solver::{Capabilities, Capability, Solver, SolverDescriptor, SolverInstance};

/// Builds a solver for the descriptor it was registered with.
pub type SolverFactory = Arc<dyn Fn(&SolverDescriptor, &dyn BackendProbe) -> CfdResult<Box<dyn Solver>> + Send + Sync>;

struct Entry {
    descriptor: SolverDescriptor,
    factory: SolverFactory,
}

/// Names returned by a bounded listing, plus how many matched in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub names: Vec<String>,
    pub total: usize,
}

impl Listing {
    pub fn is_truncated(&self) -> bool {
        self.names.len() < self.total
    }
}

/// Solver catalogue keyed by name, listed in registration order.
#[derive(Default)]
pub struct SolverRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    leases: Arc<()>,
}

impl fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverRegistry")
            .field("solvers", &self.entries.iter().map(|e| &e.descriptor.name).collect::<Vec<_>>())
            .field("live_instances", &self.live_instances())
            .finish()
    }
}

impl SolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the eight built-in variants.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (descriptor, factory) in builtins() {
            registry.insert(descriptor, factory);
        }
        registry
    }

    /// Registers `descriptor` under its name. An existing entry with the same
    /// name is replaced in place and keeps its listing position.
    pub fn register(&mut self, descriptor: SolverDescriptor, factory: SolverFactory) -> CfdResult<()> {
        if descriptor.name.is_empty() {
            return Err(CfdError::InvalidArgument("solver name must not be empty".to_string()));
        }
        let live = self.live_instances();
        if live > 0 {
            return Err(CfdError::InvalidArgument(format!(
                "cannot register '{}' while {} solver instance(s) are alive",
                descriptor.name, live
            )));
        }
        self.insert(descriptor, factory);
        Ok(())
    }

    fn insert(&mut self, descriptor: SolverDescriptor, factory: SolverFactory) {
        match self.index.get(&descriptor.name) {
            Some(&slot) => {
                warn!(solver = %descriptor.name, "replacing registered solver");
                self.entries[slot] = Entry { descriptor, factory };
            }
            None => {
                debug!(solver = %descriptor.name, "solver registered");
                self.index.insert(descriptor.name.clone(), self.entries.len());
                self.entries.push(Entry { descriptor, factory });
            }
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, name: &str) -> Option<&SolverDescriptor> {
        self.index.get(name).map(|&slot| &self.entries[slot].descriptor)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &SolverDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Solver instances created from this registry that are still alive.
    pub fn live_instances(&self) -> usize {
        Arc::strong_count(&self.leases) - 1
    }

    pub fn create(&self, name: &str, probe: &dyn BackendProbe) -> CfdResult<SolverInstance> {
        let entry = self
            .index
            .get(name)
            .map(|&slot| &self.entries[slot])
            .ok_or_else(|| CfdError::UnknownSolver(name.to_string()))?;
        let solver = (entry.factory)(&entry.descriptor, probe)?;
        debug!(solver = name, backend = %solver.backend(), "solver created");
        Ok(SolverInstance::new(solver, Arc::clone(&self.leases)))
    }

    /// At most `capacity` names in registration order, with the true total.
    pub fn list(&self, capacity: usize) -> Listing {
        bounded(self.descriptors(), capacity)
    }

    /// Solvers whose capabilities imply `backend`. Scalar means none of simd, parallel or gpu.
    pub fn list_by_backend(&self, backend: Backend, capacity: usize) -> Listing {
        bounded(self.descriptors().filter(|d| d.backend() == backend), capacity)
    }
}

fn bounded<'a>(descriptors: impl Iterator<Item = &'a SolverDescriptor>, capacity: usize) -> Listing {
    let mut names = Vec::new();
    let mut total = 0;
    for d in descriptors {
        if names.len() < capacity {
            names.push(d.name.clone());
        }
        total += 1;
    }
    Listing { names, total }
}

/// Interior executor for the backend a descriptor implies. Explicit choices
/// fail closed, so a SIMD variant on a host without SIMD is `UnsupportedBackend`.
fn cpu_executor(descriptor: &SolverDescriptor, probe: &dyn BackendProbe) -> CfdResult<Executor> {
    let backend = BackendChoice::from(descriptor.backend())
        .resolve(probe)
        .map_err(|e| CfdError::UnsupportedBackend(format!("solver '{}': {}", descriptor.name, e)))?;
    Executor::for_backend(backend)
}

fn explicit_euler_factory() -> SolverFactory {
    Arc::new(|descriptor: &SolverDescriptor, probe: &dyn BackendProbe| {
        let executor = cpu_executor(descriptor, probe)?;
        Ok(Box::new(ExplicitEuler::new(descriptor.clone(), executor)) as Box<dyn Solver>)
    })
}

fn projection_factory() -> SolverFactory {
    Arc::new(|descriptor: &SolverDescriptor, probe: &dyn BackendProbe| {
        let executor = cpu_executor(descriptor, probe)?;
        Ok(Box::new(Projection::new(descriptor.clone(), executor)) as Box<dyn Solver>)
    })
}

/// GPU variants are catalogued but cannot be constructed: no device kernels are linked.
fn gpu_factory() -> SolverFactory {
    Arc::new(|descriptor: &SolverDescriptor, probe: &dyn BackendProbe| -> CfdResult<Box<dyn Solver>> {
        let reason = if probe.cuda_available() {
            "no CUDA kernels are compiled into this build"
        } else {
            "no CUDA device is available"
        };
        Err(CfdError::UnsupportedBackend(format!("solver '{}': {}", descriptor.name, reason)))
    })
}

fn builtins() -> Vec<(SolverDescriptor, SolverFactory)> {
    let base = Capabilities::of(&[Capability::Incompressible, Capability::Transient]);
    let simd = base.with(Capability::Simd);
    let parallel = base.with(Capability::Parallel);
    let gpu = base.with(Capability::Gpu);
    vec![
        (
            SolverDescriptor::new(
                "explicit_euler",
                "Explicit Euler with artificial compressibility",
                base,
            ),
            explicit_euler_factory(),
        ),
        (
            SolverDescriptor::new(
                "explicit_euler_optimized",
                "Explicit Euler, lane-blocked SIMD loops",
                simd,
            ),
            explicit_euler_factory(),
        ),
        (
            SolverDescriptor::new("explicit_euler_omp", "Explicit Euler, multi-threaded", parallel),
            explicit_euler_factory(),
        ),
        (
            SolverDescriptor::new("explicit_euler_gpu", "Explicit Euler on a CUDA device", gpu),
            gpu_factory(),
        ),
        (
            SolverDescriptor::new("projection", "Chorin projection with a pressure Poisson solve", base),
            projection_factory(),
        ),
        (
            SolverDescriptor::new("projection_optimized", "Projection, lane-blocked SIMD loops", simd),
            projection_factory(),
        ),
        (
            SolverDescriptor::new("projection_omp", "Projection, multi-threaded", parallel),
            projection_factory(),
        ),
        (
            SolverDescriptor::new(
                "projection_jacobi_gpu",
                "Projection with Jacobi pressure sweeps on a CUDA device",
                gpu,
            ),
            gpu_factory(),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FixedProbe, SimdArch};
    use crate::boundary::{BoundaryEngine, BoundarySetup};
    use crate::domain::{DomainBounds2D, FlowField, Grid2D};
    use crate::solver::{SolverParams, SolverState};

    const BUILTINS: [&str; 8] = [
        "explicit_euler",
        "explicit_euler_optimized",
        "explicit_euler_omp",
        "explicit_euler_gpu",
        "projection",
        "projection_optimized",
        "projection_omp",
        "projection_jacobi_gpu",
    ];

    #[test]
    fn test_builtins_listed_in_registration_order() {
        let registry = SolverRegistry::with_builtins();
        let listing = registry.list(16);
        assert_eq!(listing.names, BUILTINS.map(String::from).to_vec());
        assert_eq!(listing.total, 8);
        assert!(!listing.is_truncated());
        for name in BUILTINS {
            assert!(registry.has(name));
            assert_eq!(registry.descriptor(name).unwrap().version, env!("CARGO_PKG_VERSION"));
        }
        assert!(!registry.has("lattice_boltzmann"));
    }

    #[test]
    fn test_truncated_listing_reports_total() {
        let registry = SolverRegistry::with_builtins();
        let listing = registry.list(3);
        assert_eq!(listing.names, vec!["explicit_euler", "explicit_euler_optimized", "explicit_euler_omp"]);
        assert_eq!(listing.total, 8);
        assert!(listing.is_truncated());
        assert_eq!(registry.list(0).names.len(), 0);
    }

    #[test]
    fn test_list_by_backend() {
        let registry = SolverRegistry::with_builtins();
        assert_eq!(registry.list_by_backend(Backend::Scalar, 8).names, vec!["explicit_euler", "projection"]);
        assert_eq!(
            registry.list_by_backend(Backend::Simd, 8).names,
            vec!["explicit_euler_optimized", "projection_optimized"]
        );
        assert_eq!(
            registry.list_by_backend(Backend::Omp, 8).names,
            vec!["explicit_euler_omp", "projection_omp"]
        );
        let gpu = registry.list_by_backend(Backend::Cuda, 1);
        assert_eq!(gpu.names, vec!["explicit_euler_gpu"]);
        assert_eq!(gpu.total, 2);
    }

    #[test]
    fn test_unknown_solver() {
        let registry = SolverRegistry::with_builtins();
        let err = registry.create("does_not_exist", &FixedProbe::with_simd()).unwrap_err();
        assert_eq!(err, CfdError::UnknownSolver("does_not_exist".to_string()));
    }

    #[test]
    fn test_backend_bound_construction() {
        let registry = SolverRegistry::with_builtins();
        let plain = FixedProbe::scalar_only();
        assert!(matches!(
            registry.create("explicit_euler_optimized", &plain),
            Err(CfdError::UnsupportedBackend(_))
        ));
        let simd = registry.create("projection_optimized", &FixedProbe::with_simd()).unwrap();
        assert_eq!(simd.backend(), Backend::Simd);
        assert_eq!(registry.create("projection_omp", &plain).unwrap().backend(), Backend::Omp);

        let gpu_host = FixedProbe { simd: SimdArch::Avx2, cuda: true };
        for name in ["explicit_euler_gpu", "projection_jacobi_gpu"] {
            assert!(matches!(registry.create(name, &gpu_host), Err(CfdError::UnsupportedBackend(_))));
            assert!(matches!(registry.create(name, &plain), Err(CfdError::UnsupportedBackend(_))));
        }
    }

    #[test]
    fn test_duplicate_name_replaces_in_place() {
        let mut registry = SolverRegistry::with_builtins();
        let replacement = SolverDescriptor::new(
            "explicit_euler_omp",
            "replacement",
            Capabilities::of(&[Capability::SteadyState]),
        );
        registry.register(replacement, gpu_factory()).unwrap();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.list(8).names[2], "explicit_euler_omp");
        let d = registry.descriptor("explicit_euler_omp").unwrap();
        assert_eq!(d.description, "replacement");
        assert!(d.capabilities.contains(Capability::SteadyState));
        assert!(registry.create("explicit_euler_omp", &FixedProbe::with_simd()).is_err());
    }

    #[test]
    fn test_register_custom_solver() {
        let mut registry = SolverRegistry::new();
        assert!(registry.is_empty());
        let descriptor = SolverDescriptor::new("my_euler", "custom", Capabilities::of(&[Capability::Transient]));
        registry.register(descriptor, explicit_euler_factory()).unwrap();
        let instance = registry.create("my_euler", &FixedProbe::scalar_only()).unwrap();
        assert_eq!(instance.name(), "my_euler");
        assert_eq!(instance.backend(), Backend::Scalar);

        let empty = SolverDescriptor::new("", "nameless", Capabilities::empty());
        assert!(registry.register(empty, explicit_euler_factory()).is_err());
    }

    #[test]
    fn test_registration_blocked_while_instances_live() {
        let mut registry = SolverRegistry::with_builtins();
        let instance = registry.create("explicit_euler", &FixedProbe::scalar_only()).unwrap();
        assert_eq!(registry.live_instances(), 1);
        let descriptor = SolverDescriptor::new("late", "late", Capabilities::empty());
        assert!(matches!(
            registry.register(descriptor.clone(), explicit_euler_factory()),
            Err(CfdError::InvalidArgument(_))
        ));
        drop(instance);
        assert_eq!(registry.live_instances(), 0);
        registry.register(descriptor, explicit_euler_factory()).unwrap();
        assert!(registry.has("late"));
    }

    #[test]
    fn test_instance_lifecycle() {
        let registry = SolverRegistry::with_builtins();
        let grid = Grid2D::uniform(4, 4, DomainBounds2D::unit()).unwrap();
        let params = SolverParams::default();
        let mut field = FlowField::new(&grid).unwrap();
        let mut instance = registry.create("explicit_euler", &FixedProbe::scalar_only()).unwrap();
        assert_eq!(instance.state(), SolverState::Uninitialized);
        assert!(instance.step(&mut field, &grid, &params).is_err());

        instance.init(&grid, &params, &BoundarySetup::walls(), BoundaryEngine::scalar()).unwrap();
        assert_eq!(instance.state(), SolverState::Initialized);
        assert!(instance.init(&grid, &params, &BoundarySetup::walls(), BoundaryEngine::scalar()).is_err());

        let stats = instance.step(&mut field, &grid, &params).unwrap();
        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.max_velocity, 0.0);
        assert!(stats.elapsed_time_ms >= 0.0);
        assert_eq!(instance.state(), SolverState::Stepping);
        assert_eq!(instance.steps_taken(), 1);

        instance.finalize();
        assert_eq!(instance.state(), SolverState::Finalized);
        assert!(instance.step(&mut field, &grid, &params).is_err());
    }

    #[test]
    fn test_failed_step_stops_the_instance() {
        let registry = SolverRegistry::with_builtins();
        let grid = Grid2D::uniform(6, 6, DomainBounds2D::unit()).unwrap();
        let walls = BoundarySetup::walls();

        let params = SolverParams::default();
        let mut instance = registry.create("explicit_euler", &FixedProbe::scalar_only()).unwrap();
        instance.init(&grid, &params, &walls, BoundaryEngine::scalar()).unwrap();
        let mut field = FlowField::new(&grid).unwrap();
        field.u[(2, 2)] = f64::NAN;
        assert!(matches!(instance.step(&mut field, &grid, &params), Err(CfdError::Diverged(_))));
        assert_eq!(instance.state(), SolverState::Failed);
        assert!(matches!(
            instance.step(&mut field, &grid, &params),
            Err(CfdError::InvalidArgument(_))
        ));
        assert_eq!(instance.steps_taken(), 0);

        let params = SolverParams { max_iter: 1, ..Default::default() };
        let mut instance = registry.create("projection", &FixedProbe::scalar_only()).unwrap();
        instance.init(&grid, &params, &walls, BoundaryEngine::scalar()).unwrap();
        let mut field = FlowField::new(&grid).unwrap();
        field.u[(2, 2)] = 0.5;
        assert!(matches!(
            instance.step(&mut field, &grid, &params),
            Err(CfdError::MaxIterationsExceeded { .. })
        ));
        assert_eq!(instance.state(), SolverState::Failed);
        instance.finalize();
        assert_eq!(instance.state(), SolverState::Finalized);
    }
}
