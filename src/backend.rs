//! Execution backends and the host capability probe.
//!
//! A backend is an execution strategy (scalar loops, lane-blocked SIMD loops,
//! a rayon parallel-for, or a CUDA device). Which ones can run is a fact about
//! the host, answered by a [`BackendProbe`]. The engine never caches those
//! answers: every resolution asks the probe again.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::error::{CfdError, CfdResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Scalar,
    Simd,
    Omp,
    Cuda,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Backend::Scalar, Backend::Simd, Backend::Omp, Backend::Cuda];

    pub fn id(self) -> i32 {
        match self {
            Backend::Scalar => 0,
            Backend::Simd => 1,
            Backend::Omp => 2,
            Backend::Cuda => 3,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Simd => "simd",
            Backend::Omp => "omp",
            Backend::Cuda => "cuda",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backend request: either a specific backend, or `Auto` to take the best one the host offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    #[default]
    Auto,
    Scalar,
    Simd,
    Omp,
    Cuda,
}

impl BackendChoice {
    /// Preference order used by `Auto`.
    pub const AUTO_ORDER: [Backend; 4] = [Backend::Cuda, Backend::Omp, Backend::Simd, Backend::Scalar];

    pub fn explicit(self) -> Option<Backend> {
        match self {
            BackendChoice::Auto => None,
            BackendChoice::Scalar => Some(Backend::Scalar),
            BackendChoice::Simd => Some(Backend::Simd),
            BackendChoice::Omp => Some(Backend::Omp),
            BackendChoice::Cuda => Some(Backend::Cuda),
        }
    }

    /// Resolves the request against the probe. Explicit requests fail closed with
    /// `UnsupportedBackend`; `Auto` picks the first available backend in [`Self::AUTO_ORDER`].
    pub fn resolve(self, probe: &dyn BackendProbe) -> CfdResult<Backend> {
        self.resolve_for(probe, |_| true)
    }

    /// Like [`Self::resolve`], restricted to the backends a component implements.
    /// Scalar must always be implemented.
    pub fn resolve_for<F>(self, probe: &dyn BackendProbe, implemented: F) -> CfdResult<Backend>
    where
        F: Fn(Backend) -> bool,
    {
        match self.explicit() {
            Some(backend) => {
                if !implemented(backend) {
                    Err(CfdError::UnsupportedBackend(format!(
                        "no '{}' implementation in this build",
                        backend
                    )))
                } else if !probe.is_available(backend) {
                    Err(CfdError::UnsupportedBackend(format!(
                        "backend '{}' is not available on this host",
                        backend
                    )))
                } else {
                    Ok(backend)
                }
            }
            None => {
                let chosen = Self::AUTO_ORDER
                    .into_iter()
                    .find(|b| implemented(*b) && probe.is_available(*b))
                    .unwrap_or(Backend::Scalar);
                debug!(backend = %chosen, "auto backend resolved");
                Ok(chosen)
            }
        }
    }
}

impl From<Backend> for BackendChoice {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Scalar => BackendChoice::Scalar,
            Backend::Simd => BackendChoice::Simd,
            Backend::Omp => BackendChoice::Omp,
            Backend::Cuda => BackendChoice::Cuda,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimdArch {
    None,
    Avx2,
    Neon,
}

impl SimdArch {
    pub fn id(self) -> i32 {
        match self {
            SimdArch::None => 0,
            SimdArch::Avx2 => 1,
            SimdArch::Neon => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SimdArch::None => "none",
            SimdArch::Avx2 => "avx2",
            SimdArch::Neon => "neon",
        }
    }
}

pub fn has_avx2() -> bool {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        std::arch::is_x86_feature_detected!("avx2")
    }
    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        false
    }
}

pub fn has_neon() -> bool {
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        false
    }
}

pub fn detect_simd_arch() -> SimdArch {
    if has_avx2() {
        SimdArch::Avx2
    } else if has_neon() {
        SimdArch::Neon
    } else {
        SimdArch::None
    }
}

pub fn has_simd() -> bool {
    detect_simd_arch() != SimdArch::None
}

/// Source of backend availability facts.
pub trait BackendProbe: Send + Sync {
    fn simd_arch(&self) -> SimdArch;

    /// Whether a CUDA device runtime is usable.
    fn cuda_available(&self) -> bool;

    fn is_available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Scalar | Backend::Omp => true,
            Backend::Simd => self.simd_arch() != SimdArch::None,
            Backend::Cuda => self.cuda_available(),
        }
    }

    fn available_backends(&self) -> Vec<Backend> {
        Backend::ALL
            .into_iter()
            .filter(|b| self.is_available(*b))
            .collect()
    }
}

/// Probes the machine the process runs on. No CUDA runtime is linked into this build.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostProbe;

impl BackendProbe for HostProbe {
    fn simd_arch(&self) -> SimdArch {
        detect_simd_arch()
    }

    fn cuda_available(&self) -> bool {
        false
    }
}

pub fn backend_is_available(backend: Backend) -> bool {
    HostProbe.is_available(backend)
}

/// Probe with fixed answers, for deterministic backend resolution.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    pub simd: SimdArch,
    pub cuda: bool,
}

impl FixedProbe {
    pub fn scalar_only() -> Self {
        Self { simd: SimdArch::None, cuda: false }
    }

    pub fn with_simd() -> Self {
        Self { simd: SimdArch::Avx2, cuda: false }
    }
}

impl BackendProbe for FixedProbe {
    fn simd_arch(&self) -> SimdArch {
        self.simd
    }

    fn cuda_available(&self) -> bool {
        self.cuda
    }
}
