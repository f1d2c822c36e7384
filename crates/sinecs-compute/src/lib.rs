//! # sinecs Compute
//!
//! Compute backend abstraction for the sinecs reconstruction engine. This
//! crate provides a [`ComputeBackend`](backend::ComputeBackend) trait that
//! isolates the reconstruction kernels from device-specific execution details.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Status |
//! |---------|-------------|--------|
//! | CPU (Rayon) | `cpu` (default) | Implemented |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;
