//! CPU compute backend using Rayon for shared-memory parallelism.

use ndarray::{Array1, Array2};
use rayon::prelude::*;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo};

/// CPU backend that parallelises work across threads via Rayon.
///
/// When built with [`CpuBackend::with_threads`] the backend owns a dedicated
/// thread pool; otherwise work runs on Rayon's global pool.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a specified thread count.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::Unavailable(e.to_string()))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_matrix_fill(
        &self,
        rows: usize,
        cols: usize,
        fill_fn: &(dyn Fn(usize, usize) -> f64 + Send + Sync),
    ) -> Result<Array2<f64>, ComputeError> {
        let data: Vec<f64> = self.install(|| {
            (0..rows * cols)
                .into_par_iter()
                .map(|idx| {
                    let i = idx / cols;
                    let j = idx % cols;
                    fill_fn(i, j)
                })
                .collect()
        });

        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ComputeError::DeviceError(e.to_string()))
    }

    fn parallel_vector_fill(
        &self,
        len: usize,
        fill_fn: &(dyn Fn(usize) -> f64 + Send + Sync),
    ) -> Result<Array1<f64>, ComputeError> {
        let data: Vec<f64> = self.install(|| (0..len).into_par_iter().map(fill_fn).collect());
        Ok(Array1::from_vec(data))
    }

    fn parallel_map_inplace(
        &self,
        vector: &mut Array1<f64>,
        map_fn: &(dyn Fn(f64) -> f64 + Send + Sync),
    ) {
        self.install(|| vector.par_map_inplace(|x| *x = map_fn(*x)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_matrix_fill_is_row_major() {
        let backend = CpuBackend::new();
        let m = backend
            .parallel_matrix_fill(3, 4, &|i, j| (10 * i + j) as f64)
            .unwrap();
        assert_eq!(m.shape(), &[3, 4]);
        assert_eq!(m[[2, 3]], 23.0);
        assert_eq!(m[[1, 0]], 10.0);
    }

    #[test]
    fn test_matvec_and_transpose() {
        let backend = CpuBackend::with_threads(2).unwrap();
        let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];

        let y = backend.matvec(&a, &array![1.0, 0.0, -1.0]).unwrap();
        assert_relative_eq!(y[0], -2.0);
        assert_relative_eq!(y[1], -2.0);

        let z = backend.matvec_transpose(&a, &array![1.0, 1.0]).unwrap();
        assert_relative_eq!(z[0], 5.0);
        assert_relative_eq!(z[1], 7.0);
        assert_relative_eq!(z[2], 9.0);
    }

    #[test]
    fn test_matvec_rejects_wrong_length() {
        let backend = CpuBackend::new();
        let a = Array2::<f64>::zeros((2, 3));
        let err = backend.matvec(&a, &array![1.0, 2.0]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::ShapeMismatch { expected: 3, actual: 2 }
        ));
        assert!(backend.matvec_transpose(&a, &array![1.0]).is_err());
    }

    #[test]
    fn test_map_inplace() {
        let backend = CpuBackend::new();
        let mut v = array![1.0, -2.0, 3.0];
        backend.parallel_map_inplace(&mut v, &|x| 2.0 * x);
        assert_eq!(v, array![2.0, -4.0, 6.0]);
    }

    #[test]
    fn test_device_info_reports_threads() {
        let backend = CpuBackend::with_threads(3).unwrap();
        let info = backend.device_info();
        assert_eq!(info.backend_type, BackendType::Cpu);
        assert_eq!(info.compute_units, Some(3));
        assert!(info.name.contains("3 threads"));
    }
}
