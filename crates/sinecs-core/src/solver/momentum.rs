//! Momentum strategies applied after each proximal-gradient update.
//!
//! Plain ISTA uses [`NoMomentum`]; FISTA uses [`Nesterov`], which blends the
//! fresh update with the previous iterate using the step sequence
//! $t_1 = 1$, $t_{k+1} = \frac{1 + \sqrt{1 + 4 t_k^2}}{2}$.

use ndarray::Array1;

/// Combines a proximal-gradient update with the previous iterate.
pub trait Momentum {
    /// Return the next iterate given the fresh `update` and the iterate the
    /// update was computed from.
    fn blend(&mut self, update: Array1<f64>, previous: &Array1<f64>) -> Array1<f64>;

    /// Restore the state of a fresh run.
    fn reset(&mut self);
}

/// Identity strategy: the update is the next iterate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMomentum;

impl Momentum for NoMomentum {
    fn blend(&mut self, update: Array1<f64>, _previous: &Array1<f64>) -> Array1<f64> {
        update
    }

    fn reset(&mut self) {}
}

/// Nesterov acceleration with the FISTA step-size sequence.
#[derive(Debug, Clone, Copy)]
pub struct Nesterov {
    t: f64,
}

impl Nesterov {
    pub fn new() -> Self {
        Self { t: 1.0 }
    }

    /// Current value of the step sequence $t_k$.
    pub fn step(&self) -> f64 {
        self.t
    }

    /// Advance $t_k \to t_{k+1}$ and return the blend coefficient
    /// $(t_k - 1) / t_{k+1}$.
    fn advance(&mut self) -> f64 {
        let previous = self.t;
        self.t = (1.0 + (1.0 + 4.0 * previous * previous).sqrt()) / 2.0;
        (previous - 1.0) / self.t
    }
}

impl Default for Nesterov {
    fn default() -> Self {
        Self::new()
    }
}

impl Momentum for Nesterov {
    fn blend(&mut self, update: Array1<f64>, previous: &Array1<f64>) -> Array1<f64> {
        let beta = self.advance();
        if beta == 0.0 {
            return update;
        }
        let delta = &update - previous;
        update + delta * beta
    }

    fn reset(&mut self) {
        self.t = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_step_sequence_recurrence() {
        let mut m = Nesterov::new();
        assert_eq!(m.step(), 1.0);
        let golden = (1.0 + 5f64.sqrt()) / 2.0;

        let beta = m.advance();
        assert_eq!(beta, 0.0);
        assert_relative_eq!(m.step(), golden, epsilon = 1e-12);

        let beta = m.advance();
        let t3 = (1.0 + (1.0 + 4.0 * golden * golden).sqrt()) / 2.0;
        assert_relative_eq!(m.step(), t3, epsilon = 1e-12);
        assert_relative_eq!(beta, (golden - 1.0) / t3, epsilon = 1e-12);
    }

    #[test]
    fn test_first_blend_is_plain_update() {
        let mut m = Nesterov::new();
        let out = m.blend(array![1.0, 2.0], &array![5.0, 5.0]);
        assert_eq!(out, array![1.0, 2.0]);
    }

    #[test]
    fn test_blend_extrapolates_and_resets() {
        let mut m = Nesterov::new();
        m.blend(array![0.0], &array![0.0]);
        let out = m.blend(array![2.0], &array![1.0]);
        let golden = (1.0 + 5f64.sqrt()) / 2.0;
        let t3 = (1.0 + (1.0 + 4.0 * golden * golden).sqrt()) / 2.0;
        assert_relative_eq!(out[0], 2.0 + (golden - 1.0) / t3, epsilon = 1e-12);

        m.reset();
        assert_eq!(m.step(), 1.0);
    }

    #[test]
    fn test_no_momentum_is_identity() {
        let mut m = NoMomentum;
        assert_eq!(m.blend(array![3.0], &array![-1.0]), array![3.0]);
    }
}
