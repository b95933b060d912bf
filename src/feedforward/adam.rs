/// Adam optimizer state for a flat coefficient array.
///
/// Holds first and second moment estimates with the same layout as `Net::coeffs`,
/// so one `Adam` serves all layers of a network at once.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Number of applied steps.
    t: u64,
    m: Box<[f64]>,
    v: Box<[f64]>,
}

impl Adam {
    pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;

    /// Optimizer for `size` parameters with the usual defaults
    /// (`beta1` = 0.9, `beta2` = 0.999, `epsilon` = 1e-7).
    pub fn new(size: usize, learning_rate: f64) -> Adam {
        Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m: vec![0.0; size].into_boxed_slice(),
            v: vec![0.0; size].into_boxed_slice(),
        }
    }

    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Applies one update of `params` with the mean gradient `grads`.
    ///
    /// # Examples
    /// ```
    /// # use asl_mlp::feedforward::Adam;
    /// let mut adam = Adam::new(1, 0.1);
    /// let mut params = [1.0];
    /// adam.step(&mut params, &[2.0]);
    /// // The first step moves each parameter by about `learning_rate`.
    /// assert!((params[0] - 0.9).abs() < 1e-6);
    /// ```
    pub fn step(&mut self, params: &mut [f64], grads: &[f64]) {
        self.t += 1;
        let t = self.t as i32;
        let lr_t = self.learning_rate * (1.0 - self.beta2.powi(t)).sqrt()
            / (1.0 - self.beta1.powi(t));

        for (((p, &g), m), v) in params
            .iter_mut()
            .zip(grads.iter())
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + self.epsilon);
        }
    }
}
