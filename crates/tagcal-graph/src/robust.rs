use tagcal_core::Real;

/// Robust loss kernels for iteratively re-weighted least squares (IRLS).
#[derive(Debug, Clone, Copy, Default)]
pub enum RobustKernel {
    /// No robustness, pure L2 (quadratic).
    #[default]
    None,
    /// Huber loss with a given threshold.
    Huber { delta: Real },
    /// Cauchy loss with a scale parameter.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// IRLS weight `w(r)` for a squared residual.
    ///
    /// The solver evaluates residuals at the current parameters, computes
    /// weights with this method, and scales both residual and Jacobian rows
    /// by `sqrt(w)` before solving the linearized system.
    pub fn weight(self, r2: Real) -> Real {
        match self {
            RobustKernel::None => 1.0,
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    1.0
                } else {
                    delta / r
                }
            }
            RobustKernel::Cauchy { c } => 1.0 / (1.0 + r2 / (c * c)),
        }
    }
}
