//! Sparse Gauss-Newton solver.
//!
//! One iteration linearizes every edge with central finite differences,
//! assembles the information-form normal equations `Jᵀ J Δx = -Jᵀ r` as a
//! sparse system, Cholesky-factors it and applies the update to every node.
//! There is no internal line search; [`GaussNewton::iterate_until_convergence`]
//! loops until the mean residual stops moving.
//!
//! A rank-deficient system (not enough constraints for the current DOF)
//! surfaces as [`SolveError::NotPositiveDefinite`] and leaves all node states
//! untouched; the caller decides whether to gather more data or give up.

use faer::{
    linalg::solvers::Solve,
    sparse::linalg::solvers::{Llt, SymbolicLlt},
    sparse::{SparseColMat, Triplet},
    Mat, Side,
};
use std::ops::Mul;
use tagcal_core::Real;
use thiserror::Error;

use crate::graph::Graph;
use crate::robust::RobustKernel;

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("graph has no edges to solve")]
    EmptyGraph,
    #[error("graph has no free parameters to optimize")]
    NoFreeParameters,
    #[error("normal equations are not positive definite (under-constrained system)")]
    NotPositiveDefinite,
}

/// Options for the convergence-driven iteration loop.
#[derive(Debug, Clone, Copy)]
pub struct SolveOptions {
    /// Upper bound on Gauss-Newton iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the change of the mean reprojection error
    /// between consecutive iterations, in pixels.
    pub tol: Real,
    /// Robust reweighting kernel applied per correspondence.
    pub robust: RobustKernel,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tol: 1e-6,
            robust: RobustKernel::None,
        }
    }
}

/// Result of a single Gauss-Newton step.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport {
    /// Mean per-correspondence reprojection error after the update (pixels).
    pub mean_error: Real,
    /// Max per-correspondence reprojection error after the update (pixels).
    pub max_error: Real,
    /// Euclidean norm of the applied state update.
    pub step_norm: Real,
}

/// Result of [`GaussNewton::iterate_until_convergence`].
#[derive(Debug, Clone, Copy)]
pub struct SolveReport {
    pub iterations: usize,
    pub mean_error: Real,
    pub max_error: Real,
    pub converged: bool,
}

/// Gauss-Newton driver with a cached symbolic factorization.
///
/// The symbolic Cholesky analysis (which includes the fill-reducing
/// minimum-degree ordering) is reused as long as the graph structure does
/// not change.
#[derive(Default)]
pub struct GaussNewton {
    symbolic: Option<(u64, SymbolicLlt<usize>)>,
}

impl GaussNewton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Perform one Gauss-Newton step over the whole graph.
    ///
    /// On [`SolveError::NotPositiveDefinite`] the node states are left
    /// exactly as they were.
    pub fn iterate(
        &mut self,
        graph: &mut Graph,
        kernel: RobustKernel,
    ) -> Result<IterationReport, SolveError> {
        if graph.edges.is_empty() {
            return Err(SolveError::EmptyGraph);
        }

        let free_dof = graph.free_dof();
        if free_dof == 0 {
            return Err(SolveError::NoFreeParameters);
        }
        let total_dim = graph.residual_dimension();
        let version = graph.structure_version;

        // column offsets of free nodes; fixed nodes carry no columns
        let mut offsets: Vec<Option<usize>> = Vec::with_capacity(graph.nodes.len());
        let mut acc = 0;
        for (idx, node) in graph.nodes.iter().enumerate() {
            if graph.fixed.contains(&idx) {
                offsets.push(None);
            } else {
                offsets.push(Some(acc));
                acc += node.dof();
            }
        }

        let nodes = &mut graph.nodes;
        let edges = &graph.edges;

        // Linearize: residual vector and Jacobian triplets, rows scaled by
        // sqrt of the combined edge/robust weight.
        let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::new();
        let mut residuals = Mat::<f64>::zeros(total_dim, 1);
        let mut row_offset = 0;

        for edge in edges.iter() {
            let dim = edge.dimension();
            let r0 = edge.residual(nodes);

            let mut sqrt_w = vec![1.0; dim];
            for i in 0..dim / 2 {
                let r2 = r0[2 * i] * r0[2 * i] + r0[2 * i + 1] * r0[2 * i + 1];
                let w = edge.weight() * kernel.weight(r2);
                let sw = w.sqrt();
                sqrt_w[2 * i] = sw;
                sqrt_w[2 * i + 1] = sw;
            }

            for &node_idx in edge.node_indices() {
                let Some(col_offset) = offsets[node_idx] else {
                    continue; // fixed node, no columns
                };
                let base = nodes[node_idx].params();
                let step = nodes[node_idx].perturbation_step();
                let inv_denom = 1.0 / (2.0 * step);

                for d in 0..nodes[node_idx].dof() {
                    let mut perturbed = base.clone();
                    perturbed[d] = base[d] + step;
                    nodes[node_idx].set_params(&perturbed);
                    let r_plus = edge.residual(nodes);

                    perturbed[d] = base[d] - step;
                    nodes[node_idx].set_params(&perturbed);
                    let r_minus = edge.residual(nodes);

                    nodes[node_idx].set_params(&base);

                    for k in 0..dim {
                        let val = (r_plus[k] - r_minus[k]) * inv_denom * sqrt_w[k];
                        if val != 0.0 {
                            triplets.push(Triplet::new(row_offset + k, col_offset + d, val));
                        }
                    }
                }
            }

            for k in 0..dim {
                residuals[(row_offset + k, 0)] = sqrt_w[k] * r0[k];
            }
            row_offset += dim;
        }

        // Normal equations: H = Jᵀ J, g = Jᵀ r.
        let jacobian = SparseColMat::try_new_from_triplets(total_dim, free_dof, &triplets)
            .expect("jacobian triplets are well-formed");
        let hessian = jacobian
            .as_ref()
            .transpose()
            .to_col_major()
            .expect("transpose to column-major")
            .mul(jacobian.as_ref());
        let gradient = jacobian.as_ref().transpose().mul(&residuals);

        let sym = match &self.symbolic {
            Some((cached_version, sym)) if *cached_version == version => sym.clone(),
            _ => {
                let sym = SymbolicLlt::try_new(hessian.symbolic(), Side::Lower)
                    .map_err(|_| SolveError::NotPositiveDefinite)?;
                self.symbolic = Some((version, sym.clone()));
                sym
            }
        };

        let cholesky = Llt::try_new_with_symbolic(sym, hessian.as_ref(), Side::Lower)
            .map_err(|_| SolveError::NotPositiveDefinite)?;
        let dx = cholesky.solve(-&gradient);

        // Apply the update to every free node.
        let mut step_norm_sq = 0.0;
        for (idx, node) in nodes.iter_mut().enumerate() {
            let Some(col_offset) = offsets[idx] else {
                continue;
            };
            let mut params = node.params();
            for d in 0..params.len() {
                let delta = dx[(col_offset + d, 0)];
                params[d] += delta;
                step_norm_sq += delta * delta;
            }
            node.set_params(&params);
        }

        let (mean_error, max_error) = graph
            .error_stats()
            .expect("non-empty graph has error stats");
        Ok(IterationReport {
            mean_error,
            max_error,
            step_norm: step_norm_sq.sqrt(),
        })
    }

    /// Iterate until the mean reprojection error stops changing by more than
    /// `opts.tol`, or `opts.max_iterations` is reached.
    pub fn iterate_until_convergence(
        &mut self,
        graph: &mut Graph,
        opts: &SolveOptions,
    ) -> Result<SolveReport, SolveError> {
        let mut prev_mean = Real::INFINITY;
        let mut last = None;

        for iteration in 1..=opts.max_iterations {
            let report = self.iterate(graph, opts.robust)?;
            log::debug!(
                "gauss-newton iteration {}: mean {:.6} px, max {:.6} px, step {:.3e}",
                iteration,
                report.mean_error,
                report.max_error,
                report.step_norm
            );
            if (prev_mean - report.mean_error).abs() < opts.tol {
                return Ok(SolveReport {
                    iterations: iteration,
                    mean_error: report.mean_error,
                    max_error: report.max_error,
                    converged: true,
                });
            }
            prev_mean = report.mean_error;
            last = Some(report);
        }

        let last = last.expect("max_iterations must be at least 1");
        Ok(SolveReport {
            iterations: opts.max_iterations,
            mean_error: last.mean_error,
            max_error: last.max_error,
            converged: false,
        })
    }
}
