//! Convergence reporting for the fixed-point loops in [`MeshTree`]
//!
//! [`MeshTree`]: crate::MeshTree
use thiserror::Error;

/// A fixed-point loop which hit its pass cap before settling
///
/// The tree is still structurally valid, but may not match the requested
/// depths everywhere; a [`Divergence::Cleanup`] means that the mesh may
/// contain T-junctions.  Re-issuing the refinement with a stable depth
/// function on a later cycle will usually finish the job.
#[derive(Error, Copy, Clone, Debug, Eq, PartialEq)]
pub enum Divergence {
    /// Coarsening was still reducing nodes after the given number of passes
    #[error("coarsening did not converge within {0} passes")]
    Coarsen(usize),

    /// Refinement was still splitting nodes after the given number of passes
    #[error("refinement did not converge within {0} passes")]
    Refine(usize),

    /// Crack repair was still splitting nodes after the given number of passes
    #[error(
        "crack repair did not converge within {0} passes; \
         the mesh may contain T-junctions"
    )]
    Cleanup(usize),
}

/// Summary of a single call to [`MeshTree::refine`](crate::MeshTree::refine)
#[must_use]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RefineReport {
    /// Coarsening passes which reduced at least one node
    pub coarsen_passes: usize,
    /// Refinement passes (each followed by crack repair)
    pub refine_passes: usize,
    /// Crack-repair passes which split at least one node, summed over every
    /// refinement pass
    pub cleanup_passes: usize,
    /// Loops which hit their pass cap
    pub divergences: Vec<Divergence>,
}

impl RefineReport {
    /// Checks whether every fixed-point loop settled within its cap
    pub fn converged(&self) -> bool {
        self.divergences.is_empty()
    }

    pub(crate) fn diverged(&mut self, d: Divergence) {
        if !self.divergences.contains(&d) {
            log::warn!("{d}");
            self.divergences.push(d);
        }
    }
}

/// Summary of a single call to [`MeshTree::cleanup`](crate::MeshTree::cleanup)
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CleanupReport {
    /// Passes which split at least one node
    pub passes: usize,
    /// Whether a final pass found nothing left to repair
    pub converged: bool,
}
