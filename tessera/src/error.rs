//! Module containing the Tessera universal error type
use thiserror::Error;

/// Universal error type for Tessera
#[derive(Error, Debug)]
pub enum Error {
    /// Flat triangle list is not a multiple of 3
    #[error("triangle list length ({0}) is not a multiple of 3")]
    BadTriangleList(usize),

    /// Triangle refers to a vertex which does not exist
    #[error("vertex index {index} is out of range (vertex count is {count})")]
    BadVertexIndex { index: u32, count: usize },

    /// Triangle uses the same vertex more than once
    #[error("triangle {0} is degenerate (repeated vertex)")]
    DegenerateTriangle(usize),

    /// Vertex list is too large to be addressed with `u32` indices
    #[error("too many vertices ({0}); indices must fit in a `u32`")]
    TooManyVertices(usize),

    /// Structural self-check failed
    #[error("broken invariant: {0}")]
    BrokenInvariant(String),

    /// IO error; see inner code for details
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
