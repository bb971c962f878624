//! Adaptive, crack-free level-of-detail triangulation of the sphere.
//!
//! A [`MeshTree`] starts from a closed base triangulation (e.g.
//! [`shapes::icosahedron`]) and is refined against a caller-provided depth
//! function, which maps each triangle to the number of subdivision levels
//! wanted there.  Leaves are split or merged to match; edges between leaves
//! of different depth are stitched together with transitional half splits,
//! so that the surface never has T-junctions.
//!
//! The tree is meant to be refined repeatedly (e.g. once per frame, as a
//! point of interest moves), and only does work where the requested depth
//! changed.
//!
//! ```
//! use tessera::{MeshTree, shapes};
//!
//! let base = shapes::icosahedron();
//! let mut tree = MeshTree::new(&base.vertices, &base.triangles)?;
//!
//! // Refine the northern hemisphere more finely than the southern
//! let report = tree.refine(|t, verts| {
//!     if t.centroid(verts).y > 0.0 { 3 } else { 1 }
//! });
//! assert!(report.converged());
//! assert!(tree.t_junctions().is_empty());
//!
//! // Export the current surface
//! tree.minify_vertices();
//! let mesh = tree.mesh();
//! assert_eq!(mesh.triangles.len(), tree.leaf_count());
//! let mut stl = vec![];
//! mesh.write_stl(&mut stl)?;
//! # Ok::<(), tessera::Error>(())
//! ```
pub mod lod;
pub mod shapes;
pub mod types;

mod error;
mod midpoint;
mod node;
mod output;
mod report;
mod tree;
mod triangle;
mod vertex;

pub use error::Error;
pub use output::Mesh;
pub use report::{CleanupReport, Divergence, RefineReport};
pub use tree::{MeshTree, Settings, TJunction};
pub use triangle::Triangle;
