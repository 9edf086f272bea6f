//! Incremental constrained Delaunay triangulation with bounded Voronoi
//! diagrams.
//!
//! The core is a quad-edge mesh grown by Bowyer-Watson insertion with a
//! stochastic Lawson walk for point location, Devillers ear-scored vertex
//! removal, and constraint insertion with optional conformity restoration.
//! The bounded Voronoi builder derives Thiessen polygons from the
//! triangulation's dual, clipped to a rectangular frame.
//!
//! ```
//! use tessera::{IncrementalTin, Vertex};
//!
//! let mut tin = IncrementalTin::new(1.0);
//! for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
//!   tin.add(Vertex::new(x, y, 0.0)).unwrap();
//! }
//! assert!(tin.is_bootstrapped());
//! assert_eq!(tin.count_triangles().count, 2);
//! ```

use std::fmt;

pub mod algorithms;
pub mod data;
mod predicates;

pub use algorithms::triangulation::{EdgeRef, IncrementalTin, ProgressMonitor, TriangleCount};
pub use algorithms::voronoi::{BoundedVoronoi, BoundedVoronoiOptions, ThiessenPolygon};
pub use data::{Bounds, Constraint, ConstraintKind, Vertex, VertexMergerGroup, ZResolution};
pub use predicates::{Orientation, Predicates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  /// Fewer than three distinct vertices were supplied.
  InsufficientVertices,
  /// Every candidate seed triple was collinear; the mesh could not
  /// bootstrap.
  CoLinearViolation,
  /// An explicit Voronoi frame does not contain the sample bounds.
  BoundsViolation,
  /// More constraints than the per-edge index field can address.
  ConstraintOverflow,
  /// The mesh is locked against vertex mutation.
  Locked,
  /// The mesh was disposed.
  Disposed,
  /// Internal topological bookkeeping failed; the instance should be
  /// discarded.
  InvariantViolation,
}

impl fmt::Display for Error {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    let text = match self {
      Error::InsufficientVertices => "insufficient vertices",
      Error::CoLinearViolation => "input vertices are collinear",
      Error::BoundsViolation => "bounds do not contain the samples",
      Error::ConstraintOverflow => "too many constraints",
      Error::Locked => "mesh is locked",
      Error::Disposed => "mesh was disposed",
      Error::InvariantViolation => "internal invariant violation",
    };
    write!(fmt, "{}", text)
  }
}

impl std::error::Error for Error {}
