pub mod triangulation;
pub mod voronoi;

#[doc(inline)]
pub use triangulation::{EdgeRef, IncrementalTin, ProgressMonitor, TriangleCount};
#[doc(inline)]
pub use voronoi::{BoundedVoronoi, BoundedVoronoiOptions, ThiessenPolygon};
