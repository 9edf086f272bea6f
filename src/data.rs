mod bounds;
mod constraint;
mod edge;
mod vertex;

pub use bounds::Bounds;
pub use constraint::{Constraint, ConstraintKind};
pub use edge::{EdgeId, EdgePool, Pinwheel, MAX_CONSTRAINT_INDEX};
pub use vertex::{MeshVertex, Vertex, VertexId, VertexMergerGroup, ZResolution};
