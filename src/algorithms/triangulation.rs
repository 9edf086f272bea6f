mod cavity;
mod constraint;
mod removal;
mod tin;

pub use tin::{EdgeRef, IncrementalTin, ProgressMonitor, TriangleCount};
