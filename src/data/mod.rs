//! Data module: id maps, sparse graphs, and value storage.

pub mod atomic_float;
pub mod field;
pub mod local_id_map;
pub mod matrix;
pub mod sparse_graph;

pub use atomic_float::AtomicF64;
pub use field::Field;
pub use local_id_map::{ColumnMap, LocalIdMap, RowMap};
pub use matrix::{DistributedMatrix, DistributedVector, LocalMatrixView, LocalVectorView};
pub use sparse_graph::SparseGraph;
