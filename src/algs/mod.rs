//! Communication and graph algorithms.

pub mod communicator;
pub mod connectivity;
pub mod export;
pub mod graph_assembly;
pub mod neighbor_exchange;
pub mod wire;

pub use connectivity::{Connection, ConnectionList};
pub use graph_assembly::{AssembledGraphs, GraphAssembler, assemble_graph};
pub use neighbor_exchange::exchange_records;
