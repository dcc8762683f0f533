//! Element and side topologies known to the connectivity builder.
//!
//! Each topology reports its node count and the node pairs joined by an edge
//! of the cell. The reduced ("nearest nodes only") stencil couples a node
//! only to itself and its edge neighbors, so topologies without an edge table
//! cannot take part in it.

use serde::{Deserialize, Serialize};

/// Supported cell topologies, in Exodus local node ordering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellTopology {
    Particle,
    Line2,
    Line3,
    Tri3,
    Tri6,
    Quad4,
    Quad8,
    Quad9,
    Tet4,
    Tet10,
    Pyramid5,
    Wedge6,
    Hex8,
    Hex27,
}

const LINE2_EDGES: &[(u8, u8)] = &[(0, 1)];
const LINE3_EDGES: &[(u8, u8)] = &[(0, 2), (2, 1)];
const TRI3_EDGES: &[(u8, u8)] = &[(0, 1), (1, 2), (2, 0)];
const TRI6_EDGES: &[(u8, u8)] = &[(0, 3), (3, 1), (1, 4), (4, 2), (2, 5), (5, 0)];
const QUAD4_EDGES: &[(u8, u8)] = &[(0, 1), (1, 2), (2, 3), (3, 0)];
const QUAD8_EDGES: &[(u8, u8)] = &[
    (0, 4),
    (4, 1),
    (1, 5),
    (5, 2),
    (2, 6),
    (6, 3),
    (3, 7),
    (7, 0),
];
const QUAD9_EDGES: &[(u8, u8)] = &[
    (0, 4),
    (4, 1),
    (1, 5),
    (5, 2),
    (2, 6),
    (6, 3),
    (3, 7),
    (7, 0),
    (4, 8),
    (5, 8),
    (6, 8),
    (7, 8),
];
const TET4_EDGES: &[(u8, u8)] = &[(0, 1), (1, 2), (2, 0), (0, 3), (1, 3), (2, 3)];
const TET10_EDGES: &[(u8, u8)] = &[
    (0, 4),
    (4, 1),
    (1, 5),
    (5, 2),
    (2, 6),
    (6, 0),
    (0, 7),
    (7, 3),
    (1, 8),
    (8, 3),
    (2, 9),
    (9, 3),
];
const PYRAMID5_EDGES: &[(u8, u8)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (0, 4),
    (1, 4),
    (2, 4),
    (3, 4),
];
const WEDGE6_EDGES: &[(u8, u8)] = &[
    (0, 1),
    (1, 2),
    (2, 0),
    (3, 4),
    (4, 5),
    (5, 3),
    (0, 3),
    (1, 4),
    (2, 5),
];
const HEX8_EDGES: &[(u8, u8)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 0),
    (4, 5),
    (5, 6),
    (6, 7),
    (7, 4),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Lattice position of each Hex27 node on a 3x3x3 grid.
const HEX27_LATTICE: [(u8, u8, u8); 27] = [
    (0, 0, 0),
    (2, 0, 0),
    (2, 2, 0),
    (0, 2, 0),
    (0, 0, 2),
    (2, 0, 2),
    (2, 2, 2),
    (0, 2, 2),
    (1, 0, 0),
    (2, 1, 0),
    (1, 2, 0),
    (0, 1, 0),
    (0, 0, 1),
    (2, 0, 1),
    (2, 2, 1),
    (0, 2, 1),
    (1, 0, 2),
    (2, 1, 2),
    (1, 2, 2),
    (0, 1, 2),
    (1, 1, 1),
    (1, 1, 0),
    (1, 1, 2),
    (0, 1, 1),
    (2, 1, 1),
    (1, 0, 1),
    (1, 2, 1),
];

// Nearest neighbors on the lattice: the edges of the eight sub-hexes.
const fn hex27_lattice_edges() -> [(u8, u8); 54] {
    let mut out = [(0u8, 0u8); 54];
    let mut n = 0;
    let mut a = 0;
    while a < 27 {
        let mut b = a + 1;
        while b < 27 {
            let (ax, ay, az) = HEX27_LATTICE[a];
            let (bx, by, bz) = HEX27_LATTICE[b];
            if ax.abs_diff(bx) + ay.abs_diff(by) + az.abs_diff(bz) == 1 {
                out[n] = (a as u8, b as u8);
                n += 1;
            }
            b += 1;
        }
        a += 1;
    }
    out
}

const HEX27_EDGES: [(u8, u8); 54] = hex27_lattice_edges();

impl CellTopology {
    /// Number of nodes of a cell with this topology.
    pub const fn num_nodes(self) -> usize {
        match self {
            CellTopology::Particle => 1,
            CellTopology::Line2 => 2,
            CellTopology::Line3 => 3,
            CellTopology::Tri3 => 3,
            CellTopology::Tri6 => 6,
            CellTopology::Quad4 => 4,
            CellTopology::Quad8 => 8,
            CellTopology::Quad9 => 9,
            CellTopology::Tet4 => 4,
            CellTopology::Tet10 => 10,
            CellTopology::Pyramid5 => 5,
            CellTopology::Wedge6 => 6,
            CellTopology::Hex8 => 8,
            CellTopology::Hex27 => 27,
        }
    }

    /// Local node pairs joined by a cell edge, or `None` if the topology has no
    /// edge table (particles).
    pub const fn edge_pairs(self) -> Option<&'static [(u8, u8)]> {
        match self {
            CellTopology::Particle => None,
            CellTopology::Line2 => Some(LINE2_EDGES),
            CellTopology::Line3 => Some(LINE3_EDGES),
            CellTopology::Tri3 => Some(TRI3_EDGES),
            CellTopology::Tri6 => Some(TRI6_EDGES),
            CellTopology::Quad4 => Some(QUAD4_EDGES),
            CellTopology::Quad8 => Some(QUAD8_EDGES),
            CellTopology::Quad9 => Some(QUAD9_EDGES),
            CellTopology::Tet4 => Some(TET4_EDGES),
            CellTopology::Tet10 => Some(TET10_EDGES),
            CellTopology::Pyramid5 => Some(PYRAMID5_EDGES),
            CellTopology::Wedge6 => Some(WEDGE6_EDGES),
            CellTopology::Hex8 => Some(HEX8_EDGES),
            CellTopology::Hex27 => Some(&HEX27_EDGES),
        }
    }
}
