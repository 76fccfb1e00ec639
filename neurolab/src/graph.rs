//! Directed graph of the imaging spaces.
//!
//! Nodes are [`Space`]s, edges are registered [`SpacePair`]s. Every edge
//! carries a linear artifact; all but the degenerate short-range pairs also
//! carry a non-linear one. The table is declarative: which producer computes
//! an edge and whether it has a warp never depends on the subject.

use std::sync::OnceLock;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::space::{Space, SpacePair};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Affine `.mat` file.
    Linear,
    /// Warp field image.
    NonLinear,
}

/// Producer method responsible for a cluster of edges.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, Serialize, Deserialize)]
pub enum Producer {
    #[strum(serialize = "transform_mpr")]
    Mpr,
    #[strum(serialize = "transform_rs")]
    Rs,
    #[strum(serialize = "transform_fmri")]
    Fmri,
    #[strum(serialize = "transform_dti_t2")]
    DtiT2,
    #[strum(serialize = "transform_extra")]
    Extra,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Edge {
    pub pair: SpacePair,
    pub producer: Producer,
    /// `false` for degenerate pairs, whose non-linear lookup aliases the
    /// linear artifact.
    pub has_warp: bool,
}

const fn pair(from: Space, to: Space) -> SpacePair {
    SpacePair::new(from, to)
}

/// Registered pairs, each expanded to both directions.
const UNDIRECTED: [(SpacePair, Producer); 15] = [
    (pair(Space::Hr, Space::Std), Producer::Mpr),
    (pair(Space::Hr, Space::Std4), Producer::Mpr),
    (pair(Space::Rs, Space::Hr), Producer::Rs),
    (pair(Space::Rs, Space::Std), Producer::Rs),
    (pair(Space::Rs, Space::Std4), Producer::Rs),
    (pair(Space::Fmri, Space::Hr), Producer::Fmri),
    (pair(Space::Fmri, Space::Std), Producer::Fmri),
    (pair(Space::Fmri, Space::Std4), Producer::Fmri),
    (pair(Space::Dti, Space::Hr), Producer::DtiT2),
    (pair(Space::Dti, Space::Std), Producer::DtiT2),
    (pair(Space::Dti, Space::Std4), Producer::DtiT2),
    (pair(Space::Dti, Space::T2), Producer::DtiT2),
    (pair(Space::T2, Space::Hr), Producer::DtiT2),
    (pair(Space::T2, Space::Std), Producer::DtiT2),
    (pair(Space::Rs, Space::Fmri), Producer::Extra),
];

/// Short-range pairs that are never estimated non-linearly.
pub const DEGENERATE: [SpacePair; 6] = [
    pair(Space::Rs, Space::Hr),
    pair(Space::Fmri, Space::Hr),
    pair(Space::T2, Space::Hr),
    pair(Space::Hr, Space::Rs),
    pair(Space::Hr, Space::Fmri),
    pair(Space::Hr, Space::T2),
];

/// Space whose `reg/` folder stores the artifacts of a pair.
pub fn owner(pair: SpacePair) -> Space {
    const PRIORITY: [Space; 7] = [
        Space::Dti,
        Space::Rs,
        Space::Fmri,
        Space::T2,
        Space::Hr,
        Space::Std,
        Space::Std4,
    ];
    let rank = |space: Space| {
        PRIORITY
            .iter()
            .position(|s| *s == space)
            .unwrap_or(PRIORITY.len())
    };
    if rank(pair.from) <= rank(pair.to) {
        pair.from
    } else {
        pair.to
    }
}

#[derive(Debug, Clone)]
pub struct TransformGraph {
    edges: Vec<Edge>,
    index: HashMap<SpacePair, usize>,
}

impl Default for TransformGraph {
    fn default() -> Self {
        let mut graph = TransformGraph {
            edges: Vec::with_capacity(UNDIRECTED.len() * 2),
            index: HashMap::with_capacity(UNDIRECTED.len() * 2),
        };

        for (pair, producer) in UNDIRECTED {
            for directed in [pair, pair.reversed()] {
                graph.add(Edge {
                    pair: directed,
                    producer,
                    has_warp: !DEGENERATE.contains(&directed),
                });
            }
        }

        graph
    }
}

impl TransformGraph {
    /// Process-wide instance of the static table.
    pub fn shared() -> &'static TransformGraph {
        static GRAPH: OnceLock<TransformGraph> = OnceLock::new();
        GRAPH.get_or_init(TransformGraph::default)
    }

    fn add(&mut self, edge: Edge) {
        let prev = self.index.insert(edge.pair, self.edges.len());
        assert!(prev.is_none(), "Duplicate edge {}", edge.pair);
        self.edges.push(edge);
    }

    pub fn edge(&self, pair: SpacePair) -> Option<&Edge> {
        self.index.get(&pair).map(|&idx| &self.edges[idx])
    }

    pub fn contains(&self, pair: SpacePair) -> bool {
        self.index.contains_key(&pair)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn is_degenerate(&self, pair: SpacePair) -> bool {
        self.edge(pair).is_some_and(|edge| !edge.has_warp)
    }

    /// Whether the registry holds an artifact slot of `kind` for `pair`.
    pub fn has_slot(&self, pair: SpacePair, kind: ArtifactKind) -> bool {
        match (self.edge(pair), kind) {
            (None, _) => false,
            (Some(_), ArtifactKind::Linear) => true,
            (Some(edge), ArtifactKind::NonLinear) => edge.has_warp,
        }
    }

    pub fn edges_from(&self, space: Space) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |edge| edge.pair.from == space)
    }

    pub fn edges_of(&self, producer: Producer) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |edge| edge.producer == producer)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
