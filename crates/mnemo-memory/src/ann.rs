// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Random-projection forest for approximate nearest-neighbor search under
//! angular distance.
//!
//! Items are appended with [`AnnIndex::add_item`] and become searchable only
//! after [`AnnIndex::build`]. Adding an item marks the forest stale and a
//! query against a stale forest fails with [`MnemoError::Index`].

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use mnemo_core::MnemoError;

use crate::types::{dot, l2_normalize};

/// Maximum number of items held by a leaf.
const LEAF_SIZE: usize = 16;

/// Seed for split selection so rebuilding the same corpus gives the same
/// forest.
const SEED: u64 = 0x6d6e_656d_6f;

#[derive(Debug, Clone)]
enum Node {
    Leaf(Vec<usize>),
    Split {
        normal: Vec<f32>,
        left: usize,
        right: usize,
    },
}

/// Angular ANN index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct AnnIndex {
    dim: usize,
    n_trees: usize,
    items: Vec<Vec<f32>>,
    nodes: Vec<Node>,
    roots: Vec<usize>,
    built: bool,
}

impl AnnIndex {
    pub fn new(dim: usize, n_trees: usize) -> Self {
        Self {
            dim,
            n_trees: n_trees.max(1),
            items: Vec::new(),
            nodes: Vec::new(),
            roots: Vec::new(),
            built: false,
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of item slots, including zero-filled gaps.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Store `vector` at slot `id`. Skipped slots are zero-filled.
    pub fn add_item(&mut self, id: usize, vector: &[f32]) -> Result<(), MnemoError> {
        if vector.len() != self.dim {
            return Err(MnemoError::Index(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dim
            )));
        }
        let mut v = vector.to_vec();
        l2_normalize(&mut v);
        if id >= self.items.len() {
            self.items.resize(id + 1, vec![0.0; self.dim]);
        }
        self.items[id] = v;
        self.built = false;
        Ok(())
    }

    /// Vector stored at slot `id`.
    pub fn item(&self, id: usize) -> Option<&[f32]> {
        self.items.get(id).map(Vec::as_slice)
    }

    /// (Re)build every tree over the current items.
    pub fn build(&mut self) {
        let mut rng = StdRng::seed_from_u64(SEED);
        self.nodes.clear();
        self.roots.clear();
        let all: Vec<usize> = (0..self.items.len()).collect();
        for _ in 0..self.n_trees {
            let root = self.make_tree(all.clone(), &mut rng);
            self.roots.push(root);
        }
        self.built = true;
    }

    fn make_tree(&mut self, indices: Vec<usize>, rng: &mut StdRng) -> usize {
        if indices.len() <= LEAF_SIZE {
            self.nodes.push(Node::Leaf(indices));
            return self.nodes.len() - 1;
        }

        let a = indices[rng.gen_range(0..indices.len())];
        let b = indices[rng.gen_range(0..indices.len())];
        let mut normal: Vec<f32> = self.items[a]
            .iter()
            .zip(&self.items[b])
            .map(|(x, y)| x - y)
            .collect();
        l2_normalize(&mut normal);

        let (mut left, mut right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| dot(&normal, &self.items[i]) > 0.0);

        // Degenerate split (identical points, zero normal): halve at random.
        if left.is_empty() || right.is_empty() {
            let mut shuffled = indices;
            shuffled.shuffle(rng);
            let mid = shuffled.len() / 2;
            right = shuffled.split_off(mid);
            left = shuffled;
            normal = vec![0.0; self.dim];
        }

        let left_node = self.make_tree(left, rng);
        let right_node = self.make_tree(right, rng);
        self.nodes.push(Node::Split {
            normal,
            left: left_node,
            right: right_node,
        });
        self.nodes.len() - 1
    }

    /// The `n` nearest items to `query` as `(id, angular distance)`, closest
    /// first. Angular distance is `sqrt(2 - 2 cos)`, in `[0, 2]`.
    ///
    /// `search_k` bounds the number of candidates examined; `None` uses
    /// `n * n_trees`.
    pub fn get_nns_by_vector(
        &self,
        query: &[f32],
        n: usize,
        search_k: Option<usize>,
    ) -> Result<Vec<(usize, f32)>, MnemoError> {
        if !self.built {
            return Err(MnemoError::Index(
                "ANN index must be built before it is queried".into(),
            ));
        }
        if query.len() != self.dim {
            return Err(MnemoError::Index(format!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dim
            )));
        }
        if n == 0 || self.items.is_empty() {
            return Ok(Vec::new());
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);
        let search_k = search_k.unwrap_or(n * self.n_trees).max(n);

        let mut heap: BinaryHeap<Candidate> = self
            .roots
            .iter()
            .map(|&node| Candidate {
                priority: f32::INFINITY,
                node,
            })
            .collect();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        while found.len() < search_k {
            let Some(Candidate { priority, node }) = heap.pop() else {
                break;
            };
            match &self.nodes[node] {
                Node::Leaf(ids) => {
                    for &id in ids {
                        if seen.insert(id) {
                            found.push(id);
                        }
                    }
                }
                Node::Split {
                    normal,
                    left,
                    right,
                } => {
                    let margin = dot(normal, &q);
                    // Left holds the positive side of the hyperplane.
                    heap.push(Candidate {
                        priority: priority.min(margin),
                        node: *left,
                    });
                    heap.push(Candidate {
                        priority: priority.min(-margin),
                        node: *right,
                    });
                }
            }
        }

        let mut scored: Vec<(usize, f32)> = found
            .into_iter()
            .map(|id| {
                let cos = dot(&q, &self.items[id]).clamp(-1.0, 1.0);
                (id, (2.0 - 2.0 * cos).max(0.0).sqrt())
            })
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(n);
        Ok(scored)
    }
}

/// Convert an angular distance back to cosine similarity.
pub fn angular_to_cosine(distance: f32) -> f32 {
    1.0 - distance * distance / 2.0
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    priority: f32,
    node: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then(other.node.cmp(&self.node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn query_before_build_is_an_error() {
        let mut index = AnnIndex::new(4, 2);
        index.add_item(0, &unit(4, 0)).unwrap();
        let err = index.get_nns_by_vector(&unit(4, 0), 1, None).unwrap_err();
        assert!(matches!(err, MnemoError::Index(_)));

        index.build();
        assert!(index.get_nns_by_vector(&unit(4, 0), 1, None).is_ok());

        index.add_item(1, &unit(4, 1)).unwrap();
        assert!(!index.is_built());
    }

    #[test]
    fn rejects_wrong_dimension() {
        let mut index = AnnIndex::new(4, 2);
        assert!(index.add_item(0, &[1.0, 0.0]).is_err());
    }

    #[test]
    fn finds_exact_match_first() {
        let mut index = AnnIndex::new(8, 4);
        for i in 0..8 {
            index.add_item(i, &unit(8, i)).unwrap();
        }
        index.build();
        let hits = index.get_nns_by_vector(&unit(8, 5), 3, None).unwrap();
        assert_eq!(hits[0].0, 5);
        assert!(hits[0].1 < 1e-4);
        assert!((angular_to_cosine(hits[0].1) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn large_corpus_exhaustive_search_is_exact() {
        let dim = 16;
        let mut rng = StdRng::seed_from_u64(7);
        let mut index = AnnIndex::new(dim, 5);
        let vectors: Vec<Vec<f32>> = (0..200)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        for (i, v) in vectors.iter().enumerate() {
            index.add_item(i, v).unwrap();
        }
        index.build();

        let hits = index.get_nns_by_vector(&vectors[42], 5, Some(200)).unwrap();
        assert_eq!(hits[0].0, 42);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn duplicate_points_still_build() {
        let mut index = AnnIndex::new(3, 3);
        for i in 0..50 {
            index.add_item(i, &[1.0, 1.0, 0.0]).unwrap();
        }
        index.build();
        let hits = index.get_nns_by_vector(&[1.0, 1.0, 0.0], 10, None).unwrap();
        assert_eq!(hits.len(), 10);
    }

    #[test]
    fn gaps_are_zero_filled() {
        let mut index = AnnIndex::new(2, 1);
        index.add_item(3, &[1.0, 0.0]).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.item(0), Some(&[0.0, 0.0][..]));
    }
}
