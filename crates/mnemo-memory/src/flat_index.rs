// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact (brute-force) L2 vector index used by the indexed-file and
//! relational stores.
//!
//! Two layouts share one contract. `Cpu` keeps a flat `Vec<f32>` and scores
//! row by row. `Accelerated` keeps an `ndarray` matrix with cached row norms
//! and scores every row with one matrix-vector product. If the accelerated
//! layout cannot be set up, construction and loading fall back to `Cpu`.
//!
//! Distances are squared Euclidean, smallest first.

use ndarray::{Array2, ArrayView1, Axis};
use tracing::warn;

use mnemo_core::MnemoError;

const MAGIC: &[u8; 4] = b"MNFX";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Clone)]
pub enum FlatIndex {
    Cpu { dim: usize, data: Vec<f32> },
    Accelerated(MatrixIndex),
}

#[derive(Debug, Clone)]
pub struct MatrixIndex {
    matrix: Array2<f32>,
    sq_norms: Vec<f32>,
}

impl MatrixIndex {
    fn try_new(dim: usize, rows: usize, data: Vec<f32>) -> Result<Self, MnemoError> {
        if dim == 0 {
            return Err(MnemoError::Index("accelerated index needs a non-zero dimension".into()));
        }
        let matrix = Array2::from_shape_vec((rows, dim), data)
            .map_err(|e| MnemoError::Index(format!("accelerated index layout: {e}")))?;
        let sq_norms = matrix.rows().into_iter().map(|r| r.dot(&r)).collect();
        Ok(Self { matrix, sq_norms })
    }

    fn push(&mut self, vector: &[f32]) -> Result<(), MnemoError> {
        self.matrix
            .push_row(ArrayView1::from(vector))
            .map_err(|e| MnemoError::Index(format!("accelerated index push: {e}")))?;
        self.sq_norms.push(vector.iter().map(|v| v * v).sum());
        Ok(())
    }

    fn distances(&self, query: &[f32]) -> Vec<f32> {
        let q = ArrayView1::from(query);
        let q_norm = q.dot(&q);
        let dots = self.matrix.dot(&q);
        dots.iter()
            .zip(&self.sq_norms)
            .map(|(d, n)| (n - 2.0 * d + q_norm).max(0.0))
            .collect()
    }
}

impl FlatIndex {
    /// An empty index. Requesting acceleration falls back to the CPU layout
    /// with a warning if the matrix cannot be allocated.
    pub fn new(dim: usize, accelerated: bool) -> Self {
        Self::from_rows(dim, 0, Vec::new(), accelerated)
    }

    fn from_rows(dim: usize, rows: usize, data: Vec<f32>, accelerated: bool) -> Self {
        if accelerated {
            match MatrixIndex::try_new(dim, rows, data.clone()) {
                Ok(m) => return FlatIndex::Accelerated(m),
                Err(e) => warn!(error = %e, "accelerated index unavailable, using CPU index"),
            }
        }
        FlatIndex::Cpu { dim, data }
    }

    pub fn dim(&self) -> usize {
        match self {
            FlatIndex::Cpu { dim, .. } => *dim,
            FlatIndex::Accelerated(m) => m.matrix.ncols(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FlatIndex::Cpu { dim, data } => data.len() / (*dim).max(1),
            FlatIndex::Accelerated(m) => m.matrix.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_accelerated(&self) -> bool {
        matches!(self, FlatIndex::Accelerated(_))
    }

    /// Append a vector and return its position.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, MnemoError> {
        let dim = self.dim();
        if vector.len() != dim {
            return Err(MnemoError::Index(format!(
                "vector has {} dimensions, index expects {dim}",
                vector.len()
            )));
        }
        let slot = self.len();
        match self {
            FlatIndex::Cpu { data, .. } => data.extend_from_slice(vector),
            FlatIndex::Accelerated(m) => m.push(vector)?,
        }
        Ok(slot)
    }

    /// Keep only the first `len` vectors.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len() {
            return;
        }
        match self {
            FlatIndex::Cpu { dim, data } => data.truncate(len * *dim),
            FlatIndex::Accelerated(m) => {
                m.matrix = m.matrix.slice_axis(Axis(0), (0..len).into()).to_owned();
                m.sq_norms.truncate(len);
            }
        }
    }

    /// Copy of the vector at `pos`.
    pub fn vector(&self, pos: usize) -> Option<Vec<f32>> {
        if pos >= self.len() {
            return None;
        }
        match self {
            FlatIndex::Cpu { dim, data } => Some(data[pos * dim..(pos + 1) * dim].to_vec()),
            FlatIndex::Accelerated(m) => Some(m.matrix.row(pos).to_vec()),
        }
    }

    /// The `k` closest vectors as `(position, squared L2 distance)`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, MnemoError> {
        let dim = self.dim();
        if query.len() != dim {
            return Err(MnemoError::Index(format!(
                "query has {} dimensions, index expects {dim}",
                query.len()
            )));
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let distances: Vec<f32> = match self {
            FlatIndex::Cpu { data, .. } => data
                .chunks_exact(dim)
                .map(|row| row.iter().zip(query).map(|(a, b)| (a - b) * (a - b)).sum())
                .collect(),
            FlatIndex::Accelerated(m) => m.distances(query),
        };

        let mut ranked: Vec<(usize, f32)> = distances.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }

    /// Serialize as `MNFX | version | dim | count | f32 LE rows`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let dim = self.dim();
        let count = self.len();
        let mut out = Vec::with_capacity(HEADER_LEN + count * dim * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&(dim as u32).to_le_bytes());
        out.extend_from_slice(&(count as u64).to_le_bytes());
        match self {
            FlatIndex::Cpu { data, .. } => {
                for v in data {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            FlatIndex::Accelerated(m) => {
                for v in m.matrix.iter() {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        out
    }

    /// Parse bytes written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8], accelerated: bool) -> Result<Self, MnemoError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(MnemoError::Corruption("not a vector index file".into()));
        }
        let version = u32::from_le_bytes(le_array(&bytes[4..8])?);
        if version != VERSION {
            return Err(MnemoError::Corruption(format!(
                "unsupported vector index version {version}"
            )));
        }
        let dim = u32::from_le_bytes(le_array(&bytes[8..12])?) as usize;
        let count = u64::from_le_bytes(le_array(&bytes[12..20])?) as usize;

        let body = &bytes[HEADER_LEN..];
        if body.len() != count.saturating_mul(dim).saturating_mul(4) {
            return Err(MnemoError::Corruption(format!(
                "vector index declares {count} x {dim} floats but holds {} bytes",
                body.len()
            )));
        }
        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Self::from_rows(dim, count, data, accelerated))
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], MnemoError> {
    bytes
        .try_into()
        .map_err(|_| MnemoError::Corruption("truncated vector index header".into()))
}

/// Similarity score reported for an L2 distance.
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(accelerated: bool) -> FlatIndex {
        let mut index = FlatIndex::new(3, accelerated);
        index.add(&[1.0, 0.0, 0.0]).unwrap();
        index.add(&[0.0, 1.0, 0.0]).unwrap();
        index.add(&[0.0, 0.0, 1.0]).unwrap();
        index
    }

    #[test]
    fn both_layouts_agree() {
        for accelerated in [false, true] {
            let index = filled(accelerated);
            assert_eq!(index.is_accelerated(), accelerated);
            let hits = index.search(&[0.0, 0.9, 0.1], 2).unwrap();
            assert_eq!(hits[0].0, 1);
            assert!((hits[0].1 - 0.02).abs() < 1e-5);
            assert_eq!(hits.len(), 2);
        }
    }

    #[test]
    fn k_is_capped_at_len() {
        let index = filled(false);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
        assert!(FlatIndex::new(3, false).search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut index = FlatIndex::new(3, true);
        assert!(matches!(index.add(&[1.0]), Err(MnemoError::Index(_))));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn zero_dimension_falls_back_to_cpu() {
        let index = FlatIndex::new(0, true);
        assert!(!index.is_accelerated());
    }

    #[test]
    fn truncate_drops_tail() {
        for accelerated in [false, true] {
            let mut index = filled(accelerated);
            index.truncate(1);
            assert_eq!(index.len(), 1);
            assert_eq!(index.vector(0), Some(vec![1.0, 0.0, 0.0]));
            assert_eq!(index.vector(1), None);
        }
    }

    #[test]
    fn bytes_round_trip_across_layouts() {
        let bytes = filled(true).to_bytes();
        let loaded = FlatIndex::from_bytes(&bytes, false).unwrap();
        assert!(!loaded.is_accelerated());
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.vector(2), Some(vec![0.0, 0.0, 1.0]));
    }

    #[test]
    fn corrupt_bytes_are_reported() {
        assert!(matches!(
            FlatIndex::from_bytes(b"nope", false),
            Err(MnemoError::Corruption(_))
        ));
        let mut bytes = filled(false).to_bytes();
        bytes.pop();
        assert!(matches!(
            FlatIndex::from_bytes(&bytes, true),
            Err(MnemoError::Corruption(_))
        ));
    }

    #[test]
    fn similarity_is_monotonic() {
        assert_eq!(distance_to_similarity(0.0), 1.0);
        assert!(distance_to_similarity(0.5) > distance_to_similarity(1.0));
    }
}
