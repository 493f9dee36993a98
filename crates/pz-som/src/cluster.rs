//! Agglomerative clustering of SOM cells.
//!
//! Individual cells often hold too few reference galaxies for a stable
//! conditional redshift estimate, so cells are pooled into coarser clusters
//! that still respect the map's locality.
//!
//! Clustering is a nearest-neighbour-chain agglomeration over Euclidean
//! distances between codebook vectors, with Lance-Williams updates. All
//! supported linkages are reducible, so the chain yields the same
//! dendrogram as the naive algorithm in `O(n^2)` time. The pairwise
//! distances are held in a condensed matrix of `n (n - 1) / 2` entries.

use pz_core::{Error, PipelineConfig, Result, SomModel};
use serde::{Deserialize, Serialize};

/// Inter-cluster distance update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Linkage {
    /// Maximum pairwise distance.
    #[default]
    Complete,
    /// Minimum pairwise distance.
    Single,
    /// Size-weighted mean pairwise distance (UPGMA).
    Average,
}

impl Linkage {
    #[inline]
    fn update(self, d_ik: f64, d_jk: f64, n_i: usize, n_j: usize) -> f64 {
        match self {
            Linkage::Complete => d_ik.max(d_jk),
            Linkage::Single => d_ik.min(d_jk),
            Linkage::Average => (n_i as f64 * d_ik + n_j as f64 * d_jk) / (n_i + n_j) as f64,
        }
    }
}

/// Number of clusters for a fraction of the cell count (at least one).
pub fn cluster_count_for(cell_count: usize, fraction: f64) -> usize {
    ((cell_count as f64 * fraction).floor() as usize).clamp(1, cell_count.max(1))
}

/// Deterministic cell id -> cluster id lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMap {
    labels: Vec<usize>,
    cluster_count: usize,
}

impl ClusterMap {
    /// Wrap precomputed labels; every label must be `< cluster_count`.
    pub fn from_labels(labels: Vec<usize>, cluster_count: usize) -> Result<Self> {
        if let Some((cell, &l)) = labels.iter().enumerate().find(|(_, l)| **l >= cluster_count) {
            return Err(Error::Configuration(format!(
                "cell {cell}: cluster id {l} >= cluster count {cluster_count}"
            )));
        }
        Ok(Self { labels, cluster_count })
    }

    /// Cluster the model's codebook.
    pub fn from_model(model: &dyn SomModel, n_clusters: usize, linkage: Linkage) -> Result<Self> {
        let map = agglomerate(model.codebook(), n_clusters, linkage)?;
        pz_core::ensure_len("cluster map", model.cell_count(), map.len())?;
        Ok(map)
    }

    /// Cluster the codebook into `cluster_fraction` of its cells.
    pub fn from_config(model: &dyn SomModel, config: &PipelineConfig, linkage: Linkage) -> Result<Self> {
        Self::from_model(model, cluster_count_for(model.cell_count(), config.cluster_fraction), linkage)
    }

    /// Cluster id of `cell`.
    pub fn lookup(&self, cell: usize) -> Option<usize> {
        self.labels.get(cell).copied()
    }

    /// Cluster ids for a sequence of cells.
    pub fn assign(&self, cells: &[usize]) -> Result<Vec<usize>> {
        cells
            .iter()
            .map(|&c| {
                self.lookup(c).ok_or_else(|| {
                    Error::Configuration(format!("cell id {c} >= cell count {}", self.labels.len()))
                })
            })
            .collect()
    }

    /// Per-cell labels.
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True if the map covers no cells.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }
}

// ---------------------------------------------------------------------------
// NN-chain agglomeration
// ---------------------------------------------------------------------------

struct Condensed {
    n: usize,
    d: Vec<f64>,
}

impl Condensed {
    fn new(points: &[Vec<f64>]) -> Self {
        let n = points.len();
        let mut d = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in i + 1..n {
                let s: f64 = points[i].iter().zip(&points[j]).map(|(a, b)| (a - b) * (a - b)).sum();
                d.push(s.sqrt());
            }
        }
        Self { n, d }
    }

    #[inline]
    fn idx(&self, i: usize, j: usize) -> usize {
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        self.n * i - i * (i + 1) / 2 + (j - i - 1)
    }

    #[inline]
    fn get(&self, i: usize, j: usize) -> f64 {
        self.d[self.idx(i, j)]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, v: f64) {
        let k = self.idx(i, j);
        self.d[k] = v;
    }
}

struct Merge {
    a: usize,
    b: usize,
    height: f64,
}

fn nn_chain(points: &[Vec<f64>], linkage: Linkage) -> Vec<Merge> {
    let n = points.len();
    let mut dist = Condensed::new(points);
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));
    let mut chain: Vec<usize> = Vec::with_capacity(n);

    while merges.len() + 1 < n {
        if chain.is_empty() {
            if let Some(first) = active.iter().position(|&a| a) {
                chain.push(first);
            }
        }
        let Some(&a) = chain.last() else { break };
        let prev = chain.len().checked_sub(2).map(|k| chain[k]);

        // Prefer the previous chain element on ties so the chain terminates.
        let (mut best, mut best_d) = match prev {
            Some(p) => (p, dist.get(a, p)),
            None => (usize::MAX, f64::INFINITY),
        };
        for k in 0..n {
            if !active[k] || k == a {
                continue;
            }
            let d = dist.get(a, k);
            if d < best_d {
                best = k;
                best_d = d;
            }
        }
        if best == usize::MAX {
            break;
        }

        if Some(best) == prev {
            chain.pop();
            chain.pop();
            let (keep, drop) = if a < best { (a, best) } else { (best, a) };
            merges.push(Merge { a: keep, b: drop, height: best_d });
            for k in 0..n {
                if !active[k] || k == keep || k == drop {
                    continue;
                }
                let v = linkage.update(dist.get(keep, k), dist.get(drop, k), size[keep], size[drop]);
                dist.set(keep, k, v);
            }
            size[keep] += size[drop];
            active[drop] = false;
        } else {
            chain.push(best);
        }
    }
    merges
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Cluster codebook vectors into `n_clusters` groups.
///
/// Labels are numbered by first appearance in cell order, so the result
/// depends only on the codebook and the requested count.
pub fn agglomerate(codebook: &[Vec<f64>], n_clusters: usize, linkage: Linkage) -> Result<ClusterMap> {
    let n = codebook.len();
    if n_clusters == 0 || n_clusters > n {
        return Err(Error::Configuration(format!(
            "n_clusters must be in [1, {n}], got {n_clusters}"
        )));
    }
    if let Some(dim) = codebook.first().map(Vec::len) {
        if let Some(cell) = codebook.iter().position(|w| w.len() != dim) {
            return Err(Error::Configuration(format!(
                "codebook cell {cell}: expected dimension {dim}, got {}",
                codebook[cell].len()
            )));
        }
    }

    let start = std::time::Instant::now();
    let mut merges = nn_chain(codebook, linkage);
    merges.sort_by(|x, y| x.height.total_cmp(&y.height));

    let mut parent: Vec<usize> = (0..n).collect();
    for m in merges.iter().take(n - n_clusters) {
        let ra = find(&mut parent, m.a);
        let rb = find(&mut parent, m.b);
        if ra != rb {
            parent[ra.max(rb)] = ra.min(rb);
        }
    }

    let mut root_label = vec![usize::MAX; n];
    let mut next = 0;
    let mut labels = Vec::with_capacity(n);
    for cell in 0..n {
        let r = find(&mut parent, cell);
        if root_label[r] == usize::MAX {
            root_label[r] = next;
            next += 1;
        }
        labels.push(root_label[r]);
    }

    tracing::info!(
        cells = n,
        clusters = next,
        linkage = ?linkage,
        wall_s = start.elapsed().as_secs_f64(),
        "cell clustering complete"
    );
    ClusterMap::from_labels(labels, next)
}
