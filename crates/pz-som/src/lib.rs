//! # pz-som
//!
//! Self-organizing-map cell mapping and cluster aggregation.
//!
//! - [`SelfOrganizingMap`]: a pretrained codebook implementing
//!   [`pz_core::SomModel`]
//! - [`mapper`]: feature construction, chunked parallel BMU mapping and
//!   per-cell statistics
//! - [`cluster`]: agglomerative clustering of SOM cells into a
//!   deterministic [`ClusterMap`]

#![warn(missing_docs)]

pub mod cluster;
pub mod mapper;
pub mod model;

pub use cluster::{ClusterMap, Linkage, agglomerate, cluster_count_for};
pub use mapper::{CellAssignment, CellStatistics, DEFAULT_CHUNK_SIZE, assign_cells, build_features, cell_statistics, map_cells};
pub use model::SelfOrganizingMap;
