use pz_core::{ColumnUsage, GalaxyBatch, Population, SomModel};
use pz_som::{ClusterMap, Linkage, SelfOrganizingMap, assign_cells, cell_statistics, cluster_count_for};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 4x4 map whose cells sit on a unit lattice in (g-r, r-i) color space.
fn lattice_som() -> SelfOrganizingMap {
    let codebook = (0..16).map(|c| vec![(c / 4) as f64, (c % 4) as f64]).collect();
    SelfOrganizingMap::new(
        4,
        4,
        vec!["mag_g".into(), "mag_r".into(), "mag_i".into()],
        "mag_i",
        ColumnUsage::Colors,
        codebook,
    )
    .unwrap()
}

fn batch_near_cells(cells: &[usize], rng: &mut StdRng) -> GalaxyBatch {
    let mut g = Vec::new();
    let mut r = Vec::new();
    let mut i = Vec::new();
    let mut z = Vec::new();
    for &c in cells {
        let gr = (c / 4) as f64 + rng.random_range(-0.2..0.2);
        let ri = (c % 4) as f64 + rng.random_range(-0.2..0.2);
        let mag_i = 20.0 + rng.random_range(0.0..2.0);
        i.push(mag_i);
        r.push(mag_i + ri);
        g.push(mag_i + ri + gr);
        z.push(0.1 * c as f64);
    }
    GalaxyBatch::new(Population::Reference, z.clone())
        .with_column("mag_g", g)
        .with_column("mag_r", r)
        .with_column("mag_i", i)
        .with_redshift(z)
}

#[test]
fn galaxies_map_to_their_lattice_cell() {
    let som = lattice_som();
    let mut rng = StdRng::seed_from_u64(2024);
    let cells: Vec<usize> = (0..500).map(|k| k % 16).collect();
    let mut batch = batch_near_cells(&cells, &mut rng);

    assign_cells(&som, &mut batch, 37).unwrap();
    assert_eq!(batch.cell_id().unwrap(), cells.as_slice());

    let stats = cell_statistics(batch.cell_id().unwrap(), som.cell_count(), batch.redshift().unwrap(), None).unwrap();
    for c in 0..16 {
        assert!(stats.count[c] > 0);
        assert!((stats.mean[c] - 0.1 * c as f64).abs() < 1e-12);
    }
}

#[test]
fn cluster_map_covers_every_cell() {
    let som = lattice_som();
    for fraction in [0.5, 0.25] {
        let k = cluster_count_for(som.cell_count(), fraction);
        let map = ClusterMap::from_model(&som, k, Linkage::Complete).unwrap();
        assert_eq!(map.len(), som.cell_count());
        assert_eq!(map.cluster_count(), k);
        assert!(map.labels().iter().all(|&l| l < k));
        // Labels are numbered by first appearance.
        assert_eq!(map.lookup(0), Some(0));
    }
}

#[test]
fn clustering_is_deterministic() {
    let som = lattice_som();
    let a = ClusterMap::from_model(&som, 4, Linkage::Complete).unwrap();
    let b = ClusterMap::from_model(&som, 4, Linkage::Complete).unwrap();
    assert_eq!(a, b);
}
