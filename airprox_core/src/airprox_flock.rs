//! The "FLOCK" Engine - disk-based spatiotemporal pattern mining
//!
//! A flock is a group of at least `mu` aircraft that stay inside a disk of
//! radius ε for at least `min_duration` seconds. Mining runs on the flat
//! projection every `cadence` seconds:
//!
//! 1. **Candidates**: radius-ε disks through every close pair of points
//! 2. **Frontier**: subset-free set of disks for this timestep (`DiskStore`)
//! 3. **Linking**: each disk extends the best predecessor sharing ≥ mu members
//! 4. **Finalisation**: predecessors nobody extended end their chain
//!
//! Frontiers are arenas with stable indices; a node's back-link is an index
//! into the previous arena. Only two arenas are ever alive, so each node
//! carries its chain summary forward instead of walking back-links.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    /// Disk radius ε (default: 1000 m)
    pub epsilon: f64,

    /// Minimum number of members (default: 4)
    pub mu: usize,

    /// Minimum chain duration for a report (default: 150 s)
    pub min_duration: f64,

    /// Seconds between mining steps (default: 4)
    pub cadence: u32,

    /// A chain sample is reported every this many links (default: 15)
    pub sample_every: usize,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            epsilon: 1000.0,
            mu: 4,
            min_duration: 150.0,
            cadence: 4,
            sample_every: 15,
        }
    }
}

/// Relative slack on the membership radius so points on the rim count.
const RIM_TOLERANCE: f64 = 1e-9;

// ============================================================================
// GEOMETRY
// ============================================================================

/// A projected aircraft position (x east, y north, meters).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedPoint {
    pub index: usize,
    pub position: Vector2<f64>,
}

impl IndexedPoint {
    pub fn new(index: usize, x: f64, y: f64) -> Self {
        Self {
            index,
            position: Vector2::new(x, y),
        }
    }
}

/// Radius-ε circle and the points inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Disk {
    pub center: Vector2<f64>,
    pub members: BTreeMap<usize, Vector2<f64>>,
}

impl Disk {
    fn gather(center: Vector2<f64>, points: &[IndexedPoint], epsilon_sq: f64) -> Self {
        let limit = epsilon_sq * (1.0 + RIM_TOLERANCE);
        let members = points
            .iter()
            .filter(|p| (p.position - center).norm_squared() <= limit)
            .map(|p| (p.index, p.position))
            .collect();
        Self { center, members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.contains_key(&index)
    }

    /// True when every member of `self` is also in `other`.
    pub fn is_subset_of(&self, other: &Disk) -> bool {
        self.members.len() <= other.members.len()
            && self.members.keys().all(|k| other.members.contains_key(k))
    }

    /// Mean member position.
    pub fn centroid(&self) -> Vector2<f64> {
        if self.members.is_empty() {
            return self.center;
        }
        self.members.values().sum::<Vector2<f64>>() / self.members.len() as f64
    }
}

/// Centres of the (up to two) radius-ε circles through `p` and `q`.
pub fn disk_centers(p: &Vector2<f64>, q: &Vector2<f64>, epsilon: f64) -> Vec<Vector2<f64>> {
    let d = p - q;
    let d2 = d.norm_squared();
    if d2 == 0.0 || d2 > 4.0 * epsilon * epsilon {
        return Vec::new();
    }
    let mid = (p + q) / 2.0;
    let h = (epsilon * epsilon - d2 / 4.0).max(0.0).sqrt();
    let normal = Vector2::new(-d.y, d.x) / d2.sqrt();
    vec![mid + normal * h, mid - normal * h]
}

/// Minimum bounding rectangle of a neighbourhood plus the disks found in it.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    pub ll: Vector2<f64>,
    pub ur: Vector2<f64>,
    pub disks: Vec<Disk>,
}

impl BoundingBox {
    pub fn from_points(points: &[IndexedPoint]) -> Self {
        let mut ll = Vector2::new(f64::INFINITY, f64::INFINITY);
        let mut ur = Vector2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            ll = ll.inf(&p.position);
            ur = ur.sup(&p.position);
        }
        Self {
            ll,
            ur,
            disks: Vec::new(),
        }
    }
}

// ============================================================================
// FRONTIER
// ============================================================================

/// Member snapshot kept for the report.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockSnapshot {
    pub time: f64,
    pub centroid: Vector2<f64>,
    pub members: Vec<usize>,
}

/// Running summary of the chain ending at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSummary {
    pub time_start: f64,
    pub size_sum: usize,
    pub links: usize,
    pub samples: Vec<FlockSnapshot>,
}

impl ChainSummary {
    fn start(snapshot: FlockSnapshot) -> Self {
        Self {
            time_start: snapshot.time,
            size_sum: snapshot.members.len(),
            links: 1,
            samples: vec![snapshot],
        }
    }

    fn extend(&self, snapshot: FlockSnapshot, sample_every: usize) -> Self {
        let mut next = self.clone();
        next.size_sum += snapshot.members.len();
        if next.links % sample_every.max(1) == 0 {
            next.samples.push(snapshot);
        }
        next.links += 1;
        next
    }
}

/// A disk at one mining step.
#[derive(Debug, Clone)]
pub struct DiskNode {
    pub disk: Disk,
    pub time: f64,
    /// Stable index within its frontier
    pub id: usize,
    pub duration: f64,
    /// Predecessor in the previous frontier
    pub prev: Option<usize>,
    /// Extended by some node of the next frontier
    pub reused: bool,
    pub chain: ChainSummary,
}

impl DiskNode {
    fn new(disk: Disk, time: f64, duration: f64) -> Self {
        let chain = ChainSummary::start(Self::snapshot_of(&disk, time));
        Self {
            disk,
            time,
            id: 0,
            duration,
            prev: None,
            reused: false,
            chain,
        }
    }

    fn snapshot_of(disk: &Disk, time: f64) -> FlockSnapshot {
        FlockSnapshot {
            time,
            centroid: disk.centroid(),
            members: disk.members.keys().copied().collect(),
        }
    }

    pub fn snapshot(&self) -> FlockSnapshot {
        Self::snapshot_of(&self.disk, self.time)
    }
}

/// Subset-free frontier of disks for one timestep.
#[derive(Debug, Clone, Default)]
pub struct DiskStore {
    nodes: Vec<DiskNode>,
}

impl DiskStore {
    pub fn nodes(&self) -> &[DiskNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts `disk` unless a retained node already covers it (the earlier
    /// wins on equal sets). Retained nodes covered by `disk` are pruned.
    pub fn insert(&mut self, disk: Disk, time: f64, duration: f64) -> bool {
        if self.nodes.iter().any(|n| disk.is_subset_of(&n.disk)) {
            return false;
        }
        self.nodes.retain(|n| !n.disk.is_subset_of(&disk));
        self.nodes.push(DiskNode::new(disk, time, duration));
        true
    }

    fn assign_ids(&mut self) {
        for (i, n) in self.nodes.iter_mut().enumerate() {
            n.id = i;
        }
    }
}

// ============================================================================
// PATTERNS & MINER
// ============================================================================

/// A completed flock.
#[derive(Debug, Clone, PartialEq)]
pub struct FlockPattern {
    pub time_start: f64,
    pub time_end: f64,
    pub duration: f64,
    pub av_size: f64,
    pub samples: Vec<FlockSnapshot>,
}

pub struct FlockMiner {
    config: FlockConfig,
    current: DiskStore,
    previous: DiskStore,
    steps: u64,
}

impl FlockMiner {
    pub fn new(config: FlockConfig) -> Self {
        Self {
            config,
            current: DiskStore::default(),
            previous: DiskStore::default(),
            steps: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(FlockConfig::default())
    }

    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    pub fn frontier(&self) -> &DiskStore {
        &self.current
    }

    /// Frontier of the step before the current one.
    pub fn previous_frontier(&self) -> &DiskStore {
        &self.previous
    }

    /// True on the seconds mining should run.
    pub fn is_due(&self, t: i64) -> bool {
        t.rem_euclid(self.config.cadence.max(1) as i64) == 0
    }

    /// Candidate disks per neighbourhood, in point order.
    pub fn find_candidate_disks(&self, points: &[IndexedPoint]) -> Vec<BoundingBox> {
        let eps = self.config.epsilon;
        let eps_sq = eps * eps;
        let mu = self.config.mu;
        let mut sorted = points.to_vec();
        sort_points(&mut sorted);

        let mut candidates = Vec::new();
        for pr in &sorted {
            let neighbourhood: Vec<IndexedPoint> = sorted
                .iter()
                .filter(|q| {
                    (q.position.x - pr.position.x).abs() <= eps
                        && (q.position.y - pr.position.y).abs() <= eps
                })
                .copied()
                .collect();
            if neighbourhood.len() < mu {
                continue;
            }

            let mut mbr = BoundingBox::from_points(&neighbourhood);
            for q in &neighbourhood {
                if q.position.x < pr.position.x || q.index == pr.index {
                    continue;
                }
                if (q.position - pr.position).norm_squared() > eps_sq {
                    continue;
                }
                for center in disk_centers(&pr.position, &q.position, eps) {
                    let disk = Disk::gather(center, &neighbourhood, eps_sq);
                    if disk.len() >= mu {
                        mbr.disks.push(disk);
                    }
                }
            }

            if mbr.disks.is_empty() {
                let disk = Disk::gather(pr.position, &neighbourhood, eps_sq);
                if disk.len() >= mu {
                    mbr.disks.push(disk);
                }
            }
            if !mbr.disks.is_empty() {
                candidates.push(mbr);
            }
        }
        candidates
    }

    /// Reduces candidates to a subset-free frontier. Boxes are visited west
    /// to east; every disk is checked against the whole store, since boxes of
    /// one cluster can interleave in x with boxes of another.
    pub fn filter_candidates(&self, mut boxes: Vec<BoundingBox>, t: f64) -> DiskStore {
        boxes.sort_by(|a, b| a.ll.x.total_cmp(&b.ll.x));
        let fresh = self.config.cadence as f64;

        let mut store = DiskStore::default();
        for disk in boxes.into_iter().flat_map(|bb| bb.disks) {
            store.insert(disk, t, fresh);
        }
        store.assign_ids();
        store
    }

    /// Links `current` disks to their best predecessor in `previous`.
    fn connect(&self, current: &mut DiskStore, previous: &mut DiskStore) {
        if current.is_empty() || previous.is_empty() {
            return;
        }
        let mut inverted: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, node) in previous.nodes.iter().enumerate() {
            for &m in node.disk.members.keys() {
                inverted.entry(m).or_default().push(i);
            }
        }

        for node in current.nodes.iter_mut() {
            let mut shared: BTreeMap<usize, usize> = BTreeMap::new();
            for m in node.disk.members.keys() {
                if let Some(prev_ids) = inverted.get(m) {
                    for &p in prev_ids {
                        *shared.entry(p).or_default() += 1;
                    }
                }
            }

            let best = shared
                .iter()
                .filter(|(_, n)| **n >= self.config.mu)
                .map(|(&p, _)| p)
                .max_by(|&a, &b| compare_predecessors(&previous.nodes[a], &previous.nodes[b]));

            if let Some(p) = best {
                let pred = &mut previous.nodes[p];
                pred.reused = true;
                node.duration = pred.duration + (node.time - pred.time);
                node.prev = Some(p);
                node.chain = pred.chain.extend(node.snapshot(), self.config.sample_every);
            }
        }
    }

    fn finalise(&self, store: &DiskStore) -> Vec<FlockPattern> {
        store
            .nodes
            .iter()
            .filter(|n| !n.reused && n.duration >= self.config.min_duration)
            .map(|n| {
                let mut samples = n.chain.samples.clone();
                if samples.last().map_or(true, |s| s.time != n.time) {
                    samples.push(n.snapshot());
                }
                FlockPattern {
                    time_start: n.chain.time_start,
                    time_end: n.time,
                    duration: n.duration,
                    av_size: n.chain.size_sum as f64 / n.chain.links as f64,
                    samples,
                }
            })
            .collect()
    }

    /// One mining step at time `t`. Returns flocks that ended at the
    /// previous step.
    pub fn process(&mut self, t: f64, points: &[IndexedPoint]) -> Vec<FlockPattern> {
        let candidates = self.find_candidate_disks(points);
        let mut current = self.filter_candidates(candidates, t);
        let mut previous = std::mem::take(&mut self.current);

        self.connect(&mut current, &mut previous);
        let finished = self.finalise(&previous);

        self.previous = previous;
        self.current = current;
        self.steps += 1;
        if !finished.is_empty() {
            debug!("Flock step t={} finished {} flock(s)", t, finished.len());
        }
        finished
    }

    /// Ends every chain still open.
    pub fn finish(&mut self) -> Vec<FlockPattern> {
        let finished = self.finalise(&self.current);
        self.previous = std::mem::take(&mut self.current);
        finished
    }

    /// True if `index` is in a current disk that already qualifies as a flock.
    pub fn in_flock(&self, index: usize) -> bool {
        self.current
            .nodes
            .iter()
            .any(|n| n.duration >= self.config.min_duration && n.disk.contains(index))
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

fn sort_points(points: &mut [IndexedPoint]) {
    points.sort_by(|a, b| {
        a.position
            .x
            .total_cmp(&b.position.x)
            .then(a.index.cmp(&b.index))
    });
}

/// Longer duration wins, then more members, then the lower id.
fn compare_predecessors(a: &DiskNode, b: &DiskNode) -> Ordering {
    a.duration
        .total_cmp(&b.duration)
        .then(a.disk.len().cmp(&b.disk.len()))
        .then(b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn cluster(n: usize, x: f64, y: f64, spread: f64) -> Vec<IndexedPoint> {
        (0..n)
            .map(|i| {
                let a = i as f64 * std::f64::consts::TAU / n as f64;
                IndexedPoint::new(i, x + spread * a.cos(), y + spread * a.sin())
            })
            .collect()
    }

    #[test]
    fn test_disk_centers_lie_at_radius() {
        let p = Vector2::new(0.0, 0.0);
        let q = Vector2::new(600.0, 0.0);
        let centers = disk_centers(&p, &q, 1000.0);
        assert_eq!(centers.len(), 2);
        for c in centers {
            assert_relative_eq!((c - p).norm(), 1000.0, epsilon = 1e-9);
            assert_relative_eq!((c - q).norm(), 1000.0, epsilon = 1e-9);
        }
        assert!(disk_centers(&p, &p, 1000.0).is_empty());
    }

    #[test]
    fn test_colocated_points_yield_disk() {
        let miner = FlockMiner::with_defaults();
        let points: Vec<IndexedPoint> = (0..4).map(|i| IndexedPoint::new(i, 50.0, -20.0)).collect();
        let store = miner.filter_candidates(miner.find_candidate_disks(&points), 0.0);
        assert!(store.nodes().iter().any(|n| (0..4).all(|i| n.disk.contains(i))));
    }

    #[test]
    fn test_too_few_points_yield_nothing() {
        let miner = FlockMiner::with_defaults();
        let points = cluster(3, 0.0, 0.0, 50.0);
        assert!(miner.find_candidate_disks(&points).is_empty());
    }

    #[test]
    fn test_store_drops_subsets_and_keeps_first_of_equals() {
        let pts = cluster(5, 0.0, 0.0, 10.0);
        let all = Disk::gather(Vector2::zeros(), &pts, 1e6);
        let four = Disk::gather(Vector2::zeros(), &pts[..4], 1e6);

        let mut store = DiskStore::default();
        assert!(store.insert(four.clone(), 0.0, 4.0));
        assert!(store.insert(all.clone(), 0.0, 4.0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.nodes()[0].disk.len(), 5);

        let mut shifted = all.clone();
        shifted.center = Vector2::new(1.0, 1.0);
        assert!(!store.insert(shifted, 0.0, 4.0));
        assert_eq!(store.nodes()[0].disk.center, Vector2::zeros());
        assert!(!store.insert(four, 0.0, 4.0));
    }

    #[test]
    fn test_group_separation_keeps_disjoint_clusters() {
        let miner = FlockMiner::with_defaults();
        let mut points = cluster(4, 0.0, 0.0, 100.0);
        points.extend(
            cluster(4, 20_000.0, 0.0, 100.0)
                .into_iter()
                .map(|p| IndexedPoint { index: p.index + 10, ..p }),
        );
        let store = miner.filter_candidates(miner.find_candidate_disks(&points), 0.0);
        assert_eq!(store.len(), 2);
        assert!(store.nodes()[0].disk.contains(0));
        assert!(store.nodes()[1].disk.contains(10));
    }

    fn assert_subset_free(store: &DiskStore) {
        let nodes = store.nodes();
        for (i, a) in nodes.iter().enumerate() {
            for (j, b) in nodes.iter().enumerate() {
                assert!(
                    i == j || !a.disk.is_subset_of(&b.disk),
                    "node {} {:?} covered by node {} {:?}",
                    i,
                    a.snapshot().members,
                    j,
                    b.snapshot().members
                );
            }
        }
    }

    #[test]
    fn test_interleaved_clusters_leave_no_subsets() {
        // An elongated gaggle whose neighbourhood boxes are split in x by a
        // group 50 km further north.
        let miner = FlockMiner::with_defaults();
        let mut points: Vec<IndexedPoint> = (0..10)
            .map(|i| IndexedPoint::new(i, 300.0 * i as f64, 80.0 * ((i * 7) % 10) as f64))
            .collect();
        points.extend((0..5).map(|i| {
            IndexedPoint::new(20 + i, 800.0 + 375.0 * i as f64, 50_000.0 + 40.0 * i as f64)
        }));
        let store = miner.filter_candidates(miner.find_candidate_disks(&points), 0.0);
        assert!(!store.is_empty());
        assert_subset_free(&store);
        assert!(store.nodes().iter().any(|n| n.disk.contains(20)));
    }

    #[test]
    fn test_persistent_cluster_forms_one_flock() {
        let mut miner = FlockMiner::with_defaults();
        let points = cluster(5, 1000.0, 2000.0, 45.0);
        let mut reports = Vec::new();
        for k in 0..50 {
            reports.extend(miner.process(4.0 * k as f64, &points));
            if k >= 38 {
                assert!(miner.in_flock(2));
            }
        }
        assert!(reports.is_empty());
        reports.extend(miner.finish());
        assert_eq!(reports.len(), 1);
        let flock = &reports[0];
        assert_relative_eq!(flock.duration, 200.0);
        assert_relative_eq!(flock.av_size, 5.0);
        assert_eq!(flock.time_start, 0.0);
        assert_eq!(flock.time_end, 196.0);
        // samples at links 0, 15, 30, 45 and the tip
        let times: Vec<f64> = flock.samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 60.0, 120.0, 180.0, 196.0]);
    }

    #[test]
    fn test_cluster_break_finishes_chain() {
        let mut miner = FlockMiner::with_defaults();
        let points = cluster(4, 0.0, 0.0, 30.0);
        for k in 0..40 {
            assert!(miner.process(4.0 * k as f64, &points).is_empty());
        }
        let reports = miner.process(160.0, &[]);
        assert_eq!(reports.len(), 1);
        assert_relative_eq!(reports[0].duration, 160.0);
        assert!(!miner.in_flock(0));
        assert!(miner.finish().is_empty());
    }

    #[test]
    fn test_short_cluster_is_not_reported() {
        let mut miner = FlockMiner::with_defaults();
        let points = cluster(4, 0.0, 0.0, 30.0);
        for k in 0..10 {
            miner.process(4.0 * k as f64, &points);
        }
        assert!(miner.finish().is_empty());
    }

    #[test]
    fn test_linking_prefers_longest_chain() {
        let miner = FlockMiner::with_defaults();
        let pts = cluster(6, 0.0, 0.0, 10.0);
        let mut previous = DiskStore::default();
        previous.insert(Disk::gather(Vector2::zeros(), &pts[..4], 1e6), 0.0, 40.0);
        previous.insert(Disk::gather(Vector2::zeros(), &pts[2..], 1e6), 0.0, 80.0);
        previous.assign_ids();

        let mut current = DiskStore::default();
        current.insert(Disk::gather(Vector2::zeros(), &pts, 1e6), 4.0, 4.0);
        current.assign_ids();

        miner.connect(&mut current, &mut previous);
        assert_eq!(current.nodes()[0].prev, Some(1));
        assert_relative_eq!(current.nodes()[0].duration, 84.0);
        assert!(previous.nodes()[1].reused);
        assert!(!previous.nodes()[0].reused);
    }

    proptest! {
        #[test]
        fn prop_frontier_is_subset_free(
            gaggle in prop::collection::vec((0.0f64..3000.0, 0.0f64..800.0), 10),
            north in prop::collection::vec(800.0f64..2300.0, 5),
        ) {
            let miner = FlockMiner::with_defaults();
            let mut points: Vec<IndexedPoint> = gaggle
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| IndexedPoint::new(i, x, y))
                .collect();
            points.extend(north.iter().enumerate().map(|(i, &x)| {
                IndexedPoint::new(20 + i, x, 50_000.0 + 30.0 * i as f64)
            }));
            let store = miner.filter_candidates(miner.find_candidate_disks(&points), 0.0);
            let nodes = store.nodes();
            for (i, a) in nodes.iter().enumerate() {
                for (j, b) in nodes.iter().enumerate() {
                    prop_assert!(i == j || !a.disk.is_subset_of(&b.disk));
                }
            }
        }

        #[test]
        fn prop_persistent_cluster_duration(k in 1usize..60, spread in 0.0f64..200.0) {
            let config = FlockConfig::default();
            let mut miner = FlockMiner::new(config.clone());
            let points = cluster(config.mu, 0.0, 0.0, spread);
            let mut reports = Vec::new();
            for step in 0..k {
                reports.extend(miner.process((config.cadence as usize * step) as f64, &points));
            }
            let tip = miner.frontier().nodes().iter().map(|n| n.duration).fold(0.0, f64::max);
            prop_assert!(tip >= (k as f64) * config.cadence as f64);
            reports.extend(miner.finish());
            prop_assert_eq!(reports.len() == 1, tip >= config.min_duration);
        }
    }
}
