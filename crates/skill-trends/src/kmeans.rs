//! Seeded k-means over standardized game features.

use chess_core::GameId;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TrendError;
use crate::features::{FeatureRow, FeatureVector, Standardizer, ACCURACY, ACL, FEATURE_COUNT, RATING_DELTA};

pub const DEFAULT_K: usize = 3;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_MAX_ITERATIONS: usize = 300;
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KMeans {
    pub k: usize,
    pub seed: u64,
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this, in standardized units.
    pub tolerance: f64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAssignment {
    pub game_id: GameId,
    pub label: usize,
    /// Euclidean distance to the assigned centroid, standardized units.
    pub distance: f64,
    /// Assigned centroid in original units.
    pub centroid: FeatureVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub label: usize,
    pub size: usize,
    pub centroid: FeatureVector,
    /// `centroid` mapped back to acl / accuracy / score / rating delta.
    pub centroid_original: FeatureVector,
    pub avg_acl: Option<f64>,
    pub avg_accuracy: Option<f64>,
    pub avg_rating_delta: Option<f64>,
    pub inertia: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterModel {
    pub k: usize,
    pub seed: u64,
    pub iterations: usize,
    pub converged: bool,
    pub standardizer: Standardizer,
    pub clusters: Vec<Cluster>,
    pub assignments: Vec<ClusterAssignment>,
    pub inertia: f64,
}

impl ClusterModel {
    /// Nearest cluster for a raw (unstandardized) feature vector.
    pub fn predict(&self, values: &FeatureVector) -> (usize, f64) {
        let z = self.standardizer.transform(values);
        let centroids: Vec<FeatureVector> = self.clusters.iter().map(|c| c.centroid).collect();
        let (label, d2) = nearest(&z, &centroids);
        (label, d2.sqrt())
    }

    pub fn label_of(&self, game_id: GameId) -> Option<usize> {
        self.assignments
            .iter()
            .find(|a| a.game_id == game_id)
            .map(|a| a.label)
    }
}

fn squared_distance(a: &FeatureVector, b: &FeatureVector) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Ties go to the lowest label.
fn nearest(point: &FeatureVector, centroids: &[FeatureVector]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (label, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best.1 {
            best = (label, d);
        }
    }
    best
}

impl KMeans {
    pub fn new(k: usize, seed: u64) -> Self {
        Self {
            k,
            seed,
            ..Self::default()
        }
    }

    /// Cluster featurized games. Fewer rows than `k` is an error, never a
    /// smaller model.
    pub fn fit(&self, rows: &[FeatureRow]) -> Result<ClusterModel, TrendError> {
        if self.k == 0 || rows.len() < self.k {
            return Err(TrendError::InsufficientData {
                requested: self.k,
                available: rows.len(),
            });
        }

        let raw: Vec<FeatureVector> = rows.iter().map(|r| r.values).collect();
        let standardizer = Standardizer::fit(&raw)?;
        let points = standardizer.transform_all(&raw);

        let mut rng = Pcg32::seed_from_u64(self.seed);
        let mut centroids = self.seed_centroids(&points, &mut rng);
        let mut labels = vec![0usize; points.len()];
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            iterations += 1;
            assign(&points, &centroids, &mut labels);
            let updated = recompute(&points, &labels, &centroids);

            let shift = centroids
                .iter()
                .zip(&updated)
                .map(|(old, new)| squared_distance(old, new))
                .fold(0.0, f64::max);
            centroids = updated;

            if shift <= self.tolerance * self.tolerance {
                converged = true;
                break;
            }
        }
        assign(&points, &centroids, &mut labels);

        debug!(k = self.k, iterations, converged, "k-means finished");

        let mut clusters: Vec<Cluster> = centroids
            .iter()
            .enumerate()
            .map(|(label, centroid)| Cluster {
                label,
                size: 0,
                centroid: *centroid,
                centroid_original: standardizer.inverse_transform(centroid),
                avg_acl: None,
                avg_accuracy: None,
                avg_rating_delta: None,
                inertia: 0.0,
            })
            .collect();

        let mut sums = vec![[0.0; FEATURE_COUNT]; self.k];
        let mut assignments = Vec::with_capacity(rows.len());
        for ((row, point), &label) in rows.iter().zip(&points).zip(&labels) {
            let d2 = squared_distance(point, &centroids[label]);
            let cluster = &mut clusters[label];
            cluster.size += 1;
            cluster.inertia += d2;
            for col in 0..FEATURE_COUNT {
                sums[label][col] += row.values[col];
            }
            assignments.push(ClusterAssignment {
                game_id: row.game_id,
                label,
                distance: d2.sqrt(),
                centroid: cluster.centroid_original,
            });
        }

        for (cluster, sum) in clusters.iter_mut().zip(&sums) {
            if cluster.size > 0 {
                let n = cluster.size as f64;
                cluster.avg_acl = Some(sum[ACL] / n);
                cluster.avg_accuracy = Some(sum[ACCURACY] / n);
                cluster.avg_rating_delta = Some(sum[RATING_DELTA] / n);
            }
        }

        let inertia = clusters.iter().map(|c| c.inertia).sum();
        Ok(ClusterModel {
            k: self.k,
            seed: self.seed,
            iterations,
            converged,
            standardizer,
            clusters,
            assignments,
            inertia,
        })
    }

    /// k-means++: first centroid uniform, then proportional to squared
    /// distance from the nearest chosen centroid.
    fn seed_centroids(&self, points: &[FeatureVector], rng: &mut Pcg32) -> Vec<FeatureVector> {
        let mut chosen = vec![rng.random_range(0..points.len())];

        while chosen.len() < self.k {
            let centroids: Vec<FeatureVector> = chosen.iter().map(|&i| points[i]).collect();
            let weights: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
            let total: f64 = weights.iter().sum();

            let next = if total > 0.0 {
                let target = rng.random::<f64>() * total;
                let mut cumulative = 0.0;
                weights
                    .iter()
                    .position(|w| {
                        cumulative += w;
                        cumulative > target
                    })
                    .unwrap_or_else(|| weights.iter().rposition(|w| *w > 0.0).unwrap_or(0))
            } else {
                // Remaining points all coincide with a centroid
                (0..points.len()).find(|i| !chosen.contains(i)).unwrap_or(0)
            };
            chosen.push(next);
        }

        chosen.into_iter().map(|i| points[i]).collect()
    }
}

fn assign(points: &[FeatureVector], centroids: &[FeatureVector], labels: &mut [usize]) {
    for (point, label) in points.iter().zip(labels.iter_mut()) {
        *label = nearest(point, centroids).0;
    }
}

/// Mean of each cluster. An empty cluster takes the point farthest from its
/// own centroid, each such point used at most once per round.
fn recompute(points: &[FeatureVector], labels: &[usize], centroids: &[FeatureVector]) -> Vec<FeatureVector> {
    let k = centroids.len();
    let mut sums = vec![[0.0; FEATURE_COUNT]; k];
    let mut counts = vec![0usize; k];

    for (point, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        for col in 0..FEATURE_COUNT {
            sums[label][col] += point[col];
        }
    }

    let mut distances: Vec<(usize, f64)> = points
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (p, &l))| (i, squared_distance(p, &centroids[l])))
        .collect();
    distances.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut farthest = distances.into_iter().map(|(i, _)| i);

    (0..k)
        .map(|label| {
            if counts[label] == 0 {
                let reseed = farthest.next().map_or(centroids[label], |i| points[i]);
                debug!(label, "Re-seeding empty cluster");
                return reseed;
            }
            let n = counts[label] as f64;
            let mut centroid = sums[label];
            for value in centroid.iter_mut() {
                *value /= n;
            }
            centroid
        })
        .collect()
}
