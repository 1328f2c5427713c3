pub mod error;
pub mod features;
pub mod insights;
pub mod kmeans;

pub use error::TrendError;
pub use features::{extract_features, FeatureExtraction, FeatureRow, FeatureVector, Standardizer};
pub use insights::{monthly_trajectory, summarize, SkillSummary, TrajectoryPoint, Weakness};
pub use kmeans::{Cluster, ClusterAssignment, ClusterModel, KMeans};
