//! Shared vocabulary types used across the orchestrator crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque job identifier assigned by the remote compute engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Canonical Enums (used across all crates)
// ============================================================================

/// Poll state of a remote job, as seen by the orchestrator.
///
/// The remote engine reports a richer set of states; they are folded into
/// these three by the Job Client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Queued or running on the engine
    Active,
    /// Finished and its output is written
    Succeeded,
    /// Finished without usable output (includes cancellation)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Active => "ACTIVE",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Active)
    }

    /// Fold a raw engine state string into a poll state.
    ///
    /// Unknown states are treated as still active so a group is never merged
    /// on a state the orchestrator does not understand.
    pub fn from_engine_state(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "COMPLETED" | "SUCCEEDED" | "SUCCESS" | "DONE" => JobState::Succeeded,
            "FAILED" | "CANCELLED" | "CANCELED" | "CANCEL_REQUESTED" | "ERROR" => {
                JobState::Failed
            }
            _ => JobState::Active,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(JobState::Active),
            "SUCCEEDED" => Ok(JobState::Succeeded),
            "FAILED" => Ok(JobState::Failed),
            _ => Err(format!("Invalid job state: '{}'", s)),
        }
    }
}

/// Readiness of one upstream (collection, date) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadinessStatus {
    /// Not produced, not denylisted, nothing in flight
    Missing,
    /// Known to have no usable source data; skipped forever
    Empty,
    /// A generation job is in flight
    Pending,
    /// Listed in the upstream collection
    Ready,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Missing => "MISSING",
            ReadinessStatus::Empty => "EMPTY",
            ReadinessStatus::Pending => "PENDING",
            ReadinessStatus::Ready => "READY",
        }
    }

    /// True when downstream processing may treat the date as settled.
    pub fn is_settled(&self) -> bool {
        matches!(self, ReadinessStatus::Ready | ReadinessStatus::Empty)
    }
}

impl fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status column of the product status ledger.
///
/// The on-disk spelling is `RUNNING` / `complete`, kept for compatibility
/// with existing ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductRunStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "complete")]
    Complete,
}

impl ProductRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductRunStatus::Running => "RUNNING",
            ProductRunStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for ProductRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProductRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RUNNING" => Ok(ProductRunStatus::Running),
            "COMPLETE" | "COMPLETED" => Ok(ProductRunStatus::Complete),
            _ => Err(format!("Invalid product status: '{}'", s)),
        }
    }
}

/// Deployment flavour of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    #[default]
    Dev,
    Int,
    Prod,
}

impl EnvironmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentKind::Dev => "dev",
            EnvironmentKind::Int => "int",
            EnvironmentKind::Prod => "prod",
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned rectangle in the coordinates of whatever CRS the caller uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
            && self.min_x < self.max_x
            && self.min_y < self.max_y
    }

    /// Split into four quadrants around the midpoints.
    ///
    /// Order: lower-left, lower-right, upper-left, upper-right. Partition
    /// numbering (`quadrant1..4`) follows this order.
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let mid_x = (self.min_x + self.max_x) / 2.0;
        let mid_y = (self.min_y + self.max_y) / 2.0;
        [
            BoundingBox::new(self.min_x, self.min_y, mid_x, mid_y),
            BoundingBox::new(mid_x, self.min_y, self.max_x, mid_y),
            BoundingBox::new(self.min_x, mid_y, mid_x, self.max_y),
            BoundingBox::new(mid_x, mid_y, self.max_x, self.max_y),
        ]
    }

    /// Closed ring of the rectangle, counter-clockwise from the lower-left.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        [
            [self.min_x, self.min_y],
            [self.max_x, self.min_y],
            [self.max_x, self.max_y],
            [self.min_x, self.max_y],
            [self.min_x, self.min_y],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_folding() {
        assert_eq!(JobState::from_engine_state("COMPLETED"), JobState::Succeeded);
        assert_eq!(JobState::from_engine_state("cancelled"), JobState::Failed);
        assert_eq!(JobState::from_engine_state("RUNNING"), JobState::Active);
        assert_eq!(JobState::from_engine_state("READY"), JobState::Active);
        assert_eq!(JobState::from_engine_state("weird"), JobState::Active);
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Active.is_terminal());
    }

    #[test]
    fn test_product_status_spelling() {
        assert_eq!(ProductRunStatus::Complete.as_str(), "complete");
        assert_eq!(
            "complete".parse::<ProductRunStatus>().unwrap(),
            ProductRunStatus::Complete
        );
        assert_eq!(
            "RUNNING".parse::<ProductRunStatus>().unwrap(),
            ProductRunStatus::Running
        );
        assert!("done".parse::<ProductRunStatus>().is_err());
    }

    #[test]
    fn test_quadrants_cover_region() {
        let region = BoundingBox::new(5.78, 45.70, 10.69, 47.89);
        let quads = region.quadrants();

        let area: f64 = quads.iter().map(|q| q.width() * q.height()).sum();
        let expected = region.width() * region.height();
        assert!((area - expected).abs() < 1e-9);

        assert_eq!(quads[0].min_x, region.min_x);
        assert_eq!(quads[0].min_y, region.min_y);
        assert_eq!(quads[1].max_x, region.max_x);
        assert_eq!(quads[2].max_y, region.max_y);
        assert_eq!(quads[3].max_x, region.max_x);
        assert_eq!(quads[3].max_y, region.max_y);
        assert_eq!(quads[0].max_x, quads[1].min_x);
        assert_eq!(quads[0].max_y, quads[2].min_y);
    }

    #[test]
    fn test_bbox_validity() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(1.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, f64::NAN, 1.0, 1.0).is_valid());
    }
}
