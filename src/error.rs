use crate::all::*;

use thiserror::Error;

// Failure of a single geometric evaluation. Never fatal to a run: the caller
// treats the pair or frame involved as infeasible.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum GeometryError {
  #[error("back-projected rays are parallel")]
  ParallelRays,
  #[error("camera matrix is singular")]
  SingularCalibration,
  #[error("point is behind camera {0}")]
  BehindCamera(usize),
  #[error("pixel could not be undistorted")]
  UndistortionFailed,
  #[error("pixel is at the epipole, its epipolar line is undefined")]
  DegenerateEpipolarLine,
}

// Why a cross-view pair or a stitching link was skipped.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CandidateError {
  #[error("degenerate geometry: {0}")]
  DegenerateGeometry(#[from] GeometryError),
  #[error("tracklets share {shared} frames, at least {required} required")]
  InsufficientOverlap { shared: usize, required: usize },
  #[error("epipolar distance {distance:.2} px at frame {frame} exceeds tolerance")]
  EpipolarViolation { frame: FrameIndex, distance: f64 },
  #[error("triangulation error {error:.3} exceeds rejection threshold {threshold:.3}")]
  ExceedsRejection { error: f64, threshold: f64 },
  #[error("tail has {available} points, at least {required} required to extrapolate")]
  InsufficientGapData { available: usize, required: usize },
  #[error("predicted position is {distance:.3} from the next head, tolerance {tolerance:.3}")]
  MotionDiscontinuity { distance: f64, tolerance: f64 },
}

// Counts of skipped candidates keyed by reason, for the run report.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct RejectionCounts {
  pub degenerate_geometry: usize,
  pub insufficient_overlap: usize,
  pub epipolar_violation: usize,
  pub exceeds_rejection: usize,
  pub insufficient_gap_data: usize,
  pub motion_discontinuity: usize,
}

impl RejectionCounts {
  pub fn count(&mut self, err: &CandidateError) {
    use CandidateError::*;
    match err {
      DegenerateGeometry(_) => self.degenerate_geometry += 1,
      InsufficientOverlap { .. } => self.insufficient_overlap += 1,
      EpipolarViolation { .. } => self.epipolar_violation += 1,
      ExceedsRejection { .. } => self.exceeds_rejection += 1,
      InsufficientGapData { .. } => self.insufficient_gap_data += 1,
      MotionDiscontinuity { .. } => self.motion_discontinuity += 1,
    }
  }

  pub fn total(&self) -> usize {
    self.degenerate_geometry
      + self.insufficient_overlap
      + self.epipolar_violation
      + self.exceeds_rejection
      + self.insufficient_gap_data
      + self.motion_discontinuity
  }
}
