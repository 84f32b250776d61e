use crate::all::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(pub usize);

#[derive(Clone, Debug)]
pub struct TrackPoint {
  pub frame: FrameIndex,
  pub position: Vector3d,
  // Observed anchor pixel per view, absent for interpolated points.
  pub pixels: [Option<Vector2d>; VIEW_COUNT],
  pub reprojection_error: Option<f64>,
  // Filled in across a gap rather than observed.
  pub interpolated: bool,
  pub low_confidence: bool,
}

impl TrackPoint {
  pub fn observed(point: &Tracklet3dPoint, low_confidence: bool) -> TrackPoint {
    TrackPoint {
      frame: point.frame,
      position: point.position,
      pixels: [Some(point.pixels[0]), Some(point.pixels[1])],
      reprojection_error: Some(point.reprojection_error),
      interpolated: false,
      low_confidence,
    }
  }

  pub fn interpolated(frame: FrameIndex, position: Vector3d) -> TrackPoint {
    TrackPoint {
      frame,
      position,
      pixels: [None, None],
      reprojection_error: None,
      interpolated: true,
      low_confidence: false,
    }
  }
}

// Full path of one animal. Every frame from start to end has exactly one point.
#[derive(Clone, Debug)]
pub struct Track {
  pub id: TrackId,
  // Constituent 3D tracklets in temporal order.
  pub tracklets: Vec<Tracklet3d>,
  pub points: Vec<TrackPoint>,
}

impl Track {
  pub fn start(&self) -> FrameIndex {
    self.points[0].frame
  }

  pub fn end(&self) -> FrameIndex {
    self.points[self.points.len() - 1].frame
  }

  pub fn interpolated_count(&self) -> usize {
    self.points.iter().filter(|p| p.interpolated).count()
  }

  pub fn at(&self, frame: FrameIndex) -> Option<&TrackPoint> {
    if frame < self.start() || frame > self.end() { return None }
    self.points.get(frame - self.start())
  }
}
