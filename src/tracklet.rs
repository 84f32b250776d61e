use crate::all::*;

// Index of a 2D tracklet in the tracklet list of its view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackletId(pub usize);

// Index of a 3D tracklet in the matcher output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Tracklet3dId(pub usize);

#[derive(Clone, Copy, Debug)]
pub struct TrackletPoint {
  pub frame: FrameIndex,
  pub detection: Detection,
}

// Path of one object in the image of one view. Frames strictly increase.
#[derive(Clone, Debug)]
pub struct Tracklet {
  pub id: TrackletId,
  pub view: usize,
  pub points: Vec<TrackletPoint>,
}

impl Tracklet {
  pub fn new(id: TrackletId, view: usize, frame: FrameIndex, detection: Detection) -> Tracklet {
    Tracklet {
      id,
      view,
      points: vec![TrackletPoint { frame, detection }],
    }
  }

  pub fn start(&self) -> FrameIndex {
    self.points[0].frame
  }

  pub fn end(&self) -> FrameIndex {
    self.points[self.points.len() - 1].frame
  }

  pub fn last(&self) -> &TrackletPoint {
    &self.points[self.points.len() - 1]
  }

  pub fn push(&mut self, frame: FrameIndex, detection: Detection) {
    assert!(frame > self.end());
    self.points.push(TrackletPoint { frame, detection });
  }

  pub fn at(&self, frame: FrameIndex) -> Option<&Detection> {
    self.points.binary_search_by_key(&frame, |p| p.frame)
      .ok()
      .map(|i| &self.points[i].detection)
  }

  // Constant-velocity prediction of the position at `frame` using at most
  // `window` most recent points. A single point predicts itself.
  pub fn predict(&self, frame: FrameIndex, window: usize) -> Vector2d {
    let last = self.last();
    let first = &self.points[self.points.len().saturating_sub(window.max(2))];
    if first.frame == last.frame { return last.detection.position }
    let velocity = (last.detection.position - first.detection.position)
      / (last.frame - first.frame) as f64;
    last.detection.position + velocity * (frame as f64 - last.frame as f64)
  }

  // Frames present in both tracklets, in increasing order.
  pub fn shared_frames(&self, other: &Tracklet) -> Vec<FrameIndex> {
    let mut frames = vec![];
    let (mut i, mut j) = (0, 0);
    while i < self.points.len() && j < other.points.len() {
      let a = self.points[i].frame;
      let b = other.points[j].frame;
      if a == b {
        frames.push(a);
        i += 1;
        j += 1;
      }
      else if a < b {
        i += 1;
      }
      else {
        j += 1;
      }
    }
    frames
  }
}

#[derive(Clone, Copy, Debug)]
pub struct Tracklet3dPoint {
  pub frame: FrameIndex,
  pub position: Vector3d,
  // Anchor pixel of the detection in each view.
  pub pixels: [Vector2d; VIEW_COUNT],
  pub reprojection_error: f64,
}

// Matched pair of 2D tracklets, one per view, triangulated frame by frame.
#[derive(Clone, Debug)]
pub struct Tracklet3d {
  pub id: Tracklet3dId,
  pub tracklets: [TrackletId; VIEW_COUNT],
  pub points: Vec<Tracklet3dPoint>,
  // Aggregated reprojection error, the matching cost of the pair.
  pub score: f64,
  pub low_confidence: bool,
}

impl Tracklet3d {
  pub fn start(&self) -> FrameIndex {
    self.points[0].frame
  }

  pub fn end(&self) -> FrameIndex {
    self.points[self.points.len() - 1].frame
  }

  // Number of frames spanned, including frames without a point.
  pub fn duration(&self) -> usize {
    self.end() - self.start() + 1
  }

  pub fn head(&self) -> &Tracklet3dPoint {
    &self.points[0]
  }
}

#[cfg(test)]
pub mod tests {
  use super::*;

  pub fn detection_at(x: f64, y: f64) -> Detection {
    Detection::new(Vector2d::new(x, y), Vector2d::new(20., 10.), 0.9)
  }

  // Tracklet moving with constant velocity over the given frames.
  pub fn linear_tracklet(
    id: usize,
    view: usize,
    frames: std::ops::Range<FrameIndex>,
    start: Vector2d,
    velocity: Vector2d,
  ) -> Tracklet {
    let f0 = frames.start;
    let mut t = Tracklet::new(TrackletId(id), view, f0, detection_at(start[0], start[1]));
    for f in frames.skip(1) {
      let p = start + velocity * (f - f0) as f64;
      t.push(f, detection_at(p[0], p[1]));
    }
    t
  }

  #[test]
  fn test_predict() {
    let t = linear_tracklet(0, 0, 10..20, Vector2d::new(5., 5.), Vector2d::new(2., -1.));
    assert_eq!(t.start(), 10);
    assert_eq!(t.end(), 19);
    let p = t.predict(22, 5);
    assert!((p - Vector2d::new(5. + 2. * 12., 5. - 12.)).norm() < 1e-9);

    let single = Tracklet::new(TrackletId(1), 0, 3, detection_at(7., 8.));
    assert_eq!(single.predict(10, 5), Vector2d::new(7., 8.));
  }

  #[test]
  fn test_shared_frames() {
    let mut a = Tracklet::new(TrackletId(0), 0, 1, detection_at(0., 0.));
    for f in [2, 4, 5, 9] {
      a.push(f, detection_at(0., 0.));
    }
    let b = linear_tracklet(0, 1, 3..7, Vector2d::zeros(), Vector2d::zeros());
    assert_eq!(a.shared_frames(&b), vec![4, 5]);
    assert!(a.at(4).is_some());
    assert!(a.at(3).is_none());
  }
}
