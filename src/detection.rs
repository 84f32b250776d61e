use crate::all::*;

// Output of the external detector for one object in one frame of one view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
  // Pixels, center of the bounding box.
  pub position: Vector2d,
  // Pixels, width and height of the bounding box.
  pub size: Vector2d,
  pub keypoint: Option<Vector2d>,
  pub confidence: f64,
}

impl Detection {
  pub fn new(position: Vector2d, size: Vector2d, confidence: f64) -> Detection {
    Detection { position, size, keypoint: None, confidence }
  }

  // The point used for cross-view geometry.
  pub fn anchor(&self) -> Vector2d {
    self.keypoint.unwrap_or(self.position)
  }

  // Square root of the box area, a size measure in pixels.
  pub fn scale(&self) -> f64 {
    (self.size[0].max(0.) * self.size[1].max(0.)).sqrt()
  }
}

#[derive(Clone, Debug)]
pub struct FrameDetections {
  pub frame: FrameIndex,
  pub detections: Vec<Detection>,
  // The detector output for this frame was unreadable.
  pub corrupt: bool,
  // Unreadable input that could not be attributed to a frame came right
  // before this record.
  pub interrupted: bool,
}

impl FrameDetections {
  pub fn new(frame: FrameIndex, detections: Vec<Detection>) -> FrameDetections {
    FrameDetections { frame, detections, corrupt: false, interrupted: false }
  }

  pub fn corrupt(frame: FrameIndex) -> FrameDetections {
    FrameDetections { frame, detections: vec![], corrupt: true, interrupted: false }
  }
}

// All detector output of one view, in increasing frame order.
#[derive(Clone, Debug, Default)]
pub struct DetectionStream {
  pub frames: Vec<FrameDetections>,
  // Records dropped while reading because their frame index went backwards.
  pub skipped_records: usize,
  // Unreadable records without a usable frame index.
  pub corrupt_records: usize,
  // An interruption carried by a dropped record, applied to the next frame.
  pending_interruption: bool,
}

impl DetectionStream {
  pub fn new() -> DetectionStream {
    DetectionStream::default()
  }

  // Frames must be pushed in non-decreasing order. A frame equal to the last
  // one is merged into it.
  pub fn push(&mut self, mut record: FrameDetections) {
    record.interrupted |= std::mem::take(&mut self.pending_interruption);
    if let Some(last) = self.frames.last_mut() {
      if record.frame < last.frame {
        warn!("Ignoring unordered detection record for frame {} after frame {}.", record.frame, last.frame);
        self.skipped_records += 1;
        self.pending_interruption = record.interrupted;
        return;
      }
      if record.frame == last.frame {
        // Detections before the interruption are already in `last`, so the
        // merged frame is only partially trustworthy.
        last.detections.extend(record.detections);
        last.corrupt |= record.corrupt || record.interrupted;
        return;
      }
    }
    self.frames.push(record);
  }

  // Records unreadable input at the current end of the stream.
  pub fn push_unreadable(&mut self) {
    self.corrupt_records += 1;
    self.pending_interruption = true;
  }

  pub fn detection_count(&self) -> usize {
    self.frames.iter().map(|x| x.detections.len()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(frame: FrameIndex, n: usize) -> FrameDetections {
    FrameDetections::new(frame, vec![Detection::new(Vector2d::new(1., 2.), Vector2d::new(10., 5.), 0.9); n])
  }

  #[test]
  fn test_stream_order() {
    let mut stream = DetectionStream::new();
    stream.push(record(3, 1));
    stream.push(record(3, 2));
    stream.push(record(1, 1));
    stream.push(record(7, 0));
    assert_eq!(stream.frames.len(), 2);
    assert_eq!(stream.frames[0].detections.len(), 3);
    assert_eq!(stream.skipped_records, 1);
    assert_eq!(stream.detection_count(), 3);
  }

  #[test]
  fn test_unreadable_marks_next_frame() {
    let mut stream = DetectionStream::new();
    stream.push(record(0, 1));
    stream.push_unreadable();
    stream.push(record(4, 1));
    stream.push(record(5, 1));
    let flags: Vec<_> = stream.frames.iter().map(|x| (x.frame, x.corrupt, x.interrupted)).collect();
    assert_eq!(flags, vec![(0, false, false), (4, false, true), (5, false, false)]);
    assert_eq!(stream.corrupt_records, 1);

    // Merging into a frame read before the interruption makes it corrupt.
    let mut stream = DetectionStream::new();
    stream.push(record(0, 1));
    stream.push_unreadable();
    stream.push(record(0, 1));
    assert!(stream.frames[0].corrupt);

    // A dropped unordered record passes the interruption on.
    let mut stream = DetectionStream::new();
    stream.push(record(5, 1));
    stream.push_unreadable();
    stream.push(record(2, 1));
    stream.push(record(6, 1));
    assert_eq!(stream.skipped_records, 1);
    assert!(stream.frames[1].interrupted);
  }

  #[test]
  fn test_anchor() {
    let mut d = Detection::new(Vector2d::new(10., 20.), Vector2d::new(4., 9.), 1.);
    assert_eq!(d.anchor(), Vector2d::new(10., 20.));
    assert_eq!(d.scale(), 6.);
    d.keypoint = Some(Vector2d::new(12., 18.));
    assert_eq!(d.anchor(), Vector2d::new(12., 18.));
  }
}
