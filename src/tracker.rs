// Builds 2D tracklets of one view from its detection stream.

use crate::all::*;

struct ActiveTracklet {
  tracklet: Tracklet,
  // Consecutive frames without an assigned detection.
  missed: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct BuildReport {
  pub view: usize,
  pub frames: usize,
  pub corrupt_frames: usize,
  pub skipped_records: usize,
  // Unreadable records between frames.
  pub corrupt_records: usize,
  pub detections: usize,
  pub dropped_low_confidence: usize,
  pub tracklets: usize,
  // Tracklets closed early because of corrupt input.
  pub truncated_tracklets: usize,
}

pub struct Tracker {
  view: usize,
  parameters: BuilderParameters,
  active: Vec<ActiveTracklet>,
  closed: Vec<Tracklet>,
  next_id: usize,
  last_frame: Option<FrameIndex>,
  report: BuildReport,
}

impl Tracker {
  pub fn new(view: usize, parameters: &BuilderParameters) -> Tracker {
    Tracker {
      view,
      parameters: parameters.clone(),
      active: vec![],
      closed: vec![],
      next_id: 0,
      last_frame: None,
      report: BuildReport { view, ..BuildReport::default() },
    }
  }

  pub fn process(&mut self, input: &FrameDetections) {
    if let Some(last_frame) = self.last_frame {
      if input.frame <= last_frame {
        warn!("View {}: ignoring frame {} at or before frame {}.", self.view, input.frame, last_frame);
        return;
      }
      // Frames missing from the stream had no detections.
      let skipped = input.frame - last_frame - 1;
      if skipped > 0 {
        for a in &mut self.active {
          a.missed += skipped;
        }
        self.close_lost();
      }
    }
    self.last_frame = Some(input.frame);
    self.report.frames += 1;

    if input.interrupted && !self.active.is_empty() {
      warn!("View {}: unreadable input before frame {}, truncating {} tracklets.",
        self.view, input.frame, self.active.len());
      self.report.truncated_tracklets += self.active.len();
      self.close_all();
    }

    if input.corrupt {
      self.report.corrupt_frames += 1;
      if !self.active.is_empty() {
        warn!("View {}: corrupt input at frame {}, truncating {} tracklets.",
          self.view, input.frame, self.active.len());
        self.report.truncated_tracklets += self.active.len();
        self.close_all();
      }
      return;
    }

    let min_confidence = self.parameters.min_detection_confidence;
    let detections: Vec<&Detection> = input.detections.iter()
      .filter(|d| d.confidence >= min_confidence)
      .collect();
    self.report.detections += input.detections.len();
    self.report.dropped_low_confidence += input.detections.len() - detections.len();

    let costs = DMatrix::from_fn(self.active.len(), detections.len(), |i, j| {
      association_cost(&self.active[i].tracklet, detections[j], input.frame, &self.parameters)
    });
    let assignment = solve_assignment(&costs);

    for &(i, j) in &assignment.matches {
      let a = &mut self.active[i];
      a.tracklet.push(input.frame, *detections[j]);
      a.missed = 0;
    }
    for &i in &assignment.unmatched_rows {
      self.active[i].missed += 1;
    }
    self.close_lost();

    for &j in &assignment.unmatched_columns {
      let id = TrackletId(self.next_id);
      self.next_id += 1;
      self.active.push(ActiveTracklet {
        tracklet: Tracklet::new(id, self.view, input.frame, *detections[j]),
        missed: 0,
      });
    }
  }

  fn close_lost(&mut self) {
    let max_missed = self.parameters.max_missed_frames;
    let (lost, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
      .into_iter()
      .partition(|a| a.missed > max_missed);
    self.active = active;
    for a in lost {
      self.close(a.tracklet);
    }
  }

  fn close_all(&mut self) {
    for a in std::mem::take(&mut self.active) {
      self.close(a.tracklet);
    }
  }

  fn close(&mut self, tracklet: Tracklet) {
    debug!("View {}: closed tracklet {} over frames {}..={}.",
      self.view, tracklet.id.0, tracklet.start(), tracklet.end());
    self.closed.push(tracklet);
  }

  // Closes the remaining tracklets. The result is indexed by `TrackletId`.
  pub fn finish(mut self) -> (Vec<Tracklet>, BuildReport) {
    self.close_all();
    let mut tracklets = self.closed;
    tracklets.sort_by_key(|t| t.id);
    self.report.tracklets = tracklets.len();
    (tracklets, self.report)
  }
}

// Distance to the predicted position plus size and confidence penalties,
// infinite beyond the gating distance.
pub fn association_cost(
  tracklet: &Tracklet,
  detection: &Detection,
  frame: FrameIndex,
  parameters: &BuilderParameters,
) -> f64 {
  let predicted = tracklet.predict(frame, parameters.velocity_window);
  let distance = (detection.position - predicted).norm();
  let size_change = (detection.scale() - tracklet.last().detection.scale()).abs();
  let confidence = detection.confidence.clamp(0., 1.);
  let cost = distance
    + parameters.size_weight * size_change
    + parameters.confidence_weight * (1. - confidence);
  if cost > parameters.gating_distance { f64::INFINITY } else { cost }
}

pub fn build_tracklets(
  view: usize,
  stream: &DetectionStream,
  parameters: &BuilderParameters,
) -> (Vec<Tracklet>, BuildReport) {
  let mut tracker = Tracker::new(view, parameters);
  for frame in &stream.frames {
    tracker.process(frame);
  }
  let (tracklets, mut report) = tracker.finish();
  report.skipped_records = stream.skipped_records;
  report.corrupt_records = stream.corrupt_records;
  info!("View {}: {} tracklets from {} detections in {} frames.",
    view, tracklets.len(), report.detections, report.frames);
  (tracklets, report)
}
