// Stitches 3D tracklets across occlusion gaps into final tracks.

use crate::all::*;

#[derive(Clone, Debug, Default, Serialize)]
pub struct FinalizeReport {
  pub input_tracklets: usize,
  pub evaluated_links: usize,
  pub rejected: RejectionCounts,
  pub feasible_links: usize,
  pub accepted_links: usize,
  // Unlinked tracklets shorter than the minimum track duration.
  pub discarded_noise: usize,
  pub tracks: usize,
  pub interpolated_points: usize,
}

// Frames between the end of `earlier` and the start of `later` when they are
// close enough in time to be linked.
pub fn link_gap(earlier: &Tracklet3d, later: &Tracklet3d, parameters: &FinalizerParameters) -> Option<usize> {
  if later.start() <= earlier.end() { return None }
  let gap = later.start() - earlier.end();
  if gap > parameters.max_gap { None } else { Some(gap) }
}

// Largest accepted distance between the extrapolated tail and the next head
// after `gap` frames. Non-decreasing in `gap`.
pub fn stitch_tolerance(gap: usize, parameters: &FinalizerParameters) -> f64 {
  let g = gap as f64;
  let growth = match parameters.tolerance_law {
    ToleranceLaw::Constant => 0.,
    ToleranceLaw::Linear => g,
    ToleranceLaw::Sqrt => g.sqrt(),
  };
  (parameters.tolerance_base + parameters.tolerance_growth * growth).min(parameters.tolerance_cap)
}

// Mean velocity over a run of points, zero for fewer than two.
fn velocity(points: &[Tracklet3dPoint]) -> Vector3d {
  if points.len() < 2 { return Vector3d::zeros() }
  let first = &points[0];
  let last = &points[points.len() - 1];
  (last.position - first.position) / (last.frame - first.frame) as f64
}

fn tail(points: &[Tracklet3dPoint], window: usize) -> &[Tracklet3dPoint] {
  &points[points.len().saturating_sub(window)..]
}

fn head(points: &[Tracklet3dPoint], window: usize) -> &[Tracklet3dPoint] {
  &points[..window.min(points.len())]
}

// Position of the tracklet `gap` frames after its last point.
pub fn extrapolate(
  tracklet: &Tracklet3d,
  gap: usize,
  parameters: &FinalizerParameters,
) -> Result<Vector3d, CandidateError> {
  let points = tail(&tracklet.points, parameters.tail_frames);
  if points.len() < 2 {
    return Err(CandidateError::InsufficientGapData { available: points.len(), required: 2 });
  }
  let last = &points[points.len() - 1];
  let g = gap as f64;
  if parameters.extrapolation == Extrapolation::ConstantAcceleration && points.len() >= 3 {
    // Velocities of the two halves of the tail, taken at their mid frames.
    let first = &points[0];
    let middle = &points[points.len() / 2];
    let v0 = (middle.position - first.position) / (middle.frame - first.frame) as f64;
    let v1 = (last.position - middle.position) / (last.frame - middle.frame) as f64;
    let acceleration = (v1 - v0) / ((last.frame - first.frame) as f64 / 2.);
    let v = v1 + acceleration * ((last.frame - middle.frame) as f64 / 2.);
    return Ok(last.position + v * g + acceleration * (0.5 * g * g));
  }
  Ok(last.position + velocity(points) * g)
}

// Cost of continuing `earlier` with `later`: distance between the extrapolated
// tail and the head of `later`.
pub fn link_cost(
  earlier: &Tracklet3d,
  later: &Tracklet3d,
  gap: usize,
  parameters: &FinalizerParameters,
) -> Result<f64, CandidateError> {
  let predicted = extrapolate(earlier, gap, parameters)?;
  let distance = (later.head().position - predicted).norm();
  let tolerance = stitch_tolerance(gap, parameters);
  if distance > tolerance {
    return Err(CandidateError::MotionDiscontinuity { distance, tolerance });
  }
  Ok(distance)
}

fn interpolate(
  a: &Tracklet3dPoint,
  va: Vector3d,
  b: &Tracklet3dPoint,
  vb: Vector3d,
  frame: FrameIndex,
  method: Interpolation,
) -> Vector3d {
  let h = (b.frame - a.frame) as f64;
  let s = (frame - a.frame) as f64 / h;
  match method {
    Interpolation::Linear => a.position + (b.position - a.position) * s,
    Interpolation::Hermite => {
      let s2 = s * s;
      let s3 = s2 * s;
      a.position * (2. * s3 - 3. * s2 + 1.)
        + va * (h * (s3 - 2. * s2 + s))
        + b.position * (3. * s2 - 2. * s3)
        + vb * (h * (s3 - s2))
    },
  }
}

// Concatenates a chain of tracklets and fills every missing frame.
fn build_track(id: TrackId, chain: Vec<Tracklet3d>, parameters: &FinalizerParameters) -> Track {
  let mut observed = vec![];
  let mut low_confidence = vec![];
  for t in &chain {
    observed.extend_from_slice(&t.points);
    low_confidence.extend(std::iter::repeat(t.low_confidence).take(t.points.len()));
  }

  let window = parameters.tail_frames.max(2);
  let mut points = vec![TrackPoint::observed(&observed[0], low_confidence[0])];
  for k in 1..observed.len() {
    let a = &observed[k - 1];
    let b = &observed[k];
    if b.frame > a.frame + 1 {
      let va = velocity(tail(&observed[..k], window));
      let vb = velocity(head(&observed[k..], window));
      for frame in (a.frame + 1)..b.frame {
        let position = interpolate(a, va, b, vb, frame, parameters.interpolation);
        points.push(TrackPoint::interpolated(frame, position));
      }
    }
    points.push(TrackPoint::observed(b, low_confidence[k]));
  }
  Track { id, tracklets: chain, points }
}

pub fn finalize_tracks(
  tracklets: Vec<Tracklet3d>,
  parameters: &FinalizerParameters,
) -> (Vec<Track>, FinalizeReport) {
  let n = tracklets.len();
  let mut report = FinalizeReport { input_tracklets: n, ..FinalizeReport::default() };

  let mut candidates = vec![];
  for (i, earlier) in tracklets.iter().enumerate() {
    for (j, later) in tracklets.iter().enumerate() {
      if let Some(gap) = link_gap(earlier, later, parameters) {
        candidates.push((i, j, gap));
      }
    }
  }
  report.evaluated_links = candidates.len();

  let evaluations: Vec<_> = candidates
    .par_iter()
    .map(|&(i, j, gap)| (i, j, link_cost(&tracklets[i], &tracklets[j], gap, parameters)))
    .collect();

  let mut costs = DMatrix::from_element(n, n, f64::INFINITY);
  for (i, j, result) in evaluations {
    match result {
      Ok(cost) => {
        costs[(i, j)] = cost;
        report.feasible_links += 1;
      },
      Err(err) => {
        debug!("Link {} -> {} skipped: {}", tracklets[i].id.0, tracklets[j].id.0, err);
        report.rejected.count(&err);
      },
    }
  }

  let assignment = solve_assignment(&costs);
  let mut next = vec![None; n];
  let mut has_previous = vec![false; n];
  for &(i, j) in &assignment.matches {
    debug!("Linked tracklet {} -> {} at cost {:.3}.", tracklets[i].id.0, tracklets[j].id.0, costs[(i, j)]);
    next[i] = Some(j);
    has_previous[j] = true;
  }
  report.accepted_links = assignment.matches.len();

  // Links always point forward in time, so every chain ends.
  let mut chains: Vec<Vec<usize>> = vec![];
  for i in 0..n {
    if has_previous[i] { continue }
    let mut chain = vec![i];
    let mut k = i;
    while let Some(j) = next[k] {
      chain.push(j);
      k = j;
    }
    if chain.len() == 1 && tracklets[i].duration() < parameters.min_track_duration {
      debug!("Discarding tracklet {} of {} frames as noise.", tracklets[i].id.0, tracklets[i].duration());
      report.discarded_noise += 1;
      continue;
    }
    chains.push(chain);
  }
  chains.sort_by_key(|c| (tracklets[c[0]].start(), tracklets[c[0]].id));

  let mut slots: Vec<Option<Tracklet3d>> = tracklets.into_iter().map(Some).collect();
  let mut tracks = vec![];
  for (index, chain) in chains.into_iter().enumerate() {
    let members: Vec<Tracklet3d> = chain.iter().filter_map(|&i| slots[i].take()).collect();
    let track = build_track(TrackId(index), members, parameters);
    report.interpolated_points += track.interpolated_count();
    tracks.push(track);
  }
  report.tracks = tracks.len();

  info!("{} tracks from {} 3D tracklets, {} links, {} discarded as noise.",
    report.tracks, report.input_tracklets, report.accepted_links, report.discarded_noise);
  (tracks, report)
}

#[cfg(test)]
pub mod tests {
  use super::*;

  pub fn tracklet3d(
    id: usize,
    frames: impl IntoIterator<Item = FrameIndex>,
    position: impl Fn(FrameIndex) -> Vector3d,
  ) -> Tracklet3d {
    let points = frames.into_iter()
      .map(|frame| Tracklet3dPoint {
        frame,
        position: position(frame),
        pixels: [Vector2d::zeros(), Vector2d::zeros()],
        reprojection_error: 0.1,
      })
      .collect();
    Tracklet3d {
      id: Tracklet3dId(id),
      tracklets: [TrackletId(id), TrackletId(id)],
      points,
      score: 0.1,
      low_confidence: false,
    }
  }

  // Every track covers its frames exactly once and no tracklet is used twice.
  pub fn assert_frame_ownership(tracks: &[Track]) {
    let mut used = std::collections::HashSet::new();
    for track in tracks {
      for (k, p) in track.points.iter().enumerate() {
        assert_eq!(p.frame, track.start() + k);
      }
      for t in &track.tracklets {
        assert!(used.insert(t.id), "tracklet {} in two tracks", t.id.0);
      }
    }
  }

  #[test]
  fn test_tolerance_law() {
    let mut p = FinalizerParameters::default();
    for law in [ToleranceLaw::Constant, ToleranceLaw::Linear, ToleranceLaw::Sqrt] {
      p.tolerance_law = law;
      let mut previous = stitch_tolerance(0, &p);
      for g in 1..100 {
        let t = stitch_tolerance(g, &p);
        assert!(t >= previous);
        assert!(t <= p.tolerance_cap);
        previous = t;
      }
    }
    p.tolerance_law = ToleranceLaw::Linear;
    assert_eq!(stitch_tolerance(5, &p), 20.);
    assert_eq!(stitch_tolerance(30, &p), 50.);
    p.tolerance_law = ToleranceLaw::Sqrt;
    assert_eq!(stitch_tolerance(4, &p), 14.);
    p.tolerance_law = ToleranceLaw::Constant;
    assert_eq!(stitch_tolerance(12, &p), 10.);
  }

  #[test]
  fn test_accepts_within_tolerance() {
    let p = FinalizerParameters::default();
    let v = Vector3d::new(1., 0., 0.);
    let earlier = tracklet3d(0, 0..20, |f| v * f as f64);
    for gap in [1, 3, 8, 15] {
      let tolerance = stitch_tolerance(gap, &p);
      for delta in [-0.5, 0.5] {
        let start = 19 + gap;
        let offset = Vector3d::new(0., tolerance + delta, 0.);
        let later = tracklet3d(1, start..start + 10, |f| v * f as f64 + offset);
        assert_eq!(link_gap(&earlier, &later, &p), Some(gap));
        let result = link_cost(&earlier, &later, gap, &p);
        if delta < 0. {
          assert!((result.unwrap() - (tolerance + delta)).abs() < 1e-9);
        }
        else {
          assert!(matches!(result, Err(CandidateError::MotionDiscontinuity { .. })));
        }
      }
    }
    let late = tracklet3d(2, 35..40, |f| v * f as f64);
    assert_eq!(link_gap(&earlier, &late, &p), None);
    assert_eq!(link_gap(&late, &earlier, &p), None);
  }

  #[test]
  fn test_gap_interpolated() {
    let p = FinalizerParameters::default();
    let walk = |f: FrameIndex| Vector3d::new(2. * f as f64, f as f64, 50.);
    let earlier = tracklet3d(0, 80..101, walk);
    let later = tracklet3d(1, 108..130, |f| walk(f) + Vector3d::new(1., 0., 0.));
    let (tracks, report) = finalize_tracks(vec![earlier, later], &p);
    assert_eq!(tracks.len(), 1);
    assert_eq!(report.accepted_links, 1);
    let track = &tracks[0];
    assert_eq!((track.start(), track.end()), (80, 129));
    assert_frame_ownership(&tracks);
    for point in &track.points {
      assert_eq!(point.interpolated, (101..=107).contains(&point.frame), "frame {}", point.frame);
    }
    assert_eq!(track.interpolated_count(), 7);
    assert_eq!(report.interpolated_points, 7);
    let a = walk(100);
    let b = walk(108) + Vector3d::new(1., 0., 0.);
    let p104 = track.at(104).unwrap();
    assert!((p104.position - (a + b) / 2.).norm() < 1e-9);
    assert!(p104.pixels[0].is_none());
    assert!(track.at(100).unwrap().pixels[0].is_some());
  }

  #[test]
  fn test_competing_links() {
    let p = FinalizerParameters::default();
    let at = |x: f64| move |_: FrameIndex| Vector3d::new(x, 0., 0.);
    // Greedy in tracklet order links 0 -> 2 and 1 -> 3 for a total of 11.
    let tracklets = vec![
      tracklet3d(0, 0..20, at(0.)),
      tracklet3d(1, 0..20, at(4.)),
      tracklet3d(2, 25..40, at(3.)),
      tracklet3d(3, 25..40, at(-4.)),
    ];
    let (tracks, report) = finalize_tracks(tracklets, &p);
    assert_eq!(report.feasible_links, 4);
    assert_eq!(tracks.len(), 2);
    let ids = |t: &Track| t.tracklets.iter().map(|x| x.id.0).collect::<Vec<_>>();
    assert_eq!(tracks[0].id, TrackId(0));
    assert_eq!(ids(&tracks[0]), vec![0, 3]);
    assert_eq!(ids(&tracks[1]), vec![1, 2]);
    assert_frame_ownership(&tracks);
  }

  #[test]
  fn test_noise_discarded() {
    let p = FinalizerParameters::default();
    let still = |_: FrameIndex| Vector3d::new(10., 10., 10.);
    let far = |_: FrameIndex| Vector3d::new(500., 10., 10.);
    let tracklets = vec![
      // Short but linked to a long tracklet, kept.
      tracklet3d(0, 0..3, still),
      tracklet3d(1, 5..30, still),
      // Short and alone.
      tracklet3d(2, 40..45, far),
      tracklet3d(3, 60..80, far),
    ];
    let (tracks, report) = finalize_tracks(tracklets, &p);
    assert_eq!(report.discarded_noise, 1);
    assert_eq!(tracks.len(), 2);
    assert_eq!((tracks[0].start(), tracks[0].end()), (0, 29));
    assert_eq!((tracks[1].start(), tracks[1].end()), (60, 79));
  }

  #[test]
  fn test_insufficient_gap_data() {
    let p = FinalizerParameters::default();
    let still = |_: FrameIndex| Vector3d::new(1., 2., 3.);
    let single = tracklet3d(0, 10..11, still);
    let later = tracklet3d(1, 12..30, still);
    assert_eq!(
      link_cost(&single, &later, 2, &p),
      Err(CandidateError::InsufficientGapData { available: 1, required: 2 }),
    );
    let (tracks, report) = finalize_tracks(vec![single, later], &p);
    assert_eq!(report.rejected.insufficient_gap_data, 1);
    assert_eq!(report.discarded_noise, 1);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].start(), 12);
  }

  #[test]
  fn test_hermite_fills_internal_hole() {
    let mut p = FinalizerParameters::default();
    p.interpolation = Interpolation::Hermite;
    let walk = |f: FrameIndex| Vector3d::new(f as f64, -0.5 * f as f64, 20.);
    let t = tracklet3d(0, (0..10).chain(15..25), walk);
    let (tracks, _) = finalize_tracks(vec![t], &p);
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].interpolated_count(), 5);
    assert_frame_ownership(&tracks);
    for point in &tracks[0].points {
      assert!((point.position - walk(point.frame)).norm() < 1e-9);
    }
  }

  #[test]
  fn test_constant_acceleration() {
    let mut p = FinalizerParameters::default();
    let fall = |f: FrameIndex| Vector3d::new(0.5 * (f * f) as f64, 0., 0.);
    let earlier = tracklet3d(0, 0..10, fall);
    let later = tracklet3d(1, 14..20, fall);
    assert!(matches!(link_cost(&earlier, &later, 5, &p), Err(CandidateError::MotionDiscontinuity { .. })));
    p.extrapolation = Extrapolation::ConstantAcceleration;
    assert!(link_cost(&earlier, &later, 5, &p).unwrap() < 1e-9);
  }
}
