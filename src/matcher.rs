// Cross-view matching of 2D tracklets into triangulated 3D tracklets.

use crate::all::*;

use std::collections::BTreeSet;

// Geometry needed to score a tracklet pair.
pub trait PairGeometry: Sync {
  fn epipolar_distance(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<f64, GeometryError>;

  fn triangulate(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<Triangulation, GeometryError>;
}

impl PairGeometry for StereoRig {
  fn epipolar_distance(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<f64, GeometryError> {
    StereoRig::epipolar_distance(self, pixels)
  }

  fn triangulate(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<Triangulation, GeometryError> {
    StereoRig::triangulate(self, pixels)
  }
}

#[derive(Clone, Debug)]
pub struct PairScore {
  pub points: Vec<Tracklet3dPoint>,
  pub score: f64,
  pub low_confidence: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MatchReport {
  pub rounds: usize,
  pub evaluated_pairs: usize,
  pub rejected: RejectionCounts,
  pub feasible_pairs: usize,
  // Feasible pairs that lost in the global assignment.
  pub unassigned_pairs: usize,
  pub accepted: usize,
  pub low_confidence: usize,
  // Tracklets of each view that are part of no 3D tracklet.
  pub unmatched_tracklets: [usize; VIEW_COUNT],
}

pub fn aggregate_error(errors: &mut [f64], parameters: &MatcherParameters) -> Option<f64> {
  let aggregation = if errors.len() < parameters.small_sample_frames {
    Aggregation::Max
  }
  else {
    parameters.aggregation
  };
  match aggregation {
    Aggregation::Mean => mean(errors),
    Aggregation::Median => median(errors),
    Aggregation::Max => errors.iter().cloned().reduce(f64::max),
  }
}

// Scores the pair over the given shared frames. The epipolar test runs on all
// frames before any triangulation.
pub fn evaluate_pair<G: PairGeometry + ?Sized>(
  tracklets: [&Tracklet; VIEW_COUNT],
  frames: &[FrameIndex],
  geometry: &G,
  parameters: &MatcherParameters,
) -> Result<PairScore, CandidateError> {
  if frames.len() < parameters.min_overlap_frames {
    return Err(CandidateError::InsufficientOverlap {
      shared: frames.len(),
      required: parameters.min_overlap_frames,
    });
  }
  let pixels_at = |frame: FrameIndex| -> Result<[Vector2d; VIEW_COUNT], CandidateError> {
    match (tracklets[0].at(frame), tracklets[1].at(frame)) {
      (Some(a), Some(b)) => Ok([a.anchor(), b.anchor()]),
      // Shared frames are present in both tracklets.
      _ => unreachable!("frame {} missing from a tracklet", frame),
    }
  };

  for &frame in frames {
    let distance = geometry.epipolar_distance(pixels_at(frame)?)?;
    if distance > parameters.epipolar_tolerance {
      return Err(CandidateError::EpipolarViolation { frame, distance });
    }
  }

  let mut points = Vec::with_capacity(frames.len());
  for &frame in frames {
    let pixels = pixels_at(frame)?;
    let t = geometry.triangulate(pixels)?;
    points.push(Tracklet3dPoint {
      frame,
      position: t.point,
      pixels,
      reprojection_error: t.reprojection_error,
    });
  }

  let mut errors: Vec<f64> = points.iter().map(|p| p.reprojection_error).collect();
  let score = aggregate_error(&mut errors, parameters)
    .ok_or(CandidateError::InsufficientOverlap { shared: 0, required: parameters.min_overlap_frames })?;
  if !(score <= parameters.rejection_threshold) {
    return Err(CandidateError::ExceedsRejection {
      error: score,
      threshold: parameters.rejection_threshold,
    });
  }
  Ok(PairScore {
    points,
    score,
    low_confidence: score > parameters.low_confidence_threshold,
  })
}

fn ranges_overlap(a: &Tracklet, b: &Tracklet) -> bool {
  a.start() <= b.end() && b.start() <= a.end()
}

pub fn match_tracklets<G: PairGeometry + ?Sized>(
  tracklets: [&[Tracklet]; VIEW_COUNT],
  geometry: &G,
  parameters: &MatcherParameters,
) -> (Vec<Tracklet3d>, MatchReport) {
  let [view0, view1] = tracklets;
  let mut report = MatchReport::default();
  // Frames of each tracklet already part of an accepted 3D tracklet.
  let mut claimed: [Vec<BTreeSet<FrameIndex>>; VIEW_COUNT] = [
    vec![BTreeSet::new(); view0.len()],
    vec![BTreeSet::new(); view1.len()],
  ];
  // Tracklets whose claims changed in the previous round. Pairs of unchanged
  // tracklets would score exactly as before.
  let mut changed: [Vec<bool>; VIEW_COUNT] = [vec![true; view0.len()], vec![true; view1.len()]];
  let mut accepted: Vec<([TrackletId; VIEW_COUNT], PairScore)> = vec![];

  for round in 0..(1 + parameters.rematch_rounds) {
    let mut candidates = vec![];
    for (i, a) in view0.iter().enumerate() {
      for (j, b) in view1.iter().enumerate() {
        if !(changed[0][i] || changed[1][j]) || !ranges_overlap(a, b) { continue }
        let frames: Vec<FrameIndex> = a.shared_frames(b)
          .into_iter()
          .filter(|f| !claimed[0][i].contains(f) && !claimed[1][j].contains(f))
          .collect();
        if frames.is_empty() { continue }
        candidates.push((i, j, frames));
      }
    }
    if candidates.is_empty() { break }
    report.rounds += 1;
    report.evaluated_pairs += candidates.len();

    // All costs are computed before the solve.
    let results: Vec<Result<PairScore, CandidateError>> = candidates
      .par_iter()
      .map(|(i, j, frames)| evaluate_pair([&view0[*i], &view1[*j]], frames, geometry, parameters))
      .collect();

    let mut costs = DMatrix::from_element(view0.len(), view1.len(), f64::INFINITY);
    let mut scores: HashMap<(usize, usize), PairScore> = HashMap::new();
    for ((i, j, _), result) in candidates.iter().zip(results) {
      match result {
        Ok(score) => {
          costs[(*i, *j)] = score.score;
          scores.insert((*i, *j), score);
        },
        Err(err) => {
          debug!("Pair ({}, {}) skipped: {}", view0[*i].id.0, view1[*j].id.0, err);
          report.rejected.count(&err);
        },
      }
    }
    report.feasible_pairs += scores.len();

    let assignment = solve_assignment(&costs);
    report.unassigned_pairs += scores.len() - assignment.matches.len();
    changed = [vec![false; view0.len()], vec![false; view1.len()]];
    for (i, j) in assignment.matches {
      let score = match scores.remove(&(i, j)) {
        Some(score) => score,
        None => continue,
      };
      for p in &score.points {
        claimed[0][i].insert(p.frame);
        claimed[1][j].insert(p.frame);
      }
      changed[0][i] = true;
      changed[1][j] = true;
      accepted.push(([view0[i].id, view1[j].id], score));
    }
    debug!("Matching round {}: {} candidates, {} accepted in total.", round, candidates.len(), accepted.len());
    if !changed[0].iter().any(|x| *x) { break }
  }

  accepted.sort_by_key(|(ids, score)| (score.points[0].frame, *ids));
  let tracklets3d: Vec<Tracklet3d> = accepted.into_iter()
    .enumerate()
    .map(|(k, (ids, score))| Tracklet3d {
      id: Tracklet3dId(k),
      tracklets: ids,
      points: score.points,
      score: score.score,
      low_confidence: score.low_confidence,
    })
    .collect();

  report.accepted = tracklets3d.len();
  report.low_confidence = tracklets3d.iter().filter(|t| t.low_confidence).count();
  for view in 0..VIEW_COUNT {
    report.unmatched_tracklets[view] = claimed[view].iter().filter(|c| c.is_empty()).count();
  }
  info!("Matched {} 3D tracklets ({} low confidence) from {} + {} tracklets, {} pairs skipped.",
    report.accepted, report.low_confidence, view0.len(), view1.len(), report.rejected.total());
  (tracklets3d, report)
}
