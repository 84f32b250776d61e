// Runs the tracking stages in order: per-view 2D tracklets, cross-view
// matching, then stitching into final tracks.

use crate::all::*;

#[derive(Clone, Debug, Serialize)]
pub struct TrackSummary {
  pub id: TrackId,
  pub start: FrameIndex,
  pub end: FrameIndex,
  pub tracklets: Vec<Tracklet3dId>,
  pub interpolated_points: usize,
  pub low_confidence_points: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
  pub parameters: ParameterSet,
  pub builders: Vec<BuildReport>,
  pub matcher: MatchReport,
  pub finalizer: FinalizeReport,
  pub tracks: Vec<TrackSummary>,
}

pub struct PipelineOutput {
  pub tracklets: [Vec<Tracklet>; VIEW_COUNT],
  pub tracks: Vec<Track>,
  pub report: RunReport,
}

pub fn run_pipeline(
  rig: &StereoRig,
  streams: &[DetectionStream; VIEW_COUNT],
  parameters: &ParameterSet,
) -> PipelineOutput {
  let ((tracklets0, report0), (tracklets1, report1)) = rayon::join(
    || build_tracklets(0, &streams[0], &parameters.builder),
    || build_tracklets(1, &streams[1], &parameters.builder),
  );

  let (tracklets3d, match_report) = match_tracklets([&tracklets0, &tracklets1], rig, &parameters.matcher);
  let (tracks, finalize_report) = finalize_tracks(tracklets3d, &parameters.finalizer);

  let summaries = tracks.iter()
    .map(|t| TrackSummary {
      id: t.id,
      start: t.start(),
      end: t.end(),
      tracklets: t.tracklets.iter().map(|x| x.id).collect(),
      interpolated_points: t.interpolated_count(),
      low_confidence_points: t.points.iter().filter(|p| p.low_confidence).count(),
    })
    .collect();
  let report = RunReport {
    parameters: parameters.clone(),
    builders: vec![report0, report1],
    matcher: match_report,
    finalizer: finalize_report,
    tracks: summaries,
  };
  PipelineOutput {
    tracklets: [tracklets0, tracklets1],
    tracks,
    report,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::finalizer::tests::assert_frame_ownership;

  // Mean distance between a track and the closest animal path over the
  // track's observed points, with the index of that animal.
  fn closest_animal(track: &Track, truth: &[Vec<Vector3d>]) -> (usize, f64) {
    let observed: Vec<&TrackPoint> = track.points.iter().filter(|p| !p.interpolated).collect();
    (0..truth.len())
      .map(|animal| {
        let sum: f64 = observed.iter().map(|p| (p.position - truth[animal][p.frame]).norm()).sum();
        (animal, sum / observed.len() as f64)
      })
      .min_by(|a, b| a.1.total_cmp(&b.1))
      .unwrap()
  }

  #[test]
  fn test_synthetic_scene() {
    init_logging(LevelFilter::Warn);
    let scene = generate_scene(&SceneOptions::default()).unwrap();
    let output = run_pipeline(&scene.rig, &scene.streams, &ParameterSet::default());
    assert_eq!(output.tracks.len(), 3);
    assert_frame_ownership(&output.tracks);
    let mut animals = vec![];
    for track in &output.tracks {
      let (animal, error) = closest_animal(track, &scene.truth);
      assert!(error < 2., "track {} is {} mm from animal {}", track.id.0, error, animal);
      assert!(track.end() - track.start() > 150);
      animals.push(animal);
    }
    animals.sort();
    assert_eq!(animals, vec![0, 1, 2]);
    assert_eq!(output.report.tracks.len(), 3);
    assert_eq!(output.report.builders.len(), 2);
  }

  #[test]
  fn test_stitches_across_occlusion() {
    let options = SceneOptions { occlusion: Some(100..108), ..SceneOptions::default() };
    let scene = generate_scene(&options).unwrap();
    let output = run_pipeline(&scene.rig, &scene.streams, &ParameterSet::default());
    assert_eq!(output.tracks.len(), 3);
    assert_frame_ownership(&output.tracks);

    let occluded = output.tracks.iter()
      .find(|t| closest_animal(t, &scene.truth).0 == 0)
      .unwrap();
    assert!(occluded.tracklets.len() >= 2);
    assert!(occluded.start() < 100 && occluded.end() > 108);
    for frame in 100..108 {
      let point = occluded.at(frame).unwrap();
      assert!(point.interpolated);
      assert!((point.position - scene.truth[0][frame]).norm() < 5.);
    }
    assert!(output.report.finalizer.accepted_links >= 1);
  }

  #[test]
  fn test_report_serializes() {
    let options = SceneOptions { frames: 30, ..SceneOptions::default() };
    let scene = generate_scene(&options).unwrap();
    let output = run_pipeline(&scene.rig, &scene.streams, &ParameterSet::default());
    let value = serde_json::to_value(&output.report).unwrap();
    assert_eq!(value["parameters"]["matcher"]["aggregation"], "median");
    assert_eq!(value["builders"][1]["view"], 1);
  }
}
