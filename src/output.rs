use crate::all::*;

use std::io::Write;

pub const TRACKS_FILE_NAME: &str = "tracks.csv";
pub const REPORT_FILE_NAME: &str = "report.json";

// One row of the track table. Unobserved values are written as empty cells.
#[derive(Debug, Serialize)]
struct TrackRecord {
  frame: FrameIndex,
  track_id: usize,
  x: f64,
  y: f64,
  z: f64,
  cam1_x: Option<f64>,
  cam1_y: Option<f64>,
  cam2_x: Option<f64>,
  cam2_y: Option<f64>,
  reprojection_error: Option<f64>,
  interpolated: bool,
  low_confidence: bool,
}

impl TrackRecord {
  fn new(track: &Track, point: &TrackPoint) -> TrackRecord {
    TrackRecord {
      frame: point.frame,
      track_id: track.id.0,
      x: point.position[0],
      y: point.position[1],
      z: point.position[2],
      cam1_x: point.pixels[0].map(|p| p[0]),
      cam1_y: point.pixels[0].map(|p| p[1]),
      cam2_x: point.pixels[1].map(|p| p[0]),
      cam2_y: point.pixels[1].map(|p| p[1]),
      reprojection_error: point.reprojection_error,
      interpolated: point.interpolated,
      low_confidence: point.low_confidence,
    }
  }
}

// Writes one row per (frame, track), ordered by frame and then track id.
pub fn write_tracks<W: Write>(writer: W, tracks: &[Track]) -> Result<()> {
  let mut rows: Vec<(&Track, &TrackPoint)> = tracks.iter()
    .flat_map(|t| t.points.iter().map(move |p| (t, p)))
    .collect();
  rows.sort_by_key(|(t, p)| (p.frame, t.id));

  let mut writer = csv::Writer::from_writer(writer);
  for (track, point) in rows {
    writer.serialize(TrackRecord::new(track, point))?;
  }
  writer.flush()?;
  Ok(())
}

pub fn write_report<W: Write, T: Serialize>(writer: W, report: &T) -> Result<()> {
  serde_json::to_writer_pretty(writer, report)?;
  Ok(())
}

// Writes the track table and the run report into `folder`, creating it.
pub fn write_output<T: Serialize>(folder: &Path, tracks: &[Track], report: &T) -> Result<()> {
  std::fs::create_dir_all(folder)
    .with_context(|| format!("Failed to create output folder {}", folder.display()))?;
  let path = folder.join(TRACKS_FILE_NAME);
  let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
  write_tracks(file, tracks).with_context(|| format!("Failed to write {}", path.display()))?;
  let path = folder.join(REPORT_FILE_NAME);
  let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
  write_report(file, report).with_context(|| format!("Failed to write {}", path.display()))?;
  info!("Wrote {} tracks to {}.", tracks.len(), folder.display());
  Ok(())
}
