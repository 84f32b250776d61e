// Reader for detector output: one JSON object per line and frame,
//   {"frame": 12, "detections": [{"x": .., "y": .., "width": .., "height": ..,
//     "confidence": .., "keypoint": [x, y]}]}
// A record may carry `"corrupt": true` to mark a frame the detector failed on.

use crate::all::*;

use std::io::Read;

#[derive(Deserialize)]
struct DetectionRecord {
  x: f64,
  y: f64,
  width: f64,
  height: f64,
  confidence: f64,
  #[serde(default)]
  keypoint: Option<[f64; 2]>,
}

impl DetectionRecord {
  fn into_detection(self) -> Result<Detection> {
    let values = [self.x, self.y, self.width, self.height, self.confidence];
    if values.iter().any(|x| !x.is_finite()) {
      bail!("Non-finite detection value.");
    }
    Ok(Detection {
      position: Vector2d::new(self.x, self.y),
      size: Vector2d::new(self.width, self.height),
      keypoint: self.keypoint.map(|p| Vector2d::new(p[0], p[1])),
      confidence: self.confidence,
    })
  }
}

pub struct Input<R> {
  reader: BufReader<R>,
  line: String,
  line_number: usize,
  // Lines skipped because no frame could be read from them.
  unreadable_lines: usize,
}

impl Input<File> {
  pub fn open(path: &Path) -> Result<Input<File>> {
    let file = File::open(path)
      .context(format!("Failed to open detections {}.", path.display()))?;
    Ok(Input::new(file))
  }
}

impl<R: Read> Input<R> {
  pub fn new(read: R) -> Input<R> {
    Input {
      reader: BufReader::new(read),
      line: String::new(),
      line_number: 0,
      unreadable_lines: 0,
    }
  }

  // Not using `impl Iterator` to allow returning `Result`.
  // End of data is signaled by `Result::Ok(Option::None)`.
  pub fn next(&mut self) -> Result<Option<FrameDetections>> {
    loop {
      self.line.clear();
      match self.reader.read_line(&mut self.line) {
        Ok(0) => return Ok(None),
        Err(err) => bail!("Failed to read line {}. {}", self.line_number + 1, err),
        _ => {},
      }
      self.line_number += 1;
      if self.line.trim().is_empty() { continue }

      let value: serde_json::Value = match serde_json::from_str(&self.line) {
        Ok(value) => value,
        Err(err) => {
          // Without a frame index the record cannot be attributed.
          warn!("Skipping unreadable line {}: {}", self.line_number, err);
          self.unreadable_lines += 1;
          continue;
        },
      };
      let frame = match value.get("frame").and_then(|x| x.as_u64()) {
        Some(frame) => frame as FrameIndex,
        None => {
          warn!("Skipping line {} without a frame index.", self.line_number);
          self.unreadable_lines += 1;
          continue;
        },
      };
      if value.get("corrupt").and_then(|x| x.as_bool()).unwrap_or(false) {
        return Ok(Some(FrameDetections::corrupt(frame)));
      }
      let detections = value.get("detections")
        .cloned()
        .unwrap_or(serde_json::Value::Array(vec![]));
      match parse_detections(detections) {
        Ok(detections) => return Ok(Some(FrameDetections::new(frame, detections))),
        Err(err) => {
          warn!("Frame {} on line {} is corrupt: {}", frame, self.line_number, err);
          return Ok(Some(FrameDetections::corrupt(frame)));
        },
      }
    }
  }

  pub fn unreadable_lines(&self) -> usize {
    self.unreadable_lines
  }

  // Unreadable lines interrupt the stream: the tracklets active before them
  // are not continued past them.
  pub fn read_stream(&mut self) -> Result<DetectionStream> {
    let mut stream = DetectionStream::new();
    loop {
      let before = self.unreadable_lines;
      let record = self.next()?;
      for _ in before..self.unreadable_lines {
        stream.push_unreadable();
      }
      match record {
        Some(record) => stream.push(record),
        None => break,
      }
    }
    Ok(stream)
  }
}

fn parse_detections(value: serde_json::Value) -> Result<Vec<Detection>> {
  let records: Vec<DetectionRecord> = serde_json::from_value(value)?;
  records.into_iter().map(|x| x.into_detection()).collect()
}

// Default location of the detections of `view` inside an input folder.
pub fn detections_path(folder: &Path, view: usize) -> PathBuf {
  folder.join(format!("view{}.jsonl", view))
}

pub fn read_detections(path: &Path) -> Result<DetectionStream> {
  let stream = Input::open(path)?.read_stream()
    .context(format!("Failed to read detections {}.", path.display()))?;
  info!("Read {} detections in {} frames from {}.",
    stream.detection_count(), stream.frames.len(), path.display());
  if stream.corrupt_records > 0 {
    warn!("{} unreadable records in {}.", stream.corrupt_records, path.display());
  }
  Ok(stream)
}
