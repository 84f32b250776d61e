// Seeded synthetic scenes: animals swimming in circles in a tank seen by a
// top and a side camera, with detection noise, dropouts and occlusions.

use crate::all::*;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

// Top camera above the tank looking down, side camera behind the front wall.
// World units are millimeters.
const RIG_SETUP: &str = r#"{
  "cameras": [
    {
      "model": "pinhole",
      "focalLengthX": 1000, "focalLengthY": 1000,
      "principalPointX": 640, "principalPointY": 480,
      "worldToCamera": [
        [1, 0, 0, -150],
        [0, -1, 0, 150],
        [0, 0, -1, 800],
        [0, 0, 0, 1]
      ]
    },
    {
      "model": "pinhole",
      "focalLengthX": 1000, "focalLengthY": 1000,
      "principalPointX": 640, "principalPointY": 480,
      "worldToCamera": [
        [1, 0, 0, -150],
        [0, 0, -1, 100],
        [0, 1, 0, 700],
        [0, 0, 0, 1]
      ]
    }
  ]
}"#;

const PATH_CENTERS: [[f64; 3]; 3] = [
  [70., 70., 60.],
  [230., 80., 100.],
  [150., 230., 150.],
];
const PATH_RADIUS: f64 = 20.;
const PATH_PERIOD: f64 = 120.;
const BOX_SIZE: [f64; 2] = [30., 15.];

#[derive(Clone, Debug, clap::Args)]
pub struct SceneOptions {
  // At most three animals, one per swimming path.
  #[clap(long, default_value = "3")]
  pub animals: usize,
  #[clap(long, default_value = "200")]
  pub frames: usize,
  // Pixels, half-width of the uniform detection noise.
  #[clap(long, default_value = "0.5")]
  pub noise: f64,
  // Probability that a single detection is missing.
  #[clap(long, default_value = "0.02")]
  pub dropout: f64,
  // Frames in which the first animal is hidden from both cameras.
  #[clap(skip)]
  pub occlusion: Option<std::ops::Range<FrameIndex>>,
  #[clap(long, default_value = "0")]
  pub seed: u64,
}

impl Default for SceneOptions {
  fn default() -> SceneOptions {
    SceneOptions {
      animals: 3,
      frames: 200,
      noise: 0.5,
      dropout: 0.02,
      occlusion: None,
      seed: 0,
    }
  }
}

pub struct Scene {
  pub rig: StereoRig,
  // World position of each animal in each frame.
  pub truth: Vec<Vec<Vector3d>>,
  pub streams: [DetectionStream; VIEW_COUNT],
}

pub fn synthetic_rig() -> Result<StereoRig> {
  parse_setup_str(RIG_SETUP)
}

fn animal_position(animal: usize, frame: FrameIndex) -> Vector3d {
  let c = PATH_CENTERS[animal];
  let phase = 2. * std::f64::consts::PI * (frame as f64 / PATH_PERIOD + animal as f64 / 3.);
  Vector3d::new(
    c[0] + PATH_RADIUS * phase.cos(),
    c[1] + PATH_RADIUS * phase.sin(),
    c[2] + 5. * (0.5 * phase).sin(),
  )
}

pub fn generate_scene(options: &SceneOptions) -> Result<Scene> {
  if options.animals > PATH_CENTERS.len() {
    bail!("At most {} animals are supported, got {}.", PATH_CENTERS.len(), options.animals);
  }
  if !(0. ..=1.).contains(&options.dropout) {
    bail!("Dropout probability must be within [0, 1], got {}.", options.dropout);
  }
  let rig = synthetic_rig()?;
  let mut rng = Xoshiro256PlusPlus::seed_from_u64(options.seed);
  let truth: Vec<Vec<Vector3d>> = (0..options.animals)
    .map(|animal| (0..options.frames).map(|f| animal_position(animal, f)).collect())
    .collect();

  let mut streams = [DetectionStream::new(), DetectionStream::new()];
  for frame in 0..options.frames {
    for (view, stream) in streams.iter_mut().enumerate() {
      let mut detections = vec![];
      for (animal, path) in truth.iter().enumerate() {
        let hidden = animal == 0 && options.occlusion.as_ref().map_or(false, |r| r.contains(&frame));
        if hidden || rng.gen_bool(options.dropout) { continue }
        let pixel = match rig.cameras[view].project(&path[frame]) {
          Some(pixel) => pixel,
          None => continue,
        };
        let noise = if options.noise > 0. {
          Vector2d::new(rng.gen_range(-options.noise..options.noise), rng.gen_range(-options.noise..options.noise))
        }
        else {
          Vector2d::zeros()
        };
        let size = Vector2d::new(BOX_SIZE[0], BOX_SIZE[1]);
        detections.push(Detection::new(pixel + noise, size, rng.gen_range(0.8..1.0)));
      }
      stream.push(FrameDetections::new(frame, detections));
    }
  }
  debug!("Generated scene with {} animals over {} frames, {} + {} detections.",
    options.animals, options.frames, streams[0].detection_count(), streams[1].detection_count());
  Ok(Scene { rig, truth, streams })
}
