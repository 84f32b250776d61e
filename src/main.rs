mod all;
mod assignment;
mod camera;
mod camera_pinhole;
mod camera_setup;
mod detection;
mod error;
mod finalizer;
mod input;
mod matcher;
mod output;
mod parameters;
mod pipeline;
mod synthetic;
mod track;
mod tracker;
mod tracklet;
mod types;
mod util;

use all::*;

use clap::Parser;

#[derive(Parser)]
#[clap(name = "mvtrack", about = "Multi-animal 3D tracking from two synchronized cameras.")]
struct Args {
  // Folder with `calibration.json`, `view0.jsonl` and `view1.jsonl`.
  #[clap(short, long, required_unless_present = "synthetic")]
  input_folder: Option<String>,
  // Overrides the calibration file of the input folder.
  #[clap(long)]
  calibration: Option<String>,
  // Override the detection files of the input folder.
  #[clap(long)]
  detections0: Option<String>,
  #[clap(long)]
  detections1: Option<String>,
  // Folder for `tracks.csv` and `report.json`.
  #[clap(short, long, default_value = "output")]
  output: String,
  // Track a generated scene instead of reading input files.
  #[clap(long)]
  synthetic: bool,
  #[clap(flatten)]
  scene: SceneOptions,
  #[clap(long, default_value = "info")]
  log_level: LevelFilter,
  #[clap(flatten)]
  parameters: ParameterSet,
}

fn handle_error(err: &anyhow::Error) {
  for (i, e) in err.chain().enumerate() {
    println!("  {}: {}", i + 1, e);
  }
}

fn main() {
  if let Err(err) = run() {
    handle_error(&err);
    std::process::exit(1);
  }
}

// An explicitly given path, else the default file inside the input folder.
fn input_path(
  explicit: &Option<String>,
  folder: Option<&Path>,
  default: impl Fn(&Path) -> PathBuf,
) -> Result<PathBuf> {
  match (explicit, folder) {
    (Some(path), _) => Ok(PathBuf::from(path)),
    (None, Some(folder)) => Ok(default(folder)),
    (None, None) => bail!("An input folder or explicit input paths are required."),
  }
}

fn load_input(args: &Args) -> Result<(StereoRig, [DetectionStream; VIEW_COUNT])> {
  let folder = args.input_folder.as_deref().map(Path::new);
  let rig = StereoRig::load(&input_path(&args.calibration, folder, |f| f.join(SETUP_FILE_NAME))?)?;
  let stream0 = read_detections(&input_path(&args.detections0, folder, |f| detections_path(f, 0))?)?;
  let stream1 = read_detections(&input_path(&args.detections1, folder, |f| detections_path(f, 1))?)?;
  Ok((rig, [stream0, stream1]))
}

fn run() -> Result<()> {
  let args = Args::parse();
  init_logging(args.log_level);
  args.parameters.validate()?;

  let (rig, streams) = if args.synthetic {
    let scene = generate_scene(&args.scene)?;
    info!("Generated synthetic scene with {} animals over {} frames (seed {}).",
      args.scene.animals, args.scene.frames, args.scene.seed);
    (scene.rig, scene.streams)
  }
  else {
    load_input(&args)?
  };

  let output = run_pipeline(&rig, &streams, &args.parameters);
  write_output(Path::new(&args.output), &output.tracks, &output.report)?;
  Ok(())
}
