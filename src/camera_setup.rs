use crate::all::*;

#[derive(Deserialize)]
#[allow(non_snake_case)]
pub struct CameraSetup {
  pub focalLengthX: f64,
  pub focalLengthY: f64,
  pub principalPointX: f64,
  pub principalPointY: f64,
  #[serde(default)]
  pub distortionCoefficients: Vec<f64>,
  // Row-major 4x4 rigid transform from world to camera coordinates.
  pub worldToCamera: Vec<Vec<f64>>,
  pub model: String,
}

#[derive(Deserialize)]
pub struct CameraSetupRoot {
  pub cameras: Vec<CameraSetup>,
}

pub const SETUP_FILE_NAME: &'static str = "calibration.json";

const ROTATION_TOLERANCE: f64 = 1e-6;

impl StereoRig {
  // Loads `calibration.json` from the given folder or reads the path as the
  // file itself.
  pub fn load(path: &Path) -> Result<StereoRig> {
    let setup_path = if path.is_dir() { path.join(SETUP_FILE_NAME) } else { path.to_path_buf() };
    if !setup_path.exists() {
      bail!("Failed to find {}.", setup_path.display());
    }
    parse_setup(&setup_path)
  }
}

fn parse_setup(path: &Path) -> Result<StereoRig> {
  let s = std::fs::read_to_string(path)
    .context(format!("Failed to read file {}.", path.display()))?;
  parse_setup_str(&s)
    .context(format!("Failed to parse {}.", path.display()))
}

pub fn parse_setup_str(s: &str) -> Result<StereoRig> {
  let root: CameraSetupRoot = serde_json::from_str(s)?;
  if root.cameras.len() != VIEW_COUNT {
    bail!("Expected {} cameras, found {}.", VIEW_COUNT, root.cameras.len());
  }
  let mut cameras = root.cameras.into_iter()
    .enumerate()
    .map(|(i, x)| convert_setup(x).context(format!("Invalid camera {}.", i)))
    .collect::<Result<Vec<_>>>()?;
  let c1 = cameras.pop().ok_or(anyhow!("Missing camera."))?;
  let c0 = cameras.pop().ok_or(anyhow!("Missing camera."))?;
  Ok(StereoRig::new([c0, c1]))
}

fn convert_setup(d: CameraSetup) -> Result<Camera> {
  let camera_matrix = Matrix3d::new(
    d.focalLengthX, 0., d.principalPointX,
    0., d.focalLengthY, d.principalPointY,
    0., 0., 1.
  );
  let kind = convert_model(&d.model)?;
  let model = match kind {
    CameraKind::Pinhole => Box::new(PinholeModel::new(camera_matrix, d.distortionCoefficients)?),
  };
  if d.worldToCamera.len() != 4 || d.worldToCamera.iter().any(|row| row.len() != 4) {
    bail!("worldToCamera must be a 4x4 matrix.");
  }
  let world_to_camera = Matrix4d::from_iterator(d.worldToCamera.into_iter().flatten()).transpose();
  let rotation: Matrix3d = world_to_camera.fixed_slice::<3, 3>(0, 0).clone_owned();
  let translation: Vector3d = world_to_camera.fixed_slice::<3, 1>(0, 3).clone_owned();
  if (rotation * rotation.transpose() - Matrix3d::identity()).norm() > ROTATION_TOLERANCE
    || rotation.determinant() < 0.
  {
    bail!("worldToCamera does not contain a rotation.");
  }
  Ok(Camera::new(model, rotation, translation))
}

fn convert_model(model: &str) -> Result<CameraKind> {
  match model {
    "pinhole" => Ok(CameraKind::Pinhole),
    _ => bail!("Unknown camera model {}.", &model),
  }
}
