// Pinhole model with the OpenCV distortion model.
//
// Distortion coefficients are given in one of the layouts:
//   []                      no distortion
//   [k1, k2, k3]            radial only
//   [k1, k2, p1, p2]        radial and tangential
//   [k1, k2, p1, p2, k3]    radial and tangential

use crate::all::*;

const UNDISTORT_MAX_ITERATIONS: usize = 20;
const UNDISTORT_CONVERGENCE_THRESHOLD: f64 = 1e-12;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Distortion {
  pub radial: [f64; 3],
  pub tangential: [f64; 2],
}

impl Distortion {
  pub fn from_coefficients(c: &[f64]) -> Result<Distortion> {
    Ok(match c.len() {
      0 => Distortion::default(),
      3 => Distortion { radial: [c[0], c[1], c[2]], tangential: [0., 0.] },
      4 => Distortion { radial: [c[0], c[1], 0.], tangential: [c[2], c[3]] },
      5 => Distortion { radial: [c[0], c[1], c[4]], tangential: [c[2], c[3]] },
      n => bail!("Unsupported number of distortion coefficients {}.", n),
    })
  }

  pub fn is_identity(&self) -> bool {
    self.radial.iter().chain(self.tangential.iter()).all(|x| *x == 0.)
  }
}

pub struct PinholeModel {
  pub camera_matrix: Matrix3d,
  pub camera_matrix_inv: Matrix3d,
  pub distortion: Distortion,
}

impl PinholeModel {
  pub fn new(
    camera_matrix: Matrix3d,
    distortion_coefficients: Vec<f64>,
  ) -> Result<PinholeModel> {
    let camera_matrix_inv = camera_matrix.try_inverse()
      .ok_or(GeometryError::SingularCalibration)?;
    Ok(PinholeModel {
      camera_matrix,
      camera_matrix_inv,
      distortion: Distortion::from_coefficients(&distortion_coefficients)?,
    })
  }

  // Distorts normalized image coordinates, optionally with the Jacobian.
  fn distort(&self, p: Vector2d, compute_derivative: bool) -> (Vector2d, Option<Matrix2d>) {
    if self.distortion.is_identity() {
      return (p, if compute_derivative { Some(Matrix2d::identity()) } else { None });
    }
    let [k1, k2, k3] = self.distortion.radial;
    let [p1, p2] = self.distortion.tangential;
    let x = p[0];
    let y = p[1];
    let r2 = x * x + y * y;
    let theta = 1. + r2 * (k1 + r2 * (k2 + r2 * k3));
    let dtheta = k1 + r2 * (k2 * 2. + r2 * k3 * 3.);
    let dist = Vector2d::new(
      x * theta + 2. * p1 * x * y + p2 * (r2 + 2. * x * x),
      y * theta + p1 * (r2 + 2. * y * y) + 2. * p2 * x * y,
    );
    let dp = if compute_derivative {
      Some(Matrix2d::new(
        theta + x * dtheta * 2. * x + 2. * p1 * y + 6. * p2 * x,
        x * dtheta * 2. * y + 2. * p1 * x + 2. * p2 * y,
        y * dtheta * 2. * x + 2. * p1 * x + 2. * p2 * y,
        theta + y * dtheta * 2. * y + 6. * p1 * y + 2. * p2 * x,
      ))
    }
    else {
      None
    };
    (dist, dp)
  }

  // Newton iteration on `distort(p) = dist`.
  fn undistort(&self, dist: Vector2d) -> Option<Vector2d> {
    if self.distortion.is_identity() { return Some(dist) }
    let mut point = dist;
    for _ in 0..UNDISTORT_MAX_ITERATIONS {
      let (p, dp) = self.distort(point, true);
      let delta = dp?.try_inverse()? * (dist - p);
      point += delta;
      if !point[0].is_finite() || !point[1].is_finite() { return None }
      if delta.norm() < UNDISTORT_CONVERGENCE_THRESHOLD { break }
    }
    Some(point)
  }

  fn normalize(&self, pixel: Vector2d) -> Vector2d {
    let p = self.camera_matrix_inv * Vector3d::new(pixel[0], pixel[1], 1.);
    Vector2d::new(p[0] / p[2], p[1] / p[2])
  }

  fn to_pixel(&self, p: Vector2d) -> Vector2d {
    let pixel = self.camera_matrix * Vector3d::new(p[0], p[1], 1.);
    Vector2d::new(pixel[0] / pixel[2], pixel[1] / pixel[2])
  }
}

impl CameraModel for PinholeModel {
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d> {
    let p = self.undistort(self.normalize(pixel))?;
    Some(Vector3d::new(p[0], p[1], 1.).normalize())
  }

  fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d> {
    if ray[2] <= 0. { return None }
    let iz = 1. / ray[2];
    let (dist, _) = self.distort(iz * Vector2d::new(ray[0], ray[1]), false);
    Some(self.to_pixel(dist))
  }

  fn undistort_pixel(&self, pixel: Vector2d) -> Option<Vector2d> {
    if self.distortion.is_identity() { return Some(pixel) }
    let p = self.undistort(self.normalize(pixel))?;
    Some(self.to_pixel(p))
  }

  fn camera_matrix_inv(&self) -> &Matrix3d {
    &self.camera_matrix_inv
  }
}
