use crate::all::*;

// Intrinsic and extrinsic camera parameters for a single camera.
pub struct Camera {
  // Maps world coordinates to camera coordinates: `x_c = R x_w + t`.
  pub rotation: Matrix3d,
  pub translation: Vector3d,
  pub model: Box<dyn CameraModel>,
}

#[derive(Debug)]
pub enum CameraKind {
  Pinhole,
}

// Intrinsic model: conversion between pixels and camera-frame rays.
pub trait CameraModel: Send + Sync {
  fn pixel_to_ray(&self, pixel: Vector2d) -> Option<Vector3d>;

  fn ray_to_pixel(&self, ray: Vector3d) -> Option<Vector2d>;

  // Pixel in the image of an ideal camera with the same camera matrix and
  // no distortion. Epipolar lines are straight in this space.
  fn undistort_pixel(&self, pixel: Vector2d) -> Option<Vector2d>;

  fn camera_matrix_inv(&self) -> &Matrix3d;
}

#[derive(Clone, Copy, Debug)]
pub struct Ray {
  pub origin: Vector3d,
  // Unit length.
  pub direction: Vector3d,
}

// Line `a x + b y + c = 0` in undistorted pixel coordinates, `a² + b² = 1`.
#[derive(Clone, Copy, Debug)]
pub struct EpipolarLine {
  pub coefficients: Vector3d,
}

impl EpipolarLine {
  // `scale` bounds the magnitude of `l`. Lines that vanish relative to it are
  // rounding noise of a point at the epipole.
  fn from_homogeneous(l: Vector3d, scale: f64) -> Result<EpipolarLine, GeometryError> {
    let n = (l[0] * l[0] + l[1] * l[1]).sqrt();
    if !(n > DEGENERATE_LINE_THRESHOLD * scale) { return Err(GeometryError::DegenerateEpipolarLine) }
    Ok(EpipolarLine { coefficients: l / n })
  }

  // Distance to a point given in undistorted pixel coordinates.
  pub fn distance(&self, undistorted_pixel: Vector2d) -> f64 {
    let l = &self.coefficients;
    (l[0] * undistorted_pixel[0] + l[1] * undistorted_pixel[1] + l[2]).abs()
  }
}

impl Camera {
  pub fn new(
    model: Box<dyn CameraModel>,
    rotation: Matrix3d,
    translation: Vector3d,
  ) -> Camera {
    Camera {
      rotation,
      translation,
      model,
    }
  }

  pub fn center(&self) -> Vector3d {
    -self.rotation.transpose() * self.translation
  }

  pub fn world_to_camera(&self, world_point: &Vector3d) -> Vector3d {
    self.rotation * world_point + self.translation
  }

  pub fn project(&self, world_point: &Vector3d) -> Option<Vector2d> {
    self.model.ray_to_pixel(self.world_to_camera(world_point))
  }

  pub fn backproject(&self, pixel: Vector2d) -> Option<Ray> {
    let ray = self.model.pixel_to_ray(pixel)?;
    Some(Ray {
      origin: self.center(),
      direction: (self.rotation.transpose() * ray).normalize(),
    })
  }
}

#[derive(Clone, Copy, Debug)]
pub struct Triangulation {
  pub point: Vector3d,
  // Length of the shortest segment between the two rays.
  pub ray_distance: f64,
  // Mean pixel distance between the observations and the projections of
  // `point` into both views.
  pub reprojection_error: f64,
}

// The two calibrated views of the tank.
pub struct StereoRig {
  pub cameras: [Camera; VIEW_COUNT],
  // Maps undistorted homogeneous pixels of view 0 to epipolar lines in view 1.
  fundamental: Matrix3d,
}

const PARALLEL_RAYS_THRESHOLD: f64 = 1e-12;
const DEGENERATE_LINE_THRESHOLD: f64 = 1e-9;

fn skew(v: &Vector3d) -> Matrix3d {
  Matrix3d::new(
    0., -v[2], v[1],
    v[2], 0., -v[0],
    -v[1], v[0], 0.,
  )
}

impl StereoRig {
  pub fn new(cameras: [Camera; VIEW_COUNT]) -> StereoRig {
    let [c0, c1] = &cameras;
    // Pose of camera 1 relative to camera 0.
    let r = c1.rotation * c0.rotation.transpose();
    let t = c1.translation - r * c0.translation;
    let essential = skew(&t) * r;
    let fundamental = c1.model.camera_matrix_inv().transpose()
      * essential
      * c0.model.camera_matrix_inv();
    StereoRig { cameras, fundamental }
  }

  // Epipolar line in the other view of a pixel observed in `view`.
  pub fn epipolar_line(&self, view: usize, pixel: Vector2d) -> Result<EpipolarLine, GeometryError> {
    let p = self.cameras[view].model.undistort_pixel(pixel)
      .ok_or(GeometryError::UndistortionFailed)?;
    let p = Vector3d::new(p[0], p[1], 1.);
    let l = if view == 0 {
      self.fundamental * p
    }
    else {
      self.fundamental.transpose() * p
    };
    EpipolarLine::from_homogeneous(l, self.fundamental.norm() * p.norm())
  }

  // Distance in view 1 between `pixels[1]` and the epipolar line of `pixels[0]`.
  pub fn epipolar_distance(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<f64, GeometryError> {
    let line = self.epipolar_line(0, pixels[0])?;
    let p1 = self.cameras[1].model.undistort_pixel(pixels[1])
      .ok_or(GeometryError::UndistortionFailed)?;
    Ok(line.distance(p1))
  }

  // Midpoint of the closest points of the two back-projected rays.
  pub fn triangulate(&self, pixels: [Vector2d; VIEW_COUNT]) -> Result<Triangulation, GeometryError> {
    let r0 = self.cameras[0].backproject(pixels[0]).ok_or(GeometryError::UndistortionFailed)?;
    let r1 = self.cameras[1].backproject(pixels[1]).ok_or(GeometryError::UndistortionFailed)?;
    let w0 = r0.origin - r1.origin;
    let b = r0.direction.dot(&r1.direction);
    let d = r0.direction.dot(&w0);
    let e = r1.direction.dot(&w0);
    let denom = 1. - b * b;
    if denom < PARALLEL_RAYS_THRESHOLD { return Err(GeometryError::ParallelRays) }
    let s = (b * e - d) / denom;
    let t = (e - b * d) / denom;
    if s <= 0. { return Err(GeometryError::BehindCamera(0)) }
    if t <= 0. { return Err(GeometryError::BehindCamera(1)) }
    let p0 = r0.origin + s * r0.direction;
    let p1 = r1.origin + t * r1.direction;
    let point = 0.5 * (p0 + p1);

    let mut reprojection_error = 0.;
    for (view, camera) in self.cameras.iter().enumerate() {
      let pixel = camera.project(&point).ok_or(GeometryError::BehindCamera(view))?;
      reprojection_error += (pixel - pixels[view]).norm();
    }
    Ok(Triangulation {
      point,
      ray_distance: (p0 - p1).norm(),
      reprojection_error: reprojection_error / VIEW_COUNT as f64,
    })
  }
}
