// Eigen-like aliases.
pub type Vector2d = nalgebra::Vector2::<f64>;
pub type Vector3d = nalgebra::Vector3::<f64>;
pub type Matrix2d = nalgebra::Matrix2::<f64>;
pub type Matrix3d = nalgebra::Matrix3::<f64>;
pub type Matrix4d = nalgebra::Matrix4::<f64>;

// Frame index in the synchronized video pair.
pub type FrameIndex = usize;

// Number of camera views. Arrays of this length are indexed by view.
pub const VIEW_COUNT: usize = 2;
