// Configuration for every pipeline stage. The whole set can be given on the
// command line; each stage receives only its own struct.

use crate::all::*;

#[derive(Clone, Debug, Serialize)]
#[derive(clap::Args)]
pub struct ParameterSet {
  #[clap(flatten)]
  pub builder: BuilderParameters,
  #[clap(flatten)]
  pub matcher: MatcherParameters,
  #[clap(flatten)]
  pub finalizer: FinalizerParameters,
}

// 2D tracklet builder.
#[derive(Clone, Debug, Serialize)]
#[derive(clap::Args)]
pub struct BuilderParameters {
  // Maximum association cost in pixels. The cost is the distance to the
  // predicted position plus the size and confidence terms.
  #[clap(long, default_value = "50")]
  pub gating_distance: f64,
  // Pixels of cost per pixel of change in the square root of box area.
  #[clap(long, default_value = "0.25")]
  pub size_weight: f64,
  // Pixels of cost for a detection of zero confidence.
  #[clap(long, default_value = "5")]
  pub confidence_weight: f64,
  // Number of most recent points used for velocity estimation.
  #[clap(long, default_value = "5")]
  pub velocity_window: usize,
  #[clap(long, default_value = "5")]
  pub max_missed_frames: usize,
  #[clap(long, default_value = "0")]
  pub min_detection_confidence: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[derive(clap::ArgEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregation {
  Mean,
  Median,
  Max,
}

// Cross-view matcher.
#[derive(Clone, Debug, Serialize)]
#[derive(clap::Args)]
pub struct MatcherParameters {
  #[clap(long, default_value = "5")]
  pub min_overlap_frames: usize,
  // Pixels.
  #[clap(long, default_value = "10")]
  pub epipolar_tolerance: f64,
  // Aggregated reprojection error (pixels) above which a pair is infeasible.
  #[clap(long, default_value = "15")]
  pub rejection_threshold: f64,
  // Aggregated reprojection error above which a match is flagged.
  #[clap(long, default_value = "5")]
  pub low_confidence_threshold: f64,
  #[clap(long, arg_enum, default_value = "median")]
  pub aggregation: Aggregation,
  // Below this many shared frames the aggregate is the maximum error.
  #[clap(long, default_value = "10")]
  pub small_sample_frames: usize,
  // Extra matching rounds over frames left unclaimed by accepted pairs.
  #[clap(long, default_value = "0")]
  pub rematch_rounds: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[derive(clap::ArgEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Extrapolation {
  ConstantVelocity,
  ConstantAcceleration,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[derive(clap::ArgEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ToleranceLaw {
  Constant,
  Linear,
  Sqrt,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[derive(clap::ArgEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Interpolation {
  Linear,
  Hermite,
}

// Track finalizer.
#[derive(Clone, Debug, Serialize)]
#[derive(clap::Args)]
pub struct FinalizerParameters {
  // Largest allowed difference between the start frame of a tracklet and the
  // end frame of the one it continues.
  #[clap(long, default_value = "15")]
  pub max_gap: usize,
  // Number of most recent points used to extrapolate across a gap.
  #[clap(long, default_value = "5")]
  pub tail_frames: usize,
  #[clap(long, arg_enum, default_value = "constant-velocity")]
  pub extrapolation: Extrapolation,
  #[clap(long, arg_enum, default_value = "linear")]
  pub tolerance_law: ToleranceLaw,
  // World units.
  #[clap(long, default_value = "10")]
  pub tolerance_base: f64,
  // World units per unit of the growth law.
  #[clap(long, default_value = "2")]
  pub tolerance_growth: f64,
  #[clap(long, default_value = "50")]
  pub tolerance_cap: f64,
  #[clap(long, arg_enum, default_value = "linear")]
  pub interpolation: Interpolation,
  // Frames. Shorter tracklets without any link are dropped as noise.
  #[clap(long, default_value = "10")]
  pub min_track_duration: usize,
}

#[derive(clap::Parser)]
struct DefaultsOnly {
  #[clap(flatten)]
  parameters: ParameterSet,
}

impl Default for ParameterSet {
  fn default() -> ParameterSet {
    use clap::Parser;
    DefaultsOnly::parse_from(["mvtrack"]).parameters
  }
}

impl Default for BuilderParameters {
  fn default() -> BuilderParameters { ParameterSet::default().builder }
}

impl Default for MatcherParameters {
  fn default() -> MatcherParameters { ParameterSet::default().matcher }
}

impl Default for FinalizerParameters {
  fn default() -> FinalizerParameters { ParameterSet::default().finalizer }
}

impl ParameterSet {
  pub fn validate(&self) -> Result<()> {
    let b = &self.builder;
    if !(b.gating_distance > 0.) {
      bail!("Gating distance must be positive.");
    }
    if b.velocity_window < 1 {
      bail!("Velocity window must be at least 1.");
    }
    let m = &self.matcher;
    if m.min_overlap_frames < 1 {
      bail!("Minimum overlap must be at least one frame.");
    }
    if m.low_confidence_threshold > m.rejection_threshold {
      bail!("Low confidence threshold must not exceed the rejection threshold.");
    }
    let f = &self.finalizer;
    if f.tail_frames < 2 {
      bail!("At least two tail frames are needed to extrapolate motion.");
    }
    if f.tolerance_growth < 0. || f.tolerance_cap < f.tolerance_base {
      bail!("Stitching tolerance must be non-decreasing: growth >= 0 and cap >= base.");
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_valid() {
    let p = ParameterSet::default();
    p.validate().unwrap();
    assert_eq!(p.matcher.aggregation, Aggregation::Median);
    assert_eq!(p.finalizer.tolerance_law, ToleranceLaw::Linear);
    assert_eq!(p.builder.max_missed_frames, 5);
  }

  #[test]
  fn test_parse_overrides() {
    use clap::Parser;
    let p = DefaultsOnly::parse_from([
      "mvtrack", "--aggregation", "max", "--tolerance-law", "sqrt", "--max-gap", "30",
    ]).parameters;
    assert_eq!(p.matcher.aggregation, Aggregation::Max);
    assert_eq!(p.finalizer.tolerance_law, ToleranceLaw::Sqrt);
    assert_eq!(p.finalizer.max_gap, 30);
  }
}
