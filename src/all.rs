// NOTE This kind of import-all file isn't a common Rust idiom.

pub use crate::{
  assignment::*,
  camera::*,
  camera_pinhole::*,
  camera_setup::*,
  detection::*,
  error::*,
  finalizer::*,
  input::*,
  matcher::*,
  output::*,
  parameters::*,
  pipeline::*,
  synthetic::*,
  track::*,
  tracker::*,
  tracklet::*,
  types::*,
  util::*,
};

pub use {
  std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
  },
  log::{debug, info, warn, LevelFilter},
  nalgebra::DMatrix,
  anyhow::{anyhow, bail, Context as AnyhowContext, Result},
  rayon::prelude::*,
  serde::{Deserialize, Serialize},
};
