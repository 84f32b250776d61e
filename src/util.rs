use crate::all::*;

pub fn init_logging(level: LevelFilter) {
  // `try_init` so that repeated initialization from tests is harmless.
  let _ = env_logger::Builder::new()
    .filter_level(level)
    .format(format_log)
    .try_init();
}

pub fn format_log(
  buf: &mut env_logger::fmt::Formatter,
  record: &log::Record,
) -> std::io::Result<()> {
  use std::io::Write;
  let mut style = buf.style();
  use env_logger::fmt::Color::*;
  use log::Level::*;
  style.set_color(match record.level() {
    Error => Red,
    Warn => Yellow,
    Info => Green,
    Debug => Magenta,
    Trace => Blue,
  });

  let location = format!("{}:{}",
    record.file().unwrap_or("?"),
    record.line().unwrap_or(0),
  );
  let s = format!("{:5} {:24}{}", record.level(), location, record.args());
  writeln!(buf, "{}", style.value(s))
}

// Median of the values, averaging the middle pair for even counts.
// Sorts the slice in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
  if values.is_empty() { return None }
  values.sort_by(|a, b| a.total_cmp(b));
  let n = values.len();
  if n % 2 == 1 {
    Some(values[n / 2])
  }
  else {
    Some(0.5 * (values[n / 2 - 1] + values[n / 2]))
  }
}

pub fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() { return None }
  Some(values.iter().sum::<f64>() / values.len() as f64)
}
