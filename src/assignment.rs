// Minimum-cost bipartite assignment with infeasible entries.
//
// Used for detection to tracklet association, cross-view tracklet pairing and
// tracklet stitching. Entries that are infinite or NaN are infeasible and are
// never part of the result. Among assignments with the largest possible
// number of feasible matches, the one with the smallest total cost is
// returned.
//
// The feasible entries form a bipartite graph whose connected components are
// independent problems. They are solved in parallel with the Hungarian
// algorithm (Kuhn-Munkres with potentials, O(n³) per component).

use crate::all::*;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
  // (row, column) pairs, sorted by row.
  pub matches: Vec<(usize, usize)>,
  pub unmatched_rows: Vec<usize>,
  pub unmatched_columns: Vec<usize>,
}

pub fn is_feasible(cost: f64) -> bool {
  cost.is_finite()
}

// A connected component of the feasibility graph.
struct Component {
  rows: Vec<usize>,
  columns: Vec<usize>,
}

pub fn solve_assignment(costs: &DMatrix<f64>) -> Assignment {
  let (nrows, ncols) = costs.shape();
  let components = find_components(costs);
  let mut matches: Vec<(usize, usize)> = components
    .par_iter()
    .map(|component| solve_component(costs, component))
    .flatten()
    .collect();
  matches.sort();

  let mut row_used = vec![false; nrows];
  let mut column_used = vec![false; ncols];
  for &(r, c) in &matches {
    row_used[r] = true;
    column_used[c] = true;
  }
  Assignment {
    matches,
    unmatched_rows: (0..nrows).filter(|r| !row_used[*r]).collect(),
    unmatched_columns: (0..ncols).filter(|c| !column_used[*c]).collect(),
  }
}

// Union-find over rows `0..nrows` and columns `nrows..nrows + ncols`.
fn find_components(costs: &DMatrix<f64>) -> Vec<Component> {
  let (nrows, ncols) = costs.shape();
  let mut parent: Vec<usize> = (0..nrows + ncols).collect();
  fn root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
      parent[i] = parent[parent[i]];
      i = parent[i];
    }
    i
  }
  let mut has_edge = vec![false; nrows + ncols];
  for r in 0..nrows {
    for c in 0..ncols {
      if !is_feasible(costs[(r, c)]) { continue }
      has_edge[r] = true;
      has_edge[nrows + c] = true;
      let a = root(&mut parent, r);
      let b = root(&mut parent, nrows + c);
      if a != b { parent[a] = b }
    }
  }

  let mut by_root: BTreeMap<usize, Component> = BTreeMap::new();
  for i in 0..nrows + ncols {
    if !has_edge[i] { continue }
    let component = by_root.entry(root(&mut parent, i))
      .or_insert_with(|| Component { rows: vec![], columns: vec![] });
    if i < nrows {
      component.rows.push(i);
    }
    else {
      component.columns.push(i - nrows);
    }
  }
  by_root.into_values().collect()
}

fn solve_component(costs: &DMatrix<f64>, component: &Component) -> Vec<(usize, usize)> {
  let rows = &component.rows;
  let columns = &component.columns;
  if rows.len() == 1 && columns.len() == 1 {
    return vec![(rows[0], columns[0])];
  }

  // Square problem of size `n`. Infeasible entries get a cost larger than any
  // sum of feasible costs so that they are used only when unavoidable, and
  // padding entries cost nothing.
  let n = rows.len().max(columns.len());
  let mut min_cost = f64::INFINITY;
  let mut max_cost = f64::NEG_INFINITY;
  for &r in rows {
    for &c in columns {
      let x = costs[(r, c)];
      if is_feasible(x) {
        min_cost = min_cost.min(x);
        max_cost = max_cost.max(x);
      }
    }
  }
  let infeasible = (max_cost - min_cost + 1.) * (n as f64 + 1.);
  let mut square = vec![vec![0.; n]; n];
  for (i, &r) in rows.iter().enumerate() {
    for (j, &c) in columns.iter().enumerate() {
      let x = costs[(r, c)];
      square[i][j] = if is_feasible(x) { x - min_cost } else { infeasible };
    }
  }

  hungarian(&square)
    .into_iter()
    .enumerate()
    .filter(|(i, j)| *i < rows.len() && *j < columns.len())
    .map(|(i, j)| (rows[i], columns[j]))
    .filter(|(r, c)| is_feasible(costs[(*r, *c)]))
    .collect()
}

// Returns the column assigned to each row of a square matrix of finite costs.
fn hungarian(cost: &[Vec<f64>]) -> Vec<usize> {
  let n = cost.len();
  // Potentials and matching use 1-based indices, 0 is a virtual column.
  let mut u = vec![0.; n + 1];
  let mut v = vec![0.; n + 1];
  let mut p = vec![0usize; n + 1];
  let mut way = vec![0usize; n + 1];
  for i in 1..=n {
    p[0] = i;
    let mut j0 = 0;
    let mut minv = vec![f64::INFINITY; n + 1];
    let mut used = vec![false; n + 1];
    loop {
      used[j0] = true;
      let i0 = p[j0];
      let mut delta = f64::INFINITY;
      let mut j1 = 0;
      for j in 1..=n {
        if used[j] { continue }
        let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
        if cur < minv[j] {
          minv[j] = cur;
          way[j] = j0;
        }
        if minv[j] < delta {
          delta = minv[j];
          j1 = j;
        }
      }
      for j in 0..=n {
        if used[j] {
          u[p[j]] += delta;
          v[j] -= delta;
        }
        else {
          minv[j] -= delta;
        }
      }
      j0 = j1;
      if p[j0] == 0 { break }
    }
    loop {
      let j1 = way[j0];
      p[j0] = p[j1];
      j0 = j1;
      if j0 == 0 { break }
    }
  }

  let mut assignment = vec![0; n];
  for j in 1..=n {
    if p[j] != 0 {
      assignment[p[j] - 1] = j - 1;
    }
  }
  assignment
}
