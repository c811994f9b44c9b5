//! Percolation probes over the voxel lattice.
//!
//! Connectivity is probed with union-find cluster labelling: voxels of the
//! target set are merged across shared faces, periodically on the two
//! transverse axes and non-periodically along the probed axis, and a
//! direction percolates when one cluster touches both end faces.

use crate::core::grid::Grid;
use crate::core::phase;
use petgraph::unionfind::UnionFind;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default)]
pub struct BurnResult {
    /// True when a single cluster spans the probed axis.
    pub spans: bool,
    /// Fraction of the target phase sitting in spanning clusters.
    pub connected_fraction: f64,
    pub total: u64,
}

fn axis_coord(coords: (usize, usize, usize), axis: usize) -> usize {
    match axis {
        0 => coords.0,
        1 => coords.1,
        _ => coords.2,
    }
}

fn burn(grid: &Grid, axis: usize, target: impl Fn(u8) -> bool) -> BurnResult {
    let n = grid.syspix();
    let mut uf = UnionFind::<usize>::new(n);
    let axis_len = match axis {
        0 => grid.nx,
        1 => grid.ny,
        _ => grid.nz,
    };
    if axis_len < 2 {
        return BurnResult::default();
    }

    let mut total = 0u64;
    for idx in 0..n {
        if !target(grid.mic[idx]) {
            continue;
        }
        total += 1;
        let (x, y, z) = grid.coords(idx);
        // Merge along the three positive face directions; the probed axis
        // does not wrap.
        for (dir, offset) in [(0usize, (1i32, 0i32, 0i32)), (1, (0, 1, 0)), (2, (0, 0, 1))] {
            if dir == axis && axis_coord((x, y, z), axis) + 1 == axis_len {
                continue;
            }
            let nidx =
                grid.index_wrapped(x as i32 + offset.0, y as i32 + offset.1, z as i32 + offset.2);
            if target(grid.mic[nidx]) {
                uf.union(idx, nidx);
            }
        }
    }

    if total == 0 {
        return BurnResult::default();
    }

    // Roots touching the near face, then clusters reaching the far face too.
    let mut near: HashSet<usize> = HashSet::new();
    let mut spanning: HashSet<usize> = HashSet::new();
    for idx in 0..n {
        if !target(grid.mic[idx]) {
            continue;
        }
        let c = axis_coord(grid.coords(idx), axis);
        if c == 0 {
            near.insert(uf.find(idx));
        }
    }
    for idx in 0..n {
        if !target(grid.mic[idx]) {
            continue;
        }
        let c = axis_coord(grid.coords(idx), axis);
        if c + 1 == axis_len {
            let root = uf.find(idx);
            if near.contains(&root) {
                spanning.insert(root);
            }
        }
    }

    if spanning.is_empty() {
        return BurnResult {
            spans: false,
            connected_fraction: 0.0,
            total,
        };
    }

    let mut connected = 0u64;
    for idx in 0..n {
        if target(grid.mic[idx]) && spanning.contains(&uf.find(idx)) {
            connected += 1;
        }
    }
    BurnResult {
        spans: true,
        connected_fraction: connected as f64 / total as f64,
        total,
    }
}

/// Pore-network percolation along `axis` (0 = x, 1 = y, 2 = z): the target
/// set is the given pore phases plus every diffusing species (they occupy
/// pore solution).
pub fn burn3d(grid: &Grid, pore_id: u8, crack_id: u8, axis: usize) -> BurnResult {
    burn(grid, axis, |id| {
        id == pore_id || id == crack_id || phase::is_diffusing(id)
    })
}

/// Solid-backbone percolation along `axis`; the set point is the first cycle
/// at which all three directions percolate.
pub fn burnset(grid: &Grid, axis: usize) -> BurnResult {
    burn(grid, axis, phase::is_solid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::{CRACKP, CSH, POROSITY};

    fn solid_grid(n: usize) -> Grid {
        Grid::new(n, n, n, vec![CSH; n * n * n], vec![0; n * n * n])
    }

    #[test]
    fn straight_pore_channel_percolates_only_along_its_axis() {
        let mut g = solid_grid(4);
        for x in 0..4 {
            let idx = g.index(x, 1, 1);
            g.mic[idx] = POROSITY;
        }
        assert!(burn3d(&g, POROSITY, CRACKP, 0).spans);
        assert!(!burn3d(&g, POROSITY, CRACKP, 1).spans);
        assert!(!burn3d(&g, POROSITY, CRACKP, 2).spans);
    }

    #[test]
    fn probed_axis_does_not_wrap() {
        let mut g = solid_grid(4);
        // A channel broken at x = 2: reaches both faces only through the
        // periodic image, which the probe must not take.
        for x in [0usize, 1, 3] {
            let idx = g.index(x, 1, 1);
            g.mic[idx] = POROSITY;
        }
        assert!(!burn3d(&g, POROSITY, CRACKP, 0).spans);
    }

    #[test]
    fn transverse_axes_do_wrap() {
        let mut g = solid_grid(4);
        // A staircase that needs the periodic y boundary to connect.
        for x in 0..4 {
            let y = if x < 2 { 0 } else { 3 };
            let idx = g.index(x, y, 1);
            g.mic[idx] = POROSITY;
        }
        // Join the two runs across the y boundary at x = 1,2.
        let j = g.index(1, 3, 1);
        g.mic[j] = POROSITY;
        let j2 = g.index(2, 0, 1);
        g.mic[j2] = POROSITY;
        let r = burn3d(&g, POROSITY, CRACKP, 0);
        assert!(r.spans, "expected wrap-assisted percolation");
    }

    #[test]
    fn fully_solid_grid_sets_in_every_direction() {
        let g = solid_grid(3);
        for axis in 0..3 {
            let r = burnset(&g, axis);
            assert!(r.spans);
            assert!((r.connected_fraction - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn isolated_pores_do_not_count_as_connected() {
        let mut g = solid_grid(5);
        for x in 0..5 {
            let idx = g.index(x, 2, 2);
            g.mic[idx] = POROSITY;
        }
        let lone = g.index(0, 0, 0);
        g.mic[lone] = POROSITY;
        let r = burn3d(&g, POROSITY, CRACKP, 0);
        assert!(r.spans);
        assert!((r.connected_fraction - 5.0 / 6.0).abs() < 1e-9);
    }
}
