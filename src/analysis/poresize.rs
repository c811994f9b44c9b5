//! Pore-size distribution attached to microstructure snapshots.
//!
//! Each pore voxel is classed by the half-width of the largest pore-only
//! cube centred on it, giving a coarse but cheap size spectrum of the
//! remaining capillary network.

use crate::core::grid::Grid;
use crate::core::phase;

/// Largest half-width probed; a class of this value means "at least".
pub const MAX_HALF_WIDTH: usize = 5;

fn cube_is_pore(grid: &Grid, half: usize, cx: usize, cy: usize, cz: usize) -> bool {
    let h = half as i32;
    for dx in -h..=h {
        for dy in -h..=h {
            for dz in -h..=h {
                let idx = grid.index_wrapped(cx as i32 + dx, cy as i32 + dy, cz as i32 + dz);
                let id = grid.mic[idx];
                if !(phase::is_pore(id) || phase::is_diffusing(id)) {
                    return false;
                }
            }
        }
    }
    true
}

/// Counts pore voxels per size class `0..=MAX_HALF_WIDTH`.
pub fn distribution(grid: &Grid) -> Vec<(usize, u64)> {
    let mut classes = vec![0u64; MAX_HALF_WIDTH + 1];
    for idx in 0..grid.syspix() {
        let id = grid.mic[idx];
        if !(phase::is_pore(id) || phase::is_diffusing(id)) {
            continue;
        }
        let (x, y, z) = grid.coords(idx);
        let mut size = 0;
        while size < MAX_HALF_WIDTH && cube_is_pore(grid, size + 1, x, y, z) {
            size += 1;
        }
        classes[size] += 1;
    }
    classes.into_iter().enumerate().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::{CSH, POROSITY};

    #[test]
    fn open_water_classifies_as_the_largest_class() {
        let n = 4;
        let grid = Grid::new(n, n, n, vec![POROSITY; n * n * n], vec![0; n * n * n]);
        let d = distribution(&grid);
        let total: u64 = d.iter().map(|&(_, c)| c).sum();
        assert_eq!(total, (n * n * n) as u64);
        // Fully periodic water: every voxel reaches the cap.
        assert_eq!(d[MAX_HALF_WIDTH].1, (n * n * n) as u64);
    }

    #[test]
    fn a_single_pore_voxel_is_a_size_zero_pore() {
        let n = 4;
        let mut grid = Grid::new(n, n, n, vec![CSH; n * n * n], vec![0; n * n * n]);
        let idx = grid.index(1, 1, 1);
        grid.mic[idx] = POROSITY;
        let d = distribution(&grid);
        assert_eq!(d[0].1, 1);
        assert!(d[1..].iter().all(|&(_, c)| c == 0));
    }
}
