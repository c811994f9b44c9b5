//! Per-particle hydration accounting (`parthyd` collaborator).
//!
//! The particle-id grid is fixed at initialisation; a voxel still counts as
//! "remaining" for its particle while it holds one of the original reactant
//! phases. Hydration products precipitated into a particle's footprint do
//! not restore it.

use crate::core::grid::Grid;
use crate::core::phase;
use std::collections::BTreeMap;

/// True for phases a particle can be built from (everything a starting
/// microstructure may contain, as opposed to hydration products).
fn is_original_solid(id: u8) -> bool {
    phase::is_solid(id) && id <= phase::INERTAGG
}

#[derive(Debug, Clone, Default)]
pub struct ParticleTracker {
    initial: BTreeMap<u32, u64>,
}

impl ParticleTracker {
    /// Captures the per-particle voxel counts of the starting
    /// microstructure. Particle id 0 (one-voxel particles) is skipped; their
    /// hydration is not individually meaningful.
    pub fn new(grid: &Grid) -> Self {
        let mut initial = BTreeMap::new();
        for (idx, &pid) in grid.part.iter().enumerate() {
            if pid != 0 && is_original_solid(grid.mic[idx]) {
                *initial.entry(pid).or_insert(0) += 1;
            }
        }
        ParticleTracker { initial }
    }

    /// Walks the particle grid and reports `(particle, initial, remaining)`
    /// per particle, sorted by id.
    pub fn snapshot(&self, grid: &Grid) -> Vec<(u32, u64, u64)> {
        let mut remaining: BTreeMap<u32, u64> = BTreeMap::new();
        for (idx, &pid) in grid.part.iter().enumerate() {
            if pid != 0 && is_original_solid(grid.mic[idx]) {
                *remaining.entry(pid).or_insert(0) += 1;
            }
        }
        self.initial
            .iter()
            .map(|(&pid, &init)| (pid, init, remaining.get(&pid).copied().unwrap_or(0)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::{C3S, CSH, POROSITY};

    #[test]
    fn dissolved_voxels_reduce_the_particle_inventory() {
        let mic = vec![C3S, C3S, C3S, POROSITY];
        let part = vec![7, 7, 8, 0];
        let mut grid = Grid::new(4, 1, 1, mic, part);
        let tracker = ParticleTracker::new(&grid);

        let before = tracker.snapshot(&grid);
        assert_eq!(before, vec![(7, 2, 2), (8, 1, 1)]);

        // One voxel of particle 7 dissolves, a product grows over particle 8.
        grid.mic[0] = POROSITY;
        grid.mic[2] = CSH;
        let after = tracker.snapshot(&grid);
        assert_eq!(after, vec![(7, 2, 1), (8, 1, 0)]);
    }
}
