//! The crack operator: a single scheduled insertion of a slab of crack
//! porosity, displacing the far half of the lattice along the crack normal.

use crate::core::grid::Grid;
use crate::core::phase;
use crate::engine::state::Simulation;
use tracing::info;

impl Simulation {
    /// Applies the scheduled crack once its time arrives. Returns true on
    /// the cycle the crack is inserted.
    pub fn maybe_crack(&mut self) -> bool {
        let p = &self.params;
        if self.crack_done
            || p.crack_time_hours < 0.0
            || p.crack_width == 0
            || self.time_hours < p.crack_time_hours
        {
            return false;
        }
        self.apply_crack();
        self.crack_done = true;
        true
    }

    /// The crack plane is named by the two axes it spans; the normal is the
    /// remaining axis (xz → y, xy → z, yz → x).
    fn crack_axis(&self) -> usize {
        match self.params.crack_orientation.as_str() {
            "yz" => 0,
            "xz" => 1,
            _ => 2,
        }
    }

    fn apply_crack(&mut self) {
        let axis = self.crack_axis();
        let width = self.params.crack_width;
        let (nx, ny, nz) = (self.grid.nx, self.grid.ny, self.grid.nz);
        let old_len = match axis {
            0 => nx,
            1 => ny,
            _ => nz,
        };
        let split = old_len / 2;
        let (new_nx, new_ny, new_nz) = match axis {
            0 => (nx + width, ny, nz),
            1 => (nx, ny + width, nz),
            _ => (nx, ny, nz + width),
        };

        let new_n = new_nx * new_ny * new_nz;
        let mut mic = vec![phase::CRACKP; new_n];
        let mut part = vec![0u32; new_n];
        let mut csh_age = vec![0u16; new_n];
        let mut faces = vec![0u8; new_n];

        let old = &self.grid;
        let new_index =
            |x: usize, y: usize, z: usize| -> usize { (x * new_ny + y) * new_nz + z };
        for x in 0..new_nx {
            for y in 0..new_ny {
                for z in 0..new_nz {
                    let c = match axis {
                        0 => x,
                        1 => y,
                        _ => z,
                    };
                    let source = if c < split {
                        Some(c)
                    } else if c < split + width {
                        None
                    } else {
                        Some(c - width)
                    };
                    let Some(sc) = source else { continue };
                    let (ox, oy, oz) = match axis {
                        0 => (sc, y, z),
                        1 => (x, sc, z),
                        _ => (x, y, sc),
                    };
                    let oidx = old.index(ox, oy, oz);
                    let nidx = new_index(x, y, z);
                    mic[nidx] = old.mic[oidx];
                    part[nidx] = old.part[oidx];
                    csh_age[nidx] = old.csh_age[oidx];
                    faces[nidx] = old.faces[oidx];
                }
            }
        }

        let slab_voxels = (new_n - self.grid.syspix()) as u64;
        self.grid = Grid {
            nx: new_nx,
            ny: new_ny,
            nz: new_nz,
            mic,
            part,
            csh_age,
            faces,
        };
        self.counts[phase::CRACKP as usize] += slab_voxels;

        // Diffusing species in the displaced half move with their voxels.
        self.diffusants.shift_coords(axis, split, width);
        let grid = &self.grid;
        self.diffusants.reindex(new_n, |node| {
            grid.index(node.x as usize, node.y as usize, node.z as usize)
        });

        info!(
            axis,
            width,
            new_nx,
            new_ny,
            new_nz,
            slab_voxels,
            "crack inserted"
        );
    }
}
