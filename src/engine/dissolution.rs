//! The dissolution stage: surface identification, probabilistic dissolution
//! at water contacts, alkali-sulfate dissolution driven by the pore-solution
//! model, and the stoichiometric balance species.

use crate::core::grid;
use crate::core::phase::{self, NPHASES, OFFSET};
use crate::engine::state::Simulation;
use std::collections::HashSet;

/// Balance-species volume released per dissolved voxel of the source phase.
const CH_PER_C3S: f64 = 0.61;
const CH_PER_C2S: f64 = 0.191;
const CH_PER_C4AF: f64 = 0.2584;
const C4A_PER_C4AF: f64 = 0.696;
const CH_PER_FREELIME: f64 = 0.954;
const C3A_PER_C3AH6: f64 = 0.5917;

/// A dissolving C4AF voxel leaves iron hydroxide behind with this
/// probability (the FH3 volume share of the ferrite).
const FH3_FROM_C4AF: f64 = 0.5453;

/// Half-width of the placement cube for the extra CSH diffusants generated
/// by silicate dissolution (`loccsh`).
const DISTLOCCSH: i32 = 1;

/// Diffusing species owed to the pore solution at the end of pass B.
#[derive(Debug, Default, Clone, Copy)]
struct Balance {
    ch: f64,
    c3a: f64,
    c4a: f64,
    so4: f64,
    /// Diffusing CH consumed by the slag reaction.
    ch_absorbed: f64,
}

impl Simulation {
    /// One full dissolution cycle (passes A through D plus
    /// self-desiccation).
    pub fn dissolve(&mut self) {
        self.dissolved = [0; NPHASES];
        self.update_solubility();
        let stencil = grid::stencil(self.params.neighbors);
        let n = self.syspix();

        // --- Pass A: count every phase and flag the dissolvable surface ---
        self.refresh_counts();
        self.ksulf_list.clear();
        self.nasulf_list.clear();
        let mut ksulf_members: HashSet<usize> = HashSet::new();
        let mut nasulf_members: HashSet<usize> = HashSet::new();

        for idx in 0..n {
            let id = self.grid.mic[idx];
            if !phase::is_solid(id) {
                continue;
            }
            let exposed = stencil.iter().any(|&off| {
                let nidx = self.grid.neighbor(idx, off);
                let nid = self.grid.mic[nidx];
                phase::is_water_pore(nid)
                    || matches!(nid, phase::CSH | phase::POZZCSH | phase::SLAGCSH)
                    || self.grid.part[nidx] != self.grid.part[idx]
            });
            if !exposed {
                continue;
            }
            match id {
                phase::K2SO4 => {
                    self.ksulf_list.push(idx);
                    ksulf_members.insert(idx);
                }
                phase::NA2SO4 => {
                    self.nasulf_list.push(idx);
                    nasulf_members.insert(idx);
                }
                _ if self.soluble[id as usize] => {
                    self.grid.mic[idx] = id + OFFSET;
                }
                _ => {}
            }
        }

        // --- Pass B: probabilistic dissolution of the flagged surface ---
        let mut balance = Balance::default();
        for idx in 0..n {
            let raw = self.grid.mic[idx];
            if raw < OFFSET {
                continue;
            }
            let id = raw - OFFSET;
            self.grid.mic[idx] = id;

            let dir = self.rng.index(stencil.len());
            if let Some(face) = grid::opposite_face(dir) {
                if self.grid.face_deactivated(idx, face) {
                    continue;
                }
            }

            let mut q = self.ph_factor[id as usize] * self.disprob[id as usize];
            if self.grid.part[idx] == 0 {
                q *= phase::props(id).one_pixel_bias;
            }
            if !(0.0..=1.0).contains(&q) {
                self.anomalies += 1;
                q = q.clamp(0.0, 1.0);
            }
            if !self.rng.chance(q) {
                continue;
            }

            let nidx = self.grid.neighbor(idx, stencil[dir]);
            if !phase::is_water_pore(self.grid.mic[nidx]) {
                continue;
            }
            self.dissolve_voxel(idx, id, nidx, &mut balance);
        }

        // --- Pass C: alkali sulfates, paced by the pore-solution model ---
        self.dissolve_alkali_sulfates(stencil, &mut balance, &mut ksulf_members, &mut nasulf_members);

        // --- Pass D: place the balance species into the pore network ---
        self.place_balance(balance);

        self.update_shrinkage();
        self.self_desiccate();
    }

    /// Re-totals the per-phase counters from the grid, stripping any stale
    /// sentinel defensively. Also used as the final count refresh after the
    /// last cycle.
    pub fn refresh_counts(&mut self) {
        let mut counts = [0u64; NPHASES];
        for v in self.grid.mic.iter_mut() {
            if *v >= OFFSET {
                *v -= OFFSET;
            }
            counts[*v as usize] += 1;
        }
        self.counts = counts;
    }

    fn dissolve_voxel(&mut self, idx: usize, id: u8, nidx: usize, balance: &mut Balance) {
        // The slag reaction converts in place instead of leaving.
        if id == phase::SLAG {
            self.react_slag(idx, nidx, balance);
            return;
        }

        let solvent = self.grid.mic[nidx];
        self.set_voxel(idx, solvent);
        self.dissolved[id as usize] += 1;
        self.credit_heat(id);

        match id {
            phase::C3S | phase::C2S => {
                self.spawn_diffusant(nidx, phase::DIFFCSH);
                // Molar-volume expansion: extra gel diffusants near the
                // dissolution site.
                let expansion = self.csh_molarv / phase::props(id).molar_volume() - 1.0;
                let mut extras = expansion.floor() as usize;
                if self.rng.chance(expansion.fract()) {
                    extras += 1;
                }
                for _ in 0..extras {
                    self.spawn_diffusant_near(phase::DIFFCSH, idx, DISTLOCCSH);
                }
                balance.ch += if id == phase::C3S { CH_PER_C3S } else { CH_PER_C2S };
            }
            phase::C4AF => {
                if self.rng.chance(FH3_FROM_C4AF) {
                    self.spawn_diffusant(nidx, phase::DIFFFH3);
                }
                balance.ch += CH_PER_C4AF;
                balance.c4a += C4A_PER_C4AF;
            }
            phase::C3A | phase::OC3A => {
                balance.c3a += 1.0;
            }
            phase::C3AH6 => {
                balance.c3a += C3A_PER_C3AH6;
            }
            phase::FREELIME => {
                self.spawn_diffusant(nidx, phase::DIFFCH);
                balance.ch += CH_PER_FREELIME;
            }
            _ => {
                if let Some(species) = phase::props(id).dissolves_to {
                    self.spawn_diffusant(nidx, species);
                }
            }
        }
    }

    fn react_slag(&mut self, idx: usize, nidx: usize, balance: &mut Balance) {
        self.dissolved[phase::SLAG as usize] += 1;
        self.credit_heat(phase::SLAG);
        // Water binding follows the slag characteristics file, not the
        // generic gel entry.
        self.set_voxel(idx, phase::SLAGCSH);
        let slag_molarv = self.slag.molar_mass / self.slag.specific_gravity;
        self.water_consumed_voxels +=
            self.slag.water_per_slag * phase::WATER_MOLAR_VOLUME / slag_molarv;
        let growth = self.slag.slagcsh_per_slag - 1.0;
        if growth > 0.0 && self.rng.chance(growth.min(1.0)) {
            self.precipitate(nidx, phase::SLAGCSH);
        }
        balance.c3a += self.slag.c3a_per_slag;
        balance.ch_absorbed += self.slag.ch_per_slag;
    }

    fn dissolve_alkali_sulfates(
        &mut self,
        stencil: &'static [(i32, i32, i32)],
        balance: &mut Balance,
        ksulf_members: &mut HashSet<usize>,
        nasulf_members: &mut HashSet<usize>,
    ) {
        for salt in [phase::K2SO4, phase::NA2SO4] {
            let init = self.init.counts[salt as usize];
            if init == 0 {
                continue;
            }
            let is_k = salt == phase::K2SO4;
            let released = if is_k {
                self.solution.released_k
            } else {
                self.solution.released_na
            };
            let target = (released * init as f64).round() as u64;
            loop {
                let dissolved_so_far = init - self.counts[salt as usize].min(init);
                if dissolved_so_far >= target {
                    break;
                }
                let len = if is_k { self.ksulf_list.len() } else { self.nasulf_list.len() };
                if len == 0 {
                    break;
                }
                let pick = self.rng.index(len);
                let idx = if is_k {
                    self.ksulf_list.take_nth(pick)
                } else {
                    self.nasulf_list.take_nth(pick)
                };
                let members = if is_k { &mut *ksulf_members } else { &mut *nasulf_members };
                members.remove(&idx);
                if self.grid.mic[idx] != salt {
                    continue;
                }
                self.set_voxel(idx, phase::POROSITY);
                self.dissolved[salt as usize] += 1;
                self.credit_heat(salt);
                balance.so4 += 1.0;

                // Newly exposed neighbours join the candidate pool.
                for &off in stencil {
                    let nidx = self.grid.neighbor(idx, off);
                    if self.grid.mic[nidx] == salt && members.insert(nidx) {
                        if is_k {
                            self.ksulf_list.push(nidx);
                        } else {
                            self.nasulf_list.push(nidx);
                        }
                    }
                }
            }
        }
    }

    fn place_balance(&mut self, balance: Balance) {
        for (species, amount) in [
            (phase::DIFFCH, balance.ch),
            (phase::DIFFC3A, balance.c3a),
            (phase::DIFFC4A, balance.c4a),
            (phase::DIFFSO4, balance.so4),
        ] {
            let mut count = amount.floor() as usize;
            if self.rng.chance(amount.fract()) {
                count += 1;
            }
            for _ in 0..count {
                self.spawn_diffusant_at_random_pore(species);
            }
        }

        // Slag gel incorporates lime: satisfy the deficit from the
        // diffusing-CH pool first, then from solid portlandite.
        let mut quota = balance.ch_absorbed.floor() as usize;
        if self.rng.chance(balance.ch_absorbed.fract()) {
            quota += 1;
        }
        let mut cur = self.diffusants.head_id();
        while quota > 0 {
            let Some(id) = cur else { break };
            let next = self.diffusants.next_id(id);
            let node = *self.diffusants.node(id);
            if node.phase == phase::DIFFCH {
                let idx =
                    self.grid.index(node.x as usize, node.y as usize, node.z as usize);
                self.diffusants.remove(id, idx);
                self.set_voxel(idx, phase::POROSITY);
                quota -= 1;
            }
            cur = next;
        }
        let mut attempts = 0;
        while quota > 0 && attempts < 1000 {
            let idx = self.rng.index(self.syspix());
            if self.grid.mic[idx] == phase::CH {
                self.set_voxel(idx, phase::POROSITY);
                quota -= 1;
            }
            attempts += 1;
        }
        self.anomalies += quota as u64;
    }
}
