//! The diffusion + reaction stage (`hydrate`).
//!
//! Every cycle each diffusing species attempts up to
//! `MAXDIFFSTEPS / resolution²` random-walk steps through the water-filled
//! pore network. A blocked step may instead trigger a reaction with the
//! phase it ran into; a species that survives its whole step budget is given
//! an aging/nucleation chance to precipitate where it stands.

use crate::core::grid;
use crate::core::phase::{self, WATER_MOLAR_VOLUME};
use crate::engine::state::Simulation;

/// Random-walk attempts per cycle at resolution 1 µm. The division by the
/// squared resolution is integer-truncated.
pub const MAXDIFFSTEPS: usize = 500;

// Growth probabilities on existing seeds.
const CHGROW: f64 = 1.0;
const ETTRGROW: f64 = 0.5;
const C3AH6GROW: f64 = 0.01;
const FH3GROW: f64 = 1.0;
const CACO3GROW: f64 = 1.0;

/// Probability that a sulfate carrier meeting an aluminate reacts on
/// contact.
const SULF_ON_ALUMINATE: f64 = 0.05;
/// Aluminate volume share of ettringite: the aluminate partner is consumed
/// with this probability per reacted sulfate carrier (1 C3A : 2.5 gypsum).
const C3A_CONSUME: f64 = 0.40;
/// Ettringite occupies 3.30× the reacted gypsum volume; one voxel forms in
/// place and the rest precipitates nearby.
const ETTR_EXTRA_PER_GYP: f64 = 2.30;

/// Monosulfate conversion: AFm holds 1.28× the ettringite volume.
const AFM_EXTRA_PER_ETTR: f64 = 0.28;
const AFM_C3A_CONSUME: f64 = 0.24;

/// Pozzolanic and fly-ash glass reaction probabilities and expansions.
const PSFUME: f64 = 0.05;
const PASG: f64 = 0.05;
const PCAS2: f64 = 0.05;
const POZZ_EXTRA: f64 = 1.72;
const STRAT_EXTRA_ASG: f64 = 0.45;
const STRAT_EXTRA_CAS2: f64 = 0.15;

/// Sulfate absorption onto CSH surfaces.
const ABSGYP_ON_CSH: f64 = 0.01;
/// Ettringite regrown by sulfating monosulfate / reacting bare aluminate.
const ETTR_EXTRA_FROM_AFM: f64 = 0.35;
const ETTR_EXTRA_FROM_C3A: f64 = 1.0;

/// Secondary gypsum volume expansions from the calcium sulfate carriers.
const GYPSUMS_EXTRA_ANH: f64 = 0.42;
const GYPSUMS_EXTRA_HEM: f64 = 0.40;

/// Half-width of the local placement cube for expansion products.
const EXTRA_SPREAD: i32 = 1;

impl Simulation {
    /// Walks the diffusing-species list once.
    pub fn hydrate(&mut self) {
        let res2 = self.resolution_um * self.resolution_um;
        let max_steps = ((MAXDIFFSTEPS as f64 / res2) as usize).max(1);
        let mut cur = self.diffusants.head_id();
        while let Some(id) = cur {
            let mut next = self.diffusants.next_id(id);
            self.walk_species(id, max_steps, &mut next);
            cur = next;
        }
    }

    fn walk_species(&mut self, id: u32, max_steps: usize, next: &mut Option<u32>) {
        let stencil = grid::stencil(self.params.neighbors);
        let node = *self.diffusants.node(id);
        let species = node.phase;
        let mut idx = self
            .grid
            .index(node.x as usize, node.y as usize, node.z as usize);
        debug_assert_eq!(self.grid.mic[idx], species);

        for _ in 0..max_steps {
            let dir = self.rng.index(stencil.len());
            let nidx = self.grid.neighbor(idx, stencil[dir]);
            let target = self.grid.mic[nidx];
            if phase::is_water_pore(target) {
                self.grid.mic.swap(idx, nidx);
                let coords = self.grid.coords(nidx);
                self.diffusants.relocate(id, idx, nidx, coords);
                idx = nidx;
                continue;
            }
            if self.try_react(id, species, idx, nidx, target, next) {
                return;
            }
        }
        self.age_species(id, species, idx, node.birth_cycle);
    }

    /// Attempts the collision rule for `species` against the phase `target`
    /// at `nidx`. Returns true when the walking species was consumed.
    fn try_react(
        &mut self,
        id: u32,
        species: u8,
        idx: usize,
        nidx: usize,
        target: u8,
        next: &mut Option<u32>,
    ) -> bool {
        match species {
            phase::DIFFCSH => match target {
                phase::C3S
                | phase::C2S
                | phase::CSH
                | phase::POZZCSH
                | phase::SLAGCSH => {
                    self.consume_to(id, idx, phase::CSH);
                    true
                }
                _ => false,
            },

            phase::DIFFCH => match target {
                phase::CH => {
                    if self.rng.chance(CHGROW) {
                        self.consume_to(id, idx, phase::CH);
                        return true;
                    }
                    false
                }
                phase::SFUME | phase::AMSIL => {
                    let p = (PSFUME
                        * self.params.sfume_loi_factor
                        * self.params.sfume_sio2_frac
                        * self.kpozz_now
                        * self.ph_factor[phase::SFUME as usize])
                        .min(1.0);
                    if self.rng.chance(p) {
                        self.credit_heat(target);
                        self.consume_to_pore(id, idx);
                        self.precipitate(nidx, phase::POZZCSH);
                        self.place_extra_product(phase::POZZCSH, nidx, EXTRA_SPREAD, POZZ_EXTRA);
                        return true;
                    }
                    false
                }
                phase::ASG => {
                    let p = (PASG * self.kpozz_now * self.ph_factor[phase::ASG as usize]).min(1.0);
                    if self.rng.chance(p) {
                        self.credit_heat(phase::ASG);
                        self.consume_to_pore(id, idx);
                        self.precipitate(nidx, phase::STRAT);
                        self.place_extra_product(phase::STRAT, nidx, EXTRA_SPREAD, STRAT_EXTRA_ASG);
                        return true;
                    }
                    false
                }
                phase::CAS2 => {
                    let p = (PCAS2 * self.kpozz_now).min(1.0);
                    if self.rng.chance(p) {
                        self.credit_heat(phase::CAS2);
                        self.consume_to_pore(id, idx);
                        self.precipitate(nidx, phase::STRAT);
                        self.place_extra_product(phase::STRAT, nidx, EXTRA_SPREAD, STRAT_EXTRA_CAS2);
                        return true;
                    }
                    false
                }
                phase::DIFFFH3 => {
                    // Sulfate-starved aluminate pathway: the hydroxide and
                    // iron carriers combine into monosulfoaluminate.
                    if self.remove_partner(nidx, next) {
                        self.precipitate(nidx, phase::AFM);
                        self.consume_to_pore(id, idx);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFGYP | phase::DIFFANH | phase::DIFFHEM => match target {
                phase::C3A | phase::OC3A => {
                    if self.rng.chance(SULF_ON_ALUMINATE) {
                        self.consume_to(id, idx, phase::ETTR);
                        self.place_extra_product(phase::ETTR, idx, EXTRA_SPREAD, ETTR_EXTRA_PER_GYP);
                        if self.rng.chance(C3A_CONSUME) {
                            self.credit_heat(target);
                            self.precipitate(nidx, phase::ETTR);
                        }
                        return true;
                    }
                    false
                }
                phase::C4AF => {
                    if self.rng.chance(SULF_ON_ALUMINATE) {
                        self.consume_to(id, idx, phase::ETTRC4AF);
                        self.place_extra_product(
                            phase::ETTRC4AF,
                            idx,
                            EXTRA_SPREAD,
                            ETTR_EXTRA_PER_GYP,
                        );
                        if self.rng.chance(C3A_CONSUME) {
                            self.credit_heat(target);
                            self.precipitate(nidx, phase::ETTRC4AF);
                        }
                        return true;
                    }
                    false
                }
                phase::DIFFC3A | phase::DIFFC4A => {
                    if self.rng.chance(SULF_ON_ALUMINATE) {
                        let product = if target == phase::DIFFC3A {
                            phase::ETTR
                        } else {
                            phase::ETTRC4AF
                        };
                        self.consume_to(id, idx, product);
                        self.place_extra_product(product, idx, EXTRA_SPREAD, ETTR_EXTRA_PER_GYP);
                        if self.rng.chance(C3A_CONSUME) && self.remove_partner(nidx, next) {
                            self.precipitate(nidx, product);
                        }
                        return true;
                    }
                    false
                }
                phase::ETTR | phase::ETTRC4AF => {
                    if self.rng.chance(ETTRGROW) {
                        self.consume_to(id, idx, target);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFC3A | phase::DIFFC4A => {
                let ettr_kind = if species == phase::DIFFC3A {
                    phase::ETTR
                } else {
                    phase::ETTRC4AF
                };
                match target {
                    phase::GYPSUM | phase::GYPSUMS | phase::ABSGYP => {
                        if self.rng.chance(SULF_ON_ALUMINATE) {
                            self.precipitate(nidx, ettr_kind);
                            self.place_extra_product(
                                ettr_kind,
                                nidx,
                                EXTRA_SPREAD,
                                ETTR_EXTRA_PER_GYP,
                            );
                            if self.rng.chance(C3A_CONSUME) {
                                self.consume_to(id, idx, ettr_kind);
                                return true;
                            }
                        }
                        false
                    }
                    phase::DIFFGYP => {
                        if self.rng.chance(SULF_ON_ALUMINATE) && self.remove_partner(nidx, next) {
                            self.precipitate(nidx, ettr_kind);
                            self.place_extra_product(
                                ettr_kind,
                                nidx,
                                EXTRA_SPREAD,
                                ETTR_EXTRA_PER_GYP,
                            );
                            if self.rng.chance(C3A_CONSUME) {
                                self.consume_to(id, idx, ettr_kind);
                                return true;
                            }
                        }
                        false
                    }
                    phase::C3AH6 => {
                        if self.rng.chance(C3AH6GROW) {
                            self.consume_to(id, idx, phase::C3AH6);
                            return true;
                        }
                        false
                    }
                    phase::DIFFCACL2 => {
                        if self.remove_partner(nidx, next) {
                            self.precipitate(nidx, phase::FRIEDEL);
                            self.consume_to(id, idx, phase::FRIEDEL);
                            return true;
                        }
                        false
                    }
                    _ => false,
                }
            }

            phase::DIFFFH3 => match target {
                phase::FH3 => {
                    if self.rng.chance(FH3GROW) {
                        self.consume_to(id, idx, phase::FH3);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFETTR => match target {
                phase::C3A | phase::OC3A => {
                    self.consume_to(id, idx, phase::AFM);
                    self.place_extra_product(phase::AFM, idx, EXTRA_SPREAD, AFM_EXTRA_PER_ETTR);
                    if self.rng.chance(AFM_C3A_CONSUME) {
                        self.credit_heat(target);
                        self.precipitate(nidx, phase::AFM);
                    }
                    true
                }
                phase::DIFFC3A => {
                    self.consume_to(id, idx, phase::AFM);
                    self.place_extra_product(phase::AFM, idx, EXTRA_SPREAD, AFM_EXTRA_PER_ETTR);
                    if self.rng.chance(AFM_C3A_CONSUME) && self.remove_partner(nidx, next) {
                        self.precipitate(nidx, phase::AFM);
                    }
                    true
                }
                phase::ETTR => {
                    if self.rng.chance(ETTRGROW) {
                        self.consume_to(id, idx, phase::ETTR);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFSO4 => match target {
                phase::CSH => {
                    if self.rng.chance(ABSGYP_ON_CSH) {
                        self.consume_to(id, idx, phase::ABSGYP);
                        return true;
                    }
                    false
                }
                phase::AFM => {
                    self.precipitate(nidx, phase::ETTR);
                    self.place_extra_product(phase::ETTR, nidx, EXTRA_SPREAD, ETTR_EXTRA_FROM_AFM);
                    self.consume_to_pore(id, idx);
                    true
                }
                phase::C3A | phase::OC3A => {
                    if self.rng.chance(SULF_ON_ALUMINATE) {
                        self.credit_heat(target);
                        self.precipitate(nidx, phase::ETTR);
                        self.place_extra_product(
                            phase::ETTR,
                            nidx,
                            EXTRA_SPREAD,
                            ETTR_EXTRA_FROM_C3A,
                        );
                        self.consume_to_pore(id, idx);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFCACO3 => match target {
                phase::AFM => {
                    self.precipitate(nidx, phase::AFMC);
                    self.consume_to_pore(id, idx);
                    true
                }
                phase::CACO3 => {
                    if self.rng.chance(CACO3GROW) {
                        self.consume_to(id, idx, phase::CACO3);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFAS => match target {
                phase::CH => {
                    let p = (PASG * self.kpozz_now).min(1.0);
                    if self.rng.chance(p) {
                        self.precipitate(nidx, phase::STRAT);
                        self.place_extra_product(phase::STRAT, nidx, EXTRA_SPREAD, STRAT_EXTRA_ASG);
                        self.consume_to_pore(id, idx);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFCAS2 => match target {
                phase::CH => {
                    let p = (PCAS2 * self.kpozz_now).min(1.0);
                    if self.rng.chance(p) {
                        self.precipitate(nidx, phase::STRAT);
                        self.place_extra_product(
                            phase::STRAT,
                            nidx,
                            EXTRA_SPREAD,
                            STRAT_EXTRA_CAS2,
                        );
                        self.consume_to_pore(id, idx);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            phase::DIFFCACL2 => match target {
                phase::C3A | phase::OC3A | phase::C3AH6 => {
                    if phase::is_clinker(target) {
                        self.credit_heat(target);
                    }
                    self.precipitate(nidx, phase::FRIEDEL);
                    self.consume_to(id, idx, phase::FRIEDEL);
                    true
                }
                phase::DIFFC3A => {
                    if self.remove_partner(nidx, next) {
                        self.precipitate(nidx, phase::FRIEDEL);
                        self.consume_to(id, idx, phase::FRIEDEL);
                        return true;
                    }
                    false
                }
                _ => false,
            },

            _ => false,
        }
    }

    /// End-of-walk fate: precipitate in place by aging or nucleation.
    fn age_species(&mut self, id: u32, species: u8, idx: usize, birth_cycle: u32) {
        let age = self.cycle.saturating_sub(birth_cycle);
        match species {
            phase::DIFFCSH if age >= 2 => self.consume_to(id, idx, phase::CSH),
            phase::DIFFETTR if age >= 2 => self.consume_to(id, idx, phase::ETTR),
            phase::DIFFCACO3 if age >= 2 => self.consume_to(id, idx, phase::CACO3),
            phase::DIFFCH if age >= 1 => {
                let p = self.nucleation_prob(
                    self.params.pnucch,
                    self.params.pscalech,
                    self.counts[phase::CH as usize],
                );
                if self.rng.chance(p) {
                    self.consume_to(id, idx, phase::CH);
                }
            }
            phase::DIFFFH3 if age >= 1 => {
                let p = self.nucleation_prob(
                    self.params.pnucfh3,
                    self.params.pscalefh3,
                    self.counts[phase::FH3 as usize],
                );
                if self.rng.chance(p) {
                    self.consume_to(id, idx, phase::FH3);
                }
            }
            phase::DIFFGYP if age >= 1 => {
                let p = self.nucleation_prob(
                    self.params.pnucgyp,
                    self.params.pscalegyp,
                    self.counts[phase::GYPSUMS as usize],
                );
                if self.rng.chance(p) {
                    // Re-precipitation: the carrier already holds its water.
                    self.diffusants.remove(id, idx);
                    self.set_voxel(idx, phase::GYPSUMS);
                }
            }
            phase::DIFFSO4 if age >= 1 => {
                let p = self.nucleation_prob(
                    self.params.pnucgyp,
                    self.params.pscalegyp,
                    self.counts[phase::GYPSUMS as usize],
                );
                if self.rng.chance(p) {
                    self.consume_to(id, idx, phase::GYPSUMS);
                }
            }
            phase::DIFFC3A | phase::DIFFC4A if age >= 1 => {
                let p = self.nucleation_prob(
                    self.params.pnuchgd,
                    self.params.pscalehgd,
                    self.counts[phase::C3AH6 as usize],
                );
                if self.rng.chance(p) {
                    self.consume_to(id, idx, phase::C3AH6);
                }
            }
            phase::DIFFANH if age >= 1 => {
                let seeds = self.counts[phase::GYPSUM as usize]
                    + self.counts[phase::GYPSUMS as usize];
                let p = self.nucleation_prob(self.params.pnucgyp, self.params.pscalegyp, seeds);
                if self.rng.chance(p) {
                    self.diffusants.remove(id, idx);
                    self.precipitate_with_water(idx, phase::GYPSUMS, 2.0);
                    self.place_extra_product(phase::GYPSUMS, idx, EXTRA_SPREAD, GYPSUMS_EXTRA_ANH);
                }
            }
            phase::DIFFHEM if age >= 1 => {
                let seeds = self.counts[phase::GYPSUM as usize]
                    + self.counts[phase::GYPSUMS as usize];
                let p = self.nucleation_prob(self.params.pnucgyp, self.params.pscalegyp, seeds);
                if self.rng.chance(p) {
                    self.diffusants.remove(id, idx);
                    self.precipitate_with_water(idx, phase::GYPSUMS, 1.5);
                    self.place_extra_product(phase::GYPSUMS, idx, EXTRA_SPREAD, GYPSUMS_EXTRA_HEM);
                }
            }
            _ => {}
        }
    }

    /// Removes the walking species' node and precipitates `product` in its
    /// place.
    fn consume_to(&mut self, id: u32, idx: usize, product: u8) {
        self.diffusants.remove(id, idx);
        self.precipitate(idx, product);
    }

    /// Removes the walking species' node, returning its voxel to solution.
    fn consume_to_pore(&mut self, id: u32, idx: usize) {
        self.diffusants.remove(id, idx);
        self.set_voxel(idx, phase::POROSITY);
    }

    /// Unlinks the diffusing partner at `partner_idx`, repairing the walk
    /// cursor if it pointed at the partner. The caller decides what the
    /// partner's voxel becomes.
    fn remove_partner(&mut self, partner_idx: usize, next: &mut Option<u32>) -> bool {
        let Some(pid) = self.diffusants.node_at(partner_idx) else {
            return false;
        };
        if *next == Some(pid) {
            *next = self.diffusants.next_id(pid);
        }
        self.diffusants.remove(pid, partner_idx);
        true
    }

    /// Precipitation with an explicit water stoichiometry (moles per mole of
    /// product), for carriers whose registry value does not apply.
    fn precipitate_with_water(&mut self, idx: usize, product: u8, mol_water: f64) {
        self.set_voxel(idx, product);
        let p = phase::props(product);
        self.water_consumed_voxels += mol_water * WATER_MOLAR_VOLUME / p.molar_volume();
    }
}
