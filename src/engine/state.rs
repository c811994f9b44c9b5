//! The simulation state: grids, species lists, counters, scalar state, and
//! the bookkeeping primitives shared by the dissolution and hydration
//! stages.

use crate::analysis::particles::ParticleTracker;
use crate::chemistry::alkali::{self, PoreSolution, PoreSolutionInput};
use crate::chemistry::kinetics::{self, RateInputs};
use crate::chemistry::thermal::{CurveKind, ThermalState, TimeKeeper, TimeMapping};
use crate::core::grid::Grid;
use crate::core::phase::{self, NPHASES};
use crate::core::species::{CandidateList, DiffusantList};
use crate::io::aux_data::{self, AlkaliChar, SlagChar};
use crate::io::microstructure;
use crate::io::params::{SimParams, TimeCalibration};
use crate::math::Ran1;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Water available per water-filled pore voxel, in voxel volumes.
const WATER_PER_PORE_VOXEL: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct BurnState {
    /// Connectivity fraction per axis plus average, as last probed.
    pub pore: [f64; 4],
    pub solid: [f64; 4],
    /// Latched solid-percolation flags per axis.
    pub set_flags: [bool; 3],
}

/// Counters and masses captured from the initial microstructure.
#[derive(Debug, Clone)]
pub struct InitialState {
    pub counts: [u64; NPHASES],
    /// Water-filled porosity fraction of the whole system.
    pub totfract: f64,
    /// Fraction of solid voxels exposed to pore water.
    pub surffract: f64,
    /// EMPTYP voxels present before hydration started.
    pub count_pore_initial: u64,
    pub cement_mass_g: f64,
    pub clinker_mass_g: f64,
    pub flyash_mass_g: f64,
    pub water_mass_g: f64,
    /// Total solid-plus-diffusing voxels (reaction-volume reference).
    pub solid_voxels: u64,
}

impl Default for InitialState {
    fn default() -> Self {
        InitialState {
            counts: [0; NPHASES],
            totfract: 0.0,
            surffract: 0.0,
            count_pore_initial: 0,
            cement_mass_g: 0.0,
            clinker_mass_g: 0.0,
            flyash_mass_g: 0.0,
            water_mass_g: 0.0,
            solid_voxels: 0,
        }
    }
}

pub struct Simulation {
    pub params: SimParams,
    pub workdir: PathBuf,
    pub grid: Grid,
    pub resolution_um: f64,
    pub resolution_mm: f64,
    pub voxel_cm3: f64,

    pub rng: Ran1,
    pub diffusants: DiffusantList,
    pub ksulf_list: CandidateList,
    pub nasulf_list: CandidateList,

    pub counts: [u64; NPHASES],
    pub dissolved: [u64; NPHASES],
    pub init: InitialState,
    pub soluble: [bool; NPHASES],
    pub disprob: [f64; NPHASES],
    pub ph_factor: [f64; NPHASES],
    /// Pozzolanic Arrhenius factor at the current temperature, used by the
    /// in-pore silica reactions.
    pub kpozz_now: f64,

    pub cycle: u32,
    pub time_hours: f64,
    pub alpha: f64,
    pub alpha_fa: f64,
    pub heat_kj: f64,
    pub water_consumed_voxels: f64,
    /// Cumulative reaction volume deficit, in voxel volumes.
    pub shrink_voxels: f64,
    pub anomalies: u64,
    pub ettr_soluble: bool,

    /// Per-cycle CSH stoichiometry (tracks temperature and pH).
    pub csh_molarv: f64,
    pub csh_water: f64,

    pub solution: PoreSolution,
    pub thermal: ThermalState,
    pub timekeeper: TimeKeeper,
    pub time_history: Vec<(u32, f64)>,
    pub burn: BurnState,
    pub particles: ParticleTracker,

    pub binder_alkali: AlkaliChar,
    pub flyash_alkali: Option<AlkaliChar>,
    pub slag: SlagChar,
    pub custom_alphas: Vec<f64>,
    pub next_custom_alpha: usize,

    pub crack_done: bool,
    pub deact_done: bool,
    pub react_done: bool,
}

impl Simulation {
    pub fn new(workdir: &Path, params: SimParams) -> Result<Self> {
        let img_path = workdir.join(&params.micfile);
        let pimg_path = workdir.join(&params.pimgfile);
        let (img_header, mic) = microstructure::read_img(&img_path)?;
        let (pimg_header, part) = microstructure::read_pimg(&pimg_path)?;
        microstructure::check_pair(&img_header, &pimg_header)?;
        let grid = Grid::new(img_header.nx, img_header.ny, img_header.nz, mic, part);
        let resolution_um = img_header.resolution_um();
        let voxel_cm3 = (resolution_um * 1.0e-4).powi(3);

        let binder_alkali = {
            let path = workdir.join("alkalichar.dat");
            if path.exists() {
                aux_data::read_alkali_char(&path)?
            } else {
                warn!("alkalichar.dat not found, assuming an alkali-free binder");
                AlkaliChar::default()
            }
        };
        let flyash_alkali = {
            let path = workdir.join("alkaliflyash.dat");
            path.exists()
                .then(|| aux_data::read_alkali_char(&path))
                .transpose()?
        };
        let slag = {
            let path = workdir.join("slagchar.dat");
            if path.exists() {
                aux_data::read_slag_char(&path)?
            } else {
                SlagChar::default()
            }
        };
        let custom_alphas = {
            let path = workdir.join("customoutput.dat");
            if path.exists() {
                let mut v = aux_data::read_custom_alphas(&path)?;
                v.sort_by(f64::total_cmp);
                v
            } else {
                Vec::new()
            }
        };

        let profile = params
            .temp_profile_file
            .as_ref()
            .map(|f| aux_data::read_temp_profile(&workdir.join(f)))
            .transpose()?;

        let mapping = match params.time_calibration {
            TimeCalibration::BetaFactor => TimeMapping::Beta { beta: params.beta },
            kind @ (TimeCalibration::Calorimetric | TimeCalibration::ChemicalShrinkage) => {
                let file = params.calibration_file.as_ref().expect("validated by the parser");
                let curve = aux_data::read_calibration(&workdir.join(file))
                    .context("time-calibration series")?;
                TimeMapping::Curve {
                    curve,
                    ref_temp_c: params.calibration_temp_c,
                    kind: if kind == TimeCalibration::Calorimetric {
                        CurveKind::Calorimetric
                    } else {
                        CurveKind::ChemicalShrinkage
                    },
                }
            }
        };
        let timekeeper = TimeKeeper::new(mapping, params.e_act_hydration);

        let mut counts = [0u64; NPHASES];
        for &id in &grid.mic {
            counts[id as usize] += 1;
        }
        let init = capture_initial(&grid, &counts, voxel_cm3, params.neighbors);
        info!(
            nx = grid.nx,
            ny = grid.ny,
            nz = grid.nz,
            porosity = init.counts[phase::POROSITY as usize],
            clinker_mass_g = init.clinker_mass_g,
            "microstructure loaded"
        );

        let thermal = ThermalState::new(
            params.temp_mode,
            params.temp_0_c,
            params.agg_temp_0_c,
            init.cement_mass_g,
            init.water_mass_g,
            params.agg_mass_frac * init.cement_mass_g,
            params.heat_transfer_u,
            params.ambient_temp_c,
            profile,
        );

        let particles = ParticleTracker::new(&grid);
        let diffusants = DiffusantList::new(grid.syspix());
        let rng = Ran1::new(params.seed);
        let temp_0 = params.temp_0_c;
        let ph_active = params.ph_active;

        let mut sim = Simulation {
            params,
            workdir: workdir.to_path_buf(),
            resolution_um,
            resolution_mm: img_header.resolution_mm,
            voxel_cm3,
            rng,
            diffusants,
            ksulf_list: CandidateList::new(),
            nasulf_list: CandidateList::new(),
            counts,
            dissolved: [0; NPHASES],
            init,
            soluble: [false; NPHASES],
            disprob: [0.0; NPHASES],
            ph_factor: [1.0; NPHASES],
            kpozz_now: 1.0,
            cycle: 0,
            time_hours: 0.0,
            alpha: 0.0,
            alpha_fa: 0.0,
            heat_kj: 0.0,
            water_consumed_voxels: 0.0,
            shrink_voxels: 0.0,
            anomalies: 0,
            ettr_soluble: false,
            csh_molarv: phase::csh_molar_volume(temp_0, ph_active),
            csh_water: phase::csh_water_demand(temp_0, ph_active),
            solution: PoreSolution::default(),
            thermal,
            timekeeper,
            time_history: vec![(0, 0.0)],
            burn: BurnState::default(),
            particles,
            binder_alkali,
            flyash_alkali,
            slag,
            custom_alphas,
            next_custom_alpha: 0,
            crack_done: false,
            deact_done: false,
            react_done: false,
            grid,
        };
        if sim.params.sfume_loi_factor < 1.0 {
            warn!(
                loi = sim.params.sfume_loi_factor,
                "silica-fume LOI factor below 1, clamping"
            );
            sim.params.sfume_loi_factor = 1.0;
        }
        sim.update_solution();
        sim.update_rates();
        Ok(sim)
    }

    #[inline]
    pub fn syspix(&self) -> usize {
        self.grid.syspix()
    }

    /// Replaces the phase at `idx`, keeping the counters in step. The voxel
    /// must hold a plain (sentinel-free) id.
    pub fn set_voxel(&mut self, idx: usize, new_id: u8) {
        let old = self.grid.mic[idx];
        debug_assert!((old as usize) < NPHASES);
        self.counts[old as usize] -= 1;
        self.counts[new_id as usize] += 1;
        self.grid.mic[idx] = new_id;
    }

    /// Creates a diffusing species at a water-filled pore voxel and
    /// registers its list node.
    pub fn spawn_diffusant(&mut self, idx: usize, species: u8) {
        debug_assert!(phase::is_water_pore(self.grid.mic[idx]));
        self.set_voxel(idx, species);
        let coords = self.grid.coords(idx);
        self.diffusants.insert(idx, coords, species, self.cycle);
    }

    /// Precipitates a solid product over whatever currently occupies `idx`
    /// (pore or consumed reactant), drawing its bound water from solution.
    pub fn precipitate(&mut self, idx: usize, product: u8) {
        self.set_voxel(idx, product);
        self.water_consumed_voxels += self.water_per_voxel(product);
        if product == phase::CSH {
            self.grid.csh_age[idx] = self.cycle as u16;
        }
    }

    /// Water drawn from solution per voxel of `product`, in voxel volumes.
    pub fn water_per_voxel(&self, product: u8) -> f64 {
        if product == phase::CSH {
            return self.csh_water * phase::WATER_MOLAR_VOLUME / self.csh_molarv;
        }
        let p = phase::props(product);
        p.water_demand * phase::WATER_MOLAR_VOLUME / p.molar_volume()
    }

    /// Heat credit for one voxel of a reacted phase.
    pub fn credit_heat(&mut self, reacted: u8) {
        let p = phase::props(reacted);
        self.heat_kj += p.heat_j_per_g * p.specific_gravity * self.voxel_cm3 / 1000.0;
    }

    /// Reaction heat per kilogram of cement.
    pub fn heat_kj_per_kg(&self) -> f64 {
        if self.init.cement_mass_g <= 0.0 {
            return 0.0;
        }
        self.heat_kj / (self.init.cement_mass_g / 1000.0)
    }

    /// Mass-based degree of hydration of the clinker.
    pub fn compute_alpha(&self) -> f64 {
        if self.init.clinker_mass_g <= 0.0 {
            return 0.0;
        }
        let remaining: f64 = [phase::C3S, phase::C2S, phase::C3A, phase::OC3A, phase::C4AF]
            .iter()
            .map(|&id| {
                self.counts[id as usize] as f64
                    * phase::props(id).specific_gravity
                    * self.voxel_cm3
            })
            .sum();
        (1.0 - remaining / self.init.clinker_mass_g).clamp(0.0, 1.0)
    }

    /// Mass-based degree of reaction of the fly-ash glasses.
    pub fn compute_alpha_fa(&self) -> f64 {
        if self.init.flyash_mass_g <= 0.0 {
            return 0.0;
        }
        let remaining: f64 = [phase::ASG, phase::CAS2, phase::AMSIL]
            .iter()
            .map(|&id| {
                self.counts[id as usize] as f64
                    * phase::props(id).specific_gravity
                    * self.voxel_cm3
            })
            .sum();
        (1.0 - remaining / self.init.flyash_mass_g).clamp(0.0, 1.0)
    }

    /// Chemical shrinkage [mL per g cement]: the volume deficit between
    /// reactants (solids + imbibed water) and products.
    pub fn chem_shrink(&self) -> f64 {
        if self.init.cement_mass_g <= 0.0 {
            return 0.0;
        }
        self.shrink_voxels.max(0.0) * self.voxel_cm3 / self.init.cement_mass_g
    }

    /// Recomputes the cumulative volume deficit from the current counts.
    pub fn update_shrinkage(&mut self) {
        let solid_now: u64 = (0..NPHASES as u8)
            .filter(|&id| phase::is_solid(id) || phase::is_diffusing(id))
            .map(|id| self.counts[id as usize])
            .sum();
        self.shrink_voxels = (self.init.solid_voxels as f64 - solid_now as f64)
            + self.water_consumed_voxels;
    }

    /// Non-evaporable water [g per g cement] bound in the current products.
    pub fn non_evaporable_water(&self) -> f64 {
        if self.init.cement_mass_g <= 0.0 {
            return 0.0;
        }
        let mut wn_g = 0.0;
        for id in 0..NPHASES as u8 {
            if !phase::is_solid(id) {
                continue;
            }
            let p = phase::props(id);
            if p.wn105 <= 0.0 {
                continue;
            }
            let moles = self.counts[id as usize] as f64 * self.voxel_cm3 / p.molar_volume();
            wn_g += p.wn105 * phase::WATER_MOLAR_MASS * moles;
        }
        wn_g / self.init.cement_mass_g
    }

    /// Gel/space ratio: hydration-product volume over product-plus-capillary
    /// volume.
    pub fn gel_space_ratio(&self) -> f64 {
        let products: u64 = [
            phase::CH,
            phase::CSH,
            phase::POZZCSH,
            phase::SLAGCSH,
            phase::C3AH6,
            phase::ETTR,
            phase::ETTRC4AF,
            phase::AFM,
            phase::AFMC,
            phase::FH3,
            phase::FRIEDEL,
            phase::STRAT,
            phase::GYPSUMS,
        ]
        .iter()
        .map(|&id| self.counts[id as usize])
        .sum();
        let capillary = self.counts[phase::POROSITY as usize]
            + self.counts[phase::EMPTYP as usize]
            + self.counts[phase::CRACKP as usize];
        let denom = products + capillary;
        if denom == 0 {
            0.0
        } else {
            products as f64 / denom as f64
        }
    }

    /// Water remaining in the capillary network, in voxel volumes.
    pub fn water_left_voxels(&self) -> f64 {
        self.counts[phase::POROSITY as usize] as f64 * WATER_PER_PORE_VOXEL
    }

    /// Sulfate currently in solution [mol], estimated from the diffusing
    /// sulfate carriers.
    pub fn so4_moles_in_solution(&self) -> f64 {
        let mut moles = 0.0;
        for &(id, per) in &[
            (phase::DIFFGYP, 1.0),
            (phase::DIFFANH, 1.0),
            (phase::DIFFHEM, 1.0),
            (phase::DIFFSO4, 1.0),
        ] {
            let p = phase::props(id);
            moles += per * self.counts[id as usize] as f64 * self.voxel_cm3 / p.molar_volume();
        }
        moles
    }

    /// Refreshes the pore-solution chemistry (pH, ions, alkali release).
    pub fn update_solution(&mut self) {
        let water_volume_cm3 =
            self.counts[phase::POROSITY as usize] as f64 * self.voxel_cm3;
        self.solution = alkali::predict(&PoreSolutionInput {
            binder_alkali: self.binder_alkali,
            flyash_alkali: self.flyash_alkali,
            cement_mass_g: self.init.cement_mass_g,
            flyash_mass_g: self.init.flyash_mass_g,
            alpha: self.alpha,
            water_volume_cm3,
            so4_moles: self.so4_moles_in_solution(),
            temp_c: self.thermal.temp_c,
        });
    }

    /// Rebuilds the per-phase dissolution probabilities and pH factors.
    pub fn update_rates(&mut self) {
        let conc_so4_mmol = self.solution.conc_so4 * 1000.0;
        let inputs = RateInputs {
            temp_c: self.thermal.temp_c,
            sealed: self.params.sealed,
            resolution_um: self.resolution_um,
            syspix: self.syspix() as f64,
            counts: self.counts,
            count_pore_initial: self.init.count_pore_initial,
            surffract: self.init.surffract,
            totfract: self.init.totfract,
            conc_so4_mmol,
            krate: kinetics::arrhenius_factor(self.params.e_act_hydration, self.thermal.temp_c, 25.0),
            kpozz: kinetics::arrhenius_factor(self.params.e_act_pozzolanic, self.thermal.temp_c, 25.0),
            kslag: kinetics::arrhenius_factor(self.params.e_act_slag, self.thermal.temp_c, 25.0),
        };
        self.kpozz_now = inputs.kpozz;
        let mut disbase = self.params.disbase.clone();
        if let Some(slag_base) = disbase.get_mut(&phase::SLAG) {
            *slag_base *= self.slag.reactivity;
        }
        self.disprob = kinetics::compute_disprob(&disbase, &inputs);

        // The pH influence waits for enough gel to buffer the solution.
        let ph_on = self.params.ph_active
            && self.counts[phase::CSH as usize] as f64
                > 1000.0 * self.syspix() as f64 / 1.0e6;
        self.ph_factor =
            kinetics::ph_factors(&self.params.ph_fits, self.solution.ph, conc_so4_mmol, ph_on);
    }

    /// Per-cycle CSH stoichiometry from the current temperature and pH
    /// state.
    pub fn update_csh_properties(&mut self) {
        let ph_on = self.params.ph_active && self.solution.ph > 13.0;
        self.csh_molarv = phase::csh_molar_volume(self.thermal.temp_c, ph_on);
        self.csh_water = phase::csh_water_demand(self.thermal.temp_c, ph_on);
    }

    /// Scheduled surface deactivation/reactivation (retarder simulation).
    pub fn apply_surface_schedule(&mut self) {
        let p = &self.params;
        if !self.deact_done && p.deact_time_hours >= 0.0 && self.time_hours >= p.deact_time_hours {
            let frac = p.deact_frac.clamp(0.0, 1.0);
            let stencil = crate::core::grid::stencil(6);
            let mut marked = 0u64;
            for idx in 0..self.syspix() {
                if !phase::is_solid(self.grid.mic[idx]) {
                    continue;
                }
                let exposed = stencil.iter().any(|&off| {
                    phase::is_water_pore(self.grid.mic[self.grid.neighbor(idx, off)])
                });
                if exposed && self.rng.chance(frac) {
                    self.grid.deactivate_all_faces(idx);
                    marked += 1;
                }
            }
            info!(marked, frac, "surface deactivation applied");
            self.deact_done = true;
        }
        if self.deact_done
            && !self.react_done
            && p.react_time_hours >= 0.0
            && self.time_hours >= p.react_time_hours
        {
            self.grid.reactivate_all();
            info!("surfaces reactivated");
            self.react_done = true;
        }
    }

    /// Self-desiccation: under sealed curing the cumulative shrinkage must
    /// be carried by emptied porosity; the most isolated water-filled pores
    /// (smallest surrounding pore count) empty first.
    pub fn self_desiccate(&mut self) {
        if !self.params.sealed {
            return;
        }
        let target = self.shrink_voxels.floor().max(0.0) as u64;
        let current =
            self.counts[phase::EMPTYP as usize].saturating_sub(self.init.count_pore_initial);
        if target <= current {
            return;
        }
        let deficit = (target - current) as usize;
        let half = self.params.boxsize.max(1);

        // Bounded insertion sort: keep only the `deficit` most isolated
        // candidates while scanning.
        let mut ranked: Vec<(usize, usize)> = Vec::with_capacity(deficit + 1);
        for idx in 0..self.syspix() {
            if self.grid.mic[idx] != phase::POROSITY {
                continue;
            }
            let (x, y, z) = self.grid.coords(idx);
            let density = self.grid.count_box(half, x, y, z);
            let pos = ranked.partition_point(|&(d, _)| d <= density);
            if pos < deficit {
                ranked.insert(pos, (density, idx));
                ranked.truncate(deficit);
            }
        }
        for (_, idx) in ranked {
            self.set_voxel(idx, phase::EMPTYP);
        }
    }

    /// Refreshes the per-cycle solubility switches.
    pub fn update_solubility(&mut self) {
        let mut soluble = [false; NPHASES];
        for &id in &[
            phase::GYPSUM,
            phase::HEMIHYD,
            phase::ANHYDRITE,
            phase::CH,
            phase::CACO3,
            phase::CACL2,
            phase::ASG,
            phase::CAS2,
            phase::FREELIME,
            phase::SLAG,
            phase::GYPSUMS,
            phase::C3A,
            phase::OC3A,
            phase::C4AF,
        ] {
            soluble[id as usize] = true;
        }

        // Silicates wait one cycle unless early aluminate products exist.
        let aluminates = self.counts[phase::ETTR as usize]
            + self.counts[phase::ETTRC4AF as usize]
            + self.counts[phase::AFM as usize]
            + self.counts[phase::C3AH6 as usize];
        if self.cycle >= 2 || aluminates > 0 {
            soluble[phase::C3S as usize] = true;
            soluble[phase::C2S as usize] = true;
        }

        // Ettringite becomes soluble once the primary sulfate sources are
        // three-quarters consumed, or at elevated temperature; it latches.
        let sulf_init = self.init.counts[phase::GYPSUM as usize]
            + self.init.counts[phase::HEMIHYD as usize]
            + self.init.counts[phase::ANHYDRITE as usize];
        let sulf_now = self.counts[phase::GYPSUM as usize]
            + self.counts[phase::HEMIHYD as usize]
            + self.counts[phase::ANHYDRITE as usize];
        if !self.ettr_soluble {
            let consumed = sulf_init == 0
                || (sulf_init - sulf_now.min(sulf_init)) as f64 >= 0.75 * sulf_init as f64;
            if consumed || self.thermal.temp_c >= 70.0 {
                self.ettr_soluble = true;
            }
        }
        soluble[phase::ETTR as usize] = self.ettr_soluble;
        soluble[phase::ETTRC4AF as usize] = self.ettr_soluble;

        // Hydrogarnet redissolves while gypsum remains to convert it, or
        // once substantial ettringite exists.
        let gypsum_family = self.counts[phase::GYPSUM as usize]
            + self.counts[phase::GYPSUMS as usize]
            + self.counts[phase::ABSGYP as usize];
        soluble[phase::C3AH6 as usize] =
            gypsum_family > 0 || self.counts[phase::ETTR as usize] > 500;

        self.soluble = soluble;
    }

    /// Nucleation probability `p_nuc + p_scale · seed/syspix`, clamped.
    pub fn nucleation_prob(&self, p_nuc: f64, p_scale: f64, seed_count: u64) -> f64 {
        (p_nuc + p_scale * seed_count as f64 / self.syspix() as f64).min(1.0)
    }

    /// Tries to place a solid product near `near_idx` (offsets within
    /// `±spread`), falling back to a uniformly random water-filled pore.
    pub fn try_place_solid(&mut self, product: u8, near_idx: usize, spread: i32) -> bool {
        let (cx, cy, cz) = self.grid.coords(near_idx);
        for _ in 0..8 {
            let dx = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let dy = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let dz = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let idx = self
                .grid
                .index_wrapped(cx as i32 + dx, cy as i32 + dy, cz as i32 + dz);
            if phase::is_water_pore(self.grid.mic[idx]) {
                self.precipitate(idx, product);
                return true;
            }
        }
        for _ in 0..100 {
            let idx = self.rng.index(self.syspix());
            if self.grid.mic[idx] == phase::POROSITY {
                self.precipitate(idx, product);
                return true;
            }
        }
        false
    }

    /// Places `expected` voxels of extra product (stochastic rounding),
    /// counting unplaceable remainders as anomalies.
    pub fn place_extra_product(&mut self, product: u8, near_idx: usize, spread: i32, expected: f64) {
        let mut n = expected.floor() as usize;
        if self.rng.chance(expected.fract()) {
            n += 1;
        }
        for _ in 0..n {
            if !self.try_place_solid(product, near_idx, spread) {
                self.anomalies += 1;
            }
        }
    }

    /// Spawns a balance diffusant at a random water-filled pore voxel.
    pub fn spawn_diffusant_at_random_pore(&mut self, species: u8) -> bool {
        for _ in 0..1000 {
            let idx = self.rng.index(self.syspix());
            if self.grid.mic[idx] == phase::POROSITY {
                self.spawn_diffusant(idx, species);
                return true;
            }
        }
        self.anomalies += 1;
        false
    }

    /// Spawns an extra diffusant near a dissolution site (`loccsh`
    /// placement), falling back to a random pore.
    pub fn spawn_diffusant_near(&mut self, species: u8, near_idx: usize, spread: i32) -> bool {
        let (cx, cy, cz) = self.grid.coords(near_idx);
        for _ in 0..8 {
            let dx = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let dy = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let dz = self.rng.index((2 * spread + 1) as usize) as i32 - spread;
            let idx = self
                .grid
                .index_wrapped(cx as i32 + dx, cy as i32 + dy, cz as i32 + dz);
            if phase::is_water_pore(self.grid.mic[idx]) {
                self.spawn_diffusant(idx, species);
                return true;
            }
        }
        self.spawn_diffusant_at_random_pore(species)
    }
}

fn capture_initial(
    grid: &Grid,
    counts: &[u64; NPHASES],
    voxel_cm3: f64,
    neighbors: usize,
) -> InitialState {
    let syspix = grid.syspix() as f64;
    let mass_of = |id: u8| -> f64 {
        counts[id as usize] as f64 * phase::props(id).specific_gravity * voxel_cm3
    };

    let clinker_mass_g: f64 = [phase::C3S, phase::C2S, phase::C3A, phase::OC3A, phase::C4AF]
        .iter()
        .map(|&id| mass_of(id))
        .sum();
    let cement_mass_g = clinker_mass_g
        + [
            phase::GYPSUM,
            phase::HEMIHYD,
            phase::ANHYDRITE,
            phase::K2SO4,
            phase::NA2SO4,
            phase::FREELIME,
        ]
        .iter()
        .map(|&id| mass_of(id))
        .sum::<f64>();
    let flyash_mass_g: f64 = [phase::ASG, phase::CAS2, phase::AMSIL]
        .iter()
        .map(|&id| mass_of(id))
        .sum();
    let water_mass_g = mass_of(phase::POROSITY);

    let stencil = crate::core::grid::stencil(neighbors);
    let mut solids = 0u64;
    let mut surface = 0u64;
    for idx in 0..grid.syspix() {
        if !phase::is_solid(grid.mic[idx]) {
            continue;
        }
        solids += 1;
        if stencil
            .iter()
            .any(|&off| phase::is_water_pore(grid.mic[grid.neighbor(idx, off)]))
        {
            surface += 1;
        }
    }

    let solid_voxels: u64 = (0..NPHASES as u8)
        .filter(|&id| phase::is_solid(id) || phase::is_diffusing(id))
        .map(|id| counts[id as usize])
        .sum();

    InitialState {
        counts: *counts,
        totfract: counts[phase::POROSITY as usize] as f64 / syspix,
        surffract: if solids > 0 { surface as f64 / solids as f64 } else { 0.0 },
        count_pore_initial: counts[phase::EMPTYP as usize],
        cement_mass_g,
        clinker_mass_g,
        flyash_mass_g,
        water_mass_g,
        solid_voxels,
    }
}
