//! The main cycle loop: invokes the stages in their required order and
//! produces every output of the run.

use crate::analysis::{percolation, poresize};
use crate::chemistry::thermal::CurveKind;
use crate::core::phase;
use crate::engine::state::Simulation;
use crate::io::microstructure;
use crate::io::output::{self, DataRow, DataWriter, OutputPaths, RunSummary};
use anyhow::Result;
use std::path::Path;
use tracing::{debug, info};

/// Probe/output schedule positions, all in simulated hours.
struct Schedule {
    next_burn: f64,
    next_set: f64,
    next_phyd: f64,
    next_movie: f64,
    next_image: f64,
}

impl Simulation {
    pub fn run(&mut self, paths: &OutputPaths, progress_path: &Path) -> Result<RunSummary> {
        let mut writer = DataWriter::create(&paths.data_csv())?;
        let mut schedule = Schedule {
            next_burn: 0.0,
            next_set: 0.0,
            next_phyd: self.params.phyd_freq_hours,
            next_movie: self.params.movie_freq_hours,
            next_image: self.params.image_freq_hours,
        };
        let mut last_dt = 0.0f64;
        let mut heat_prev = 0.0f64;

        // Pre-simulation probes and data row (cycle 0).
        self.probe_pore_percolation(&mut schedule);
        self.probe_set_point(&mut schedule);
        writer.append(&self.build_row())?;
        output::write_progress(progress_path, 0, 0.0, self.alpha)?;

        let mut status = "cycle budget reached";
        for cycle in 1..=self.params.ncyc {
            if self.alpha >= self.params.alpha_max {
                status = "target degree of hydration reached";
                break;
            }
            if self.time_hours >= self.params.end_time_hours {
                status = "end time reached";
                break;
            }
            self.cycle = cycle;

            self.apply_surface_schedule();
            self.update_csh_properties();
            self.dissolve();
            self.hydrate();

            self.alpha = self.compute_alpha();
            self.alpha_fa = self.compute_alpha_fa();
            self.update_shrinkage();
            let delta_heat = self.heat_kj - heat_prev;
            heat_prev = self.heat_kj;

            self.update_rates();
            self.thermal
                .update(delta_heat, last_dt.max(1e-6), self.time_hours);

            let measured = match self.timekeeper.curve_kind() {
                Some(CurveKind::Calorimetric) => self.heat_kj_per_kg(),
                Some(CurveKind::ChemicalShrinkage) => self.chem_shrink(),
                None => 0.0,
            };
            let dt = self.timekeeper.advance(
                cycle,
                self.thermal.temp_c,
                measured,
                &self.time_history,
            )?;
            self.time_hours += dt;
            self.time_history.push((cycle, self.time_hours));
            last_dt = dt;

            self.update_solution();

            self.probe_pore_percolation(&mut schedule);
            self.probe_set_point(&mut schedule);
            if self.params.phyd_freq_hours > 0.0 && self.time_hours >= schedule.next_phyd {
                let rows = self.particles.snapshot(&self.grid);
                output::append_particle_rows(
                    &paths.particle_hydration(),
                    cycle,
                    self.time_hours,
                    &rows,
                )?;
                schedule.next_phyd += self.params.phyd_freq_hours;
            }

            if self.maybe_crack() {
                // Geometry changed: connectivity state is stale until the
                // next probe.
                debug!("re-probing percolation after crack insertion");
                schedule.next_burn = self.time_hours;
                self.probe_pore_percolation(&mut schedule);
            }

            if self.params.movie_freq_hours > 0.0 && self.time_hours >= schedule.next_movie {
                microstructure::append_movie_frame(
                    &paths.movie(),
                    self.grid.nx,
                    self.grid.ny,
                    self.grid.nz,
                    self.resolution_mm,
                    &self.grid.mic,
                )?;
                schedule.next_movie += self.params.movie_freq_hours;
            }

            let scheduled_image =
                self.params.image_freq_hours > 0.0 && self.time_hours >= schedule.next_image;
            let custom_image = self
                .custom_alphas
                .get(self.next_custom_alpha)
                .is_some_and(|&a| self.alpha >= a);
            if scheduled_image || custom_image {
                self.write_snapshot(paths, cycle)?;
                if scheduled_image {
                    schedule.next_image += self.params.image_freq_hours;
                }
                while self
                    .custom_alphas
                    .get(self.next_custom_alpha)
                    .is_some_and(|&a| self.alpha >= a)
                {
                    self.next_custom_alpha += 1;
                }
            }

            writer.append(&self.build_row())?;
            if cycle % 10 == 0 {
                output::write_progress(progress_path, cycle, self.time_hours, self.alpha)?;
            }

            if self.params.sealed && self.water_left_voxels() <= 0.0 {
                status = "pore water exhausted under sealed curing";
                break;
            }
        }
        info!(
            status,
            cycle = self.cycle,
            alpha = self.alpha,
            time_h = self.time_hours,
            anomalies = self.anomalies,
            "run finished"
        );

        // Finalise: refresh the counters, dump the final microstructure and
        // the time history.
        self.refresh_counts();
        microstructure::write_snapshot(
            &paths.final_structure(),
            self.grid.nx,
            self.grid.ny,
            self.grid.nz,
            self.resolution_mm,
            &self.grid.mic,
        )?;
        output::write_history(&paths.history(), &self.time_history)?;
        output::write_progress(progress_path, self.cycle, self.time_hours, self.alpha)?;

        Ok(RunSummary {
            status: "complete".to_string(),
            degree_of_hydration: self.alpha,
            final_temperature_c: self.thermal.temp_c,
            final_ph: self.solution.ph,
            outputs: paths.produced_files(),
        })
    }

    fn probe_pore_percolation(&mut self, schedule: &mut Schedule) {
        if self.params.burn_freq_hours <= 0.0 || self.time_hours < schedule.next_burn {
            return;
        }
        let mut fractions = [0.0f64; 4];
        for axis in 0..3 {
            let r = percolation::burn3d(&self.grid, phase::POROSITY, phase::CRACKP, axis);
            fractions[axis] = r.connected_fraction;
        }
        fractions[3] = (fractions[0] + fractions[1] + fractions[2]) / 3.0;
        self.burn.pore = fractions;
        schedule.next_burn = self.time_hours + self.params.burn_freq_hours;
    }

    /// Solid percolation, probed only until each direction has set.
    fn probe_set_point(&mut self, schedule: &mut Schedule) {
        if self.params.set_freq_hours <= 0.0
            || self.time_hours < schedule.next_set
            || self.burn.set_flags.iter().all(|&f| f)
        {
            return;
        }
        for axis in 0..3 {
            if self.burn.set_flags[axis] {
                continue;
            }
            let r = percolation::burnset(&self.grid, axis);
            self.burn.solid[axis] = r.connected_fraction;
            if r.spans {
                self.burn.set_flags[axis] = true;
                info!(axis, cycle = self.cycle, "solid percolation reached");
            }
        }
        self.burn.solid[3] =
            (self.burn.solid[0] + self.burn.solid[1] + self.burn.solid[2]) / 3.0;
        schedule.next_set = self.time_hours + self.params.set_freq_hours;
    }

    fn write_snapshot(&self, paths: &OutputPaths, cycle: u32) -> Result<()> {
        let img = paths.snapshot(cycle);
        microstructure::write_snapshot(
            &img,
            self.grid.nx,
            self.grid.ny,
            self.grid.nz,
            self.resolution_mm,
            &self.grid.mic,
        )?;
        let name = img
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        output::append_image_index(&paths.image_index(), self.time_hours, &name)?;
        output::write_pore_size(&paths.pore_size(cycle), &poresize::distribution(&self.grid))?;
        Ok(())
    }

    fn build_row(&self) -> DataRow {
        let syspix = self.syspix() as f64;
        let pore_fraction = (self.counts[phase::POROSITY as usize]
            + self.counts[phase::EMPTYP as usize]
            + self.counts[phase::CRACKP as usize]) as f64
            / syspix;
        let wno = self.non_evaporable_water();
        let mut phase_fractions = Vec::with_capacity(phase::EMPTYP as usize + 1);
        for id in 0..=phase::EMPTYP {
            phase_fractions.push(self.counts[id as usize] as f64 / syspix);
        }
        DataRow {
            cycle: self.cycle,
            time_hours: self.time_hours,
            alpha_mass: self.alpha,
            alpha_fa_mass: self.alpha_fa,
            heat_kj_per_kg: self.heat_kj_per_kg(),
            temp_c: self.thermal.temp_c,
            gsratio: self.gel_space_ratio(),
            wno,
            wni: wno * self.init.cement_mass_g / self.ignited_cement_mass_g(),
            chem_shrink: self.chem_shrink(),
            ph: self.solution.ph,
            conductivity: self.solution.conductivity,
            conc_na: self.solution.conc_na,
            conc_k: self.solution.conc_k,
            conc_ca: self.solution.conc_ca,
            conc_so4: self.solution.conc_so4,
            gamma_na: self.solution.gamma_na,
            gamma_k: self.solution.gamma_k,
            gamma_ca: self.solution.gamma_ca,
            gamma_oh: self.solution.gamma_oh,
            pore_fraction,
            con_pore: self.burn.pore,
            con_solid: self.burn.solid,
            phase_fractions,
        }
    }

    /// Cement mass on the ignited basis: the as-ground mass less the water
    /// carried by the calcium sulfate carriers.
    fn ignited_cement_mass_g(&self) -> f64 {
        let water_of = |id: u8, moles_h2o: f64| -> f64 {
            let p = phase::props(id);
            self.init.counts[id as usize] as f64 * self.voxel_cm3 / p.molar_volume()
                * moles_h2o
                * phase::WATER_MOLAR_MASS
        };
        let bound = water_of(phase::GYPSUM, 2.0) + water_of(phase::HEMIHYD, 0.5);
        (self.init.cement_mass_g - bound).max(1e-12)
    }
}
