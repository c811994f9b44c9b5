//! Thermal/calorimetric submodel and the cycle → real-time mapping.

use crate::chemistry::kinetics::arrhenius_factor;
use crate::io::aux_data::{CalibrationCurve, TempProfile};
use crate::io::params::TempMode;
use crate::math::{linear_regression, quadratic_through};
use crate::SimError;
use anyhow::Result;
use tracing::warn;

/// Specific heats [J/(g·K)].
pub const CP_CEMENT: f64 = 0.75;
pub const CP_WATER: f64 = 4.18;
pub const CP_AGGREGATE: f64 = 0.84;

/// Binder–aggregate heat-exchange rate [fraction of the equilibrating heat
/// per hour]; the analytic cap below keeps any single step from overshooting
/// thermal equality, which is the dampening the two-body update needs.
const EXCHANGE_RATE_PER_HOUR: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct ThermalState {
    pub mode: TempMode,
    pub temp_c: f64,
    pub agg_temp_c: f64,
    /// Binder heat capacity [J/K] (cement + mix water).
    pub cp_binder: f64,
    /// Aggregate heat capacity [J/K]; zero when no aggregate is present.
    pub cp_agg: f64,
    pub u_coeff: f64,
    pub ambient_c: f64,
    pub profile: Option<TempProfile>,
}

impl ThermalState {
    pub fn new(
        mode: TempMode,
        temp_0_c: f64,
        agg_temp_0_c: f64,
        cement_mass_g: f64,
        water_mass_g: f64,
        agg_mass_g: f64,
        u_coeff: f64,
        ambient_c: f64,
        profile: Option<TempProfile>,
    ) -> Self {
        ThermalState {
            mode,
            temp_c: temp_0_c,
            agg_temp_c: agg_temp_0_c,
            cp_binder: CP_CEMENT * cement_mass_g + CP_WATER * water_mass_g,
            cp_agg: CP_AGGREGATE * agg_mass_g,
            u_coeff,
            ambient_c,
            profile,
        }
    }

    /// Advances the binder (and aggregate) temperature across one cycle.
    /// `delta_heat_kj` is the hydration heat released during the cycle.
    pub fn update(&mut self, delta_heat_kj: f64, dt_hours: f64, time_hours: f64) {
        match self.mode {
            TempMode::Isothermal => {}
            TempMode::Profile => {
                if let Some(profile) = &self.profile {
                    self.temp_c = profile.temp_at(time_hours);
                }
            }
            TempMode::Adiabatic => {
                if self.cp_binder > 0.0 {
                    self.temp_c += delta_heat_kj * 1000.0 / self.cp_binder;
                }
                if self.cp_agg > 0.0 {
                    let diff = self.temp_c - self.agg_temp_c;
                    let equalising =
                        diff * self.cp_binder * self.cp_agg / (self.cp_binder + self.cp_agg);
                    let q = equalising * (EXCHANGE_RATE_PER_HOUR * dt_hours).min(1.0);
                    self.temp_c -= q / self.cp_binder;
                    self.agg_temp_c += q / self.cp_agg;
                }
                if self.u_coeff > 0.0 && self.cp_binder > 0.0 {
                    self.temp_c -=
                        (self.temp_c - self.ambient_c) * dt_hours * self.u_coeff / self.cp_binder;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    Calorimetric,
    ChemicalShrinkage,
}

#[derive(Debug, Clone)]
pub enum TimeMapping {
    /// `dt_k = (2k − 1)·β / K_T` — the parabolic kinetic mapping.
    Beta { beta: f64 },
    /// Inverse interpolation of an experimental series measured at
    /// `ref_temp_c`, corrected to the current temperature.
    Curve {
        curve: CalibrationCurve,
        ref_temp_c: f64,
        kind: CurveKind,
    },
}

#[derive(Debug, Clone)]
pub struct TimeKeeper {
    mapping: TimeMapping,
    ea_kj_mol: f64,
    last_uncorrected_h: f64,
    warned_extrapolating: bool,
    warned_quadratic: bool,
}

impl TimeKeeper {
    pub fn new(mapping: TimeMapping, ea_kj_mol: f64) -> Self {
        TimeKeeper {
            mapping,
            ea_kj_mol,
            last_uncorrected_h: 0.0,
            warned_extrapolating: false,
            warned_quadratic: false,
        }
    }

    pub fn curve_kind(&self) -> Option<CurveKind> {
        match &self.mapping {
            TimeMapping::Curve { kind, .. } => Some(*kind),
            TimeMapping::Beta { .. } => None,
        }
    }

    /// Time-step for the cycle just completed. `measured_value` is the
    /// simulated observable matching the calibration series (cumulative heat
    /// or chemical shrinkage); `history` is the corrected `(cycle, hours)`
    /// trace so far.
    pub fn advance(
        &mut self,
        cycle: u32,
        temp_c: f64,
        measured_value: f64,
        history: &[(u32, f64)],
    ) -> Result<f64> {
        let interpolated = match &self.mapping {
            TimeMapping::Beta { beta } => {
                let k_t = arrhenius_factor(self.ea_kj_mol, temp_c, 25.0);
                return Ok((2.0 * cycle as f64 - 1.0) * beta / k_t);
            }
            TimeMapping::Curve {
                curve, ref_temp_c, ..
            } => {
                let k_cal = arrhenius_factor(self.ea_kj_mol, temp_c, *ref_temp_c);
                curve.time_at(measured_value).map(|t_star| (t_star, k_cal))
            }
        };
        if let Some((t_star, k_cal)) = interpolated {
            let dt_uncorrected = (t_star - self.last_uncorrected_h).max(1.0e-4);
            self.last_uncorrected_h = t_star;
            return Ok(dt_uncorrected / k_cal);
        }
        // Ran off the end of the measured series: extrapolate the corrected
        // time history itself.
        if !self.warned_extrapolating {
            warn!(
                cycle,
                "calibration series exhausted, extrapolating the time history"
            );
            self.warned_extrapolating = true;
        }
        self.extrapolate(cycle, history)
    }

    fn extrapolate(&mut self, cycle: u32, history: &[(u32, f64)]) -> Result<f64> {
        let n = history.len();
        if n >= 3 {
            let p: Vec<(f64, f64)> = history[n - 3..]
                .iter()
                .map(|&(c, t)| (c as f64, t))
                .collect();
            if let Some((a, b, c0)) = quadratic_through(&[p[0], p[1], p[2]]) {
                if a > 0.0 {
                    let next = history[n - 1].0 as f64 + 1.0;
                    let t_next = a * next * next + b * next + c0;
                    let dt = t_next - history[n - 1].1;
                    if dt > 0.0 {
                        return Ok(dt);
                    }
                } else if !self.warned_quadratic {
                    warn!(cycle, "quadratic extrapolation degenerate, using linear fallback");
                    self.warned_quadratic = true;
                }
            }
        }
        // Linear fallback over the recent trace.
        let tail = &history[n.saturating_sub(5)..];
        let xs: Vec<f64> = tail.iter().map(|&(c, _)| c as f64).collect();
        let ys: Vec<f64> = tail.iter().map(|&(_, t)| t).collect();
        let dt = linear_regression(&xs, &ys).map(|(slope, _)| slope).unwrap_or(0.0);
        if dt > 0.0 {
            Ok(dt)
        } else {
            Err(SimError::DegenerateTimeStep.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beta_steps_grow_linearly_in_cycle() {
        let mut keeper = TimeKeeper::new(TimeMapping::Beta { beta: 0.00035 }, 40.0);
        let d1 = keeper.advance(1, 25.0, 0.0, &[]).unwrap();
        let d2 = keeper.advance(2, 25.0, 0.0, &[]).unwrap();
        assert!((d2 / d1 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn beta_steps_shrink_when_hot() {
        let mut keeper = TimeKeeper::new(TimeMapping::Beta { beta: 0.00035 }, 40.0);
        let cold = keeper.advance(1, 25.0, 0.0, &[]).unwrap();
        let hot = keeper.advance(1, 45.0, 0.0, &[]).unwrap();
        assert!(hot < cold);
    }

    #[test]
    fn curve_interpolates_then_extrapolates() {
        let curve = CalibrationCurve {
            points: vec![(0.0, 0.0), (2.0, 50.0), (6.0, 100.0)],
        };
        let mut keeper = TimeKeeper::new(
            TimeMapping::Curve {
                curve,
                ref_temp_c: 25.0,
                kind: CurveKind::Calorimetric,
            },
            40.0,
        );
        let mut history = vec![(0u32, 0.0f64)];
        let d1 = keeper.advance(1, 25.0, 25.0, &history).unwrap();
        assert!((d1 - 1.0).abs() < 1e-9);
        history.push((1, d1));
        let d2 = keeper.advance(2, 25.0, 75.0, &history).unwrap();
        assert!(d2 > 0.0);
        history.push((2, history[1].1 + d2));
        // Past the end of the series: still strictly positive steps.
        let d3 = keeper.advance(3, 25.0, 150.0, &history).unwrap();
        assert!(d3 > 0.0);
    }

    #[test]
    fn adiabatic_update_heats_the_binder_and_drags_the_aggregate() {
        let mut t = ThermalState::new(
            TempMode::Adiabatic,
            25.0,
            20.0,
            300.0,
            120.0,
            500.0,
            0.0,
            25.0,
            None,
        );
        t.update(5.0, 0.5, 0.0);
        assert!(t.temp_c > 25.0);
        assert!(t.agg_temp_c > 20.0);
        // Exchange never overshoots: binder stays at or above aggregate here.
        assert!(t.temp_c >= t.agg_temp_c);
    }

    #[test]
    fn isothermal_mode_pins_the_temperature() {
        let mut t = ThermalState::new(
            TempMode::Isothermal,
            25.0,
            25.0,
            300.0,
            120.0,
            0.0,
            0.0,
            25.0,
            None,
        );
        t.update(50.0, 1.0, 0.0);
        assert_eq!(t.temp_c, 25.0);
    }
}
