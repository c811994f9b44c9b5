//! The dissolution-rate controller.
//!
//! Once per cycle the controller rebuilds the per-phase dissolution
//! probabilities from their configured bases, folding in temperature
//! (Arrhenius), the CSH-controlled induction period, sealed-curing
//! saturation, solution pH and sulfate activity, the diffusing-pool caps and
//! the lattice resolution.

use crate::core::phase::{self, NPHASES};
use crate::io::params::PhFit;
use crate::math::quadratic_through;
use std::collections::BTreeMap;

pub const GAS_CONSTANT: f64 = 8.314; // J/(mol·K)

/// Capillary porosity fraction of a w/c = 0.40 paste; reference point for
/// every size- and dilution-dependent scaling in the controller.
pub const TFRACTW04: f64 = 0.438596;

/// CH-solubility temperature dependence `(A0 - A1·T)` driving the end of the
/// induction period.
pub const A0_CHSOL: f64 = 1.325;
pub const A1_CHSOL: f64 = 0.008162;

/// Dissolution-probability floors keeping the silicates nucleation-capable
/// through the induction period.
pub const DISMIN_C3S: f64 = 0.001;
pub const DISMIN_C2S: f64 = 0.00025;

/// CSH / pozzolanic-CSH counts at which the induction factor saturates, for
/// a 10^6-voxel system.
pub const CSH_SCALE: f64 = 70000.0;
pub const POZZCSH_SCALE: f64 = 70000.0;

/// Diffusing-pool caps for a 10^6-voxel w/c = 0.40 system; when the pool of
/// a species exceeds its adjusted cap, the source phase stops dissolving.
pub const DETTRMAX: f64 = 1200.0;
pub const DGYPMAX: f64 = 2000.0;
pub const DCACO3MAX: f64 = 1000.0;
pub const DCACL2MAX: f64 = 2000.0;
pub const DCAS2MAX: f64 = 2000.0;
pub const DASMAX: f64 = 2000.0;

/// Sealed-curing saturation quench applies once the water-accessible
/// porosity falls below this fraction of the system.
pub const SATURATION_ONSET: f64 = 0.22;

/// `exp(-(Ea/R)·(1/T - 1/T_ref))` with `Ea` in kJ/mol and temperatures in °C.
pub fn arrhenius_factor(ea_kj_mol: f64, temp_c: f64, ref_temp_c: f64) -> f64 {
    let t = temp_c + 273.15;
    let t_ref = ref_temp_c + 273.15;
    (-(ea_kj_mol * 1000.0 / GAS_CONSTANT) * (1.0 / t - 1.0 / t_ref)).exp()
}

/// Sulfate-activity accelerator on the silicate induction term: inert below
/// 10 mmol/L, ramping linearly to the logarithmic regime at 20 mmol/L.
pub fn sulfate_accelerator(conc_so4_mmol: f64) -> f64 {
    if conc_so4_mmol < 10.0 {
        1.0
    } else if conc_so4_mmol < 20.0 {
        let high = 1.0 + 20f64.log10();
        1.0 + (high - 1.0) * (conc_so4_mmol - 10.0) / 10.0
    } else {
        1.0 + conc_so4_mmol.log10()
    }
}

/// Per-phase pH multipliers evaluated from the user-supplied three-point
/// fits. Inactive (all ones) until enough CSH exists for the solution to be
/// buffered by the gel.
pub fn ph_factors(
    fits: &BTreeMap<u8, PhFit>,
    ph: f64,
    conc_so4_mmol: f64,
    active: bool,
) -> [f64; NPHASES] {
    let mut out = [1.0; NPHASES];
    if !active {
        return out;
    }
    for (&id, fit) in fits {
        let Some((c2, c1, c0)) = quadratic_through(&fit.points) else {
            continue;
        };
        let mut f = c2 * ph * ph + c1 * ph + c0 - fit.sulf_coeff * conc_so4_mmol;
        if id == phase::SFUME || id == phase::ASG {
            // Pozzolan response is only trusted inside the fitted window.
            let lo = fit.points[0].1.min(fit.points[2].1);
            let hi = fit.points[0].1.max(fit.points[2].1);
            f = f.clamp(lo, hi);
        }
        out[id as usize] = f.max(0.0);
        // The amorphous silicas share a dissolution chemistry.
        if id == phase::SFUME {
            out[phase::AMSIL as usize] = out[id as usize];
        }
        if id == phase::GYPSUM {
            out[phase::GYPSUMS as usize] = out[id as usize];
            out[phase::HEMIHYD as usize] = out[id as usize];
            out[phase::ANHYDRITE as usize] = out[id as usize];
        }
    }
    out
}

/// Everything the controller reads when rebuilding the probabilities.
#[derive(Debug, Clone)]
pub struct RateInputs {
    pub temp_c: f64,
    pub sealed: bool,
    pub resolution_um: f64,
    pub syspix: f64,
    pub counts: [u64; NPHASES],
    /// EMPTYP voxels present in the initial microstructure (never held mix
    /// water, excluded from the saturation denominator).
    pub count_pore_initial: u64,
    /// Fraction of initial solids exposed to water at cycle 1.
    pub surffract: f64,
    /// Initial water-filled porosity fraction of the system.
    pub totfract: f64,
    pub conc_so4_mmol: f64,
    /// Arrhenius factors for clinker hydration, pozzolanic and slag
    /// reactions at the current binder temperature.
    pub krate: f64,
    pub kpozz: f64,
    pub kslag: f64,
}

impl RateInputs {
    fn count(&self, id: u8) -> f64 {
        self.counts[id as usize] as f64
    }

    /// Scales a 10^6-voxel reference quantity to this system's size and
    /// current water-filled porosity.
    pub fn size_scale(&self) -> f64 {
        let pore_frac = self.count(phase::POROSITY) / self.syspix;
        (self.syspix / 1.0e6) * (pore_frac / TFRACTW04).max(1e-3)
    }
}

/// Rebuilds `disprob` from the configured `disbase` values.
pub fn compute_disprob(disbase: &BTreeMap<u8, f64>, inp: &RateInputs) -> [f64; NPHASES] {
    let mut prob = [0.0; NPHASES];
    let resfact = (1.0 / inp.resolution_um).powf(1.25);

    for (&id, &base) in disbase {
        let thermal = match id {
            phase::SLAG => inp.kslag,
            phase::ASG | phase::CAS2 => inp.kpozz,
            _ => inp.krate,
        };
        prob[id as usize] = base * resfact * thermal;
    }

    // Induction period: the silicates stay quiet until CSH accumulates.
    let f = ((inp.count(phase::CSH) / (CSH_SCALE * inp.syspix / 1.0e6)
        + inp.count(phase::POZZCSH) / (POZZCSH_SCALE * inp.syspix / 1.0e6))
        * TFRACTW04
        / (inp.surffract * inp.totfract).max(1e-6))
    .min(1.0);
    let induction = (A0_CHSOL - A1_CHSOL * inp.temp_c).max(0.0)
        * f
        * f
        * sulfate_accelerator(inp.conc_so4_mmol);
    prob[phase::C3S as usize] =
        (prob[phase::C3S as usize] * induction).max(DISMIN_C3S * resfact);
    prob[phase::C2S as usize] =
        (prob[phase::C2S as usize] * induction).max(DISMIN_C2S * resfact);

    // Sealed curing: reactions starve as the remaining water retreats into
    // ever finer porosity.
    let water = inp.count(phase::POROSITY);
    let empty = inp.count(phase::EMPTYP);
    if inp.sealed && water + empty < SATURATION_ONSET * inp.syspix {
        let denom = (water + empty - inp.count_pore_initial as f64).max(1.0);
        let s = (water / denom).clamp(0.0, 1.0);
        prob[phase::C3S as usize] *= s.powi(19);
        prob[phase::C2S as usize] *= s.powi(29);
        prob[phase::C3A as usize] *= s.powi(6);
        prob[phase::OC3A as usize] *= s.powi(6);
        prob[phase::C4AF as usize] *= s.powi(6);
        prob[phase::CH as usize] *= s.powi(19);
    }

    // Diffusing-pool saturation: a full pool shuts off its source phase.
    let scale = inp.size_scale();
    let over = |diff_id: u8, cap: f64| inp.count(diff_id) > cap * scale;
    if over(phase::DIFFETTR, DETTRMAX) {
        prob[phase::ETTR as usize] = 0.0;
    }
    if over(phase::DIFFGYP, DGYPMAX) {
        prob[phase::GYPSUM as usize] = 0.0;
        prob[phase::GYPSUMS as usize] = 0.0;
        prob[phase::HEMIHYD as usize] = 0.0;
        prob[phase::ANHYDRITE as usize] = 0.0;
    }
    if over(phase::DIFFCACO3, DCACO3MAX) {
        prob[phase::CACO3 as usize] = 0.0;
    }
    if over(phase::DIFFCACL2, DCACL2MAX) {
        prob[phase::CACL2 as usize] = 0.0;
    }
    if over(phase::DIFFCAS2, DCAS2MAX) {
        prob[phase::CAS2 as usize] = 0.0;
    }
    if over(phase::DIFFAS, DASMAX) {
        prob[phase::ASG as usize] = 0.0;
    }

    for p in prob.iter_mut() {
        *p = p.clamp(0.0, 1.0);
    }
    prob
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> RateInputs {
        let mut counts = [0u64; NPHASES];
        counts[phase::POROSITY as usize] = 400_000;
        RateInputs {
            temp_c: 25.0,
            sealed: false,
            resolution_um: 1.0,
            syspix: 1.0e6,
            counts,
            count_pore_initial: 0,
            surffract: 0.10,
            totfract: 0.42,
            conc_so4_mmol: 0.0,
            krate: 1.0,
            kpozz: 1.0,
            kslag: 1.0,
        }
    }

    fn base() -> BTreeMap<u8, f64> {
        let mut m = BTreeMap::new();
        m.insert(phase::C3S, 0.7);
        m.insert(phase::C2S, 0.1);
        m.insert(phase::C3A, 0.4);
        m.insert(phase::GYPSUM, 0.9);
        m.insert(phase::ETTR, 0.2);
        m
    }

    #[test]
    fn arrhenius_is_unity_at_reference() {
        assert!((arrhenius_factor(40.0, 25.0, 25.0) - 1.0).abs() < 1e-12);
        assert!(arrhenius_factor(40.0, 40.0, 25.0) > 1.0);
        assert!(arrhenius_factor(40.0, 10.0, 25.0) < 1.0);
    }

    #[test]
    fn induction_holds_silicates_at_the_floor_until_csh_forms() {
        let inp = inputs();
        let prob = compute_disprob(&base(), &inp);
        assert!((prob[phase::C3S as usize] - DISMIN_C3S).abs() < 1e-9);

        let mut grown = inputs();
        grown.counts[phase::CSH as usize] = 50_000;
        let prob2 = compute_disprob(&base(), &grown);
        assert!(prob2[phase::C3S as usize] > 10.0 * prob[phase::C3S as usize]);
    }

    #[test]
    fn sealed_saturation_quenches_once_water_gets_scarce() {
        let mut inp = inputs();
        inp.sealed = true;
        inp.counts[phase::POROSITY as usize] = 100_000;
        inp.counts[phase::EMPTYP as usize] = 100_000;
        inp.counts[phase::CSH as usize] = 200_000;
        let quenched = compute_disprob(&base(), &inp);

        inp.sealed = false;
        let open = compute_disprob(&base(), &inp);
        assert!(quenched[phase::C3A as usize] < open[phase::C3A as usize]);
    }

    #[test]
    fn full_gypsum_pool_stops_the_sulfate_sources() {
        let mut inp = inputs();
        inp.counts[phase::DIFFGYP as usize] = 10_000;
        let prob = compute_disprob(&base(), &inp);
        assert_eq!(prob[phase::GYPSUM as usize], 0.0);
        assert!(prob[phase::C3A as usize] > 0.0);
    }

    #[test]
    fn sulfate_accelerator_is_continuous_enough() {
        assert_eq!(sulfate_accelerator(5.0), 1.0);
        let ramp = sulfate_accelerator(15.0);
        assert!(ramp > 1.0 && ramp < sulfate_accelerator(25.0));
    }

    #[test]
    fn ph_factor_clamps_the_pozzolan_window() {
        let mut fits = BTreeMap::new();
        fits.insert(
            phase::SFUME,
            PhFit {
                points: [(12.0, 0.5), (13.0, 1.0), (14.0, 3.0)],
                sulf_coeff: 0.0,
            },
        );
        let f = ph_factors(&fits, 20.0, 0.0, true);
        assert!(f[phase::SFUME as usize] <= 3.0);
        assert_eq!(f[phase::SFUME as usize], f[phase::AMSIL as usize]);
        let inactive = ph_factors(&fits, 20.0, 0.0, false);
        assert_eq!(inactive[phase::SFUME as usize], 1.0);
    }
}
