//! Pore-solution model (`pHpred` collaborator).
//!
//! Treated as a black box by the rest of the engine: given the binder alkali
//! characteristics, the reaction progress and the remaining pore water, it
//! returns ion concentrations, activity coefficients, pH, conductivity, and
//! the cumulative fractions of the alkali-sulfate inventories that should
//! have dissolved by now (which drive dissolution pass C).

use crate::io::aux_data::AlkaliChar;

const MOLAR_MASS_NA2O: f64 = 61.98;
const MOLAR_MASS_K2O: f64 = 94.20;
const MOLAR_MASS_NAOH: f64 = 40.00;
const MOLAR_MASS_KOH: f64 = 56.11;

/// Equivalent conductivities at infinite dilution [S·cm²/mol of charge].
const LAMBDA_OH: f64 = 198.0;
const LAMBDA_NA: f64 = 50.1;
const LAMBDA_K: f64 = 73.5;
const LAMBDA_CA: f64 = 59.5;
const LAMBDA_SO4: f64 = 80.0;

/// Solubility product of portlandite at 25 °C.
const KSP_CH: f64 = 6.9e-6;

#[derive(Debug, Clone, Copy)]
pub struct PoreSolutionInput {
    pub binder_alkali: AlkaliChar,
    pub flyash_alkali: Option<AlkaliChar>,
    pub cement_mass_g: f64,
    pub flyash_mass_g: f64,
    /// Mass-based degree of hydration of the binder.
    pub alpha: f64,
    /// Remaining pore water [cm³].
    pub water_volume_cm3: f64,
    /// Sulfate currently in solution [mol].
    pub so4_moles: f64,
    pub temp_c: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoreSolution {
    pub ph: f64,
    /// Pore-fluid conductivity [S/m].
    pub conductivity: f64,
    pub conc_na: f64,
    pub conc_k: f64,
    pub conc_ca: f64,
    pub conc_so4: f64,
    pub gamma_na: f64,
    pub gamma_k: f64,
    pub gamma_ca: f64,
    pub gamma_oh: f64,
    /// Cumulative fraction of the K2SO4 / NA2SO4 voxel inventories that
    /// should have dissolved.
    pub released_k: f64,
    pub released_na: f64,
}

/// Fraction of an alkali inventory in solution at hydration degree `alpha`:
/// the readily soluble share dissolves immediately, the remainder is freed
/// as the clinker around it reacts.
fn release_fraction(total_pct: f64, soluble_pct: f64, alpha: f64) -> f64 {
    if total_pct <= 0.0 {
        return 0.0;
    }
    let soluble = soluble_pct.min(total_pct);
    ((soluble + (total_pct - soluble) * alpha) / total_pct).clamp(0.0, 1.0)
}

fn davies_log10_gamma(z: f64, ionic_strength: f64, temp_c: f64) -> f64 {
    // Debye-Hückel slope rises mildly with temperature.
    let a = 0.511 + 0.0009 * (temp_c - 25.0);
    let sqrt_i = ionic_strength.sqrt();
    -a * z * z * (sqrt_i / (1.0 + sqrt_i) - 0.3 * ionic_strength)
}

fn pkw(temp_c: f64) -> f64 {
    let t_k = temp_c + 273.15;
    4470.99 / t_k - 6.0875 + 0.01706 * t_k
}

pub fn predict(input: &PoreSolutionInput) -> PoreSolution {
    let water_l = (input.water_volume_cm3 / 1000.0).max(1e-9);

    let binder = &input.binder_alkali;
    let released_na = release_fraction(binder.total_na2o, binder.soluble_na2o, input.alpha);
    let released_k = release_fraction(binder.total_k2o, binder.soluble_k2o, input.alpha);

    let mut moles_na = 2.0 * (binder.total_na2o / 100.0) * input.cement_mass_g
        / MOLAR_MASS_NA2O
        * released_na
        + (binder.added_naoh / 100.0) * input.cement_mass_g / MOLAR_MASS_NAOH;
    let mut moles_k = 2.0 * (binder.total_k2o / 100.0) * input.cement_mass_g / MOLAR_MASS_K2O
        * released_k
        + (binder.added_koh / 100.0) * input.cement_mass_g / MOLAR_MASS_KOH;

    if let Some(fa) = &input.flyash_alkali {
        let fa_na = release_fraction(fa.total_na2o, fa.soluble_na2o, input.alpha);
        let fa_k = release_fraction(fa.total_k2o, fa.soluble_k2o, input.alpha);
        moles_na += 2.0 * (fa.total_na2o / 100.0) * input.flyash_mass_g / MOLAR_MASS_NA2O * fa_na;
        moles_k += 2.0 * (fa.total_k2o / 100.0) * input.flyash_mass_g / MOLAR_MASS_K2O * fa_k;
    }

    let conc_na = moles_na / water_l;
    let conc_k = moles_k / water_l;
    let conc_so4 = (input.so4_moles / water_l).max(0.0);

    // Charge balance gives hydroxide; calcium follows from portlandite
    // equilibrium and is refined once against the updated ionic strength.
    let mut conc_ca = 1e-3;
    let mut conc_oh = (conc_na + conc_k + 2.0 * conc_ca - 2.0 * conc_so4).max(1e-4);
    let mut gamma_oh = 1.0;
    let mut gamma_ca = 1.0;
    let mut gamma_na = 1.0;
    let mut gamma_k = 1.0;

    for _ in 0..2 {
        let ionic = 0.5
            * (conc_na + conc_k + conc_oh + 4.0 * conc_ca + 4.0 * conc_so4)
                .max(0.0);
        gamma_na = 10f64.powf(davies_log10_gamma(1.0, ionic, input.temp_c));
        gamma_k = gamma_na;
        gamma_oh = gamma_na;
        gamma_ca = 10f64.powf(davies_log10_gamma(2.0, ionic, input.temp_c));
        let denom = gamma_ca * (gamma_oh * conc_oh).powi(2);
        conc_ca = if denom > 0.0 {
            (KSP_CH / denom).min(0.05)
        } else {
            0.0
        };
        conc_oh = (conc_na + conc_k + 2.0 * conc_ca - 2.0 * conc_so4).max(1e-4);
    }

    let ph = pkw(input.temp_c) + (gamma_oh * conc_oh).log10();

    // sigma [S/m] = 0.1 · sum(lambda_i · |z_i| · c_i [mol/L])
    let conductivity = 0.1
        * (LAMBDA_OH * conc_oh
            + LAMBDA_NA * conc_na
            + LAMBDA_K * conc_k
            + LAMBDA_CA * 2.0 * conc_ca
            + LAMBDA_SO4 * 2.0 * conc_so4);

    PoreSolution {
        ph,
        conductivity,
        conc_na,
        conc_k,
        conc_ca,
        conc_so4,
        gamma_na,
        gamma_k,
        gamma_ca,
        gamma_oh,
        released_k,
        released_na,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> PoreSolutionInput {
        PoreSolutionInput {
            binder_alkali: AlkaliChar {
                total_na2o: 0.2,
                total_k2o: 0.8,
                soluble_na2o: 0.1,
                soluble_k2o: 0.5,
                added_naoh: 0.0,
                added_koh: 0.0,
            },
            flyash_alkali: None,
            cement_mass_g: 300.0,
            flyash_mass_g: 0.0,
            alpha: 0.0,
            water_volume_cm3: 150.0,
            so4_moles: 0.0,
            temp_c: 25.0,
        }
    }

    #[test]
    fn fresh_paste_is_strongly_alkaline() {
        let s = predict(&base_input());
        assert!(s.ph > 12.5 && s.ph < 14.0, "pH = {}", s.ph);
        assert!(s.conc_k > s.conc_na);
        assert!(s.gamma_oh < 1.0 && s.gamma_oh > 0.4);
    }

    #[test]
    fn hydration_releases_more_alkali() {
        let mut input = base_input();
        let early = predict(&input);
        input.alpha = 0.8;
        let late = predict(&input);
        assert!(late.conc_k > early.conc_k);
        assert!(late.ph > early.ph);
        assert!(late.released_k > early.released_k);
        assert!(late.released_k <= 1.0);
    }

    #[test]
    fn sulfate_in_solution_depresses_hydroxide() {
        let mut input = base_input();
        let clean = predict(&input);
        input.so4_moles = 0.01;
        let sulfated = predict(&input);
        assert!(sulfated.ph < clean.ph);
        assert!(sulfated.conc_so4 > 0.0);
    }
}
