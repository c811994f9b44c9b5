//! Phase identifiers and the read-only phase property registry.
//!
//! Voxels carry a `u8` phase id. Solid and pore phases occupy the low range;
//! mobile (diffusing) species start at `DIFFCSH`. During the dissolution
//! surface pass a voxel may transiently carry `id + OFFSET` to mark it as
//! eligible to dissolve in the current cycle; the sentinel never survives the
//! cycle.

// --- pore states ---
pub const POROSITY: u8 = 0;

// --- clinker and other reactants ---
pub const C3S: u8 = 1;
pub const C2S: u8 = 2;
pub const C3A: u8 = 3;
pub const OC3A: u8 = 4;
pub const C4AF: u8 = 5;
pub const GYPSUM: u8 = 6;
pub const HEMIHYD: u8 = 7;
pub const ANHYDRITE: u8 = 8;
pub const K2SO4: u8 = 9;
pub const NA2SO4: u8 = 10;
pub const SFUME: u8 = 11;
pub const AMSIL: u8 = 12;
pub const INERT: u8 = 13;
pub const SLAG: u8 = 14;
pub const ASG: u8 = 15;
pub const CAS2: u8 = 16;
pub const FREELIME: u8 = 17;
pub const CACL2: u8 = 18;
pub const CACO3: u8 = 19;
pub const INERTAGG: u8 = 20;

// --- hydration products ---
pub const CH: u8 = 21;
pub const CSH: u8 = 22;
pub const POZZCSH: u8 = 23;
pub const SLAGCSH: u8 = 24;
pub const C3AH6: u8 = 25;
pub const ETTR: u8 = 26;
pub const ETTRC4AF: u8 = 27;
pub const AFM: u8 = 28;
pub const AFMC: u8 = 29;
pub const FH3: u8 = 30;
pub const FRIEDEL: u8 = 31;
pub const STRAT: u8 = 32;
pub const GYPSUMS: u8 = 33;
pub const ABSGYP: u8 = 34;
pub const BRUCITE: u8 = 35;
pub const MS: u8 = 36;

// --- non-water pore states ---
pub const CRACKP: u8 = 37;
pub const EMPTYP: u8 = 38;

// id 39 reserved

// --- diffusing species ---
pub const DIFFCSH: u8 = 40;
pub const DIFFCH: u8 = 41;
pub const DIFFGYP: u8 = 42;
pub const DIFFC3A: u8 = 43;
pub const DIFFC4A: u8 = 44;
pub const DIFFFH3: u8 = 45;
pub const DIFFETTR: u8 = 46;
pub const DIFFCACO3: u8 = 47;
pub const DIFFAS: u8 = 48;
pub const DIFFCAS2: u8 = 49;
pub const DIFFANH: u8 = 50;
pub const DIFFHEM: u8 = 51;
pub const DIFFCACL2: u8 = 52;
pub const DIFFSO4: u8 = 53;

pub const NPHASES: usize = 54;

/// Dissolution-eligibility sentinel added to a voxel id during the surface
/// pass and removed before the cycle ends.
pub const OFFSET: u8 = 64;

pub const WATER_MOLAR_MASS: f64 = 18.02;
/// Molar volume of pore water [cm³/mol].
pub const WATER_MOLAR_VOLUME: f64 = 18.07;

pub fn is_diffusing(id: u8) -> bool {
    (DIFFCSH..=DIFFSO4).contains(&id)
}

/// Water-filled pore states a species may move through.
pub fn is_water_pore(id: u8) -> bool {
    id == POROSITY || id == CRACKP
}

/// Any pore state, including self-desiccated (water-free) porosity.
pub fn is_pore(id: u8) -> bool {
    id == POROSITY || id == CRACKP || id == EMPTYP
}

pub fn is_solid(id: u8) -> bool {
    !is_pore(id) && !is_diffusing(id) && (id as usize) < NPHASES
}

pub fn is_clinker(id: u8) -> bool {
    matches!(id, C3S | C2S | C3A | OC3A | C4AF)
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseProps {
    pub name: &'static str,
    /// Molar mass [g/mol].
    pub molar_mass: f64,
    pub specific_gravity: f64,
    /// Heat of complete reaction [J/g of this phase].
    pub heat_j_per_g: f64,
    /// Moles of water drawn from the pore solution per mole formed (products)
    /// or per mole reacted (hemihydrate/anhydrite conversions).
    pub water_demand: f64,
    /// Moles of water retained at 105 °C per mole (non-evaporable water).
    pub wn105: f64,
    /// Moles of water retained at 1000 °C per mole.
    pub wn1000: f64,
    /// Diffusing species placed in the neighbouring pore on dissolution.
    /// `None` for phases whose dissolved volume is accounted purely through
    /// the balance-species pass.
    pub dissolves_to: Option<u8>,
    /// Dissolution probability multiplier for one-voxel particles.
    pub one_pixel_bias: f64,
}

impl PhaseProps {
    /// Molar volume [cm³/mol].
    pub fn molar_volume(&self) -> f64 {
        self.molar_mass / self.specific_gravity
    }
}

const fn unused(name: &'static str) -> PhaseProps {
    PhaseProps {
        name,
        molar_mass: 1.0,
        specific_gravity: 1.0,
        heat_j_per_g: 0.0,
        water_demand: 0.0,
        wn105: 0.0,
        wn1000: 0.0,
        dissolves_to: None,
        one_pixel_bias: 1.0,
    }
}

macro_rules! phase {
    ($name:expr, $mm:expr, $sg:expr, $heat:expr, $wd:expr, $wn105:expr, $wn1000:expr, $prod:expr, $bias:expr) => {
        PhaseProps {
            name: $name,
            molar_mass: $mm,
            specific_gravity: $sg,
            heat_j_per_g: $heat,
            water_demand: $wd,
            wn105: $wn105,
            wn1000: $wn1000,
            dissolves_to: $prod,
            one_pixel_bias: $bias,
        }
    };
}

/// Default one-voxel-particle dissolution bias for clinker minerals.
pub const DISBIAS: f64 = 30.0;

static REGISTRY: [PhaseProps; NPHASES] = [
    phase!("porosity", WATER_MOLAR_MASS, 0.997, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("c3s", 228.32, 3.21, 517.0, 0.0, 0.0, 0.0, Some(DIFFCSH), DISBIAS),
    phase!("c2s", 172.24, 3.28, 262.0, 0.0, 0.0, 0.0, Some(DIFFCSH), DISBIAS),
    phase!("c3a", 270.20, 3.03, 1144.0, 0.0, 0.0, 0.0, None, DISBIAS),
    phase!("oc3a", 270.20, 3.05, 1144.0, 0.0, 0.0, 0.0, None, DISBIAS),
    phase!("c4af", 485.97, 3.73, 418.0, 0.0, 0.0, 0.0, None, DISBIAS),
    phase!("gypsum", 172.17, 2.32, 0.0, 0.0, 2.0, 0.0, Some(DIFFGYP), 1.0),
    phase!("hemihyd", 145.15, 2.74, 132.0, 1.5, 0.5, 0.0, Some(DIFFHEM), 1.0),
    phase!("anhydrite", 136.14, 2.61, 119.0, 2.0, 0.0, 0.0, Some(DIFFANH), 1.0),
    phase!("k2so4", 174.26, 2.66, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("na2so4", 142.04, 2.68, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("sfume", 60.08, 2.20, 780.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("amsil", 60.08, 2.20, 780.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("inert", 100.0, 2.70, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("slag", 100.0, 2.87, 461.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("asg", 222.10, 2.52, 560.0, 0.0, 0.0, 0.0, Some(DIFFAS), 1.0),
    phase!("cas2", 278.21, 2.77, 400.0, 0.0, 0.0, 0.0, Some(DIFFCAS2), 1.0),
    phase!("freelime", 56.08, 3.31, 1166.0, 0.0, 0.0, 0.0, Some(DIFFCH), DISBIAS),
    phase!("cacl2", 110.98, 2.15, 0.0, 0.0, 0.0, 0.0, Some(DIFFCACL2), 1.0),
    phase!("caco3", 100.09, 2.71, 0.0, 0.0, 0.0, 0.0, Some(DIFFCACO3), 1.0),
    phase!("inertagg", 100.0, 2.65, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("ch", 74.09, 2.24, 0.0, 1.0, 1.0, 0.0, Some(DIFFCH), 1.0),
    phase!("csh", 227.80, 2.11, 0.0, 4.0, 2.1, 0.0, None, 1.0),
    phase!("pozzcsh", 193.20, 1.90, 0.0, 3.9, 2.1, 0.0, None, 1.0),
    phase!("slagcsh", 260.00, 2.35, 0.0, 4.4, 2.5, 0.0, None, 1.0),
    phase!("c3ah6", 378.28, 2.52, 0.0, 6.0, 6.0, 0.0, None, 1.0),
    phase!("ettr", 1255.11, 1.70, 0.0, 26.0, 14.0, 0.0, Some(DIFFETTR), 1.0),
    phase!("ettrc4af", 1255.11, 1.70, 0.0, 26.0, 14.0, 0.0, Some(DIFFETTR), 1.0),
    phase!("afm", 622.52, 1.99, 0.0, 12.0, 10.0, 0.0, None, 1.0),
    phase!("afmc", 568.45, 2.17, 0.0, 11.0, 9.0, 0.0, None, 1.0),
    phase!("fh3", 213.70, 3.00, 0.0, 3.0, 3.0, 0.0, None, 1.0),
    phase!("friedel", 561.33, 1.89, 0.0, 10.0, 8.0, 0.0, None, 1.0),
    phase!("strat", 418.32, 1.94, 0.0, 8.0, 6.0, 0.0, None, 1.0),
    phase!("gypsums", 172.17, 2.32, 0.0, 2.0, 2.0, 0.0, Some(DIFFGYP), 1.0),
    phase!("absgyp", 172.17, 2.32, 0.0, 0.0, 2.0, 0.0, None, 1.0),
    phase!("brucite", 58.32, 2.37, 0.0, 1.0, 1.0, 0.0, None, 1.0),
    phase!("ms", 271.00, 2.50, 0.0, 2.0, 2.0, 0.0, None, 1.0),
    phase!("crackp", WATER_MOLAR_MASS, 0.997, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("emptyp", 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    unused("reserved"),
    phase!("diffcsh", 227.80, 2.11, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffch", 74.09, 2.24, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffgyp", 172.17, 2.32, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffc3a", 270.20, 3.03, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffc4a", 270.20, 3.03, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("difffh3", 213.70, 3.00, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffettr", 1255.11, 1.70, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffcaco3", 100.09, 2.71, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffas", 222.10, 2.52, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffcas2", 278.21, 2.77, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffanh", 136.14, 2.61, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffhem", 145.15, 2.74, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffcacl2", 110.98, 2.15, 0.0, 0.0, 0.0, 0.0, None, 1.0),
    phase!("diffso4", 96.06, 2.66, 0.0, 0.0, 0.0, 0.0, None, 1.0),
];

pub fn props(id: u8) -> &'static PhaseProps {
    &REGISTRY[id as usize]
}

pub fn name(id: u8) -> &'static str {
    REGISTRY[id as usize].name
}

/// CSH stoichiometry varies with curing temperature: the gel holds less water
/// (and packs denser) when formed hot. Values are per mole of C1.7-S-Hx gel.
pub fn csh_water_demand(temp_c: f64, ph_active: bool) -> f64 {
    let mut n = 4.0 - 0.017 * (temp_c - 20.0);
    if ph_active {
        n -= 0.20;
    }
    n.clamp(2.2, 4.0)
}

/// Molar volume of CSH formed at the given temperature [cm³/mol]. The base
/// value is the 20 °C gel; each mole of water lost removes roughly its own
/// molar volume from the gel.
pub fn csh_molar_volume(temp_c: f64, ph_active: bool) -> f64 {
    let base = props(CSH).molar_volume();
    let n = csh_water_demand(temp_c, ph_active);
    (base - (4.0 - n) * WATER_MOLAR_VOLUME).max(60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_complete_and_consistent() {
        for id in 0..NPHASES as u8 {
            let p = props(id);
            assert!(p.molar_mass > 0.0, "{}", p.name);
            assert!(p.specific_gravity > 0.0, "{}", p.name);
        }
        // Volume ratios the dissolution stoichiometry relies on.
        let csh_per_c3s = props(CSH).molar_volume() / props(C3S).molar_volume();
        assert!((csh_per_c3s - 1.52).abs() < 0.02);
        let ch_per_freelime = props(CH).molar_volume() / props(FREELIME).molar_volume();
        assert!((ch_per_freelime - 1.95).abs() < 0.02);
        let ettr_per_gyp = props(ETTR).molar_volume() / (3.0 * props(GYPSUM).molar_volume());
        assert!((ettr_per_gyp - 3.32).abs() < 0.02);
    }

    #[test]
    fn predicates_partition_the_id_space() {
        for id in 0..NPHASES as u8 {
            if id == 39 {
                continue;
            }
            let classes =
                [is_pore(id), is_diffusing(id), is_solid(id)].iter().filter(|&&b| b).count();
            assert_eq!(classes, 1, "phase {} in {} classes", id, classes);
        }
    }

    #[test]
    fn hot_csh_is_denser_and_drier() {
        assert!(csh_water_demand(60.0, false) < csh_water_demand(20.0, false));
        assert!(csh_molar_volume(60.0, false) < csh_molar_volume(20.0, false));
    }
}
