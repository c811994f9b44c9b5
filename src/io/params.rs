//! The ordered parameter file.
//!
//! Plain-text `key,value[,value…]` lines, one parameter per line. The order
//! is significant: the reader consumes the exact expected key sequence and
//! reports the first mismatch, so a stale or re-ordered file fails loudly
//! instead of silently mis-assigning values.

use crate::core::phase;
use crate::SimError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempMode {
    Isothermal,
    Adiabatic,
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCalibration {
    BetaFactor,
    Calorimetric,
    ChemicalShrinkage,
}

/// Three-point pH response of a dissolving phase plus its sulfate
/// depression coefficient.
#[derive(Debug, Clone, Copy)]
pub struct PhFit {
    pub points: [(f64, f64); 3],
    pub sulf_coeff: f64,
}

/// Everything the parameter file configures, in file order.
#[derive(Debug, Clone)]
pub struct SimParams {
    pub micfile: String,
    pub pimgfile: String,
    pub seed: i64,
    pub ncyc: u32,
    pub end_time_hours: f64,
    pub alpha_max: f64,
    pub neighbors: usize,
    pub boxsize: usize,
    pub sealed: bool,
    pub temp_mode: TempMode,
    pub temp_0_c: f64,
    pub temp_profile_file: Option<String>,
    pub agg_mass_frac: f64,
    pub agg_temp_0_c: f64,
    pub heat_transfer_u: f64,
    pub ambient_temp_c: f64,
    pub e_act_hydration: f64,
    pub e_act_pozzolanic: f64,
    pub e_act_slag: f64,
    pub time_calibration: TimeCalibration,
    pub beta: f64,
    pub calibration_file: Option<String>,
    pub calibration_temp_c: f64,
    pub crack_time_hours: f64,
    pub crack_width: usize,
    pub crack_orientation: String,
    pub deact_time_hours: f64,
    pub deact_frac: f64,
    pub react_time_hours: f64,
    pub ph_active: bool,
    pub sfume_loi_factor: f64,
    pub sfume_sio2_frac: f64,
    pub disbase: BTreeMap<u8, f64>,
    pub ph_fits: BTreeMap<u8, PhFit>,
    pub pnucch: f64,
    pub pscalech: f64,
    pub pnucgyp: f64,
    pub pscalegyp: f64,
    pub pnucfh3: f64,
    pub pscalefh3: f64,
    pub pnuchgd: f64,
    pub pscalehgd: f64,
    pub burn_freq_hours: f64,
    pub set_freq_hours: f64,
    pub phyd_freq_hours: f64,
    pub movie_freq_hours: f64,
    pub image_freq_hours: f64,
    pub output_base: String,
}

/// Dissolvable phases, in the order their base probabilities appear on the
/// `disbase` line.
pub const DISBASE_ORDER: [u8; 20] = [
    phase::C3S,
    phase::C2S,
    phase::C3A,
    phase::OC3A,
    phase::C4AF,
    phase::GYPSUM,
    phase::HEMIHYD,
    phase::ANHYDRITE,
    phase::CH,
    phase::CACO3,
    phase::CACL2,
    phase::ASG,
    phase::CAS2,
    phase::FREELIME,
    phase::ETTR,
    phase::C3AH6,
    phase::SLAG,
    phase::K2SO4,
    phase::NA2SO4,
    phase::GYPSUMS,
];

/// Phases carrying a pH-fit line, in file order.
pub const PHFIT_ORDER: [u8; 8] = [
    phase::C3S,
    phase::C2S,
    phase::C3A,
    phase::C4AF,
    phase::GYPSUM,
    phase::SFUME,
    phase::ASG,
    phase::SLAG,
];

struct Reader {
    lines: Vec<(usize, String)>,
    pos: usize,
}

impl Reader {
    fn new(text: &str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim().to_string()))
            .filter(|(_, l)| !l.is_empty())
            .collect();
        Reader { lines, pos: 0 }
    }

    fn entry(&mut self, expected: &str) -> Result<(usize, Vec<String>)> {
        let (line_no, line) = self
            .lines
            .get(self.pos)
            .cloned()
            .ok_or_else(|| SimError::KeyMismatch {
                expected: expected.to_string(),
                found: "<end of file>".to_string(),
                line: self.lines.last().map(|(n, _)| *n + 1).unwrap_or(1),
            })?;
        self.pos += 1;
        let mut parts = line.split(',').map(|s| s.trim().to_string());
        let key = parts.next().unwrap_or_default();
        if key != expected {
            return Err(SimError::KeyMismatch {
                expected: expected.to_string(),
                found: key,
                line: line_no,
            }
            .into());
        }
        Ok((line_no, parts.collect()))
    }

    fn values<const N: usize>(&mut self, key: &str) -> Result<[f64; N]> {
        let (line_no, vals) = self.entry(key)?;
        if vals.len() != N {
            anyhow::bail!("`{}` (line {}): expected {} values, found {}", key, line_no, N, vals.len());
        }
        let mut out = [0.0; N];
        for (slot, raw) in out.iter_mut().zip(&vals) {
            *slot = raw
                .parse()
                .with_context(|| format!("`{}` (line {}): bad number `{}`", key, line_no, raw))?;
        }
        Ok(out)
    }

    fn f64(&mut self, key: &str) -> Result<f64> {
        Ok(self.values::<1>(key)?[0])
    }

    fn int(&mut self, key: &str) -> Result<i64> {
        let (line_no, vals) = self.entry(key)?;
        vals.first()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| anyhow::anyhow!("`{}` (line {}): bad integer", key, line_no))
    }

    fn string(&mut self, key: &str) -> Result<String> {
        let (line_no, vals) = self.entry(key)?;
        vals.into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("`{}` (line {}): missing value", key, line_no))
    }

    fn optional_file(&mut self, key: &str) -> Result<Option<String>> {
        let v = self.string(key)?;
        Ok((v != "none").then_some(v))
    }
}

pub fn read_params(path: &Path) -> Result<SimParams> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read parameter file {:?}", path))?;
    parse_params(&text)
}

/// Scans the file for its `output_base` entry without running the strict
/// ordered parse. The log file is named after the base, and logging has to
/// be up before the real parse (whose diagnostics should land in the log).
pub fn peek_output_base(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    text.lines()
        .filter_map(|l| l.trim().strip_prefix("output_base,"))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

pub fn parse_params(text: &str) -> Result<SimParams> {
    let mut r = Reader::new(text);

    let micfile = r.string("micfile")?;
    let pimgfile = r.string("pimgfile")?;
    let seed = r.int("seed")?;
    if seed >= 0 {
        anyhow::bail!("seed must be a negative integer, found {}", seed);
    }
    let ncyc = r.int("ncyc")? as u32;
    let end_time_hours = r.f64("end_time_hours")?;
    let alpha_max = r.f64("alpha_max")?;
    let neighbors = r.int("neighbors")? as usize;
    if !matches!(neighbors, 6 | 18 | 26) {
        anyhow::bail!("neighbors must be 6, 18 or 26, found {}", neighbors);
    }
    let boxsize = r.int("boxsize")? as usize;
    let sealed = r.int("sealed")? != 0;

    let temp_mode = match r.int("temp_mode")? {
        0 => TempMode::Isothermal,
        1 => TempMode::Adiabatic,
        2 => TempMode::Profile,
        m => anyhow::bail!("temp_mode must be 0, 1 or 2, found {}", m),
    };
    let temp_0_c = r.f64("temp_0_c")?;
    let temp_profile_file = r.optional_file("temp_profile_file")?;
    if temp_mode == TempMode::Profile && temp_profile_file.is_none() {
        anyhow::bail!("temp_mode 2 requires a temperature profile file");
    }
    let agg_mass_frac = r.f64("agg_mass_frac")?;
    let agg_temp_0_c = r.f64("agg_temp_0_c")?;
    let heat_transfer_u = r.f64("heat_transfer_u")?;
    let ambient_temp_c = r.f64("ambient_temp_c")?;

    let e_act_hydration = r.f64("e_act_hydration")?;
    let e_act_pozzolanic = r.f64("e_act_pozzolanic")?;
    let e_act_slag = r.f64("e_act_slag")?;

    let time_calibration = match r.int("time_calibration")? {
        0 => TimeCalibration::BetaFactor,
        1 => TimeCalibration::Calorimetric,
        2 => TimeCalibration::ChemicalShrinkage,
        m => anyhow::bail!("time_calibration must be 0, 1 or 2, found {}", m),
    };
    let beta = r.f64("beta")?;
    let calibration_file = r.optional_file("calibration_file")?;
    if time_calibration != TimeCalibration::BetaFactor && calibration_file.is_none() {
        anyhow::bail!("experimental time calibration requires a calibration file");
    }
    let calibration_temp_c = r.f64("calibration_temp_c")?;

    let crack_time_hours = r.f64("crack_time_hours")?;
    let crack_width = r.int("crack_width")? as usize;
    let crack_orientation = r.string("crack_orientation")?;
    if !matches!(crack_orientation.as_str(), "xy" | "xz" | "yz") {
        anyhow::bail!("crack_orientation must be xy, xz or yz, found `{}`", crack_orientation);
    }

    let deact_time_hours = r.f64("deact_time_hours")?;
    let deact_frac = r.f64("deact_frac")?;
    let react_time_hours = r.f64("react_time_hours")?;

    let ph_active = r.int("ph_active")? != 0;
    let sfume_loi_factor = r.f64("sfume_loi_factor")?;
    let sfume_sio2_frac = r.f64("sfume_sio2_frac")?;

    let dis = r.values::<20>("disbase")?;
    let disbase = DISBASE_ORDER.iter().copied().zip(dis).collect();

    let mut ph_fits = BTreeMap::new();
    for &ph in PHFIT_ORDER.iter() {
        let key = format!("phfit_{}", phase::name(ph));
        let v = r.values::<7>(&key)?;
        ph_fits.insert(
            ph,
            PhFit {
                points: [(v[0], v[1]), (v[2], v[3]), (v[4], v[5])],
                sulf_coeff: v[6],
            },
        );
    }

    let pnucch = r.f64("pnucch")?;
    let pscalech = r.f64("pscalech")?;
    let pnucgyp = r.f64("pnucgyp")?;
    let pscalegyp = r.f64("pscalegyp")?;
    let pnucfh3 = r.f64("pnucfh3")?;
    let pscalefh3 = r.f64("pscalefh3")?;
    let pnuchgd = r.f64("pnuchgd")?;
    let pscalehgd = r.f64("pscalehgd")?;

    let burn_freq_hours = r.f64("burn_freq_hours")?;
    let set_freq_hours = r.f64("set_freq_hours")?;
    let phyd_freq_hours = r.f64("phyd_freq_hours")?;
    let movie_freq_hours = r.f64("movie_freq_hours")?;
    let image_freq_hours = r.f64("image_freq_hours")?;
    let output_base = r.string("output_base")?;

    Ok(SimParams {
        micfile,
        pimgfile,
        seed,
        ncyc,
        end_time_hours,
        alpha_max,
        neighbors,
        boxsize,
        sealed,
        temp_mode,
        temp_0_c,
        temp_profile_file,
        agg_mass_frac,
        agg_temp_0_c,
        heat_transfer_u,
        ambient_temp_c,
        e_act_hydration,
        e_act_pozzolanic,
        e_act_slag,
        time_calibration,
        beta,
        calibration_file,
        calibration_temp_c,
        crack_time_hours,
        crack_width,
        crack_orientation,
        deact_time_hours,
        deact_frac,
        react_time_hours,
        ph_active,
        sfume_loi_factor,
        sfume_sio2_frac,
        disbase,
        ph_fits,
        pnucch,
        pscalech,
        pnucgyp,
        pscalegyp,
        pnucfh3,
        pscalefh3,
        pnuchgd,
        pscalehgd,
        burn_freq_hours,
        set_freq_hours,
        phyd_freq_hours,
        movie_freq_hours,
        image_freq_hours,
        output_base,
    })
}

/// Serialises the parsed parameters back into the on-disk line format; the
/// echo is written as `<base>.params` beside the other outputs.
pub fn echo_params(p: &SimParams) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "micfile,{}", p.micfile);
    let _ = writeln!(s, "pimgfile,{}", p.pimgfile);
    let _ = writeln!(s, "seed,{}", p.seed);
    let _ = writeln!(s, "ncyc,{}", p.ncyc);
    let _ = writeln!(s, "end_time_hours,{}", p.end_time_hours);
    let _ = writeln!(s, "alpha_max,{}", p.alpha_max);
    let _ = writeln!(s, "neighbors,{}", p.neighbors);
    let _ = writeln!(s, "boxsize,{}", p.boxsize);
    let _ = writeln!(s, "sealed,{}", p.sealed as u8);
    let mode = match p.temp_mode {
        TempMode::Isothermal => 0,
        TempMode::Adiabatic => 1,
        TempMode::Profile => 2,
    };
    let _ = writeln!(s, "temp_mode,{}", mode);
    let _ = writeln!(s, "temp_0_c,{}", p.temp_0_c);
    let _ = writeln!(s, "temp_profile_file,{}", p.temp_profile_file.as_deref().unwrap_or("none"));
    let _ = writeln!(s, "agg_mass_frac,{}", p.agg_mass_frac);
    let _ = writeln!(s, "agg_temp_0_c,{}", p.agg_temp_0_c);
    let _ = writeln!(s, "heat_transfer_u,{}", p.heat_transfer_u);
    let _ = writeln!(s, "ambient_temp_c,{}", p.ambient_temp_c);
    let _ = writeln!(s, "e_act_hydration,{}", p.e_act_hydration);
    let _ = writeln!(s, "e_act_pozzolanic,{}", p.e_act_pozzolanic);
    let _ = writeln!(s, "e_act_slag,{}", p.e_act_slag);
    let cal = match p.time_calibration {
        TimeCalibration::BetaFactor => 0,
        TimeCalibration::Calorimetric => 1,
        TimeCalibration::ChemicalShrinkage => 2,
    };
    let _ = writeln!(s, "time_calibration,{}", cal);
    let _ = writeln!(s, "beta,{}", p.beta);
    let _ = writeln!(s, "calibration_file,{}", p.calibration_file.as_deref().unwrap_or("none"));
    let _ = writeln!(s, "calibration_temp_c,{}", p.calibration_temp_c);
    let _ = writeln!(s, "crack_time_hours,{}", p.crack_time_hours);
    let _ = writeln!(s, "crack_width,{}", p.crack_width);
    let _ = writeln!(s, "crack_orientation,{}", p.crack_orientation);
    let _ = writeln!(s, "deact_time_hours,{}", p.deact_time_hours);
    let _ = writeln!(s, "deact_frac,{}", p.deact_frac);
    let _ = writeln!(s, "react_time_hours,{}", p.react_time_hours);
    let _ = writeln!(s, "ph_active,{}", p.ph_active as u8);
    let _ = writeln!(s, "sfume_loi_factor,{}", p.sfume_loi_factor);
    let _ = writeln!(s, "sfume_sio2_frac,{}", p.sfume_sio2_frac);
    let dis: Vec<String> = DISBASE_ORDER.iter().map(|ph| p.disbase[ph].to_string()).collect();
    let _ = writeln!(s, "disbase,{}", dis.join(","));
    for &ph in PHFIT_ORDER.iter() {
        let f = &p.ph_fits[&ph];
        let _ = writeln!(
            s,
            "phfit_{},{},{},{},{},{},{},{}",
            phase::name(ph),
            f.points[0].0,
            f.points[0].1,
            f.points[1].0,
            f.points[1].1,
            f.points[2].0,
            f.points[2].1,
            f.sulf_coeff
        );
    }
    let _ = writeln!(s, "pnucch,{}", p.pnucch);
    let _ = writeln!(s, "pscalech,{}", p.pscalech);
    let _ = writeln!(s, "pnucgyp,{}", p.pnucgyp);
    let _ = writeln!(s, "pscalegyp,{}", p.pscalegyp);
    let _ = writeln!(s, "pnucfh3,{}", p.pnucfh3);
    let _ = writeln!(s, "pscalefh3,{}", p.pscalefh3);
    let _ = writeln!(s, "pnuchgd,{}", p.pnuchgd);
    let _ = writeln!(s, "pscalehgd,{}", p.pscalehgd);
    let _ = writeln!(s, "burn_freq_hours,{}", p.burn_freq_hours);
    let _ = writeln!(s, "set_freq_hours,{}", p.set_freq_hours);
    let _ = writeln!(s, "phyd_freq_hours,{}", p.phyd_freq_hours);
    let _ = writeln!(s, "movie_freq_hours,{}", p.movie_freq_hours);
    let _ = writeln!(s, "image_freq_hours,{}", p.image_freq_hours);
    let _ = writeln!(s, "output_base,{}", p.output_base);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample_text() -> String {
        let mut s = String::new();
        s.push_str("micfile,paste.img\n");
        s.push_str("pimgfile,paste.pimg\n");
        s.push_str("seed,-123\n");
        s.push_str("ncyc,50\n");
        s.push_str("end_time_hours,24.0\n");
        s.push_str("alpha_max,1.0\n");
        s.push_str("neighbors,6\n");
        s.push_str("boxsize,3\n");
        s.push_str("sealed,0\n");
        s.push_str("temp_mode,0\n");
        s.push_str("temp_0_c,25.0\n");
        s.push_str("temp_profile_file,none\n");
        s.push_str("agg_mass_frac,0.0\n");
        s.push_str("agg_temp_0_c,25.0\n");
        s.push_str("heat_transfer_u,0.0\n");
        s.push_str("ambient_temp_c,25.0\n");
        s.push_str("e_act_hydration,40.0\n");
        s.push_str("e_act_pozzolanic,83.14\n");
        s.push_str("e_act_slag,50.0\n");
        s.push_str("time_calibration,0\n");
        s.push_str("beta,0.00035\n");
        s.push_str("calibration_file,none\n");
        s.push_str("calibration_temp_c,25.0\n");
        s.push_str("crack_time_hours,-1.0\n");
        s.push_str("crack_width,0\n");
        s.push_str("crack_orientation,xz\n");
        s.push_str("deact_time_hours,-1.0\n");
        s.push_str("deact_frac,0.0\n");
        s.push_str("react_time_hours,-1.0\n");
        s.push_str("ph_active,1\n");
        s.push_str("sfume_loi_factor,1.0\n");
        s.push_str("sfume_sio2_frac,0.95\n");
        s.push_str(
            "disbase,0.7,0.1,0.4,0.02,0.067,0.9,0.9,0.5,0.5,0.1,0.2,0.01,0.01,0.5,0.2,0.01,0.005,1.0,1.0,0.4\n",
        );
        for name in ["c3s", "c2s", "c3a", "c4af", "gypsum", "sfume", "asg", "slag"] {
            s.push_str(&format!("phfit_{},12.0,1.0,12.75,1.2,13.5,0.9,0.0\n", name));
        }
        s.push_str("pnucch,0.0001\n");
        s.push_str("pscalech,9000.0\n");
        s.push_str("pnucgyp,0.01\n");
        s.push_str("pscalegyp,9000.0\n");
        s.push_str("pnucfh3,0.0002\n");
        s.push_str("pscalefh3,10000.0\n");
        s.push_str("pnuchgd,0.01\n");
        s.push_str("pscalehgd,9000.0\n");
        s.push_str("burn_freq_hours,1.0\n");
        s.push_str("set_freq_hours,0.5\n");
        s.push_str("phyd_freq_hours,6.0\n");
        s.push_str("movie_freq_hours,-1.0\n");
        s.push_str("image_freq_hours,12.0\n");
        s.push_str("output_base,run1\n");
        s
    }

    #[test]
    fn parses_the_full_ordered_file() {
        let p = parse_params(&sample_text()).unwrap();
        assert_eq!(p.seed, -123);
        assert_eq!(p.neighbors, 6);
        assert!((p.disbase[&phase::C3S] - 0.7).abs() < 1e-12);
        assert!((p.disbase[&phase::GYPSUMS] - 0.4).abs() < 1e-12);
        assert_eq!(p.ph_fits.len(), PHFIT_ORDER.len());
        assert_eq!(p.output_base, "run1");
    }

    #[test]
    fn out_of_order_keys_are_rejected_with_both_names() {
        let text = sample_text().replacen("ncyc,50", "cycles,50", 1);
        let err = parse_params(&text).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("ncyc") && msg.contains("cycles"), "{msg}");
    }

    #[test]
    fn peek_finds_the_output_base_without_parsing() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, sample_text().as_bytes()).unwrap();
        assert_eq!(peek_output_base(f.path()).as_deref(), Some("run1"));
        assert_eq!(peek_output_base(Path::new("/no/such/file")), None);
    }

    #[test]
    fn non_negative_seed_is_rejected() {
        let text = sample_text().replacen("seed,-123", "seed,123", 1);
        assert!(parse_params(&text).is_err());
    }

    #[test]
    fn echo_round_trips() {
        let p = parse_params(&sample_text()).unwrap();
        let p2 = parse_params(&echo_params(&p)).unwrap();
        assert_eq!(p2.ncyc, p.ncyc);
        assert_eq!(p2.disbase, p.disbase);
        assert_eq!(p2.output_base, p.output_base);
    }
}
