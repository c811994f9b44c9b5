//! Auxiliary composition and calibration files read from the work directory.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Alkali characteristics of the binder (all values mass-% of binder):
/// total and readily soluble Na2O / K2O, plus hydroxide additions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlkaliChar {
    pub total_na2o: f64,
    pub total_k2o: f64,
    pub soluble_na2o: f64,
    pub soluble_k2o: f64,
    pub added_naoh: f64,
    pub added_koh: f64,
}

fn read_floats(path: &Path, n: usize) -> Result<Vec<f64>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("could not read {:?}", path))?;
    let vals: Vec<f64> = text
        .split_whitespace()
        .map(|t| {
            t.parse()
                .with_context(|| format!("{:?}: bad number `{}`", path, t))
        })
        .collect::<Result<_>>()?;
    if vals.len() < n {
        anyhow::bail!("{:?}: expected {} values, found {}", path, n, vals.len());
    }
    Ok(vals)
}

pub fn read_alkali_char(path: &Path) -> Result<AlkaliChar> {
    let v = read_floats(path, 6)?;
    Ok(AlkaliChar {
        total_na2o: v[0],
        total_k2o: v[1],
        soluble_na2o: v[2],
        soluble_k2o: v[3],
        added_naoh: v[4],
        added_koh: v[5],
    })
}

/// Slag properties: density, molar mass, product volume ratio, the
/// per-reaction release/consumption coefficients, bound water, and an
/// overall reactivity multiplier applied to the base dissolution
/// probability.
#[derive(Debug, Clone, Copy)]
pub struct SlagChar {
    pub specific_gravity: f64,
    pub molar_mass: f64,
    /// Volume of slag hydration product per volume of reacted slag.
    pub slagcsh_per_slag: f64,
    /// Diffusing C3A released per reacted slag voxel (volume units).
    pub c3a_per_slag: f64,
    /// Diffusing CH absorbed per reacted slag voxel (volume units).
    pub ch_per_slag: f64,
    /// Moles of water bound per mole of reacted slag.
    pub water_per_slag: f64,
    pub reactivity: f64,
}

impl Default for SlagChar {
    fn default() -> Self {
        SlagChar {
            specific_gravity: 2.87,
            molar_mass: 100.0,
            slagcsh_per_slag: 1.35,
            c3a_per_slag: 0.20,
            ch_per_slag: 0.15,
            water_per_slag: 1.0,
            reactivity: 1.0,
        }
    }
}

pub fn read_slag_char(path: &Path) -> Result<SlagChar> {
    let v = read_floats(path, 7)?;
    let mut c3a_per_slag = v[3];
    if c3a_per_slag > 1.0 {
        warn!(value = c3a_per_slag, "slag C3A release coefficient above 1, clamping");
        c3a_per_slag = 1.0;
    }
    Ok(SlagChar {
        specific_gravity: v[0],
        molar_mass: v[1],
        slagcsh_per_slag: v[2],
        c3a_per_slag,
        ch_per_slag: v[4],
        water_per_slag: v[5],
        reactivity: v[6],
    })
}

/// A monotone experimental series `(hours, value)` used for calorimetric or
/// chemical-shrinkage time calibration.
#[derive(Debug, Clone, Default)]
pub struct CalibrationCurve {
    pub points: Vec<(f64, f64)>,
}

impl CalibrationCurve {
    /// Inverse lookup: the time at which the measured series reaches `y`,
    /// by linear interpolation. `None` once `y` passes the last measured
    /// value (the caller extrapolates from its own history instead).
    pub fn time_at(&self, y: f64) -> Option<f64> {
        let last = self.points.last()?;
        if y > last.1 {
            return None;
        }
        let first = self.points.first()?;
        if y <= first.1 {
            return Some(first.0 * if first.1 > 0.0 { y / first.1 } else { 1.0 });
        }
        for w in self.points.windows(2) {
            let (t0, y0) = w[0];
            let (t1, y1) = w[1];
            if y <= y1 {
                if y1 - y0 <= f64::EPSILON {
                    return Some(t1);
                }
                return Some(t0 + (t1 - t0) * (y - y0) / (y1 - y0));
            }
        }
        Some(last.0)
    }

    pub fn end_value(&self) -> f64 {
        self.points.last().map(|p| p.1).unwrap_or(0.0)
    }
}

pub fn read_calibration(path: &Path) -> Result<CalibrationCurve> {
    let text =
        fs::read_to_string(path).with_context(|| format!("could not read {:?}", path))?;
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let mut fields = t.split(',');
        let hours: f64 = fields
            .next()
            .and_then(|v| v.trim().parse().ok())
            .with_context(|| format!("{:?} line {}: bad time", path, i + 1))?;
        let value: f64 = fields
            .next()
            .and_then(|v| v.trim().parse().ok())
            .with_context(|| format!("{:?} line {}: bad value", path, i + 1))?;
        if let Some(&(pt, pv)) = points.last() {
            if hours <= pt || value < pv {
                anyhow::bail!("{:?} line {}: series must be monotone", path, i + 1);
            }
        }
        points.push((hours, value));
    }
    if points.len() < 2 {
        anyhow::bail!("{:?}: calibration series needs at least two rows", path);
    }
    Ok(CalibrationCurve { points })
}

/// Programmed curing-temperature profile `(hours, °C)`.
#[derive(Debug, Clone, Default)]
pub struct TempProfile {
    pub points: Vec<(f64, f64)>,
}

impl TempProfile {
    /// Linear interpolation, clamped to the first/last entry outside the
    /// covered span.
    pub fn temp_at(&self, hours: f64) -> f64 {
        match self.points.as_slice() {
            [] => 25.0,
            [only] => only.1,
            points => {
                if hours <= points[0].0 {
                    return points[0].1;
                }
                for w in points.windows(2) {
                    let (t0, v0) = w[0];
                    let (t1, v1) = w[1];
                    if hours <= t1 {
                        return v0 + (v1 - v0) * (hours - t0) / (t1 - t0);
                    }
                }
                points[points.len() - 1].1
            }
        }
    }
}

pub fn read_temp_profile(path: &Path) -> Result<TempProfile> {
    let text =
        fs::read_to_string(path).with_context(|| format!("could not read {:?}", path))?;
    let mut points: Vec<(f64, f64)> = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let t = line.trim();
        if t.is_empty() || t.starts_with('#') {
            continue;
        }
        let mut fields = t.split(',');
        let hours: f64 = fields
            .next()
            .and_then(|v| v.trim().parse().ok())
            .with_context(|| format!("{:?} line {}: bad time", path, i + 1))?;
        let temp: f64 = fields
            .next()
            .and_then(|v| v.trim().parse().ok())
            .with_context(|| format!("{:?} line {}: bad temperature", path, i + 1))?;
        if let Some(&(pt, _)) = points.last() {
            // Temperatures may rise and fall; only the time axis must advance.
            if hours <= pt {
                anyhow::bail!("{:?} line {}: times must be increasing", path, i + 1);
            }
        }
        points.push((hours, temp));
    }
    if points.is_empty() {
        anyhow::bail!("{:?}: temperature profile is empty", path);
    }
    Ok(TempProfile { points })
}

/// Optional list of degree-of-hydration values that trigger extra snapshots.
pub fn read_custom_alphas(path: &Path) -> Result<Vec<f64>> {
    let v = read_floats(path, 0)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn alkali_file_round_trips() {
        let f = write_temp("0.2 0.8\n0.1 0.5\n0.0 0.0\n");
        let a = read_alkali_char(f.path()).unwrap();
        assert!((a.total_k2o - 0.8).abs() < 1e-12);
        assert!((a.soluble_na2o - 0.1).abs() < 1e-12);
    }

    #[test]
    fn calibration_interpolates_and_refuses_nonmonotone() {
        let f = write_temp("0.0,0.0\n2.0,10.0\n4.0,20.0\n");
        let c = read_calibration(f.path()).unwrap();
        assert!((c.time_at(15.0).unwrap() - 3.0).abs() < 1e-9);
        assert_eq!(c.time_at(25.0), None);

        let bad = write_temp("0.0,0.0\n2.0,10.0\n1.0,20.0\n");
        assert!(read_calibration(bad.path()).is_err());
    }

    #[test]
    fn temp_profile_clamps_outside_span() {
        let f = write_temp("0.0,20.0\n10.0,40.0\n");
        let p = read_temp_profile(f.path()).unwrap();
        assert!((p.temp_at(5.0) - 30.0).abs() < 1e-9);
        assert!((p.temp_at(-1.0) - 20.0).abs() < 1e-9);
        assert!((p.temp_at(99.0) - 40.0).abs() < 1e-9);
    }
}
