//! Run outputs: the main per-cycle data table, progress and summary JSON,
//! the snapshot index, particle-hydration rows and the time history.

use crate::core::phase;
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Resolves every output file of a run from the work directory and the
/// configured base name.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub workdir: PathBuf,
    pub base: String,
}

impl OutputPaths {
    pub fn new(workdir: &Path, base: &str) -> Self {
        OutputPaths {
            workdir: workdir.to_path_buf(),
            base: base.to_string(),
        }
    }

    pub fn with_ext(&self, ext: &str) -> PathBuf {
        self.workdir.join(format!("{}.{}", self.base, ext))
    }

    pub fn data_csv(&self) -> PathBuf {
        self.with_ext("csv")
    }

    pub fn log_file(&self) -> PathBuf {
        self.with_ext("log")
    }

    pub fn params_echo(&self) -> PathBuf {
        self.with_ext("params")
    }

    pub fn movie(&self) -> PathBuf {
        self.with_ext("mov")
    }

    pub fn particle_hydration(&self) -> PathBuf {
        self.with_ext("phr")
    }

    pub fn final_structure(&self) -> PathBuf {
        self.with_ext("struct")
    }

    pub fn history(&self) -> PathBuf {
        self.with_ext("history")
    }

    pub fn snapshot(&self, cycle: u32) -> PathBuf {
        self.workdir.join(format!("{}.img.{:05}", self.base, cycle))
    }

    pub fn pore_size(&self, cycle: u32) -> PathBuf {
        self.workdir.join(format!("{}.psd.{:05}", self.base, cycle))
    }

    pub fn image_index(&self) -> PathBuf {
        self.workdir.join("image_index.txt")
    }

    /// Everything this run produced, for the completion summary.
    pub fn produced_files(&self) -> Vec<String> {
        let pattern = self.workdir.join(format!("{}.*", self.base));
        let mut out: Vec<String> = glob::glob(&pattern.to_string_lossy())
            .into_iter()
            .flatten()
            .flatten()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let index = self.image_index();
        if index.exists() {
            out.push(index.to_string_lossy().into_owned());
        }
        out.sort();
        out
    }
}

/// One row of the main data table.
#[derive(Debug, Clone, Default)]
pub struct DataRow {
    pub cycle: u32,
    pub time_hours: f64,
    pub alpha_mass: f64,
    pub alpha_fa_mass: f64,
    pub heat_kj_per_kg: f64,
    pub temp_c: f64,
    pub gsratio: f64,
    pub wno: f64,
    pub wni: f64,
    pub chem_shrink: f64,
    pub ph: f64,
    pub conductivity: f64,
    pub conc_na: f64,
    pub conc_k: f64,
    pub conc_ca: f64,
    pub conc_so4: f64,
    pub gamma_na: f64,
    pub gamma_k: f64,
    pub gamma_ca: f64,
    pub gamma_oh: f64,
    pub pore_fraction: f64,
    /// Pore connectivity in x, y, z and their average.
    pub con_pore: [f64; 4],
    /// Solid connectivity in x, y, z and their average.
    pub con_solid: [f64; 4],
    /// Volume fraction per static phase id (0..=EMPTYP).
    pub phase_fractions: Vec<f64>,
}

pub struct DataWriter {
    file: fs::File,
}

impl DataWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = fs::File::create(path)
            .with_context(|| format!("could not create data file {:?}", path))?;
        let mut header = String::from(
            "Cycle,time_h,alpha_mass,alpha_fa_mass,heat_kJ_kg,temp_C,gsratio,wno,wni,\
             chemshrink,pH,conductivity,conc_na,conc_k,conc_ca,conc_so4,\
             gamma_na,gamma_k,gamma_ca,gamma_oh,pore_fraction,\
             con_pore_x,con_pore_y,con_pore_z,con_pore_avg,\
             con_solid_x,con_solid_y,con_solid_z,con_solid_avg",
        );
        for id in 0..=phase::EMPTYP {
            header.push_str(",vf_");
            header.push_str(phase::name(id));
        }
        header.push('\n');
        file.write_all(header.as_bytes())
            .with_context(|| format!("could not write data header to {:?}", path))?;
        Ok(DataWriter { file })
    }

    pub fn append(&mut self, row: &DataRow) -> Result<()> {
        let mut line = format!(
            "{},{:.6},{:.6},{:.6},{:.4},{:.3},{:.5},{:.6},{:.6},{:.6},{:.4},{:.5},\
             {:.5},{:.5},{:.6},{:.6},{:.4},{:.4},{:.4},{:.4},{:.6},\
             {:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
            row.cycle,
            row.time_hours,
            row.alpha_mass,
            row.alpha_fa_mass,
            row.heat_kj_per_kg,
            row.temp_c,
            row.gsratio,
            row.wno,
            row.wni,
            row.chem_shrink,
            row.ph,
            row.conductivity,
            row.conc_na,
            row.conc_k,
            row.conc_ca,
            row.conc_so4,
            row.gamma_na,
            row.gamma_k,
            row.gamma_ca,
            row.gamma_oh,
            row.pore_fraction,
            row.con_pore[0],
            row.con_pore[1],
            row.con_pore[2],
            row.con_pore[3],
            row.con_solid[0],
            row.con_solid[1],
            row.con_solid[2],
            row.con_solid[3],
        );
        for f in &row.phase_fractions {
            line.push_str(&format!(",{:.6}", f));
        }
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .context("could not append data row")
    }
}

#[derive(Debug, Serialize)]
pub struct ProgressRecord {
    pub cycle: u32,
    pub time_hours: f64,
    pub degree_of_hydration: f64,
    pub timestamp: String,
}

/// Writes (replaces) the progress JSON consumed by external monitors.
pub fn write_progress(path: &Path, cycle: u32, time_hours: f64, alpha: f64) -> Result<()> {
    let record = ProgressRecord {
        cycle,
        time_hours,
        degree_of_hydration: alpha,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    let json = serde_json::to_string_pretty(&record)?;
    fs::write(path, json).with_context(|| format!("could not write progress JSON {:?}", path))
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub status: String,
    pub degree_of_hydration: f64,
    pub final_temperature_c: f64,
    pub final_ph: f64,
    pub outputs: Vec<String>,
}

pub fn append_image_index(path: &Path, time_hours: f64, filename: &str) -> Result<()> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open image index {:?}", path))?;
    writeln!(f, "{:.6}\t{}", time_hours, filename)
        .with_context(|| format!("could not append to image index {:?}", path))
}

/// Appends per-particle hydration rows produced by a `parthyd` pass.
pub fn append_particle_rows(
    path: &Path,
    cycle: u32,
    time_hours: f64,
    rows: &[(u32, u64, u64)],
) -> Result<()> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open particle file {:?}", path))?;
    for &(pid, initial, remaining) in rows {
        let alpha = if initial > 0 {
            1.0 - remaining as f64 / initial as f64
        } else {
            0.0
        };
        writeln!(f, "{},{:.4},{},{},{},{:.5}", cycle, time_hours, pid, initial, remaining, alpha)?;
    }
    Ok(())
}

/// Writes the cycle → simulated-hours table.
pub fn write_history(path: &Path, history: &[(u32, f64)]) -> Result<()> {
    let mut s = String::from("cycle,time_h\n");
    for &(cycle, hours) in history {
        s.push_str(&format!("{},{:.6}\n", cycle, hours));
    }
    fs::write(path, s).with_context(|| format!("could not write time history {:?}", path))
}

/// Writes one pore-size-distribution table: voxel count per radius class.
pub fn write_pore_size(path: &Path, classes: &[(usize, u64)]) -> Result<()> {
    let mut s = String::from("radius_voxels,count\n");
    for &(r, n) in classes {
        s.push_str(&format!("{},{}\n", r, n));
    }
    fs::write(path, s).with_context(|| format!("could not write pore-size table {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_json_has_the_contract_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        write_progress(&path, 12, 3.5, 0.42).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["cycle"], 12);
        assert!(v["timestamp"].as_str().unwrap().ends_with('Z'));
        assert!((v["degree_of_hydration"].as_f64().unwrap() - 0.42).abs() < 1e-12);
    }

    #[test]
    fn data_writer_emits_matching_column_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let mut w = DataWriter::create(&path).unwrap();
        let row = DataRow {
            phase_fractions: vec![0.0; phase::EMPTYP as usize + 1],
            ..Default::default()
        };
        w.append(&row).unwrap();
        drop(w);
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header_cols = lines.next().unwrap().split(',').count();
        let row_cols = lines.next().unwrap().split(',').count();
        assert_eq!(header_cols, row_cols);
    }

    #[test]
    fn produced_files_picks_up_base_named_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = OutputPaths::new(dir.path(), "run1");
        fs::write(paths.data_csv(), "x").unwrap();
        fs::write(paths.with_ext("phr"), "x").unwrap();
        fs::write(dir.path().join("other.txt"), "x").unwrap();
        let files = paths.produced_files();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.contains("run1")));
    }
}
