//! Microstructure image files.
//!
//! `.img` (phase ids) and `.pimg` (particle ids) share a two-line header:
//!
//! ```text
//! Version: 7.0
//! <xsize> <ysize> <zsize> <resolution_mm>
//! ```
//!
//! followed by one integer id per line, iterated with x outermost and z
//! innermost. Files older than version 7 used the transposed (z-outermost)
//! body order and are rejected outright rather than silently misread.

use crate::core::phase;
use crate::SimError;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const CURRENT_VERSION: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImgHeader {
    pub version: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub resolution_mm: f64,
}

impl ImgHeader {
    /// Voxel edge length in micrometres (the engine's native unit).
    pub fn resolution_um(&self) -> f64 {
        self.resolution_mm * 1000.0
    }

    pub fn voxels(&self) -> usize {
        self.nx * self.ny * self.nz
    }
}

fn parse_header<'a>(mut lines: impl Iterator<Item = &'a str>, path: &Path) -> Result<ImgHeader> {
    let version_line = lines
        .next()
        .with_context(|| format!("{:?}: missing version line", path))?;
    let version: f64 = version_line
        .trim()
        .strip_prefix("Version:")
        .map(str::trim)
        .with_context(|| format!("{:?}: malformed version line `{}`", path, version_line))?
        .parse()
        .with_context(|| format!("{:?}: malformed version number", path))?;
    if version < CURRENT_VERSION {
        return Err(SimError::LegacyOrdering(version).into());
    }
    let dims_line = lines
        .next()
        .with_context(|| format!("{:?}: missing size line", path))?;
    let fields: Vec<&str> = dims_line.split_whitespace().collect();
    if fields.len() != 4 {
        anyhow::bail!("{:?}: size line must hold `x y z resolution`", path);
    }
    let nx = fields[0].parse().with_context(|| format!("{:?}: bad xsize", path))?;
    let ny = fields[1].parse().with_context(|| format!("{:?}: bad ysize", path))?;
    let nz = fields[2].parse().with_context(|| format!("{:?}: bad zsize", path))?;
    let resolution_mm = fields[3].parse().with_context(|| format!("{:?}: bad resolution", path))?;
    Ok(ImgHeader {
        version,
        nx,
        ny,
        nz,
        resolution_mm,
    })
}

fn read_body<T: std::str::FromStr>(
    lines: impl Iterator<Item = String>,
    expected: usize,
    path: &Path,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(expected);
    for line in lines {
        let t = line.trim();
        if t.is_empty() {
            continue;
        }
        let v = t
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{:?}: bad voxel id `{}`", path, t))?;
        out.push(v);
    }
    if out.len() != expected {
        anyhow::bail!(
            "{:?}: body holds {} voxels, header promises {}",
            path,
            out.len(),
            expected
        );
    }
    Ok(out)
}

/// Reads a phase-id image.
pub fn read_img(path: &Path) -> Result<(ImgHeader, Vec<u8>)> {
    let text =
        fs::read_to_string(path).with_context(|| format!("could not read image {:?}", path))?;
    let header = parse_header(text.lines(), path)?;
    let body = read_body(text.lines().skip(2).map(str::to_string), header.voxels(), path)?;
    for &id in &body {
        if id as usize >= phase::NPHASES {
            anyhow::bail!("{:?}: phase id {} out of range", path, id);
        }
    }
    Ok((header, body))
}

/// Reads a particle-id image; ids are unconstrained positive integers and
/// 0 marks a one-voxel particle.
pub fn read_pimg(path: &Path) -> Result<(ImgHeader, Vec<u32>)> {
    let text =
        fs::read_to_string(path).with_context(|| format!("could not read image {:?}", path))?;
    let header = parse_header(text.lines(), path)?;
    let body = read_body(text.lines().skip(2).map(str::to_string), header.voxels(), path)?;
    Ok((header, body))
}

/// The `.img`/`.pimg` pair must describe the same lattice.
pub fn check_pair(img: &ImgHeader, pimg: &ImgHeader) -> Result<()> {
    if (img.nx, img.ny, img.nz) != (pimg.nx, pimg.ny, pimg.nz) {
        return Err(SimError::SizeMismatch(format!(
            "{}x{}x{} vs {}x{}x{}",
            img.nx, img.ny, img.nz, pimg.nx, pimg.ny, pimg.nz
        ))
        .into());
    }
    Ok(())
}

fn render(
    nx: usize,
    ny: usize,
    nz: usize,
    resolution_mm: f64,
    mic: &[u8],
) -> String {
    let mut s = String::with_capacity(mic.len() * 3 + 64);
    s.push_str(&format!("Version: {:.1}\n", CURRENT_VERSION));
    s.push_str(&format!("{} {} {} {}\n", nx, ny, nz, resolution_mm));
    for &id in mic {
        // Diffusing species are snapshots of the pore solution: remap to
        // water-filled porosity on write.
        let out = if phase::is_diffusing(id) { phase::POROSITY } else { id };
        s.push_str(itoa(out));
        s.push('\n');
    }
    s
}

// Small fixed table beats formatting machinery in the million-line body loop.
fn itoa(id: u8) -> &'static str {
    const TABLE: [&str; 64] = [
        "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15",
        "16", "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30",
        "31", "32", "33", "34", "35", "36", "37", "38", "39", "40", "41", "42", "43", "44", "45",
        "46", "47", "48", "49", "50", "51", "52", "53", "54", "55", "56", "57", "58", "59", "60",
        "61", "62", "63",
    ];
    TABLE[id as usize]
}

/// Writes a microstructure snapshot, remapping diffusing ids to porosity.
pub fn write_snapshot(
    path: &Path,
    nx: usize,
    ny: usize,
    nz: usize,
    resolution_mm: f64,
    mic: &[u8],
) -> Result<()> {
    fs::write(path, render(nx, ny, nz, resolution_mm, mic))
        .with_context(|| format!("could not write snapshot {:?}", path))
}

/// Appends one movie frame (full header + body) to the `.mov` file.
pub fn append_movie_frame(
    path: &Path,
    nx: usize,
    ny: usize,
    nz: usize,
    resolution_mm: f64,
    mic: &[u8],
) -> Result<()> {
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("could not open movie file {:?}", path))?;
    f.write_all(render(nx, ny, nz, resolution_mm, mic).as_bytes())
        .with_context(|| format!("could not append movie frame to {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::{C3S, DIFFCH, POROSITY};

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn snapshot_read_back_preserves_solid_counts() {
        let mic = vec![C3S, POROSITY, DIFFCH, C3S, POROSITY, POROSITY, C3S, C3S];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.img");
        write_snapshot(&path, 2, 2, 2, 0.001, &mic).unwrap();
        let (header, back) = read_img(&path).unwrap();
        assert_eq!((header.nx, header.ny, header.nz), (2, 2, 2));
        assert_eq!(back.iter().filter(|&&v| v == C3S).count(), 4);
        // Diffusing ids are intentionally lost to porosity.
        assert_eq!(back.iter().filter(|&&v| v == POROSITY).count(), 4);
    }

    #[test]
    fn legacy_version_is_rejected() {
        let f = write_temp("Version: 6.0\n2 2 2 0.001\n0\n");
        let err = read_img(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("legacy"));
    }

    #[test]
    fn body_length_must_match_header() {
        let f = write_temp("Version: 7.0\n2 2 2 0.001\n0\n0\n0\n");
        assert!(read_img(f.path()).is_err());
    }

    #[test]
    fn mismatched_pair_is_a_configuration_error() {
        let a = ImgHeader { version: 7.0, nx: 2, ny: 2, nz: 2, resolution_mm: 0.001 };
        let b = ImgHeader { version: 7.0, nx: 2, ny: 3, nz: 2, resolution_mm: 0.001 };
        assert!(check_pair(&a, &b).is_err());
        assert!(check_pair(&a, &a).is_ok());
    }
}
