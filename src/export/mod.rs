//! Deterministic CSV / TXT export
//!
//! CSV output is UTF-8 with a BOM (Excel then detects the encoding and the
//! degree signs survive), comma-separated with RFC-style quoting, `\n` line
//! ends, fixed numeric formats. The TXT variant is tab-separated with no BOM
//! and no quoting. The whole file is built in memory and written with one
//! call so a failure rarely leaves a partial file behind.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ephemeris::EphemSample;
use crate::poi::PoiPick;
use crate::territory::TerritoryRow;

const BOM: &str = "\u{feff}";

pub const POI_CSV_HEADER: &str = "Time,Latitude,Longitude,Range_km,Direction,Name,Type";
const POI_TXT_HEADER: &str = "Time\tLatitude\tLongitude\tRange (km)\tDirection\tName\tType";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write export '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output flavor for export files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Txt,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
        }
    }
}

/// Fixed-format metadata preamble, emitted as `#` comment lines when present
#[derive(Debug, Clone)]
pub struct ExportMeta {
    pub tle_id: String,
    pub step_s: u64,
    pub horizon_h: u64,
}

/// Quote a CSV field if it contains a separator, quote, or line break;
/// embedded quotes are doubled
fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\r', '\n']) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for c in s.chars() {
            if c == '"' {
                out.push('"');
            }
            out.push(c);
        }
        out.push('"');
        out
    } else {
        s.to_string()
    }
}

/// Bearing rendered for the Direction column, e.g. `81.2°`
pub fn format_bearing(bearing_deg: f64) -> String {
    format!("{:.1}°", bearing_deg)
}

fn preamble(meta: Option<&ExportMeta>) -> String {
    match meta {
        Some(m) => format!(
            "# tle={}\n# step_s={}\n# horizon_h={}\n",
            m.tle_id, m.step_s, m.horizon_h
        ),
        None => String::new(),
    }
}

fn write_all(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::info!("Wrote export to {:?} ({} bytes)", path, contents.len());
    Ok(())
}

/// Write per-POI closest-approach picks
pub fn write_poi_export(
    path: impl AsRef<Path>,
    picks: &[PoiPick],
    format: ExportFormat,
    meta: Option<&ExportMeta>,
) -> Result<(), ExportError> {
    let mut out = String::new();
    match format {
        ExportFormat::Csv => {
            out.push_str(BOM);
            out.push_str(&preamble(meta));
            out.push_str(POI_CSV_HEADER);
            out.push('\n');
            for p in picks {
                out.push_str(&format!(
                    "{},{:.5},{:.5},{:.3},{},{},{}\n",
                    csv_escape(&p.time_str),
                    p.lat,
                    p.lon,
                    p.range_km,
                    csv_escape(&format_bearing(p.bearing_deg)),
                    csv_escape(&p.name),
                    csv_escape(&p.poi_type),
                ));
            }
        }
        ExportFormat::Txt => {
            out.push_str(&preamble(meta));
            out.push_str(POI_TXT_HEADER);
            out.push('\n');
            for p in picks {
                out.push_str(&format!(
                    "{}\t{:.5}\t{:.5}\t{:.3}\t{}\t{}\t{}\n",
                    p.time_str,
                    p.lat,
                    p.lon,
                    p.range_km,
                    format_bearing(p.bearing_deg),
                    p.name,
                    p.poi_type,
                ));
            }
        }
    }
    write_all(path.as_ref(), &out)
}

/// Write the raw ground track (time, latitude, longitude)
pub fn write_track_export(
    path: impl AsRef<Path>,
    samples: &[EphemSample],
    meta: Option<&ExportMeta>,
) -> Result<(), ExportError> {
    let mut out = String::from(BOM);
    out.push_str(&preamble(meta));
    out.push_str("Time,Latitude,Longitude\n");
    for s in samples {
        out.push_str(&format!(
            "{},{:.5},{:.5}\n",
            csv_escape(&s.time_str),
            s.lat,
            s.lon
        ));
    }
    write_all(path.as_ref(), &out)
}

/// Write labeled territory rows. Blank gap-marker rows are display-only and
/// are skipped here.
pub fn write_territory_export(
    path: impl AsRef<Path>,
    rows: &[TerritoryRow],
    meta: Option<&ExportMeta>,
) -> Result<(), ExportError> {
    let mut out = String::from(BOM);
    out.push_str(&preamble(meta));
    out.push_str("Time,Latitude,Longitude,Country\n");
    for r in rows.iter().filter(|r| !r.is_gap_marker()) {
        out.push_str(&format!(
            "{},{:.5},{:.5},{}\n",
            csv_escape(&r.time_str),
            r.lat,
            r.lon,
            csv_escape(&r.country)
        ));
    }
    write_all(path.as_ref(), &out)
}

/// Default export filename stamped from the current UTC time:
/// `poi_YYYYMMDD_HHMMSS.csv` / `.txt`
pub fn default_export_name(format: ExportFormat) -> String {
    format!(
        "{}.{}",
        chrono::Utc::now().format("poi_%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Append the format's extension unless the path already ends with it
pub fn ensure_extension(path: &Path, format: ExportFormat) -> PathBuf {
    let ext = format.extension();
    match path.extension().and_then(|e| e.to_str()) {
        Some(e) if e.eq_ignore_ascii_case(ext) => path.to_path_buf(),
        _ => {
            let mut s = path.as_os_str().to_os_string();
            s.push(".");
            s.push(ext);
            PathBuf::from(s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pick(name: &str) -> PoiPick {
        PoiPick {
            time_str: "2025/06/05 22:27:50".into(),
            lat: 48.8566,
            lon: 2.3522,
            range_km: 0.685,
            bearing_deg: 81.23,
            name: name.into(),
            poi_type: "city".into(),
        }
    }

    #[test]
    fn csv_starts_with_bom_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let picks = vec![pick("Paris"), pick("Lyon"), pick("Nice")];
        write_poi_export(&path, &picks, ExportFormat::Csv, None).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);

        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], POI_CSV_HEADER);
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[1],
            "2025/06/05 22:27:50,48.85660,2.35220,0.685,81.2°,Paris,city"
        );
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut p = pick("Pas-de-Calais, Nord");
        p.poi_type = "say \"hi\"".into();
        write_poi_export(&path, &[p], ExportFormat::Csv, None).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Pas-de-Calais, Nord\""));
        assert!(text.contains("\"say \"\"hi\"\"\""));
    }

    #[test]
    fn txt_variant_has_no_bom_and_tabs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_poi_export(&path, &[pick("Paris")], ExportFormat::Txt, None).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_ne!(&bytes[..3], &[0xEF, 0xBB, 0xBF]);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Time\tLatitude"));
        assert!(text.lines().nth(1).unwrap().contains('\t'));
        assert!(!text.contains('"'));
    }

    #[test]
    fn metadata_preamble_precedes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let meta = ExportMeta {
            tle_id: "SENTINEL-2A".into(),
            step_s: 1,
            horizon_h: 24,
        };
        write_poi_export(&path, &[pick("Paris")], ExportFormat::Csv, Some(&meta)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let text = text.trim_start_matches('\u{feff}');
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# tle=SENTINEL-2A");
        assert_eq!(lines[1], "# step_s=1");
        assert_eq!(lines[2], "# horizon_h=24");
        assert_eq!(lines[3], POI_CSV_HEADER);
    }

    #[test]
    fn territory_export_skips_gap_markers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("zones.csv");
        let rows = vec![
            TerritoryRow {
                time_str: "2025/06/05 22:27:50".into(),
                lat: 51.5074,
                lon: -0.1278,
                country: "United Kingdom".into(),
            },
            TerritoryRow {
                time_str: String::new(),
                lat: 0.0,
                lon: 0.0,
                country: String::new(),
            },
            TerritoryRow {
                time_str: "2025/06/05 22:28:40".into(),
                lat: 48.8566,
                lon: 2.3522,
                country: "France".into(),
            },
        ];
        write_territory_export(&path, &rows, None).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        // header + two data rows, no blank row
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("51.50740,-0.12780,United Kingdom"));
    }

    #[test]
    fn default_name_matches_stamp_pattern() {
        let name = default_export_name(ExportFormat::Csv);
        assert!(name.starts_with("poi_"));
        assert!(name.ends_with(".csv"));
        // poi_YYYYMMDD_HHMMSS.csv
        assert_eq!(name.len(), "poi_20250605_222750.csv".len());
    }

    #[test]
    fn ensure_extension_appends_when_missing() {
        assert_eq!(
            ensure_extension(Path::new("out"), ExportFormat::Csv),
            PathBuf::from("out.csv")
        );
        assert_eq!(
            ensure_extension(Path::new("out.csv"), ExportFormat::Csv),
            PathBuf::from("out.csv")
        );
        assert_eq!(
            ensure_extension(Path::new("out.csv"), ExportFormat::Txt),
            PathBuf::from("out.csv.txt")
        );
    }

    #[test]
    fn failed_write_surfaces_error() {
        let err = write_poi_export(
            "/nonexistent-dir/out.csv",
            &[pick("Paris")],
            ExportFormat::Csv,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
