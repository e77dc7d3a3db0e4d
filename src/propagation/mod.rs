//! SGP4 propagation adapter using satkit
//!
//! The rest of the crate consumes orbital mechanics through the narrow
//! [`Propagator`] trait: advance an orbital state to a Julian date and read
//! back the sub-satellite point. The satkit-backed implementation lives here;
//! tests and callers that do not need real orbits substitute their own.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use nalgebra::Vector3;
use satkit::frametransform::qteme2itrf;
use satkit::sgp4::{sgp4, SGP4Error};
use satkit::ITRFCoord;
use thiserror::Error;

use crate::geo::norm_lon;

/// Sub-satellite point in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubPoint {
    pub lat_deg: f64,
    pub lon_deg: f64,
}

/// Ground observer location, paired with the orbital state for a run.
/// Pass-geometry quantities the upstream routine derives (azimuth,
/// elevation) are computed against this site; the sub-satellite point
/// itself does not depend on it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObserverSite {
    pub lat_deg: f64,
    pub lon_deg: f64,
    pub alt_m: f64,
}

impl Default for ObserverSite {
    fn default() -> Self {
        Self {
            lat_deg: 0.0,
            lon_deg: 0.0,
            alt_m: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum PropagationError {
    /// SGP4 refused the state, most commonly a decayed orbit. satkit's error
    /// result doubles as the decayed-orbit predicate of the upstream routine.
    #[error("SGP4 propagation failed at jd {jd}: {detail}")]
    Sgp4 { jd: f64, detail: String },
}

/// Advances an orbital state to a target Julian date and yields the current
/// sub-satellite latitude and longitude.
///
/// Implementations mutate only their own state; callers hand each worker a
/// private clone so no state is ever shared between threads.
pub trait Propagator: Send {
    fn advance(&mut self, jd: f64) -> Result<SubPoint, PropagationError>;
}

/// TLE-backed propagator using satkit's SGP4
#[derive(Clone)]
pub struct SgpPropagator {
    tle: satkit::TLE,
    sat_name: String,
    site: ObserverSite,
    epoch: satkit::Instant,
    epoch_jd: f64,
}

impl SgpPropagator {
    /// Build from the two element lines. `sat_name` is a display identifier
    /// only (export metadata); it does not affect propagation.
    pub fn from_lines(sat_name: &str, line1: &str, line2: &str) -> Result<Self> {
        let tle = satkit::TLE::load_2line(line1, line2)
            .map_err(|e| anyhow!("failed to parse TLE: {}", e))?;
        let epoch = instant_now();
        let epoch_jd = epoch.as_jd();
        Ok(Self {
            tle,
            sat_name: sat_name.to_string(),
            site: ObserverSite::default(),
            epoch,
            epoch_jd,
        })
    }

    /// Set the observer site for the run
    pub fn with_site(mut self, site: ObserverSite) -> Self {
        self.site = site;
        self
    }

    pub fn site(&self) -> &ObserverSite {
        &self.site
    }

    /// Load the first element set found in a TLE file. An optional name line
    /// preceding the element pair becomes the satellite identifier; otherwise
    /// the file stem is used.
    pub fn from_tle_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read TLE file {:?}", path))?;

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        for (i, window) in lines.windows(2).enumerate() {
            if window[0].starts_with("1 ") && window[1].starts_with("2 ") {
                let name = if i > 0 && !lines[i - 1].starts_with("1 ") {
                    lines[i - 1].to_string()
                } else {
                    path.file_stem()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                };
                log::info!("Loaded TLE '{}' from {:?}", name, path);
                return Self::from_lines(&name, window[0], window[1]);
            }
        }
        Err(anyhow!("no TLE element pair found in {:?}", path))
    }

    /// Satellite identifier for export metadata
    pub fn sat_name(&self) -> &str {
        &self.sat_name
    }

    /// Julian date of the run epoch captured at construction
    pub fn epoch_jd(&self) -> f64 {
        self.epoch_jd
    }
}

impl Propagator for SgpPropagator {
    fn advance(&mut self, jd: f64) -> Result<SubPoint, PropagationError> {
        let tm = self.epoch + satkit::Duration::from_seconds((jd - self.epoch_jd) * 86_400.0);

        let (p_teme_mat, _v_teme_mat, errs) = sgp4(&mut self.tle, &[tm]);
        if let Some(err) = errs.into_iter().find(|e| *e != SGP4Error::SGP4Success) {
            return Err(PropagationError::Sgp4 {
                jd,
                detail: format!("{:?}", err),
            });
        }

        // pos is in the TEME frame, meters; rotate to ITRF for geodetic coords
        let pos = p_teme_mat.column(0);
        let p_teme = Vector3::new(pos[0], pos[1], pos[2]);
        let p_itrf = qteme2itrf(&tm).to_rotation_matrix() * p_teme;
        let coord = ITRFCoord::from_slice(p_itrf.as_slice()).map_err(|e| {
            PropagationError::Sgp4 {
                jd,
                detail: format!("{:?}", e),
            }
        })?;

        Ok(SubPoint {
            lat_deg: coord.latitude_deg().clamp(-90.0, 90.0),
            lon_deg: norm_lon(coord.longitude_deg()),
        })
    }
}

/// Current UTC time as a satkit Instant
pub fn instant_now() -> satkit::Instant {
    use chrono::{Datelike, Timelike};
    let now = chrono::Utc::now();
    satkit::Instant::from_datetime(
        now.year(),
        now.month() as i32,
        now.day() as i32,
        now.hour() as i32,
        now.minute() as i32,
        now.second() as f64,
    )
}
