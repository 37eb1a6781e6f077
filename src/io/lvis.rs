use crate::io::container::{read_f64_1d, HierarchicalSource};
use crate::types::{TideError, TideResult};
use ndarray::{Array1, Zip};

/// LVIS data structure generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LdsVersion {
    /// Centroid geolocation and elevation stored directly
    V1_04,
    /// Only low/top geolocation and relative heights stored
    V2_0_2,
}

impl LdsVersion {
    /// Schema of a release year (`R18xx` and later use LDS 2.0.2)
    pub fn from_release_year(year: u32) -> Self {
        if year >= 18 {
            LdsVersion::V2_0_2
        } else {
            LdsVersion::V1_04
        }
    }
}

/// Elevation, position and uncertainty of each LVIS shot
#[derive(Debug, Clone)]
pub struct LvisRecords {
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub elevation: Array1<f64>,
    pub error: Array1<f64>,
    /// UTC seconds since 2000-01-01T12:00:00
    pub time_j2000: Array1<f64>,
}

/// Waveform surfaces as read from the container
#[derive(Debug, Clone)]
pub struct LvisSurfaces {
    pub elev_low: Array1<f64>,
    pub elev_high: Array1<f64>,
    pub centroid_elevation: Array1<f64>,
    pub centroid_latitude: Array1<f64>,
    pub centroid_longitude: Array1<f64>,
    pub low_latitude: Array1<f64>,
    pub low_longitude: Array1<f64>,
}

pub fn read_lvis(source: &dyn HierarchicalSource, version: LdsVersion) -> TideResult<LvisRecords> {
    let surfaces = read_surfaces(source, version)?;
    let time_j2000 = read_f64_1d(source, "Time/J2000")?;
    let mut records = select_surfaces(&surfaces)?;
    if time_j2000.len() != records.elevation.len() {
        return Err(TideError::Format(format!(
            "LVIS time has {} shots, elevation has {}",
            time_j2000.len(),
            records.elevation.len()
        )));
    }
    records.time_j2000 = time_j2000;
    Ok(records)
}

pub fn read_surfaces(source: &dyn HierarchicalSource, version: LdsVersion) -> TideResult<LvisSurfaces> {
    let elev_low = read_f64_1d(source, "Elevation_Surfaces/Elevation_Low")?;
    let elev_high = read_f64_1d(source, "Elevation_Surfaces/Elevation_High")?;
    let low_latitude = read_f64_1d(source, "Geolocation/Latitude_Low")?;
    let low_longitude = read_f64_1d(source, "Geolocation/Longitude_Low")?;

    let (centroid_elevation, centroid_latitude, centroid_longitude) = match version {
        LdsVersion::V1_04 => (
            read_f64_1d(source, "Elevation_Surfaces/Elevation_Centroid")?,
            read_f64_1d(source, "Geolocation/Latitude_Centroid")?,
            read_f64_1d(source, "Geolocation/Longitude_Centroid")?,
        ),
        LdsVersion::V2_0_2 => {
            let rh50 = read_f64_1d(source, "Waveform/RH50")?;
            let rh100 = read_f64_1d(source, "Waveform/RH100")?;
            let top_latitude = read_f64_1d(source, "Geolocation/Latitude_Top")?;
            let top_longitude = read_f64_1d(source, "Geolocation/Longitude_Top")?;
            check_lengths(elev_low.len(), &[&rh50, &rh100, &top_latitude, &top_longitude])?;
            // position interpolated linearly to the 50% energy height
            let along = |low: &Array1<f64>, top: &Array1<f64>| {
                let mut out = Array1::<f64>::zeros(low.len());
                Zip::from(&mut out)
                    .and(low)
                    .and(top)
                    .and(&rh50)
                    .and(&rh100)
                    .for_each(|o, &l, &t, &r50, &r100| *o = l + r50 * (t - l) / r100);
                out
            };
            (
                &elev_low + &rh50,
                along(&low_latitude, &top_latitude),
                along(&low_longitude, &top_longitude),
            )
        }
    };

    let surfaces = LvisSurfaces {
        elev_low,
        elev_high,
        centroid_elevation,
        centroid_latitude,
        centroid_longitude,
        low_latitude,
        low_longitude,
    };
    check_lengths(
        surfaces.elev_low.len(),
        &[
            &surfaces.elev_high,
            &surfaces.centroid_elevation,
            &surfaces.centroid_latitude,
            &surfaces.centroid_longitude,
            &surfaces.low_latitude,
            &surfaces.low_longitude,
        ],
    )?;
    Ok(surfaces)
}

/// Pick the low surface where the waveform is degenerate (low == high) and
/// the centroid elsewhere; the uncertainty is taken about the selected
/// elevation.
pub fn select_surfaces(surfaces: &LvisSurfaces) -> TideResult<LvisRecords> {
    let n = surfaces.elev_low.len();
    let mut latitude = Array1::<f64>::zeros(n);
    let mut longitude = Array1::<f64>::zeros(n);
    let mut elevation = Array1::<f64>::zeros(n);
    let mut error = Array1::<f64>::zeros(n);

    for i in 0..n {
        let low = surfaces.elev_low[i];
        let high = surfaces.elev_high[i];
        let (elev, lat, lon) = if low == high {
            (low, surfaces.low_latitude[i], surfaces.low_longitude[i])
        } else {
            (
                surfaces.centroid_elevation[i],
                surfaces.centroid_latitude[i],
                surfaces.centroid_longitude[i],
            )
        };
        elevation[i] = elev;
        latitude[i] = lat;
        longitude[i] = lon;
        error[i] = (((low - elev).powi(2) + (high - elev).powi(2)) / 2.0).sqrt();
    }

    let degenerate = surfaces
        .elev_low
        .iter()
        .zip(surfaces.elev_high.iter())
        .filter(|(l, h)| l == h)
        .count();
    log::debug!("LVIS shots: {} total, {} with degenerate waveforms", n, degenerate);

    Ok(LvisRecords { latitude, longitude, elevation, error, time_j2000: Array1::zeros(n) })
}

fn check_lengths(n: usize, arrays: &[&Array1<f64>]) -> TideResult<()> {
    match arrays.iter().find(|a| a.len() != n) {
        Some(a) => Err(TideError::Format(format!(
            "LVIS datasets disagree in length: {} and {}",
            n,
            a.len()
        ))),
        None => Ok(()),
    }
}
