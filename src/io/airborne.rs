//! Operation IceBridge readers
//!
//! Dispatches on the parsed granule name to the ATM ICESSN, ATM QFIT
//! (binary, text, HDF5) and LVIS readers and normalizes every product to
//! J2000 seconds.

use crate::core::time::{
    Clock, Epoch, LeapSecondService, PackedTime, RawTime, TimeConvention, TimeNormalizer,
};
use crate::io::container::{read_f64_1d, SourceOpener};
use crate::io::filename::{AirborneKind, AirborneName};
use crate::io::lvis::{read_lvis, LdsVersion};
use crate::io::qfit::read_qfit_binary;
use crate::io::subset::{subset, Subsetter};
use crate::io::text::{read_icessn, read_qfit_text, split_seconds_of_day};
use crate::types::{CanonicalTrack, Hemisphere, TideError, TideResult, TrackKind};
use chrono::NaiveDate;
use ndarray::{Array1, Ix1};
use std::path::Path;

/// Airborne measurements ready for tide computation
#[derive(Debug, Clone)]
pub struct AirborneData {
    pub name: AirborneName,
    pub hemisphere: Hemisphere,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub elevation: Array1<f64>,
    /// Elevation uncertainty where the product provides one
    pub error: Option<Array1<f64>>,
    /// UTC seconds since 2000-01-01T12:00:00
    pub time_j2000: Array1<f64>,
}

impl AirborneData {
    pub fn len(&self) -> usize {
        self.latitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_empty()
    }

    /// Point track on the tide time axis
    pub fn track(&self) -> TideResult<CanonicalTrack> {
        let j2000 = TimeConvention::J2000Seconds;
        let time = self.time_j2000.mapv(|t| j2000.convert(t, TimeConvention::TideDays));
        CanonicalTrack::flat(
            TrackKind::Point,
            self.latitude.clone(),
            self.longitude.clone(),
            time,
            Array1::from_elem(self.len(), false),
        )
    }

    /// Earliest finite J2000 time
    pub fn first_j2000(&self) -> Option<f64> {
        self.time_j2000
            .iter()
            .copied()
            .filter(|t| t.is_finite())
            .reduce(f64::min)
    }
}

struct Records {
    latitude: Array1<f64>,
    longitude: Array1<f64>,
    elevation: Array1<f64>,
    error: Option<Array1<f64>>,
    time_j2000: Array1<f64>,
}

/// Read an airborne granule, applying the optional record subset
pub fn read_airborne(
    path: &Path,
    name: &AirborneName,
    subsetter: Option<&Subsetter>,
    opener: &dyn SourceOpener,
    leap_seconds: &dyn LeapSecondService,
) -> TideResult<AirborneData> {
    let normalizer = TimeNormalizer::new(leap_seconds);
    let records = match name.kind {
        AirborneKind::Atm => read_icessn_records(path, name, &normalizer)?,
        AirborneKind::Atm1b => read_qfit_records(path, name, opener, &normalizer)?,
        AirborneKind::Lvis | AirborneKind::Lvgh => read_lvis_records(path, name, opener)?,
    };

    let latitude = subset(records.latitude, subsetter)?;
    let longitude = subset(records.longitude, subsetter)?;
    let elevation = subset(records.elevation, subsetter)?;
    let error = records.error.map(|e| subset(e, subsetter)).transpose()?;
    let time_j2000 = subset(records.time_j2000, subsetter)?;

    let hemisphere = name
        .hemisphere()
        .unwrap_or_else(|| Hemisphere::from_latitudes(latitude.view()));

    log::info!(
        "Read {} {} records from {} ({} hemisphere)",
        latitude.len(),
        name.kind.flag(),
        path.display(),
        hemisphere
    );

    Ok(AirborneData {
        name: name.clone(),
        hemisphere,
        latitude,
        longitude,
        elevation,
        error,
        time_j2000,
    })
}

fn read_icessn_records(
    path: &Path,
    name: &AirborneName,
    normalizer: &TimeNormalizer,
) -> TideResult<Records> {
    let records = read_icessn(path)?;
    let (hour, minute, second) = split_seconds_of_day(&records.seconds);
    // pre-IceBridge and non-csv ICESSN files are stamped in GPS time
    let clock = if name.mission == "BLATM2" || name.suffix != "csv" {
        Clock::Gps
    } else {
        Clock::Utc
    };
    let time_j2000 = calendar_j2000(normalizer, name.date, hour, minute, second, clock)?;
    Ok(Records {
        latitude: records.latitude,
        longitude: records.longitude,
        elevation: records.elevation,
        error: Some(records.error),
        time_j2000,
    })
}

fn read_qfit_records(
    path: &Path,
    name: &AirborneName,
    opener: &dyn SourceOpener,
    normalizer: &TimeNormalizer,
) -> TideResult<Records> {
    let (latitude, longitude, elevation, times) = match name.suffix.as_str() {
        "qi" => {
            let q = read_qfit_binary(path)?;
            let times = decode_packed(&q.time_hhmmss)?;
            (q.latitude, q.longitude, q.elevation, times)
        }
        "TXT" => {
            let t = read_qfit_text(path)?;
            (t.latitude, t.longitude, t.elevation, t.time)
        }
        "h5" => {
            let source = opener.open(path)?;
            let packed = read_f64_1d(source.as_ref(), "instrument_parameters/time_hhmmss")?;
            (
                read_f64_1d(source.as_ref(), "latitude")?,
                read_f64_1d(source.as_ref(), "longitude")?,
                read_f64_1d(source.as_ref(), "elevation")?,
                decode_packed(&packed)?,
            )
        }
        other => {
            return Err(TideError::Format(format!("Unsupported QFIT suffix: {}", other)));
        }
    };

    let hour = times.iter().map(|t| t.hour).collect();
    let minute = times.iter().map(|t| t.minute).collect();
    let second = times.iter().map(|t| t.second).collect();
    let time_j2000 = calendar_j2000(normalizer, name.date, hour, minute, second, Clock::Gps)?;
    Ok(Records { latitude, longitude, elevation, error: None, time_j2000 })
}

fn read_lvis_records(
    path: &Path,
    name: &AirborneName,
    opener: &dyn SourceOpener,
) -> TideResult<Records> {
    let year = name
        .release_year()
        .ok_or_else(|| TideError::Format(format!("Missing LVIS release in {:?}", name.release)))?;
    let version = LdsVersion::from_release_year(year);
    log::debug!("LVIS release {:?} uses {:?}", name.release, version);
    let source = opener.open(path)?;
    let lvis = read_lvis(source.as_ref(), version)?;
    let time_j2000 = lvis
        .time_j2000
        .mapv(|t| TimeConvention::J2000Seconds.from_seconds(t, Epoch::J2000));
    Ok(Records {
        latitude: lvis.latitude,
        longitude: lvis.longitude,
        elevation: lvis.elevation,
        error: Some(lvis.error),
        time_j2000,
    })
}

fn decode_packed(packed: &Array1<f64>) -> TideResult<Vec<PackedTime>> {
    packed.iter().map(|&p| PackedTime::decode(p)).collect()
}

fn calendar_j2000(
    normalizer: &TimeNormalizer,
    date: NaiveDate,
    hour: Array1<f64>,
    minute: Array1<f64>,
    second: Array1<f64>,
    clock: Clock,
) -> TideResult<Array1<f64>> {
    let raw = RawTime::Calendar { date, hour, minute, second, clock };
    normalizer
        .to_reference_epoch(&raw, TimeConvention::J2000Seconds)?
        .into_dimensionality::<Ix1>()
        .map_err(|e| TideError::Format(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::LeapSecondTable;
    use crate::io::container::{MemoryOpener, MemorySource};
    use crate::io::filename::parse_airborne;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::Write;

    #[test]
    fn test_icessn_csv_is_utc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ILATM2_20091031_000000_smooth_nadir3seg_50pt.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# header").unwrap();
        writeln!(f, "43200.0 -75.0 110.0 100.0 0 0 5.0 1 1 1 7").unwrap();
        writeln!(f, "43201.0 -75.1 110.1 101.0 0 0 5.0 1 1 1 7").unwrap();
        drop(f);

        let name = parse_airborne(path.file_name().unwrap().to_str().unwrap()).unwrap();
        let leaps = LeapSecondTable::new();
        let data = read_airborne(&path, &name, None, &MemoryOpener::new(), &leaps).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.hemisphere, Hemisphere::South);
        // 2009-10-31T12:00:00 UTC is 3591 days after J2000 noon
        assert_abs_diff_eq!(data.time_j2000[0], 3591.0 * 86400.0, epsilon = 1e-6);
        assert_abs_diff_eq!(data.error.as_ref().unwrap()[0], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_icessn_seg_is_gps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ILATM2_20091031_000000_smooth_nadir3seg_50pt.seg");
        std::fs::write(&path, "43215.0 70.0 310.0 100.0 0 0 5.0 1 1 1 7\n").unwrap();
        let name = parse_airborne(path.file_name().unwrap().to_str().unwrap()).unwrap();
        let leaps = LeapSecondTable::new();
        let data = read_airborne(&path, &name, None, &MemoryOpener::new(), &leaps).unwrap();
        // 15 leap seconds were in effect in 2009
        assert_abs_diff_eq!(data.time_j2000[0], 3591.0 * 86400.0, epsilon = 1e-6);
        assert_eq!(data.hemisphere, Hemisphere::North);
    }

    #[test]
    fn test_qfit_hdf5_subset() {
        let path = Path::new("/data/ILATM1B_20110421_132407.ATM4BT4.h5");
        let source = MemorySource::new()
            .with_f64("latitude", array![69.0, 69.1, 69.2])
            .with_f64("longitude", array![310.0, 310.1, 310.2])
            .with_f64("elevation", array![10.0, 11.0, 12.0])
            .with_f64("instrument_parameters/time_hhmmss", array![132407.0, 132408.0, 132409.0]);
        let mut opener = MemoryOpener::new();
        opener.insert(path, source);

        let name = parse_airborne("ILATM1B_20110421_132407.ATM4BT4.h5").unwrap();
        let subsetter = Subsetter::parse("[2,0]").unwrap();
        let leaps = LeapSecondTable::new();
        let data = read_airborne(path, &name, Some(&subsetter), &opener, &leaps).unwrap();
        assert_eq!(data.elevation, array![12.0, 10.0]);
        assert_abs_diff_eq!(data.time_j2000[0] - data.time_j2000[1], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(data.first_j2000().unwrap(), data.time_j2000[1]);
    }

    #[test]
    fn test_lvis_region_sets_hemisphere() {
        let path = Path::new("/data/ILVIS2_GL2017_0505_R1803_044025.H5");
        let source = MemorySource::new()
            .with_f64("Elevation_Surfaces/Elevation_Low", array![100.0])
            .with_f64("Elevation_Surfaces/Elevation_High", array![100.0])
            .with_f64("Waveform/RH50", array![0.0])
            .with_f64("Waveform/RH100", array![0.0])
            .with_f64("Geolocation/Latitude_Low", array![-1.0])
            .with_f64("Geolocation/Latitude_Top", array![-1.0])
            .with_f64("Geolocation/Longitude_Low", array![300.0])
            .with_f64("Geolocation/Longitude_Top", array![300.0])
            .with_f64("Time/J2000", array![5.5e8]);
        let mut opener = MemoryOpener::new();
        opener.insert(path, source);

        let name = parse_airborne("ILVIS2_GL2017_0505_R1803_044025.H5").unwrap();
        let leaps = LeapSecondTable::new();
        let data = read_airborne(path, &name, None, &opener, &leaps).unwrap();
        assert_eq!(data.hemisphere, Hemisphere::North);
        assert_eq!(data.time_j2000, array![5.5e8]);
        let track = data.track().unwrap();
        assert_abs_diff_eq!(track.time[[0, 0]], 2922.5 + 5.5e8 / 86400.0, epsilon = 1e-9);
    }
}
