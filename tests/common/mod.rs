//! Shared fixtures for the integration tests

#![allow(dead_code)]

use icetide::core::{DeltaTimeTable, ExtractionOptions, HarmonicConstants, HarmonicService, LeapSecondTable, MemoryWriter, PredictionService};
use icetide::io::{MemoryOpener, MemorySource};
use icetide::pipeline::Services;
use icetide::{ModelDescriptor, TideResult};
use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const TIME_FILL: f64 = 1.7976931348623157e308;
pub const HEIGHT_FILL: f64 = 3.4028234663852886e38;
pub const ATL11_NAME: &str = "ATL11_001811_0304_002_01.h5";
pub const QFIT_NAME: &str = "ILATM1B_20110421_132407.ATM4BT4.qi";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Amplitude 0.5 and phase 0 for every constituent, masked north of `mask_above`
pub struct ConstantHarmonics {
    pub constituents: Vec<String>,
    pub mask_above: f64,
    pub calls: AtomicUsize,
}

impl ConstantHarmonics {
    pub fn new(constituents: &[&str], mask_above: f64) -> Self {
        Self {
            constituents: constituents.iter().map(|c| c.to_string()).collect(),
            mask_above,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HarmonicService for ConstantHarmonics {
    fn extract_constants(
        &self,
        longitude: ArrayView1<f64>,
        latitude: ArrayView1<f64>,
        _model: &ModelDescriptor,
        _options: &ExtractionOptions,
    ) -> TideResult<HarmonicConstants> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let shape = (longitude.len(), self.constituents.len());
        let mut mask = Array2::from_elem(shape, false);
        for (i, &lat) in latitude.iter().enumerate() {
            if lat > self.mask_above {
                mask.row_mut(i).fill(true);
            }
        }
        Ok(HarmonicConstants {
            amplitude: Array2::from_elem(shape, 0.5),
            phase: Array2::zeros(shape),
            mask,
            constituents: self.constituents.clone(),
        })
    }
}

/// Sums the real parts of the oscillations and adds the delta time as the minor part
pub struct SummingPrediction {
    pub catalog: Vec<String>,
}

impl SummingPrediction {
    pub fn new(catalog: &[&str]) -> Self {
        Self { catalog: catalog.iter().map(|c| c.to_string()).collect() }
    }
}

impl PredictionService for SummingPrediction {
    fn catalog(&self, _format: &str) -> Vec<String> {
        self.catalog.clone()
    }

    fn predict(
        &self,
        _time: ArrayView1<f64>,
        hc: ArrayView2<Complex64>,
        _constituents: &[String],
        _delta_time: ArrayView1<f64>,
        _format: &str,
    ) -> TideResult<Array1<f64>> {
        Ok(hc.map_axis(Axis(1), |row| row.iter().map(|c| c.re).sum::<f64>()))
    }

    fn infer_minor(
        &self,
        _time: ArrayView1<f64>,
        _hc: ArrayView2<Complex64>,
        _constituents: &[String],
        delta_time: ArrayView1<f64>,
        _format: &str,
    ) -> TideResult<Array1<f64>> {
        Ok(delta_time.to_owned())
    }
}

/// Everything a run needs, owned in one place
pub struct Fixture {
    pub harmonic: ConstantHarmonics,
    pub prediction: SummingPrediction,
    pub delta_time: DeltaTimeTable,
    pub leap_seconds: LeapSecondTable,
    pub opener: MemoryOpener,
    pub writer: MemoryWriter,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            harmonic: ConstantHarmonics::new(&["m2", "s2"], 80.0),
            prediction: SummingPrediction::new(&["m2", "s2", "k1", "o1"]),
            delta_time: DeltaTimeTable::parse("1992 1 1 86.4\n2030 1 1 86.4\n").expect("delta time table"),
            leap_seconds: LeapSecondTable::new(),
            opener: MemoryOpener::new(),
            writer: MemoryWriter::new(),
        }
    }

    pub fn services(&self) -> Services<'_> {
        Services {
            harmonic: &self.harmonic,
            prediction: &self.prediction,
            delta_time: &self.delta_time,
            leap_seconds: &self.leap_seconds,
            opener: &self.opener,
            writer: &self.writer,
        }
    }
}

/// ATL11 granule: pair pt1 with three reference points over two cycles,
/// one missing along-track time and one missing crossover time
pub fn atl11_source() -> MemorySource {
    let crossing = |name: &str| format!("pt1/crossing_track_data/{}", name);
    MemorySource::new()
        .with_f64("ancillary_data/atlas_sdp_gps_epoch", array![1_198_800_018.0])
        .with_attr("ancillary_data/atlas_sdp_gps_epoch", "units", "seconds since 1980-01-06T00:00:00.000000Z")
        .with_i64("pt1/ref_pt", array![100i64, 101, 102])
        .with_i64("pt1/cycle_number", array![3i64, 4])
        .with_f64("pt1/latitude", array![-75.0, -75.1, -75.2])
        .with_f64("pt1/longitude", array![100.0, 100.1, 100.2])
        .with_f64(
            "pt1/delta_time",
            array![[4.0e7, 5.0e7], [4.0e7 + 1.0, TIME_FILL], [4.0e7 + 2.0, 5.0e7 + 2.0]],
        )
        .with_attr("pt1/delta_time", "_FillValue", TIME_FILL)
        .with_attr("pt1/h_corr", "_FillValue", HEIGHT_FILL)
        .with_attr("pt1", "beam_pair", 1i64)
        .with_attr("pt1", "ReferenceGroundTrack", 1181i64)
        .with_attr("pt1", "first_cycle", 3i64)
        .with_attr("pt1", "last_cycle", 4i64)
        .with_attr("pt1", "equatorial_radius", 6378137.0)
        .with_attr("pt1", "polar_radius", 6356752.3)
        .with_i64(&crossing("ref_pt"), array![101i64, 102])
        .with_i64(&crossing("rgt"), array![77i64, 78])
        .with_i64(&crossing("cycle_number"), array![3i64, 4])
        .with_f64(&crossing("latitude"), array![-75.1, -75.2])
        .with_f64(&crossing("longitude"), array![100.1, 100.2])
        .with_f64(&crossing("delta_time"), array![4.5e7, TIME_FILL])
        .with_attr(&crossing("delta_time"), "_FillValue", TIME_FILL)
}

/// Big-endian 12-word QFIT file: length record, one header record, then data
pub fn write_qfit(path: &Path, records: &[(f64, f64, f64, f64)]) {
    const WORDS: usize = 12;
    let mut words: Vec<i32> = Vec::new();
    let mut length = vec![0i32; WORDS];
    length[0] = (WORDS * 4) as i32;
    let mut header = vec![0i32; WORDS];
    header[0] = -1;
    words.extend(length);
    words.extend(header);
    for &(lat, lon, elev, hhmmss) in records {
        let mut record = vec![0i32; WORDS];
        record[0] = 1000;
        record[1] = (lat * 1e6).round() as i32;
        record[2] = (lon * 1e6).round() as i32;
        record[3] = (elev * 1e3).round() as i32;
        record[WORDS - 1] = (hhmmss * 1e3).round() as i32;
        words.extend(record);
    }
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    std::fs::write(path, bytes).expect("Failed to write QFIT fixture");
}
