//! Tide correction engine
//!
//! Harmonic constants are extracted once per track, turned into complex
//! constituent oscillations and handed to the prediction service column by
//! column over the valid points. Invalid points end up masked and set to
//! the fill value.

use crate::core::time::{DeltaTimeService, TimeConvention};
use crate::models::ModelDescriptor;
use crate::types::{CanonicalTrack, TideError, TideResult, TidePrediction};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::PI;
use std::str::FromStr;

/// Spatial interpolation of model grids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Spline,
    Linear,
    Nearest,
    Bilinear,
}

impl FromStr for Interpolation {
    type Err = TideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spline" => Ok(Interpolation::Spline),
            "linear" => Ok(Interpolation::Linear),
            "nearest" => Ok(Interpolation::Nearest),
            "bilinear" => Ok(Interpolation::Bilinear),
            _ => Err(TideError::Config(format!("Unknown interpolation method: {}", s))),
        }
    }
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Interpolation::Spline => "spline",
            Interpolation::Linear => "linear",
            Interpolation::Nearest => "nearest",
            Interpolation::Bilinear => "bilinear",
        };
        write!(f, "{}", name)
    }
}

/// Options handed to the harmonic service
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOptions {
    pub method: Interpolation,
    /// Extrapolate constants to points outside the model domain
    pub extrapolate: bool,
    /// Extrapolation cutoff in kilometers; infinite means unconditional
    pub cutoff_km: f64,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            method: Interpolation::Spline,
            extrapolate: false,
            cutoff_km: 10.0,
        }
    }
}

/// Interpolated harmonic constants, `[points, constituents]`
#[derive(Debug, Clone)]
pub struct HarmonicConstants {
    pub amplitude: Array2<f64>,
    /// Degrees
    pub phase: Array2<f64>,
    pub mask: Array2<bool>,
    pub constituents: Vec<String>,
}

impl HarmonicConstants {
    /// Verify shapes and constituent identifiers against a prediction catalog
    pub fn check_consistency(&self, n_points: usize, catalog: &[String]) -> TideResult<()> {
        let expected = (n_points, self.constituents.len());
        for (name, dim) in [
            ("amplitude", self.amplitude.dim()),
            ("phase", self.phase.dim()),
            ("mask", self.mask.dim()),
        ] {
            if dim != expected {
                return Err(TideError::ModelIo(format!(
                    "Harmonic {} has shape {:?}, expected {:?}",
                    name, dim, expected
                )));
            }
        }

        let mut seen = HashSet::new();
        for c in &self.constituents {
            if !seen.insert(c.as_str()) {
                return Err(TideError::ModelIo(format!("Constituent {} appears more than once", c)));
            }
        }

        let known: HashSet<&str> = catalog.iter().map(String::as_str).collect();
        let unknown: Vec<&str> = self
            .constituents
            .iter()
            .map(String::as_str)
            .filter(|c| !known.contains(c))
            .collect();
        if !unknown.is_empty() {
            return Err(TideError::ModelIo(format!(
                "Constituents not known to the prediction service: {}",
                unknown.join(", ")
            )));
        }
        Ok(())
    }

    /// Complex oscillations `amplitude * exp(-i * phase)`
    pub fn oscillations(&self) -> Array2<Complex64> {
        let mut hc = Array2::<Complex64>::zeros(self.amplitude.raw_dim());
        Zip::from(&mut hc)
            .and(&self.amplitude)
            .and(&self.phase)
            .for_each(|h, &amp, &ph| *h = amp * Complex64::new(0.0, -ph * PI / 180.0).exp());
        hc
    }

    /// Points with any masked or non-finite constituent
    pub fn invalid_points(&self) -> Array1<bool> {
        let hc = self.oscillations();
        let mut invalid = Array1::from_elem(self.amplitude.nrows(), false);
        Zip::from(&mut invalid)
            .and(self.mask.rows())
            .and(hc.rows())
            .for_each(|bad, mask, h| {
                *bad = mask.iter().any(|&m| m) || h.iter().any(|c| !c.re.is_finite() || !c.im.is_finite())
            });
        invalid
    }
}

/// Extraction of harmonic constants at arbitrary points
pub trait HarmonicService: Send + Sync {
    fn extract_constants(
        &self,
        longitude: ArrayView1<f64>,
        latitude: ArrayView1<f64>,
        model: &ModelDescriptor,
        options: &ExtractionOptions,
    ) -> TideResult<HarmonicConstants>;
}

/// Harmonic prediction and minor-constituent inference
pub trait PredictionService: Send + Sync {
    /// Constituent identifiers understood for a model format tag
    fn catalog(&self, format: &str) -> Vec<String>;

    /// Tide at each time from major constituents (`time` in tide days)
    fn predict(
        &self,
        time: ArrayView1<f64>,
        hc: ArrayView2<Complex64>,
        constituents: &[String],
        delta_time: ArrayView1<f64>,
        format: &str,
    ) -> TideResult<Array1<f64>>;

    /// Minor constituent corrections at each time
    fn infer_minor(
        &self,
        time: ArrayView1<f64>,
        hc: ArrayView2<Complex64>,
        constituents: &[String],
        delta_time: ArrayView1<f64>,
        format: &str,
    ) -> TideResult<Array1<f64>>;
}

/// Tide engine over external harmonic, prediction and delta-time services
pub struct TideEngine<'a> {
    harmonic: &'a dyn HarmonicService,
    prediction: &'a dyn PredictionService,
    delta_time: &'a dyn DeltaTimeService,
    options: ExtractionOptions,
}

impl<'a> TideEngine<'a> {
    pub fn new(
        harmonic: &'a dyn HarmonicService,
        prediction: &'a dyn PredictionService,
        delta_time: &'a dyn DeltaTimeService,
        options: ExtractionOptions,
    ) -> Self {
        Self { harmonic, prediction, delta_time, options }
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Predict tides for every point and column of `track`
    pub fn predict(
        &self,
        track: &CanonicalTrack,
        model: &ModelDescriptor,
        fill_value: f64,
    ) -> TideResult<TidePrediction> {
        let (n_points, n_columns) = track.time.dim();
        log::debug!(
            "Predicting {} tides for {:?} track: {} points x {} columns",
            model.id,
            track.kind,
            n_points,
            n_columns
        );

        let constants = self
            .harmonic
            .extract_constants(track.longitude.view(), track.latitude.view(), model, &self.options)
            .map_err(into_model_error)?;
        let format = model.format_tag();
        constants.check_consistency(n_points, &self.prediction.catalog(format))?;

        let hc = constants.oscillations();
        let invalid_points = constants.invalid_points();
        let delta_time = self.delta_time_for(track, model)?;

        let mut values = Array2::from_elem((n_points, n_columns), fill_value);
        let mut mask = track.mask.clone();
        for (column, mut column_mask) in mask.axis_iter_mut(Axis(1)).enumerate() {
            Zip::from(&mut column_mask)
                .and(&invalid_points)
                .for_each(|m, &bad| *m |= bad);

            let valid: Vec<usize> = column_mask
                .iter()
                .enumerate()
                .filter(|(_, &m)| !m)
                .map(|(i, _)| i)
                .collect();
            if valid.is_empty() {
                log::warn!("{} column {} has no valid points", model.id, column);
                continue;
            }

            let time = track.time.column(column).select(Axis(0), &valid);
            let dt = delta_time.column(column).select(Axis(0), &valid);
            let hc_valid = hc.select(Axis(0), &valid);

            let major = self
                .prediction
                .predict(time.view(), hc_valid.view(), &constants.constituents, dt.view(), format)
                .map_err(into_model_error)?;
            let minor = self
                .prediction
                .infer_minor(time.view(), hc_valid.view(), &constants.constituents, dt.view(), format)
                .map_err(into_model_error)?;
            if major.len() != valid.len() || minor.len() != valid.len() {
                return Err(TideError::ModelIo(format!(
                    "Prediction returned {} major and {} minor values for {} points",
                    major.len(),
                    minor.len(),
                    valid.len()
                )));
            }

            for (k, &i) in valid.iter().enumerate() {
                let tide = major[k] + minor[k];
                if tide.is_finite() {
                    values[[i, column]] = tide;
                } else {
                    column_mask[i] = true;
                }
            }
        }

        Zip::from(&mut values).and(&mask).for_each(|v, &m| {
            if m {
                *v = fill_value;
            }
        });

        let prediction = TidePrediction { values, mask, fill_value };
        log::debug!(
            "{} valid tide values of {}",
            prediction.valid_count(),
            n_points * n_columns
        );
        Ok(prediction)
    }

    /// TT - UT1 in days for every time of the track
    fn delta_time_for(&self, track: &CanonicalTrack, model: &ModelDescriptor) -> TideResult<Array2<f64>> {
        if model.kind.is_grid_based() {
            return Ok(Array2::zeros(track.time.raw_dim()));
        }
        let convention = self.delta_time.convention();
        let times: Array1<f64> = track
            .time
            .iter()
            .map(|&t| TimeConvention::TideDays.convert(t, convention))
            .collect();
        let delta = self.delta_time.interpolate(times.view())?;
        if delta.len() != times.len() {
            return Err(TideError::ModelIo(format!(
                "Delta time service returned {} values for {} times",
                delta.len(),
                times.len()
            )));
        }
        delta
            .into_shape(track.time.raw_dim())
            .map_err(|e| TideError::ModelIo(e.to_string()))
    }
}

fn into_model_error(error: TideError) -> TideError {
    match error {
        TideError::ModelIo(_) => error,
        other => TideError::ModelIo(other.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::time::DeltaTimeTable;
    use crate::models::resolve;
    use crate::types::TrackKind;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Constant amplitude/phase everywhere, masked where latitude is above `mask_above`
    pub(crate) struct MockHarmonic {
        pub constituents: Vec<String>,
        pub mask_above: f64,
        pub calls: AtomicUsize,
    }

    impl MockHarmonic {
        pub(crate) fn new(constituents: &[&str]) -> Self {
            Self {
                constituents: constituents.iter().map(|c| c.to_string()).collect(),
                mask_above: f64::INFINITY,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl HarmonicService for MockHarmonic {
        fn extract_constants(
            &self,
            longitude: ArrayView1<f64>,
            latitude: ArrayView1<f64>,
            _model: &ModelDescriptor,
            _options: &ExtractionOptions,
        ) -> TideResult<HarmonicConstants> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = longitude.len();
            let m = self.constituents.len();
            let mut mask = Array2::from_elem((n, m), false);
            for (i, &lat) in latitude.iter().enumerate() {
                if lat > self.mask_above {
                    mask.row_mut(i).fill(true);
                }
            }
            Ok(HarmonicConstants {
                amplitude: Array2::from_elem((n, m), 0.5),
                phase: Array2::zeros((n, m)),
                mask,
                constituents: self.constituents.clone(),
            })
        }
    }

    /// Predicts the real sum of oscillations plus the time, minor = delta time
    pub(crate) struct MockPrediction {
        pub catalog: Vec<String>,
        pub calls: AtomicUsize,
        pub seen_delta: Mutex<Vec<f64>>,
    }

    impl MockPrediction {
        pub(crate) fn new(catalog: &[&str]) -> Self {
            Self {
                catalog: catalog.iter().map(|c| c.to_string()).collect(),
                calls: AtomicUsize::new(0),
                seen_delta: Mutex::new(Vec::new()),
            }
        }
    }

    impl PredictionService for MockPrediction {
        fn catalog(&self, _format: &str) -> Vec<String> {
            self.catalog.clone()
        }

        fn predict(
            &self,
            time: ArrayView1<f64>,
            hc: ArrayView2<Complex64>,
            _constituents: &[String],
            delta_time: ArrayView1<f64>,
            _format: &str,
        ) -> TideResult<Array1<f64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_delta.lock().unwrap().extend(delta_time.iter());
            let sums = hc.map_axis(Axis(1), |row| row.iter().map(|c| c.re).sum::<f64>());
            Ok(&sums + &time.mapv(|t| if t < 0.0 { f64::NAN } else { 0.0 }))
        }

        fn infer_minor(
            &self,
            time: ArrayView1<f64>,
            _hc: ArrayView2<Complex64>,
            _constituents: &[String],
            delta_time: ArrayView1<f64>,
            _format: &str,
        ) -> TideResult<Array1<f64>> {
            Ok(Array1::from_elem(time.len(), 0.0) + &delta_time)
        }
    }

    fn delta_table() -> DeltaTimeTable {
        DeltaTimeTable::parse("1992 1 1 86.4\n2030 1 1 86.4\n").unwrap()
    }

    fn along_track(mask: Array2<bool>) -> CanonicalTrack {
        CanonicalTrack::new(
            TrackKind::AlongTrack,
            array![-75.0, -75.1, -75.2],
            array![100.0, 100.1, 100.2],
            Array2::from_elem((3, 2), 9000.0),
            mask,
        )
        .unwrap()
    }

    #[test]
    fn test_masked_cycle_gets_fill_values() {
        let harmonic = MockHarmonic::new(&["m2", "s2"]);
        let prediction = MockPrediction::new(&["m2", "s2", "k1"]);
        let table = delta_table();
        let engine = TideEngine::new(&harmonic, &prediction, &table, ExtractionOptions::default());
        let model = resolve("CATS2008", Path::new("/t")).unwrap();

        let mask = array![[true, false], [true, false], [true, false]];
        let result = engine.predict(&along_track(mask), &model, -9999.0).unwrap();

        assert_eq!(result.values.column(0).to_vec(), vec![-9999.0; 3]);
        for &v in result.values.column(1).iter() {
            assert_abs_diff_eq!(v, 1.0, epsilon = 1e-12);
        }
        assert_eq!(harmonic.calls.load(Ordering::SeqCst), 1);
        // the fully masked cycle never reaches the prediction service
        assert_eq!(prediction.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sentinel_iff_mask() {
        let mut harmonic = MockHarmonic::new(&["m2"]);
        harmonic.mask_above = -75.05;
        let prediction = MockPrediction::new(&["m2"]);
        let table = delta_table();
        let engine = TideEngine::new(&harmonic, &prediction, &table, ExtractionOptions::default());
        let model = resolve("CATS2008", Path::new("/t")).unwrap();

        let mut track = along_track(Array2::from_elem((3, 2), false));
        track.time[[2, 1]] = -1.0;
        let result = engine.predict(&track, &model, -9999.0).unwrap();

        assert_eq!(result.mask, array![[true, true], [false, false], [false, true]]);
        Zip::from(&result.values).and(&result.mask).for_each(|&v, &m| {
            assert_eq!(v == -9999.0, m);
            assert!(m || v.is_finite());
        });
    }

    #[test]
    fn test_grid_models_use_zero_delta_time() {
        let harmonic = MockHarmonic::new(&["m2"]);
        let prediction = MockPrediction::new(&["m2"]);
        let table = delta_table();
        let engine = TideEngine::new(&harmonic, &prediction, &table, ExtractionOptions::default());

        let track = along_track(Array2::from_elem((3, 2), false));
        let otis = resolve("TPXO9.1", Path::new("/t")).unwrap();
        engine.predict(&track, &otis, -9999.0).unwrap();
        assert!(prediction.seen_delta.lock().unwrap().iter().all(|&d| d == 0.0));

        prediction.seen_delta.lock().unwrap().clear();
        let got = resolve("GOT4.10", Path::new("/t")).unwrap();
        let result = engine.predict(&track, &got, -9999.0).unwrap();
        assert!(prediction.seen_delta.lock().unwrap().iter().all(|&d| (d - 0.001).abs() < 1e-12));
        assert_abs_diff_eq!(result.values[[0, 0]], 0.501, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_constituent_is_model_error() {
        let harmonic = MockHarmonic::new(&["m2", "x9"]);
        let prediction = MockPrediction::new(&["m2"]);
        let table = delta_table();
        let engine = TideEngine::new(&harmonic, &prediction, &table, ExtractionOptions::default());
        let model = resolve("CATS2008", Path::new("/t")).unwrap();
        let err = engine.predict(&along_track(Array2::from_elem((3, 2), false)), &model, 0.0);
        assert!(matches!(err, Err(TideError::ModelIo(ref m)) if m.contains("x9")));
    }

    #[test]
    fn test_duplicate_constituent_is_model_error() {
        let constants = HarmonicConstants {
            amplitude: Array2::zeros((1, 2)),
            phase: Array2::zeros((1, 2)),
            mask: Array2::from_elem((1, 2), false),
            constituents: vec!["m2".to_string(), "m2".to_string()],
        };
        let catalog = vec!["m2".to_string()];
        assert!(matches!(constants.check_consistency(1, &catalog), Err(TideError::ModelIo(_))));
        assert!(matches!(constants.check_consistency(2, &catalog), Err(TideError::ModelIo(_))));
    }

    #[test]
    fn test_oscillations() {
        let constants = HarmonicConstants {
            amplitude: array![[2.0]],
            phase: array![[90.0]],
            mask: array![[false]],
            constituents: vec!["m2".to_string()],
        };
        let hc = constants.oscillations();
        assert_abs_diff_eq!(hc[[0, 0]].re, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hc[[0, 0]].im, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolation_names() {
        assert_eq!("Bilinear".parse::<Interpolation>().unwrap(), Interpolation::Bilinear);
        assert!(matches!("cubic".parse::<Interpolation>(), Err(TideError::Config(_))));
        assert_eq!(Interpolation::default().to_string(), "spline");
    }
}
