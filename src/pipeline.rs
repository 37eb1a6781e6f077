//! Tide correction drivers and batch runner
//!
//! Each input granule goes through read, normalize, predict, assemble and
//! write, producing one output file next to the input (or in
//! [`TideOptions::output_dir`]).

use crate::core::output::ProductWriter;
use crate::core::products::{assemble_airborne, assemble_atl11, BeamPairTides, Provenance};
use crate::core::tide::{ExtractionOptions, HarmonicService, Interpolation, PredictionService, TideEngine};
use crate::core::time::{DeltaTimeService, LeapSecondService, TimeNormalizer};
use crate::io::airborne::read_airborne;
use crate::io::atl11::read_atl11;
use crate::io::container::SourceOpener;
use crate::io::filename::{airborne_output_name, atl11_output_name, classify, parse_airborne, InputProduct};
use crate::io::subset::InputArgument;
use crate::models::{resolve, ModelDescriptor};
use crate::types::{TideError, TideResult, AIRBORNE_FILL_VALUE};
use anyhow::Context;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TideOptions {
    /// Root directory of the tide model files
    pub tide_dir: PathBuf,
    pub model: String,
    pub interpolation: Interpolation,
    pub extrapolate: bool,
    /// Extrapolation cutoff in kilometers
    pub cutoff_km: f64,
    /// Permission bits applied to every output file
    pub mode: u32,
    /// Output directory; the input's directory when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for TideOptions {
    fn default() -> Self {
        Self {
            tide_dir: PathBuf::from("."),
            model: "CATS2008".to_string(),
            interpolation: Interpolation::Spline,
            extrapolate: false,
            cutoff_km: 10.0,
            mode: 0o775,
            output_dir: None,
        }
    }
}

impl TideOptions {
    pub fn extraction(&self) -> ExtractionOptions {
        ExtractionOptions {
            method: self.interpolation,
            extrapolate: self.extrapolate,
            cutoff_km: self.cutoff_km,
        }
    }

    /// Check the options and resolve the model
    pub fn validate(&self) -> TideResult<ModelDescriptor> {
        if self.cutoff_km.is_nan() || self.cutoff_km <= 0.0 {
            return Err(TideError::Config(format!(
                "Extrapolation cutoff must be positive, got {}",
                self.cutoff_km
            )));
        }
        if self.mode > 0o7777 {
            return Err(TideError::Config(format!("Invalid permission mode {:o}", self.mode)));
        }
        resolve(&self.model, &self.tide_dir)
    }

    fn output_path(&self, input: &Path, name: &str) -> PathBuf {
        let dir = self
            .output_dir
            .clone()
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(name)
    }
}

/// External collaborators of a run
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub harmonic: &'a dyn HarmonicService,
    pub prediction: &'a dyn PredictionService,
    pub delta_time: &'a dyn DeltaTimeService,
    pub leap_seconds: &'a dyn LeapSecondService,
    pub opener: &'a dyn SourceOpener,
    pub writer: &'a dyn ProductWriter,
}

impl<'a> Services<'a> {
    fn engine(&self, options: &TideOptions) -> TideEngine<'a> {
        TideEngine::new(self.harmonic, self.prediction, self.delta_time, options.extraction())
    }
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Inputs that failed, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Compute tides for an Operation IceBridge granule
pub fn compute_tides_icebridge(
    input: &InputArgument,
    options: &TideOptions,
    services: &Services,
    created: NaiveDateTime,
) -> TideResult<PathBuf> {
    let model = options.validate()?;
    let basename = basename(&input.path)?;
    let name = parse_airborne(&basename)?;
    let data = read_airborne(
        &input.path,
        &name,
        input.subset.as_ref(),
        services.opener,
        services.leap_seconds,
    )?;
    if data.is_empty() {
        return Err(TideError::Format(format!("{} holds no records", input.path.display())));
    }

    let track = data.track()?;
    let prediction = services.engine(options).predict(&track, &model, AIRBORNE_FILL_VALUE)?;

    let first = data
        .first_j2000()
        .ok_or_else(|| TideError::Format(format!("{} has no valid times", input.path.display())))?;
    let output = options.output_path(
        &input.path,
        &airborne_output_name(data.hemisphere, model.id.name(), &data.name, first),
    );
    let provenance = Provenance { input_file: basename, created };
    let product = assemble_airborne(&data, &track, &prediction, &model, &provenance)?;
    write_output(services.writer, &product, &output, options.mode)?;
    log::info!(
        "{} -> {} ({} of {} tides valid)",
        input.path.display(),
        output.display(),
        prediction.valid_count(),
        data.len()
    );
    Ok(output)
}

/// Compute tides for an ICESat-2 ATL11 granule
pub fn compute_tides_atl11(
    input: &InputArgument,
    options: &TideOptions,
    services: &Services,
    created: NaiveDateTime,
) -> TideResult<PathBuf> {
    let model = options.validate()?;
    let basename = basename(&input.path)?;
    let source = services.opener.open(&input.path)?;
    let granule = read_atl11(source.as_ref(), input.subset.as_ref())?;

    let normalizer = TimeNormalizer::new(services.leap_seconds);
    let engine = services.engine(options);
    let epoch = granule.atlas_sdp_gps_epoch;
    let mut tides = Vec::with_capacity(granule.beam_pairs.len());
    for pair in &granule.beam_pairs {
        let along_track = engine.predict(&pair.along_track(&normalizer, epoch)?, &model, pair.tide_fill)?;
        let crossing = engine.predict(&pair.crossing_track(&normalizer, epoch)?, &model, pair.tide_fill)?;
        log::debug!(
            "{}: {} along-track and {} crossing-track tides valid",
            pair.name,
            along_track.valid_count(),
            crossing.valid_count()
        );
        tides.push(BeamPairTides { along_track, crossing });
    }

    let output = options.output_path(&input.path, &atl11_output_name(&input.path, model.id.name())?);
    let provenance = Provenance { input_file: basename, created };
    let product = assemble_atl11(&granule, &tides, &model, &provenance, &normalizer)?;
    write_output(services.writer, &product, &output, options.mode)?;
    log::info!("{} -> {} ({} beam pairs)", input.path.display(), output.display(), tides.len());
    Ok(output)
}

/// Dispatch one input on its filename
pub fn compute_tides(
    input: &InputArgument,
    options: &TideOptions,
    services: &Services,
    created: NaiveDateTime,
) -> TideResult<PathBuf> {
    match classify(&input.path)? {
        InputProduct::Airborne(_) => compute_tides_icebridge(input, options, services, created),
        InputProduct::Atl11(_) => compute_tides_atl11(input, options, services, created),
    }
}

/// Process every input argument (`path` or `path[ranges]`).
///
/// Configuration errors abort before any file is read; errors confined to
/// one file are logged and reported while the batch continues.
pub fn run_batch(inputs: &[String], options: &TideOptions, services: &Services) -> anyhow::Result<BatchReport> {
    options.validate().context("Invalid tide options")?;
    let arguments = inputs
        .iter()
        .map(|arg| InputArgument::parse(arg))
        .collect::<TideResult<Vec<_>>>()
        .context("Invalid input argument")?;
    let created = chrono::Local::now().naive_local();

    log::info!("Computing {} tides for {} files", options.model, arguments.len());

    #[cfg(feature = "parallel")]
    let results: Vec<TideResult<PathBuf>> = {
        use rayon::prelude::*;
        arguments
            .par_iter()
            .map(|input| compute_tides(input, options, services, created))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<TideResult<PathBuf>> = arguments
        .iter()
        .map(|input| compute_tides(input, options, services, created))
        .collect();

    let mut report = BatchReport::default();
    for (input, result) in arguments.iter().zip(results) {
        match result {
            Ok(path) => report.written.push(path),
            Err(e) if e.is_per_file() => {
                log::warn!("Skipping {}: {}", input.path.display(), e);
                report.failed.push((input.path.clone(), e.to_string()));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Aborting batch at {}", input.path.display()));
            }
        }
    }
    log::info!("{} written, {} failed", report.written.len(), report.failed.len());
    Ok(report)
}

fn basename(path: &Path) -> TideResult<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| TideError::Format(format!("Invalid input path: {}", path.display())))
}

fn write_output(
    writer: &dyn ProductWriter,
    product: &crate::core::output::OutputProduct,
    path: &Path,
    mode: u32,
) -> TideResult<()> {
    writer.write(product, path)?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> TideResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> TideResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = TideOptions::default();
        assert_eq!(options.model, "CATS2008");
        assert_eq!(options.mode, 0o775);
        assert_eq!(options.extraction(), ExtractionOptions::default());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_options_are_config_errors() {
        let options = TideOptions { cutoff_km: 0.0, ..Default::default() };
        assert!(matches!(options.validate(), Err(TideError::Config(_))));
        let options = TideOptions { model: "TPXO10".to_string(), ..Default::default() };
        assert!(matches!(options.validate(), Err(TideError::UnknownModel(_))));
        let options = TideOptions { cutoff_km: f64::INFINITY, ..Default::default() };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_output_path_defaults_to_input_directory() {
        let options = TideOptions::default();
        assert_eq!(
            options.output_path(Path::new("/data/in.h5"), "out.h5"),
            PathBuf::from("/data/out.h5")
        );
        let options = TideOptions { output_dir: Some(PathBuf::from("/out")), ..Default::default() };
        assert_eq!(options.output_path(Path::new("/data/in.h5"), "out.h5"), PathBuf::from("/out/out.h5"));
    }
}
