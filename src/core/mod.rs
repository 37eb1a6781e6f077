//! Core tide computation modules

pub mod time;
pub mod tide;
pub mod output;
pub mod products;

// Re-export main types
pub use time::{DeltaTimeService, DeltaTimeTable, LeapSecondService, LeapSecondTable, TimeConvention, TimeNormalizer};
pub use tide::{ExtractionOptions, HarmonicConstants, HarmonicService, Interpolation, PredictionService, TideEngine};
pub use output::{Attr, Attributes, CdlWriter, DimLink, Group, MemoryWriter, OutputProduct, ProductWriter, Variable};
pub use products::{assemble_airborne, assemble_atl11, BeamPairTides, Provenance};
