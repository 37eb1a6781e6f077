//! icetide: tidal corrections for ice elevation products
//!
//! Computes ocean and load tides for Operation IceBridge airborne granules
//! (ATM Qfit, LVIS) and ICESat-2 ATL11 land-ice height products, and writes
//! each result as a companion netCDF-4/HDF5 file.

pub mod types;
pub mod models;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CanonicalTrack, Hemisphere, TideError, TidePrediction, TideResult, TrackKind,
    AIRBORNE_FILL_VALUE
};

pub use models::{resolve, ModelDescriptor, StorageKind, TideModel};
pub use pipeline::{compute_tides, compute_tides_atl11, compute_tides_icebridge, run_batch, BatchReport, Services, TideOptions};
