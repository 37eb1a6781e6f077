//! Input readers and container access

pub mod container;
pub mod subset;
pub mod filename;
pub mod text;
pub mod qfit;
pub mod lvis;
pub mod airborne;
pub mod atl11;
#[cfg(feature = "netcdf")]
pub mod netcdf_backend;

// Re-export main types
pub use container::{HierarchicalSource, MemoryOpener, MemorySource, SourceOpener};
pub use subset::{InputArgument, Subsetter};
pub use filename::{classify, AirborneName, Atl11Name, InputProduct};
pub use airborne::{read_airborne, AirborneData};
pub use atl11::{read_atl11, Atl11Granule, BeamPair};
#[cfg(feature = "netcdf")]
pub use netcdf_backend::{NetcdfOpener, NetcdfSource, NetcdfWriter};
