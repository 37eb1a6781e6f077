//! Tide model catalog
//!
//! Each supported model is a row in a static table. `resolve` turns a row
//! into a [`ModelDescriptor`] rooted at the tide data directory without
//! touching the filesystem; missing files surface later from the harmonic
//! service.

use crate::types::{TideError, TideResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported tide models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TideModel {
    Cats0201,
    Cats2008,
    Cats2008Load,
    Tpxo9Atlas,
    Tpxo9AtlasV2,
    Tpxo9AtlasV3,
    Tpxo9AtlasV4,
    Tpxo9_1,
    Tpxo8Atlas,
    Tpxo7_2,
    Tpxo7_2Load,
    Aodtm5,
    Aotim5,
    Aotim5_2018,
    Gr1kmV2,
    Got4_7,
    Got4_7Load,
    Got4_8,
    Got4_8Load,
    Got4_10,
    Got4_10Load,
    Fes2014,
    Fes2014Load,
}

impl TideModel {
    /// Every model in catalog order
    pub const ALL: [TideModel; 23] = [
        TideModel::Cats0201,
        TideModel::Cats2008,
        TideModel::Cats2008Load,
        TideModel::Tpxo9Atlas,
        TideModel::Tpxo9AtlasV2,
        TideModel::Tpxo9AtlasV3,
        TideModel::Tpxo9AtlasV4,
        TideModel::Tpxo9_1,
        TideModel::Tpxo8Atlas,
        TideModel::Tpxo7_2,
        TideModel::Tpxo7_2Load,
        TideModel::Aodtm5,
        TideModel::Aotim5,
        TideModel::Aotim5_2018,
        TideModel::Gr1kmV2,
        TideModel::Got4_7,
        TideModel::Got4_7Load,
        TideModel::Got4_8,
        TideModel::Got4_8Load,
        TideModel::Got4_10,
        TideModel::Got4_10Load,
        TideModel::Fes2014,
        TideModel::Fes2014Load,
    ];

    /// Canonical model name as used in output files
    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    fn entry(&self) -> &'static CatalogEntry {
        // CATALOG is ordered like ALL
        &CATALOG[*self as usize]
    }
}

impl std::fmt::Display for TideModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TideModel {
    type Err = TideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TideModel::ALL
            .iter()
            .copied()
            .find(|m| m.name() == s)
            .ok_or_else(|| TideError::UnknownModel(s.to_string()))
    }
}

/// On-disk storage kind of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// OTIS binary grids
    GridBinary,
    /// TPXO ATLAS compact binary grids
    GridBinaryAtlas,
    /// TPXO netCDF grids
    NetcdfGrid,
    /// GSFC GOT ASCII grids
    GotAscii,
    /// AVISO FES netCDF constituent files
    FesNetcdf,
}

impl StorageKind {
    /// Format tag understood by the prediction service
    pub fn tag(&self) -> &'static str {
        match self {
            StorageKind::GridBinary => "OTIS",
            StorageKind::GridBinaryAtlas => "ATLAS",
            StorageKind::NetcdfGrid => "netcdf",
            StorageKind::GotAscii => "GOT",
            StorageKind::FesNetcdf => "FES",
        }
    }

    /// Grid-based models are already consistent with UT1 and need no delta time
    pub fn is_grid_based(&self) -> bool {
        matches!(
            self,
            StorageKind::GridBinary | StorageKind::GridBinaryAtlas | StorageKind::NetcdfGrid
        )
    }
}

/// Physical quantity predicted by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    Ocean,
    Load,
}

/// Map projection of a model grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Projection {
    Epsg(u32),
    /// Model specific projection handled by the harmonic service
    Named(&'static str),
}

impl std::fmt::Display for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Projection::Epsg(code) => write!(f, "{}", code),
            Projection::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Model data files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelFiles {
    Single(PathBuf),
    /// One file per constituent, in constituent order
    PerConstituent(Vec<PathBuf>),
}

impl ModelFiles {
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ModelFiles::Single(p) => vec![p.as_path()],
            ModelFiles::PerConstituent(ps) => ps.iter().map(|p| p.as_path()).collect(),
        }
    }
}

/// Immutable description of a resolved tide model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub id: TideModel,
    pub kind: StorageKind,
    pub grid_file: Option<PathBuf>,
    pub model_files: ModelFiles,
    pub projection: Option<Projection>,
    pub quantity: Quantity,
    pub scale: f64,
    pub compressed: bool,
    pub reference: &'static str,
    /// Constituent names for models whose files do not carry them
    pub constituents: Option<Vec<String>>,
}

impl ModelDescriptor {
    /// Output variable name
    pub fn variable(&self) -> &'static str {
        match self.quantity {
            Quantity::Ocean => "tide_ocean",
            Quantity::Load => "tide_load",
        }
    }

    /// Long name used in the repeat-track product
    pub fn long_name(&self) -> &'static str {
        match self.quantity {
            Quantity::Ocean => "Ocean Tide",
            Quantity::Load => "Load Tide",
        }
    }

    /// Long name used in the airborne product
    pub fn airborne_long_name(&self) -> &'static str {
        match self.quantity {
            Quantity::Ocean => "Ocean_Tide",
            Quantity::Load => "Load_Tide",
        }
    }

    pub fn description(&self) -> &'static str {
        match self.quantity {
            Quantity::Ocean => {
                "Ocean Tides including diurnal and semi-diurnal (harmonic analysis), \
                 and longer period tides (dynamic and self-consistent equilibrium)."
            }
            Quantity::Load => "Local displacement due to Ocean Loading (-6 to 0 cm)",
        }
    }

    pub fn format_tag(&self) -> &'static str {
        self.kind.tag()
    }
}

/// Resolve a model name into a descriptor rooted at `tide_dir`
pub fn resolve(model_id: &str, tide_dir: &Path) -> TideResult<ModelDescriptor> {
    let model = TideModel::from_str(model_id)?;
    Ok(describe(model, tide_dir))
}

/// Build the descriptor of a known model
pub fn describe(model: TideModel, tide_dir: &Path) -> ModelDescriptor {
    let entry = model.entry();
    let join = |rel: &str| rel.split('/').fold(tide_dir.to_path_buf(), |p, part| p.join(part));

    let model_files = match entry.files {
        FilesSpec::Single(rel) => ModelFiles::Single(join(rel)),
        FilesSpec::PerConstituent(dir, names) => {
            let dir = join(dir);
            ModelFiles::PerConstituent(names.iter().map(|n| dir.join(n)).collect())
        }
    };

    ModelDescriptor {
        id: model,
        kind: entry.kind,
        grid_file: entry.grid.map(join),
        model_files,
        projection: entry.projection,
        quantity: entry.quantity,
        scale: entry.scale,
        compressed: entry.compressed,
        reference: entry.reference,
        constituents: entry
            .constituents
            .map(|cs| cs.iter().map(|c| c.to_string()).collect()),
    }
}

enum FilesSpec {
    Single(&'static str),
    PerConstituent(&'static str, &'static [&'static str]),
}

struct CatalogEntry {
    name: &'static str,
    kind: StorageKind,
    grid: Option<&'static str>,
    files: FilesSpec,
    projection: Option<Projection>,
    quantity: Quantity,
    scale: f64,
    compressed: bool,
    reference: &'static str,
    constituents: Option<&'static [&'static str]>,
}

const ESR_CATS2008: &str =
    "https://www.esr.org/research/polar-tide-models/list-of-polar-tide-models/cats2008/";
const ESR_AODTM5: &str =
    "https://www.esr.org/research/polar-tide-models/list-of-polar-tide-models/aodtm-5/";
const ESR_AOTIM5: &str =
    "https://www.esr.org/research/polar-tide-models/list-of-polar-tide-models/aotim-5/";
const OSU_GLOBAL: &str = "http://volkov.oce.orst.edu/tides/global.html";
const TPXO_ATLAS: &str = "https://www.tpxo.net/global/tpxo9-atlas";
const GSFC_GOT: &str =
    "https://denali.gsfc.nasa.gov/personal_pages/ray/MiscPubs/19990089548_1999150788.pdf";
const AVISO_FES: &str =
    "https://www.aviso.altimetry.fr/en/data/products/auxiliary-products/global-tide-fes.html";

const TPXO9_ATLAS_V1: &[&str] = &[
    "h_q1_tpxo9_atlas_30.nc.gz", "h_o1_tpxo9_atlas_30.nc.gz", "h_p1_tpxo9_atlas_30.nc.gz",
    "h_k1_tpxo9_atlas_30.nc.gz", "h_n2_tpxo9_atlas_30.nc.gz", "h_m2_tpxo9_atlas_30.nc.gz",
    "h_s2_tpxo9_atlas_30.nc.gz", "h_k2_tpxo9_atlas_30.nc.gz", "h_m4_tpxo9_atlas_30.nc.gz",
    "h_ms4_tpxo9_atlas_30.nc.gz", "h_mn4_tpxo9_atlas_30.nc.gz", "h_2n2_tpxo9_atlas_30.nc.gz",
];

const TPXO9_ATLAS_V2: &[&str] = &[
    "h_q1_tpxo9_atlas_30_v2.nc.gz", "h_o1_tpxo9_atlas_30_v2.nc.gz", "h_p1_tpxo9_atlas_30_v2.nc.gz",
    "h_k1_tpxo9_atlas_30_v2.nc.gz", "h_n2_tpxo9_atlas_30_v2.nc.gz", "h_m2_tpxo9_atlas_30_v2.nc.gz",
    "h_s2_tpxo9_atlas_30_v2.nc.gz", "h_k2_tpxo9_atlas_30_v2.nc.gz", "h_m4_tpxo9_atlas_30_v2.nc.gz",
    "h_ms4_tpxo9_atlas_30_v2.nc.gz", "h_mn4_tpxo9_atlas_30_v2.nc.gz",
    "h_2n2_tpxo9_atlas_30_v2.nc.gz",
];

const TPXO9_ATLAS_V3: &[&str] = &[
    "h_q1_tpxo9_atlas_30_v3.nc.gz", "h_o1_tpxo9_atlas_30_v3.nc.gz", "h_p1_tpxo9_atlas_30_v3.nc.gz",
    "h_k1_tpxo9_atlas_30_v3.nc.gz", "h_n2_tpxo9_atlas_30_v3.nc.gz", "h_m2_tpxo9_atlas_30_v3.nc.gz",
    "h_s2_tpxo9_atlas_30_v3.nc.gz", "h_k2_tpxo9_atlas_30_v3.nc.gz", "h_m4_tpxo9_atlas_30_v3.nc.gz",
    "h_ms4_tpxo9_atlas_30_v3.nc.gz", "h_mn4_tpxo9_atlas_30_v3.nc.gz",
    "h_2n2_tpxo9_atlas_30_v3.nc.gz", "h_mf_tpxo9_atlas_30_v3.nc.gz", "h_mm_tpxo9_atlas_30_v3.nc.gz",
];

const TPXO9_ATLAS_V4: &[&str] = &[
    "h_q1_tpxo9_atlas_30_v4", "h_o1_tpxo9_atlas_30_v4", "h_p1_tpxo9_atlas_30_v4",
    "h_k1_tpxo9_atlas_30_v4", "h_n2_tpxo9_atlas_30_v4", "h_m2_tpxo9_atlas_30_v4",
    "h_s2_tpxo9_atlas_30_v4", "h_k2_tpxo9_atlas_30_v4", "h_m4_tpxo9_atlas_30_v4",
    "h_ms4_tpxo9_atlas_30_v4", "h_mn4_tpxo9_atlas_30_v4", "h_2n2_tpxo9_atlas_30_v4",
    "h_mf_tpxo9_atlas_30_v4", "h_mm_tpxo9_atlas_30_v4",
];

const GOT_OCEAN: &[&str] = &[
    "q1.d.gz", "o1.d.gz", "p1.d.gz", "k1.d.gz", "n2.d.gz", "m2.d.gz", "s2.d.gz", "k2.d.gz",
    "s1.d.gz", "m4.d.gz",
];

const GOT_LOAD: &[&str] = &[
    "q1load.d.gz", "o1load.d.gz", "p1load.d.gz", "k1load.d.gz", "n2load.d.gz", "m2load.d.gz",
    "s2load.d.gz", "k2load.d.gz", "s1load.d.gz", "m4load.d.gz",
];

const FES2014_FILES: &[&str] = &[
    "2n2.nc.gz", "eps2.nc.gz", "j1.nc.gz", "k1.nc.gz", "k2.nc.gz", "l2.nc.gz", "la2.nc.gz",
    "m2.nc.gz", "m3.nc.gz", "m4.nc.gz", "m6.nc.gz", "m8.nc.gz", "mf.nc.gz", "mks2.nc.gz",
    "mm.nc.gz", "mn4.nc.gz", "ms4.nc.gz", "msf.nc.gz", "msqm.nc.gz", "mtm.nc.gz", "mu2.nc.gz",
    "n2.nc.gz", "n4.nc.gz", "nu2.nc.gz", "o1.nc.gz", "p1.nc.gz", "q1.nc.gz", "r2.nc.gz",
    "s1.nc.gz", "s2.nc.gz", "s4.nc.gz", "sa.nc.gz", "ssa.nc.gz", "t2.nc.gz",
];

const FES2014_CONSTITUENTS: &[&str] = &[
    "2n2", "eps2", "j1", "k1", "k2", "l2", "lambda2", "m2", "m3", "m4", "m6", "m8", "mf", "mks2",
    "mm", "mn4", "ms4", "msf", "msqm", "mtm", "mu2", "n2", "n4", "nu2", "o1", "p1", "q1", "r2",
    "s1", "s2", "s4", "sa", "ssa", "t2",
];

const fn otis(
    name: &'static str,
    grid: &'static str,
    file: &'static str,
    projection: Projection,
    quantity: Quantity,
    reference: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        name,
        kind: StorageKind::GridBinary,
        grid: Some(grid),
        files: FilesSpec::Single(file),
        projection: Some(projection),
        quantity,
        scale: 1.0,
        compressed: false,
        reference,
        constituents: None,
    }
}

const fn tpxo_netcdf(
    name: &'static str,
    grid: &'static str,
    dir: &'static str,
    files: &'static [&'static str],
    reference: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        name,
        kind: StorageKind::NetcdfGrid,
        grid: Some(grid),
        files: FilesSpec::PerConstituent(dir, files),
        projection: None,
        quantity: Quantity::Ocean,
        scale: 1.0 / 1000.0,
        compressed: true,
        reference,
        constituents: None,
    }
}

const fn got(name: &'static str, dir: &'static str, quantity: Quantity) -> CatalogEntry {
    let (files, scale) = match quantity {
        Quantity::Ocean => (GOT_OCEAN, 1.0 / 100.0),
        Quantity::Load => (GOT_LOAD, 1.0 / 1000.0),
    };
    CatalogEntry {
        name,
        kind: StorageKind::GotAscii,
        grid: None,
        files: FilesSpec::PerConstituent(dir, files),
        projection: None,
        quantity,
        scale,
        compressed: true,
        reference: GSFC_GOT,
        constituents: None,
    }
}

const fn fes(name: &'static str, dir: &'static str, quantity: Quantity) -> CatalogEntry {
    CatalogEntry {
        name,
        kind: StorageKind::FesNetcdf,
        grid: None,
        files: FilesSpec::PerConstituent(dir, FES2014_FILES),
        projection: None,
        quantity,
        scale: 1.0 / 100.0,
        compressed: true,
        reference: AVISO_FES,
        constituents: Some(FES2014_CONSTITUENTS),
    }
}

static CATALOG: [CatalogEntry; 23] = [
    otis(
        "CATS0201",
        "cats0201_tmd/grid_CATS",
        "cats0201_tmd/h0_CATS02_01",
        Projection::Epsg(4326),
        Quantity::Ocean,
        "https://mail.esr.org/polar_tide_models/Model_CATS0201.html",
    ),
    otis(
        "CATS2008",
        "CATS2008/grid_CATS2008",
        "CATS2008/hf.CATS2008.out",
        Projection::Named("CATS2008"),
        Quantity::Ocean,
        ESR_CATS2008,
    ),
    otis(
        "CATS2008_load",
        "CATS2008a_SPOTL_Load/grid_CATS2008a_opt",
        "CATS2008a_SPOTL_Load/h_CATS2008a_SPOTL_load",
        Projection::Named("CATS2008"),
        Quantity::Load,
        ESR_CATS2008,
    ),
    tpxo_netcdf(
        "TPXO9-atlas",
        "TPXO9_atlas/grid_tpxo9_atlas.nc.gz",
        "TPXO9_atlas",
        TPXO9_ATLAS_V1,
        "http://volkov.oce.orst.edu/tides/tpxo9_atlas.html",
    ),
    tpxo_netcdf(
        "TPXO9-atlas-v2",
        "TPXO9_atlas_v2/grid_tpxo9_atlas_30_v2.nc.gz",
        "TPXO9_atlas_v2",
        TPXO9_ATLAS_V2,
        TPXO_ATLAS,
    ),
    tpxo_netcdf(
        "TPXO9-atlas-v3",
        "TPXO9_atlas_v3/grid_tpxo9_atlas_30_v3.nc.gz",
        "TPXO9_atlas_v3",
        TPXO9_ATLAS_V3,
        TPXO_ATLAS,
    ),
    CatalogEntry {
        name: "TPXO9-atlas-v4",
        kind: StorageKind::GridBinary,
        grid: Some("TPXO9_atlas_v4/grid_tpxo9_atlas_30_v4"),
        files: FilesSpec::PerConstituent("TPXO9_atlas_v4", TPXO9_ATLAS_V4),
        projection: Some(Projection::Epsg(4326)),
        quantity: Quantity::Ocean,
        scale: 1.0,
        compressed: false,
        reference: TPXO_ATLAS,
        constituents: None,
    },
    otis(
        "TPXO9.1",
        "TPXO9.1/DATA/grid_tpxo9",
        "TPXO9.1/DATA/h_tpxo9.v1",
        Projection::Epsg(4326),
        Quantity::Ocean,
        OSU_GLOBAL,
    ),
    CatalogEntry {
        name: "TPXO8-atlas",
        kind: StorageKind::GridBinaryAtlas,
        grid: Some("tpxo8_atlas/grid_tpxo8atlas_30_v1"),
        files: FilesSpec::Single("tpxo8_atlas/hf.tpxo8_atlas_30_v1"),
        projection: Some(Projection::Epsg(4326)),
        quantity: Quantity::Ocean,
        scale: 1.0,
        compressed: false,
        reference: "http://volkov.oce.orst.edu/tides/tpxo8_atlas.html",
        constituents: None,
    },
    otis(
        "TPXO7.2",
        "TPXO7.2_tmd/grid_tpxo7.2",
        "TPXO7.2_tmd/h_tpxo7.2",
        Projection::Epsg(4326),
        Quantity::Ocean,
        OSU_GLOBAL,
    ),
    otis(
        "TPXO7.2_load",
        "TPXO7.2_load/grid_tpxo6.2",
        "TPXO7.2_load/h_tpxo7.2_load",
        Projection::Epsg(4326),
        Quantity::Load,
        OSU_GLOBAL,
    ),
    otis(
        "AODTM-5",
        "aodtm5_tmd/grid_Arc5km",
        "aodtm5_tmd/h0_Arc5km.oce",
        Projection::Named("PSNorth"),
        Quantity::Ocean,
        ESR_AODTM5,
    ),
    otis(
        "AOTIM-5",
        "aotim5_tmd/grid_Arc5km",
        "aotim5_tmd/h_Arc5km.oce",
        Projection::Named("PSNorth"),
        Quantity::Ocean,
        ESR_AOTIM5,
    ),
    otis(
        "AOTIM-5-2018",
        "Arc5km2018/grid_Arc5km2018",
        "Arc5km2018/h_Arc5km2018",
        Projection::Named("PSNorth"),
        Quantity::Ocean,
        ESR_AOTIM5,
    ),
    otis(
        "Gr1km-v2",
        "greenlandTMD_v2/grid_Greenland8.v2",
        "greenlandTMD_v2/h_Greenland8.v2",
        Projection::Epsg(3413),
        Quantity::Ocean,
        "https://doi.org/10.1002/2016RG000546",
    ),
    got("GOT4.7", "GOT4.7/grids_oceantide", Quantity::Ocean),
    got("GOT4.7_load", "GOT4.7/grids_loadtide", Quantity::Load),
    got("GOT4.8", "got4.8/grids_oceantide", Quantity::Ocean),
    got("GOT4.8_load", "got4.8/grids_loadtide", Quantity::Load),
    got("GOT4.10", "GOT4.10c/grids_oceantide", Quantity::Ocean),
    got("GOT4.10_load", "GOT4.10c/grids_loadtide", Quantity::Load),
    fes("FES2014", "fes2014/ocean_tide", Quantity::Ocean),
    fes("FES2014_load", "fes2014/load_tide", Quantity::Load),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_matches_enum() {
        for (i, model) in TideModel::ALL.iter().enumerate() {
            assert_eq!(*model as usize, i);
            assert_eq!(TideModel::from_str(model.name()).unwrap(), *model);
        }
    }

    #[test]
    fn test_unknown_model_is_config_error() {
        let err = resolve("CATS2022", Path::new("/data")).unwrap_err();
        assert!(matches!(err, TideError::UnknownModel(ref m) if m == "CATS2022"));
        assert!(!err.is_per_file());
    }

    #[test]
    fn test_resolve_otis_model() {
        let d = resolve("CATS2008", Path::new("/data/tides")).unwrap();
        assert_eq!(d.kind, StorageKind::GridBinary);
        assert_eq!(d.grid_file, Some(PathBuf::from("/data/tides/CATS2008/grid_CATS2008")));
        assert_eq!(
            d.model_files,
            ModelFiles::Single(PathBuf::from("/data/tides/CATS2008/hf.CATS2008.out"))
        );
        assert_eq!(d.projection, Some(Projection::Named("CATS2008")));
        assert_eq!(d.variable(), "tide_ocean");
        assert!(d.kind.is_grid_based());
    }

    #[test]
    fn test_resolve_got_load_model() {
        let d = resolve("GOT4.10_load", Path::new("/t")).unwrap();
        assert_eq!(d.kind.tag(), "GOT");
        assert_eq!(d.variable(), "tide_load");
        assert_eq!(d.airborne_long_name(), "Load_Tide");
        assert!((d.scale - 0.001).abs() < 1e-15);
        assert!(d.compressed);
        assert!(d.grid_file.is_none());
        let paths = d.model_files.paths();
        assert_eq!(paths.len(), 10);
        assert_eq!(paths[0], Path::new("/t/GOT4.10c/grids_loadtide/q1load.d.gz"));
        assert!(!d.kind.is_grid_based());
    }

    #[test]
    fn test_fes_constituents_align_with_files() {
        let d = resolve("FES2014", Path::new("/t")).unwrap();
        let constituents = d.constituents.clone().unwrap();
        assert_eq!(constituents.len(), d.model_files.paths().len());
        assert_eq!(constituents[6], "lambda2");
    }
}
