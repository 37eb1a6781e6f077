//! Hierarchical output products
//!
//! A product is a tree of groups holding attributes, declared dimensions and
//! variables. Variables either act as a dimension scale themselves or attach
//! to dimensions resolved in their own group or an ancestor.

use crate::types::{AttrValue, TideError, TideResult};
use ndarray::{ArrayD, Dimension};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Recognized attribute names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    Units,
    LongName,
    StandardName,
    Description,
    Source,
    Reference,
    Model,
    Coordinates,
    ContentType,
    Calendar,
    ValidMin,
    ValidMax,
    TideCount,
    GroupDescription,
    DataRate,
    FeatureType,
    Title,
    Summary,
    Project,
    Instrument,
    References,
    ProcessingLevel,
    DateCreated,
    InputFiles,
    ElevationFile,
    TideModel,
    GeospatialLatMin,
    GeospatialLatMax,
    GeospatialLonMin,
    GeospatialLonMax,
    GeospatialLatUnits,
    GeospatialLonUnits,
    GeospatialEllipsoid,
    DateType,
    TimeType,
    TimeCoverageStart,
    TimeCoverageEnd,
    TimeCoverageDuration,
    RangeBeginningTime,
    RangeEndingTime,
    RangeBeginningDate,
    RangeEndingDate,
    DurationTimeSeconds,
}

impl Attr {
    pub fn name(&self) -> &'static str {
        match self {
            Attr::Units => "units",
            Attr::LongName => "long_name",
            Attr::StandardName => "standard_name",
            Attr::Description => "description",
            Attr::Source => "source",
            Attr::Reference => "reference",
            Attr::Model => "model",
            Attr::Coordinates => "coordinates",
            Attr::ContentType => "contentType",
            Attr::Calendar => "calendar",
            Attr::ValidMin => "valid_min",
            Attr::ValidMax => "valid_max",
            Attr::TideCount => "tide_count",
            Attr::GroupDescription => "Description",
            Attr::DataRate => "data_rate",
            Attr::FeatureType => "featureType",
            Attr::Title => "title",
            Attr::Summary => "summary",
            Attr::Project => "project",
            Attr::Instrument => "instrument",
            Attr::References => "references",
            Attr::ProcessingLevel => "processing_level",
            Attr::DateCreated => "date_created",
            Attr::InputFiles => "input_files",
            Attr::ElevationFile => "elevation_file",
            Attr::TideModel => "tide_model",
            Attr::GeospatialLatMin => "geospatial_lat_min",
            Attr::GeospatialLatMax => "geospatial_lat_max",
            Attr::GeospatialLonMin => "geospatial_lon_min",
            Attr::GeospatialLonMax => "geospatial_lon_max",
            Attr::GeospatialLatUnits => "geospatial_lat_units",
            Attr::GeospatialLonUnits => "geospatial_lon_units",
            Attr::GeospatialEllipsoid => "geospatial_ellipsoid",
            Attr::DateType => "date_type",
            Attr::TimeType => "time_type",
            Attr::TimeCoverageStart => "time_coverage_start",
            Attr::TimeCoverageEnd => "time_coverage_end",
            Attr::TimeCoverageDuration => "time_coverage_duration",
            Attr::RangeBeginningTime => "RangeBeginningTime",
            Attr::RangeEndingTime => "RangeEndingTime",
            Attr::RangeBeginningDate => "RangeBeginningDate",
            Attr::RangeEndingDate => "RangeEndingDate",
            Attr::DurationTimeSeconds => "DurationTimeSeconds",
        }
    }
}

/// Attributes in insertion order; setting an existing name replaces its value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes(Vec<(String, AttrValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, attr: Attr, value: impl Into<AttrValue>) -> &mut Self {
        self.set_named(attr.name(), value)
    }

    /// Set an attribute copied verbatim from an input product
    pub fn set_named(&mut self, name: &str, value: impl Into<AttrValue>) -> &mut Self {
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name.to_string(), value)),
        }
        self
    }

    pub fn with(mut self, attr: Attr, value: impl Into<AttrValue>) -> Self {
        self.set(attr, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn text(&self, attr: Attr) -> Option<&str> {
        self.get(attr.name()).and_then(|v| v.as_text())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Variable payload
#[derive(Debug, Clone, PartialEq)]
pub enum VarData {
    F64(ArrayD<f64>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
}

impl VarData {
    pub fn shape(&self) -> &[usize] {
        match self {
            VarData::F64(a) => a.shape(),
            VarData::I32(a) => a.shape(),
            VarData::I64(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            VarData::F64(_) => "double",
            VarData::I32(_) => "int",
            VarData::I64(_) => "int64",
        }
    }

    pub fn as_f64(&self) -> Option<&ArrayD<f64>> {
        match self {
            VarData::F64(a) => Some(a),
            _ => None,
        }
    }
}

impl<D: Dimension> From<ndarray::Array<f64, D>> for VarData {
    fn from(data: ndarray::Array<f64, D>) -> Self {
        VarData::F64(data.into_dyn())
    }
}

impl<D: Dimension> From<ndarray::Array<i32, D>> for VarData {
    fn from(data: ndarray::Array<i32, D>) -> Self {
        VarData::I32(data.into_dyn())
    }
}

impl<D: Dimension> From<ndarray::Array<i64, D>> for VarData {
    fn from(data: ndarray::Array<i64, D>) -> Self {
        VarData::I64(data.into_dyn())
    }
}

/// How a variable relates to dimensions
#[derive(Debug, Clone, PartialEq)]
pub enum DimLink {
    /// Scalar; no dimensions
    Scalar,
    /// The variable is the scale of a dimension named after itself
    Scale,
    /// One named dimension per axis
    Attached(Vec<String>),
}

impl DimLink {
    pub fn attached(names: &[&str]) -> Self {
        DimLink::Attached(names.iter().map(|n| n.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub data: VarData,
    pub fill_value: Option<f64>,
    pub attrs: Attributes,
    pub dims: DimLink,
}

impl Variable {
    pub fn new(name: &str, data: impl Into<VarData>, dims: DimLink) -> Self {
        Self {
            name: name.to_string(),
            data: data.into(),
            fill_value: None,
            attrs: Attributes::new(),
            dims,
        }
    }

    pub fn with_fill(mut self, fill_value: Option<f64>) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Explicitly declared dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionDecl {
    pub name: String,
    pub len: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub name: String,
    pub attrs: Attributes,
    pub dimensions: Vec<DimensionDecl>,
    pub variables: Vec<Variable>,
    pub groups: Vec<Group>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn add_dimension(&mut self, name: &str, len: usize) -> &mut Self {
        self.dimensions.push(DimensionDecl { name: name.to_string(), len });
        self
    }

    pub fn add_variable(&mut self, variable: Variable) -> &mut Self {
        self.variables.push(variable);
        self
    }

    pub fn add_group(&mut self, group: Group) -> &mut Self {
        self.groups.push(group);
        self
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Length of `name` if this group declares it or holds its scale
    fn local_dimension(&self, name: &str) -> Option<usize> {
        if let Some(d) = self.dimensions.iter().find(|d| d.name == name) {
            return Some(d.len);
        }
        self.variables
            .iter()
            .find(|v| v.name == name && v.dims == DimLink::Scale)
            .map(|v| v.data.shape().first().copied().unwrap_or(0))
    }
}

/// Root of an output product
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputProduct {
    pub root: Group,
}

impl OutputProduct {
    pub fn new() -> Self {
        Self { root: Group::new("") }
    }

    pub fn attrs(&self) -> &Attributes {
        &self.root.attrs
    }

    /// Group at a slash separated path; the empty path is the root
    pub fn group(&self, path: &str) -> Option<&Group> {
        path.split('/')
            .filter(|p| !p.is_empty())
            .try_fold(&self.root, |g, name| g.group(name))
    }

    /// Variable at a slash separated path
    pub fn variable(&self, path: &str) -> Option<&Variable> {
        let path = path.trim_matches('/');
        let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
        self.group(parent)?.variable(name)
    }

    /// Check the dimension linkage of every variable
    pub fn validate(&self) -> TideResult<()> {
        let mut ancestors = Vec::new();
        validate_group(&self.root, "", &mut ancestors)
    }

    /// Text rendering of the structure in the style of `ncdump -h`
    pub fn to_cdl(&self, name: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "netcdf {} {{", name);
        write_cdl_group(&mut out, &self.root, 0);
        let _ = writeln!(out, "}}");
        out
    }
}

fn validate_group<'a>(group: &'a Group, path: &str, ancestors: &mut Vec<&'a Group>) -> TideResult<()> {
    let mut names = HashSet::new();
    for v in &group.variables {
        if !names.insert(v.name.as_str()) {
            return Err(TideError::Format(format!("Duplicate variable {}/{}", path, v.name)));
        }
    }
    let mut group_names = HashSet::new();
    for g in &group.groups {
        if !group_names.insert(g.name.as_str()) {
            return Err(TideError::Format(format!("Duplicate group {}/{}", path, g.name)));
        }
    }

    ancestors.push(group);
    for v in &group.variables {
        let var_path = if path.is_empty() { v.name.clone() } else { format!("{}/{}", path, v.name) };
        let shape = v.data.shape();
        match &v.dims {
            DimLink::Scalar => {
                if !shape.is_empty() {
                    return Err(TideError::Format(format!(
                        "Variable {} has shape {:?} but no dimensions",
                        var_path, shape
                    )));
                }
            }
            DimLink::Scale => {
                if shape.len() != 1 {
                    return Err(TideError::Format(format!(
                        "Dimension scale {} must be 1-D, found shape {:?}",
                        var_path, shape
                    )));
                }
            }
            DimLink::Attached(dims) => {
                if dims.len() != shape.len() {
                    return Err(TideError::Format(format!(
                        "Variable {} has {} axes but {} dimensions",
                        var_path,
                        shape.len(),
                        dims.len()
                    )));
                }
                for (axis, dim) in dims.iter().enumerate() {
                    let len = ancestors
                        .iter()
                        .rev()
                        .find_map(|g| g.local_dimension(dim))
                        .ok_or_else(|| {
                            TideError::Format(format!("Variable {} references unknown dimension {}", var_path, dim))
                        })?;
                    if len != shape[axis] {
                        return Err(TideError::Format(format!(
                            "Variable {} axis {} has length {}, dimension {} has {}",
                            var_path, axis, shape[axis], dim, len
                        )));
                    }
                }
            }
        }
    }
    for g in &group.groups {
        let child = if path.is_empty() { g.name.clone() } else { format!("{}/{}", path, g.name) };
        validate_group(g, &child, ancestors)?;
    }
    ancestors.pop();
    Ok(())
}

fn write_cdl_group(out: &mut String, group: &Group, depth: usize) {
    let pad = "  ".repeat(depth + 1);
    let scales: Vec<(&str, usize)> = group
        .dimensions
        .iter()
        .map(|d| (d.name.as_str(), d.len))
        .chain(
            group
                .variables
                .iter()
                .filter(|v| v.dims == DimLink::Scale)
                .map(|v| (v.name.as_str(), v.data.shape().first().copied().unwrap_or(0))),
        )
        .collect();
    if !scales.is_empty() {
        let _ = writeln!(out, "{}dimensions:", pad);
        for (name, len) in scales {
            let _ = writeln!(out, "{}  {} = {} ;", pad, name, len);
        }
    }
    if !group.variables.is_empty() {
        let _ = writeln!(out, "{}variables:", pad);
    }
    for v in &group.variables {
        let dims = match &v.dims {
            DimLink::Scalar => String::new(),
            DimLink::Scale => format!("({})", v.name),
            DimLink::Attached(d) => format!("({})", d.join(", ")),
        };
        let _ = writeln!(out, "{}  {} {}{} ;", pad, v.data.type_name(), v.name, dims);
        if let Some(fill) = v.fill_value {
            let _ = writeln!(out, "{}    {}:_FillValue = {} ;", pad, v.name, fill);
        }
        for (name, value) in v.attrs.iter() {
            let _ = writeln!(out, "{}    {}:{} = {} ;", pad, v.name, name, cdl_value(value));
        }
    }
    if !group.attrs.is_empty() {
        let _ = writeln!(out, "{}// attributes:", pad);
        for (name, value) in group.attrs.iter() {
            let _ = writeln!(out, "{}  :{} = {} ;", pad, name, cdl_value(value));
        }
    }
    for g in &group.groups {
        let _ = writeln!(out, "{}group: {} {{", pad, g.name);
        write_cdl_group(out, g, depth + 1);
        let _ = writeln!(out, "{}}} // group {}", pad, g.name);
    }
}

fn cdl_value(value: &AttrValue) -> String {
    match value {
        AttrValue::Text(s) => format!("{:?}", s),
        other => other.to_string(),
    }
}

/// Persists output products
pub trait ProductWriter: Send + Sync {
    /// Write an already validated product
    fn write_validated(&self, product: &OutputProduct, path: &Path) -> TideResult<()>;

    /// Validate and write
    fn write(&self, product: &OutputProduct, path: &Path) -> TideResult<()> {
        product.validate()?;
        self.write_validated(product, path)
    }
}

/// Writes the product structure as CDL text
#[derive(Debug, Clone, Copy, Default)]
pub struct CdlWriter;

impl ProductWriter for CdlWriter {
    fn write_validated(&self, product: &OutputProduct, path: &Path) -> TideResult<()> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        std::fs::write(path, product.to_cdl(&name))?;
        log::debug!("Wrote CDL header {}", path.display());
        Ok(())
    }
}

/// Keeps written products in memory and leaves a CDL header on disk
#[derive(Debug, Default)]
pub struct MemoryWriter {
    products: Mutex<HashMap<PathBuf, OutputProduct>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(&self, path: &Path) -> Option<OutputProduct> {
        self.products.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .products
            .lock()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}

impl ProductWriter for MemoryWriter {
    fn write_validated(&self, product: &OutputProduct, path: &Path) -> TideResult<()> {
        CdlWriter.write_validated(product, path)?;
        self.products
            .lock()
            .map_err(|_| TideError::Format("Product store poisoned".to_string()))?
            .insert(path.to_path_buf(), product.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn product() -> OutputProduct {
        let mut product = OutputProduct::new();
        let mut pair = Group::new("pt1");
        pair.add_variable(Variable::new("ref_pt", array![1i64, 2, 3], DimLink::Scale))
            .add_variable(Variable::new("cycle_number", array![3i32, 4], DimLink::Scale))
            .add_variable(Variable::new(
                "delta_time",
                Array2::<f64>::zeros((3, 2)),
                DimLink::attached(&["ref_pt", "cycle_number"]),
            ));
        let mut stats = Group::new("cycle_stats");
        stats.add_variable(
            Variable::new("tide_ocean", Array2::<f64>::zeros((3, 2)), DimLink::attached(&["ref_pt", "cycle_number"]))
                .with_fill(Some(3.4e38))
                .with_attrs(Attributes::new().with(Attr::Units, "meters")),
        );
        pair.add_group(stats);
        product.root.add_group(pair);
        product.root.attrs.set(Attr::FeatureType, "trajectory");
        product
    }

    #[test]
    fn test_dimensions_resolve_in_ancestors() {
        let product = product();
        product.validate().unwrap();
        let tide = product.variable("pt1/cycle_stats/tide_ocean").unwrap();
        assert_eq!(tide.attrs.text(Attr::Units), Some("meters"));
        assert_eq!(product.attrs().text(Attr::FeatureType), Some("trajectory"));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let mut product = product();
        product.root.groups[0].groups[0].variables[0].data = VarData::from(Array2::<f64>::zeros((2, 2)));
        assert!(matches!(product.validate(), Err(TideError::Format(_))));
    }

    #[test]
    fn test_unknown_dimension_is_rejected() {
        let mut product = OutputProduct::new();
        product
            .root
            .add_variable(Variable::new("lat", array![1.0, 2.0], DimLink::attached(&["RECORD_SIZE"])));
        assert!(product.validate().is_err());
        product.root.add_dimension("RECORD_SIZE", 2);
        product.validate().unwrap();
    }

    #[test]
    fn test_scalar_and_scale_shapes() {
        let mut product = OutputProduct::new();
        let mut ancillary = Group::new("ancillary_data");
        ancillary.add_variable(Variable::new(
            "atlas_sdp_gps_epoch",
            ndarray::arr0(1.0e9).into_dyn(),
            DimLink::Scalar,
        ));
        product.root.add_group(ancillary);
        product.validate().unwrap();

        product
            .root
            .add_variable(Variable::new("grid", Array2::<f64>::zeros((2, 2)), DimLink::Scale));
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_attributes_replace_in_place() {
        let mut attrs = Attributes::new();
        attrs.set(Attr::Project, "a").set(Attr::Title, "t").set(Attr::Project, "b");
        let names: Vec<&str> = attrs.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["project", "title"]);
        assert_eq!(attrs.text(Attr::Project), Some("b"));
    }

    #[test]
    fn test_cdl_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h5");
        CdlWriter.write(&product(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("netcdf out {"));
        assert!(text.contains("double tide_ocean(ref_pt, cycle_number) ;"));
        assert!(text.contains("group: cycle_stats {"));
    }
}
