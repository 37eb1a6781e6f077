//! Read access to hierarchical (HDF5/netCDF-4 style) containers
//!
//! Dataset paths are slash separated and relative to the root group
//! (`pt1/crossing_track_data/latitude`). Attributes of a group are read
//! with the group path, root attributes with an empty path.

use crate::types::{AttrValue, TideError, TideResult};
use ndarray::{Array1, Array2, ArrayD, Ix1, Ix2};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only hierarchical container
pub trait HierarchicalSource {
    fn read_f64(&self, path: &str) -> TideResult<ArrayD<f64>>;

    fn read_i64(&self, path: &str) -> TideResult<ArrayD<i64>>;

    /// Attribute `name` of the dataset or group at `path`
    fn attribute(&self, path: &str, name: &str) -> TideResult<Option<AttrValue>>;

    /// Names of the direct subgroups of `path`, sorted
    fn groups(&self, path: &str) -> TideResult<Vec<String>>;

    /// True when `path` names a dataset
    fn contains(&self, path: &str) -> bool;
}

/// Opens input paths as hierarchical sources
pub trait SourceOpener: Send + Sync {
    fn open(&self, path: &Path) -> TideResult<Box<dyn HierarchicalSource>>;
}

pub fn read_f64_1d(source: &dyn HierarchicalSource, path: &str) -> TideResult<Array1<f64>> {
    let data = source.read_f64(path)?;
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix1>()
        .map_err(|_| TideError::Format(format!("{} has shape {:?}, expected 1-D", path, shape)))
}

pub fn read_f64_2d(source: &dyn HierarchicalSource, path: &str) -> TideResult<Array2<f64>> {
    let data = source.read_f64(path)?;
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix2>()
        .map_err(|_| TideError::Format(format!("{} has shape {:?}, expected 2-D", path, shape)))
}

pub fn read_i64_1d(source: &dyn HierarchicalSource, path: &str) -> TideResult<Array1<i64>> {
    let data = source.read_i64(path)?;
    let shape = data.shape().to_vec();
    data.into_dimensionality::<Ix1>()
        .map_err(|_| TideError::Format(format!("{} has shape {:?}, expected 1-D", path, shape)))
}

/// Attribute that must be present
pub fn require_attribute(
    source: &dyn HierarchicalSource,
    path: &str,
    name: &str,
) -> TideResult<AttrValue> {
    source
        .attribute(path, name)?
        .ok_or_else(|| TideError::Schema(join_path(path, name)))
}

/// `_FillValue` of a dataset, if declared
pub fn fill_value(source: &dyn HierarchicalSource, path: &str) -> TideResult<Option<f64>> {
    Ok(source.attribute(path, "_FillValue")?.and_then(|v| v.as_f64()))
}

pub fn join_path(parent: &str, child: &str) -> String {
    let parent = normalize(parent);
    if parent.is_empty() {
        normalize(child).to_string()
    } else {
        format!("{}/{}", parent, normalize(child))
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[derive(Debug, Clone)]
enum Dataset {
    F64(ArrayD<f64>),
    I64(ArrayD<i64>),
}

/// In-memory hierarchical container
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    datasets: HashMap<String, Dataset>,
    attributes: HashMap<String, BTreeMap<String, AttrValue>>,
    explicit_groups: BTreeSet<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_f64<D: ndarray::Dimension>(mut self, path: &str, data: ndarray::Array<f64, D>) -> Self {
        self.insert_f64(path, data.into_dyn());
        self
    }

    pub fn with_i64<D: ndarray::Dimension>(mut self, path: &str, data: ndarray::Array<i64, D>) -> Self {
        self.insert_i64(path, data.into_dyn());
        self
    }

    pub fn with_attr(mut self, path: &str, name: &str, value: impl Into<AttrValue>) -> Self {
        self.insert_attr(path, name, value.into());
        self
    }

    pub fn with_group(mut self, path: &str) -> Self {
        self.explicit_groups.insert(normalize(path).to_string());
        self
    }

    pub fn insert_f64(&mut self, path: &str, data: ArrayD<f64>) {
        self.datasets.insert(normalize(path).to_string(), Dataset::F64(data));
    }

    pub fn insert_i64(&mut self, path: &str, data: ArrayD<i64>) {
        self.datasets.insert(normalize(path).to_string(), Dataset::I64(data));
    }

    pub fn insert_attr(&mut self, path: &str, name: &str, value: AttrValue) {
        self.attributes
            .entry(normalize(path).to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    fn dataset(&self, path: &str) -> TideResult<&Dataset> {
        self.datasets
            .get(normalize(path))
            .ok_or_else(|| TideError::Schema(normalize(path).to_string()))
    }

    fn all_group_paths(&self) -> BTreeSet<String> {
        let mut groups = self.explicit_groups.clone();
        let parents = |p: &str| -> Vec<String> {
            let parts: Vec<&str> = p.split('/').collect();
            (1..parts.len()).map(|i| parts[..i].join("/")).collect()
        };
        for path in self.datasets.keys() {
            groups.extend(parents(path));
        }
        for path in self.attributes.keys() {
            if !path.is_empty() && !self.datasets.contains_key(path) {
                groups.insert(path.clone());
            }
            groups.extend(parents(path));
        }
        groups
    }
}

impl HierarchicalSource for MemorySource {
    fn read_f64(&self, path: &str) -> TideResult<ArrayD<f64>> {
        match self.dataset(path)? {
            Dataset::F64(a) => Ok(a.clone()),
            Dataset::I64(a) => Ok(a.mapv(|v| v as f64)),
        }
    }

    fn read_i64(&self, path: &str) -> TideResult<ArrayD<i64>> {
        match self.dataset(path)? {
            Dataset::I64(a) => Ok(a.clone()),
            Dataset::F64(_) => Err(TideError::Format(format!(
                "{} holds floating point data, expected integers",
                normalize(path)
            ))),
        }
    }

    fn attribute(&self, path: &str, name: &str) -> TideResult<Option<AttrValue>> {
        Ok(self
            .attributes
            .get(normalize(path))
            .and_then(|attrs| attrs.get(name))
            .cloned())
    }

    fn groups(&self, path: &str) -> TideResult<Vec<String>> {
        let parent = normalize(path);
        let prefix = if parent.is_empty() { String::new() } else { format!("{}/", parent) };
        Ok(self
            .all_group_paths()
            .into_iter()
            .filter_map(|g| {
                let rest = g.strip_prefix(&prefix)?;
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(normalize(path))
    }
}

/// Opener serving registered in-memory sources by path
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    sources: HashMap<PathBuf, Arc<MemorySource>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, source: MemorySource) {
        self.sources.insert(path.as_ref().to_path_buf(), Arc::new(source));
    }
}

impl SourceOpener for MemoryOpener {
    fn open(&self, path: &Path) -> TideResult<Box<dyn HierarchicalSource>> {
        let source = self.sources.get(path).ok_or_else(|| {
            TideError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No container registered for {}", path.display()),
            ))
        })?;
        Ok(Box::new(source.as_ref().clone()))
    }
}
