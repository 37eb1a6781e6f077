//! netCDF-4/HDF5 container access
//!
//! Reads granules through [`HierarchicalSource`] and writes
//! [`OutputProduct`]s. Dimension scales become netCDF coordinate variables
//! (a dimension and a variable of the same name); attached dimensions are
//! resolved by netCDF in the enclosing groups.

use crate::core::output::{DimLink, Group, OutputProduct, ProductWriter, VarData, Variable};
use crate::io::container::{HierarchicalSource, SourceOpener};
use crate::types::{AttrValue, TideError, TideResult};
use ndarray::{ArrayD, IxDyn};
use netcdf::AttributeValue;
use std::path::Path;

/// An open netCDF-4/HDF5 file
pub struct NetcdfSource {
    file: netcdf::File,
}

impl NetcdfSource {
    pub fn open<P: AsRef<Path>>(path: P) -> TideResult<Self> {
        let file = netcdf::open(path.as_ref())?;
        Ok(Self { file })
    }

    fn variable(&self, path: &str) -> TideResult<netcdf::Variable<'_>> {
        let path = path.trim_matches('/');
        self.file
            .variable(path)
            .ok_or_else(|| TideError::Schema(path.to_string()))
    }

    fn shape(var: &netcdf::Variable<'_>) -> Vec<usize> {
        var.dimensions().iter().map(|d| d.len()).collect()
    }
}

impl HierarchicalSource for NetcdfSource {
    fn read_f64(&self, path: &str) -> TideResult<ArrayD<f64>> {
        let var = self.variable(path)?;
        let values: Vec<f64> = var.get_values(..)?;
        ArrayD::from_shape_vec(IxDyn(&Self::shape(&var)), values)
            .map_err(|e| TideError::Format(format!("{}: {}", path, e)))
    }

    fn read_i64(&self, path: &str) -> TideResult<ArrayD<i64>> {
        let var = self.variable(path)?;
        let values: Vec<i64> = var.get_values(..)?;
        ArrayD::from_shape_vec(IxDyn(&Self::shape(&var)), values)
            .map_err(|e| TideError::Format(format!("{}: {}", path, e)))
    }

    fn attribute(&self, path: &str, name: &str) -> TideResult<Option<AttrValue>> {
        let path = path.trim_matches('/');
        let value = if path.is_empty() {
            self.file.attribute(name).map(|a| a.value()).transpose()?
        } else if let Some(var) = self.file.variable(path) {
            var.attribute_value(name).transpose()?
        } else {
            match self.file.group(path)? {
                Some(group) => group.attribute(name).map(|a| a.value()).transpose()?,
                None => return Err(TideError::Schema(path.to_string())),
            }
        };
        Ok(value.and_then(from_netcdf))
    }

    fn groups(&self, path: &str) -> TideResult<Vec<String>> {
        let path = path.trim_matches('/');
        let mut names: Vec<String> = if path.is_empty() {
            self.file.groups()?.map(|g| g.name()).collect()
        } else {
            self.file
                .group(path)?
                .ok_or_else(|| TideError::Schema(path.to_string()))?
                .groups()
                .map(|g| g.name())
                .collect()
        };
        names.sort();
        Ok(names)
    }

    fn contains(&self, path: &str) -> bool {
        self.file.variable(path.trim_matches('/')).is_some()
    }
}

/// Opens paths with [`NetcdfSource`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfOpener;

impl SourceOpener for NetcdfOpener {
    fn open(&self, path: &Path) -> TideResult<Box<dyn HierarchicalSource>> {
        Ok(Box::new(NetcdfSource::open(path)?))
    }
}

fn from_netcdf(value: AttributeValue) -> Option<AttrValue> {
    match value {
        AttributeValue::Str(s) => Some(AttrValue::Text(s)),
        AttributeValue::Strs(mut s) if s.len() == 1 => s.pop().map(AttrValue::Text),
        AttributeValue::Double(v) => Some(AttrValue::Float(v)),
        AttributeValue::Float(v) => Some(AttrValue::Float(f64::from(v))),
        AttributeValue::Doubles(v) if v.len() == 1 => Some(AttrValue::Float(v[0])),
        AttributeValue::Floats(v) if v.len() == 1 => Some(AttrValue::Float(f64::from(v[0]))),
        AttributeValue::Schar(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Uchar(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Short(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Ushort(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Int(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Uint(v) => Some(AttrValue::Int(i64::from(v))),
        AttributeValue::Longlong(v) => Some(AttrValue::Int(v)),
        AttributeValue::Ints(v) if v.len() == 1 => Some(AttrValue::Int(i64::from(v[0]))),
        AttributeValue::Shorts(v) if v.len() == 1 => Some(AttrValue::Int(i64::from(v[0]))),
        AttributeValue::Longlongs(v) if v.len() == 1 => Some(AttrValue::Int(v[0])),
        _ => None,
    }
}

fn to_netcdf(value: &AttrValue) -> AttributeValue {
    match value {
        AttrValue::Text(s) => AttributeValue::Str(s.clone()),
        AttrValue::Float(v) => AttributeValue::Double(*v),
        AttrValue::Int(v) => AttributeValue::Longlong(*v),
    }
}

/// Writes products as netCDF-4/HDF5 files
#[derive(Debug, Clone, Copy, Default)]
pub struct NetcdfWriter;

impl ProductWriter for NetcdfWriter {
    fn write_validated(&self, product: &OutputProduct, path: &Path) -> TideResult<()> {
        let mut file = netcdf::create(path)?;
        write_group(&mut file, &product.root)?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// The subset of the netCDF group API shared by files and groups
trait NcGroup {
    fn nc_dimension(&mut self, name: &str, len: usize) -> TideResult<()>;
    fn nc_attribute(&mut self, name: &str, value: &AttrValue) -> TideResult<()>;
    fn nc_variable(&mut self, variable: &Variable, dims: &[&str]) -> TideResult<()>;
    fn nc_group(&mut self, name: &str) -> TideResult<Box<dyn NcGroup + '_>>;
}

macro_rules! impl_nc_group {
    ($($head:tt)*) => {
        impl $($head)* {
            fn nc_dimension(&mut self, name: &str, len: usize) -> TideResult<()> {
                self.add_dimension(name, len)?;
                Ok(())
            }

            fn nc_attribute(&mut self, name: &str, value: &AttrValue) -> TideResult<()> {
                self.add_attribute(name, to_netcdf(value))?;
                Ok(())
            }

            fn nc_variable(&mut self, variable: &Variable, dims: &[&str]) -> TideResult<()> {
                match &variable.data {
                    VarData::F64(data) => {
                        let mut var = self.add_variable::<f64>(&variable.name, dims)?;
                        if let Some(fill) = variable.fill_value {
                            var.set_fill_value(fill)?;
                        }
                        put_attributes(&mut var, variable)?;
                        var.put_values(&data.iter().copied().collect::<Vec<f64>>(), ..)?;
                    }
                    VarData::I32(data) => {
                        let mut var = self.add_variable::<i32>(&variable.name, dims)?;
                        if let Some(fill) = variable.fill_value {
                            var.set_fill_value(fill as i32)?;
                        }
                        put_attributes(&mut var, variable)?;
                        var.put_values(&data.iter().copied().collect::<Vec<i32>>(), ..)?;
                    }
                    VarData::I64(data) => {
                        let mut var = self.add_variable::<i64>(&variable.name, dims)?;
                        if let Some(fill) = variable.fill_value {
                            var.set_fill_value(fill as i64)?;
                        }
                        put_attributes(&mut var, variable)?;
                        var.put_values(&data.iter().copied().collect::<Vec<i64>>(), ..)?;
                    }
                }
                Ok(())
            }

            fn nc_group(&mut self, name: &str) -> TideResult<Box<dyn NcGroup + '_>> {
                Ok(Box::new(self.add_group(name)?))
            }
        }
    };
}

impl_nc_group!(NcGroup for netcdf::FileMut);
impl_nc_group!(<'f> NcGroup for netcdf::GroupMut<'f>);

fn put_attributes(var: &mut netcdf::VariableMut<'_>, variable: &Variable) -> TideResult<()> {
    for (name, value) in variable.attrs.iter() {
        var.put_attribute(name, to_netcdf(value))?;
    }
    Ok(())
}

fn write_group(target: &mut dyn NcGroup, group: &Group) -> TideResult<()> {
    for dim in &group.dimensions {
        target.nc_dimension(&dim.name, dim.len)?;
    }
    for variable in &group.variables {
        match &variable.dims {
            DimLink::Scalar => target.nc_variable(variable, &[])?,
            DimLink::Scale => {
                let len = variable.data.shape().first().copied().unwrap_or(0);
                target.nc_dimension(&variable.name, len)?;
                target.nc_variable(variable, &[variable.name.as_str()])?;
            }
            DimLink::Attached(dims) => {
                let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
                target.nc_variable(variable, &dims)?;
            }
        }
    }
    for (name, value) in group.attrs.iter() {
        target.nc_attribute(name, value)?;
    }
    for child in &group.groups {
        let mut nc_child = target.nc_group(&child.name)?;
        write_group(nc_child.as_mut(), child)?;
    }
    Ok(())
}
