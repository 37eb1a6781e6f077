use ndarray::{Array1, Array2, ArrayView1, Axis};
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// Fill value used by the airborne tide product
pub const AIRBORNE_FILL_VALUE: f64 = -9999.0;

/// Hemisphere of an input track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// Hemisphere holding the majority of the given latitudes.
    ///
    /// Non-finite latitudes are ignored; ties go to the north.
    pub fn from_latitudes(latitudes: ArrayView1<f64>) -> Self {
        let (north, south) = latitudes
            .iter()
            .filter(|lat| lat.is_finite())
            .fold((0usize, 0usize), |(n, s), &lat| {
                if lat >= 0.0 { (n + 1, s) } else { (n, s + 1) }
            });
        if south > north { Hemisphere::South } else { Hemisphere::North }
    }

    /// Region flag used in airborne output names (GR for Greenland, AN for Antarctica)
    pub fn region_flag(&self) -> &'static str {
        match self {
            Hemisphere::North => "GR",
            Hemisphere::South => "AN",
        }
    }
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hemisphere::North => write!(f, "N"),
            Hemisphere::South => write!(f, "S"),
        }
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Bounding box over the points whose `valid` flag is set.
    ///
    /// Returns `None` when no point qualifies.
    pub fn from_points(
        latitude: ArrayView1<f64>,
        longitude: ArrayView1<f64>,
        valid: ArrayView1<bool>,
    ) -> Option<Self> {
        let mut bbox: Option<BoundingBox> = None;
        for ((&lat, &lon), &ok) in latitude.iter().zip(longitude.iter()).zip(valid.iter()) {
            if !ok || !lat.is_finite() || !lon.is_finite() {
                continue;
            }
            bbox = Some(match bbox {
                None => BoundingBox { min_lon: lon, max_lon: lon, min_lat: lat, max_lat: lat },
                Some(b) => BoundingBox {
                    min_lon: b.min_lon.min(lon),
                    max_lon: b.max_lon.max(lon),
                    min_lat: b.min_lat.min(lat),
                    max_lat: b.max_lat.max(lat),
                },
            });
        }
        bbox
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: self.min_lon.min(other.min_lon),
            max_lon: self.max_lon.max(other.max_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }
}

/// Shape variant of a canonical track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    /// Repeat visits of fixed reference points (points x cycles)
    AlongTrack,
    /// Flat list of independent measurements
    Point,
    /// Flat list of crossover measurements tied to a reference track
    Crossover,
}

/// Normalized track handed to the tide engine.
///
/// `time` and `mask` are `[points, columns]`; flat tracks have a single
/// column. Time is in days since 1992-01-01T00:00:00 UTC.
#[derive(Debug, Clone)]
pub struct CanonicalTrack {
    pub kind: TrackKind,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub time: Array2<f64>,
    pub mask: Array2<bool>,
}

impl CanonicalTrack {
    /// Build a track, folding non-finite coordinates and times into the mask
    pub fn new(
        kind: TrackKind,
        latitude: Array1<f64>,
        longitude: Array1<f64>,
        time: Array2<f64>,
        mask: Array2<bool>,
    ) -> TideResult<Self> {
        let n = latitude.len();
        if longitude.len() != n || time.nrows() != n {
            return Err(TideError::Format(format!(
                "Track fields disagree in length: latitude {}, longitude {}, time {}",
                n, longitude.len(), time.nrows()
            )));
        }
        if mask.dim() != time.dim() {
            return Err(TideError::Format(format!(
                "Mask shape {:?} does not match time shape {:?}",
                mask.dim(), time.dim()
            )));
        }
        if kind != TrackKind::AlongTrack && time.ncols() != 1 {
            return Err(TideError::Format(format!(
                "{:?} tracks must have a single time column, found {}",
                kind, time.ncols()
            )));
        }

        let mut mask = mask;
        for (i, mut row) in mask.axis_iter_mut(Axis(0)).enumerate() {
            let bad_position = !latitude[i].is_finite() || !longitude[i].is_finite();
            for (c, flag) in row.iter_mut().enumerate() {
                *flag |= bad_position || !time[[i, c]].is_finite();
            }
        }

        Ok(Self { kind, latitude, longitude, time, mask })
    }

    /// Build a flat (single column) track
    pub fn flat(
        kind: TrackKind,
        latitude: Array1<f64>,
        longitude: Array1<f64>,
        time: Array1<f64>,
        mask: Array1<bool>,
    ) -> TideResult<Self> {
        let n = time.len();
        let time = time.into_shape((n, 1)).map_err(|e| TideError::Format(e.to_string()))?;
        let m = mask.len();
        let mask = mask.into_shape((m, 1)).map_err(|e| TideError::Format(e.to_string()))?;
        Self::new(kind, latitude, longitude, time, mask)
    }

    pub fn n_points(&self) -> usize {
        self.latitude.len()
    }

    pub fn n_columns(&self) -> usize {
        self.time.ncols()
    }

    /// Points with at least one unmasked column
    pub fn point_validity(&self) -> Array1<bool> {
        self.mask.map_axis(Axis(1), |row| row.iter().any(|m| !m))
    }

    /// Geospatial bounds over unmasked points
    pub fn bounds(&self) -> Option<BoundingBox> {
        let valid = self.point_validity();
        BoundingBox::from_points(self.latitude.view(), self.longitude.view(), valid.view())
    }

    /// Minimum and maximum unmasked time
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.time
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, &m)| !m)
            .fold(None, |acc, (&t, _)| match acc {
                None => Some((t, t)),
                Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
            })
    }
}

/// Masked tide values for one track
#[derive(Debug, Clone)]
pub struct TidePrediction {
    pub values: Array2<f64>,
    pub mask: Array2<bool>,
    pub fill_value: f64,
}

impl TidePrediction {
    /// Number of unmasked values
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|m| !**m).count()
    }

    /// Values of a flat prediction as a vector
    pub fn column(&self, column: usize) -> Array1<f64> {
        self.values.column(column).to_owned()
    }
}

/// True when a value matches the sentinel or is not finite
pub fn is_invalid<T: Float>(value: T, fill_value: Option<T>) -> bool {
    !value.is_finite() || fill_value.map_or(false, |fv| value == fv)
}

/// Gather the elements at `indices`, failing on out-of-range entries
pub fn take_indices<T: Clone>(values: &Array1<T>, indices: &[usize]) -> TideResult<Array1<T>> {
    indices
        .iter()
        .map(|&i| {
            values.get(i).cloned().ok_or_else(|| {
                TideError::Format(format!("Subset index {} out of range for {} records", i, values.len()))
            })
        })
        .collect::<TideResult<Vec<T>>>()
        .map(Array1::from)
}

/// Gather the rows at `indices`, failing on out-of-range entries
pub fn take_rows<T: Clone>(values: &Array2<T>, indices: &[usize]) -> TideResult<Array2<T>> {
    if let Some(&bad) = indices.iter().find(|&&i| i >= values.nrows()) {
        return Err(TideError::Format(format!(
            "Subset index {} out of range for {} records",
            bad,
            values.nrows()
        )));
    }
    Ok(values.select(Axis(0), indices))
}

/// Typed attribute value of an input container or output product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Float(f64),
    Int(i64),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl std::fmt::Display for AttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
        }
    }
}

/// Error types for tide processing
#[derive(Debug, thiserror::Error)]
pub enum TideError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown tide model: {0}")]
    UnknownModel(String),

    #[error("Invalid data format: {0}")]
    Format(String),

    #[error("Missing dataset: {0}")]
    Schema(String),

    #[error("Tide model error: {0}")]
    ModelIo(String),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),
}

impl TideError {
    /// Errors that fail a single file while a batch keeps going
    pub fn is_per_file(&self) -> bool {
        !matches!(self, TideError::Config(_) | TideError::UnknownModel(_))
    }
}

/// Result type for tide operations
pub type TideResult<T> = Result<T, TideError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_hemisphere_majority() {
        assert_eq!(Hemisphere::from_latitudes(array![70.0, 71.0, -1.0].view()), Hemisphere::North);
        assert_eq!(Hemisphere::from_latitudes(array![-70.0, -71.0, 1.0].view()), Hemisphere::South);
        assert_eq!(Hemisphere::South.region_flag(), "AN");
    }

    #[test]
    fn test_track_masks_non_finite_positions() {
        let track = CanonicalTrack::new(
            TrackKind::AlongTrack,
            array![-75.0, f64::NAN],
            array![10.0, 11.0],
            Array2::from_elem((2, 2), 100.0),
            Array2::from_elem((2, 2), false),
        )
        .unwrap();
        assert_eq!(track.mask, array![[false, false], [true, true]]);
        assert_eq!(track.point_validity(), array![true, false]);
    }

    #[test]
    fn test_flat_track_rejects_mismatched_lengths() {
        let result = CanonicalTrack::flat(
            TrackKind::Point,
            array![1.0, 2.0],
            array![1.0],
            array![0.0, 0.0],
            array![false, false],
        );
        assert!(matches!(result, Err(TideError::Format(_))));
    }

    #[test]
    fn test_bounds_ignore_masked_points() {
        let track = CanonicalTrack::flat(
            TrackKind::Point,
            array![-80.0, -70.0, -60.0],
            array![100.0, 110.0, 170.0],
            array![1.0, 2.0, 3.0],
            array![false, false, true],
        )
        .unwrap();
        let bbox = track.bounds().unwrap();
        assert_eq!(bbox.min_lat, -80.0);
        assert_eq!(bbox.max_lat, -70.0);
        assert_eq!(bbox.max_lon, 110.0);
        assert_eq!(track.time_range(), Some((1.0, 2.0)));
    }

    #[test]
    fn test_take_indices_out_of_range() {
        let values = array![1.0, 2.0, 3.0];
        assert_eq!(take_indices(&values, &[2, 0]).unwrap(), array![3.0, 1.0]);
        assert!(take_indices(&values, &[3]).is_err());
    }

    #[test]
    fn test_config_errors_abort_batches() {
        assert!(!TideError::UnknownModel("FOO".into()).is_per_file());
        assert!(TideError::Schema("pt1/latitude".into()).is_per_file());
    }
}
