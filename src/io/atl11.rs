//! ICESat-2 ATL11 annual land ice height granules
//!
//! Each `ptN` beam pair holds reference points repeated over cycles plus a
//! `crossing_track_data` subgroup of crossover measurements keyed by the
//! datum-track reference point.

use crate::core::time::{RawTime, TimeConvention, TimeNormalizer};
use crate::io::container::{
    fill_value, join_path, read_f64_1d, read_f64_2d, read_i64_1d, require_attribute,
    HierarchicalSource,
};
use crate::io::subset::Subsetter;
use crate::types::{
    is_invalid, take_indices, take_rows, AttrValue, CanonicalTrack, Hemisphere, TideError,
    TideResult, TrackKind,
};
use ndarray::{Array1, Array2, Axis, Zip};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

pub const CROSSING_TRACK: &str = "crossing_track_data";
pub const CYCLE_STATS: &str = "cycle_stats";
pub const SDP_EPOCH_PATH: &str = "ancillary_data/atlas_sdp_gps_epoch";

/// Group attributes carried over to the output product
pub const BEAM_PAIR_ATTRIBUTES: [&str; 6] = [
    "beam_pair",
    "ReferenceGroundTrack",
    "first_cycle",
    "last_cycle",
    "equatorial_radius",
    "polar_radius",
];

/// Descriptive attributes copied from the SDP epoch dataset when present
const EPOCH_ATTRIBUTES: [&str; 5] = ["units", "long_name", "standard_name", "description", "source"];

/// Crossover measurements of a beam pair
#[derive(Debug, Clone)]
pub struct CrossingTrack {
    pub ref_pt: Array1<i64>,
    pub rgt: Array1<i64>,
    pub cycle_number: Array1<i64>,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub delta_time: Array1<f64>,
    pub fills: CrossingFills,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CrossingFills {
    pub rgt: Option<f64>,
    pub cycle_number: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub delta_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AlongTrackFills {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub delta_time: Option<f64>,
}

/// One `ptN` group
#[derive(Debug, Clone)]
pub struct BeamPair {
    pub name: String,
    pub ref_pt: Array1<i64>,
    pub cycle_number: Array1<i64>,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    /// `[reference points, cycles]` GPS seconds since the SDP epoch
    pub delta_time: Array2<f64>,
    pub fills: AlongTrackFills,
    /// `_FillValue` of `h_corr`, used for the tide variables
    pub tide_fill: f64,
    pub attributes: BTreeMap<String, AttrValue>,
    pub crossing: CrossingTrack,
}

impl BeamPair {
    /// Along-track mask: fill or non-finite time, latitude or longitude
    pub fn along_track_mask(&self) -> Array2<bool> {
        let mut mask = self.delta_time.mapv(|t| is_invalid(t, self.fills.delta_time));
        for (i, mut row) in mask.axis_iter_mut(Axis(0)).enumerate() {
            let bad = is_invalid(self.latitude[i], self.fills.latitude)
                || is_invalid(self.longitude[i], self.fills.longitude);
            if bad {
                row.fill(true);
            }
        }
        mask
    }

    pub fn crossing_mask(&self) -> Array1<bool> {
        let c = &self.crossing;
        let mut mask = Array1::from_elem(c.delta_time.len(), false);
        Zip::from(&mut mask)
            .and(&c.delta_time)
            .and(&c.latitude)
            .and(&c.longitude)
            .for_each(|m, &t, &lat, &lon| {
                *m = is_invalid(t, c.fills.delta_time)
                    || is_invalid(lat, c.fills.latitude)
                    || is_invalid(lon, c.fills.longitude)
            });
        mask
    }

    /// Along-track points x cycles on the tide time axis
    pub fn along_track(&self, normalizer: &TimeNormalizer, gps_offset: f64) -> TideResult<CanonicalTrack> {
        let raw = RawTime::ProductElapsed { seconds: self.delta_time.clone().into_dyn(), gps_offset };
        let time = normalizer
            .to_reference_epoch(&raw, TimeConvention::TideDays)?
            .into_dimensionality()
            .map_err(|e| TideError::Format(e.to_string()))?;
        CanonicalTrack::new(
            TrackKind::AlongTrack,
            self.latitude.clone(),
            self.longitude.clone(),
            time,
            self.along_track_mask(),
        )
    }

    /// Crossover measurements on the tide time axis
    pub fn crossing_track(&self, normalizer: &TimeNormalizer, gps_offset: f64) -> TideResult<CanonicalTrack> {
        let raw = RawTime::ProductElapsed {
            seconds: self.crossing.delta_time.clone().into_dyn(),
            gps_offset,
        };
        let time = normalizer
            .to_reference_epoch(&raw, TimeConvention::TideDays)?
            .into_dimensionality()
            .map_err(|e| TideError::Format(e.to_string()))?;
        CanonicalTrack::flat(
            TrackKind::Crossover,
            self.crossing.latitude.clone(),
            self.crossing.longitude.clone(),
            time,
            self.crossing_mask(),
        )
    }

    fn subset(mut self, subsetter: &Subsetter) -> TideResult<Self> {
        let indices = subsetter.indices();
        self.ref_pt = take_indices(&self.ref_pt, indices)?;
        self.latitude = take_indices(&self.latitude, indices)?;
        self.longitude = take_indices(&self.longitude, indices)?;
        self.delta_time = take_rows(&self.delta_time, indices)?;

        let kept: HashSet<i64> = self.ref_pt.iter().copied().collect();
        let rows: Vec<usize> = self
            .crossing
            .ref_pt
            .iter()
            .enumerate()
            .filter(|(_, r)| kept.contains(*r))
            .map(|(i, _)| i)
            .collect();
        let c = &self.crossing;
        self.crossing = CrossingTrack {
            ref_pt: take_indices(&c.ref_pt, &rows)?,
            rgt: take_indices(&c.rgt, &rows)?,
            cycle_number: take_indices(&c.cycle_number, &rows)?,
            latitude: take_indices(&c.latitude, &rows)?,
            longitude: take_indices(&c.longitude, &rows)?,
            delta_time: take_indices(&c.delta_time, &rows)?,
            fills: c.fills,
        };
        Ok(self)
    }
}

/// A parsed ATL11 granule
#[derive(Debug, Clone)]
pub struct Atl11Granule {
    /// GPS seconds between the GPS epoch and the ATLAS SDP epoch
    pub atlas_sdp_gps_epoch: f64,
    pub epoch_attributes: BTreeMap<String, AttrValue>,
    pub beam_pairs: Vec<BeamPair>,
}

impl Atl11Granule {
    /// Majority hemisphere of the valid along-track latitudes
    pub fn hemisphere(&self) -> Hemisphere {
        let latitudes: Array1<f64> = self
            .beam_pairs
            .iter()
            .flat_map(|p| {
                p.latitude
                    .iter()
                    .copied()
                    .filter(move |&lat| !is_invalid(lat, p.fills.latitude))
            })
            .collect();
        Hemisphere::from_latitudes(latitudes.view())
    }
}

/// Read every beam pair of a granule
pub fn read_atl11(source: &dyn HierarchicalSource, subsetter: Option<&Subsetter>) -> TideResult<Atl11Granule> {
    let epoch = source.read_f64(SDP_EPOCH_PATH)?;
    let atlas_sdp_gps_epoch = *epoch
        .iter()
        .next()
        .ok_or_else(|| TideError::Format(format!("{} is empty", SDP_EPOCH_PATH)))?;

    let mut epoch_attributes = BTreeMap::new();
    for name in EPOCH_ATTRIBUTES {
        if let Some(value) = source.attribute(SDP_EPOCH_PATH, name)? {
            epoch_attributes.insert(name.to_string(), value);
        }
    }

    let pair_pattern =
        Regex::new(r"^pt\d$").map_err(|e| TideError::Format(format!("Regex error: {}", e)))?;
    let names: Vec<String> = source
        .groups("")?
        .into_iter()
        .filter(|g| pair_pattern.is_match(g))
        .collect();
    if names.is_empty() {
        return Err(TideError::Schema("pt1".to_string()));
    }

    let mut beam_pairs = Vec::with_capacity(names.len());
    for name in names {
        let pair = read_beam_pair(source, &name)?;
        let pair = match subsetter {
            Some(s) => pair.subset(s)?,
            None => pair,
        };
        log::debug!(
            "{}: {} reference points x {} cycles, {} crossovers",
            pair.name,
            pair.delta_time.nrows(),
            pair.delta_time.ncols(),
            pair.crossing.delta_time.len()
        );
        beam_pairs.push(pair);
    }

    Ok(Atl11Granule { atlas_sdp_gps_epoch, epoch_attributes, beam_pairs })
}

fn read_beam_pair(source: &dyn HierarchicalSource, name: &str) -> TideResult<BeamPair> {
    let path = |p: &str| join_path(name, p);

    let ref_pt = read_i64_1d(source, &path("ref_pt"))?;
    let cycle_number = read_i64_1d(source, &path("cycle_number"))?;
    let latitude = read_f64_1d(source, &path("latitude"))?;
    let longitude = read_f64_1d(source, &path("longitude"))?;
    let delta_time = read_f64_2d(source, &path("delta_time"))?;

    let n = ref_pt.len();
    if latitude.len() != n || longitude.len() != n || delta_time.nrows() != n {
        return Err(TideError::Format(format!(
            "{}: reference point fields disagree in length",
            name
        )));
    }
    if delta_time.ncols() != cycle_number.len() {
        return Err(TideError::Format(format!(
            "{}: delta_time has {} cycles, cycle_number has {}",
            name,
            delta_time.ncols(),
            cycle_number.len()
        )));
    }

    let fills = AlongTrackFills {
        latitude: fill_value(source, &path("latitude"))?,
        longitude: fill_value(source, &path("longitude"))?,
        delta_time: fill_value(source, &path("delta_time"))?,
    };
    let tide_fill = require_attribute(source, &path("h_corr"), "_FillValue")?
        .as_f64()
        .ok_or_else(|| TideError::Format(format!("{}/h_corr _FillValue is not numeric", name)))?;

    let mut attributes = BTreeMap::new();
    for attr in BEAM_PAIR_ATTRIBUTES {
        attributes.insert(attr.to_string(), require_attribute(source, name, attr)?);
    }

    let crossing = read_crossing_track(source, &path(CROSSING_TRACK))?;

    Ok(BeamPair {
        name: name.to_string(),
        ref_pt,
        cycle_number,
        latitude,
        longitude,
        delta_time,
        fills,
        tide_fill,
        attributes,
        crossing,
    })
}

fn read_crossing_track(source: &dyn HierarchicalSource, group: &str) -> TideResult<CrossingTrack> {
    let path = |p: &str| join_path(group, p);
    let track = CrossingTrack {
        ref_pt: read_i64_1d(source, &path("ref_pt"))?,
        rgt: read_i64_1d(source, &path("rgt"))?,
        cycle_number: read_i64_1d(source, &path("cycle_number"))?,
        latitude: read_f64_1d(source, &path("latitude"))?,
        longitude: read_f64_1d(source, &path("longitude"))?,
        delta_time: read_f64_1d(source, &path("delta_time"))?,
        fills: CrossingFills {
            rgt: fill_value(source, &path("rgt"))?,
            cycle_number: fill_value(source, &path("cycle_number"))?,
            latitude: fill_value(source, &path("latitude"))?,
            longitude: fill_value(source, &path("longitude"))?,
            delta_time: fill_value(source, &path("delta_time"))?,
        },
    };
    let n = track.ref_pt.len();
    let lengths = [
        track.rgt.len(),
        track.cycle_number.len(),
        track.latitude.len(),
        track.longitude.len(),
        track.delta_time.len(),
    ];
    if lengths.iter().any(|&l| l != n) {
        return Err(TideError::Format(format!("{}: crossover fields disagree in length", group)));
    }
    Ok(track)
}
