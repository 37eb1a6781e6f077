//! Assembly of the airborne and repeat-track tide products

use crate::core::output::{Attr, Attributes, DimLink, Group, OutputProduct, Variable};
use crate::core::time::{iso_format, TimeConvention, TimeNormalizer};
use crate::io::airborne::AirborneData;
use crate::io::atl11::{Atl11Granule, BeamPair, BEAM_PAIR_ATTRIBUTES, CROSSING_TRACK, CYCLE_STATS};
use crate::models::ModelDescriptor;
use crate::types::{
    BoundingBox, CanonicalTrack, TideError, TideResult, TidePrediction, AIRBORNE_FILL_VALUE,
};
use chrono::NaiveDateTime;
use ndarray::{Array1, Axis};

/// Dimension shared by every airborne variable
pub const RECORD_SIZE: &str = "RECORD_SIZE";

const ANCILLARY_DATA: &str = "ancillary_data";
const SEGMENT_RATE: &str = "Data within this group are stored at the average segment rate.";
const REFERENCE_POINT: &str = "The reference point is the 7 digit segment_id number corresponding to \
    the center of the ATL06 data used for each ATL11 point.  These are sequential, starting with 1 \
    for the first segment after an ascending equatorial crossing node.";
const CYCLE_DESCRIPTION: &str = "Number of 91-day periods that have elapsed since ICESat-2 entered \
    the science orbit. Each of the 1,387 reference ground track (RGTs) is targeted in the polar \
    regions once every 91 days.";
const DELTA_TIME_DESCRIPTION: &str = "Number of GPS seconds since the ATLAS SDP epoch. The ATLAS \
    Standard Data Products (SDP) epoch offset is defined within /ancillary_data/atlas_sdp_gps_epoch \
    as the number of GPS seconds between the GPS epoch (1980-01-06T00:00:00.000000Z UTC) and the \
    ATLAS SDP epoch. By adding the offset contained within atlas_sdp_gps_epoch to delta time \
    parameters, the time in gps_seconds relative to the GPS epoch can be computed.";
const ICESAT2: &str = "ICESat-2 > Ice, Cloud, and land Elevation Satellite-2";

/// Caller supplied provenance of a product
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// Basename of the input granule
    pub input_file: String,
    pub created: NaiveDateTime,
}

/// Tides of one beam pair
#[derive(Debug, Clone)]
pub struct BeamPairTides {
    /// `[reference points, cycles]`
    pub along_track: TidePrediction,
    /// Single column over the crossovers
    pub crossing: TidePrediction,
}

/// Build the airborne tide product
pub fn assemble_airborne(
    data: &AirborneData,
    track: &CanonicalTrack,
    prediction: &TidePrediction,
    model: &ModelDescriptor,
    provenance: &Provenance,
) -> TideResult<OutputProduct> {
    let n = data.len();
    if track.n_points() != n || prediction.values.dim() != (n, 1) || prediction.mask.dim() != (n, 1) {
        return Err(TideError::Format(format!(
            "Airborne product inputs disagree: {} records, {} track points, prediction {:?}",
            n,
            track.n_points(),
            prediction.values.dim()
        )));
    }

    let variable = model.variable();
    let tide = prediction.column(0);
    let tide_count = tide.iter().filter(|&&v| v != prediction.fill_value).count() as i64;
    let record = DimLink::attached(&[RECORD_SIZE]);
    let position = "Corresponding_to_the_measurement_position_at_the_acquisition_time";

    let mut product = OutputProduct::new();
    let root = &mut product.root;
    root.add_dimension(RECORD_SIZE, n);
    root.add_variable(
        Variable::new("lat", data.latitude.clone(), record.clone()).with_attrs(
            Attributes::new()
                .with(Attr::LongName, "Latitude_of_measurement")
                .with(Attr::Description, position)
                .with(Attr::Units, "Degrees_North"),
        ),
    );
    root.add_variable(
        Variable::new("lon", data.longitude.clone(), record.clone()).with_attrs(
            Attributes::new()
                .with(Attr::LongName, "Longitude_of_measurement")
                .with(Attr::Description, position)
                .with(Attr::Units, "Degrees_East"),
        ),
    );
    root.add_variable(
        Variable::new(variable, tide, record.clone())
            .with_fill(Some(AIRBORNE_FILL_VALUE))
            .with_attrs(
                Attributes::new()
                    .with(Attr::TideCount, tide_count)
                    .with(
                        Attr::Description,
                        "Tidal_elevation_from_harmonic_constants_at_the_measurement_position_at_the_acquisition_time",
                    )
                    .with(Attr::Reference, model.reference)
                    .with(Attr::Model, model.id.name())
                    .with(Attr::Units, "meters")
                    .with(Attr::LongName, model.airborne_long_name()),
            ),
    );
    root.add_variable(
        Variable::new("time", track.time.column(0).to_owned(), record).with_attrs(
            Attributes::new()
                .with(Attr::LongName, "Time")
                .with(Attr::Description, "Time_corresponding_to_the_measurement_position")
                .with(Attr::Units, "Days since 1992-01-01T00:00:00")
                .with(Attr::Calendar, "standard"),
        ),
    );

    let attrs = &mut root.attrs;
    attrs
        .set(Attr::FeatureType, "trajectory")
        .set(Attr::Title, "Tidal_correction_for_elevation_measurements")
        .set(
            Attr::Summary,
            "Tidal_correction_computed_at_elevation_measurements_using_a_tidal_model_driver.",
        )
        .set(Attr::Project, "NASA_Operation_IceBridge")
        .set(Attr::ProcessingLevel, "4")
        .set(Attr::DateCreated, provenance.created.format("%Y-%m-%d").to_string())
        .set(Attr::ElevationFile, provenance.input_file.as_str())
        .set(Attr::TideModel, model.id.name());
    // coverage follows the tide mask so sentinel rows are left out
    let covered = CanonicalTrack { mask: prediction.mask.clone(), ..track.clone() };
    set_bounds(attrs, covered.bounds());
    attrs.set(Attr::TimeType, "UTC");

    match covered.time_range() {
        Some((start, end)) => {
            let days = TimeConvention::TideDays;
            let (first, last) = days
                .to_datetime(start)
                .zip(days.to_datetime(end))
                .ok_or_else(|| TideError::Format(format!("Time range {} to {} out of range", start, end)))?;
            attrs
                .set(Attr::RangeBeginningTime, first.format("%H:%M:%S").to_string())
                .set(Attr::RangeEndingTime, last.format("%H:%M:%S").to_string())
                .set(Attr::RangeBeginningDate, first.format("%Y-%m-%d").to_string())
                .set(Attr::RangeEndingDate, last.format("%Y-%m-%d").to_string())
                .set(
                    Attr::DurationTimeSeconds,
                    format!("{:.0}", ((end - start) * 86400.0).round()),
                );
        }
        None => log::warn!("{}: no valid times, temporal coverage omitted", provenance.input_file),
    }

    Ok(product)
}

/// Build the repeat-track tide product
pub fn assemble_atl11(
    granule: &Atl11Granule,
    tides: &[BeamPairTides],
    model: &ModelDescriptor,
    provenance: &Provenance,
    normalizer: &TimeNormalizer,
) -> TideResult<OutputProduct> {
    if tides.len() != granule.beam_pairs.len() {
        return Err(TideError::Format(format!(
            "{} beam pairs but {} tide predictions",
            granule.beam_pairs.len(),
            tides.len()
        )));
    }

    let mut product = OutputProduct::new();
    let mut ancillary = Group::new(ANCILLARY_DATA);
    let mut epoch_attrs = Attributes::new();
    for (name, value) in &granule.epoch_attributes {
        epoch_attrs.set_named(name, value.clone());
    }
    ancillary.add_variable(
        Variable::new(
            "atlas_sdp_gps_epoch",
            ndarray::arr0(granule.atlas_sdp_gps_epoch).into_dyn(),
            DimLink::Scalar,
        )
        .with_attrs(epoch_attrs),
    );
    product.root.add_group(ancillary);

    let mut bounds: Option<BoundingBox> = None;
    let mut time_range: Option<(f64, f64)> = None;
    for (pair, tide) in granule.beam_pairs.iter().zip(tides) {
        product.root.add_group(beam_pair_group(pair, tide, model)?);

        let mask = &tide.along_track.mask;
        let valid = mask.map_axis(Axis(1), |row| row.iter().any(|m| !m));
        if let Some(b) = BoundingBox::from_points(pair.latitude.view(), pair.longitude.view(), valid.view()) {
            bounds = Some(bounds.map_or(b, |acc| acc.union(&b)));
        }
        for (&t, &m) in pair.delta_time.iter().zip(mask.iter()) {
            if !m {
                time_range = Some(time_range.map_or((t, t), |(lo, hi)| (lo.min(t), hi.max(t))));
            }
        }
    }

    let attrs = &mut product.root.attrs;
    attrs
        .set(Attr::FeatureType, "trajectory")
        .set(Attr::Title, "ATLAS/ICESat-2 Annual Land Ice Height")
        .set(
            Attr::Summary,
            "The purpose of ATL11 is to provide an ICESat-2 satellite cycle summary of heights and \
             height changes of land-based ice and will be provided as input to ATL15 and ATL16, \
             gridded estimates of heights and height-changes.",
        )
        .set(
            Attr::Description,
            "Land ice parameters for each beam pair. All parameters are calculated for the same \
             along-track increments for each beam pair and repeat.",
        )
        .set(Attr::DateCreated, iso_format(&provenance.created))
        .set(Attr::Project, ICESAT2)
        .set(Attr::Instrument, "ATLAS > Advanced Topographic Laser Altimeter System")
        .set(Attr::Source, "Spacecraft")
        .set(Attr::References, "https://nsidc.org/data/icesat-2")
        .set(Attr::ProcessingLevel, "4")
        .set(Attr::InputFiles, provenance.input_file.as_str());
    set_bounds(attrs, bounds);
    attrs.set(Attr::DateType, "UTC").set(Attr::TimeType, "CCSDS UTC-A");

    match time_range {
        Some((start, end)) => {
            let epoch = granule.atlas_sdp_gps_epoch;
            let (first, last) = normalizer
                .gps_to_datetime(epoch + start)
                .zip(normalizer.gps_to_datetime(epoch + end))
                .ok_or_else(|| TideError::Format(format!("Time range {} to {} out of range", start, end)))?;
            attrs
                .set(Attr::TimeCoverageStart, iso_format(&first))
                .set(Attr::TimeCoverageEnd, iso_format(&last))
                .set(Attr::TimeCoverageDuration, format!("{:.0}", end - start));
        }
        None => log::warn!("{}: no valid times, temporal coverage omitted", provenance.input_file),
    }

    Ok(product)
}

fn set_bounds(attrs: &mut Attributes, bounds: Option<BoundingBox>) {
    if let Some(b) = bounds {
        attrs
            .set(Attr::GeospatialLatMin, b.min_lat)
            .set(Attr::GeospatialLatMax, b.max_lat)
            .set(Attr::GeospatialLonMin, b.min_lon)
            .set(Attr::GeospatialLonMax, b.max_lon);
    } else {
        log::warn!("No valid points, geospatial bounds omitted");
    }
    attrs
        .set(Attr::GeospatialLatUnits, "degrees_north")
        .set(Attr::GeospatialLonUnits, "degrees_east")
        .set(Attr::GeospatialEllipsoid, "WGS84");
}

fn beam_pair_group(pair: &BeamPair, tides: &BeamPairTides, model: &ModelDescriptor) -> TideResult<Group> {
    let (n_points, n_cycles) = pair.delta_time.dim();
    if tides.along_track.values.dim() != (n_points, n_cycles)
        || tides.crossing.values.dim() != (pair.crossing.ref_pt.len(), 1)
    {
        return Err(TideError::Format(format!(
            "{}: tide shapes {:?} and {:?} do not match the beam pair",
            pair.name,
            tides.along_track.values.dim(),
            tides.crossing.values.dim()
        )));
    }

    let mut group = Group::new(&pair.name);
    group
        .attrs
        .set(Attr::Description, "Contains the primary science parameters for this data set");
    for name in BEAM_PAIR_ATTRIBUTES {
        if let Some(value) = pair.attributes.get(name) {
            group.attrs.set_named(name, value.clone());
        }
    }

    let ref_and_cycle = DimLink::attached(&["ref_pt", "cycle_number"]);
    let per_point = DimLink::attached(&["ref_pt"]);
    group
        .add_variable(
            Variable::new("ref_pt", pair.ref_pt.clone(), DimLink::Scale).with_attrs(
                Attributes::new()
                    .with(Attr::Units, "1")
                    .with(Attr::ContentType, "referenceInformation")
                    .with(Attr::LongName, "Reference point number")
                    .with(Attr::Source, "ATL06")
                    .with(Attr::Description, REFERENCE_POINT)
                    .with(Attr::Coordinates, "delta_time latitude longitude"),
            ),
        )
        .add_variable(
            Variable::new("cycle_number", narrow(&pair.cycle_number, "cycle_number")?, DimLink::Scale)
                .with_attrs(
                    Attributes::new()
                        .with(Attr::Units, "1")
                        .with(Attr::LongName, "Orbital cycle number")
                        .with(Attr::Source, "ATL06")
                        .with(Attr::Description, CYCLE_DESCRIPTION),
                ),
        )
        .add_variable(
            Variable::new("delta_time", pair.delta_time.clone(), ref_and_cycle.clone())
                .with_fill(pair.fills.delta_time)
                .with_attrs(delta_time_attrs("ref_pt cycle_number latitude longitude")),
        )
        .add_variable(
            Variable::new("latitude", pair.latitude.clone(), per_point.clone())
                .with_fill(pair.fills.latitude)
                .with_attrs(latitude_attrs("Latitude", "ref_pt delta_time longitude")),
        )
        .add_variable(
            Variable::new("longitude", pair.longitude.clone(), per_point.clone())
                .with_fill(pair.fills.longitude)
                .with_attrs(longitude_attrs("Longitude", "ref_pt delta_time latitude")),
        );

    let mut stats = Group::new(CYCLE_STATS);
    stats
        .attrs
        .set(
            Attr::GroupDescription,
            "The cycle_stats subgroup contains summary information about segments for each \
             reference point, including the uncorrected mean heights for reference surfaces, \
             blowing snow and cloud indicators, and geolocation and height misfit statistics.",
        )
        .set(Attr::DataRate, SEGMENT_RATE);
    stats.add_variable(
        Variable::new(model.variable(), tides.along_track.values.clone(), ref_and_cycle)
            .with_fill(Some(tides.along_track.fill_value))
            .with_attrs(tide_attrs(
                model,
                "../ref_pt ../cycle_number ../delta_time ../latitude ../longitude",
            )),
    );
    group.add_group(stats);
    group.add_group(crossing_group(pair, tides, model)?);
    Ok(group)
}

fn crossing_group(pair: &BeamPair, tides: &BeamPairTides, model: &ModelDescriptor) -> TideResult<Group> {
    let c = &pair.crossing;
    let per_point = DimLink::attached(&["ref_pt"]);
    let mut group = Group::new(CROSSING_TRACK);
    group
        .attrs
        .set(
            Attr::GroupDescription,
            "The crossing_track_data subgroup contains elevation data at crossover locations. \
             These are locations where two ICESat-2 pair tracks cross, so data are available \
             from both the datum track, for which the granule was generated, and from the \
             crossing track.",
        )
        .set(Attr::DataRate, SEGMENT_RATE);

    group
        .add_variable(
            Variable::new("ref_pt", c.ref_pt.clone(), DimLink::Scale).with_attrs(
                Attributes::new()
                    .with(Attr::Units, "1")
                    .with(Attr::ContentType, "referenceInformation")
                    .with(Attr::LongName, "fit center reference point number, segment_id")
                    .with(Attr::Source, "derived, ATL11 algorithm")
                    .with(
                        Attr::Description,
                        format!(
                            "The reference-point number of the fit center for the datum track. {}",
                            REFERENCE_POINT
                        ),
                    )
                    .with(Attr::Coordinates, "delta_time latitude longitude"),
            ),
        )
        .add_variable(
            Variable::new("rgt", narrow(&c.rgt, "rgt")?, per_point.clone())
                .with_fill(c.fills.rgt)
                .with_attrs(
                    Attributes::new()
                        .with(Attr::Units, "1")
                        .with(Attr::ContentType, "referenceInformation")
                        .with(Attr::LongName, "crossover reference ground track")
                        .with(Attr::Source, "ATL06")
                        .with(Attr::Description, "The RGT number for the crossing data.")
                        .with(Attr::Coordinates, "ref_pt delta_time latitude longitude"),
                ),
        )
        .add_variable(
            Variable::new("cycle_number", narrow(&c.cycle_number, "cycle_number")?, per_point.clone())
                .with_fill(c.fills.cycle_number)
                .with_attrs(
                    Attributes::new()
                        .with(Attr::Units, "1")
                        .with(Attr::LongName, "crossover cycle number")
                        .with(Attr::Source, "ATL06")
                        .with(
                            Attr::Description,
                            format!("Cycle number for the crossing data. {}", CYCLE_DESCRIPTION),
                        ),
                ),
        )
        .add_variable(
            Variable::new("delta_time", c.delta_time.clone(), per_point.clone())
                .with_fill(c.fills.delta_time)
                .with_attrs(delta_time_attrs("ref_pt latitude longitude")),
        )
        .add_variable(
            Variable::new("latitude", c.latitude.clone(), per_point.clone())
                .with_fill(c.fills.latitude)
                .with_attrs(latitude_attrs("crossover latitude", "ref_pt delta_time longitude")),
        )
        .add_variable(
            Variable::new("longitude", c.longitude.clone(), per_point.clone())
                .with_fill(c.fills.longitude)
                .with_attrs(longitude_attrs("crossover longitude", "ref_pt delta_time latitude")),
        )
        .add_variable(
            Variable::new(model.variable(), tides.crossing.column(0), per_point)
                .with_fill(Some(tides.crossing.fill_value))
                .with_attrs(tide_attrs(model, "ref_pt delta_time latitude longitude")),
        );
    Ok(group)
}

fn delta_time_attrs(coordinates: &str) -> Attributes {
    Attributes::new()
        .with(Attr::Units, "seconds since 2018-01-01")
        .with(Attr::LongName, "Elapsed GPS seconds")
        .with(Attr::StandardName, "time")
        .with(Attr::Calendar, "standard")
        .with(Attr::Source, "ATL06")
        .with(Attr::Description, DELTA_TIME_DESCRIPTION)
        .with(Attr::Coordinates, coordinates)
}

fn latitude_attrs(long_name: &str, coordinates: &str) -> Attributes {
    Attributes::new()
        .with(Attr::Units, "degrees_north")
        .with(Attr::ContentType, "physicalMeasurement")
        .with(Attr::LongName, long_name)
        .with(Attr::StandardName, "latitude")
        .with(Attr::Source, "ATL06")
        .with(Attr::Description, "Center latitude of selected segments")
        .with(Attr::ValidMin, -90.0)
        .with(Attr::ValidMax, 90.0)
        .with(Attr::Coordinates, coordinates)
}

fn longitude_attrs(long_name: &str, coordinates: &str) -> Attributes {
    Attributes::new()
        .with(Attr::Units, "degrees_east")
        .with(Attr::ContentType, "physicalMeasurement")
        .with(Attr::LongName, long_name)
        .with(Attr::StandardName, "longitude")
        .with(Attr::Source, "ATL06")
        .with(Attr::Description, "Center longitude of selected segments")
        .with(Attr::ValidMin, -180.0)
        .with(Attr::ValidMax, 180.0)
        .with(Attr::Coordinates, coordinates)
}

fn tide_attrs(model: &ModelDescriptor, coordinates: &str) -> Attributes {
    Attributes::new()
        .with(Attr::Units, "meters")
        .with(Attr::ContentType, "referenceInformation")
        .with(Attr::LongName, model.long_name())
        .with(Attr::Description, model.description())
        .with(Attr::Source, model.id.name())
        .with(Attr::Reference, model.reference)
        .with(Attr::Coordinates, coordinates)
}

/// Integer counters stored as 32-bit values
fn narrow(values: &Array1<i64>, name: &str) -> TideResult<Array1<i32>> {
    values
        .iter()
        .map(|&v| {
            i32::try_from(v).map_err(|_| TideError::Format(format!("{} value {} exceeds 32 bits", name, v)))
        })
        .collect::<TideResult<Vec<i32>>>()
        .map(Array1::from)
}
