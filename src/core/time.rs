//! Time normalization
//!
//! Every input clock is reduced to UTC seconds relative to a fixed epoch and
//! then expressed in one of the [`TimeConvention`]s: days since 1992-01-01
//! for the tide engine and the repeat-track product, or J2000 seconds for the
//! airborne readers.

use crate::types::{TideError, TideResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use ndarray::{Array1, ArrayD, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Fixed reference epochs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Epoch {
    /// 1970-01-01T00:00:00
    Unix,
    /// 1980-01-06T00:00:00
    Gps,
    /// 1992-01-01T00:00:00
    Tide,
    /// 2000-01-01T12:00:00
    J2000,
    /// 1858-11-17T00:00:00
    ModifiedJulian,
    /// 2018-01-01T00:00:00
    AtlasSdp,
}

impl Epoch {
    /// Seconds of the epoch after 1970-01-01T00:00:00
    pub const fn unix_seconds(&self) -> i64 {
        match self {
            Epoch::Unix => 0,
            Epoch::Gps => 315_964_800,
            Epoch::Tide => 694_224_000,
            Epoch::J2000 => 946_728_000,
            Epoch::ModifiedJulian => -3_506_716_800,
            Epoch::AtlasSdp => 1_514_764_800,
        }
    }

    /// Seconds to add to a time relative to `self` to make it relative to `other`
    pub fn offset_to(&self, other: Epoch) -> f64 {
        (self.unix_seconds() - other.unix_seconds()) as f64
    }
}

/// Re-reference seconds from one epoch to another
pub fn convert_delta_time(seconds: f64, from: Epoch, to: Epoch) -> f64 {
    seconds + from.offset_to(to)
}

/// Seconds since `epoch` of a calendar date plus time of day.
///
/// Fractional and out-of-range hour/minute/second values carry over as plain
/// seconds.
pub fn calendar_to_seconds(date: NaiveDate, hour: f64, minute: f64, second: f64, epoch: Epoch) -> f64 {
    let days = date.signed_duration_since(unix_date()).num_days() as f64;
    days * SECONDS_PER_DAY + hour * 3600.0 + minute * 60.0 + second - epoch.unix_seconds() as f64
}

fn unix_date() -> NaiveDate {
    NaiveDate::default()
}

/// Calendar date-time of UTC seconds since `epoch`, truncated to microseconds
pub fn seconds_to_datetime(seconds: f64, epoch: Epoch) -> Option<NaiveDateTime> {
    if !seconds.is_finite() {
        return None;
    }
    let unix = convert_delta_time(seconds, epoch, Epoch::Unix);
    let whole = unix.floor();
    let micros = ((unix - whole) * 1e6).floor() as u32;
    DateTime::from_timestamp(whole as i64, micros.min(999_999) * 1000).map(|dt| dt.naive_utc())
}

/// ISO 8601 rendering with microseconds only when they are non-zero
pub fn iso_format(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() / 1000 == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Target time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeConvention {
    /// Days since 1992-01-01T00:00:00 UTC
    TideDays,
    /// UTC seconds since 2000-01-01T12:00:00
    J2000Seconds,
}

impl TimeConvention {
    pub fn epoch(&self) -> Epoch {
        match self {
            TimeConvention::TideDays => Epoch::Tide,
            TimeConvention::J2000Seconds => Epoch::J2000,
        }
    }

    /// Length of one unit in seconds
    pub fn unit_seconds(&self) -> f64 {
        match self {
            TimeConvention::TideDays => SECONDS_PER_DAY,
            TimeConvention::J2000Seconds => 1.0,
        }
    }

    /// Express UTC seconds since `epoch` in this convention
    pub fn from_seconds(&self, seconds: f64, epoch: Epoch) -> f64 {
        convert_delta_time(seconds, epoch, self.epoch()) / self.unit_seconds()
    }

    /// UTC seconds since `epoch` of a value in this convention
    pub fn to_seconds(&self, value: f64, epoch: Epoch) -> f64 {
        convert_delta_time(value * self.unit_seconds(), self.epoch(), epoch)
    }

    pub fn convert(&self, value: f64, target: TimeConvention) -> f64 {
        target.from_seconds(value * self.unit_seconds(), self.epoch())
    }

    pub fn to_datetime(&self, value: f64) -> Option<NaiveDateTime> {
        seconds_to_datetime(value * self.unit_seconds(), self.epoch())
    }
}

/// Leap-second lookup
pub trait LeapSecondService: Send + Sync {
    /// Number of leap seconds elapsed at each GPS time (seconds since 1980-01-06)
    fn count_leap_seconds(&self, gps_seconds: ArrayView1<f64>) -> Array1<i32>;
}

/// UTC leap seconds inserted since the GPS epoch, as GPS seconds
const LEAP_SECONDS_GPS: [f64; 18] = [
    46_828_800.0,
    78_364_801.0,
    109_900_802.0,
    173_059_203.0,
    252_028_804.0,
    315_187_205.0,
    346_723_206.0,
    393_984_007.0,
    425_520_008.0,
    457_056_009.0,
    504_489_610.0,
    551_750_411.0,
    599_184_012.0,
    820_108_813.0,
    914_803_214.0,
    1_025_136_015.0,
    1_119_744_016.0,
    1_167_264_017.0,
];

/// Static leap-second table (1981-07-01 through 2017-01-01)
#[derive(Debug, Clone)]
pub struct LeapSecondTable {
    instants: Vec<f64>,
}

impl Default for LeapSecondTable {
    fn default() -> Self {
        Self { instants: LEAP_SECONDS_GPS.to_vec() }
    }
}

impl LeapSecondTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with custom leap instants in GPS seconds
    pub fn with_instants(mut instants: Vec<f64>) -> Self {
        instants.sort_by(|a, b| a.total_cmp(b));
        Self { instants }
    }

    pub fn instants(&self) -> &[f64] {
        &self.instants
    }
}

impl LeapSecondService for LeapSecondTable {
    fn count_leap_seconds(&self, gps_seconds: ArrayView1<f64>) -> Array1<i32> {
        gps_seconds.mapv(|t| self.instants.partition_point(|&leap| leap <= t) as i32)
    }
}

/// TT - UT1 lookup
pub trait DeltaTimeService: Send + Sync {
    /// Time axis expected by `interpolate`
    fn convention(&self) -> TimeConvention;

    /// TT - UT1 in days at each time
    fn interpolate(&self, times: ArrayView1<f64>) -> TideResult<Array1<f64>>;
}

/// Tabulated TT - UT1 values, linearly interpolated and clamped at the ends
#[derive(Debug, Clone)]
pub struct DeltaTimeTable {
    /// Tide days of each row
    days: Vec<f64>,
    /// TT - UT1 seconds of each row
    delta: Vec<f64>,
}

impl DeltaTimeTable {
    /// Build from `(date, seconds)` rows
    pub fn new(rows: Vec<(NaiveDate, f64)>) -> TideResult<Self> {
        let mut rows: Vec<(f64, f64)> = rows
            .into_iter()
            .map(|(date, dt)| {
                let days = calendar_to_seconds(date, 0.0, 0.0, 0.0, Epoch::Tide) / SECONDS_PER_DAY;
                (days, dt)
            })
            .collect();
        if rows.is_empty() {
            return Err(TideError::Config("Delta time table has no rows".to_string()));
        }
        rows.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (days, delta) = rows.into_iter().unzip();
        Ok(Self { days, delta })
    }

    /// Parse rows of `year month day delta_seconds`; `#` lines are skipped
    pub fn parse(text: &str) -> TideResult<Self> {
        let mut rows = Vec::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(TideError::Format(format!(
                    "Delta time line {} has {} fields, expected 4",
                    line_number + 1,
                    fields.len()
                )));
            }
            let number = |s: &str| {
                s.parse::<f64>().map_err(|_| {
                    TideError::Format(format!("Invalid delta time value '{}' on line {}", s, line_number + 1))
                })
            };
            let (year, month, day) = (number(fields[0])?, number(fields[1])?, number(fields[2])?);
            let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).ok_or_else(|| {
                TideError::Format(format!("Invalid delta time date on line {}", line_number + 1))
            })?;
            rows.push((date, number(fields[3])?));
        }
        log::debug!("Parsed {} delta time rows", rows.len());
        Self::new(rows)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> TideResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    fn seconds_at(&self, day: f64) -> f64 {
        let n = self.days.len();
        if n == 1 || day <= self.days[0] {
            return self.delta[0];
        }
        if day >= self.days[n - 1] {
            return self.delta[n - 1];
        }
        let hi = self.days.partition_point(|&d| d <= day);
        let lo = hi - 1;
        let span = self.days[hi] - self.days[lo];
        if span <= 0.0 {
            return self.delta[hi];
        }
        let w = (day - self.days[lo]) / span;
        self.delta[lo] + w * (self.delta[hi] - self.delta[lo])
    }
}

impl DeltaTimeService for DeltaTimeTable {
    fn convention(&self) -> TimeConvention {
        TimeConvention::TideDays
    }

    fn interpolate(&self, times: ArrayView1<f64>) -> TideResult<Array1<f64>> {
        Ok(times.mapv(|t| {
            if t.is_finite() {
                self.seconds_at(t) / SECONDS_PER_DAY
            } else {
                0.0
            }
        }))
    }
}

/// Clock of calendar time stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Gps,
    Utc,
}

/// Raw time stamps as stored by an input product
#[derive(Debug, Clone)]
pub enum RawTime {
    /// Time of day on a fixed date
    Calendar {
        date: NaiveDate,
        hour: Array1<f64>,
        minute: Array1<f64>,
        second: Array1<f64>,
        clock: Clock,
    },
    /// UTC seconds since a mission epoch
    MissionElapsed { seconds: Array1<f64>, epoch: Epoch },
    /// GPS seconds since a product epoch, offset by `gps_offset` GPS seconds
    ProductElapsed { seconds: ArrayD<f64>, gps_offset: f64 },
}

/// Converts raw time stamps into a [`TimeConvention`]
pub struct TimeNormalizer<'a> {
    leap_seconds: &'a dyn LeapSecondService,
}

impl<'a> TimeNormalizer<'a> {
    pub fn new(leap_seconds: &'a dyn LeapSecondService) -> Self {
        Self { leap_seconds }
    }

    /// Convert raw stamps into `target`, keeping their shape
    pub fn to_reference_epoch(&self, raw: &RawTime, target: TimeConvention) -> TideResult<ArrayD<f64>> {
        match raw {
            RawTime::Calendar { date, hour, minute, second, clock } => {
                let n = hour.len();
                if minute.len() != n || second.len() != n {
                    return Err(TideError::Format(format!(
                        "Time of day fields disagree in length: {}, {}, {}",
                        n,
                        minute.len(),
                        second.len()
                    )));
                }
                let leaps = match clock {
                    Clock::Gps => {
                        let mut gps = Array1::<f64>::zeros(n);
                        Zip::from(&mut gps).and(hour).and(minute).and(second).for_each(
                            |g, &h, &m, &s| *g = calendar_to_seconds(*date, h, m, s, Epoch::Gps),
                        );
                        self.leap_seconds.count_leap_seconds(gps.view()).mapv(f64::from)
                    }
                    Clock::Utc => Array1::zeros(n),
                };
                let mut out = Array1::<f64>::zeros(n);
                Zip::from(&mut out)
                    .and(hour)
                    .and(minute)
                    .and(second)
                    .and(&leaps)
                    .for_each(|o, &h, &m, &s, &l| {
                        let utc = calendar_to_seconds(*date, h, m, s - l, Epoch::Unix);
                        *o = target.from_seconds(utc, Epoch::Unix);
                    });
                Ok(out.into_dyn())
            }
            RawTime::MissionElapsed { seconds, epoch } => {
                Ok(seconds.mapv(|s| target.from_seconds(s, *epoch)).into_dyn())
            }
            RawTime::ProductElapsed { seconds, gps_offset } => {
                let shape = seconds.raw_dim();
                let gps: Array1<f64> = seconds.iter().map(|s| s + gps_offset).collect();
                let leaps = self.leap_seconds.count_leap_seconds(gps.view());
                let converted: Vec<f64> = gps
                    .iter()
                    .zip(leaps.iter())
                    .map(|(&g, &l)| target.from_seconds(g - f64::from(l), Epoch::Gps))
                    .collect();
                ArrayD::from_shape_vec(shape, converted).map_err(|e| TideError::Format(e.to_string()))
            }
        }
    }

    /// UTC calendar date-time of GPS seconds since the GPS epoch
    pub fn gps_to_datetime(&self, gps_seconds: f64) -> Option<NaiveDateTime> {
        let leaps = self.leap_seconds.count_leap_seconds(ndarray::aview1(&[gps_seconds]));
        seconds_to_datetime(gps_seconds - f64::from(leaps[0]), Epoch::Gps)
    }
}

/// Hour, minute and second of a packed `hhmmss.sss` value.
///
/// The value is rendered as `{:010.3}` and sliced, so `120000.500` decodes
/// to exactly 12 h 0 min 0.5 s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedTime {
    pub hour: f64,
    pub minute: f64,
    pub second: f64,
}

impl PackedTime {
    pub fn decode(packed: f64) -> TideResult<Self> {
        Self::parse(&format!("{:010.3}", packed))
    }

    /// Slice an already formatted `hhmmss.sss` string
    pub fn parse(text: &str) -> TideResult<Self> {
        let field = |range: std::ops::Range<usize>| -> TideResult<f64> {
            text.get(range)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| TideError::Format(format!("Invalid packed time: {}", text)))
        };
        if text.len() < 5 {
            return Err(TideError::Format(format!("Invalid packed time: {}", text)));
        }
        Ok(Self {
            hour: field(0..2)?,
            minute: field(2..4)?,
            second: field(4..text.len())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn datetime(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_epoch_constants_match_calendar() {
        let cases = [
            (Epoch::Gps, datetime(1980, 1, 6, 0, 0, 0)),
            (Epoch::Tide, datetime(1992, 1, 1, 0, 0, 0)),
            (Epoch::J2000, datetime(2000, 1, 1, 12, 0, 0)),
            (Epoch::ModifiedJulian, datetime(1858, 11, 17, 0, 0, 0)),
            (Epoch::AtlasSdp, datetime(2018, 1, 1, 0, 0, 0)),
        ];
        for (epoch, dt) in cases {
            assert_eq!(epoch.unix_seconds(), dt.and_utc().timestamp(), "{:?}", epoch);
        }
    }

    #[test]
    fn test_leap_table_matches_dates() {
        let dates = [
            (1981, 7), (1982, 7), (1983, 7), (1985, 7), (1988, 1), (1990, 1), (1991, 1),
            (1992, 7), (1993, 7), (1994, 7), (1996, 1), (1997, 7), (1999, 1), (2006, 1),
            (2009, 1), (2012, 7), (2015, 7), (2017, 1),
        ];
        for (i, (y, m)) in dates.iter().enumerate() {
            let date = NaiveDate::from_ymd_opt(*y, *m, 1).unwrap();
            let expected = calendar_to_seconds(date, 0.0, 0.0, 0.0, Epoch::Gps) + i as f64;
            assert_eq!(LEAP_SECONDS_GPS[i], expected);
        }
    }

    #[test]
    fn test_leap_second_count() {
        let table = LeapSecondTable::new();
        let counts = table.count_leap_seconds(array![0.0, 46_828_799.0, 46_828_800.0, 1.3e9].view());
        assert_eq!(counts, array![0, 0, 1, 18]);
    }

    #[test]
    fn test_packed_time_slicing() {
        let t = PackedTime::decode(120000.5).unwrap();
        assert_eq!(t, PackedTime { hour: 12.0, minute: 0.0, second: 0.5 });

        let early = PackedTime::decode(5959.999).unwrap();
        assert_eq!(early.hour, 0.0);
        assert_eq!(early.minute, 59.0);
        assert_abs_diff_eq!(early.second, 59.999, epsilon = 1e-12);

        assert_eq!(PackedTime::parse("120000.500").unwrap().second, 0.5);
        assert!(PackedTime::parse("12").is_err());
    }

    #[test]
    fn test_calendar_gps_removes_leap_seconds() {
        let table = LeapSecondTable::new();
        let normalizer = TimeNormalizer::new(&table);
        let date = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        let raw = |clock| RawTime::Calendar {
            date,
            hour: array![12.0],
            minute: array![0.0],
            second: array![13.0],
            clock,
        };
        let utc = normalizer.to_reference_epoch(&raw(Clock::Utc), TimeConvention::J2000Seconds).unwrap();
        let gps = normalizer.to_reference_epoch(&raw(Clock::Gps), TimeConvention::J2000Seconds).unwrap();
        assert_abs_diff_eq!(utc[[0]], 13.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gps[[0]], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_product_elapsed_keeps_shape() {
        let table = LeapSecondTable::new();
        let normalizer = TimeNormalizer::new(&table);
        let offset = Epoch::AtlasSdp.offset_to(Epoch::Gps) + 18.0;
        let seconds = Array2::from_elem((2, 3), 0.0).into_dyn();
        let raw = RawTime::ProductElapsed { seconds, gps_offset: offset };
        let days = normalizer.to_reference_epoch(&raw, TimeConvention::TideDays).unwrap();
        assert_eq!(days.shape(), &[2, 3]);
        let expected = (Epoch::AtlasSdp.unix_seconds() - Epoch::Tide.unix_seconds()) as f64 / 86400.0;
        assert_abs_diff_eq!(days[[1, 2]], expected, epsilon = 1e-9);
    }

    #[test]
    fn test_convention_round_trip_to_datetime() {
        let j2000 = TimeConvention::J2000Seconds;
        let days = j2000.convert(0.0, TimeConvention::TideDays);
        assert_abs_diff_eq!(days, 2922.5, epsilon = 1e-12);
        assert_eq!(TimeConvention::TideDays.to_datetime(days).unwrap(), datetime(2000, 1, 1, 12, 0, 0));
        assert_eq!(iso_format(&datetime(2019, 4, 1, 6, 5, 4)), "2019-04-01T06:05:04");
    }

    #[test]
    fn test_delta_time_table_interpolates_and_clamps() {
        let text = "# year month day deltat\n1992 1 1 58.0\n1992 1 11 59.0\n";
        let table = DeltaTimeTable::parse(text).unwrap();
        let out = table.interpolate(array![-5.0, 5.0, 100.0].view()).unwrap();
        assert_abs_diff_eq!(out[0], 58.0 / 86400.0, epsilon = 1e-15);
        assert_abs_diff_eq!(out[1], 58.5 / 86400.0, epsilon = 1e-15);
        assert_abs_diff_eq!(out[2], 59.0 / 86400.0, epsilon = 1e-15);
        assert_eq!(table.convention(), TimeConvention::TideDays);
    }

    #[test]
    fn test_delta_time_table_rejects_short_rows() {
        assert!(matches!(DeltaTimeTable::parse("1992 1 1\n"), Err(TideError::Format(_))));
        assert!(matches!(DeltaTimeTable::parse("# only comments\n"), Err(TideError::Config(_))));
    }
}
