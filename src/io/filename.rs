//! Input filename grammars and output naming
//!
//! Basenames are classified into one of the supported products; anything
//! else is a format error. Output names are pure functions of the parsed
//! tokens, the hemisphere and the model.

use crate::types::{Hemisphere, TideError, TideResult};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::path::Path;

const ICESSN_PATTERN: &str = r"^(BLATM2|ILATM2)_(\d+)_(\d+)_smooth_nadir(.*?)(csv|seg|pt)$";
const QFIT_PATTERN: &str = r"^(BLATM1[Bb]|ILATM1[Bb]|ILNSA1[Bb])_(\d+)_(\d+)(.*?)\.(qi|TXT|h5)$";
const LVIS_PATTERN: &str = r"^(BLVIS2|BVLIS2|ILVIS2|ILVGH2)_(.*?)(\d+)_(\d+)_(R\d+)_(\d+)\.H5$";
const ATL11_PATTERN: &str =
    r"(processed_)?(ATL\d{2})_(\d{4})(\d{2})_(\d{2})(\d{2})_(\d{3})_(\d{2})(.*?)\.h5$";

/// Airborne instrument flag used in output names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirborneKind {
    /// ATM Level-2 ICESSN
    Atm,
    /// ATM Level-1b QFIT
    Atm1b,
    Lvis,
    /// LVIS Global Hawk
    Lvgh,
}

impl AirborneKind {
    pub fn flag(&self) -> &'static str {
        match self {
            AirborneKind::Atm => "ATM",
            AirborneKind::Atm1b => "ATM1b",
            AirborneKind::Lvis => "LVIS",
            AirborneKind::Lvgh => "LVGH",
        }
    }
}

/// Tokens of an airborne granule name
#[derive(Debug, Clone, PartialEq)]
pub struct AirborneName {
    pub kind: AirborneKind,
    pub mission: String,
    pub date: NaiveDate,
    /// File suffix (`qi`, `TXT`, `h5`, `csv`, `seg`, `pt`, `H5`)
    pub suffix: String,
    /// Region token of LVIS names (`GL`, `AQ`)
    pub region: Option<String>,
    /// Release token of LVIS names (`R1803`)
    pub release: Option<String>,
}

impl AirborneName {
    /// Hemisphere carried by the filename, if any
    pub fn hemisphere(&self) -> Option<Hemisphere> {
        match self.region.as_deref() {
            Some("GL") => Some(Hemisphere::North),
            Some("AQ") => Some(Hemisphere::South),
            _ => None,
        }
    }

    /// Two digit release year of LVIS names (`R1803` -> 18)
    pub fn release_year(&self) -> Option<u32> {
        self.release
            .as_deref()
            .and_then(|r| r.get(1..3))
            .and_then(|yy| yy.parse().ok())
    }
}

/// Tokens of an ATL11 granule name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atl11Name {
    pub processed: bool,
    pub product: String,
    pub track: String,
    pub granule: String,
    pub start_cycle: String,
    pub end_cycle: String,
    pub release: String,
    pub version: String,
    pub aux: String,
}

/// Classified input product
#[derive(Debug, Clone, PartialEq)]
pub enum InputProduct {
    Airborne(AirborneName),
    Atl11(Atl11Name),
}

/// Classify a file by its basename
pub fn classify(path: &Path) -> TideResult<InputProduct> {
    let name = basename(path)?;
    if let Ok(parsed) = parse_airborne(name) {
        return Ok(InputProduct::Airborne(parsed));
    }
    if let Some(parsed) = parse_atl11(name)? {
        return Ok(InputProduct::Atl11(parsed));
    }
    Err(TideError::Format(format!("Unrecognized input filename: {}", name)))
}

/// Parse an airborne basename
pub fn parse_airborne(name: &str) -> TideResult<AirborneName> {
    let icessn = compile(ICESSN_PATTERN)?;
    if let Some(caps) = icessn.captures(name) {
        return Ok(AirborneName {
            kind: AirborneKind::Atm,
            mission: caps[1].to_string(),
            date: parse_date_token(&caps[2])?,
            suffix: caps[5].to_string(),
            region: None,
            release: None,
        });
    }

    let qfit = compile(QFIT_PATTERN)?;
    if let Some(caps) = qfit.captures(name) {
        return Ok(AirborneName {
            kind: AirborneKind::Atm1b,
            mission: caps[1].to_uppercase(),
            date: parse_date_token(&caps[2])?,
            suffix: caps[5].to_string(),
            region: None,
            release: None,
        });
    }

    let lvis = compile(LVIS_PATTERN)?;
    if let Some(caps) = lvis.captures(name) {
        let mission = caps[1].to_string();
        let kind = if mission == "ILVGH2" { AirborneKind::Lvgh } else { AirborneKind::Lvis };
        let year = normalize_year(parse_number(&caps[3], name)?);
        let mmdd = &caps[4];
        if mmdd.len() != 4 {
            return Err(TideError::Format(format!("Invalid LVIS date token in {}", name)));
        }
        let month = parse_number(&mmdd[..2], name)?;
        let day = parse_number(&mmdd[2..], name)?;
        return Ok(AirborneName {
            kind,
            mission,
            date: make_date(year, month, day, name)?,
            suffix: "H5".to_string(),
            region: Some(caps[2].to_string()),
            release: Some(caps[5].to_string()),
        });
    }

    Err(TideError::Format(format!("Not an airborne granule name: {}", name)))
}

/// Parse an ATL11 basename; `None` when the name is not an ATL granule
pub fn parse_atl11(name: &str) -> TideResult<Option<Atl11Name>> {
    let rx = compile(ATL11_PATTERN)?;
    Ok(rx.captures(name).map(|caps| Atl11Name {
        processed: caps.get(1).is_some(),
        product: caps[2].to_string(),
        track: caps[3].to_string(),
        granule: caps[4].to_string(),
        start_cycle: caps[5].to_string(),
        end_cycle: caps[6].to_string(),
        release: caps[7].to_string(),
        version: caps[8].to_string(),
        aux: caps[9].to_string(),
    }))
}

/// Decode `YYMMDD` (years >= 90 are 19YY) or `YYYYMMDD`
pub fn parse_date_token(token: &str) -> TideResult<NaiveDate> {
    let (year, rest) = match token.len() {
        6 => (normalize_year(parse_number(&token[..2], token)?), &token[2..]),
        8 => (parse_number(&token[..4], token)?, &token[4..]),
        _ => {
            return Err(TideError::Format(format!(
                "Date token must have 6 or 8 digits: {}",
                token
            )))
        }
    };
    let month = parse_number(&rest[..2], token)?;
    let day = parse_number(&rest[2..], token)?;
    make_date(year, month, day, token)
}

fn normalize_year(year: u32) -> u32 {
    match year {
        90..=99 => 1900 + year,
        0..=89 => 2000 + year,
        _ => year,
    }
}

fn make_date(year: u32, month: u32, day: u32, context: &str) -> TideResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .ok_or_else(|| TideError::Format(format!("Invalid calendar date in {}", context)))
}

fn parse_number(token: &str, context: &str) -> TideResult<u32> {
    token
        .parse()
        .map_err(|_| TideError::Format(format!("Invalid numeric token '{}' in {}", token, context)))
}

fn compile(pattern: &str) -> TideResult<Regex> {
    Regex::new(pattern).map_err(|e| TideError::Format(format!("Regex error: {}", e)))
}

fn basename(path: &Path) -> TideResult<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| TideError::Format(format!("Invalid input path: {}", path.display())))
}

/// `{GR|AN}_NASA_{model}_TIDES_WGS84_{flag}{YYYY}{MM}{DD}{sssss}.H5`
///
/// `first_j2000` is the earliest J2000 second of the granule; its second of
/// day distinguishes granules of the same day.
pub fn airborne_output_name(
    hemisphere: Hemisphere,
    model: &str,
    name: &AirborneName,
    first_j2000: f64,
) -> String {
    let second_of_day = first_j2000.rem_euclid(86400.0);
    format!(
        "{}_NASA_{}_TIDES_WGS84_{}{:04}{:02}{:02}{:05.0}.H5",
        hemisphere.region_flag(),
        model,
        name.kind.flag(),
        name.date.year(),
        name.date.month(),
        name.date.day(),
        second_of_day
    )
}

/// Output name for an ATL11 input, falling back to `{stem}_{model}_TIDES{ext}`
pub fn atl11_output_name(input: &Path, model: &str) -> TideResult<String> {
    let name = basename(input)?;
    if let Some(g) = parse_atl11(name)? {
        return Ok(format!(
            "{}_{}_TIDES_{}{}_{}{}_{}_{}{}.h5",
            g.product, model, g.track, g.granule, g.start_cycle, g.end_cycle, g.release, g.version,
            g.aux
        ));
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    Ok(format!("{}_{}_TIDES{}", stem, model, ext))
}
