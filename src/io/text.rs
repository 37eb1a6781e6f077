use crate::core::time::PackedTime;
use crate::types::{TideError, TideResult};
use ndarray::Array1;
use regex::Regex;
use std::path::Path;

/// Numeric literal pattern used to tokenize ASCII records
pub const NUMERIC_LITERAL: &str = r"[-+]?(?:(?:\d*\.\d+)|(?:\d+\.?))(?:[Ee][+-]?\d+)?";

/// Numeric tokens of each non-comment line of an ASCII file
pub struct NumericLines {
    lines: Vec<Vec<String>>,
}

impl NumericLines {
    pub fn parse(text: &str) -> TideResult<Self> {
        let rx = Regex::new(NUMERIC_LITERAL)
            .map_err(|e| TideError::Format(format!("Regex error: {}", e)))?;
        let lines = text
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(|line| rx.find_iter(line).map(|m| m.as_str().to_string()).collect())
            .collect();
        Ok(Self { lines })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> TideResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Record count (surviving line count)
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn tokens(&self, line: usize) -> &[String] {
        &self.lines[line]
    }

    /// Token at `index`; negative indices count from the end of the line
    fn token(&self, line: usize, index: isize) -> TideResult<&str> {
        let tokens = &self.lines[line];
        let position = if index < 0 { tokens.len() as isize + index } else { index };
        usize::try_from(position)
            .ok()
            .and_then(|p| tokens.get(p))
            .map(String::as_str)
            .ok_or_else(|| {
                TideError::Format(format!(
                    "Line {} has {} numeric fields, column {} requested",
                    line + 1,
                    tokens.len(),
                    index
                ))
            })
    }

    /// Float value of a column for every line
    pub fn column(&self, index: isize) -> TideResult<Array1<f64>> {
        (0..self.len())
            .map(|line| {
                let token = self.token(line, index)?;
                token.parse::<f64>().map_err(|_| {
                    TideError::Format(format!("Invalid number '{}' on line {}", token, line + 1))
                })
            })
            .collect::<TideResult<Vec<f64>>>()
            .map(Array1::from)
    }

    /// Raw token of a column for every line
    pub fn raw_column(&self, index: isize) -> TideResult<Vec<String>> {
        (0..self.len()).map(|line| self.token(line, index).map(str::to_string)).collect()
    }
}

/// Columns of a QFIT text record
#[derive(Debug, Clone)]
pub struct QfitTextRecords {
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub elevation: Array1<f64>,
    pub time: Vec<PackedTime>,
}

/// Read a QFIT `.TXT` file: tokens 1-3 are position and elevation, the last
/// token is the packed time of day
pub fn read_qfit_text<P: AsRef<Path>>(path: P) -> TideResult<QfitTextRecords> {
    let lines = NumericLines::from_file(path)?;
    parse_qfit_text(&lines)
}

pub fn parse_qfit_text(lines: &NumericLines) -> TideResult<QfitTextRecords> {
    let time = lines
        .raw_column(-1)?
        .iter()
        .map(|s| PackedTime::parse(s))
        .collect::<TideResult<Vec<_>>>()?;
    Ok(QfitTextRecords {
        latitude: lines.column(1)?,
        longitude: lines.column(2)?,
        elevation: lines.column(3)?,
        time,
    })
}

/// Columns of an ICESSN record
#[derive(Debug, Clone)]
pub struct IcessnRecords {
    /// Seconds of day (GPS or UTC depending on the file)
    pub seconds: Array1<f64>,
    pub latitude: Array1<f64>,
    pub longitude: Array1<f64>,
    pub elevation: Array1<f64>,
    /// Elevation error in meters
    pub error: Array1<f64>,
    pub track: Array1<f64>,
}

pub fn read_icessn<P: AsRef<Path>>(path: P) -> TideResult<IcessnRecords> {
    let lines = NumericLines::from_file(path)?;
    parse_icessn(&lines)
}

pub fn parse_icessn(lines: &NumericLines) -> TideResult<IcessnRecords> {
    Ok(IcessnRecords {
        seconds: lines.column(0)?,
        latitude: lines.column(1)?,
        longitude: lines.column(2)?,
        elevation: lines.column(3)?,
        // RMS is stored in centimeters
        error: lines.column(6)? / 100.0,
        track: lines.column(-1)?,
    })
}

/// Split seconds of day into hour, minute and second
pub fn split_seconds_of_day(seconds: &Array1<f64>) -> (Array1<f64>, Array1<f64>, Array1<f64>) {
    let hour = seconds.mapv(|s| (s / 3600.0).floor());
    let minute = seconds.mapv(|s| (s.rem_euclid(3600.0) / 60.0).floor());
    let second = seconds.mapv(|s| s.rem_euclid(60.0));
    (hour, minute, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const ICESSN: &str = "\
# ICESSN sample
 50400.0 69.123456 310.5 1520.25 0.01 -0.02 12.0 40 2 1.0 3
 50401.5 69.123500 310.6 1521.00 0.01 -0.02 8.0 40 2 1.0 3
";

    #[test]
    fn test_comment_lines_are_skipped() {
        let lines = NumericLines::parse(ICESSN).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines.tokens(0).len(), 11);
    }

    #[test]
    fn test_icessn_columns() {
        let records = parse_icessn(&NumericLines::parse(ICESSN).unwrap()).unwrap();
        assert_eq!(records.seconds, array![50400.0, 50401.5]);
        assert_abs_diff_eq!(records.error[0], 0.12, epsilon = 1e-12);
        assert_eq!(records.track, array![3.0, 3.0]);
    }

    #[test]
    fn test_numeric_tokens() {
        let lines = NumericLines::parse("a=-1.5e3, b=+.25 c=7.").unwrap();
        assert_eq!(lines.tokens(0), &["-1.5e3", "+.25", "7."]);
    }

    #[test]
    fn test_qfit_text_packed_time() {
        let lines = NumericLines::parse("0 -75.1 110.2 45.5 1 2 120000.500\n").unwrap();
        let records = parse_qfit_text(&lines).unwrap();
        assert_eq!(records.time[0], PackedTime { hour: 12.0, minute: 0.0, second: 0.5 });
        assert_eq!(records.latitude[0], -75.1);
    }

    #[test]
    fn test_short_lines_are_format_errors() {
        let lines = NumericLines::parse("1 2 3\n").unwrap();
        assert!(matches!(parse_icessn(&lines), Err(TideError::Format(_))));
    }

    #[test]
    fn test_split_seconds_of_day() {
        let (h, m, s) = split_seconds_of_day(&array![3725.5]);
        assert_eq!((h[0], m[0], s[0]), (1.0, 2.0, 5.5));
    }
}
