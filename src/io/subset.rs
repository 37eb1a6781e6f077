use crate::types::{take_indices, take_rows, TideError, TideResult};
use ndarray::{Array1, Array2};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Record selection parsed from a bracketed suffix such as `[0-2,5]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsetter {
    indices: Vec<usize>,
}

impl Subsetter {
    /// Parse a bracketed index list. Ranges are inclusive and order is kept.
    pub fn parse(spec: &str) -> TideResult<Self> {
        let inner = spec
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| TideError::Config(format!("Subset must be bracketed: {}", spec)))?;

        let mut indices = Vec::new();
        for token in inner.split(',').map(str::trim) {
            if token.is_empty() {
                return Err(TideError::Config(format!("Empty subset entry in {}", spec)));
            }
            match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_index(start, spec)?;
                    let end = parse_index(end, spec)?;
                    if end < start {
                        return Err(TideError::Config(format!(
                            "Descending subset range {}-{} in {}",
                            start, end, spec
                        )));
                    }
                    indices.extend(start..=end);
                }
                None => indices.push(parse_index(token, spec)?),
            }
        }

        Ok(Self { indices })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn apply<T: Clone>(&self, values: &Array1<T>) -> TideResult<Array1<T>> {
        take_indices(values, &self.indices)
    }

    pub fn apply_rows<T: Clone>(&self, values: &Array2<T>) -> TideResult<Array2<T>> {
        take_rows(values, &self.indices)
    }
}

fn parse_index(token: &str, spec: &str) -> TideResult<usize> {
    token
        .trim()
        .parse::<usize>()
        .map_err(|_| TideError::Config(format!("Invalid subset index '{}' in {}", token, spec)))
}

/// Apply an optional subsetter to a per-record vector
pub fn subset<T: Clone>(values: Array1<T>, subsetter: Option<&Subsetter>) -> TideResult<Array1<T>> {
    match subsetter {
        Some(s) => s.apply(&values),
        None => Ok(values),
    }
}

/// Input path with an optional record subset, e.g. `ILATM1B_20110421_132407.qi[10-20]`
#[derive(Debug, Clone, PartialEq)]
pub struct InputArgument {
    pub path: PathBuf,
    pub subset: Option<Subsetter>,
}

impl InputArgument {
    pub fn parse(arg: &str) -> TideResult<Self> {
        let re = Regex::new(r"^(.*?)(\[[^\[\]]*\])?$")
            .map_err(|e| TideError::Config(e.to_string()))?;
        let caps = re
            .captures(arg)
            .ok_or_else(|| TideError::Config(format!("Invalid input argument: {}", arg)))?;
        let path = caps.get(1).map_or("", |m| m.as_str());
        if path.is_empty() {
            return Err(TideError::Config(format!("Missing input path in {}", arg)));
        }
        let subset = caps.get(2).map(|m| Subsetter::parse(m.as_str())).transpose()?;
        Ok(Self { path: PathBuf::from(path), subset })
    }

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), subset: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_parse_ranges_and_singles() {
        let s = Subsetter::parse("[0-2,5]").unwrap();
        assert_eq!(s.indices(), &[0, 1, 2, 5]);

        let values = array![10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0];
        assert_eq!(s.apply(&values).unwrap(), array![10.0, 11.0, 12.0, 15.0]);
    }

    #[test]
    fn test_order_is_preserved() {
        let s = Subsetter::parse("[7, 3-4]").unwrap();
        assert_eq!(s.indices(), &[7, 3, 4]);
    }

    #[test]
    fn test_malformed_subsets() {
        for bad in ["0-2", "[a]", "[3-1]", "[1,,2]", "[]"] {
            assert!(
                matches!(Subsetter::parse(bad), Err(TideError::Config(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_out_of_range_is_format_error() {
        let s = Subsetter::parse("[0,9]").unwrap();
        assert!(matches!(s.apply(&array![1, 2, 3]), Err(TideError::Format(_))));
    }

    #[test]
    fn test_input_argument() {
        let arg = InputArgument::parse("/data/ILATM1B_20110421_132407.qi[10-12]").unwrap();
        assert_eq!(arg.path, PathBuf::from("/data/ILATM1B_20110421_132407.qi"));
        assert_eq!(arg.subset.unwrap().indices(), &[10, 11, 12]);

        let plain = InputArgument::parse("ATL11_001811_0304_002_01.h5").unwrap();
        assert!(plain.subset.is_none());
    }
}
