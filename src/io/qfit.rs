//! ATM Level-1b QFIT binary records
//!
//! Files are sequences of fixed-length records of 32-bit signed integers.
//! The first word of the file holds the record length in bytes (40, 48 or
//! 56 for 10, 12 or 14 words). Header records carry a negative first word.

use crate::types::{TideError, TideResult};
use ndarray::Array1;
use std::path::Path;

const WORD_BYTES: usize = 4;
const VALID_RECORD_BYTES: [usize; 3] = [40, 48, 56];

/// Byte order of a QFIT file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn read_i32(&self, bytes: &[u8]) -> i32 {
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::Big => i32::from_be_bytes(word),
            ByteOrder::Little => i32::from_le_bytes(word),
        }
    }
}

/// Decoded QFIT records in physical units
#[derive(Debug, Clone)]
pub struct QfitRecords {
    /// Degrees
    pub latitude: Array1<f64>,
    /// Degrees
    pub longitude: Array1<f64>,
    /// Meters
    pub elevation: Array1<f64>,
    /// Packed `hhmmss.sss` GPS time of day
    pub time_hhmmss: Array1<f64>,
    pub byte_order: ByteOrder,
    pub words_per_record: usize,
}

impl QfitRecords {
    pub fn len(&self) -> usize {
        self.latitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latitude.is_empty()
    }
}

/// Detect record length and byte order from the first word
pub fn detect_layout(bytes: &[u8]) -> TideResult<(usize, ByteOrder)> {
    if bytes.len() < WORD_BYTES {
        return Err(TideError::Format("QFIT file is shorter than one word".to_string()));
    }
    for order in [ByteOrder::Big, ByteOrder::Little] {
        let length = order.read_i32(bytes);
        if let Ok(length) = usize::try_from(length) {
            if VALID_RECORD_BYTES.contains(&length) {
                return Ok((length, order));
            }
        }
    }
    Err(TideError::Format(format!(
        "Invalid QFIT record length: {}",
        ByteOrder::Big.read_i32(bytes)
    )))
}

pub fn read_qfit_binary<P: AsRef<Path>>(path: P) -> TideResult<QfitRecords> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_qfit_binary(&bytes)
}

pub fn parse_qfit_binary(bytes: &[u8]) -> TideResult<QfitRecords> {
    let (record_bytes, byte_order) = detect_layout(bytes)?;
    let words = record_bytes / WORD_BYTES;
    let time_word = words - 1;

    if bytes.len() % record_bytes != 0 {
        log::warn!(
            "QFIT data has {} trailing bytes beyond the last full record",
            bytes.len() % record_bytes
        );
    }

    let word = |record: &[u8], index: usize| -> i32 {
        byte_order.read_i32(&record[index * WORD_BYTES..(index + 1) * WORD_BYTES])
    };

    let mut latitude = Vec::new();
    let mut longitude = Vec::new();
    let mut elevation = Vec::new();
    let mut time_hhmmss = Vec::new();
    for record in bytes.chunks_exact(record_bytes).skip(1) {
        if word(record, 0) < 0 {
            continue;
        }
        latitude.push(word(record, 1) as f64 / 1e6);
        longitude.push(word(record, 2) as f64 / 1e6);
        elevation.push(word(record, 3) as f64 / 1e3);
        time_hhmmss.push(word(record, time_word) as f64 / 1e3);
    }

    log::debug!(
        "QFIT layout: {} words per record, {:?} endian, {} data records",
        words,
        byte_order,
        latitude.len()
    );

    Ok(QfitRecords {
        latitude: Array1::from(latitude),
        longitude: Array1::from(longitude),
        elevation: Array1::from(elevation),
        time_hhmmss: Array1::from(time_hhmmss),
        byte_order,
        words_per_record: words,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Encode records of `words` integers, with a leading length record and
    /// one negative header record
    pub(crate) fn encode(records: &[Vec<i32>], words: usize, big_endian: bool) -> Vec<u8> {
        let to_bytes = |v: i32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        let mut out = Vec::new();
        let mut header = vec![0i32; words];
        header[0] = (words * WORD_BYTES) as i32;
        let mut negative = vec![0i32; words];
        negative[0] = -1;
        for record in [&header, &negative].into_iter().chain(records.iter()) {
            for &v in record.iter() {
                out.extend_from_slice(&to_bytes(v));
            }
        }
        out
    }

    fn record(words: usize, lat: i32, lon: i32, elev: i32, time: i32) -> Vec<i32> {
        let mut r = vec![0i32; words];
        r[0] = 1000;
        r[1] = lat;
        r[2] = lon;
        r[3] = elev;
        r[words - 1] = time;
        r
    }

    #[test]
    fn test_big_endian_twelve_word_records() {
        let bytes = encode(
            &[record(12, 69_500_000, 310_250_000, 1_234_567, 120_000_500)],
            12,
            true,
        );
        let q = parse_qfit_binary(&bytes).unwrap();
        assert_eq!(q.byte_order, ByteOrder::Big);
        assert_eq!(q.words_per_record, 12);
        assert_eq!(q.len(), 1);
        assert_abs_diff_eq!(q.latitude[0], 69.5, epsilon = 1e-12);
        assert_abs_diff_eq!(q.elevation[0], 1234.567, epsilon = 1e-9);
        assert_abs_diff_eq!(q.time_hhmmss[0], 120000.5, epsilon = 1e-9);
    }

    #[test]
    fn test_little_endian_fallback() {
        let bytes = encode(
            &[record(14, -75_000_000, 100_000_000, 500, 10_203_000), record(14, 1, 2, 3, 4)],
            14,
            false,
        );
        let q = parse_qfit_binary(&bytes).unwrap();
        assert_eq!(q.byte_order, ByteOrder::Little);
        assert_eq!(q.len(), 2);
        assert_abs_diff_eq!(q.latitude[0], -75.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.time_hhmmss[0], 10203.0, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_record_length() {
        let bytes = 44i32.to_be_bytes().repeat(11);
        assert!(matches!(parse_qfit_binary(&bytes), Err(TideError::Format(_))));
    }
}
