//! Declared-length numeric table files, used for pixel remapping (unsigned
//! integers) and time-of-flight transform arrays (floating point).
//!
//! The format is plain text: the first line holds the decimal element count,
//! followed by exactly that many lines of one numeric token each, with no
//! embedded whitespace. Any violation fails the load; callers keep whatever
//! table they had before.

use crate::error::FileFormatError;
use ned_common::PixelId;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    str::FromStr,
};

/// Hard cap on the declared element count, matching the original loader.
const MAX_TABLE_LINES: usize = 1_000_000;

pub(crate) fn load_pixel_table(path: &Path) -> Result<Vec<PixelId>, FileFormatError> {
    load_table(path)
}

pub(crate) fn load_transform_table(path: &Path) -> Result<Vec<f64>, FileFormatError> {
    load_table(path)
}

fn load_table<T: FromStr>(path: &Path) -> Result<Vec<T>, FileFormatError> {
    let file = File::open(path).map_err(|source| FileFormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = BufReader::new(file).lines();

    let count_line = lines
        .next()
        .ok_or_else(|| FileFormatError::MissingCount {
            path: path.to_path_buf(),
        })?
        .map_err(|source| FileFormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let expected: usize = count_line
        .trim()
        .parse()
        .map_err(|_| FileFormatError::InvalidCount {
            path: path.to_path_buf(),
            line: count_line.clone(),
        })?;
    if expected > MAX_TABLE_LINES {
        return Err(FileFormatError::TooManyLines {
            path: path.to_path_buf(),
            count: expected,
            max: MAX_TABLE_LINES,
        });
    }

    let mut values = Vec::with_capacity(expected);
    let mut found = 0_usize;
    for (index, line) in lines.enumerate() {
        let line = line.map_err(|source| FileFormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let token = line.trim_end_matches('\r');
        found += 1;

        // Anything past the declared count only needs counting; the load
        // fails on the mismatch below.
        if found > expected {
            continue;
        }

        let line_number = index + 2;
        if token.is_empty() || token.contains(|c: char| c.is_whitespace() || c == '#') {
            return Err(FileFormatError::Whitespace {
                path: path.to_path_buf(),
                line_number,
            });
        }
        let value = token.parse().map_err(|_| FileFormatError::BadToken {
            path: path.to_path_buf(),
            line_number,
            token: token.to_owned(),
        })?;
        values.push(value);
    }

    if found != expected {
        return Err(FileFormatError::CountMismatch {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }

    Ok(values)
}
