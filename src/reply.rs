//! Shape specific normalization of reply frames.
//!
//! The store answers "nothing here" with a null reply whatever the shape of the data, each helper
//! turns that null into the empty value of its own shape so callers never have to branch on it.

use itertools::Itertools;
use std::collections::HashMap;

use crate::frame::Frame;
use crate::{Error, Result};

fn unexpected(expected: &'static str, actual: Frame) -> Error {
    Error::UnexpectedReply { expected, actual }
}

/// Null reads as the empty string.
pub(crate) fn string(frame: Frame) -> Result<String> {
    match frame {
        Frame::Null => Ok(String::new()),
        Frame::Bulk(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Frame::Simple(s) => Ok(s),
        Frame::Integer(i) => Ok(i.to_string()),
        frame => Err(unexpected("string", frame)),
    }
}

/// Null reads as the empty sequence, null entries as empty strings.
pub(crate) fn strings(frame: Frame) -> Result<Vec<String>> {
    match frame {
        Frame::Null => Ok(vec![]),
        Frame::Array(frames) => frames.into_iter().map(string).collect(),
        frame => Err(unexpected("array", frame)),
    }
}

/// Null reads as the empty mapping. The store sends hashes as a flat field/value array.
pub(crate) fn map(frame: Frame) -> Result<HashMap<String, String>> {
    match frame {
        Frame::Null => Ok(HashMap::new()),
        Frame::Array(frames) if frames.len() % 2 == 0 => frames
            .into_iter()
            .tuples()
            .map(|(field, value)| -> Result<(String, String)> {
                Ok((string(field)?, string(value)?))
            })
            .collect(),
        frame => Err(unexpected("field/value array", frame)),
    }
}

/// Null reads as zero.
pub(crate) fn count(frame: Frame) -> Result<usize> {
    match frame {
        Frame::Null => Ok(0),
        Frame::Integer(n) if n >= 0 => Ok(n as usize),
        frame => Err(unexpected("non-negative integer", frame)),
    }
}

/// No empty value here, callers pick the sentinel that fits.
pub(crate) fn integer(frame: Frame) -> Result<i64> {
    match frame {
        Frame::Integer(n) => Ok(n),
        frame => Err(unexpected("integer", frame)),
    }
}

/// `:1` is true, `:0` and null are false.
pub(crate) fn flag(frame: Frame) -> Result<bool> {
    match frame {
        Frame::Integer(n) => Ok(n == 1),
        Frame::Null => Ok(false),
        frame => Err(unexpected("integer", frame)),
    }
}
