//! Conversion of native results into the transport representation.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::native::{Mat, NativeOutput};

/// Generic result shape sent back to the scripting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Scalar(f64),
    Flat(Vec<f64>),
    Nested(Vec<Vec<f64>>),
}

impl Payload {
    /// Empty flat payload.
    pub fn empty() -> Self {
        Payload::Flat(Vec::new())
    }
}

/// Region of a matrix to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selector {
    pub row: Option<usize>,
    pub col: Option<usize>,
}

impl Selector {
    /// The whole matrix.
    pub fn all() -> Self {
        Self::default()
    }

    /// One element.
    pub fn at(row: usize, col: usize) -> Self {
        Self {
            row: Some(row),
            col: Some(col),
        }
    }

    /// One row.
    pub fn row(row: usize) -> Self {
        Self {
            row: Some(row),
            col: None,
        }
    }

    /// One column.
    pub fn col(col: usize) -> Self {
        Self {
            row: None,
            col: Some(col),
        }
    }
}

/// Encode the part of `mat` named by `selector`.
///
/// Element and row/column selections yield a flat sequence of channel values;
/// the whole matrix yields one sequence per row.
pub fn encode_mat(mat: &Mat, selector: Selector) -> Result<Payload> {
    if let Some(r) = selector.row {
        check_bound("row", r, mat.rows())?;
    }
    if let Some(c) = selector.col {
        check_bound("column", c, mat.cols())?;
    }

    Ok(match (selector.row, selector.col) {
        (Some(r), Some(c)) => Payload::Flat(mat.element(r, c).to_vec()),
        (Some(r), None) => Payload::Flat(mat.row(r).to_vec()),
        (None, Some(c)) => Payload::Flat(
            (0..mat.rows())
                .flat_map(|r| mat.element(r, c).iter().copied())
                .collect(),
        ),
        (None, None) => Payload::Nested((0..mat.rows()).map(|r| mat.row(r).to_vec()).collect()),
    })
}

fn check_bound(what: &str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(Error::invalid(format!(
            "{} {} outside 0..{}",
            what, index, len
        )));
    }
    Ok(())
}

/// Encode a native function's non-object output. `None` for outputs that
/// carry no numbers of their own.
pub fn encode_output(output: &NativeOutput) -> Option<Payload> {
    match output {
        NativeOutput::Scalar(v) => Some(Payload::Scalar(*v)),
        NativeOutput::Values(vs) => Some(Payload::Flat(vs.clone())),
        NativeOutput::Rows(rows) => Some(Payload::Nested(rows.clone())),
        NativeOutput::Unit | NativeOutput::Mat(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cv_type;

    fn sample() -> Mat {
        Mat::from_rows(
            &[vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]],
            cv_type::CV_32SC1,
        )
        .unwrap()
    }

    #[test]
    fn test_full_matrix_is_nested() {
        let mat = Mat::filled(4, 4, cv_type::CV_8UC1, 7.0);
        let payload = encode_mat(&mat, Selector::all()).unwrap();
        assert_eq!(payload, Payload::Nested(vec![vec![7.0; 4]; 4]));
    }

    #[test]
    fn test_partial_selections_are_flat() {
        let mat = sample();
        assert_eq!(encode_mat(&mat, Selector::at(1, 2)).unwrap(), Payload::Flat(vec![7.0]));
        assert_eq!(
            encode_mat(&mat, Selector::row(0)).unwrap(),
            Payload::Flat(vec![1.0, 2.0, 3.0, 4.0])
        );
        assert_eq!(encode_mat(&mat, Selector::col(3)).unwrap(), Payload::Flat(vec![4.0, 8.0]));
    }

    #[test]
    fn test_multichannel_element() {
        let mat = Mat::from_rows(&[vec![1.0, 2.0, 3.0]], cv_type::CV_8UC3).unwrap();
        assert_eq!(
            encode_mat(&mat, Selector::at(0, 0)).unwrap(),
            Payload::Flat(vec![1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let mat = sample();
        assert!(encode_mat(&mat, Selector::at(2, 0)).unwrap_err().is_invalid_parameter());
        assert!(encode_mat(&mat, Selector::col(4)).unwrap_err().is_invalid_parameter());
        assert!(encode_mat(&Mat::empty(), Selector::row(0)).is_err());
    }

    #[test]
    fn test_empty_matrix_encodes_empty() {
        assert_eq!(
            encode_mat(&Mat::empty(), Selector::all()).unwrap(),
            Payload::Nested(Vec::new())
        );
    }

    #[test]
    fn test_payload_json_shapes() {
        assert_eq!(serde_json::to_string(&Payload::Scalar(2.0)).unwrap(), "2.0");
        assert_eq!(
            serde_json::to_string(&Payload::Nested(vec![vec![1.0]])).unwrap(),
            "[[1.0]]"
        );
        let back: Payload = serde_json::from_str("[[1, 2], [3, 4]]").unwrap();
        assert_eq!(back, Payload::Nested(vec![vec![1.0, 2.0], vec![3.0, 4.0]]));
    }
}
