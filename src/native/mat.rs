//! Row-major dense matrix, the native object addressed by handles.

use super::error::{NativeError, NativeResult};
use crate::types::{CvType, Scalar};

/// Upper bound on the values one matrix may hold (512 MiB of `f64`).
pub const MAX_VALUES: usize = 1 << 26;

/// Number of values a `rows`x`cols` matrix of `typ` holds, rejecting sizes
/// that overflow or exceed [`MAX_VALUES`].
pub fn value_count(rows: usize, cols: usize, typ: CvType) -> NativeResult<usize> {
    rows.checked_mul(cols)
        .and_then(|n| n.checked_mul(typ.channels()))
        .filter(|n| *n <= MAX_VALUES)
        .ok_or_else(|| {
            NativeError::BadArgument(format!(
                "{}x{} matrix with {} channel(s) exceeds {} values",
                rows,
                cols,
                typ.channels(),
                MAX_VALUES
            ))
        })
}

/// Dense matrix with interleaved channels.
///
/// Values are held as `f64` and saturated to the element depth on every
/// write, so an 8-bit matrix never holds 300 or 1.5.
#[derive(Debug, Clone, PartialEq)]
pub struct Mat {
    rows: usize,
    cols: usize,
    typ: CvType,
    data: Vec<f64>,
}

impl Mat {
    /// 0x0 matrix.
    pub fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            typ: CvType::default(),
            data: Vec::new(),
        }
    }

    /// Zero-filled matrix with caller-checked dimensions.
    ///
    /// Sizes from outside the crate go through [`Mat::try_zeros`].
    pub fn zeros(rows: usize, cols: usize, typ: CvType) -> Self {
        Self {
            rows,
            cols,
            typ,
            data: vec![0.0; rows * cols * typ.channels()],
        }
    }

    /// Zero-filled matrix, or `BadArgument` when the size is out of range.
    pub fn try_zeros(rows: usize, cols: usize, typ: CvType) -> NativeResult<Self> {
        value_count(rows, cols, typ)?;
        Ok(Self::zeros(rows, cols, typ))
    }

    /// [`Mat::with_scalar`] with the size checked first.
    pub fn try_with_scalar(rows: usize, cols: usize, typ: CvType, s: Scalar) -> NativeResult<Self> {
        let mut mat = Self::try_zeros(rows, cols, typ)?;
        mat.set_to(s);
        Ok(mat)
    }

    /// Matrix with every channel of every element set to `v`.
    pub fn filled(rows: usize, cols: usize, typ: CvType, v: f64) -> Self {
        Self::with_scalar(rows, cols, typ, Scalar::all(v))
    }

    /// Matrix with each element set to `s`.
    pub fn with_scalar(rows: usize, cols: usize, typ: CvType, s: Scalar) -> Self {
        let mut mat = Self::zeros(rows, cols, typ);
        mat.set_to(s);
        mat
    }

    /// Build from a flat row-major buffer.
    pub fn from_data(rows: usize, cols: usize, typ: CvType, data: Vec<f64>) -> NativeResult<Self> {
        let expected = value_count(rows, cols, typ)?;
        if data.len() != expected {
            return Err(NativeError::BadArgument(format!(
                "expected {} values for a {}x{} matrix with {} channel(s), got {}",
                expected,
                rows,
                cols,
                typ.channels(),
                data.len()
            )));
        }
        let depth = typ.depth();
        Ok(Self {
            rows,
            cols,
            typ,
            data: data.into_iter().map(|v| depth.saturate(v)).collect(),
        })
    }

    /// Build from rows of interleaved channel values.
    pub fn from_rows(rows: &[Vec<f64>], typ: CvType) -> NativeResult<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if width % typ.channels() != 0 {
            return Err(NativeError::BadArgument(format!(
                "row length {} is not a multiple of {} channel(s)",
                width,
                typ.channels()
            )));
        }
        if rows.iter().any(|r| r.len() != width) {
            return Err(NativeError::BadArgument("rows have different lengths".into()));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::from_data(rows.len(), width / typ.channels(), typ, data)
    }

    /// Row count.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Column count.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Element type.
    pub fn cv_type(&self) -> CvType {
        self.typ
    }

    /// Channels per element.
    pub fn channels(&self) -> usize {
        self.typ.channels()
    }

    /// Number of elements (not values).
    pub fn total(&self) -> usize {
        self.rows * self.cols
    }

    /// True for a matrix with no values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw interleaved buffer.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, row: usize, col: usize, ch: usize) -> usize {
        (row * self.cols + col) * self.channels() + ch
    }

    /// Value at `(row, col)` in channel `ch`. Panics when out of bounds.
    pub fn at(&self, row: usize, col: usize, ch: usize) -> f64 {
        self.data[self.offset(row, col, ch)]
    }

    /// Write one value, saturated to the depth. Panics when out of bounds.
    pub fn set(&mut self, row: usize, col: usize, ch: usize, v: f64) {
        let i = self.offset(row, col, ch);
        self.data[i] = self.typ.depth().saturate(v);
    }

    /// Write `s` into element `(row, col)` if it lies inside the matrix.
    pub fn set_pixel(&mut self, row: i64, col: i64, s: &Scalar) {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return;
        }
        for ch in 0..self.channels() {
            self.set(row as usize, col as usize, ch, s.channel(ch));
        }
    }

    /// Channel values of one element.
    pub fn element(&self, row: usize, col: usize) -> &[f64] {
        let start = self.offset(row, col, 0);
        &self.data[start..start + self.channels()]
    }

    /// Interleaved values of one row.
    pub fn row(&self, row: usize) -> &[f64] {
        let width = self.cols * self.channels();
        &self.data[row * width..(row + 1) * width]
    }

    /// Set every element to `s`.
    pub fn set_to(&mut self, s: Scalar) {
        let cn = self.channels();
        let depth = self.typ.depth();
        for (i, v) in self.data.iter_mut().enumerate() {
            *v = depth.saturate(s.channel(i % cn));
        }
    }

    /// Write `values` sequentially starting at `(row, col)`, channel by channel.
    ///
    /// Stops at the end of the buffer; returns how many values were written.
    pub fn put(&mut self, row: usize, col: usize, values: &[f64]) -> NativeResult<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(NativeError::BadArgument(format!(
                "position ({}, {}) outside {}x{} matrix",
                row, col, self.rows, self.cols
            )));
        }
        let start = self.offset(row, col, 0);
        let depth = self.typ.depth();
        let n = values.len().min(self.data.len() - start);
        for (dst, src) in self.data[start..start + n].iter_mut().zip(values) {
            *dst = depth.saturate(*src);
        }
        Ok(n)
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let cn = self.channels();
        let mut out = Self::zeros(self.cols, self.rows, self.typ);
        for r in 0..self.rows {
            for c in 0..self.cols {
                for ch in 0..cn {
                    out.data[(c * self.rows + r) * cn + ch] = self.at(r, c, ch);
                }
            }
        }
        out
    }

    /// Copy with every value mapped through `f` and stored as `typ`.
    pub fn map_into(&self, typ: CvType, f: impl Fn(f64) -> f64) -> Self {
        let depth = typ.depth();
        Self {
            rows: self.rows,
            cols: self.cols,
            typ,
            data: self.data.iter().map(|v| depth.saturate(f(*v))).collect(),
        }
    }

    /// Check that `other` has the same size and type.
    pub fn ensure_same_shape(&self, other: &Mat) -> NativeResult<()> {
        if self.rows != other.rows || self.cols != other.cols || self.typ != other.typ {
            return Err(NativeError::SizeMismatch(format!(
                "{}x{} type {} vs {}x{} type {}",
                self.rows,
                self.cols,
                self.typ.code(),
                other.rows,
                other.cols,
                other.typ.code()
            )));
        }
        Ok(())
    }

    /// Combine two same-shape matrices element-wise.
    pub fn zip_with(&self, other: &Mat, f: impl Fn(f64, f64) -> f64) -> NativeResult<Self> {
        self.ensure_same_shape(other)?;
        let depth = self.typ.depth();
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            typ: self.typ,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| depth.saturate(f(*a, *b)))
                .collect(),
        })
    }
}

impl Default for Mat {
    fn default() -> Self {
        Self::empty()
    }
}
