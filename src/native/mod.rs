//! The native call layer.
//!
//! Everything the dispatcher can call lives behind [`NativeFn`]: a function
//! that receives already-coerced arguments and the resolved source and
//! destination objects, and returns a [`NativeOutput`]. Functions never touch
//! the handle table themselves.

pub mod error;
pub mod mat;
pub mod ops;

use std::sync::Arc;

pub use error::{NativeError, NativeResult};
pub use mat::Mat;

use crate::types::{Point, Rect, Scalar, Size};

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArg {
    Int(i32),
    Double(f64),
    Bool(bool),
    Str(String),
    Point(Point),
    Size(Size),
    Rect(Rect),
    Scalar(Scalar),
    Array(Vec<f64>),
    Rows(Vec<Vec<f64>>),
    /// Another object from the handle table.
    Mat(Arc<Mat>),
}

/// Coerced arguments in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    entries: Vec<(String, NativeArg)>,
}

macro_rules! arg_getter {
    ($name:ident, $or:ident, $variant:ident, $ty:ty, $what:expr) => {
        /// Required argument.
        pub fn $name(&self, name: &str) -> NativeResult<$ty> {
            match self.get(name) {
                Some(NativeArg::$variant(v)) => Ok(v.clone()),
                Some(other) => Err(mistyped(name, $what, other)),
                None => Err(missing(name)),
            }
        }

        /// Optional argument with a default.
        pub fn $or(&self, name: &str, default: $ty) -> NativeResult<$ty> {
            match self.get(name) {
                None => Ok(default),
                Some(_) => self.$name(name),
            }
        }
    };
}

impl Args {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument.
    pub fn push(&mut self, name: impl Into<String>, arg: NativeArg) {
        self.entries.push((name.into(), arg));
    }

    /// Argument called `name`, if present.
    pub fn get(&self, name: &str) -> Option<&NativeArg> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    arg_getter!(int, int_or, Int, i32, "integer");
    arg_getter!(double, double_or, Double, f64, "number");
    arg_getter!(boolean, boolean_or, Bool, bool, "boolean");
    arg_getter!(string, string_or, Str, String, "string");
    arg_getter!(point, point_or, Point, Point, "point");
    arg_getter!(size, size_or, Size, Size, "size");
    arg_getter!(rect, rect_or, Rect, Rect, "rect");
    arg_getter!(scalar, scalar_or, Scalar, Scalar, "scalar");
    arg_getter!(array, array_or, Array, Vec<f64>, "array");
    arg_getter!(rows, rows_or, Rows, Vec<Vec<f64>>, "matrix rows");

    /// Required object argument.
    pub fn mat(&self, name: &str) -> NativeResult<&Mat> {
        match self.get(name) {
            Some(NativeArg::Mat(m)) => Ok(m),
            Some(other) => Err(mistyped(name, "object handle", other)),
            None => Err(missing(name)),
        }
    }
}

fn missing(name: &str) -> NativeError {
    NativeError::BadArgument(format!("missing argument '{}'", name))
}

fn mistyped(name: &str, what: &str, got: &NativeArg) -> NativeError {
    NativeError::BadArgument(format!("argument '{}' should be {}, got {:?}", name, what, got))
}

/// Everything a native function may read.
#[derive(Debug, Clone, Copy)]
pub struct NativeCall<'a> {
    /// Registered name of the function being called.
    pub function: &'a str,
    /// Object behind the input handle.
    pub src: Option<&'a Mat>,
    /// Object currently behind the output handle.
    pub dst: Option<&'a Mat>,
    pub args: &'a Args,
}

impl<'a> NativeCall<'a> {
    /// The input object, which the descriptor shape guarantees for most calls.
    pub fn source(&self) -> NativeResult<&'a Mat> {
        self.src.ok_or_else(|| {
            NativeError::BadArgument(format!("{} needs an input object", self.function))
        })
    }
}

/// What a native function produced.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeOutput {
    /// Nothing to store or report.
    Unit,
    /// A new or modified object.
    Mat(Mat),
    /// A single number.
    Scalar(f64),
    /// A flat vector of numbers.
    Values(Vec<f64>),
    /// A list of numeric rows, e.g. detected rectangles.
    Rows(Vec<Vec<f64>>),
}

/// Native binding stored in a call descriptor.
pub type NativeFn = Arc<dyn Fn(&NativeCall<'_>) -> NativeResult<NativeOutput> + Send + Sync>;
