//! Type definitions and enums.

use serde::{Deserialize, Serialize};

use crate::handles::Handle;

/// Element depth of a native matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Depth {
    /// Unsigned 8-bit.
    #[default]
    U8,
    /// Signed 8-bit.
    S8,
    /// Unsigned 16-bit.
    U16,
    /// Signed 16-bit.
    S16,
    /// Signed 32-bit.
    S32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl From<Depth> for i32 {
    fn from(depth: Depth) -> i32 {
        match depth {
            Depth::U8 => 0,
            Depth::S8 => 1,
            Depth::U16 => 2,
            Depth::S16 => 3,
            Depth::S32 => 4,
            Depth::F32 => 5,
            Depth::F64 => 6,
        }
    }
}

impl Depth {
    /// Decode a depth code (0..=6).
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Depth::U8,
            1 => Depth::S8,
            2 => Depth::U16,
            3 => Depth::S16,
            4 => Depth::S32,
            5 => Depth::F32,
            6 => Depth::F64,
            _ => return None,
        })
    }

    /// Whether values of this depth are integral.
    pub fn is_integral(self) -> bool {
        !matches!(self, Depth::F32 | Depth::F64)
    }

    /// Convert a value to what this depth can actually store.
    ///
    /// Integral depths round to nearest and clamp to their range; NaN becomes 0.
    pub fn saturate(self, v: f64) -> f64 {
        let (lo, hi) = match self {
            Depth::U8 => (0.0, 255.0),
            Depth::S8 => (-128.0, 127.0),
            Depth::U16 => (0.0, 65535.0),
            Depth::S16 => (-32768.0, 32767.0),
            Depth::S32 => (i32::MIN as f64, i32::MAX as f64),
            Depth::F32 => return v as f32 as f64,
            Depth::F64 => return v,
        };
        if v.is_nan() {
            return 0.0;
        }
        v.round().clamp(lo, hi)
    }
}

/// Element type tag: depth plus channel count (1..=4).
///
/// Encodes to the usual `depth + ((channels - 1) << 3)` integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct CvType {
    depth: Depth,
    channels: u8,
}

impl CvType {
    /// Build a type from depth and channel count.
    pub fn new(depth: Depth, channels: u8) -> Option<Self> {
        if (1..=4).contains(&channels) {
            Some(Self { depth, channels })
        } else {
            None
        }
    }

    /// Decode an integer type code.
    pub fn from_code(code: i32) -> Option<Self> {
        if !(0..32).contains(&code) {
            return None;
        }
        let depth = Depth::from_code(code & 7)?;
        Self::new(depth, ((code >> 3) + 1) as u8)
    }

    /// Integer type code.
    pub fn code(self) -> i32 {
        i32::from(self.depth) + ((self.channels as i32 - 1) << 3)
    }

    /// Element depth.
    pub fn depth(self) -> Depth {
        self.depth
    }

    /// Channel count.
    pub fn channels(self) -> usize {
        self.channels as usize
    }

    /// Same depth, different channel count.
    pub fn with_channels(self, channels: usize) -> Option<Self> {
        Self::new(self.depth, u8::try_from(channels).ok()?)
    }
}

impl Default for CvType {
    fn default() -> Self {
        cv_type::CV_8UC1
    }
}

impl From<CvType> for i32 {
    fn from(t: CvType) -> i32 {
        t.code()
    }
}

impl TryFrom<i32> for CvType {
    type Error = String;

    fn try_from(code: i32) -> std::result::Result<Self, Self::Error> {
        CvType::from_code(code).ok_or_else(|| format!("unsupported element type code {}", code))
    }
}

/// Named element types.
pub mod cv_type {
    use super::{CvType, Depth};

    macro_rules! cv_types {
        ($($name:ident = ($depth:ident, $cn:expr);)*) => {
            $(
                #[allow(missing_docs)]
                pub const $name: CvType = CvType { depth: Depth::$depth, channels: $cn };
            )*
        };
    }

    cv_types! {
        CV_8UC1 = (U8, 1);
        CV_8UC3 = (U8, 3);
        CV_8UC4 = (U8, 4);
        CV_8SC1 = (S8, 1);
        CV_16UC1 = (U16, 1);
        CV_16SC1 = (S16, 1);
        CV_32SC1 = (S32, 1);
        CV_32FC1 = (F32, 1);
        CV_32FC3 = (F32, 3);
        CV_64FC1 = (F64, 1);
        CV_64FC3 = (F64, 3);
    }
}

/// Color conversion codes accepted by `cvtColor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorConversion {
    Bgr2Bgra,
    Bgra2Bgr,
    Bgr2Rgba,
    Rgba2Bgr,
    Bgr2Rgb,
    Bgra2Rgba,
    Bgr2Gray,
    Rgb2Gray,
    Gray2Bgr,
    Gray2Bgra,
    Bgra2Gray,
    Rgba2Gray,
}

impl ColorConversion {
    /// Decode a conversion code (0..=11).
    pub fn from_code(code: i32) -> Option<Self> {
        use ColorConversion::*;
        Some(match code {
            0 => Bgr2Bgra,
            1 => Bgra2Bgr,
            2 => Bgr2Rgba,
            3 => Rgba2Bgr,
            4 => Bgr2Rgb,
            5 => Bgra2Rgba,
            6 => Bgr2Gray,
            7 => Rgb2Gray,
            8 => Gray2Bgr,
            9 => Gray2Bgra,
            10 => Bgra2Gray,
            11 => Rgba2Gray,
            _ => return None,
        })
    }

    /// Input and output channel counts.
    pub fn channels(self) -> (usize, usize) {
        use ColorConversion::*;
        match self {
            Bgr2Bgra | Bgr2Rgba => (3, 4),
            Bgra2Bgr | Rgba2Bgr => (4, 3),
            Bgr2Rgb => (3, 3),
            Bgra2Rgba => (4, 4),
            Bgr2Gray | Rgb2Gray => (3, 1),
            Gray2Bgr => (1, 3),
            Gray2Bgra => (1, 4),
            Bgra2Gray | Rgba2Gray => (4, 1),
        }
    }
}

/// Threshold modes accepted by `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdType {
    #[default]
    Binary,
    BinaryInv,
    Trunc,
    ToZero,
    ToZeroInv,
}

impl ThresholdType {
    /// Decode a threshold mode (0..=4).
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ThresholdType::Binary,
            1 => ThresholdType::BinaryInv,
            2 => ThresholdType::Trunc,
            3 => ThresholdType::ToZero,
            4 => ThresholdType::ToZeroInv,
            _ => return None,
        })
    }
}

/// 2D point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// 2D size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Up to four per-channel values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scalar(pub [f64; 4]);

impl Scalar {
    /// The same value in every channel.
    pub fn all(v: f64) -> Self {
        Scalar([v; 4])
    }

    /// Value for channel `ch`.
    pub fn channel(&self, ch: usize) -> f64 {
        self.0.get(ch).copied().unwrap_or(0.0)
    }
}

/// Reserved codes occupying the handle channel when a dispatched call fails.
///
/// Never overlaps live handles, which all lie below 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Method resolution refused (1000).
    Security,
    /// Method could not be called with the given arguments (1001).
    Access,
    /// The method ran and raised (1002).
    InvocationTarget,
}

impl Sentinel {
    /// Wire-level integer code.
    pub fn code(self) -> i32 {
        match self {
            Sentinel::Security => 1000,
            Sentinel::Access => 1001,
            Sentinel::InvocationTarget => 1002,
        }
    }

    /// Decode a wire-level code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1000 => Some(Sentinel::Security),
            1001 => Some(Sentinel::Access),
            1002 => Some(Sentinel::InvocationTarget),
            _ => None,
        }
    }
}

/// What a processed request or batch left in the handle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminal {
    /// No object was involved.
    #[default]
    None,
    /// The object last written or read.
    Handle(Handle),
    /// The call failed.
    Sentinel(Sentinel),
}

impl Terminal {
    /// Integer encoding for the external callback channel: a handle, a
    /// sentinel code, or -1.
    pub fn to_wire(self) -> i32 {
        match self {
            Terminal::None => -1,
            Terminal::Handle(h) => h.as_i32(),
            Terminal::Sentinel(s) => s.code(),
        }
    }

    /// Decode the external integer encoding.
    pub fn from_wire(code: i32) -> Self {
        if let Some(s) = Sentinel::from_code(code) {
            return Terminal::Sentinel(s);
        }
        match Handle::new(code as i64) {
            Some(h) => Terminal::Handle(h),
            None => Terminal::None,
        }
    }

    /// The handle, if this terminal names one.
    pub fn handle(self) -> Option<Handle> {
        match self {
            Terminal::Handle(h) => Some(h),
            _ => None,
        }
    }
}

/// Summary of a newly created native object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatInfo {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub cols: usize,
    /// Element type code, absent for empty objects.
    #[serde(rename = "CvType", skip_serializing_if = "Option::is_none")]
    pub cv_type: Option<i32>,
    /// Handle addressing the object.
    pub mat_index: Handle,
}

/// Result of decoding an image file into the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedImage {
    pub rows: usize,
    pub cols: usize,
    pub mat_index: Handle,
}

/// Result of encoding an object to an image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub uri: String,
}
