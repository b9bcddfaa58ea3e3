//! Built-in native operations.

use super::{Mat, NativeCall, NativeError, NativeOutput, NativeResult};
use crate::registry::{CallDescriptor, MatIo, ParamKind, RegistryBuilder};
use crate::types::{cv_type, ColorConversion, CvType, Depth, Point, Scalar, ThresholdType};

/// Register every built-in operation.
pub fn register_builtins(builder: &mut RegistryBuilder) {
    use ParamKind as K;

    builder
        .register(
            CallDescriptor::new("zeros", MatIo::Producer, zeros)
                .param("rows", K::Int)
                .param("cols", K::Int)
                .optional("type", K::Int),
        )
        .register(
            CallDescriptor::new("ones", MatIo::Producer, ones)
                .param("rows", K::Int)
                .param("cols", K::Int)
                .optional("type", K::Int),
        )
        .register(
            CallDescriptor::new("fromArray", MatIo::Producer, from_array)
                .param("data", K::Rows)
                .optional("type", K::Int),
        )
        .register(CallDescriptor::new("setTo", MatIo::InPlace, set_to).param("value", K::Scalar))
        .register(
            CallDescriptor::new("line", MatIo::InPlace, line)
                .param("pt1", K::Point)
                .param("pt2", K::Point)
                .param("color", K::Scalar)
                .optional("thickness", K::Int),
        )
        .register(
            CallDescriptor::new("rectangle", MatIo::InPlace, rectangle)
                .param("pt1", K::Point)
                .param("pt2", K::Point)
                .param("color", K::Scalar)
                .optional("thickness", K::Int),
        )
        .register(
            CallDescriptor::new("circle", MatIo::InPlace, circle)
                .param("center", K::Point)
                .param("radius", K::Int)
                .param("color", K::Scalar)
                .optional("thickness", K::Int),
        )
        .register(CallDescriptor::new("cvtColor", MatIo::SrcDst, cvt_color).param("code", K::Int))
        .register(CallDescriptor::new("transpose", MatIo::SrcDst, transpose))
        .register(CallDescriptor::new("flip", MatIo::SrcDst, flip).param("flipCode", K::Int))
        .register(
            CallDescriptor::new("threshold", MatIo::SrcDst, threshold)
                .param("thresh", K::Double)
                .param("maxval", K::Double)
                .optional("type", K::Int),
        )
        .register(CallDescriptor::new("add", MatIo::SrcDst, add).param("other", K::Mat))
        .register(CallDescriptor::new("subtract", MatIo::SrcDst, subtract).param("other", K::Mat))
        .register(CallDescriptor::new("absdiff", MatIo::SrcDst, absdiff).param("other", K::Mat))
        .register(
            CallDescriptor::new("convertScaleAbs", MatIo::SrcDst, convert_scale_abs)
                .optional("alpha", K::Double)
                .optional("beta", K::Double),
        )
        .register(CallDescriptor::new("countNonZero", MatIo::Query, count_non_zero))
        .register(CallDescriptor::new("sumElems", MatIo::Query, sum_elems))
        .register(CallDescriptor::new("mean", MatIo::Query, mean));
}

fn element_type(call: &NativeCall<'_>, default: CvType) -> NativeResult<CvType> {
    let code = call.args.int_or("type", default.code())?;
    CvType::from_code(code)
        .ok_or_else(|| NativeError::BadArgument(format!("unsupported element type {}", code)))
}

fn dimension(call: &NativeCall<'_>, name: &str) -> NativeResult<usize> {
    let v = call.args.int(name)?;
    usize::try_from(v).map_err(|_| NativeError::BadArgument(format!("{} must be >= 0, got {}", name, v)))
}

fn zeros(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let typ = element_type(call, cv_type::CV_8UC1)?;
    Mat::try_zeros(dimension(call, "rows")?, dimension(call, "cols")?, typ).map(NativeOutput::Mat)
}

fn ones(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let typ = element_type(call, cv_type::CV_8UC1)?;
    Mat::try_with_scalar(
        dimension(call, "rows")?,
        dimension(call, "cols")?,
        typ,
        Scalar::all(1.0),
    )
    .map(NativeOutput::Mat)
}

fn from_array(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let typ = element_type(call, cv_type::CV_64FC1)?;
    let rows = call.args.rows("data")?;
    Mat::from_rows(&rows, typ).map(NativeOutput::Mat)
}

fn set_to(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let mut mat = call.source()?.clone();
    mat.set_to(call.args.scalar("value")?);
    Ok(NativeOutput::Mat(mat))
}

/// Largest stroke accepted by the drawing functions.
const MAX_THICKNESS: i32 = 32767;

fn stroke(call: &NativeCall<'_>, filled_ok: bool) -> NativeResult<i32> {
    let thickness = call.args.int_or("thickness", 1)?;
    if thickness > MAX_THICKNESS || (thickness <= 0 && !filled_ok) {
        return Err(NativeError::BadArgument(format!(
            "{} thickness {} is out of range",
            call.function, thickness
        )));
    }
    Ok(thickness)
}

fn finite_point(call: &NativeCall<'_>, name: &str) -> NativeResult<Point> {
    let p = call.args.point(name)?;
    if !(p.x.is_finite() && p.y.is_finite()) {
        return Err(NativeError::BadArgument(format!(
            "{} must have finite coordinates, got ({}, {})",
            name, p.x, p.y
        )));
    }
    Ok(p)
}

fn line(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let mut mat = call.source()?.clone();
    let thickness = stroke(call, false)?;
    draw_line(
        &mut mat,
        finite_point(call, "pt1")?,
        finite_point(call, "pt2")?,
        &call.args.scalar("color")?,
        thickness,
    );
    Ok(NativeOutput::Mat(mat))
}

fn rectangle(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let mut mat = call.source()?.clone();
    let p1 = finite_point(call, "pt1")?;
    let p2 = finite_point(call, "pt2")?;
    let color = call.args.scalar("color")?;
    let thickness = stroke(call, true)?;

    if thickness < 0 {
        let xs = span(p1.x.min(p2.x), p1.x.max(p2.x), mat.cols());
        let ys = span(p1.y.min(p2.y), p1.y.max(p2.y), mat.rows());
        if let (Some((x0, x1)), Some((y0, y1))) = (xs, ys) {
            for y in y0..=y1 {
                for x in x0..=x1 {
                    mat.set_pixel(y, x, &color);
                }
            }
        }
    } else {
        let corners = [
            p1,
            Point { x: p2.x, y: p1.y },
            p2,
            Point { x: p1.x, y: p2.y },
        ];
        for i in 0..4 {
            draw_line(&mut mat, corners[i], corners[(i + 1) % 4], &color, thickness);
        }
    }
    Ok(NativeOutput::Mat(mat))
}

fn circle(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let mut mat = call.source()?.clone();
    let center = finite_point(call, "center")?;
    let radius = call.args.int("radius")?;
    if radius < 0 {
        return Err(NativeError::BadArgument(format!("negative radius {}", radius)));
    }
    let color = call.args.scalar("color")?;
    let thickness = stroke(call, true)?;

    let (cx, cy, r) = (center.x.round(), center.y.round(), f64::from(radius));
    let half = (f64::from(thickness.max(1)) / 2.0).max(0.5);
    let reach = (r + half).ceil();
    let (Some((x0, x1)), Some((y0, y1))) = (
        span(cx - reach, cx + reach, mat.cols()),
        span(cy - reach, cy + reach, mat.rows()),
    ) else {
        return Ok(NativeOutput::Mat(mat));
    };
    for y in y0..=y1 {
        for x in x0..=x1 {
            let d = (x as f64 - cx).hypot(y as f64 - cy);
            let hit = if thickness < 0 { d <= r } else { (d - r).abs() <= half };
            if hit {
                mat.set_pixel(y, x, &color);
            }
        }
    }
    Ok(NativeOutput::Mat(mat))
}

/// Pixel range `[lo, hi]` rounded and clipped to `0..len`, or `None` when it
/// misses the matrix.
fn span(lo: f64, hi: f64, len: usize) -> Option<(i64, i64)> {
    let last = len as f64 - 1.0;
    let (lo, hi) = (lo.round().max(0.0), hi.round().min(last));
    (lo <= hi).then(|| (lo as i64, hi as i64))
}

/// Clip the segment `p1`-`p2` to the box `xs`x`ys` (Liang-Barsky).
///
/// A clipped endpoint takes the boundary coordinate exactly, so far-away
/// endpoints do not lose the visible part to rounding.
fn clip_segment(p1: Point, p2: Point, xs: (f64, f64), ys: (f64, f64)) -> Option<(Point, Point)> {
    let (dx, dy) = (p2.x - p1.x, p2.y - p1.y);
    if !(dx.is_finite() && dy.is_finite()) {
        return None;
    }
    let on_x = |x: f64, t: f64| Point {
        x,
        y: (p1.y + t * dy).clamp(ys.0, ys.1),
    };
    let on_y = |y: f64, t: f64| Point {
        x: (p1.x + t * dx).clamp(xs.0, xs.1),
        y,
    };

    let (mut t0, mut start) = (0.0f64, p1);
    let (mut t1, mut end) = (1.0f64, p2);
    let edges = [
        (-dx, p1.x - xs.0, true, xs.0),
        (dx, xs.1 - p1.x, true, xs.1),
        (-dy, p1.y - ys.0, false, ys.0),
        (dy, ys.1 - p1.y, false, ys.1),
    ];
    for (p, q, vertical, bound) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        let hit = || if vertical { on_x(bound, t) } else { on_y(bound, t) };
        if p < 0.0 && t > t0 {
            t0 = t;
            start = hit();
        } else if p > 0.0 && t < t1 {
            t1 = t;
            end = hit();
        }
    }
    (t0 <= t1).then_some((start, end))
}

/// Bresenham line; thicker lines stamp a disc at every step.
///
/// The segment is clipped to the matrix plus the stroke radius first, so the
/// work is bounded by the matrix size whatever the endpoints are.
fn draw_line(mat: &mut Mat, p1: Point, p2: Point, color: &Scalar, thickness: i32) {
    let radius = i64::from((thickness - 1) / 2);
    let margin = radius as f64 + 1.0;
    let Some((p1, p2)) = clip_segment(
        p1,
        p2,
        (-margin, mat.cols() as f64 + margin),
        (-margin, mat.rows() as f64 + margin),
    ) else {
        return;
    };

    let (mut x, mut y) = (p1.x.round() as i64, p1.y.round() as i64);
    let (x1, y1) = (p2.x.round() as i64, p2.y.round() as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (rows, cols) = (mat.rows() as i64, mat.cols() as i64);

    loop {
        for oy in (-radius).max(-y)..=radius.min(rows - 1 - y) {
            for ox in (-radius).max(-x)..=radius.min(cols - 1 - x) {
                if ox * ox + oy * oy <= radius * radius {
                    mat.set_pixel(y + oy, x + ox, color);
                }
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn cvt_color(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    let code = call.args.int("code")?;
    let conversion = ColorConversion::from_code(code)
        .ok_or_else(|| NativeError::Unsupported(format!("color conversion code {}", code)))?;
    let (cn_in, cn_out) = conversion.channels();
    if src.channels() != cn_in {
        return Err(NativeError::Unsupported(format!(
            "conversion {:?} expects {} channel(s), input has {}",
            conversion,
            cn_in,
            src.channels()
        )));
    }
    let typ = src
        .cv_type()
        .with_channels(cn_out)
        .ok_or_else(|| NativeError::Failed("invalid output channel count".into()))?;
    let alpha = if src.cv_type().depth().is_integral() { 255.0 } else { 1.0 };

    let mut out = Mat::zeros(src.rows(), src.cols(), typ);
    for r in 0..src.rows() {
        for c in 0..src.cols() {
            let px = src.element(r, c);
            let converted = convert_pixel(conversion, px, alpha);
            for (ch, v) in converted.iter().take(cn_out).enumerate() {
                out.set(r, c, ch, *v);
            }
        }
    }
    Ok(NativeOutput::Mat(out))
}

fn convert_pixel(conversion: ColorConversion, px: &[f64], alpha: f64) -> [f64; 4] {
    use ColorConversion::*;
    let gray = |b: f64, g: f64, r: f64| 0.114 * b + 0.587 * g + 0.299 * r;
    match conversion {
        Bgr2Bgra => [px[0], px[1], px[2], alpha],
        Bgra2Bgr => [px[0], px[1], px[2], 0.0],
        Bgr2Rgba => [px[2], px[1], px[0], alpha],
        Rgba2Bgr => [px[2], px[1], px[0], 0.0],
        Bgr2Rgb => [px[2], px[1], px[0], 0.0],
        Bgra2Rgba => [px[2], px[1], px[0], px[3]],
        Bgr2Gray | Bgra2Gray => [gray(px[0], px[1], px[2]), 0.0, 0.0, 0.0],
        Rgb2Gray | Rgba2Gray => [gray(px[2], px[1], px[0]), 0.0, 0.0, 0.0],
        Gray2Bgr => [px[0], px[0], px[0], 0.0],
        Gray2Bgra => [px[0], px[0], px[0], alpha],
    }
}

fn transpose(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    Ok(NativeOutput::Mat(call.source()?.transpose()))
}

fn flip(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    let code = call.args.int("flipCode")?;
    let (flip_rows, flip_cols) = (code <= 0, code != 0);
    let mut out = Mat::zeros(src.rows(), src.cols(), src.cv_type());
    for r in 0..src.rows() {
        let sr = if flip_rows { src.rows() - 1 - r } else { r };
        for c in 0..src.cols() {
            let sc = if flip_cols { src.cols() - 1 - c } else { c };
            for ch in 0..src.channels() {
                out.set(r, c, ch, src.at(sr, sc, ch));
            }
        }
    }
    Ok(NativeOutput::Mat(out))
}

fn threshold(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    let thresh = call.args.double("thresh")?;
    let maxval = call.args.double("maxval")?;
    let code = call.args.int_or("type", 0)?;
    let mode = ThresholdType::from_code(code)
        .ok_or_else(|| NativeError::Unsupported(format!("threshold type {}", code)))?;

    Ok(NativeOutput::Mat(src.map_into(src.cv_type(), |v| {
        let above = v > thresh;
        match mode {
            ThresholdType::Binary => if above { maxval } else { 0.0 },
            ThresholdType::BinaryInv => if above { 0.0 } else { maxval },
            ThresholdType::Trunc => if above { thresh } else { v },
            ThresholdType::ToZero => if above { v } else { 0.0 },
            ThresholdType::ToZeroInv => if above { 0.0 } else { v },
        }
    })))
}

fn add(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let other = call.args.mat("other")?;
    call.source()?.zip_with(other, |a, b| a + b).map(NativeOutput::Mat)
}

fn subtract(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let other = call.args.mat("other")?;
    call.source()?.zip_with(other, |a, b| a - b).map(NativeOutput::Mat)
}

fn absdiff(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let other = call.args.mat("other")?;
    call.source()?
        .zip_with(other, |a, b| (a - b).abs())
        .map(NativeOutput::Mat)
}

fn convert_scale_abs(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    let alpha = call.args.double_or("alpha", 1.0)?;
    let beta = call.args.double_or("beta", 0.0)?;
    let typ = CvType::new(Depth::U8, src.channels() as u8)
        .ok_or_else(|| NativeError::Failed("invalid channel count".into()))?;
    Ok(NativeOutput::Mat(src.map_into(typ, |v| (v * alpha + beta).abs())))
}

fn count_non_zero(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    if src.channels() != 1 {
        return Err(NativeError::Unsupported(
            "countNonZero needs a single-channel input".into(),
        ));
    }
    let n = src.data().iter().filter(|v| **v != 0.0).count();
    Ok(NativeOutput::Scalar(n as f64))
}

fn channel_sums(src: &Mat) -> Vec<f64> {
    let cn = src.channels();
    let mut sums = vec![0.0; cn];
    for (i, v) in src.data().iter().enumerate() {
        sums[i % cn] += v;
    }
    sums
}

fn sum_elems(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    Ok(NativeOutput::Values(channel_sums(call.source()?)))
}

fn mean(call: &NativeCall<'_>) -> NativeResult<NativeOutput> {
    let src = call.source()?;
    let total = src.total();
    if total == 0 {
        return Ok(NativeOutput::Values(vec![0.0; src.channels()]));
    }
    Ok(NativeOutput::Values(
        channel_sums(src).into_iter().map(|s| s / total as f64).collect(),
    ))
}
