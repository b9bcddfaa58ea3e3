//! Image file conversion collaborator.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};
use crate::native::Mat;
use crate::types::{cv_type, Depth};

/// Output encodings recognised by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    Png,
    Jpeg,
}

impl ImageEncoding {
    /// Encoding for a path's extension; the dot must not be the first character.
    pub fn from_path(path: &str) -> Option<Self> {
        let dot = path.rfind('.').filter(|i| *i > 0)?;
        match path[dot + 1..].to_ascii_lowercase().as_str() {
            "png" => Some(ImageEncoding::Png),
            "jpg" | "jpeg" => Some(ImageEncoding::Jpeg),
            _ => None,
        }
    }
}

/// Reads and writes image files as native objects.
pub trait ImageCodec: Send + Sync {
    /// Decode an existing, non-directory file.
    fn decode(&self, path: &Path) -> Result<Mat>;

    /// Encode `mat` to `path`, returning the written width and height.
    fn encode(&self, mat: &Mat, path: &Path, encoding: ImageEncoding) -> Result<(u32, u32)>;
}

/// Codec backed by the `image` crate. Decodes to 8-bit RGBA.
#[derive(Debug, Clone, Copy)]
pub struct ImageCrateCodec {
    jpeg_quality: u8,
}

impl ImageCrateCodec {
    /// Codec writing JPEGs at `jpeg_quality`, clamped to 1..=100.
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Encode `rgba` into `out` and flush it, so a failed write surfaces as
    /// an error instead of being dropped with the buffer.
    fn write_image<W: Write>(
        &self,
        rgba: RgbaImage,
        encoding: ImageEncoding,
        mut out: W,
    ) -> Result<()> {
        let (width, height) = rgba.dimensions();
        match encoding {
            ImageEncoding::Png => {
                PngEncoder::new(&mut out).write_image(rgba.as_raw(), width, height, ColorType::Rgba8)?
            }
            ImageEncoding::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
                JpegEncoder::new_with_quality(&mut out, self.jpeg_quality).encode(
                    rgb.as_raw(),
                    width,
                    height,
                    ColorType::Rgb8,
                )?
            }
        }
        out.flush()?;
        Ok(())
    }
}

impl Default for ImageCrateCodec {
    fn default() -> Self {
        Self::new(80)
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> Result<Mat> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Error::NotFound(path.display().to_string())
            }
            other => Error::GenericFailure(format!(
                "unable to decode {}: {}",
                path.display(),
                other
            )),
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw().into_iter().map(f64::from).collect();
        let mat = Mat::from_data(height as usize, width as usize, cv_type::CV_8UC4, data)?;
        debug!(path = %path.display(), width, height, "decoded image");
        Ok(mat)
    }

    fn encode(&self, mat: &Mat, path: &Path, encoding: ImageEncoding) -> Result<(u32, u32)> {
        let rgba = to_rgba(mat)?;
        let (width, height) = rgba.dimensions();
        self.write_image(rgba, encoding, BufWriter::new(File::create(path)?))?;
        debug!(path = %path.display(), width, height, ?encoding, "encoded image");
        Ok((width, height))
    }
}

/// Expand a 1-, 3- or 4-channel 8-bit matrix to RGBA.
fn to_rgba(mat: &Mat) -> Result<RgbaImage> {
    if mat.is_empty() {
        return Err(Error::invalid("cannot encode an empty matrix"));
    }
    if mat.cv_type().depth() != Depth::U8 {
        return Err(Error::invalid(format!(
            "only 8-bit unsigned matrices can be encoded, got type {}",
            mat.cv_type().code()
        )));
    }
    let cn = mat.channels();
    let mut buf = Vec::with_capacity(mat.total() * 4);
    for px in mat.data().chunks(cn) {
        let px: Vec<u8> = px.iter().map(|v| *v as u8).collect();
        match cn {
            1 => buf.extend_from_slice(&[px[0], px[0], px[0], 255]),
            3 => buf.extend_from_slice(&[px[0], px[1], px[2], 255]),
            4 => buf.extend_from_slice(&px),
            _ => {
                return Err(Error::invalid(format!(
                    "cannot encode a {}-channel matrix",
                    cn
                )))
            }
        }
    }
    RgbaImage::from_raw(mat.cols() as u32, mat.rows() as u32, buf)
        .ok_or_else(|| Error::GenericFailure("pixel buffer does not match dimensions".into()))
}

/// Check an input path the way every decode call does: empty, missing,
/// directory, in that order.
pub fn validate_input_path(path: &str) -> Result<&Path> {
    if path.is_empty() {
        return Err(Error::invalid("empty input path"));
    }
    let p = Path::new(path);
    if !p.exists() {
        return Err(Error::NotFound(format!(
            "no such file or directory, open '{}'",
            path
        )));
    }
    if p.is_dir() {
        return Err(Error::IsDirectory(format!(
            "illegal operation on a directory, open '{}'",
            path
        )));
    }
    Ok(p)
}
