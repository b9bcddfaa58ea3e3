//! Object detection collaborators.
//!
//! A [`ClassifierLoader`] turns a classifier file into a [`Detector`]. The
//! [`ClassifierResolver`] decides which file to load: the one the caller
//! named, or a configured fallback that is copied into the cache directory,
//! loaded, and removed again.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::native::{Mat, NativeOutput};
use crate::registry::{CallDescriptor, MatIo};
use crate::types::Rect;

/// Finds objects in an image.
pub trait Detector: Send + Sync {
    /// Bounding rectangles of every detected object, in pixels.
    fn detect_multi_scale(&self, image: &Mat) -> Vec<Rect>;
}

/// Loads a detector from a classifier file.
pub trait ClassifierLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn Detector>>;
}

impl<F> ClassifierLoader for F
where
    F: Fn(&Path) -> Result<Arc<dyn Detector>> + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<Arc<dyn Detector>> {
        self(path)
    }
}

/// Detector that reports 4-connected regions at or above a brightness
/// threshold.
///
/// Brightness is the mean of the first three channels (or the only channel).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobDetector {
    pub threshold: f64,
    pub min_width: usize,
    pub min_height: usize,
}

impl Default for BlobDetector {
    fn default() -> Self {
        Self {
            threshold: 128.0,
            min_width: 1,
            min_height: 1,
        }
    }
}

impl BlobDetector {
    fn brightness(image: &Mat, row: usize, col: usize) -> f64 {
        let px = image.element(row, col);
        let n = px.len().min(3);
        px[..n].iter().sum::<f64>() / n as f64
    }
}

impl Detector for BlobDetector {
    fn detect_multi_scale(&self, image: &Mat) -> Vec<Rect> {
        let (rows, cols) = (image.rows(), image.cols());
        let mut seen = vec![false; rows * cols];
        let mut found = Vec::new();
        let mut stack = Vec::new();

        for start in 0..rows * cols {
            if seen[start] || Self::brightness(image, start / cols, start % cols) < self.threshold {
                continue;
            }
            seen[start] = true;
            stack.push(start);
            let (mut r0, mut c0, mut r1, mut c1) = (rows, cols, 0, 0);
            while let Some(i) = stack.pop() {
                let (r, c) = (i / cols, i % cols);
                r0 = r0.min(r);
                c0 = c0.min(c);
                r1 = r1.max(r);
                c1 = c1.max(c);
                let mut visit = |nr: usize, nc: usize| {
                    let j = nr * cols + nc;
                    if !seen[j] && Self::brightness(image, nr, nc) >= self.threshold {
                        seen[j] = true;
                        stack.push(j);
                    }
                };
                if r > 0 {
                    visit(r - 1, c);
                }
                if r + 1 < rows {
                    visit(r + 1, c);
                }
                if c > 0 {
                    visit(r, c - 1);
                }
                if c + 1 < cols {
                    visit(r, c + 1);
                }
            }
            let (w, h) = (c1 - c0 + 1, r1 - r0 + 1);
            if w >= self.min_width && h >= self.min_height {
                found.push(Rect {
                    x: c0 as f64,
                    y: r0 as f64,
                    width: w as f64,
                    height: h as f64,
                });
            }
        }
        found
    }
}

/// Loads [`BlobDetector`]s from TOML classifier files.
///
/// ```toml
/// threshold = 200
/// min_width = 4
/// min_height = 4
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct BlobClassifierLoader;

impl ClassifierLoader for BlobClassifierLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn Detector>> {
        let text = fs::read_to_string(path)?;
        let detector: BlobDetector = toml::from_str(&text)
            .map_err(|e| Error::GenericFailure(format!("classifier {}: {}", path.display(), e)))?;
        Ok(Arc::new(detector))
    }
}

/// Picks and loads classifier files.
#[derive(Clone)]
pub struct ClassifierResolver {
    loader: Arc<dyn ClassifierLoader>,
    cache_dir: PathBuf,
    fallback: Option<PathBuf>,
}

impl ClassifierResolver {
    /// Resolver loading through `loader`, copying `fallback` into `cache_dir` when a
    /// named classifier is missing.
    pub fn new(
        loader: Arc<dyn ClassifierLoader>,
        cache_dir: impl Into<PathBuf>,
        fallback: Option<PathBuf>,
    ) -> Self {
        Self {
            loader,
            cache_dir: cache_dir.into(),
            fallback,
        }
    }

    /// Load the classifier at `name`, or the fallback if `name` is not a
    /// readable file.
    ///
    /// The fallback is copied into the cache directory first; the copy is
    /// removed once loading finishes, whether or not it succeeded.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Detector>> {
        let named = Path::new(name);
        if !name.is_empty() && named.is_file() {
            let detector = self.loader.load(named)?;
            info!(path = %named.display(), "loaded classifier");
            return Ok(detector);
        }

        let fallback = self
            .fallback
            .as_deref()
            .ok_or_else(|| Error::NotFound(format!("classifier file '{}'", name)))?;
        warn!(
            requested = name,
            fallback = %fallback.display(),
            "classifier not found, using fallback"
        );

        fs::create_dir_all(&self.cache_dir)?;
        let cached = self.cache_dir.join(
            fallback
                .file_name()
                .map_or_else(|| "cascade.xml".into(), |n| n.to_os_string()),
        );
        fs::copy(fallback, &cached).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("fallback classifier {}", fallback.display()))
            }
            _ => Error::Io(e),
        })?;

        let loaded = self.loader.load(&cached);
        if let Err(e) = fs::remove_file(&cached) {
            warn!(path = %cached.display(), error = %e, "could not remove cached classifier");
        }
        let detector = loaded?;
        info!(path = %cached.display(), "loaded fallback classifier");
        Ok(detector)
    }
}

/// A query descriptor running `detector` over the input object. Each
/// detection is returned as a row `[x, y, width, height]`.
pub fn detector_descriptor(name: impl Into<String>, detector: Arc<dyn Detector>) -> CallDescriptor {
    CallDescriptor::new(name, MatIo::Query, move |call| {
        let src = call.source()?;
        let rows = detector
            .detect_multi_scale(src)
            .into_iter()
            .map(|r| vec![r.x, r.y, r.width, r.height])
            .collect();
        Ok(NativeOutput::Rows(rows))
    })
}

/// One detection, normalized to the image size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub id: String,
}

/// Detections for one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    pub objects: Vec<DetectedObject>,
}

impl DetectionReport {
    /// Normalize pixel rectangles by the image's columns and rows. Ids are
    /// the detection's position in `rects`.
    pub fn from_rects(rects: &[Rect], cols: usize, rows: usize) -> Self {
        let (w, h) = (cols.max(1) as f64, rows.max(1) as f64);
        let objects = rects
            .iter()
            .enumerate()
            .map(|(i, r)| DetectedObject {
                x: r.x / w,
                y: r.y / h,
                width: r.width / w,
                height: r.height / h,
                id: i.to_string(),
            })
            .collect();
        debug!(count = rects.len(), "detection report built");
        Self { objects }
    }

    /// Serialize as `{"objects": [...]}`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::GenericFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{Args, NativeCall};
    use crate::types::cv_type;

    fn spot_image() -> Mat {
        let mut mat = Mat::zeros(10, 20, cv_type::CV_8UC1);
        for r in 2..5 {
            for c in 4..8 {
                mat.set(r, c, 0, 255.0);
            }
        }
        mat.set(9, 19, 0, 255.0);
        mat
    }

    #[test]
    fn test_blob_detector() {
        let rects = BlobDetector::default().detect_multi_scale(&spot_image());
        assert_eq!(rects.len(), 2);
        assert_eq!(
            rects[0],
            Rect {
                x: 4.0,
                y: 2.0,
                width: 4.0,
                height: 3.0
            }
        );

        let big_only = BlobDetector {
            min_width: 2,
            ..Default::default()
        };
        assert_eq!(big_only.detect_multi_scale(&spot_image()).len(), 1);
        assert!(BlobDetector::default()
            .detect_multi_scale(&Mat::empty())
            .is_empty());
    }

    #[test]
    fn test_report_json() {
        let rects = [Rect {
            x: 5.0,
            y: 2.5,
            width: 10.0,
            height: 5.0,
        }];
        let json = DetectionReport::from_rects(&rects, 20, 10).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"objects":[{"x":0.25,"y":0.25,"width":0.5,"height":0.5,"id":"0"}]}"#
        );
        assert_eq!(
            DetectionReport::default().to_json().unwrap(),
            r#"{"objects":[]}"#
        );
    }

    #[test]
    fn test_detector_descriptor() {
        let d = detector_descriptor("detect", Arc::new(BlobDetector::default()));
        assert_eq!(d.io(), MatIo::Query);
        let img = spot_image();
        let args = Args::new();
        let call = NativeCall {
            function: "detect",
            src: Some(&img),
            dst: None,
            args: &args,
        };
        match d.call(&call).unwrap() {
            NativeOutput::Rows(rows) => assert_eq!(rows[0], vec![4.0, 2.0, 4.0, 3.0]),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    fn test_resolver_prefers_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("mine.toml");
        fs::write(&named, "threshold = 10").unwrap();
        let resolver = ClassifierResolver::new(
            Arc::new(BlobClassifierLoader),
            dir.path().join("cache"),
            None,
        );
        assert!(resolver.resolve(named.to_str().unwrap()).is_ok());
        assert!(!dir.path().join("cache").exists());
    }

    #[test]
    fn test_resolver_fallback_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("bundled.toml");
        fs::write(&fallback, "threshold = 10").unwrap();
        let cache = dir.path().join("cache");
        let resolver = ClassifierResolver::new(
            Arc::new(BlobClassifierLoader),
            &cache,
            Some(fallback.clone()),
        );

        resolver.resolve("missing.xml").unwrap();
        assert!(cache.exists());
        assert!(!cache.join("bundled.toml").exists());
        assert!(fallback.exists());
    }

    #[test]
    fn test_resolver_cleans_up_after_failed_load() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("broken.toml");
        fs::write(&fallback, "threshold = \"high\"").unwrap();
        let cache = dir.path().join("cache");
        let resolver =
            ClassifierResolver::new(Arc::new(BlobClassifierLoader), &cache, Some(fallback));

        assert!(resolver.resolve("").is_err());
        assert!(!cache.join("broken.toml").exists());
    }

    #[test]
    fn test_resolver_without_fallback() {
        let resolver = ClassifierResolver::new(Arc::new(BlobClassifierLoader), "/tmp", None);
        assert!(resolver.resolve("nope.xml").err().unwrap().is_not_found());
    }

    #[test]
    fn test_closure_loader() {
        let loader = |_: &Path| -> Result<Arc<dyn Detector>> { Ok(Arc::new(BlobDetector::default())) };
        assert!(loader.load(Path::new("x")).is_ok());
    }
}
