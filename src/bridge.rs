//! The scripting-facing entry points.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{error, info};

use crate::callback::{send_callback_data, EventEmitter, NullEmitter};
use crate::classifier::{BlobClassifierLoader, ClassifierLoader, ClassifierResolver, DetectionReport};
use crate::codec::{validate_input_path, ImageCodec, ImageCrateCodec, ImageEncoding};
use crate::config::BridgeConfig;
use crate::dispatcher::{BatchOutcome, Invocation, InvocationDispatcher};
use crate::encoder::{encode_mat, Payload, Selector};
use crate::error::{Error, Result};
use crate::handles::{Handle, HandleTable};
use crate::native::Mat;
use crate::registry::{CallDescriptor, InvocationRegistry};
use crate::request::{InvocationBatch, InvocationRequest};
use crate::types::{cv_type, CvType, DecodedImage, EncodedImage, MatInfo, Point, Scalar, Terminal};

/// Owns the handle table and routes every call from the scripting side.
///
/// Typed methods return a [`Result`]. The `invoke_method*` family is fire and
/// forget: failures are logged and reported only through the returned
/// [`BatchOutcome`]'s terminal.
///
/// # Example
///
/// ```
/// use cvbridge::{Bridge, Selector, Payload, Scalar};
///
/// let bridge = Bridge::new()?;
/// let info = bridge.mat_with_scalar(2, 2, 0, Scalar::all(7.0))?;
/// let data = bridge.get_mat_data(info.mat_index, Selector::all())?;
/// assert_eq!(data, Payload::Nested(vec![vec![7.0, 7.0], vec![7.0, 7.0]]));
/// # Ok::<(), cvbridge::Error>(())
/// ```
pub struct Bridge {
    config: BridgeConfig,
    table: Arc<HandleTable>,
    dispatcher: InvocationDispatcher,
    emitter: Arc<dyn EventEmitter>,
    codec: Arc<dyn ImageCodec>,
    classifiers: ClassifierResolver,
}

/// Builder for [`Bridge`].
#[derive(Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    emitter: Option<Arc<dyn EventEmitter>>,
    codec: Option<Arc<dyn ImageCodec>>,
    loader: Option<Arc<dyn ClassifierLoader>>,
    descriptors: Vec<CallDescriptor>,
}

impl BridgeBuilder {
    /// Table capacity, cache directory and codec settings.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Where callback events go. Defaults to dropping them.
    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Image codec used by `image_to_mat` and `mat_to_image`.
    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Loader turning classifier files into detectors.
    pub fn classifier_loader(mut self, loader: Arc<dyn ClassifierLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Register an extra callable function next to the built-ins.
    pub fn register(mut self, descriptor: CallDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate the configuration and assemble the bridge.
    ///
    /// Fails if an extra function reuses a built-in name.
    pub fn build(self) -> Result<Bridge> {
        self.config.validate()?;

        let mut registry = InvocationRegistry::builder();
        registry.extend_from(&InvocationRegistry::builtin());
        for descriptor in self.descriptors {
            registry.register(descriptor);
        }
        let registry = Arc::new(registry.try_build()?);

        let table = Arc::new(HandleTable::with_capacity(self.config.capacity));
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(BlobClassifierLoader));
        let classifiers = ClassifierResolver::new(
            loader,
            self.config.cache_dir.clone(),
            self.config.fallback_classifier.clone(),
        );
        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(ImageCrateCodec::new(self.config.jpeg_quality)));

        info!(
            capacity = table.capacity(),
            functions = registry.len(),
            "bridge ready"
        );
        Ok(Bridge {
            dispatcher: InvocationDispatcher::new(registry, Arc::clone(&table)),
            table,
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NullEmitter)),
            codec,
            classifiers,
            config: self.config,
        })
    }
}

impl Bridge {
    /// Bridge with the default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Builder for a bridge with custom collaborators.
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::default()
    }

    /// Settings the bridge was built with.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Handle table owning every object.
    pub fn table(&self) -> &Arc<HandleTable> {
        &self.table
    }

    /// Dispatcher running named functions.
    pub fn dispatcher(&self) -> &InvocationDispatcher {
        &self.dispatcher
    }

    /// Functions callable by name.
    pub fn registry(&self) -> &InvocationRegistry {
        self.dispatcher.registry()
    }

    // Object creation

    /// Register an empty object.
    pub fn mat(&self) -> Result<MatInfo> {
        let handle = self.table.create_empty()?;
        Ok(MatInfo {
            rows: 0,
            cols: 0,
            cv_type: None,
            mat_index: handle,
        })
    }

    /// Register a zero-filled object.
    pub fn mat_with_params(&self, rows: usize, cols: usize, cv_type: i32) -> Result<MatInfo> {
        let typ = parse_type(cv_type)?;
        let mat = Mat::try_zeros(rows, cols, typ).map_err(|e| Error::invalid(e.to_string()))?;
        self.register_mat(mat)
    }

    /// Register an object with every element set to `scalar`.
    pub fn mat_with_scalar(
        &self,
        rows: usize,
        cols: usize,
        cv_type: i32,
        scalar: Scalar,
    ) -> Result<MatInfo> {
        let typ = parse_type(cv_type)?;
        let mat = Mat::try_with_scalar(rows, cols, typ, scalar)
            .map_err(|e| Error::invalid(e.to_string()))?;
        self.register_mat(mat)
    }

    /// Register a 2×1 `CV_32SC1` column holding `lo` and `hi`.
    pub fn mat_of_int(&self, lo: i32, hi: i32) -> Result<MatInfo> {
        let mat = Mat::from_data(2, 1, cv_type::CV_32SC1, vec![lo.into(), hi.into()])?;
        self.register_mat(mat)
    }

    /// Register a 2×1 `CV_32FC1` column holding `lo` and `hi`.
    pub fn mat_of_float(&self, lo: f32, hi: f32) -> Result<MatInfo> {
        let mat = Mat::from_data(2, 1, cv_type::CV_32FC1, vec![lo.into(), hi.into()])?;
        self.register_mat(mat)
    }

    fn register_mat(&self, mat: Mat) -> Result<MatInfo> {
        let (rows, cols, code) = (mat.rows(), mat.cols(), mat.cv_type().code());
        let handle = self.table.create(mat)?;
        Ok(MatInfo {
            rows,
            cols,
            cv_type: Some(code),
            mat_index: handle,
        })
    }

    // Object access

    /// Numeric contents of an object, or of one row, column or element.
    pub fn get_mat_data(&self, handle: Handle, selector: Selector) -> Result<Payload> {
        let mat = self.table.get(handle)?;
        encode_mat(&mat, selector)
    }

    /// Set every element of an object to `scalar`.
    pub fn set_to(&self, handle: Handle, scalar: Scalar) -> Result<()> {
        self.table.update(handle, |mat| {
            mat.set_to(scalar);
            Ok(())
        })
    }

    /// Write `data` starting at (`row`, `col`), returning how many values
    /// were written.
    pub fn put(&self, handle: Handle, row: usize, col: usize, data: &[f64]) -> Result<usize> {
        self.table
            .update(handle, |mat| Ok(mat.put(row, col, data)?))
    }

    /// Transpose an object in place.
    pub fn transpose(&self, handle: Handle) -> Result<()> {
        self.table.update(handle, |mat| {
            *mat = mat.transpose();
            Ok(())
        })
    }

    /// Release one object. Its handle becomes free for reuse.
    pub fn delete_mat(&self, handle: Handle) -> Result<()> {
        self.table.delete(handle)
    }

    /// Release every object.
    pub fn delete_mats(&self) {
        self.table.delete_all();
    }

    // Convenience operations

    /// Draw a line on an object in place.
    pub fn draw_line(
        &self,
        handle: Handle,
        pt1: Point,
        pt2: Point,
        color: Scalar,
        thickness: i32,
    ) -> Result<()> {
        let request = InvocationRequest::new("line")
            .param("pt1", json!(pt1))
            .param("pt2", json!(pt2))
            .param("color", json!(color.0))
            .param("thickness", thickness)
            .input(handle);
        self.invoke(&request).map(|_| ())
    }

    /// Convert `src` with an OpenCV color conversion code, writing into `dst`.
    pub fn cvt_color(&self, src: Handle, dst: Handle, code: i32) -> Result<()> {
        let request = InvocationRequest::new("cvtColor")
            .param("code", code)
            .input(src)
            .output(dst);
        self.invoke(&request).map(|_| ())
    }

    // Generic invocation

    /// Execute one request with a typed result. No callback is delivered.
    pub fn invoke(&self, request: &InvocationRequest) -> Result<Invocation> {
        self.dispatcher.invoke(request)
    }

    /// Run a producer, discarding any result.
    pub fn invoke_method(&self, function: &str, params: Map<String, Value>) -> BatchOutcome {
        self.invoke_in_out_method(None, function, params, None)
    }

    /// Run a function against optional input and output handles.
    pub fn invoke_in_out_method(
        &self,
        input: Option<Handle>,
        function: &str,
        params: Map<String, Value>,
        output: Option<Handle>,
    ) -> BatchOutcome {
        let request = single(input, function, params, output, None);
        self.dispatcher.invoke_batch(&InvocationBatch::new(vec![request]))
    }

    /// Run one function and deliver its result under `callback`.
    pub fn invoke_method_with_callback(
        &self,
        input: Option<Handle>,
        function: &str,
        params: Map<String, Value>,
        output: Option<Handle>,
        callback: &str,
    ) -> BatchOutcome {
        let request = single(input, function, params, output, Some(callback.to_string()));
        self.invoke_methods(&InvocationBatch::new(vec![request]))
    }

    /// Run a batch and deliver the final request's result under its callback.
    pub fn invoke_methods(&self, batch: &InvocationBatch) -> BatchOutcome {
        let outcome = self.dispatcher.invoke_batch(batch);
        self.deliver(&outcome);
        outcome
    }

    /// [`Bridge::invoke_methods`] for a JSON batch. Unparseable input is
    /// logged and reported as a sentinel terminal.
    pub fn invoke_methods_json(&self, json: &str) -> BatchOutcome {
        match InvocationBatch::from_json(json) {
            Ok(batch) => self.invoke_methods(&batch),
            Err(err) => {
                error!(error = %err, "rejecting malformed batch");
                BatchOutcome {
                    terminal: Terminal::Sentinel(err.sentinel()),
                    ..Default::default()
                }
            }
        }
    }

    fn deliver(&self, outcome: &BatchOutcome) -> bool {
        send_callback_data(
            self.emitter.as_ref(),
            outcome.callback.as_deref(),
            outcome.terminal,
            || {
                outcome.payload.clone().or_else(|| {
                    let handle = outcome.terminal.handle()?;
                    let mat = self.table.get(handle).ok()?;
                    encode_mat(&mat, Selector::all()).ok()
                })
            },
        )
    }

    // Files and detection

    /// Decode an image file into a new object.
    pub fn image_to_mat(&self, path: &str) -> Result<DecodedImage> {
        let file = validate_input_path(path)?;
        let mat = self.codec.decode(file)?;
        let (rows, cols) = (mat.rows(), mat.cols());
        let handle = self.table.create(mat)?;
        info!(path, rows, cols, handle = handle.as_i32(), "image loaded");
        Ok(DecodedImage {
            rows,
            cols,
            mat_index: handle,
        })
    }

    /// Encode an object to `path`; the extension picks PNG or JPEG.
    pub fn mat_to_image(&self, handle: Handle, path: &str) -> Result<EncodedImage> {
        if path.is_empty() {
            return Err(Error::invalid("empty output path"));
        }
        let encoding = ImageEncoding::from_path(path).ok_or_else(|| {
            Error::InvalidParameter(format!("unsupported image extension, write '{}'", path))
        })?;
        let mat = self.table.get(handle)?;
        let (width, height) = self.codec.encode(&mat, std::path::Path::new(path), encoding)?;
        info!(path, width, height, "image written");
        Ok(EncodedImage {
            width,
            height,
            uri: path.to_string(),
        })
    }

    /// Run a classifier over an object and describe the detections as JSON
    /// with coordinates relative to the image size.
    pub fn use_cascade_on_image(&self, classifier: &str, handle: Handle) -> Result<String> {
        let detector = self.classifiers.resolve(classifier)?;
        let mat = self.table.get(handle)?;
        let rects = detector.detect_multi_scale(&mat);
        DetectionReport::from_rects(&rects, mat.cols(), mat.rows()).to_json()
    }

    /// Release every object.
    pub fn shutdown(&self) {
        self.table.delete_all();
        info!("bridge shut down");
    }
}

fn parse_type(code: i32) -> Result<CvType> {
    CvType::from_code(code)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown element type {}", code)))
}

fn single(
    input: Option<Handle>,
    function: &str,
    params: Map<String, Value>,
    output: Option<Handle>,
    callback: Option<String>,
) -> InvocationRequest {
    InvocationRequest {
        function: function.to_string(),
        params,
        input_handle: input,
        output_handle: output,
        callback,
    }
}
