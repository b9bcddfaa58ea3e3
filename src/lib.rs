//! Bridge between a scripting runtime and a native image-processing library.
//!
//! Native objects live in a process-wide [`HandleTable`] and are addressed
//! from the scripting side by small integer handles. Calls arrive as
//! [`InvocationRequest`]s naming a registered function, its parameters, and
//! the handles it reads and writes. Results come back either as typed
//! [`Result`]s or, for batches, as a single event delivered under the final
//! request's callback name.
//!
//! # Example
//!
//! ```
//! use cvbridge::{Bridge, InvocationBatch, RecordingEmitter, Payload};
//! use std::sync::Arc;
//!
//! fn main() -> cvbridge::Result<()> {
//!     let events = Arc::new(RecordingEmitter::new());
//!     let bridge = Bridge::builder().emitter(events.clone()).build()?;
//!
//!     // Allocate objects
//!     let src = bridge.mat_with_params(2, 2, cvbridge::cv_type::CV_8UC1.code())?;
//!     let dst = bridge.mat()?;
//!
//!     // Run a batch; only the last request's callback fires
//!     let batch = InvocationBatch::from_json(&format!(
//!         r#"[{{"function":"setTo","params":{{"value":9}},"inputHandle":{src}}},
//!            {{"function":"transpose","inputHandle":{src},"outputHandle":{dst},"callback":"done"}}]"#,
//!         src = src.mat_index.as_i32(),
//!         dst = dst.mat_index.as_i32(),
//!     ))?;
//!     bridge.invoke_methods(&batch);
//!
//!     let event = &events.events()[0];
//!     assert_eq!(event.name, "done");
//!     assert_eq!(event.response.payload, Payload::Nested(vec![vec![9.0, 9.0]; 2]));
//!
//!     bridge.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod callback;
pub mod classifier;
pub mod codec;
pub mod coerce;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod handles;
pub mod native;
pub mod registry;
pub mod request;
pub mod types;

// Re-export main types at the crate root
pub use bridge::{Bridge, BridgeBuilder};
pub use callback::{
    CallbackEvent, CallbackResponse, ChannelEmitter, EventEmitter, NullEmitter, RecordingEmitter,
};
pub use classifier::{
    BlobClassifierLoader, BlobDetector, ClassifierLoader, ClassifierResolver, DetectedObject,
    DetectionReport, Detector,
};
pub use codec::{ImageCodec, ImageCrateCodec, ImageEncoding};
pub use config::BridgeConfig;
pub use dispatcher::{BatchOutcome, Invocation, InvocationDispatcher};
pub use encoder::{encode_mat, Payload, Selector};
pub use error::{Error, Result};
pub use handles::{Handle, HandleTable, MAX_HANDLES};
pub use native::{Mat, NativeError, NativeOutput};
pub use registry::{CallDescriptor, InvocationRegistry, MatIo, ParamKind, RegistryBuilder};
pub use request::{InvocationBatch, InvocationRequest};
pub use types::{
    cv_type, ColorConversion, CvType, DecodedImage, Depth, EncodedImage, MatInfo, Point, Rect,
    Scalar, Sentinel, Size, Terminal, ThresholdType,
};

use tracing_subscriber::EnvFilter;

/// Environment variable read by [`init`] for the log filter.
pub const LOG_ENV: &str = "CVBRIDGE_LOG";

/// API version constants.
pub mod version {
    /// API major version.
    pub const MAJOR: i32 = 0;
    /// API minor version.
    pub const MINOR: i32 = 1;
    /// API patch version.
    pub const PATCH: i32 = 0;
}

/// Get the API version string (e.g., "0.1.0").
pub fn api_version() -> String {
    format!("{}.{}.{}", version::MAJOR, version::MINOR, version::PATCH)
}

/// Check if this library is compatible with code written against the given
/// major.minor version.
pub fn api_version_compatible(major: i32, minor: i32) -> bool {
    major == version::MAJOR && minor <= version::MINOR
}

/// Install a `fmt` subscriber filtered by `CVBRIDGE_LOG`, or `info` when unset.
///
/// Safe to call multiple times; only the first call installs anything.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    install(filter);
}

/// Install a `fmt` subscriber with an explicit filter directive.
pub fn init_with_filter(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| Error::InvalidParameter(format!("log filter '{}': {}", directive, e)))?;
    install(filter);
    Ok(())
}

/// Install a subscriber using the configuration's `log_filter`.
///
/// `CVBRIDGE_LOG` still takes precedence when set.
pub fn init_with_config(config: &BridgeConfig) -> Result<()> {
    match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => {
            install(filter);
            Ok(())
        }
        Err(_) => init_with_filter(&config.log_filter),
    }
}

fn install(filter: EnvFilter) {
    // A subscriber installed elsewhere wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
