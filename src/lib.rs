//! Converts rigged characters between T-pose and A-pose.
//!
//! The arm joints are rotated about a world axis, the new pose becomes the
//! rest pose, and every bound mesh is rebuilt so it keeps its posed shape.
//! Blend shapes survive the rebuild with their names, order and deltas.

pub mod convert;
pub mod correction;
pub mod error;
pub mod logging;
pub mod operators;
pub mod scene;
pub mod settings;

pub use error::{ConvertError, ValidationError};
pub use logging::{LogLevel, ResultExt, init_logging, send_log};
