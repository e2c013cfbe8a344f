//! Error types for the webpilot runtime.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the webpilot runtime.
///
/// Every pending call and event waiter resolves with exactly one of these
/// (or a success value); the dispatcher never drops an outcome on the floor.
#[derive(Debug, Error)]
pub enum Error {
	/// A call or wait exceeded its deadline. Recoverable; retrying is the
	/// caller's decision.
	#[error("timed out after {elapsed_ms}ms (limit {limit_ms}ms)")]
	Timeout { elapsed_ms: u64, limit_ms: u64 },

	/// The connection to the driver process is closed. Terminal for the
	/// connection, not for the process.
	#[error("connection to the driver is closed")]
	ConnectionClosed,

	/// The remote object this call or wait was addressed to is gone.
	#[error("target closed: {guid}")]
	TargetClosed { guid: String },

	/// Structured error returned by the driver, surfaced verbatim.
	#[error("{name}: {message}")]
	Driver {
		/// Error class name reported by the driver (e.g. "TimeoutError").
		name: String,
		message: String,
		/// Driver-side stack trace, when available.
		stack: Option<String>,
	},

	/// The driver announced an object under a guid that is already
	/// registered. Fatal protocol violation; the connection closes.
	#[error("duplicate guid registered: {0}")]
	DuplicateGuid(String),

	/// The driver announced an object of a type this client does not know.
	/// Non-fatal; the object is kept as an opaque placeholder.
	#[error("unknown protocol object type: {0}")]
	UnknownObjectType(String),

	/// Malformed or unexpected protocol payload.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// A message referenced a guid with no registered object.
	#[error("object not found: {guid}")]
	ObjectNotFound { guid: String },

	/// Transport-level failure on the byte stream to the driver.
	#[error("transport error: {0}")]
	Transport(String),

	/// The driver executable could not be located.
	#[error("driver not found; set WEBPILOT_DRIVER_PATH or install the driver")]
	DriverNotFound,

	/// The driver process failed to start.
	#[error("failed to launch driver: {0}")]
	LaunchFailed(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Builds a [`Error::Timeout`] from measured and allowed durations.
	pub fn timeout(elapsed: Duration, limit: Duration) -> Self {
		Error::Timeout {
			elapsed_ms: elapsed.as_millis() as u64,
			limit_ms: limit.as_millis() as u64,
		}
	}

	/// Builds a [`Error::TargetClosed`] for the given guid.
	pub fn target_closed(guid: &str) -> Self {
		Error::TargetClosed { guid: guid.to_string() }
	}

	/// Returns the error class name if this is a driver-reported error.
	pub fn driver_error_name(&self) -> Option<&str> {
		match self {
			Error::Driver { name, .. } => Some(name),
			_ => None,
		}
	}

	/// Returns the driver-side stack trace, if any.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Driver { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout, local or driver-reported.
	pub fn is_timeout(&self) -> bool {
		match self {
			Error::Timeout { .. } => true,
			Error::Driver { name, .. } => name == "TimeoutError",
			_ => false,
		}
	}

	/// Returns true if the target object or connection is gone.
	pub fn is_target_closed(&self) -> bool {
		match self {
			Error::TargetClosed { .. } => true,
			Error::Driver { name, .. } => name == "TargetClosedError",
			_ => false,
		}
	}
}
