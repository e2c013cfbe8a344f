//! Small value types shared across the protocol surface.

use serde::{Deserialize, Serialize};

/// Reference to a remote object inside a request or response payload.
///
/// The driver never embeds whole objects in responses; it sends
/// `{"guid": "..."}` and announces the object itself through a separate
/// create message. The runtime resolves the guid against its registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidRef {
	pub guid: String,
}

impl GuidRef {
	pub fn new(guid: impl Into<String>) -> Self {
		Self { guid: guid.into() }
	}
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
	pub width: i32,
	pub height: i32,
}

impl Viewport {
	pub fn new(width: i32, height: i32) -> Self {
		Self { width, height }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn guid_ref_wire_shape() {
		let json = serde_json::to_value(GuidRef::new("page@abc")).unwrap();
		assert_eq!(json, serde_json::json!({"guid": "page@abc"}));
	}

	#[test]
	fn viewport_round_trip() {
		let vp: Viewport = serde_json::from_str(r#"{"width":1280,"height":720}"#).unwrap();
		assert_eq!(vp, Viewport::new(1280, 720));
	}
}
