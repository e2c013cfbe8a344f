//! Maps driver type names to wrapper constructors.
//!
//! When the driver announces an object with `__create__`, the connection
//! asks this factory to materialize it. The type-name set here is closed:
//! anything else fails with [`Error::UnknownObjectType`], which the
//! connection degrades to an opaque placeholder so the ownership tree stays
//! intact.

use std::sync::Arc;

use serde_json::Value;
use webpilot_runtime::channel_owner::{ChannelOwner, ParentOrConnection};
use webpilot_runtime::{Error, Result};

use crate::{Browser, BrowserContext, BrowserType, ElementHandle, Frame, Page, Playwright};

/// Creates the wrapper for a driver-announced object.
///
/// Every known type is parented under another owner (top-level objects hang
/// off the root registered during the handshake), so a connection-parented
/// create is a protocol violation here.
pub fn create_object(
	parent: ParentOrConnection,
	type_name: String,
	guid: Arc<str>,
	initializer: Value,
) -> Result<Arc<dyn ChannelOwner>> {
	let parent = match parent {
		ParentOrConnection::Parent(p) => p,
		ParentOrConnection::Connection(_) => {
			return Err(Error::Protocol(format!(
				"'{type_name}' objects require a parent object"
			)));
		}
	};

	let object: Arc<dyn ChannelOwner> = match type_name.as_str() {
		"Playwright" => Arc::new(Playwright::new(parent, type_name, guid, initializer)),
		"BrowserType" => Arc::new(BrowserType::new(parent, type_name, guid, initializer)),
		"Browser" => Arc::new(Browser::new(parent, type_name, guid, initializer)),
		"BrowserContext" => Arc::new(BrowserContext::new(parent, type_name, guid, initializer)),
		"Page" => Arc::new(Page::new(parent, type_name, guid, initializer)),
		"Frame" => Arc::new(Frame::new(parent, type_name, guid, initializer)),
		"ElementHandle" => Arc::new(ElementHandle::new(parent, type_name, guid, initializer)),
		_ => return Err(Error::UnknownObjectType(type_name)),
	};
	Ok(object)
}
