//! Handle to a DOM element inside a frame.

use std::sync::Arc;

use serde_json::{Value, json};
use webpilot_protocol::{ClickOptions, FillOptions};
use webpilot_runtime::Result;
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};

/// A driver-side reference to one DOM element.
///
/// Stays valid until the element is detached or its frame navigates; calls
/// after that fail with a driver error.
#[derive(Clone)]
pub struct ElementHandle {
	base: ChannelOwnerImpl,
}

impl ElementHandle {
	pub(crate) fn new(
		parent: Arc<dyn ChannelOwner>,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Self {
		Self {
			base: ChannelOwnerImpl::new(
				ParentOrConnection::Parent(parent),
				type_name,
				guid,
				initializer,
			),
		}
	}

	pub async fn click(&self, options: ClickOptions) -> Result<()> {
		self.base.channel().send_no_result("click", &options).await
	}

	pub async fn fill(&self, value: &str, options: FillOptions) -> Result<()> {
		let mut params = serde_json::to_value(&options)?;
		if let Some(map) = params.as_object_mut() {
			map.insert("value".to_string(), json!(value));
		}
		self.base.channel().send_no_result("fill", params).await
	}

	/// `textContent` of the element; `None` for elements without text.
	pub async fn text_content(&self) -> Result<Option<String>> {
		let result: Value = self.base.channel().send_no_params("textContent").await?;
		Ok(result["value"].as_str().map(str::to_string))
	}

	/// Rendered text of the element.
	pub async fn inner_text(&self) -> Result<String> {
		let result: Value = self.base.channel().send_no_params("innerText").await?;
		Ok(result["value"].as_str().unwrap_or("").to_string())
	}

	/// Attribute value, `None` when absent.
	pub async fn get_attribute(&self, name: &str) -> Result<Option<String>> {
		let result: Value = self
			.base
			.channel()
			.send("getAttribute", json!({"name": name}))
			.await?;
		Ok(result["value"].as_str().map(str::to_string))
	}

	pub async fn is_visible(&self) -> Result<bool> {
		let result: Value = self.base.channel().send_no_params("isVisible").await?;
		Ok(result["value"].as_bool().unwrap_or(false))
	}
}

webpilot_runtime::impl_channel_owner!(ElementHandle);

impl std::fmt::Debug for ElementHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ElementHandle").field("guid", &self.base.guid()).finish()
	}
}
