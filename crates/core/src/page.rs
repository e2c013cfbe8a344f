//! A single tab. DOM and navigation work is delegated to the main frame.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use webpilot_protocol::{
	ClickOptions, FillOptions, GotoOptions, ScreenshotOptions, Viewport,
};
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::connection::ConnectionLike;
use webpilot_runtime::{Error, Result, Subscription};

use crate::{ElementHandle, Frame};

/// One tab in a [`BrowserContext`](crate::BrowserContext).
///
/// Most operations delegate to the page's main [`Frame`]; the page itself
/// only owns tab-level concerns (screenshot, viewport, lifecycle events).
#[derive(Clone)]
pub struct Page {
	base: ChannelOwnerImpl,
}

impl Page {
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

	/// The page's main frame.
	pub fn main_frame(&self) -> Result<Frame> {
		crate::object_at(&self.base.connection(), self.base.initializer(), "mainFrame")
	}

	/// Navigates the main frame.
	pub async fn goto(&self, url: &str, options: GotoOptions) -> Result<()> {
		self.main_frame()?.goto(url, options).await
	}

	/// Reloads the page.
	pub async fn reload(&self, options: GotoOptions) -> Result<()> {
		self.base.channel().send_no_result("reload", &options).await
	}

	pub async fn title(&self) -> Result<String> {
		self.main_frame()?.title().await
	}

	/// Full HTML of the main frame.
	pub async fn content(&self) -> Result<String> {
		self.main_frame()?.content().await
	}

	pub async fn click(&self, selector: &str, options: ClickOptions) -> Result<()> {
		self.main_frame()?.click(selector, options).await
	}

	pub async fn fill(&self, selector: &str, value: &str, options: FillOptions) -> Result<()> {
		self.main_frame()?.fill(selector, value, options).await
	}

	pub async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
		self.main_frame()?.query_selector(selector).await
	}

	/// Evaluates a JavaScript expression in the main frame.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		self.main_frame()?.evaluate(expression).await
	}

	/// Takes a screenshot and returns the decoded image bytes.
	pub async fn screenshot(&self, options: ScreenshotOptions) -> Result<Vec<u8>> {
		let result: Value = self.base.channel().send("screenshot", &options).await?;
		let encoded = result["binary"]
			.as_str()
			.ok_or_else(|| Error::Protocol("screenshot response missing 'binary'".to_string()))?;
		BASE64
			.decode(encoded)
			.map_err(|e| Error::Protocol(format!("screenshot payload is not base64: {e}")))
	}

	/// Closes the page.
	pub async fn close(&self) -> Result<()> {
		self.base.channel().send_no_result("close", json!({})).await
	}

	/// True once the page was closed or its connection went down.
	pub fn is_closed(&self) -> bool {
		self.base.is_disposed()
	}

	/// Waits for the next event of `kind` ("load", "close", ...) under the
	/// connection's default timeout. Fails with `TargetClosed` if the page
	/// goes away first.
	pub async fn wait_for_event(&self, kind: &str) -> Result<Value> {
		let timeout = self.base.connection().default_timeout();
		self.base.events().wait_for(kind, None, timeout).await
	}

	/// Registers a handler for console messages. The payload is the raw
	/// event params (`type`, `text`, ...).
	pub fn on_console(&self, handler: impl Fn(Value) + Send + Sync + 'static) -> Subscription {
		let id = self.base.events().on("console", handler);
		Subscription::new(self.base.events(), "console", id)
	}

	/// Viewport size the page was created with, if fixed.
	pub fn viewport_size(&self) -> Option<Viewport> {
		serde_json::from_value(self.base.initializer()["viewportSize"].clone()).ok()
	}
}

webpilot_runtime::impl_channel_owner!(Page);

impl std::fmt::Debug for Page {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Page").field("guid", &self.base.guid()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn viewport_size_from_initializer() {
		let page_init = json!({"viewportSize": {"width": 1280, "height": 720}});
		let parsed: Option<Viewport> =
			serde_json::from_value(page_init["viewportSize"].clone()).ok();
		let viewport = parsed.unwrap();
		assert_eq!(viewport.width, 1280);
		assert_eq!(viewport.height, 720);
	}
}
