//! A running browser instance.

use std::sync::Arc;

use serde_json::{Value, json};
use webpilot_protocol::ContextOptions;
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::connection::ConnectionLike;
use webpilot_runtime::{Result, Subscription};

use crate::{BrowserContext, Page};

/// A browser instance launched through a [`BrowserType`](crate::BrowserType).
#[derive(Clone)]
pub struct Browser {
	base: ChannelOwnerImpl,
}

impl Browser {
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

	/// Browser version string reported at launch.
	pub fn version(&self) -> &str {
		self.base.initializer()["version"].as_str().unwrap_or("")
	}

	/// Creates an isolated browsing context.
	pub async fn new_context(&self, options: ContextOptions) -> Result<BrowserContext> {
		let result: Value = self.base.channel().send("newContext", &options).await?;
		crate::object_at(&self.base.connection(), &result, "context")
	}

	/// Convenience: creates a fresh context with default options and one
	/// page in it.
	pub async fn new_page(&self) -> Result<Page> {
		let context = self.new_context(ContextOptions::new()).await?;
		context.new_page().await
	}

	/// Closes the browser and every context in it.
	pub async fn close(&self) -> Result<()> {
		self.base.channel().send_no_result("close", json!({})).await
	}

	/// Registers a handler for browser disconnection. Dropping the returned
	/// [`Subscription`] unregisters it.
	pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) -> Subscription {
		let id = self.base.events().on("close", move |_| handler());
		Subscription::new(self.base.events(), "close", id)
	}

	/// True once the browser reported itself closed or the connection went
	/// down.
	pub fn is_connected(&self) -> bool {
		!self.base.is_disposed() && !self.base.connection().is_closed()
	}
}

webpilot_runtime::impl_channel_owner!(Browser);

impl std::fmt::Debug for Browser {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Browser")
			.field("version", &self.version())
			.field("guid", &self.base.guid())
			.finish()
	}
}
