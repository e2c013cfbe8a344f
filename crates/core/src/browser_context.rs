//! Isolated browsing context: its own pages, cookies, and storage.

use std::sync::Arc;

use serde_json::{Value, json};
use webpilot_protocol::Cookie;
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::connection::ConnectionLike;
use webpilot_runtime::{Result, Subscription};

use crate::Page;

/// An isolated browsing context inside a [`Browser`](crate::Browser).
#[derive(Clone)]
pub struct BrowserContext {
	base: ChannelOwnerImpl,
}

impl BrowserContext {
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

	/// Opens a new page in this context.
	pub async fn new_page(&self) -> Result<Page> {
		let result: Value = self.base.channel().send_no_params("newPage").await?;
		crate::object_at(&self.base.connection(), &result, "page")
	}

	/// Pages currently open in this context, in no particular order.
	pub fn pages(&self) -> Vec<Page> {
		self.base
			.children()
			.iter()
			.filter_map(|child| child.downcast_ref::<Page>().cloned())
			.collect()
	}

	/// Cookies visible to the given URLs (all cookies when empty).
	pub async fn cookies(&self, urls: &[&str]) -> Result<Vec<Cookie>> {
		#[derive(serde::Deserialize)]
		struct CookiesResult {
			cookies: Vec<Cookie>,
		}
		let result: CookiesResult =
			self.base.channel().send("cookies", json!({"urls": urls})).await?;
		Ok(result.cookies)
	}

	/// Adds cookies to this context.
	pub async fn add_cookies(&self, cookies: &[Cookie]) -> Result<()> {
		self.base
			.channel()
			.send_no_result("addCookies", json!({"cookies": cookies}))
			.await
	}

	/// Closes the context and every page in it.
	pub async fn close(&self) -> Result<()> {
		self.base.channel().send_no_result("close", json!({})).await
	}

	/// Waits for the next page opened in this context (e.g. by a popup or
	/// `window.open`), bounded by the connection's default timeout.
	pub async fn wait_for_page(&self) -> Result<Page> {
		let connection = self.base.connection();
		let params = self
			.base
			.events()
			.wait_for("page", None, connection.default_timeout())
			.await?;
		crate::object_at(&connection, &params, "page")
	}

	/// Registers a handler invoked for every page opened in this context.
	pub fn on_page(&self, handler: impl Fn(Page) + Send + Sync + 'static) -> Subscription {
		let connection = self.base.connection();
		let id = self.base.events().on("page", move |params| {
			match crate::object_at::<Page>(&connection, &params, "page") {
				Ok(page) => handler(page),
				Err(e) => tracing::warn!(error = %e, "page event with unresolvable page"),
			}
		});
		Subscription::new(self.base.events(), "page", id)
	}
}

webpilot_runtime::impl_channel_owner!(BrowserContext);

impl std::fmt::Debug for BrowserContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BrowserContext").field("guid", &self.base.guid()).finish()
	}
}
