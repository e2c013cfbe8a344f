//! High-level browser automation API.
//!
//! Typed wrappers over the channel runtime: [`Playwright`] is the entry
//! point, everything else ([`Browser`], [`Page`], [`Frame`], ...) is a thin
//! proxy around a driver-side object. Wrappers are cheap to clone; they
//! share the underlying channel state.
//!
//! ```no_run
//! use webpilot::Playwright;
//!
//! #[tokio::main]
//! async fn main() -> webpilot::Result<()> {
//!     let playwright = Playwright::launch().await?;
//!     let browser = playwright.chromium()?.launch(Default::default()).await?;
//!     let page = browser.new_page().await?;
//!     page.goto("https://example.com", Default::default()).await?;
//!     println!("{}", page.title().await?);
//!     browser.close().await?;
//!     playwright.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use serde_json::Value;
use webpilot_runtime::channel_owner::ChannelOwner;
use webpilot_runtime::connection::ConnectionLike;

pub mod browser;
pub mod browser_context;
pub mod browser_type;
pub mod element_handle;
pub mod frame;
mod init;
pub mod object_factory;
pub mod page;
pub mod playwright;

pub use browser::Browser;
pub use browser_context::BrowserContext;
pub use browser_type::BrowserType;
pub use element_handle::ElementHandle;
pub use frame::Frame;
pub use page::Page;
pub use playwright::Playwright;
pub use webpilot_protocol as protocol;
pub use webpilot_runtime::{Error, Result, Subscription};

/// Looks up a registered object by guid and downcasts it to `T`.
pub(crate) fn find_object<T: ChannelOwner + Clone>(
	connection: &Arc<dyn ConnectionLike>,
	guid: &str,
) -> Result<T> {
	let object = connection.get_object(guid)?;
	object
		.downcast_ref::<T>()
		.cloned()
		.ok_or_else(|| Error::Protocol(format!("object '{guid}' has unexpected type")))
}

/// Extracts a `{field: {guid}}` reference from a payload.
pub(crate) fn guid_at<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
	value[field]["guid"]
		.as_str()
		.ok_or_else(|| Error::Protocol(format!("payload missing '{field}.guid'")))
}

/// Resolves a `{field: {guid}}` reference in a payload to a wrapper.
pub(crate) fn object_at<T: ChannelOwner + Clone>(
	connection: &Arc<dyn ConnectionLike>,
	value: &Value,
	field: &str,
) -> Result<T> {
	find_object(connection, guid_at(value, field)?)
}
