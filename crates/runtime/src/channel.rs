//! Channel - typed call proxy for one remote object.
//!
//! Thin serde layer over [`ConnectionLike::send_message`]: serializes
//! params, addresses the call to this object's guid, deserializes the
//! result. Errors from the connection (`Timeout`, `ConnectionClosed`,
//! `TargetClosed`, `Driver`) pass through unchanged.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionLike;
use crate::error::Result;

/// Call proxy bound to one guid.
#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: Arc<dyn ConnectionLike>,
}

impl Channel {
	pub fn new(guid: Arc<str>, connection: Arc<dyn ConnectionLike>) -> Self {
		Self { guid, connection }
	}

	/// Sends a call and deserializes the response, using the connection's
	/// default timeout.
	pub async fn send<P: Serialize, R: DeserializeOwned>(
		&self,
		method: &str,
		params: P,
	) -> Result<R> {
		let params = serde_json::to_value(params)?;
		let response = self.connection.send_message(&self.guid, method, params).await?;
		serde_json::from_value(response).map_err(Into::into)
	}

	/// Sends a call with an explicit deadline.
	pub async fn send_with_timeout<P: Serialize, R: DeserializeOwned>(
		&self,
		method: &str,
		params: P,
		timeout: Duration,
	) -> Result<R> {
		let params = serde_json::to_value(params)?;
		let response = self
			.connection
			.send_message_with_timeout(&self.guid, method, params, timeout)
			.await?;
		serde_json::from_value(response).map_err(Into::into)
	}

	/// Sends a call with no parameters.
	pub async fn send_no_params<R: DeserializeOwned>(&self, method: &str) -> Result<R> {
		self.send(method, serde_json::json!({})).await
	}

	/// Sends a call whose result is ignored.
	pub async fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		let _: Value = self.send(method, params).await?;
		Ok(())
	}

	/// Guid this channel is addressed to.
	pub fn guid(&self) -> &str {
		&self.guid
	}
}
