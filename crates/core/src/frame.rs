//! Frame: where navigation and DOM calls actually land.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value, json};
use webpilot_protocol::{ClickOptions, FillOptions, GotoOptions};
use webpilot_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use webpilot_runtime::{Error, Result};

use crate::ElementHandle;

/// A frame in a page's frame tree.
#[derive(Clone)]
pub struct Frame {
	base: ChannelOwnerImpl,
}

impl Frame {
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

	/// URL last reported for this frame.
	pub fn url(&self) -> &str {
		self.base.initializer()["url"].as_str().unwrap_or("")
	}

	/// Frame name, empty for the main frame.
	pub fn name(&self) -> &str {
		self.base.initializer()["name"].as_str().unwrap_or("")
	}

	/// Navigates the frame and waits per the options' `wait_until`.
	pub async fn goto(&self, url: &str, options: GotoOptions) -> Result<()> {
		let params = merge_params(&options, [("url", json!(url))])?;
		self.base.channel().send_no_result("goto", params).await
	}

	pub async fn click(&self, selector: &str, options: ClickOptions) -> Result<()> {
		let params = merge_params(&options, [("selector", json!(selector))])?;
		self.base.channel().send_no_result("click", params).await
	}

	pub async fn fill(&self, selector: &str, value: &str, options: FillOptions) -> Result<()> {
		let params =
			merge_params(&options, [("selector", json!(selector)), ("value", json!(value))])?;
		self.base.channel().send_no_result("fill", params).await
	}

	pub async fn title(&self) -> Result<String> {
		let result: Value = self.base.channel().send_no_params("title").await?;
		string_value(&result, "title")
	}

	/// Full HTML of the frame.
	pub async fn content(&self) -> Result<String> {
		let result: Value = self.base.channel().send_no_params("content").await?;
		string_value(&result, "content")
	}

	/// Finds the first element matching `selector`, if any.
	pub async fn query_selector(&self, selector: &str) -> Result<Option<ElementHandle>> {
		let result: Value = self
			.base
			.channel()
			.send("querySelector", json!({"selector": selector}))
			.await?;
		match result["element"]["guid"].as_str() {
			Some(guid) => Ok(Some(crate::find_object(&self.base.connection(), guid)?)),
			None => Ok(None),
		}
	}

	/// Evaluates a JavaScript expression and returns its value as JSON.
	pub async fn evaluate(&self, expression: &str) -> Result<Value> {
		let result: Value = self
			.base
			.channel()
			.send(
				"evaluateExpression",
				json!({
					"expression": expression,
					"isFunction": false,
					"arg": {"value": {"v": "undefined"}, "handles": []},
				}),
			)
			.await?;
		Ok(parse_serialized_value(&result["value"]))
	}
}

webpilot_runtime::impl_channel_owner!(Frame);

impl std::fmt::Debug for Frame {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Frame")
			.field("url", &self.url())
			.field("guid", &self.base.guid())
			.finish()
	}
}

/// Serializes `options` and splices fixed fields into the same params
/// object.
fn merge_params<P: Serialize>(
	options: &P,
	extra: impl IntoIterator<Item = (&'static str, Value)>,
) -> Result<Value> {
	let Value::Object(mut map) = serde_json::to_value(options)? else {
		return Err(Error::Protocol("options did not serialize to an object".to_string()));
	};
	for (key, value) in extra {
		map.insert(key.to_string(), value);
	}
	Ok(Value::Object(map))
}

fn string_value(result: &Value, method: &str) -> Result<String> {
	result["value"]
		.as_str()
		.map(str::to_string)
		.ok_or_else(|| Error::Protocol(format!("{method} response missing 'value'")))
}

/// Decodes the driver's serialized-value format into plain JSON.
///
/// The driver tags every value (`{"n": 1}`, `{"s": "x"}`, `{"b": true}`,
/// `{"v": "null"}`, arrays as `{"a": [..]}`, objects as
/// `{"o": [{"k", "v"}, ..]}`). Handles and non-JSON values (`undefined`,
/// `NaN`, dates) map to `null`.
fn parse_serialized_value(value: &Value) -> Value {
	let Some(map) = value.as_object() else {
		return Value::Null;
	};

	if let Some(n) = map.get("n") {
		return n.clone();
	}
	if let Some(s) = map.get("s") {
		return s.clone();
	}
	if let Some(b) = map.get("b") {
		return b.clone();
	}
	if let Some(items) = map.get("a").and_then(Value::as_array) {
		return Value::Array(items.iter().map(parse_serialized_value).collect());
	}
	if let Some(entries) = map.get("o").and_then(Value::as_array) {
		let mut object = Map::new();
		for entry in entries {
			if let Some(key) = entry["k"].as_str() {
				object.insert(key.to_string(), parse_serialized_value(&entry["v"]));
			}
		}
		return Value::Object(object);
	}
	// "v" markers (undefined, null, NaN, ...) and anything unrecognized.
	Value::Null
}
