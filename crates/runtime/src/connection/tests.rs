use std::sync::Arc;
use std::sync::atomic::Ordering;

use serde_json::json;
use tokio::io::duplex;

use super::*;
use crate::transport::PipeTransport;

fn create_test_connection() -> (Arc<Connection>, tokio::io::DuplexStream, tokio::io::DuplexStream) {
	let (stdin_read, stdin_write) = duplex(1024);
	let (stdout_read, stdout_write) = duplex(1024);

	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let parts = transport.into_transport_parts(message_rx);
	let connection = Arc::new(Connection::new(parts));

	(connection, stdin_read, stdout_write)
}

struct TestFactory;

impl ObjectFactory for TestFactory {
	fn create_object(
		&self,
		parent: ParentOrConnection,
		type_name: String,
		guid: Arc<str>,
		initializer: Value,
	) -> Pin<Box<dyn Future<Output = Result<Arc<dyn ChannelOwner>>> + Send + '_>> {
		Box::pin(async move {
			match type_name.as_str() {
				"Widget" | "Gadget" => Ok(Arc::new(BareObject::new(
					parent, type_name, guid, initializer,
				)) as Arc<dyn ChannelOwner>),
				other => Err(Error::UnknownObjectType(other.to_string())),
			}
		})
	}
}

/// Registers a root object under the empty guid, as the handshake does.
fn register_root(connection: &Arc<Connection>) -> Arc<dyn ChannelOwner> {
	let root: Arc<dyn ChannelOwner> = Arc::new(BareObject::new(
		ParentOrConnection::Connection(Arc::clone(connection) as Arc<dyn ConnectionLike>),
		"Root".to_string(),
		Arc::from(""),
		Value::Null,
	));
	connection
		.register_object(Arc::from(""), Arc::clone(&root))
		.unwrap();
	root
}

fn create_event(parent_guid: &str, type_name: &str, guid: &str) -> Message {
	Message::Event(Event {
		guid: Arc::from(parent_guid),
		method: "__create__".to_string(),
		params: json!({
			"type": type_name,
			"guid": guid,
			"initializer": {},
		}),
	})
}

#[test]
fn test_request_id_increments() {
	let (connection, _, _) = create_test_connection();

	let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let id3 = connection.last_id.fetch_add(1, Ordering::SeqCst);

	assert_eq!(id1, 0);
	assert_eq!(id2, 1);
	assert_eq!(id3, 2);
}

#[test]
fn test_request_format() {
	let request = Request {
		id: 0,
		guid: Arc::from("page@abc123"),
		method: "goto".to_string(),
		params: json!({"url": "https://example.com"}),
		metadata: Metadata::now(),
	};

	let frame = serde_json::to_value(&request).unwrap();
	assert_eq!(frame["id"], 0);
	assert_eq!(frame["guid"], "page@abc123");
	assert_eq!(frame["method"], "goto");
	assert_eq!(frame["params"]["url"], "https://example.com");
	assert!(frame["metadata"]["wallTime"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_dispatch_response_success() {
	let (connection, _a, _b) = create_test_connection();

	let id = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let (tx, rx) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().insert(
		id,
		PendingCall {
			guid: Arc::from("page@abc"),
			tx,
		},
	);

	let response = Message::Response(Response {
		id,
		result: Some(json!({"status": "ok"})),
		error: None,
	});

	connection.dispatch(response).await.unwrap();

	let result = rx.await.unwrap().unwrap();
	assert_eq!(result["status"], "ok");
}

#[tokio::test]
async fn test_dispatch_response_error() {
	let (connection, _a, _b) = create_test_connection();

	let id = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let (tx, rx) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().insert(
		id,
		PendingCall {
			guid: Arc::from("page@abc"),
			tx,
		},
	);

	let response = Message::Response(Response {
		id,
		result: None,
		error: Some(ErrorWrapper {
			error: ErrorPayload {
				message: "Navigation timeout".to_string(),
				name: Some("TimeoutError".to_string()),
				stack: None,
			},
		}),
	});

	connection.dispatch(response).await.unwrap();

	let err = rx.await.unwrap().unwrap_err();
	assert!(err.is_timeout(), "Expected timeout error, got: {err:?}");
}

#[tokio::test]
async fn test_response_for_unknown_id_dropped() {
	let (connection, _a, _b) = create_test_connection();

	let response = Message::Response(Response {
		id: 999,
		result: Some(json!({})),
		error: None,
	});

	// Must not error: the call may have timed out before the driver answered.
	connection.dispatch(response).await.unwrap();
}

#[test]
fn test_message_deserialization_response() {
	let json = r#"{"id": 42, "result": {"status": "ok"}}"#;
	let message: Message = serde_json::from_str(json).unwrap();

	match message {
		Message::Response(response) => {
			assert_eq!(response.id, 42);
			assert!(response.result.is_some());
			assert!(response.error.is_none());
		}
		_ => panic!("Expected Response"),
	}
}

#[test]
fn test_message_deserialization_event() {
	let json = r#"{"guid": "page@abc", "method": "console", "params": {"text": "hello"}}"#;
	let message: Message = serde_json::from_str(json).unwrap();

	match message {
		Message::Event(event) => {
			assert_eq!(event.guid.as_ref(), "page@abc");
			assert_eq!(event.method, "console");
			assert_eq!(event.params["text"], "hello");
		}
		_ => panic!("Expected Event"),
	}
}

#[test]
fn test_driver_error_parsing() {
	let error = driver_error(ErrorPayload {
		message: "timeout".to_string(),
		name: Some("TimeoutError".to_string()),
		stack: Some("stack trace".to_string()),
	});
	assert!(error.is_timeout());
	match &error {
		Error::Driver {
			name,
			message,
			stack,
		} => {
			assert_eq!(name, "TimeoutError");
			assert_eq!(message, "timeout");
			assert_eq!(stack.as_deref(), Some("stack trace"));
		}
		_ => panic!("Expected Driver error"),
	}
}

#[test]
fn test_driver_error_name_defaults() {
	let error = driver_error(ErrorPayload {
		message: "boom".to_string(),
		name: None,
		stack: None,
	});
	assert_eq!(error.driver_error_name(), Some("Error"));
}

#[tokio::test]
async fn test_close_fails_all_pending_calls() {
	let (connection, _a, _b) = create_test_connection();

	let mut receivers = Vec::new();
	for _ in 0..5 {
		let id = connection.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = tokio::sync::oneshot::channel();
		connection.callbacks.lock().insert(
			id,
			PendingCall {
				guid: Arc::from("page@abc"),
				tx,
			},
		);
		receivers.push(rx);
	}

	connection.close();

	for rx in receivers {
		let err = rx.await.unwrap().unwrap_err();
		assert!(matches!(err, Error::ConnectionClosed), "got: {err:?}");
	}
	assert!(connection.callbacks.lock().is_empty());
}

#[tokio::test]
async fn test_send_after_close_fails_immediately() {
	let (connection, _a, _b) = create_test_connection();

	connection.close();

	let err = Connection::send_message(&connection, "page@abc", "goto", json!({}))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::ConnectionClosed), "got: {err:?}");
}

#[tokio::test]
async fn test_close_is_idempotent() {
	let (connection, _a, _b) = create_test_connection();

	connection.close();
	connection.close();
	assert!(connection.is_closed());
}

#[tokio::test]
async fn test_close_disposes_registered_objects() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);
	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();

	let widget = connection.get_object("widget@1").unwrap();
	connection.close();

	assert!(connection.objects().is_empty());
	// Disposed objects fail event waits with TargetClosed.
	let err = widget
		.events()
		.wait_for("close", None, Duration::from_secs(1))
		.await
		.unwrap_err();
	assert!(err.is_target_closed(), "got: {err:?}");
}

#[tokio::test]
async fn test_fail_calls_for_targets_only_that_guid() {
	let (connection, _a, _b) = create_test_connection();

	let id1 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let (tx1, rx1) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().insert(
		id1,
		PendingCall {
			guid: Arc::from("page@a"),
			tx: tx1,
		},
	);

	let id2 = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let (tx2, rx2) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().insert(
		id2,
		PendingCall {
			guid: Arc::from("page@b"),
			tx: tx2,
		},
	);

	connection.fail_calls_for("page@a");

	let err = rx1.await.unwrap().unwrap_err();
	assert!(err.is_target_closed(), "got: {err:?}");
	drop(rx2);
	assert!(connection.callbacks.lock().contains_key(&id2));
}

#[tokio::test]
async fn test_timeout_removes_pending_entry() {
	let (connection, _a, _b) = create_test_connection();

	let err = Connection::send_message_with_timeout(
		&connection,
		"page@abc",
		"goto",
		json!({}),
		Duration::from_millis(10),
	)
	.await
	.unwrap_err();

	assert!(err.is_timeout(), "got: {err:?}");
	assert!(connection.callbacks.lock().is_empty());
}

#[tokio::test]
async fn test_create_registers_object_under_parent() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	let root = register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();

	let widget = connection.get_object("widget@1").unwrap();
	assert_eq!(widget.type_name(), "Widget");
	assert!(widget.parent().is_some_and(|p| p.guid() == root.guid()));
}

#[tokio::test]
async fn test_create_unknown_type_falls_back_to_bare_object() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "FutureThing", "thing@1"))
		.await
		.unwrap();

	let thing = connection.get_object("thing@1").unwrap();
	assert_eq!(thing.type_name(), "FutureThing");
	assert!(thing.downcast_ref::<BareObject>().is_some());
}

#[tokio::test]
async fn test_create_with_unknown_parent_fails() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	let err = connection
		.dispatch(create_event("nobody@0", "Widget", "widget@1"))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Protocol(_)), "got: {err:?}");
}

#[tokio::test]
async fn test_duplicate_guid_closes_connection() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();
	let err = connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap_err();

	assert!(matches!(err, Error::DuplicateGuid(_)), "got: {err:?}");
	assert!(connection.is_closed());
}

#[tokio::test]
async fn test_dispose_cascades_to_subtree() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();
	connection
		.dispatch(create_event("widget@1", "Gadget", "gadget@1"))
		.await
		.unwrap();
	connection
		.dispatch(create_event("gadget@1", "Gadget", "gadget@2"))
		.await
		.unwrap();

	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@1"),
			method: "__dispose__".to_string(),
			params: Value::Null,
		}))
		.await
		.unwrap();

	assert!(connection.get_object("widget@1").is_err());
	assert!(connection.get_object("gadget@1").is_err());
	assert!(connection.get_object("gadget@2").is_err());
	// The root survives.
	assert!(connection.get_object("").is_ok());
}

#[tokio::test]
async fn test_dispose_gc_reason_marks_collected() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();
	let widget = connection.get_object("widget@1").unwrap();

	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@1"),
			method: "__dispose__".to_string(),
			params: json!({"reason": "gc"}),
		}))
		.await
		.unwrap();

	assert!(widget.was_collected());
}

#[tokio::test]
async fn test_dispose_fails_pending_calls_with_target_closed() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();

	let id = connection.last_id.fetch_add(1, Ordering::SeqCst);
	let (tx, rx) = tokio::sync::oneshot::channel();
	connection.callbacks.lock().insert(
		id,
		PendingCall {
			guid: Arc::from("widget@1"),
			tx,
		},
	);

	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@1"),
			method: "__dispose__".to_string(),
			params: Value::Null,
		}))
		.await
		.unwrap();

	let err = rx.await.unwrap().unwrap_err();
	assert!(err.is_target_closed(), "got: {err:?}");
	match err {
		Error::TargetClosed { guid } => assert_eq!(guid, "widget@1"),
		other => panic!("Expected TargetClosed, got: {other:?}"),
	}
}

#[tokio::test]
async fn test_adopt_reparents_child() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();
	connection
		.dispatch(create_event("", "Widget", "widget@2"))
		.await
		.unwrap();
	connection
		.dispatch(create_event("widget@1", "Gadget", "gadget@1"))
		.await
		.unwrap();

	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@2"),
			method: "__adopt__".to_string(),
			params: json!({"guid": "gadget@1"}),
		}))
		.await
		.unwrap();

	// Disposing the old parent no longer reaches the adopted child.
	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@1"),
			method: "__dispose__".to_string(),
			params: Value::Null,
		}))
		.await
		.unwrap();

	assert!(connection.get_object("gadget@1").is_ok());

	// Disposing the new parent does.
	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("widget@2"),
			method: "__dispose__".to_string(),
			params: Value::Null,
		}))
		.await
		.unwrap();

	assert!(connection.get_object("gadget@1").is_err());
}

#[tokio::test]
async fn test_event_routes_to_object_emitter() {
	let (connection, _a, _b) = create_test_connection();
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	connection
		.dispatch(create_event("", "Widget", "widget@1"))
		.await
		.unwrap();
	let widget = connection.get_object("widget@1").unwrap();

	let received = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&received);
	widget.events().on("console", move |params| {
		sink.lock().push(params);
	});

	for text in ["hello", "world"] {
		connection
			.dispatch(Message::Event(Event {
				guid: Arc::from("widget@1"),
				method: "console".to_string(),
				params: json!({"text": text}),
			}))
			.await
			.unwrap();
	}

	// Delivery order matches dispatch order.
	let seen = received.lock();
	assert_eq!(seen.len(), 2);
	assert_eq!(seen[0]["text"], "hello");
	assert_eq!(seen[1]["text"], "world");
}

#[tokio::test]
async fn test_event_for_unknown_object_dropped() {
	let (connection, _a, _b) = create_test_connection();

	// Must not error: late events can race object disposal.
	connection
		.dispatch(Message::Event(Event {
			guid: Arc::from("ghost@1"),
			method: "console".to_string(),
			params: json!({}),
		}))
		.await
		.unwrap();
}

#[tokio::test]
async fn test_unknown_frame_shape_dropped() {
	let (connection, _a, _b) = create_test_connection();

	connection
		.dispatch(Message::Unknown(json!({"something": "else"})))
		.await
		.unwrap();
}

#[tokio::test]
async fn test_run_resolves_calls_from_wire() {
	let (stdin_read, stdin_write) = duplex(4096);
	let (stdout_read, mut stdout_write) = duplex(4096);

	let (transport, message_rx) = PipeTransport::new(stdin_write, stdout_read);
	let parts = transport.into_transport_parts(message_rx);
	let connection = Arc::new(Connection::new(parts));
	connection.set_factory(Arc::new(TestFactory));
	register_root(&connection);

	let runner = Arc::clone(&connection);
	let run_handle = tokio::spawn(async move { runner.run().await });

	// Echo a response for whatever request comes out.
	let echo = tokio::spawn(async move {
		use tokio::io::{AsyncReadExt, AsyncWriteExt};
		let mut reader = stdin_read;
		let mut len_buf = [0u8; 4];
		reader.read_exact(&mut len_buf).await.unwrap();
		let len = u32::from_le_bytes(len_buf) as usize;
		let mut body = vec![0u8; len];
		reader.read_exact(&mut body).await.unwrap();
		let request: Value = serde_json::from_slice(&body).unwrap();

		let response = serde_json::to_vec(&json!({
			"id": request["id"],
			"result": {"echoed": request["method"]},
		}))
		.unwrap();
		stdout_write
			.write_all(&(response.len() as u32).to_le_bytes())
			.await
			.unwrap();
		stdout_write.write_all(&response).await.unwrap();
		stdout_write.flush().await.unwrap();
		stdout_write
	});

	let result = Connection::send_message(&connection, "", "initialize", json!({}))
		.await
		.unwrap();
	assert_eq!(result["echoed"], "initialize");

	// Dropping the driver side of the pipe tears the connection down.
	drop(echo.await.unwrap());
	run_handle.await.unwrap();
	assert!(connection.is_closed());
}
