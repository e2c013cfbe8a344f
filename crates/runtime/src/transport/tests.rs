use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;

#[test]
fn length_prefix_is_little_endian() {
	let length: u32 = 1234;
	let bytes = length.to_le_bytes();

	assert_eq!(bytes[0], (length & 0xFF) as u8);
	assert_eq!(bytes[1], ((length >> 8) & 0xFF) as u8);
	assert_eq!(bytes[2], ((length >> 16) & 0xFF) as u8);
	assert_eq!(bytes[3], ((length >> 24) & 0xFF) as u8);

	assert_eq!(u32::from_le_bytes(bytes), length);
}

#[tokio::test]
async fn send_writes_prefix_then_body() {
	let (stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, _stdout_write) = tokio::io::duplex(1024);

	let (transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	let (mut sender, _receiver) = transport.into_parts();

	let message = serde_json::json!({
		"id": 1,
		"method": "test",
		"params": {"foo": "bar"}
	});
	sender.send(message.clone()).await.unwrap();

	let (mut read_half, _write_half) = tokio::io::split(stdin_read);
	let mut len_buf = [0u8; 4];
	read_half.read_exact(&mut len_buf).await.unwrap();
	let length = u32::from_le_bytes(len_buf) as usize;

	let mut body = vec![0u8; length];
	read_half.read_exact(&mut body).await.unwrap();

	let received: serde_json::Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(received, message);
}

#[tokio::test]
async fn frames_arrive_in_order() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(4096);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(4096);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let messages = vec![
		serde_json::json!({"id": 1, "method": "first"}),
		serde_json::json!({"id": 2, "method": "second"}),
		serde_json::json!({"id": 3, "method": "third"}),
	];

	for msg in &messages {
		let body = serde_json::to_vec(msg).unwrap();
		stdout_write.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
		stdout_write.write_all(&body).await.unwrap();
	}
	stdout_write.flush().await.unwrap();

	for expected in &messages {
		let received = rx.recv().await.unwrap();
		assert_eq!(&received, expected);
	}

	drop(stdout_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn large_frame_round_trips() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024 * 1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024 * 1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let message = serde_json::json!({
		"id": 1,
		"data": "x".repeat(100_000)
	});
	let body = serde_json::to_vec(&message).unwrap();
	assert!(body.len() > 32_768, "test frame should exceed a pipe buffer");

	stdout_write.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
	stdout_write.write_all(&body).await.unwrap();
	stdout_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received, message);

	drop(stdout_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn truncated_length_prefix_is_an_error() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(stdin_write, stdout_read);

	// Two bytes instead of four, then EOF.
	stdout_write.write_all(&[0x01, 0x02]).await.unwrap();
	stdout_write.flush().await.unwrap();
	drop(stdout_write);

	let result = transport.run().await;
	assert!(result.is_err());
	assert!(
		result.unwrap_err().to_string().contains("Failed to read length prefix")
	);
}

#[tokio::test]
async fn undecodable_body_is_dropped_not_fatal() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	// Garbage frame followed by a valid one.
	let garbage = b"not json at all";
	stdout_write.write_all(&(garbage.len() as u32).to_le_bytes()).await.unwrap();
	stdout_write.write_all(garbage).await.unwrap();

	let message = serde_json::json!({"id": 7, "method": "after"});
	let body = serde_json::to_vec(&message).unwrap();
	stdout_write.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
	stdout_write.write_all(&body).await.unwrap();
	stdout_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received, message);

	drop(stdout_write);
	drop(rx);
	let _ = read_task.await;
}

#[tokio::test]
async fn broken_pipe_ends_the_loop() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, stdout_write) = tokio::io::duplex(1024);

	let (mut transport, _rx) = PipeTransport::new(stdin_write, stdout_read);
	drop(stdout_write);

	let read_task = tokio::spawn(async move { transport.run().await });
	let result = read_task.await.unwrap();
	assert!(result.is_err());
}

#[tokio::test]
async fn dropping_receiver_stops_reader_cleanly() {
	let (_stdin_read, stdin_write) = tokio::io::duplex(1024);
	let (stdout_read, mut stdout_write) = tokio::io::duplex(1024);

	let (mut transport, mut rx) = PipeTransport::new(stdin_write, stdout_read);
	let read_task = tokio::spawn(async move { transport.run().await });

	let message = serde_json::json!({"id": 1, "method": "test"});
	let body = serde_json::to_vec(&message).unwrap();
	stdout_write.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
	stdout_write.write_all(&body).await.unwrap();
	stdout_write.flush().await.unwrap();

	let received = rx.recv().await.unwrap();
	assert_eq!(received, message);

	// Connection side going away: next delivered frame hits a closed
	// channel and the loop exits without error.
	drop(rx);
	let body = serde_json::to_vec(&message).unwrap();
	stdout_write.write_all(&(body.len() as u32).to_le_bytes()).await.unwrap();
	stdout_write.write_all(&body).await.unwrap();
	stdout_write.flush().await.unwrap();

	let result = read_task.await.unwrap();
	assert!(result.is_ok());
}
