//! Framed transport to the driver process.
//!
//! The driver speaks length-prefixed JSON over a duplex byte stream: each
//! frame is a `u32` little-endian byte length followed by the JSON body.
//! The transport splits into a sender half (serializes and writes frames)
//! and a receiver half (a single reader loop that decodes frames and pushes
//! them, in arrival order, into an mpsc channel drained by the connection).
//!
//! Exactly one reader owns the stream at any time, which is what preserves
//! the dispatcher's arrival-order guarantee. When the stream closes or the
//! reader hits an I/O error, the loop exits and drops the channel sender;
//! the connection observes the closed channel and fails all pending calls.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

#[cfg(test)]
mod tests;

/// Object-safe sender half used by the connection's writer task.
pub trait Transport: Send {
	/// Serializes and writes one frame.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Object-safe receiver half; `run` consumes the reader loop.
pub trait TransportReceiver: Send {
	/// Runs the single-reader loop until the stream closes or errors.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Bundle handed to the connection: both halves plus the decoded-frame
/// channel the receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

/// Length-prefixed JSON transport over a pair of byte streams, typically
/// the driver process's stdin/stdout pipes.
pub struct PipeTransport<W, R> {
	sender: PipeTransportSender<W>,
	receiver: PipeTransportReceiver<R>,
}

impl<W, R> PipeTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport over `writer`/`reader` and returns the channel
	/// decoded frames are delivered on.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (frames_tx, frames_rx) = mpsc::unbounded_channel();
		let transport = Self {
			sender: PipeTransportSender { writer },
			receiver: PipeTransportReceiver { reader, frames_tx },
		};
		(transport, frames_rx)
	}

	/// Splits into the sender and receiver halves.
	pub fn into_parts(self) -> (PipeTransportSender<W>, PipeTransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	/// Boxes both halves together with the frame channel for the connection.
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		let (sender, receiver) = self.into_parts();
		TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		}
	}

	/// Runs the reader loop in place. Convenience for tests and callers that
	/// do not split the transport.
	pub async fn run(&mut self) -> Result<()> {
		self.receiver.run().await
	}
}

/// Writer half of a [`PipeTransport`].
pub struct PipeTransportSender<W> {
	writer: W,
}

impl<W: AsyncWrite + Unpin + Send + 'static> PipeTransportSender<W> {
	/// Writes one frame: `u32` little-endian length, then the JSON body.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		let body = serde_json::to_vec(&message)?;
		let len = u32::try_from(body.len())
			.map_err(|_| Error::Transport(format!("frame too large: {} bytes", body.len())))?;
		self.writer.write_all(&len.to_le_bytes()).await?;
		self.writer.write_all(&body).await?;
		self.writer.flush().await?;
		Ok(())
	}
}

impl<W: AsyncWrite + Unpin + Send + 'static> Transport for PipeTransportSender<W> {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(PipeTransportSender::send(self, message))
	}
}

/// Reader half of a [`PipeTransport`]; owns the stream while running.
pub struct PipeTransportReceiver<R> {
	reader: R,
	frames_tx: mpsc::UnboundedSender<Value>,
}

impl<R: AsyncRead + Unpin + Send + 'static> PipeTransportReceiver<R> {
	/// Reads frames until EOF, an I/O error, or the frame channel is
	/// dropped. Frames that fail to decode as JSON are logged and skipped;
	/// a truncated prefix or body is a transport error.
	pub async fn run(&mut self) -> Result<()> {
		loop {
			let mut len_buf = [0u8; 4];
			self.reader
				.read_exact(&mut len_buf)
				.await
				.map_err(|e| Error::Transport(format!("Failed to read length prefix: {e}")))?;
			let len = u32::from_le_bytes(len_buf) as usize;

			let mut body = vec![0u8; len];
			self.reader
				.read_exact(&mut body)
				.await
				.map_err(|e| Error::Transport(format!("Failed to read frame body: {e}")))?;

			match serde_json::from_slice::<Value>(&body) {
				Ok(frame) => {
					if self.frames_tx.send(frame).is_err() {
						tracing::debug!("frame receiver dropped, stopping transport reader");
						return Ok(());
					}
				}
				Err(e) => {
					tracing::warn!(error = %e, len, "dropping undecodable frame");
				}
			}
		}
	}
}

impl<R: AsyncRead + Unpin + Send + 'static> TransportReceiver for PipeTransportReceiver<R> {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move { PipeTransportReceiver::run(&mut self).await })
	}
}
