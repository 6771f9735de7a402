//! Byte transport seen by a connection.
//!
//! A [`ConnectionQueue`](crate::ConnectionQueue) only ever talks to a
//! `Transport`, so a TLS or other record-layer wrapper can stand in for the
//! plain socket without the queue or server knowing.

use std::os::fd::AsRawFd;
use crate::socket::ConnectedStream;

/// Largest single receive a readiness hint may ask for.
pub const MAX_READ_HINT: usize = 1 << 20;

/// Read/write/cleanup capability set of one connection.
pub trait Transport: AsRawFd + Send {
	/// Reads the next chunk. `Ok(None)` means end-of-stream.
	fn read(&mut self) -> std::io::Result<Option<Vec<u8>>>;

	/// Writes `data`, returning how much was accepted.
	fn write(&mut self, data: &[u8]) -> std::io::Result<usize>;

	/// Cleanup hook run before the descriptor is released.
	///
	/// The descriptor itself is closed when the transport is dropped.
	fn close(&mut self) {}

	/// Reactor hint: `available` bytes are queued on the socket.
	fn set_read_hint(&mut self, _available: usize) {}
}

impl Transport for ConnectedStream {
	fn read(&mut self) -> std::io::Result<Option<Vec<u8>>> {
		ConnectedStream::read(self)
	}

	fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
		ConnectedStream::write(self, data)
	}

	fn set_read_hint(&mut self, available: usize) {
		// One extra byte so a blocking read drains the socket in one call.
		self.set_read_buf_size((available + 1).min(MAX_READ_HINT));
	}
}
