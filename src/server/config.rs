use std::time::Duration;
use crate::socket::{ListenerBuilder, SocketOptions};

/// Tunables for a [`StreamServer`](super::StreamServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	/// Concurrent connections admitted before new ones are dropped.
	pub max_guest: usize,
	pub backlog: i32,
	/// Receive size for each read on an accepted connection.
	pub read_buf_size: usize,
	pub recv_flags: libc::c_int,
	pub send_flags: libc::c_int,
	/// Put accepted connections in non-blocking mode.
	pub nonblocking: bool,
	/// Options for the listening socket.
	pub options: SocketOptions,
	/// How often the accept loop looks at its status while idle or suspended.
	pub poll_interval: Duration,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			max_guest: 128,
			backlog: 128,
			read_buf_size: 16 * 1024,
			recv_flags: 0,
			send_flags: 0,
			nonblocking: false,
			options: SocketOptions::default(),
			poll_interval: Duration::from_millis(50),
		}
	}
}

impl ServerConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn max_guest(mut self, max_guest: usize) -> Self {
		self.max_guest = max_guest;
		self
	}

	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = backlog;
		self
	}

	pub fn read_buf_size(mut self, size: usize) -> Self {
		self.read_buf_size = size;
		self
	}

	pub fn io_flags(mut self, recv_flags: libc::c_int, send_flags: libc::c_int) -> Self {
		self.recv_flags = recv_flags;
		self.send_flags = send_flags;
		self
	}

	pub fn nonblocking(mut self, enable: bool) -> Self {
		self.nonblocking = enable;
		self
	}

	pub fn options(mut self, options: SocketOptions) -> Self {
		self.options = options;
		self
	}

	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub(crate) fn listener_builder(&self) -> ListenerBuilder {
		ListenerBuilder::new()
			.options(self.options)
			.backlog(self.backlog)
			.read_buf_size(self.read_buf_size)
			.io_flags(self.recv_flags, self.send_flags)
	}
}
