use std::os::fd::AsRawFd;
use std::time::Duration;
use crate::addr::SocketAddress;
use super::options::{
	set_keepalive, set_keepalive_count, set_keepalive_idle, set_keepalive_interval, set_linger,
	set_recv_buffer_size, set_reuse_addr, set_reuse_port, set_send_buffer_size, set_tcp_nodelay,
};
use super::{ConnectedStream, DEFAULT_READ_BUF_SIZE, Listener, RawSocket, SockType, SocketKind};

/// TCP keep-alive probe timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
	pub idle: Duration,
	pub interval: Duration,
	pub count: u32,
}

impl Default for Keepalive {
	fn default() -> Self {
		Self {
			idle: Duration::from_secs(60),
			interval: Duration::from_secs(10),
			count: 5,
		}
	}
}

/// Options applied between `socket()` and `bind()`/`connect()`.
///
/// Address reuse, Nagle and keep-alive only make sense for internet
/// sockets and are skipped for the other families. Buffer sizes and linger
/// apply everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
	pub reuse_addr: bool,
	pub reuse_port: bool,
	pub nodelay: bool,
	pub keepalive: Option<Keepalive>,
	/// `Some(None)` turns linger off explicitly.
	pub linger: Option<Option<u32>>,
	pub recv_buffer: Option<usize>,
	pub send_buffer: Option<usize>,
}

impl Default for SocketOptions {
	fn default() -> Self {
		Self {
			reuse_addr: true,
			reuse_port: false,
			nodelay: true,
			keepalive: None,
			linger: None,
			recv_buffer: None,
			send_buffer: None,
		}
	}
}

impl SocketOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reuse_addr(mut self, enable: bool) -> Self {
		self.reuse_addr = enable;
		self
	}

	pub fn reuse_port(mut self, enable: bool) -> Self {
		self.reuse_port = enable;
		self
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = enable;
		self
	}

	pub fn keepalive(mut self, keepalive: Keepalive) -> Self {
		self.keepalive = Some(keepalive);
		self
	}

	pub fn linger(mut self, seconds: Option<u32>) -> Self {
		self.linger = Some(seconds);
		self
	}

	pub fn buffers(mut self, recv: usize, send: usize) -> Self {
		self.recv_buffer = Some(recv);
		self.send_buffer = Some(send);
		self
	}

	pub(crate) fn apply<S: AsRawFd>(&self, socket: &S, kind: SocketKind) -> std::io::Result<()> {
		if let Some(size) = self.recv_buffer {
			set_recv_buffer_size(socket, size)?;
		}
		if let Some(size) = self.send_buffer {
			set_send_buffer_size(socket, size)?;
		}
		if let Some(linger) = self.linger {
			set_linger(socket, linger)?;
		}

		if !kind.is_inet() {
			return Ok(());
		}
		if self.reuse_addr {
			set_reuse_addr(socket, true)?;
		}
		if self.reuse_port {
			set_reuse_port(socket, true)?;
		}
		if self.nodelay {
			set_tcp_nodelay(socket, true)?;
		}
		if let Some(keepalive) = self.keepalive {
			set_keepalive(socket, true)?;
			set_keepalive_idle(socket, keepalive.idle.as_secs() as u32)?;
			set_keepalive_interval(socket, keepalive.interval.as_secs() as u32)?;
			set_keepalive_count(socket, keepalive.count)?;
		}
		Ok(())
	}
}

/// Creates, configures, binds and listens in one go.
///
/// ```ignore
/// let listener = ListenerBuilder::new()
///     .backlog(1024)
///     .bind(&SocketAddress::any(SocketDomain::Inet, 8080)?)?;
/// ```
#[derive(Debug, Clone)]
pub struct ListenerBuilder {
	options: SocketOptions,
	backlog: i32,
	protocol: libc::c_int,
	nonblocking: bool,
	read_buf_size: usize,
	recv_flags: libc::c_int,
	send_flags: libc::c_int,
}

impl Default for ListenerBuilder {
	fn default() -> Self {
		Self {
			options: SocketOptions::default(),
			backlog: 128,
			protocol: 0,
			nonblocking: false,
			read_buf_size: DEFAULT_READ_BUF_SIZE,
			recv_flags: 0,
			send_flags: 0,
		}
	}
}

impl ListenerBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn options(mut self, options: SocketOptions) -> Self {
		self.options = options;
		self
	}

	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = backlog;
		self
	}

	pub fn protocol(mut self, protocol: libc::c_int) -> Self {
		self.protocol = protocol;
		self
	}

	/// Non-blocking listening socket. Accepted streams are unaffected.
	pub fn nonblocking(mut self, enable: bool) -> Self {
		self.nonblocking = enable;
		self
	}

	/// Receive size handed to accepted streams.
	pub fn read_buf_size(mut self, size: usize) -> Self {
		self.read_buf_size = size;
		self
	}

	pub fn io_flags(mut self, recv_flags: libc::c_int, send_flags: libc::c_int) -> Self {
		self.recv_flags = recv_flags;
		self.send_flags = send_flags;
		self
	}

	pub fn bind(&self, addr: &SocketAddress) -> std::io::Result<Listener> {
		let socket = RawSocket::new(addr.domain(), SockType::Stream, self.protocol)?;
		self.options.apply(&socket, socket.kind())?;
		if self.nonblocking {
			socket.set_nonblocking(true)?;
		}

		let mut listener = socket.bind(addr)?.listen(self.backlog)?;
		listener.set_read_buf_size(self.read_buf_size);
		listener.set_io_flags(self.recv_flags, self.send_flags);
		tracing::trace!(%addr, backlog = self.backlog, "listening");
		Ok(listener)
	}
}

/// Client side counterpart of [`ListenerBuilder`].
#[derive(Debug, Clone, Default)]
pub struct ConnectorBuilder {
	options: SocketOptions,
	timeout: Option<Duration>,
}

impl ConnectorBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn options(mut self, options: SocketOptions) -> Self {
		self.options = options;
		self
	}

	/// Receive timeout on the connected stream.
	pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn connect(&self, addr: &SocketAddress) -> std::io::Result<ConnectedStream> {
		let socket = RawSocket::stream(addr.domain())?;
		self.options.apply(&socket, socket.kind())?;

		let stream = socket.connect(addr)?;
		if self.timeout.is_some() {
			stream.set_timeout(self.timeout)?;
		}
		Ok(stream)
	}
}
