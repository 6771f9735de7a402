mod bound;
mod builder;
mod listener;
mod options;
mod raw;
mod stream;

pub use self::bound::BoundSocket;
pub use self::builder::{ConnectorBuilder, Keepalive, ListenerBuilder, SocketOptions};
pub use self::listener::Listener;
pub use self::options::{
	bytes_available, is_blocking, set_keepalive, set_keepalive_count, set_keepalive_idle,
	set_keepalive_interval, set_linger, set_nonblocking, set_recv_buffer_size, set_recv_timeout,
	set_reuse_addr, set_reuse_port, set_send_buffer_size, set_tcp_cork, set_tcp_nodelay,
};
pub use self::raw::RawSocket;
pub use self::stream::{ConnectedStream, Shutdown};

/// Default size of a single receive call on an accepted connection.
pub const DEFAULT_READ_BUF_SIZE: usize = 4096;

/// Socket type passed to the `socket()` syscall.
///
/// - `Stream`: reliable, ordered byte stream (TCP-like)
/// - `Datagram`: unreliable, unordered packets (UDP-like)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockType {
	Stream,
	Datagram,
}

impl SockType {
	/// Returns the libc constant for this socket type.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			SockType::Stream => libc::SOCK_STREAM,
			SockType::Datagram => libc::SOCK_DGRAM,
		}
	}
}

/// Identity shared by every socket state: family, type and protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketKind {
	pub domain: crate::SocketDomain,
	pub sock_type: SockType,
	pub protocol: libc::c_int,
}

impl SocketKind {
	pub(crate) fn is_inet(&self) -> bool {
		matches!(self.domain, crate::SocketDomain::Inet | crate::SocketDomain::Inet6)
	}
}
