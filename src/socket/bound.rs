use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use crate::error::{SocketError, errno};
use super::listener::Listener;
use super::{SockType, SocketKind};

/// A socket that has been bound to an address but not yet listening.
///
/// Same structure as RawSocket. Different name = different capabilities.
/// Call `.listen()` to become a Listener.
pub struct BoundSocket {
	fd: OwnedFd,
	kind: SocketKind,
}

impl BoundSocket {
	/// Internal use only - called by RawSocket::bind()
	pub(crate) fn from_fd(fd: OwnedFd, kind: SocketKind) -> Self {
		Self { fd, kind }
	}

	pub fn kind(&self) -> SocketKind {
		self.kind
	}

	/// Transitions to a listening socket.
	///
	/// `backlog`: maximum pending connections queue size.
	/// Only stream sockets can listen.
	pub fn listen(self, backlog: i32) -> std::io::Result<Listener> {
		if self.kind.sock_type != SockType::Stream {
			return Err(SocketError::Listen { errno: libc::EOPNOTSUPP, backlog }.into());
		}

		let result = unsafe { libc::listen(self.fd.as_raw_fd(), backlog) };
		if result == -1 {
			return Err(SocketError::Listen { errno: errno(), backlog }.into());
		}

		Ok(Listener::from_fd(self.fd, self.kind))
	}
}

impl AsRawFd for BoundSocket {
	fn as_raw_fd(&self) -> RawFd {
		self.fd.as_raw_fd()
	}
}

impl AsFd for BoundSocket {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl IntoRawFd for BoundSocket {
	fn into_raw_fd(self) -> RawFd {
		self.fd.into_raw_fd()
	}
}
