use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use crate::addr::{SocketAddress, SocketDomain, ToSockAddr};
use crate::error::{SocketError, errno};
use super::bound::BoundSocket;
use super::stream::ConnectedStream;
use super::{SockType, SocketKind};

type AddrCall = unsafe extern "C" fn(libc::c_int, *const libc::sockaddr, libc::socklen_t) -> libc::c_int;

/// A freshly created socket, neither bound nor connected.
///
/// `bind` leads towards a [`Listener`](super::Listener); `connect` yields a
/// [`ConnectedStream`].
pub struct RawSocket {
	fd: OwnedFd,
	kind: SocketKind,
}

impl RawSocket {
	/// `socket(domain, sock_type | SOCK_CLOEXEC, protocol)`.
	pub fn new(domain: SocketDomain, sock_type: SockType, protocol: libc::c_int) -> std::io::Result<Self> {
		let fd = unsafe { libc::socket(domain.raw(), sock_type.raw() | libc::SOCK_CLOEXEC, protocol) };
		if fd == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}

		Ok(Self {
			fd: unsafe { OwnedFd::from_raw_fd(fd) },
			kind: SocketKind { domain, sock_type, protocol },
		})
	}

	pub fn stream(domain: SocketDomain) -> std::io::Result<Self> {
		Self::new(domain, SockType::Stream, 0)
	}

	pub fn kind(&self) -> SocketKind {
		self.kind
	}

	pub fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
		super::options::set_nonblocking(self, nonblocking)
	}

	pub fn bind(self, addr: &SocketAddress) -> std::io::Result<BoundSocket> {
		match self.call_with(addr, libc::bind)? {
			Ok(()) => Ok(BoundSocket::from_fd(self.fd, self.kind)),
			Err(errno) => Err(SocketError::Bind { errno, addr: addr.to_string() }.into()),
		}
	}

	/// Blocking connect. The stream remembers `addr` as its peer.
	pub fn connect(self, addr: &SocketAddress) -> std::io::Result<ConnectedStream> {
		match self.call_with(addr, libc::connect)? {
			Ok(()) => Ok(ConnectedStream::from_fd(self.fd, self.kind).with_peer(addr.clone())),
			Err(errno) => Err(SocketError::Connect { errno, addr: addr.to_string() }.into()),
		}
	}

	/// Runs `call` on the raw form of `addr`. The inner error is the errno.
	fn call_with(&self, addr: &SocketAddress, call: AddrCall) -> std::io::Result<Result<(), i32>> {
		let fd = self.fd.as_raw_fd();
		let rc = addr
			.with_raw(|ptr, len| unsafe { call(fd, ptr, len) })
			.ok_or(SocketError::InvalidAddress { reason: "address too long" })?;

		Ok(if rc == -1 { Err(errno()) } else { Ok(()) })
	}
}

impl AsRawFd for RawSocket {
	fn as_raw_fd(&self) -> RawFd {
		self.fd.as_raw_fd()
	}
}

impl AsFd for RawSocket {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl IntoRawFd for RawSocket {
	fn into_raw_fd(self) -> RawFd {
		self.fd.into_raw_fd()
	}
}
