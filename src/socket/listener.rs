use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use crate::addr::SocketAddress;
use crate::error::{SocketError, errno};
use super::stream::ConnectedStream;
use super::{DEFAULT_READ_BUF_SIZE, SocketKind};

/// A listening socket ready to accept connections.
///
/// Only exists for Stream sockets: you cannot listen on datagrams.
#[derive(Debug)]
pub struct Listener {
	fd: OwnedFd,
	kind: SocketKind,
	read_buf_size: usize,
	recv_flags: libc::c_int,
	send_flags: libc::c_int,
}

impl Listener {
	/// Internal use only: called by BoundSocket::listen()
	pub(crate) fn from_fd(fd: OwnedFd, kind: SocketKind) -> Self {
		Self {
			fd,
			kind,
			read_buf_size: DEFAULT_READ_BUF_SIZE,
			recv_flags: 0,
			send_flags: 0,
		}
	}

	pub fn kind(&self) -> SocketKind {
		self.kind
	}

	/// Receive size handed to every accepted stream.
	pub fn set_read_buf_size(&mut self, size: usize) {
		self.read_buf_size = size.max(1);
	}

	/// `recv`/`send` flag bits handed to every accepted stream.
	pub fn set_io_flags(&mut self, recv_flags: libc::c_int, send_flags: libc::c_int) {
		self.recv_flags = recv_flags;
		self.send_flags = send_flags;
	}

	/// Accepts a connection, returning the stream and the client's address.
	///
	/// Blocks unless the listener is non-blocking. If the peer address cannot
	/// be decoded the new descriptor is closed and the error returned.
	pub fn accept(&self) -> std::io::Result<(ConnectedStream, SocketAddress)> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let fd = unsafe {
			libc::accept4(
				self.fd.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
				libc::SOCK_CLOEXEC,
			)
		};

		if fd == -1 {
			return Err(SocketError::Accept { errno: errno() }.into());
		}

		let fd = unsafe { OwnedFd::from_raw_fd(fd) };
		let addr = SocketAddress::from_storage(&storage, len)?;

		let mut stream = ConnectedStream::from_fd(fd, self.kind).with_peer(addr.clone());
		stream.set_read_buf_size(self.read_buf_size);
		stream.set_io_flags(self.recv_flags, self.send_flags);
		Ok((stream, addr))
	}

	/// Sets or clears the `O_NONBLOCK` flag on the listener socket.
	pub fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
		super::options::set_nonblocking(self, nonblocking)
	}

	pub fn is_blocking(&self) -> std::io::Result<bool> {
		super::options::is_blocking(self)
	}

	/// Returns the bound local address.
	pub fn local_addr(&self) -> std::io::Result<SocketAddress> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let result = unsafe {
			libc::getsockname(
				self.fd.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
			)
		};
		if result == -1 {
			return Err(SocketError::GetOption { errno: errno(), option: "SO_SOCKNAME" }.into());
		}

		Ok(SocketAddress::from_storage(&storage, len)?)
	}

	/// Waits up to `timeout` for a pending connection.
	///
	/// Returns true when `accept()` would not block (or the listener was shut down).
	pub fn wait_readable(&self, timeout: std::time::Duration) -> std::io::Result<bool> {
		let mut pfd = libc::pollfd {
			fd: self.fd.as_raw_fd(),
			events: libc::POLLIN,
			revents: 0,
		};
		let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

		let n = unsafe { libc::poll(&mut pfd, 1, millis) };
		match n {
			-1 if errno() == libc::EINTR => Ok(false),
			-1 => Err(SocketError::Accept { errno: errno() }.into()),
			0 => Ok(false),
			_ => Ok(true),
		}
	}

	/// Stops accepting: a thread blocked in `accept()` wakes with an error.
	///
	/// The descriptor stays open until the listener is dropped.
	pub fn shutdown(&self) -> std::io::Result<()> {
		let result = unsafe { libc::shutdown(self.fd.as_raw_fd(), libc::SHUT_RDWR) };
		if result == -1 {
			Err(SocketError::SetOption { errno: errno(), option: "shutdown" }.into())
		} else {
			Ok(())
		}
	}
}

impl AsRawFd for Listener {
	fn as_raw_fd(&self) -> RawFd {
		self.fd.as_raw_fd()
	}
}

impl AsFd for Listener {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl IntoRawFd for Listener {
	fn into_raw_fd(self) -> RawFd {
		self.fd.into_raw_fd()
	}
}
