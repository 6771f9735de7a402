use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::time::Duration;
use crate::addr::SocketAddress;
use crate::error::{IoError, SocketError, errno};
use super::{DEFAULT_READ_BUF_SIZE, SocketKind};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_NOSIGNAL: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_NOSIGNAL: libc::c_int = 0;

/// A connected stream socket.
///
/// Represents an established connection: ready for read/write.
/// Created by Listener::accept() (server) or RawSocket::connect() (client).
/// The descriptor is closed exactly once, when the stream is dropped.
pub struct ConnectedStream {
	fd: OwnedFd,
	kind: SocketKind,
	peer: Option<SocketAddress>,
	read_buf_size: usize,
	recv_flags: libc::c_int,
	send_flags: libc::c_int,
}

impl ConnectedStream {
	pub(crate) fn from_fd(fd: OwnedFd, kind: SocketKind) -> Self {
		Self {
			fd,
			kind,
			peer: None,
			read_buf_size: DEFAULT_READ_BUF_SIZE,
			recv_flags: 0,
			send_flags: 0,
		}
	}

	pub(crate) fn with_peer(mut self, peer: SocketAddress) -> Self {
		self.peer = Some(peer);
		self
	}

	pub fn kind(&self) -> SocketKind {
		self.kind
	}

	/// Peer address captured at accept/connect time.
	pub fn peer(&self) -> Option<&SocketAddress> {
		self.peer.as_ref()
	}

	pub fn read_buf_size(&self) -> usize {
		self.read_buf_size
	}

	/// Size of each receive call made by `read()`.
	pub fn set_read_buf_size(&mut self, size: usize) {
		self.read_buf_size = size.max(1);
	}

	pub fn set_io_flags(&mut self, recv_flags: libc::c_int, send_flags: libc::c_int) {
		self.recv_flags = recv_flags;
		self.send_flags = send_flags;
	}

	pub fn set_blocking(&self, blocking: bool) -> std::io::Result<()> {
		super::options::set_nonblocking(self, !blocking)
	}

	pub fn is_blocking(&self) -> std::io::Result<bool> {
		super::options::is_blocking(self)
	}

	/// Receive timeout at the socket-option level (SO_RCVTIMEO).
	pub fn set_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
		super::options::set_recv_timeout(self, timeout)
	}

	/// Single `recv` into `buf`. Returns 0 at end-of-stream.
	pub fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
		let n = unsafe {
			libc::recv(
				self.fd.as_raw_fd(),
				buf.as_mut_ptr() as *mut libc::c_void,
				buf.len(),
				self.recv_flags,
			)
		};

		if n == -1 {
			Err(IoError::Recv { errno: errno() }.into())
		} else {
			Ok(n as usize)
		}
	}

	/// Reads with the strategy matching the current blocking mode.
	///
	/// `Ok(None)` means the peer closed the connection.
	pub fn read(&self) -> std::io::Result<Option<Vec<u8>>> {
		if self.is_blocking()? {
			self.read_block(self.read_buf_size)
		} else {
			self.read_nonblock(self.read_buf_size)
		}
	}

	/// One receive call for up to `size` bytes.
	pub fn read_block(&self, size: usize) -> std::io::Result<Option<Vec<u8>>> {
		let mut buf = vec![0u8; size.max(1)];
		let n = self.recv(&mut buf)?;
		if n == 0 {
			return Ok(None);
		}
		buf.truncate(n);
		Ok(Some(buf))
	}

	/// Drains the socket in `size`-byte receives until the kernel reports
	/// `EAGAIN`.
	///
	/// Only a zero-byte first receive means end-of-stream; later zero-byte
	/// receives end the drain and the bytes gathered so far are returned.
	/// Any other error discards what was gathered.
	pub fn read_nonblock(&self, size: usize) -> std::io::Result<Option<Vec<u8>>> {
		let mut chunk = vec![0u8; size.max(1)];
		let mut data = Vec::new();
		let mut first = true;

		loop {
			let n = unsafe {
				libc::recv(
					self.fd.as_raw_fd(),
					chunk.as_mut_ptr() as *mut libc::c_void,
					chunk.len(),
					self.recv_flags,
				)
			};

			match n {
				0 if first => return Ok(None),
				0 => break,
				n if n > 0 => {
					data.extend_from_slice(&chunk[..n as usize]);
					first = false;
				}
				_ => {
					let e = errno();
					if e == libc::EAGAIN || e == libc::EWOULDBLOCK {
						break;
					}
					return Err(IoError::Recv { errno: e }.into());
				}
			}
		}

		Ok(Some(data))
	}

	/// Single `send` call. Partial sends are returned, not retried.
	pub fn write(&self, buf: &[u8]) -> std::io::Result<usize> {
		let n = unsafe {
			libc::send(
				self.fd.as_raw_fd(),
				buf.as_ptr() as *const libc::c_void,
				buf.len(),
				self.send_flags | SEND_NOSIGNAL,
			)
		};

		if n == -1 {
			Err(IoError::Send { errno: errno() }.into())
		} else {
			Ok(n as usize)
		}
	}

	/// Sends `header` followed by the whole of `file` without copying the
	/// file through userspace. Returns the total number of bytes sent.
	///
	/// BSD kernels take the header natively in one `sendfile` call.
	#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
	pub fn send_file<F: AsRawFd>(&self, file: &F, header: &[u8]) -> std::io::Result<usize> {
		let mut hdvec = libc::iovec {
			iov_base: header.as_ptr() as *mut libc::c_void,
			iov_len: header.len(),
		};
		let mut hdtr = libc::sf_hdtr {
			headers: &mut hdvec,
			hdr_cnt: 1,
			trailers: std::ptr::null_mut(),
			trl_cnt: 0,
		};

		#[cfg(any(target_os = "macos", target_os = "ios"))]
		let (result, sent) = {
			// 0 means "until end of file"; the kernel writes back the count.
			let mut len: libc::off_t = 0;
			let r = unsafe {
				libc::sendfile(file.as_raw_fd(), self.fd.as_raw_fd(), 0, &mut len, &mut hdtr, 0)
			};
			(r, len)
		};
		#[cfg(target_os = "freebsd")]
		let (result, sent) = {
			let mut sbytes: libc::off_t = 0;
			let r = unsafe {
				libc::sendfile(file.as_raw_fd(), self.fd.as_raw_fd(), 0, 0, &mut hdtr, &mut sbytes, 0)
			};
			(r, sbytes)
		};

		if result == -1 {
			return Err(IoError::Sendfile { errno: errno() }.into());
		}
		Ok(sent as usize)
	}

	/// Sends `header` followed by the whole of `file` without copying the
	/// file through userspace. Returns the total number of bytes sent.
	///
	/// Linux has no header support in `sendfile`, so TCP sockets are corked
	/// around a plain `send` of the header and the file transfer.
	#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
	pub fn send_file<F: AsRawFd>(&self, file: &F, header: &[u8]) -> std::io::Result<usize> {
		let cork = self.kind.is_inet();
		if cork {
			super::options::set_tcp_cork(self, true)?;
		}

		let result = self.write(header).and_then(|sent| Ok(sent + self.transfer_file(file)?));

		if cork {
			super::options::set_tcp_cork(self, false)?;
		}
		result
	}

	#[cfg(not(any(target_os = "macos", target_os = "ios", target_os = "freebsd")))]
	fn transfer_file<F: AsRawFd>(&self, file: &F) -> std::io::Result<usize> {
		let mut stat: libc::stat = unsafe { std::mem::zeroed() };
		if unsafe { libc::fstat(file.as_raw_fd(), &mut stat) } == -1 {
			return Err(IoError::Sendfile { errno: errno() }.into());
		}

		let size = stat.st_size.max(0) as usize;
		let mut offset: libc::off_t = 0;
		let mut sent = 0usize;

		while sent < size {
			let n = unsafe {
				libc::sendfile(self.fd.as_raw_fd(), file.as_raw_fd(), &mut offset, size - sent)
			};
			match n {
				-1 => return Err(IoError::Sendfile { errno: errno() }.into()),
				0 => break,
				n => sent += n as usize,
			}
		}
		Ok(sent)
	}

	/// Returns the remote address of this connection.
	pub fn peer_addr(&self) -> std::io::Result<SocketAddress> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let result = unsafe {
			libc::getpeername(
				self.fd.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
			)
		};
		if result == -1 {
			return Err(SocketError::GetOption { errno: errno(), option: "SO_PEERNAME" }.into());
		}

		Ok(SocketAddress::from_storage(&storage, len)?)
	}

	/// Returns the local address of this connection.
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

	pub fn shutdown(&self, how: Shutdown) -> std::io::Result<()> {
		let how = match how {
			Shutdown::Read => libc::SHUT_RD,
			Shutdown::Write => libc::SHUT_WR,
			Shutdown::ReadWrite => libc::SHUT_RDWR,
		};

		let result = unsafe { libc::shutdown(self.fd.as_raw_fd(), how) };
		if result == -1 {
			Err(SocketError::SetOption { errno: errno(), option: "shutdown" }.into())
		} else {
			Ok(())
		}
	}

	/// Closes the descriptor now.
	pub fn close(self) {
		drop(self);
	}
}

pub enum Shutdown {
	Read,      // SHUT_RD
	Write,     // SHUT_WR
	ReadWrite, // SHUT_RDWR
}

impl std::io::Read for ConnectedStream {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		self.recv(buf)
	}
}

impl std::io::Write for ConnectedStream {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		ConnectedStream::write(self, buf)
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

impl std::fmt::Debug for ConnectedStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConnectedStream")
			.field("fd", &self.fd.as_raw_fd())
			.field("kind", &self.kind)
			.field("peer", &self.peer)
			.finish()
	}
}

impl AsRawFd for ConnectedStream {
	fn as_raw_fd(&self) -> RawFd {
		self.fd.as_raw_fd()
	}
}

impl AsFd for ConnectedStream {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

impl IntoRawFd for ConnectedStream {
	fn into_raw_fd(self) -> RawFd {
		self.fd.into_raw_fd()
	}
}
