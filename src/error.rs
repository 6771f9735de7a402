/// Socket creation/configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
	#[error("socket() failed: {}", errno_to_str(*.errno))]
	Create { errno: i32 },

	#[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
	Bind { errno: i32, addr: String },

	#[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
	Listen { errno: i32, backlog: i32 },

	#[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
	Connect { errno: i32, addr: String },

	#[error("accept() failed: {}", errno_to_str(*.errno))]
	Accept { errno: i32 },

	#[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
	SetOption { errno: i32, option: &'static str },

	#[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
	GetOption { errno: i32, option: &'static str },

	#[error("invalid address: {reason}")]
	InvalidAddress { reason: &'static str },
}

/// I/O operation errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
	#[error("recv() failed: {}", errno_to_str(*.errno))]
	Recv { errno: i32 },

	#[error("send() failed: {}", errno_to_str(*.errno))]
	Send { errno: i32 },

	#[error("sendfile() failed: {}", errno_to_str(*.errno))]
	Sendfile { errno: i32 },

	#[error("connection closed by peer")]
	ConnectionClosed,

	#[error("data handler panicked")]
	HandlerPanicked,
}

/// Address construction errors.
///
/// Construction is all-or-nothing: when one of these is returned no
/// address value exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
	#[error("address family {family} not implemented")]
	DomainNotImplemented { family: i32 },

	#[error("unix path of {len} bytes exceeds the {max} byte limit")]
	PathTooLong { len: usize, max: usize },

	#[error("sockaddr of family {family} truncated to {len} bytes")]
	Truncated { family: i32, len: usize },
}

/// Server lifecycle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
	#[error("server is already running")]
	AlreadyRunning,

	#[error("listening socket has been closed")]
	Closed,
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
	#[cfg(any(target_os = "linux", target_os = "android"))]
	unsafe {
		*libc::__errno_location()
	}
	#[cfg(not(any(target_os = "linux", target_os = "android")))]
	unsafe {
		*libc::__error()
	}
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
	match errno {
		libc::EACCES => "permission denied".into(),
		libc::EADDRINUSE => "address already in use".into(),
		libc::EADDRNOTAVAIL => "address not available".into(),
		libc::EAFNOSUPPORT => "address family not supported".into(),
		libc::EAGAIN => "resource temporarily unavailable".into(),
		libc::EBADF => "bad file descriptor".into(),
		libc::ECONNABORTED => "connection aborted".into(),
		libc::ECONNREFUSED => "connection refused".into(),
		libc::ECONNRESET => "connection reset by peer".into(),
		libc::EINPROGRESS => "operation in progress".into(),
		libc::EINTR => "interrupted by signal".into(),
		libc::EINVAL => "invalid argument".into(),
		libc::EMFILE => "too many open files".into(),
		libc::ENETUNREACH => "network unreachable".into(),
		libc::ENOBUFS => "no buffer space available".into(),
		libc::ENOENT => "no such file or directory".into(),
		libc::ENOTCONN => "not connected".into(),
		libc::ENOTSOCK => "not a socket".into(),
		libc::EPIPE => "broken pipe".into(),
		libc::ETIMEDOUT => "connection timed out".into(),
		_ => format!("errno {}", errno),
	}
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
	match errno {
		libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
		libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
		libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
		libc::EAGAIN => std::io::ErrorKind::WouldBlock,
		libc::ECONNABORTED => std::io::ErrorKind::ConnectionAborted,
		libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
		libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
		libc::EINTR => std::io::ErrorKind::Interrupted,
		libc::EINVAL => std::io::ErrorKind::InvalidInput,
		libc::ENOENT => std::io::ErrorKind::NotFound,
		libc::ENOTCONN => std::io::ErrorKind::NotConnected,
		libc::EPIPE => std::io::ErrorKind::BrokenPipe,
		libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
		_ => std::io::ErrorKind::Other,
	}
}

impl From<SocketError> for std::io::Error {
	fn from(err: SocketError) -> Self {
		let errno = match &err {
			SocketError::Create { errno } => *errno,
			SocketError::Bind { errno, .. } => *errno,
			SocketError::Listen { errno, .. } => *errno,
			SocketError::Connect { errno, .. } => *errno,
			SocketError::Accept { errno } => *errno,
			SocketError::SetOption { errno, .. } => *errno,
			SocketError::GetOption { errno, .. } => *errno,
			SocketError::InvalidAddress { .. } => libc::EINVAL,
		};
		std::io::Error::new(errno_to_kind(errno), err)
	}
}

impl From<IoError> for std::io::Error {
	fn from(err: IoError) -> Self {
		let kind = match &err {
			IoError::Recv { errno } => errno_to_kind(*errno),
			IoError::Send { errno } => errno_to_kind(*errno),
			IoError::Sendfile { errno } => errno_to_kind(*errno),
			IoError::ConnectionClosed => std::io::ErrorKind::ConnectionReset,
			IoError::HandlerPanicked => std::io::ErrorKind::Other,
		};
		std::io::Error::new(kind, err)
	}
}

impl From<AddressError> for std::io::Error {
	fn from(err: AddressError) -> Self {
		let kind = match &err {
			AddressError::DomainNotImplemented { .. } => std::io::ErrorKind::Unsupported,
			AddressError::PathTooLong { .. } | AddressError::Truncated { .. } => {
				std::io::ErrorKind::InvalidInput
			}
		};
		std::io::Error::new(kind, err)
	}
}

impl From<ServerError> for std::io::Error {
	fn from(err: ServerError) -> Self {
		let kind = match err {
			ServerError::AlreadyRunning => std::io::ErrorKind::AlreadyExists,
			ServerError::Closed => std::io::ErrorKind::NotConnected,
		};
		std::io::Error::new(kind, err)
	}
}
