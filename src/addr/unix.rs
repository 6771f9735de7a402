use std::os::unix::ffi::OsStrExt;
use crate::addr::{FromSockAddr, ToSockAddr, copy_sockaddr};

/// Size of `sun_path` on this platform (108 on Linux, 104 on the BSDs).
pub const UNIX_PATH_MAX: usize =
	std::mem::size_of::<libc::sockaddr_un>() - std::mem::offset_of!(libc::sockaddr_un, sun_path);

/// Unix domain socket address (file path or abstract).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnixAddr {
	path: Vec<u8>,
	/// True if this is an abstract socket (Linux-only, no filesystem entry).
	is_abstract: bool,
}

impl UnixAddr {
	/// Creates a new Unix address from a filesystem path.
	pub fn new<P: AsRef<std::path::Path>>(path: P) -> Self {
		Self {
			path: path.as_ref().as_os_str().as_bytes().to_vec(),
			is_abstract: false,
		}
	}

	/// Creates from a string path.
	pub fn from_str(path: &str) -> Self {
		Self {
			path: path.as_bytes().to_vec(),
			is_abstract: false,
		}
	}

	/// Creates an abstract socket address (Linux-only).
	///
	/// Abstract sockets exist only in memory, with no filesystem entry.
	pub fn abstract_socket<P: AsRef<[u8]>>(name: P) -> Self {
		Self {
			path: name.as_ref().to_vec(),
			is_abstract: true,
		}
	}

	/// Returns true if this is an abstract socket.
	pub fn is_abstract(&self) -> bool {
		self.is_abstract
	}

	/// True for the address of an unbound peer (accepted client sockets).
	pub fn is_unnamed(&self) -> bool {
		self.path.is_empty() && !self.is_abstract
	}

	/// Returns the path bytes.
	pub fn path(&self) -> &[u8] {
		&self.path
	}

	/// Path as text; abstract names are prefixed with `@`.
	pub(crate) fn display(&self) -> String {
		let text = String::from_utf8_lossy(&self.path);
		if self.is_abstract {
			format!("@{}", text)
		} else {
			text.into_owned()
		}
	}

	/// Converts to the raw sockaddr_un for syscalls.
	pub(crate) fn to_raw(&self) -> Option<libc::sockaddr_un> {
		let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
		addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

		// Abstract names start after a leading NUL; filesystem paths need a
		// trailing one.
		let offset = usize::from(self.is_abstract);
		if self.path.len() + 1 > addr.sun_path.len() {
			return None;
		}
		for (i, &byte) in self.path.iter().enumerate() {
			addr.sun_path[i + offset] = byte as libc::c_char;
		}

		Some(addr)
	}

	/// Creates from raw sockaddr_un holding `path_len` bytes of `sun_path`.
	pub(crate) fn from_raw(raw: &libc::sockaddr_un, path_len: usize) -> Self {
		let path_len = path_len.min(raw.sun_path.len());
		let bytes: Vec<u8> = raw.sun_path[..path_len].iter().map(|&c| c as u8).collect();

		if bytes.is_empty() {
			return Self { path: Vec::new(), is_abstract: false };
		}

		if bytes[0] == 0 {
			let mut name = bytes[1..].to_vec();
			while name.last() == Some(&0) {
				name.pop();
			}
			Self { path: name, is_abstract: true }
		} else {
			let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
			Self { path: bytes[..len].to_vec(), is_abstract: false }
		}
	}
}

impl ToSockAddr for UnixAddr {
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		let raw = self.to_raw()?;
		let ptr = &raw as *const _ as *const libc::sockaddr;
		let len = std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
		Some(f(ptr, len))
	}
}

impl FromSockAddr for UnixAddr {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		let header = std::mem::offset_of!(libc::sockaddr_un, sun_path);
		if (len as usize) < std::mem::size_of::<libc::sa_family_t>() {
			return None;
		}
		let raw: libc::sockaddr_un = unsafe { copy_sockaddr(addr, len) };
		Some(Self::from_raw(&raw, (len as usize).saturating_sub(header)))
	}
}
