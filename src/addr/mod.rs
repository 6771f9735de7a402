//! Address families and the tagged socket address.
//!
//! This module defines the four address families supported:
//! - `Inet`: Internet Protocol version 4
//! - `Inet6`: Internet Protocol version 6
//! - `Unix`: Unix domain sockets (local only)
//! - `Link`: link-layer (packet) addresses
//!
//! [`SocketAddress`] is the runtime union over the family-specific layouts.
//! It converts to and from the raw `sockaddr` buffers the kernel speaks.

mod ipv4;
mod ipv6;
mod link;
mod unix;
pub use self::ipv4::SocketAddrV4;
pub use self::ipv6::SocketAddrV6;
pub use self::link::LinkAddr;
pub use self::unix::{UNIX_PATH_MAX, UnixAddr};

use crate::error::AddressError;

/// Address family of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketDomain {
	Inet,
	Inet6,
	Unix,
	Link,
}

impl SocketDomain {
	/// Returns the libc constant for this address family.
	#[inline]
	pub fn raw(self) -> libc::c_int {
		match self {
			SocketDomain::Inet => libc::AF_INET,
			SocketDomain::Inet6 => libc::AF_INET6,
			SocketDomain::Unix => libc::AF_UNIX,
			SocketDomain::Link => libc::AF_PACKET,
		}
	}

	/// Maps a libc family constant back to a domain.
	pub fn from_raw(family: libc::c_int) -> Option<Self> {
		match family {
			libc::AF_INET => Some(SocketDomain::Inet),
			libc::AF_INET6 => Some(SocketDomain::Inet6),
			libc::AF_UNIX => Some(SocketDomain::Unix),
			libc::AF_PACKET => Some(SocketDomain::Link),
			_ => None,
		}
	}
}

/// Trait for address types that can be converted to raw sockaddr for syscalls.
pub trait ToSockAddr {
	/// Calls the provided closure with a pointer to the raw sockaddr and its size.
	/// Returns None if the address cannot be represented (e.g., path too long for Unix).
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R;
}

/// Trait for address types that can be created from raw sockaddr.
pub trait FromSockAddr: Sized {
	/// Creates address from raw sockaddr storage.
	///
	/// # Safety
	/// `addr` must point to at least `len` readable bytes and the sockaddr
	/// must be of the correct family for this type.
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self>;
}

/// Copies `len` bytes of a raw sockaddr into a zeroed `T`.
///
/// # Safety
/// `addr` must point to at least `len` readable bytes.
pub(crate) unsafe fn copy_sockaddr<T>(addr: *const libc::sockaddr, len: libc::socklen_t) -> T {
	let mut out: T = unsafe { std::mem::zeroed() };
	let n = (len as usize).min(std::mem::size_of::<T>());
	unsafe {
		std::ptr::copy_nonoverlapping(addr as *const u8, &mut out as *mut T as *mut u8, n);
	}
	out
}

/// A socket address of any supported family.
///
/// Every variant holds a fully initialized, family-specific payload.
/// `socklen()` always equals the canonical size of the variant's sockaddr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
	Inet(SocketAddrV4),
	Inet6(SocketAddrV6),
	Unix(UnixAddr),
	Link(LinkAddr),
}

impl SocketAddress {
	/// Builds an address from a raw OS buffer.
	///
	/// Dispatches on the family stored in the buffer. Unknown families fail
	/// with `DomainNotImplemented` and produce nothing.
	///
	/// # Safety
	/// `addr` must point to at least `len` readable bytes.
	pub unsafe fn from_raw(addr: *const libc::sockaddr, len: libc::socklen_t) -> Result<Self, AddressError> {
		if (len as usize) < std::mem::size_of::<libc::sa_family_t>() {
			return Err(AddressError::Truncated { family: libc::AF_UNSPEC, len: len as usize });
		}
		let family = unsafe { (*addr).sa_family } as libc::c_int;
		let truncated = AddressError::Truncated { family, len: len as usize };

		match SocketDomain::from_raw(family) {
			Some(SocketDomain::Inet) => unsafe { SocketAddrV4::from_sockaddr(addr, len) }
				.map(SocketAddress::Inet)
				.ok_or(truncated),
			Some(SocketDomain::Inet6) => unsafe { SocketAddrV6::from_sockaddr(addr, len) }
				.map(SocketAddress::Inet6)
				.ok_or(truncated),
			Some(SocketDomain::Unix) => unsafe { UnixAddr::from_sockaddr(addr, len) }
				.map(SocketAddress::Unix)
				.ok_or(truncated),
			Some(SocketDomain::Link) => unsafe { LinkAddr::from_sockaddr(addr, len) }
				.map(SocketAddress::Link)
				.ok_or(truncated),
			None => Err(AddressError::DomainNotImplemented { family }),
		}
	}

	/// Builds an address from `sockaddr_storage` filled in by the kernel.
	pub fn from_storage(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Result<Self, AddressError> {
		let len = len.min(std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t);
		unsafe { Self::from_raw(storage as *const _ as *const libc::sockaddr, len) }
	}

	/// The "any" address of `domain` with `port` (host order).
	///
	/// Only the internet families have a wildcard address.
	pub fn any(domain: SocketDomain, port: u16) -> Result<Self, AddressError> {
		match domain {
			SocketDomain::Inet => Ok(SocketAddress::Inet(SocketAddrV4::new([0; 4], port))),
			SocketDomain::Inet6 => Ok(SocketAddress::Inet6(SocketAddrV6::new([0; 16], port))),
			SocketDomain::Unix | SocketDomain::Link => {
				Err(AddressError::DomainNotImplemented { family: domain.raw() })
			}
		}
	}

	/// Builds an address from its textual form.
	///
	/// Internet addresses are not validated: text that does not parse yields
	/// the zero address. Unix paths longer than the platform limit fail.
	pub fn parse(text: &str, domain: SocketDomain, port: u16) -> Result<Self, AddressError> {
		match domain {
			SocketDomain::Inet => Ok(SocketAddress::Inet(SocketAddrV4::parse_lossy(text, port))),
			SocketDomain::Inet6 => Ok(SocketAddress::Inet6(SocketAddrV6::parse_lossy(text, port))),
			SocketDomain::Unix => {
				if text.len() >= UNIX_PATH_MAX {
					return Err(AddressError::PathTooLong { len: text.len(), max: UNIX_PATH_MAX - 1 });
				}
				Ok(SocketAddress::Unix(UnixAddr::from_str(text)))
			}
			SocketDomain::Link => Ok(SocketAddress::Link(LinkAddr::parse_lossy(text))),
		}
	}

	/// Returns the address family.
	pub fn domain(&self) -> SocketDomain {
		match self {
			SocketAddress::Inet(_) => SocketDomain::Inet,
			SocketAddress::Inet6(_) => SocketDomain::Inet6,
			SocketAddress::Unix(_) => SocketDomain::Unix,
			SocketAddress::Link(_) => SocketDomain::Link,
		}
	}

	/// Textual rendering: dotted/colon notation for IP, the path for Unix,
	/// `ifname:hh:hh:..` for link-layer.
	pub fn address(&self) -> String {
		match self {
			SocketAddress::Inet(a) => std::net::Ipv4Addr::from(a.ip()).to_string(),
			SocketAddress::Inet6(a) => std::net::Ipv6Addr::from(a.ip()).to_string(),
			SocketAddress::Unix(a) => a.display(),
			SocketAddress::Link(a) => a.display(),
		}
	}

	/// Port in host byte order, for internet families only.
	pub fn port(&self) -> Option<u16> {
		match self {
			SocketAddress::Inet(a) => Some(a.port()),
			SocketAddress::Inet6(a) => Some(a.port()),
			_ => None,
		}
	}

	/// Port exactly as stored in the sockaddr (network byte order).
	pub fn port_be(&self) -> Option<u16> {
		self.port().map(u16::to_be)
	}

	/// Canonical byte size of this variant's sockaddr.
	pub fn socklen(&self) -> libc::socklen_t {
		let size = match self {
			SocketAddress::Inet(_) => std::mem::size_of::<libc::sockaddr_in>(),
			SocketAddress::Inet6(_) => std::mem::size_of::<libc::sockaddr_in6>(),
			SocketAddress::Unix(_) => std::mem::size_of::<libc::sockaddr_un>(),
			SocketAddress::Link(_) => std::mem::size_of::<libc::sockaddr_ll>(),
		};
		size as libc::socklen_t
	}

	/// Writes the raw form into a `sockaddr_storage`.
	pub fn to_storage(&self) -> Option<(libc::sockaddr_storage, libc::socklen_t)> {
		self.with_raw(|ptr, len| {
			let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
			unsafe {
				std::ptr::copy_nonoverlapping(
					ptr as *const u8,
					&mut storage as *mut _ as *mut u8,
					len as usize,
				);
			}
			(storage, len)
		})
	}
}

impl ToSockAddr for SocketAddress {
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		match self {
			SocketAddress::Inet(a) => a.with_raw(f),
			SocketAddress::Inet6(a) => a.with_raw(f),
			SocketAddress::Unix(a) => a.with_raw(f),
			SocketAddress::Link(a) => a.with_raw(f),
		}
	}
}

impl std::fmt::Display for SocketAddress {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SocketAddress::Inet(a) => write!(f, "{}:{}", self.address(), a.port()),
			SocketAddress::Inet6(a) => write!(f, "[{}]:{}", self.address(), a.port()),
			_ => f.write_str(&self.address()),
		}
	}
}

impl From<SocketAddrV4> for SocketAddress {
	fn from(addr: SocketAddrV4) -> Self {
		SocketAddress::Inet(addr)
	}
}

impl From<SocketAddrV6> for SocketAddress {
	fn from(addr: SocketAddrV6) -> Self {
		SocketAddress::Inet6(addr)
	}
}

impl From<UnixAddr> for SocketAddress {
	fn from(addr: UnixAddr) -> Self {
		SocketAddress::Unix(addr)
	}
}

impl From<LinkAddr> for SocketAddress {
	fn from(addr: LinkAddr) -> Self {
		SocketAddress::Link(addr)
	}
}
