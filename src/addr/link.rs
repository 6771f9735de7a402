use crate::addr::{FromSockAddr, ToSockAddr, copy_sockaddr};

/// Link-layer (packet socket) address: interface plus hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkAddr {
	ifindex: i32,
	/// Ethernet protocol, host order.
	protocol: u16,
	hatype: u16,
	pkttype: u8,
	halen: u8,
	hwaddr: [u8; 8],
}

impl LinkAddr {
	/// Creates an address for interface `ifindex` with hardware address `hw`.
	///
	/// At most eight bytes of `hw` are kept.
	pub fn new(ifindex: i32, hw: &[u8]) -> Self {
		let mut hwaddr = [0u8; 8];
		let halen = hw.len().min(hwaddr.len());
		hwaddr[..halen].copy_from_slice(&hw[..halen]);
		Self {
			ifindex,
			protocol: 0,
			hatype: 0,
			pkttype: 0,
			halen: halen as u8,
			hwaddr,
		}
	}

	/// Sets the ethernet protocol (host order).
	pub fn with_protocol(mut self, protocol: u16) -> Self {
		self.protocol = protocol;
		self
	}

	/// Parses `ifname`, `ifname:hh:hh:..` or `hh:hh:..`.
	///
	/// Unknown interfaces resolve to index 0 and malformed bytes to 0.
	pub(crate) fn parse_lossy(text: &str) -> Self {
		let mut parts = text.split(':').peekable();
		let first_is_byte = parts
			.peek()
			.is_some_and(|p| !p.is_empty() && p.len() <= 2 && p.chars().all(|c| c.is_ascii_hexdigit()));

		let ifindex = if first_is_byte && text.contains(':') {
			0
		} else {
			parts.next().map(interface_index).unwrap_or(0)
		};

		let hw: Vec<u8> = parts
			.take(8)
			.map(|p| u8::from_str_radix(p, 16).unwrap_or(0))
			.collect();
		Self::new(ifindex, &hw)
	}

	pub fn ifindex(&self) -> i32 {
		self.ifindex
	}

	pub fn protocol(&self) -> u16 {
		self.protocol
	}

	pub fn hatype(&self) -> u16 {
		self.hatype
	}

	pub fn pkttype(&self) -> u8 {
		self.pkttype
	}

	/// Returns the hardware address bytes.
	pub fn hwaddr(&self) -> &[u8] {
		&self.hwaddr[..self.halen as usize]
	}

	/// `ifname:hh:hh:..`, dropping whichever half is absent.
	pub(crate) fn display(&self) -> String {
		let name = interface_name(self.ifindex).unwrap_or_default();
		let hw: Vec<String> = self.hwaddr().iter().map(|b| format!("{:02x}", b)).collect();
		match (name.is_empty(), hw.is_empty()) {
			(_, true) => name,
			(true, false) => hw.join(":"),
			(false, false) => format!("{}:{}", name, hw.join(":")),
		}
	}

	pub(crate) fn to_raw(&self) -> libc::sockaddr_ll {
		let mut raw: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
		raw.sll_family = libc::AF_PACKET as libc::c_ushort;
		raw.sll_protocol = self.protocol.to_be();
		raw.sll_ifindex = self.ifindex;
		raw.sll_hatype = self.hatype;
		raw.sll_pkttype = self.pkttype;
		raw.sll_halen = self.halen;
		raw.sll_addr = self.hwaddr;
		raw
	}

	pub(crate) fn from_raw(raw: &libc::sockaddr_ll) -> Self {
		Self {
			ifindex: raw.sll_ifindex,
			protocol: u16::from_be(raw.sll_protocol),
			hatype: raw.sll_hatype,
			pkttype: raw.sll_pkttype,
			halen: raw.sll_halen.min(8),
			hwaddr: raw.sll_addr,
		}
	}
}

fn interface_index(name: &str) -> i32 {
	let Ok(name) = std::ffi::CString::new(name) else {
		return 0;
	};
	unsafe { libc::if_nametoindex(name.as_ptr()) as i32 }
}

fn interface_name(index: i32) -> Option<String> {
	if index <= 0 {
		return None;
	}
	let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
	let ptr = unsafe { libc::if_indextoname(index as libc::c_uint, buf.as_mut_ptr()) };
	if ptr.is_null() {
		return None;
	}
	let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
	Some(name.to_string_lossy().into_owned())
}

impl ToSockAddr for LinkAddr {
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		let raw = self.to_raw();
		let ptr = &raw as *const _ as *const libc::sockaddr;
		let len = std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
		Some(f(ptr, len))
	}
}

impl FromSockAddr for LinkAddr {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		// The kernel trims the address to `sll_halen` bytes.
		let header = std::mem::offset_of!(libc::sockaddr_ll, sll_addr);
		if (len as usize) < header {
			return None;
		}
		let mut raw: libc::sockaddr_ll = unsafe { copy_sockaddr(addr, len) };
		let present = (len as usize - header).min(raw.sll_addr.len());
		raw.sll_halen = raw.sll_halen.min(present as u8);
		Some(Self::from_raw(&raw))
	}
}
