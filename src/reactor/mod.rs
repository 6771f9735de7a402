//! Readiness notification.
//!
//! A [`Reactor`] watches descriptors on behalf of [`Managed`] targets and
//! delivers one [`Event`] per registration. After an event fires the
//! registration is spent; the target must register again to hear about the
//! descriptor a second time.

mod epoll;

use std::os::fd::RawFd;
use std::sync::Arc;

pub use self::epoll::EpollReactor;

/// Direction a registration is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
	Read,
}

/// One readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
	pub ident: RawFd,
	pub filter: Filter,
	/// Bytes queued on the descriptor, when the reactor can tell.
	pub available: Option<usize>,
	/// The peer hung up or the descriptor is in an error state.
	pub hangup: bool,
}

impl Event {
	pub fn readable(ident: RawFd) -> Self {
		Self {
			ident,
			filter: Filter::Read,
			available: None,
			hangup: false,
		}
	}

	pub fn with_available(mut self, available: usize) -> Self {
		self.available = Some(available);
		self
	}

	pub fn with_hangup(mut self) -> Self {
		self.hangup = true;
		self
	}
}

/// Something a reactor can deliver events to.
pub trait Managed: Send + Sync {
	/// Descriptor this target is registered under.
	fn ident(&self) -> RawFd;

	/// Called once per fired registration, off the reactor thread.
	fn handle_event(self: Arc<Self>, event: Event);
}

/// One-shot readiness registration service.
///
/// At most one target is registered per descriptor; registering again for
/// the same descriptor re-arms it.
pub trait Reactor: Send + Sync {
	fn register(&self, target: Arc<dyn Managed>) -> std::io::Result<()>;

	fn unregister(&self, ident: RawFd, filter: Filter) -> std::io::Result<()>;
}
