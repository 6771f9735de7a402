use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use parking_lot::Mutex;
use crate::error::{SocketError, errno};
use crate::executor::Executor;
use crate::socket::bytes_available;
use super::{Event, Filter, Managed, Reactor};

const MAX_EVENTS: usize = 64;
const WAKE_TOKEN: u64 = u64::MAX;

const READ_INTEREST: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
const HANGUP: u32 = (libc::EPOLLHUP | libc::EPOLLRDHUP | libc::EPOLLERR) as u32;

/// `epoll`-backed reactor.
///
/// One background thread waits for readiness and hands every event to the
/// executor, so targets never run on the polling thread. Registrations are
/// one-shot (`EPOLLONESHOT`).
pub struct EpollReactor {
	inner: Arc<Inner>,
	thread: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
	epoll: OwnedFd,
	wake: OwnedFd,
	targets: Mutex<HashMap<RawFd, Arc<dyn Managed>>>,
	executor: Arc<dyn Executor>,
	running: AtomicBool,
}

impl EpollReactor {
	/// Creates the epoll instance and starts the polling thread.
	pub fn new(executor: Arc<dyn Executor>) -> std::io::Result<Self> {
		let epoll = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
		if epoll == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}
		let epoll = unsafe { OwnedFd::from_raw_fd(epoll) };

		let wake = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
		if wake == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}
		let wake = unsafe { OwnedFd::from_raw_fd(wake) };

		let mut ev = libc::epoll_event {
			events: libc::EPOLLIN as u32,
			u64: WAKE_TOKEN,
		};
		let rc = unsafe {
			libc::epoll_ctl(epoll.as_raw_fd(), libc::EPOLL_CTL_ADD, wake.as_raw_fd(), &mut ev)
		};
		if rc == -1 {
			return Err(SocketError::SetOption { errno: errno(), option: "EPOLL_CTL_ADD" }.into());
		}

		let inner = Arc::new(Inner {
			epoll,
			wake,
			targets: Mutex::new(HashMap::new()),
			executor,
			running: AtomicBool::new(true),
		});

		let poller = Arc::clone(&inner);
		let thread = std::thread::Builder::new()
			.name("streamlane-reactor".into())
			.spawn(move || poller.run())?;

		tracing::debug!(epoll = inner.epoll.as_raw_fd(), "reactor started");
		Ok(Self {
			inner,
			thread: Mutex::new(Some(thread)),
		})
	}

	/// Number of descriptors currently registered.
	pub fn registered(&self) -> usize {
		self.inner.targets.lock().len()
	}

	/// Stops the polling thread. Pending registrations are dropped.
	pub fn shutdown(&self) {
		if !self.inner.running.swap(false, Ordering::AcqRel) {
			return;
		}
		self.inner.notify();
		if let Some(thread) = self.thread.lock().take() {
			let _ = thread.join();
		}
		self.inner.targets.lock().clear();
		tracing::debug!("reactor stopped");
	}
}

impl Reactor for EpollReactor {
	fn register(&self, target: Arc<dyn Managed>) -> std::io::Result<()> {
		let ident = target.ident();
		let mut targets = self.inner.targets.lock();
		targets.insert(ident, target);

		if let Err(e) = self.inner.arm(ident) {
			targets.remove(&ident);
			return Err(e);
		}
		tracing::trace!(fd = ident, "registered for read");
		Ok(())
	}

	fn unregister(&self, ident: RawFd, _filter: Filter) -> std::io::Result<()> {
		let mut targets = self.inner.targets.lock();
		if targets.remove(&ident).is_none() {
			return Ok(());
		}

		let rc = unsafe {
			libc::epoll_ctl(
				self.inner.epoll.as_raw_fd(),
				libc::EPOLL_CTL_DEL,
				ident,
				std::ptr::null_mut(),
			)
		};
		if rc == -1 {
			let e = errno();
			// Already gone from the interest list.
			if e != libc::ENOENT && e != libc::EBADF {
				return Err(SocketError::SetOption { errno: e, option: "EPOLL_CTL_DEL" }.into());
			}
		}
		tracing::trace!(fd = ident, "unregistered");
		Ok(())
	}
}

impl Drop for EpollReactor {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl Inner {
	fn arm(&self, ident: RawFd) -> std::io::Result<()> {
		let mut ev = libc::epoll_event {
			events: READ_INTEREST,
			u64: ident as u64,
		};
		let epoll = self.epoll.as_raw_fd();

		// A spent one-shot registration stays in the interest list.
		let mut rc = unsafe { libc::epoll_ctl(epoll, libc::EPOLL_CTL_MOD, ident, &mut ev) };
		if rc == -1 && errno() == libc::ENOENT {
			rc = unsafe { libc::epoll_ctl(epoll, libc::EPOLL_CTL_ADD, ident, &mut ev) };
		}
		if rc == -1 {
			return Err(SocketError::SetOption { errno: errno(), option: "EPOLL_CTL_ADD" }.into());
		}
		Ok(())
	}

	fn notify(&self) {
		let one: u64 = 1;
		unsafe {
			libc::write(
				self.wake.as_raw_fd(),
				&one as *const u64 as *const libc::c_void,
				std::mem::size_of::<u64>(),
			);
		}
	}

	fn drain_wake(&self) {
		let mut count: u64 = 0;
		unsafe {
			libc::read(
				self.wake.as_raw_fd(),
				&mut count as *mut u64 as *mut libc::c_void,
				std::mem::size_of::<u64>(),
			);
		}
	}

	fn run(self: Arc<Self>) {
		let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];

		while self.running.load(Ordering::Acquire) {
			let n = unsafe {
				libc::epoll_wait(self.epoll.as_raw_fd(), events.as_mut_ptr(), MAX_EVENTS as libc::c_int, -1)
			};
			if n == -1 {
				let e = errno();
				if e == libc::EINTR {
					continue;
				}
				tracing::error!(errno = e, "epoll_wait failed, reactor exiting");
				return;
			}

			for ev in &events[..n as usize] {
				let token = ev.u64;
				let flags = ev.events;

				if token == WAKE_TOKEN {
					self.drain_wake();
					continue;
				}

				let ident = token as RawFd;
				// A queue unregisters before its descriptor is closed, so the
				// descriptor stays open while its entry is in the map.
				let (target, available) = {
					let targets = self.targets.lock();
					let Some(target) = targets.get(&ident) else {
						continue;
					};
					let borrowed = unsafe { BorrowedFd::borrow_raw(ident) };
					(Arc::clone(target), bytes_available(&borrowed).ok())
				};

				let event = Event {
					ident,
					filter: Filter::Read,
					available,
					hangup: flags & HANGUP != 0,
				};

				self.executor.execute(Box::new(move || target.handle_event(event)));
			}
		}
	}
}
