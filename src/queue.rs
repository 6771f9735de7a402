//! Per-connection read/dispatch/re-arm cycle.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use parking_lot::Mutex;
use crate::addr::SocketAddress;
use crate::error::IoError;
use crate::executor::Executor;
use crate::reactor::{Event, Filter, Managed, Reactor};
use crate::transport::Transport;

/// Application data handler. Returning `false` ends the connection, and so
/// does a panic.
pub type DataHandler = Arc<dyn Fn(&ConnectionQueue, &[u8]) -> bool + Send + Sync>;

/// Receives every error raised by a server or one of its connections.
pub type ErrorHook = Arc<dyn Fn(ErrorSource, &std::io::Error) + Send + Sync>;

type Completion = Box<dyn FnOnce(&ConnectionQueue) + Send>;

/// Where a reported error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
	Server,
	Connection(RawFd),
}

/// Lifecycle of a [`ConnectionQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueState {
	/// Built, not yet handed to the reactor.
	Idle = 0,
	/// Waiting for the reactor to report readiness.
	Registered = 1,
	/// An event is being processed.
	Dispatching = 2,
	/// Torn down. Terminal.
	Terminated = 3,
}

impl QueueState {
	fn from_u8(value: u8) -> Self {
		match value {
			0 => QueueState::Idle,
			1 => QueueState::Registered,
			2 => QueueState::Dispatching,
			_ => QueueState::Terminated,
		}
	}
}

/// True for errors after which the connection can keep going.
pub fn is_recoverable(err: &std::io::Error) -> bool {
	matches!(
		err.kind(),
		std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
	)
}

/// Binds one connected transport to a reactor.
///
/// Each readiness event triggers exactly one read. Data goes to the
/// handler; end-of-stream, a `false` from the handler or an unrecoverable
/// error tears the connection down. Teardown runs the transport's cleanup
/// hook, unregisters the descriptor and closes it, then fires the
/// completion callback. All of that happens once no matter how many paths
/// ask for it.
pub struct ConnectionQueue {
	ident: RawFd,
	peer: Option<SocketAddress>,
	transport: Mutex<Option<Box<dyn Transport>>>,
	handler: DataHandler,
	error_hook: Option<ErrorHook>,
	reactor: Arc<dyn Reactor>,
	executor: Arc<dyn Executor>,
	state: AtomicU8,
	completion: Mutex<Option<Completion>>,
}

impl ConnectionQueue {
	pub fn new(
		transport: Box<dyn Transport>,
		handler: DataHandler,
		reactor: Arc<dyn Reactor>,
		executor: Arc<dyn Executor>,
	) -> Self {
		Self {
			ident: transport.as_raw_fd(),
			peer: None,
			transport: Mutex::new(Some(transport)),
			handler,
			error_hook: None,
			reactor,
			executor,
			state: AtomicU8::new(QueueState::Idle as u8),
			completion: Mutex::new(None),
		}
	}

	pub fn with_peer(mut self, peer: SocketAddress) -> Self {
		self.peer = Some(peer);
		self
	}

	pub fn with_error_hook(mut self, hook: Option<ErrorHook>) -> Self {
		self.error_hook = hook;
		self
	}

	/// Runs `f` once, after the connection has been torn down.
	pub fn on_terminate<F>(self, f: F) -> Self
	where
		F: FnOnce(&ConnectionQueue) + Send + 'static,
	{
		*self.completion.lock() = Some(Box::new(f));
		self
	}

	/// Registers with the reactor.
	///
	/// If registration fails the connection is torn down before the error is
	/// returned, so the completion callback has already run.
	pub fn start(self) -> std::io::Result<Arc<Self>> {
		let queue = Arc::new(self);
		queue.state.store(QueueState::Registered as u8, Ordering::Release);

		if let Err(e) = queue.reactor.register(Arc::clone(&queue) as Arc<dyn Managed>) {
			queue.report(&e);
			queue.terminate();
			return Err(e);
		}
		tracing::debug!(fd = queue.ident, peer = ?queue.peer, "connection registered");
		Ok(queue)
	}

	pub fn ident(&self) -> RawFd {
		self.ident
	}

	pub fn peer_address(&self) -> Option<&SocketAddress> {
		self.peer.as_ref()
	}

	pub fn state(&self) -> QueueState {
		QueueState::from_u8(self.state.load(Ordering::Acquire))
	}

	pub fn is_terminated(&self) -> bool {
		self.state() == QueueState::Terminated
	}

	/// Writes through the transport. Safe to call from inside the handler.
	pub fn write(&self, data: &[u8]) -> std::io::Result<usize> {
		match self.transport.lock().as_mut() {
			Some(transport) => transport.write(data),
			None => Err(IoError::ConnectionClosed.into()),
		}
	}

	/// Tears the connection down. Later calls do nothing.
	pub fn terminate(&self) {
		let previous = self.state.swap(QueueState::Terminated as u8, Ordering::AcqRel);
		if previous == QueueState::Terminated as u8 {
			return;
		}

		let transport = self.transport.lock().take();
		if let Some(mut transport) = transport {
			transport.close();
			if let Err(e) = self.reactor.unregister(self.ident, Filter::Read) {
				self.report(&e);
			}
			drop(transport);
		}
		tracing::debug!(fd = self.ident, "connection terminated");

		let completion = self.completion.lock().take();
		if let Some(completion) = completion {
			completion(self);
		}
	}

	fn rearm(self: Arc<Self>) {
		if self
			.state
			.compare_exchange(
				QueueState::Dispatching as u8,
				QueueState::Registered as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.is_err()
		{
			return;
		}

		let queue = Arc::clone(&self);
		self.executor.execute(Box::new(move || {
			// Registration happens under the transport lock, so it either
			// precedes teardown's unregister or sees the transport gone. The
			// descriptor number cannot be reused in between.
			let registered = {
				let transport = queue.transport.lock();
				if transport.is_none() {
					return;
				}
				queue.reactor.register(Arc::clone(&queue) as Arc<dyn Managed>)
			};
			if let Err(e) = registered {
				queue.report(&e);
				queue.terminate();
			}
		}));
	}

	fn dispatch(&self, data: &[u8]) -> bool {
		match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(self, data))) {
			Ok(keep) => keep,
			Err(_) => {
				tracing::error!(fd = self.ident, "data handler panicked");
				self.report(&IoError::HandlerPanicked.into());
				false
			}
		}
	}

	fn report(&self, err: &std::io::Error) {
		match &self.error_hook {
			Some(hook) => hook(ErrorSource::Connection(self.ident), err),
			None => tracing::warn!(fd = self.ident, error = %err, "connection error"),
		}
	}
}

impl Managed for ConnectionQueue {
	fn ident(&self) -> RawFd {
		self.ident
	}

	fn handle_event(self: Arc<Self>, event: Event) {
		if self
			.state
			.compare_exchange(
				QueueState::Registered as u8,
				QueueState::Dispatching as u8,
				Ordering::AcqRel,
				Ordering::Acquire,
			)
			.is_err()
		{
			tracing::trace!(fd = self.ident, state = ?self.state(), "event ignored");
			return;
		}

		let outcome = {
			let mut guard = self.transport.lock();
			let Some(transport) = guard.as_mut() else {
				return;
			};
			if let Some(available) = event.available {
				transport.set_read_hint(available);
			}
			transport.read()
		};

		match outcome {
			Ok(None) => {
				tracing::debug!(fd = self.ident, "peer closed");
				self.terminate();
			}
			Ok(Some(data)) if data.is_empty() => {
				if event.hangup {
					tracing::debug!(fd = self.ident, "hangup with nothing left to read");
					self.terminate();
				} else {
					// Spurious wakeup on a non-blocking socket.
					self.rearm();
				}
			}
			Ok(Some(data)) => {
				tracing::trace!(fd = self.ident, len = data.len(), "dispatching data");
				if self.dispatch(&data) {
					self.rearm();
				} else {
					self.terminate();
				}
			}
			Err(e) => {
				self.report(&e);
				if is_recoverable(&e) {
					self.rearm();
				} else {
					self.terminate();
				}
			}
		}
	}
}

impl fmt::Debug for ConnectionQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConnectionQueue")
			.field("ident", &self.ident)
			.field("peer", &self.peer)
			.field("state", &self.state())
			.finish()
	}
}
