//! Accept loop, admission control and lifecycle.

mod config;

use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use parking_lot::Mutex;
use crate::addr::SocketAddress;
use crate::error::ServerError;
use crate::executor::Executor;
use crate::queue::{ConnectionQueue, DataHandler, ErrorHook, ErrorSource};
use crate::reactor::Reactor;
use crate::socket::{ConnectedStream, Listener};

pub use self::config::ServerConfig;

/// Lifecycle status of a [`StreamServer`].
///
/// ```text
/// Idle --start--> Running <--suspend/resume--> Suspended
/// Running | Suspended --stop--> ShouldTerminate --loop exit--> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
	Idle,
	Running,
	Suspended,
	ShouldTerminate,
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Status::Idle => "idle",
			Status::Running => "running",
			Status::Suspended => "suspended",
			Status::ShouldTerminate => "should-terminate",
		};
		f.write_str(name)
	}
}

/// Lifecycle hooks. Every method has a no-op default.
pub trait ServerDelegate: Send + Sync {
	/// Last chance to refuse an admitted connection. Returning `false` closes it.
	fn should_connect(&self, _server: &StreamServer, _stream: &ConnectedStream, _peer: &SocketAddress) -> bool {
		true
	}

	fn did_disconnect(&self, _server: &StreamServer, _ident: RawFd) {}

	fn did_change_status(&self, _server: &StreamServer, _status: Status) {}

	/// Runs once when the accept loop has exited and the listener is closed.
	fn did_kill(&self, _server: &StreamServer) {}
}

/// Event-driven stream server.
///
/// The accept loop runs on its own thread (see [`start`](Self::start)) or on
/// the caller's (see [`run`](Self::run)). Every admitted connection becomes a
/// [`ConnectionQueue`] started on the operate executor. When `max_guest`
/// connections are live, new ones are accepted and closed at once.
pub struct StreamServer {
	config: ServerConfig,
	local_addr: SocketAddress,
	listener: Mutex<Option<Arc<Listener>>>,
	status: Mutex<Status>,
	live: AtomicUsize,
	rejected: AtomicUsize,
	handler: DataHandler,
	error_hook: Option<ErrorHook>,
	delegate: Option<Arc<dyn ServerDelegate>>,
	reactor: Arc<dyn Reactor>,
	executor: Arc<dyn Executor>,
	accept_thread: Mutex<Option<JoinHandle<()>>>,
}

impl StreamServer {
	/// Binds and listens on `addr`. The accept loop does not run until
	/// [`start`](Self::start) or [`run`](Self::run).
	pub fn bind(
		addr: &SocketAddress,
		config: ServerConfig,
		handler: DataHandler,
		reactor: Arc<dyn Reactor>,
		executor: Arc<dyn Executor>,
	) -> std::io::Result<Self> {
		let listener = config.listener_builder().bind(addr)?;
		let local_addr = listener.local_addr().unwrap_or_else(|_| addr.clone());

		tracing::info!(addr = %local_addr, max_guest = config.max_guest, "server listening");

		Ok(Self {
			config,
			local_addr,
			listener: Mutex::new(Some(Arc::new(listener))),
			status: Mutex::new(Status::Idle),
			live: AtomicUsize::new(0),
			rejected: AtomicUsize::new(0),
			handler,
			error_hook: None,
			delegate: None,
			reactor,
			executor,
			accept_thread: Mutex::new(None),
		})
	}

	pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
		self.error_hook = Some(hook);
		self
	}

	pub fn with_delegate(mut self, delegate: Arc<dyn ServerDelegate>) -> Self {
		self.delegate = Some(delegate);
		self
	}

	/// Address the listener is bound to, with the kernel-chosen port filled in.
	pub fn local_addr(&self) -> &SocketAddress {
		&self.local_addr
	}

	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	pub fn status(&self) -> Status {
		*self.status.lock()
	}

	/// Connections admitted and not yet torn down.
	pub fn live_connections(&self) -> usize {
		self.live.load(Ordering::Acquire)
	}

	/// Connections dropped because `max_guest` was reached.
	pub fn rejected_connections(&self) -> usize {
		self.rejected.load(Ordering::Acquire)
	}

	/// Starts the accept loop on a dedicated thread.
	pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
		self.begin()?;

		let server = Arc::clone(self);
		let spawned = std::thread::Builder::new()
			.name("streamlane-accept".into())
			.spawn(move || server.accept_loop());

		match spawned {
			Ok(handle) => {
				*self.accept_thread.lock() = Some(handle);
				Ok(())
			}
			Err(e) => {
				self.set_status(Status::Idle);
				Err(e)
			}
		}
	}

	/// Runs the accept loop on the calling thread until the server stops.
	pub fn run(self: &Arc<Self>) -> std::io::Result<()> {
		self.begin()?;
		self.accept_loop();
		Ok(())
	}

	/// Asks the accept loop to exit. Live connections are left alone.
	pub fn stop(&self) {
		let changed = {
			let mut status = self.status.lock();
			match *status {
				Status::Running | Status::Suspended => {
					*status = Status::ShouldTerminate;
					true
				}
				Status::Idle | Status::ShouldTerminate => false,
			}
		};
		if !changed {
			return;
		}
		self.notify_status(Status::ShouldTerminate);

		if let Some(listener) = self.listener.lock().as_ref()
			&& let Err(e) = listener.shutdown()
		{
			tracing::trace!(error = %e, "listener shutdown");
		}
	}

	/// Stops accepting without closing the listener. Returns whether the
	/// status changed.
	pub fn suspend(&self) -> bool {
		self.transition(Status::Running, Status::Suspended)
	}

	pub fn resume(&self) -> bool {
		self.transition(Status::Suspended, Status::Running)
	}

	/// Waits for a loop started with [`start`](Self::start) to exit.
	pub fn join(&self) {
		let handle = self.accept_thread.lock().take();
		if let Some(handle) = handle
			&& handle.thread().id() != std::thread::current().id()
		{
			let _ = handle.join();
		}
	}

	fn begin(&self) -> std::io::Result<()> {
		if self.listener.lock().is_none() {
			return Err(ServerError::Closed.into());
		}
		if !self.transition(Status::Idle, Status::Running) {
			return Err(ServerError::AlreadyRunning.into());
		}
		Ok(())
	}

	fn transition(&self, from: Status, to: Status) -> bool {
		{
			let mut status = self.status.lock();
			if *status != from {
				return false;
			}
			*status = to;
		}
		self.notify_status(to);
		true
	}

	fn set_status(&self, to: Status) {
		*self.status.lock() = to;
		self.notify_status(to);
	}

	fn notify_status(&self, status: Status) {
		tracing::debug!(%status, "server status changed");
		if let Some(delegate) = &self.delegate {
			delegate.did_change_status(self, status);
		}
	}

	fn accept_loop(self: &Arc<Self>) {
		let listener = self.listener.lock().clone();
		let Some(listener) = listener else {
			self.finish();
			return;
		};
		tracing::debug!(addr = %self.local_addr, "accept loop running");

		loop {
			match self.status() {
				Status::ShouldTerminate => break,
				Status::Suspended => {
					std::thread::sleep(self.config.poll_interval);
					continue;
				}
				Status::Idle | Status::Running => {}
			}

			match listener.wait_readable(self.config.poll_interval) {
				Ok(false) => continue,
				Ok(true) => {}
				Err(e) => {
					self.report(&e);
					break;
				}
			}

			// Woken by stop() or suspended while waiting.
			if self.status() != Status::Running {
				continue;
			}

			if let Err(e) = self.accept_one(&listener) {
				if self.status() == Status::ShouldTerminate {
					break;
				}
				self.report(&e);
			}
		}

		drop(listener);
		self.finish();
	}

	fn accept_one(self: &Arc<Self>, listener: &Listener) -> std::io::Result<()> {
		let (stream, peer) = listener.accept()?;
		let fd = stream.as_raw_fd();

		let live = self.live.load(Ordering::Acquire);
		if live >= self.config.max_guest {
			self.rejected.fetch_add(1, Ordering::AcqRel);
			tracing::warn!(fd, %peer, live, max_guest = self.config.max_guest, "connection limit reached, dropping");
			stream.close();
			return Ok(());
		}

		if let Some(delegate) = &self.delegate
			&& !delegate.should_connect(self, &stream, &peer)
		{
			tracing::debug!(fd, %peer, "connection refused by delegate");
			stream.close();
			return Ok(());
		}

		if self.config.nonblocking {
			stream.set_blocking(false)?;
		}

		let live = self.live.fetch_add(1, Ordering::AcqRel) + 1;
		tracing::debug!(fd, %peer, live, "connection admitted");

		let server: Weak<StreamServer> = Arc::downgrade(self);
		let queue = ConnectionQueue::new(
			Box::new(stream),
			Arc::clone(&self.handler),
			Arc::clone(&self.reactor),
			Arc::clone(&self.executor),
		)
		.with_peer(peer)
		.with_error_hook(self.error_hook.clone())
		.on_terminate(move |queue| {
			if let Some(server) = server.upgrade() {
				server.connection_closed(queue.ident());
			}
		});

		self.executor.execute(Box::new(move || {
			// Failures are reported and torn down inside start().
			let _ = queue.start();
		}));
		Ok(())
	}

	fn connection_closed(&self, ident: RawFd) {
		let live = self.live.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
		tracing::debug!(fd = ident, live, "connection closed");
		if let Some(delegate) = &self.delegate {
			delegate.did_disconnect(self, ident);
		}
	}

	fn finish(&self) {
		drop(self.listener.lock().take());
		self.set_status(Status::Idle);
		tracing::info!(addr = %self.local_addr, "server stopped");

		if let Some(delegate) = &self.delegate {
			delegate.did_kill(self);
		}
	}

	fn report(&self, err: &std::io::Error) {
		match &self.error_hook {
			Some(hook) => hook(ErrorSource::Server, err),
			None => tracing::warn!(error = %err, "server error"),
		}
	}
}

impl fmt::Debug for StreamServer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StreamServer")
			.field("local_addr", &self.local_addr)
			.field("status", &self.status())
			.field("live", &self.live_connections())
			.field("rejected", &self.rejected_connections())
			.finish()
	}
}
