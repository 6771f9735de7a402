use std::collections::{HashSet, VecDeque};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;
use streamlane::{
	ConnectionQueue, ConnectorBuilder, DataHandler, EpollReactor, ErrorHook, ErrorSource, Event,
	Executor, Filter, Job, ListenerBuilder, Managed, QueueState, Reactor, SocketAddress, ThreadPool,
	Transport, UnixAddr,
};

const FD: RawFd = 4242;

/// Runs every job on the submitting thread.
struct InlineExecutor;

impl Executor for InlineExecutor {
	fn execute(&self, job: Job) {
		job();
	}
}

#[derive(Default)]
struct RecordingReactor {
	registered: AtomicUsize,
	unregistered: Mutex<Vec<(RawFd, Filter)>>,
	fail_register: AtomicBool,
}

impl Reactor for RecordingReactor {
	fn register(&self, _target: Arc<dyn Managed>) -> std::io::Result<()> {
		if self.fail_register.load(Ordering::SeqCst) {
			return Err(std::io::Error::from_raw_os_error(libc::EBADF));
		}
		self.registered.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn unregister(&self, ident: RawFd, filter: Filter) -> std::io::Result<()> {
		self.unregistered.lock().unwrap().push((ident, filter));
		Ok(())
	}
}

#[derive(Default)]
struct Tally {
	closed: AtomicUsize,
	dropped: AtomicUsize,
	hint: Mutex<Option<usize>>,
	written: Mutex<Vec<u8>>,
}

struct ScriptedTransport {
	reads: VecDeque<std::io::Result<Option<Vec<u8>>>>,
	tally: Arc<Tally>,
}

impl ScriptedTransport {
	fn new(tally: &Arc<Tally>, reads: Vec<std::io::Result<Option<Vec<u8>>>>) -> Box<Self> {
		Box::new(Self {
			reads: reads.into(),
			tally: Arc::clone(tally),
		})
	}
}

impl AsRawFd for ScriptedTransport {
	fn as_raw_fd(&self) -> RawFd {
		FD
	}
}

impl Transport for ScriptedTransport {
	fn read(&mut self) -> std::io::Result<Option<Vec<u8>>> {
		self.reads.pop_front().unwrap_or(Ok(None))
	}

	fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
		self.tally.written.lock().unwrap().extend_from_slice(data);
		Ok(data.len())
	}

	fn close(&mut self) {
		self.tally.closed.fetch_add(1, Ordering::SeqCst);
	}

	fn set_read_hint(&mut self, available: usize) {
		*self.tally.hint.lock().unwrap() = Some(available);
	}
}

impl Drop for ScriptedTransport {
	fn drop(&mut self) {
		self.tally.dropped.fetch_add(1, Ordering::SeqCst);
	}
}

struct Harness {
	reactor: Arc<RecordingReactor>,
	tally: Arc<Tally>,
	seen: Arc<Mutex<Vec<Vec<u8>>>>,
	completions: Arc<AtomicUsize>,
	errors: Arc<Mutex<Vec<(ErrorSource, std::io::ErrorKind)>>>,
}

impl Harness {
	fn new() -> Self {
		Self {
			reactor: Arc::new(RecordingReactor::default()),
			tally: Arc::new(Tally::default()),
			seen: Arc::new(Mutex::new(Vec::new())),
			completions: Arc::new(AtomicUsize::new(0)),
			errors: Arc::new(Mutex::new(Vec::new())),
		}
	}

	/// Builds a queue whose handler records data and keeps the
	/// connection while `keep` says so.
	fn queue(&self, reads: Vec<std::io::Result<Option<Vec<u8>>>>, keep: bool) -> ConnectionQueue {
		let seen = Arc::clone(&self.seen);
		let handler: DataHandler = Arc::new(move |_queue: &ConnectionQueue, data: &[u8]| {
			seen.lock().unwrap().push(data.to_vec());
			keep
		});
		let errors = Arc::clone(&self.errors);
		let hook: ErrorHook = Arc::new(move |source, err: &std::io::Error| {
			errors.lock().unwrap().push((source, err.kind()));
		});
		let completions = Arc::clone(&self.completions);

		ConnectionQueue::new(
			ScriptedTransport::new(&self.tally, reads),
			handler,
			Arc::clone(&self.reactor) as Arc<dyn Reactor>,
			Arc::new(InlineExecutor),
		)
		.with_error_hook(Some(hook))
		.on_terminate(move |_| {
			completions.fetch_add(1, Ordering::SeqCst);
		})
	}

	fn assert_torn_down_once(&self) {
		assert_eq!(self.tally.closed.load(Ordering::SeqCst), 1);
		assert_eq!(self.tally.dropped.load(Ordering::SeqCst), 1);
		assert_eq!(*self.reactor.unregistered.lock().unwrap(), vec![(FD, Filter::Read)]);
		assert_eq!(self.completions.load(Ordering::SeqCst), 1);
	}
}

fn fire(queue: &Arc<ConnectionQueue>, event: Event) {
	Arc::clone(queue).handle_event(event);
}

#[test]
fn start_registers_once() {
	let h = Harness::new();
	let queue = h.queue(vec![], true).start().unwrap();

	assert_eq!(queue.ident(), FD);
	assert_eq!(queue.state(), QueueState::Registered);
	assert_eq!(h.reactor.registered.load(Ordering::SeqCst), 1);
}

#[test]
fn data_is_dispatched_and_queue_rearms() {
	let h = Harness::new();
	let queue = h
		.queue(vec![Ok(Some(b"one".to_vec())), Ok(Some(b"two".to_vec()))], true)
		.start()
		.unwrap();

	fire(&queue, Event::readable(FD));
	fire(&queue, Event::readable(FD));

	assert_eq!(*h.seen.lock().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
	assert_eq!(h.reactor.registered.load(Ordering::SeqCst), 3);
	assert_eq!(queue.state(), QueueState::Registered);
	assert_eq!(h.completions.load(Ordering::SeqCst), 0);
}

#[test]
fn end_of_stream_tears_down_exactly_once() {
	let h = Harness::new();
	let queue = h.queue(vec![Ok(None)], true).start().unwrap();

	fire(&queue, Event::readable(FD));
	assert!(queue.is_terminated());
	h.assert_torn_down_once();

	// Every later path to teardown is a no-op.
	queue.terminate();
	fire(&queue, Event::readable(FD));
	h.assert_torn_down_once();
	assert!(h.seen.lock().unwrap().is_empty());
}

#[test]
fn handler_refusal_ends_connection() {
	let h = Harness::new();
	let queue = h.queue(vec![Ok(Some(b"bye".to_vec()))], false).start().unwrap();

	fire(&queue, Event::readable(FD));

	assert_eq!(*h.seen.lock().unwrap(), vec![b"bye".to_vec()]);
	assert_eq!(h.reactor.registered.load(Ordering::SeqCst), 1);
	h.assert_torn_down_once();
}

#[test]
fn recoverable_error_is_reported_and_rearmed() {
	let h = Harness::new();
	let queue = h
		.queue(vec![Err(std::io::ErrorKind::WouldBlock.into()), Ok(Some(b"late".to_vec()))], true)
		.start()
		.unwrap();

	fire(&queue, Event::readable(FD));
	assert_eq!(
		*h.errors.lock().unwrap(),
		vec![(ErrorSource::Connection(FD), std::io::ErrorKind::WouldBlock)]
	);
	assert_eq!(queue.state(), QueueState::Registered);
	assert_eq!(h.reactor.registered.load(Ordering::SeqCst), 2);

	fire(&queue, Event::readable(FD));
	assert_eq!(*h.seen.lock().unwrap(), vec![b"late".to_vec()]);
}

#[test]
fn fatal_error_is_reported_and_terminates() {
	let h = Harness::new();
	let queue = h
		.queue(vec![Err(std::io::ErrorKind::ConnectionReset.into())], true)
		.start()
		.unwrap();

	fire(&queue, Event::readable(FD));

	assert_eq!(
		*h.errors.lock().unwrap(),
		vec![(ErrorSource::Connection(FD), std::io::ErrorKind::ConnectionReset)]
	);
	h.assert_torn_down_once();
}

#[test]
fn empty_read_skips_handler() {
	let h = Harness::new();
	let queue = h.queue(vec![Ok(Some(Vec::new()))], true).start().unwrap();

	fire(&queue, Event::readable(FD));

	assert!(h.seen.lock().unwrap().is_empty());
	assert_eq!(queue.state(), QueueState::Registered);
}

#[test]
fn hangup_with_nothing_to_read_terminates() {
	let h = Harness::new();
	let queue = h.queue(vec![Ok(Some(Vec::new()))], true).start().unwrap();

	fire(&queue, Event::readable(FD).with_hangup());

	assert!(h.seen.lock().unwrap().is_empty());
	h.assert_torn_down_once();
}

#[test]
fn panicking_handler_is_contained() {
	let h = Harness::new();
	let errors = Arc::clone(&h.errors);
	let hook: ErrorHook = Arc::new(move |source, err: &std::io::Error| {
		errors.lock().unwrap().push((source, err.kind()));
	});
	let completions = Arc::clone(&h.completions);
	let handler: DataHandler = Arc::new(|_queue: &ConnectionQueue, data: &[u8]| {
		if data == b"boom" {
			panic!("handler blew up");
		}
		true
	});

	let queue = ConnectionQueue::new(
		ScriptedTransport::new(&h.tally, vec![Ok(Some(b"boom".to_vec()))]),
		handler,
		Arc::clone(&h.reactor) as Arc<dyn Reactor>,
		Arc::new(InlineExecutor),
	)
	.with_error_hook(Some(hook))
	.on_terminate(move |_| {
		completions.fetch_add(1, Ordering::SeqCst);
	})
	.start()
	.unwrap();

	fire(&queue, Event::readable(FD));

	assert!(queue.is_terminated());
	assert_eq!(
		*h.errors.lock().unwrap(),
		vec![(ErrorSource::Connection(FD), std::io::ErrorKind::Other)]
	);
	h.assert_torn_down_once();
}

/// Runs every job on a fresh thread.
#[derive(Default)]
struct SpawningExecutor {
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SpawningExecutor {
	fn join_all(&self) {
		let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
		for handle in handles {
			handle.join().unwrap();
		}
	}
}

impl Executor for SpawningExecutor {
	fn execute(&self, job: Job) {
		self.handles.lock().unwrap().push(std::thread::spawn(job));
	}
}

/// Tracks which descriptors are currently registered.
#[derive(Default)]
struct InterestSet {
	live: Mutex<HashSet<RawFd>>,
}

impl Reactor for InterestSet {
	fn register(&self, target: Arc<dyn Managed>) -> std::io::Result<()> {
		self.live.lock().unwrap().insert(target.ident());
		Ok(())
	}

	fn unregister(&self, ident: RawFd, _filter: Filter) -> std::io::Result<()> {
		self.live.lock().unwrap().remove(&ident);
		Ok(())
	}
}

#[test]
fn rearm_never_outlives_teardown() {
	for _ in 0..200 {
		let tally = Arc::new(Tally::default());
		let reactor = Arc::new(InterestSet::default());
		let executor = Arc::new(SpawningExecutor::default());
		let handler: DataHandler = Arc::new(|_queue: &ConnectionQueue, _data: &[u8]| true);

		let queue = ConnectionQueue::new(
			ScriptedTransport::new(&tally, vec![Ok(Some(b"x".to_vec()))]),
			handler,
			Arc::clone(&reactor) as Arc<dyn Reactor>,
			Arc::clone(&executor) as Arc<dyn Executor>,
		)
		.start()
		.unwrap();

		// The re-arm job runs on another thread while teardown happens here.
		fire(&queue, Event::readable(FD));
		queue.terminate();
		executor.join_all();

		assert!(reactor.live.lock().unwrap().is_empty());
		assert_eq!(tally.dropped.load(Ordering::SeqCst), 1);
	}
}

#[test]
fn pool_survives_a_panicking_job() {
	let pool = ThreadPool::new(1).unwrap();
	let (tx, rx) = mpsc::channel();

	pool.execute(Box::new(|| panic!("job blew up")));
	pool.execute(Box::new(move || {
		let _ = tx.send(7);
	}));

	assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
}

#[test]
fn available_bytes_hint_reaches_transport() {
	let h = Harness::new();
	let queue = h.queue(vec![Ok(Some(b"x".to_vec()))], true).start().unwrap();

	fire(&queue, Event::readable(FD).with_available(512));

	assert_eq!(*h.tally.hint.lock().unwrap(), Some(512));
}

#[test]
fn write_goes_through_transport_until_terminated() {
	let h = Harness::new();
	let queue = h.queue(vec![], true).start().unwrap();

	assert_eq!(queue.write(b"hello").unwrap(), 5);
	assert_eq!(*h.tally.written.lock().unwrap(), b"hello".to_vec());

	queue.terminate();
	let err = queue.write(b"again").unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
	h.assert_torn_down_once();
}

#[test]
fn failed_registration_tears_down() {
	let h = Harness::new();
	h.reactor.fail_register.store(true, Ordering::SeqCst);

	let err = h.queue(vec![], true).start().unwrap_err();

	assert_eq!(err.raw_os_error(), Some(libc::EBADF));
	assert_eq!(h.errors.lock().unwrap().len(), 1);
	h.assert_torn_down_once();
}

#[test]
fn echo_over_epoll() {
	let path = std::env::temp_dir().join(format!("streamlane-queue-echo-{}.sock", std::process::id()));
	let _ = std::fs::remove_file(&path);
	let addr = SocketAddress::from(UnixAddr::new(&path));

	let listener = ListenerBuilder::new().bind(&addr).unwrap();
	let mut client = ConnectorBuilder::new()
		.timeout(Some(Duration::from_secs(5)))
		.connect(&addr)
		.unwrap();
	let (stream, peer) = listener.accept().unwrap();

	let pool: Arc<dyn Executor> = Arc::new(ThreadPool::new(2).unwrap());
	let reactor = Arc::new(EpollReactor::new(Arc::clone(&pool)).unwrap());

	let handler: DataHandler = Arc::new(|queue: &ConnectionQueue, data: &[u8]| queue.write(data).is_ok());
	let (done_tx, done_rx) = mpsc::channel();

	let queue = ConnectionQueue::new(
		Box::new(stream),
		handler,
		Arc::clone(&reactor) as Arc<dyn Reactor>,
		Arc::clone(&pool),
	)
	.with_peer(peer)
	.on_terminate(move |queue| {
		let _ = done_tx.send(queue.ident());
	})
	.start()
	.unwrap();
	assert_eq!(reactor.registered(), 1);

	for message in [&b"ping"[..], &b"second round"[..]] {
		client.write_all(message).unwrap();
		let mut echoed = vec![0u8; message.len()];
		client.read_exact(&mut echoed).unwrap();
		assert_eq!(echoed, message);
	}

	let ident = queue.ident();
	client.close();
	assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), ident);
	assert!(queue.is_terminated());
	assert_eq!(reactor.registered(), 0);

	reactor.shutdown();
	let _ = std::fs::remove_file(&path);
}
