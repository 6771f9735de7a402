use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use streamlane::{
	ConnectedStream, ConnectionQueue, ConnectorBuilder, DataHandler, EpollReactor, Executor,
	Reactor, ServerConfig, ServerDelegate, ServerError, SocketAddress, SocketDomain, Status,
	StreamServer, ThreadPool, UnixAddr,
};

#[derive(Default)]
struct Recorder {
	statuses: Mutex<Vec<Status>>,
	kills: AtomicUsize,
	disconnects: AtomicUsize,
	veto: AtomicBool,
}

impl ServerDelegate for Recorder {
	fn should_connect(&self, _server: &StreamServer, _stream: &ConnectedStream, _peer: &SocketAddress) -> bool {
		!self.veto.load(Ordering::SeqCst)
	}

	fn did_disconnect(&self, _server: &StreamServer, _ident: std::os::fd::RawFd) {
		self.disconnects.fetch_add(1, Ordering::SeqCst);
	}

	fn did_change_status(&self, _server: &StreamServer, status: Status) {
		self.statuses.lock().unwrap().push(status);
	}

	fn did_kill(&self, _server: &StreamServer) {
		self.kills.fetch_add(1, Ordering::SeqCst);
	}
}

fn unix_addr(name: &str) -> SocketAddress {
	let path = std::env::temp_dir().join(format!("streamlane-server-{}-{}.sock", name, std::process::id()));
	let _ = std::fs::remove_file(&path);
	SocketAddress::from(UnixAddr::new(path))
}

fn echo_server(addr: &SocketAddress, config: ServerConfig, recorder: &Arc<Recorder>) -> Arc<StreamServer> {
	let handler: DataHandler = Arc::new(|queue: &ConnectionQueue, data: &[u8]| queue.write(data).is_ok());
	server_with_handler(addr, config, recorder, handler)
}

fn server_with_handler(
	addr: &SocketAddress,
	config: ServerConfig,
	recorder: &Arc<Recorder>,
	handler: DataHandler,
) -> Arc<StreamServer> {
	let pool: Arc<dyn Executor> = Arc::new(ThreadPool::new(4).unwrap());
	let reactor: Arc<dyn Reactor> = Arc::new(EpollReactor::new(Arc::clone(&pool)).unwrap());

	let config = config.poll_interval(Duration::from_millis(10));
	let server = StreamServer::bind(addr, config, handler, reactor, pool)
		.unwrap()
		.with_delegate(Arc::clone(recorder) as Arc<dyn ServerDelegate>);
	Arc::new(server)
}

fn connect(addr: &SocketAddress) -> ConnectedStream {
	ConnectorBuilder::new()
		.timeout(Some(Duration::from_secs(5)))
		.connect(addr)
		.unwrap()
}

fn assert_echo(client: &mut ConnectedStream, message: &[u8]) {
	client.write_all(message).unwrap();
	let mut echoed = vec![0u8; message.len()];
	client.read_exact(&mut echoed).unwrap();
	assert_eq!(echoed, message);
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(5);
	while !condition() {
		assert!(Instant::now() < deadline, "timed out waiting for {}", what);
		std::thread::sleep(Duration::from_millis(5));
	}
}

fn cleanup(addr: &SocketAddress) {
	use std::os::unix::ffi::OsStrExt;
	if let SocketAddress::Unix(unix) = addr {
		let _ = std::fs::remove_file(std::ffi::OsStr::from_bytes(unix.path()));
	}
}

#[test]
fn status_machine_and_single_kill() {
	let addr = unix_addr("status");
	let recorder = Arc::new(Recorder::default());
	let server = echo_server(&addr, ServerConfig::new(), &recorder);

	assert_eq!(server.status(), Status::Idle);
	server.stop();
	assert_eq!(server.status(), Status::Idle);
	assert!(!server.suspend());

	server.start().unwrap();
	assert_eq!(server.status(), Status::Running);
	let err = server.start().unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);

	assert!(server.suspend());
	assert_eq!(server.status(), Status::Suspended);
	assert!(server.resume());
	assert_eq!(server.status(), Status::Running);

	server.stop();
	server.join();

	assert_eq!(server.status(), Status::Idle);
	assert_eq!(recorder.kills.load(Ordering::SeqCst), 1);
	assert_eq!(
		*recorder.statuses.lock().unwrap(),
		vec![
			Status::Running,
			Status::Suspended,
			Status::Running,
			Status::ShouldTerminate,
			Status::Idle,
		]
	);

	// The listener is gone for good.
	let err = server.start().unwrap_err();
	assert_eq!(err.to_string(), ServerError::Closed.to_string());
	assert_eq!(recorder.kills.load(Ordering::SeqCst), 1);
	cleanup(&addr);
}

#[test]
fn max_guest_accepts_then_drops() {
	let addr = unix_addr("max-guest");
	let recorder = Arc::new(Recorder::default());
	let server = echo_server(&addr, ServerConfig::new().max_guest(1), &recorder);
	server.start().unwrap();

	let mut a = connect(&addr);
	assert_echo(&mut a, b"from A");
	assert_eq!(server.live_connections(), 1);

	// B is accepted and closed before any byte is exchanged.
	let b = connect(&addr);
	assert_eq!(b.read().unwrap(), None);
	assert_eq!(server.rejected_connections(), 1);
	assert_eq!(server.live_connections(), 1);

	// So is every later client while A stays connected.
	for expected in [2, 3] {
		let extra = connect(&addr);
		assert_eq!(extra.read().unwrap(), None);
		assert_eq!(server.rejected_connections(), expected);
		assert_eq!(server.live_connections(), 1);
	}
	assert_echo(&mut a, b"A still served");

	a.close();
	wait_until("A to be released", || server.live_connections() == 0);
	assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

	let mut c = connect(&addr);
	assert_echo(&mut c, b"from C");
	assert_eq!(server.live_connections(), 1);
	assert_eq!(server.rejected_connections(), 3);

	server.stop();
	server.join();
	assert_eq!(server.status(), Status::Idle);
	assert_eq!(recorder.kills.load(Ordering::SeqCst), 1);

	// Live connections outlive the accept loop.
	assert_echo(&mut c, b"still here");
	cleanup(&addr);
}

#[test]
fn panicking_handler_frees_its_slot() {
	let addr = unix_addr("handler-panic");
	let recorder = Arc::new(Recorder::default());
	let handler: DataHandler = Arc::new(|queue: &ConnectionQueue, data: &[u8]| {
		if data == b"boom" {
			panic!("handler blew up");
		}
		queue.write(data).is_ok()
	});
	let server = server_with_handler(&addr, ServerConfig::new().max_guest(1), &recorder, handler);
	server.start().unwrap();

	let mut a = connect(&addr);
	a.write_all(b"boom").unwrap();
	assert_eq!(a.read().unwrap(), None);
	wait_until("A to be released", || server.live_connections() == 0);
	assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

	let mut c = connect(&addr);
	assert_echo(&mut c, b"from C");
	assert_eq!(server.live_connections(), 1);
	assert_eq!(server.rejected_connections(), 0);

	server.stop();
	server.join();
	cleanup(&addr);
}

#[test]
fn delegate_can_refuse_connections() {
	let addr = unix_addr("veto");
	let recorder = Arc::new(Recorder::default());
	recorder.veto.store(true, Ordering::SeqCst);
	let server = echo_server(&addr, ServerConfig::new(), &recorder);
	server.start().unwrap();

	let refused = connect(&addr);
	assert_eq!(refused.read().unwrap(), None);
	assert_eq!(server.live_connections(), 0);
	assert_eq!(server.rejected_connections(), 0);

	recorder.veto.store(false, Ordering::SeqCst);
	let mut admitted = connect(&addr);
	assert_echo(&mut admitted, b"let me in");

	server.stop();
	server.join();
	cleanup(&addr);
}

#[test]
fn suspended_server_holds_new_connections() {
	let addr = unix_addr("suspend");
	let recorder = Arc::new(Recorder::default());
	let server = echo_server(&addr, ServerConfig::new(), &recorder);
	server.start().unwrap();
	assert!(server.suspend());

	let mut client = connect(&addr);
	client.set_timeout(Some(Duration::from_millis(100))).unwrap();
	client.write_all(b"waiting").unwrap();
	let err = client.read().unwrap_err();
	assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
	assert_eq!(server.live_connections(), 0);

	assert!(server.resume());
	client.set_timeout(Some(Duration::from_secs(5))).unwrap();
	let mut echoed = [0u8; 7];
	client.read_exact(&mut echoed).unwrap();
	assert_eq!(&echoed, b"waiting");

	server.stop();
	server.join();
	cleanup(&addr);
}

#[test]
fn tcp_echo_on_ephemeral_port() {
	let addr = SocketAddress::parse("127.0.0.1", SocketDomain::Inet, 0).unwrap();
	let recorder = Arc::new(Recorder::default());
	let server = echo_server(&addr, ServerConfig::new().nonblocking(true), &recorder);
	let local = server.local_addr().clone();
	assert_ne!(local.port(), Some(0));

	server.start().unwrap();
	let mut client = connect(&local);
	assert_echo(&mut client, b"over tcp");
	assert_echo(&mut client, b"and again");

	server.stop();
	server.join();
}

#[test]
fn run_blocks_until_stopped() {
	let addr = unix_addr("run");
	let recorder = Arc::new(Recorder::default());
	let server = echo_server(&addr, ServerConfig::new(), &recorder);

	let stopper = {
		let server = Arc::clone(&server);
		std::thread::spawn(move || {
			wait_until("server to run", || server.status() == Status::Running);
			server.stop();
		})
	};

	server.run().unwrap();
	stopper.join().unwrap();

	assert_eq!(server.status(), Status::Idle);
	assert_eq!(recorder.kills.load(Ordering::SeqCst), 1);
	cleanup(&addr);
}
