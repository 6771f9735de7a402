pub mod socket;
pub mod reactor;
mod addr;
mod error;
mod executor;
mod queue;
mod server;
mod transport;

pub use self::error::{AddressError, IoError, ServerError, SocketError, errno};
pub use self::addr::{
	FromSockAddr, LinkAddr, SocketAddrV4, SocketAddrV6, SocketAddress, SocketDomain, ToSockAddr,
	UNIX_PATH_MAX, UnixAddr,
};
pub use self::socket::{
	BoundSocket, ConnectedStream, ConnectorBuilder, DEFAULT_READ_BUF_SIZE, Keepalive, Listener,
	ListenerBuilder, RawSocket, Shutdown, SockType, SocketKind, SocketOptions,
};
pub use self::executor::{Executor, Job, ThreadPool};
pub use self::reactor::{EpollReactor, Event, Filter, Managed, Reactor};
pub use self::transport::{MAX_READ_HINT, Transport};
pub use self::queue::{ConnectionQueue, DataHandler, ErrorHook, ErrorSource, QueueState, is_recoverable};
pub use self::server::{ServerConfig, ServerDelegate, Status, StreamServer};
