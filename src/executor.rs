//! Execution contexts that run connection work off the accept thread.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use parking_lot::Mutex;

/// A unit of work handed to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs closures asynchronously.
///
/// No ordering is promised between independently submitted jobs.
pub trait Executor: Send + Sync {
	fn execute(&self, job: Job);
}

/// Fixed-size pool of worker threads fed from one shared queue.
pub struct ThreadPool {
	sender: Mutex<Option<Sender<Job>>>,
	handles: Mutex<Vec<JoinHandle<()>>>,
	size: usize,
}

impl ThreadPool {
	/// Spawns `size` workers (at least one).
	pub fn new(size: usize) -> std::io::Result<Self> {
		let size = size.max(1);
		let (sender, receiver) = mpsc::channel::<Job>();
		let receiver = Arc::new(Mutex::new(receiver));

		let mut handles = Vec::with_capacity(size);
		for id in 0..size {
			let receiver = Arc::clone(&receiver);
			let handle = std::thread::Builder::new()
				.name(format!("streamlane-worker-{}", id))
				.spawn(move || worker_loop(id, receiver))?;
			handles.push(handle);
		}

		Ok(Self {
			sender: Mutex::new(Some(sender)),
			handles: Mutex::new(handles),
			size,
		})
	}

	/// One worker per available CPU.
	pub fn with_available_parallelism() -> std::io::Result<Self> {
		Self::new(num_cpus())
	}

	pub fn size(&self) -> usize {
		self.size
	}

	/// Stops accepting jobs and waits for queued ones to finish.
	pub fn shutdown(&self) {
		drop(self.sender.lock().take());
		let handles: Vec<_> = self.handles.lock().drain(..).collect();
		let current = std::thread::current().id();
		for handle in handles {
			// A worker shutting down its own pool cannot join itself.
			if handle.thread().id() != current {
				let _ = handle.join();
			}
		}
	}
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
	loop {
		let job = receiver.lock().recv();
		match job {
			Ok(job) => {
				if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
					tracing::error!(worker = id, "job panicked");
				}
			}
			Err(_) => {
				tracing::trace!(worker = id, "job queue closed, worker exiting");
				return;
			}
		}
	}
}

impl Executor for ThreadPool {
	fn execute(&self, job: Job) {
		let sender = self.sender.lock().clone();
		match sender {
			Some(sender) => {
				if let Err(mpsc::SendError(job)) = sender.send(job) {
					job();
				}
			}
			// After shutdown work still has to run somewhere.
			None => job(),
		}
	}
}

impl Drop for ThreadPool {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn num_cpus() -> usize {
	std::thread::available_parallelism()
		.map(|n| n.get())
		.unwrap_or(1)
}
