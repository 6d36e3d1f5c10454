use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// One datagram waiting for delivery.
struct Job {
    dest: SocketAddr,
    payload: Vec<u8>,
}

#[derive(Default)]
pub struct ForwardStats {
    pub dispatched: AtomicU64,
    pub sent_packets: AtomicU64,
    pub sent_bytes: AtomicU64,
    pub errors: AtomicU64,
    pub dropped: AtomicU64,
}

/// One-shot UDP send primitive shared by both capture loops.
///
/// Each datagram gets a fresh socket bound to an ephemeral port, exactly one
/// write, and no retry. Delivery runs on a small worker pool fed through a
/// bounded lock-free queue, so `dispatch` never blocks a capture loop: when
/// the queue is full the datagram is dropped and counted instead.
pub struct Forwarder {
    queue: Arc<ArrayQueue<Job>>,
    running: Arc<AtomicBool>,
    stats: Arc<ForwardStats>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl Forwarder {
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let queue = Arc::new(ArrayQueue::new(queue_capacity));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(ForwardStats::default());

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = queue.clone();
            let running = running.clone();
            let stats = stats.clone();
            workers.push(thread::spawn(move || {
                worker_loop(worker_id, &queue, &running, &stats);
            }));
        }

        Self {
            queue,
            running,
            stats,
            workers: Mutex::new(workers),
        }
    }

    /// Queue one payload for delivery to `dest`. Returns immediately; the
    /// caller never learns whether delivery succeeded.
    pub fn dispatch(&self, dest: SocketAddr, payload: Vec<u8>) {
        if !self.running.load(Ordering::Relaxed) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        if self.queue.push(Job { dest, payload }).is_err() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("forward queue full, dropping datagram for {}", dest);
        }
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }

    /// Stop the workers and cancel anything still queued. After this call no
    /// further datagrams leave the process.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }

        let mut cancelled = 0u64;
        while self.queue.pop().is_some() {
            cancelled += 1;
        }
        if cancelled > 0 {
            self.stats.dropped.fetch_add(cancelled, Ordering::Relaxed);
            debug!("cancelled {} queued datagrams at shutdown", cancelled);
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    worker_id: usize,
    queue: &ArrayQueue<Job>,
    running: &AtomicBool,
    stats: &ForwardStats,
) {
    while running.load(Ordering::Relaxed) {
        match queue.pop() {
            Some(job) => match send_once(job.dest, &job.payload) {
                Ok(bytes_sent) => {
                    stats.sent_packets.fetch_add(1, Ordering::Relaxed);
                    stats.sent_bytes.fetch_add(bytes_sent as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("worker {} failed to forward to {}: {}", worker_id, job.dest, e);
                }
            },
            None => thread::sleep(Duration::from_micros(50)),
        }
    }
    debug!("forward worker {} shutting down", worker_id);
}

/// Deliver one payload on a throwaway socket. The socket is released on
/// every path when it goes out of scope.
fn send_once(dest: SocketAddr, payload: &[u8]) -> std::io::Result<usize> {
    let socket = Socket::new(Domain::for_address(dest), Type::DGRAM, Some(Protocol::UDP))?;

    let local: SocketAddr = match dest {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&local.into())?;

    socket.send_to(payload, &dest.into())
}
