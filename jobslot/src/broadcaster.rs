use crate::types::Chunk;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

pub type SubscriberId = u64;

/// The output side of a job: a byte bounded log of every chunk plus the set
/// of live viewers that receive new chunks as they are appended.
///
/// Not synchronized on its own; the owning [`Job`](crate::job::Job) keeps it
/// behind its lock.
pub struct Broadcaster {
    log: VecDeque<Chunk>,
    buffered_bytes: usize,
    max_bytes: usize,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Chunk>>,
    next_subscriber: SubscriberId,
    subscriber_capacity: usize,
    sealed: bool,
}

impl Broadcaster {
    pub fn new(max_bytes: usize, subscriber_capacity: usize) -> Self {
        Self {
            log: VecDeque::new(),
            buffered_bytes: 0,
            max_bytes,
            subscribers: HashMap::new(),
            next_subscriber: 0,
            // a zero capacity mpsc channel panics on creation
            subscriber_capacity: subscriber_capacity.max(1),
            sealed: false,
        }
    }

    /// Buffer `chunk`, evict from the front until back under the bound, then
    /// offer it to every live subscriber without waiting.
    pub fn append(&mut self, chunk: Chunk) {
        self.buffered_bytes += chunk.len();
        self.log.push_back(chunk.clone());
        while self.buffered_bytes > self.max_bytes {
            match self.log.pop_front() {
                Some(evicted) => self.buffered_bytes -= evicted.len(),
                None => break,
            }
        }

        self.subscribers.retain(|id, sub| match sub.try_send(chunk.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(subscriber = *id, "viewer queue full, dropping chunk");
                true
            }
            // receiver dropped without unsubscribing
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn subscribe(&mut self) -> (SubscriberId, mpsc::Receiver<Chunk>) {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        // a sealed log never grows, so the sender is dropped right away and
        // the receiver reports end of stream
        if !self.sealed {
            self.subscribers.insert(id, tx);
        }
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    /// Stop accepting subscribers and release the live ones once their queues
    /// drain.
    pub fn seal(&mut self) {
        self.sealed = true;
        self.subscribers.clear();
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn snapshot(&self) -> Vec<Chunk> {
        self.log.iter().cloned().collect()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
