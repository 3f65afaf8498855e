//! Topic based publish/subscribe with synchronous delivery.
//!
//! Every topic is served by its own worker thread that owns the subscriber list and handles
//! subscribe, unsubscribe and publish requests one at a time, in the order they were sent.
//! `publish` returns only after the worker has handed the event to every subscriber channel
//! registered at that moment, so subscribers observe events in publish order and none is lost.
//!
//! A subscriber that stops reading from a bounded channel stalls the publisher. Never publish
//! from a thread that is the only reader of a bounded subscription on the same topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, trace};
use parking_lot::Mutex;
use crate::errors::BusError;

enum Command<E> {
    Subscribe { id: u64, sender: Sender<E> },
    Unsubscribe { id: u64 },
    Publish { event: E, ack: Sender<()> },
    Shutdown,
}

struct Topic<E> {
    commands: Sender<Command<E>>,
    worker: Option<JoinHandle<()>>,
}

pub struct EventBus<E> {
    topics: Mutex<HashMap<String, Topic<E>>>,
    next_subscriber: AtomicU64,
    /// Capacity of the subscriber channels, unbounded when `None`.
    subscriber_buffer: Option<usize>,
    shut_down: AtomicBool,
}

impl<E: Clone + Send + 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(subscriber_buffer: Option<usize>) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            next_subscriber: AtomicU64::new(0),
            subscriber_buffer,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Creates the topic and starts its worker. Creating an existing topic does nothing.
    pub fn new_topic(&self, name: &str) -> Result<(), BusError> {
        if self.is_shut_down() {
            return Err(BusError::Shutdown);
        }
        let mut topics = self.topics.lock();
        if topics.contains_key(name) {
            return Ok(());
        }
        let (commands, inbox) = unbounded();
        let topic_name = name.to_string();
        let worker = std::thread::Builder::new()
            .name(format!("topic-{}", name))
            .spawn(move || run_topic(topic_name, inbox))
            .map_err(|err| {
                error!("Can't start worker of topic {}: {}", name, err);
                BusError::Shutdown
            })?;
        topics.insert(name.to_string(), Topic { commands, worker: Some(worker) });
        debug!("Created topic {}", name);
        Ok(())
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.lock().contains_key(name)
    }

    /// Delivers `event` to every current subscriber of `topic` and returns once all of them
    /// have it in their channel.
    pub fn publish(&self, topic: &str, event: E) -> Result<(), BusError> {
        if self.is_shut_down() {
            return Err(BusError::Shutdown);
        }
        let commands = self.commands(topic)?;
        let (ack, acked) = bounded(1);
        commands.send(Command::Publish { event, ack }).map_err(|_| BusError::Shutdown)?;
        acked.recv().map_err(|_| BusError::Shutdown)
    }

    /// Registers a new independent channel on `topic`. It receives every event published after
    /// this call returns.
    pub fn subscribe(&self, topic: &str) -> Result<Watch<E>, BusError> {
        self.subscribe_with_buffer(topic, self.subscriber_buffer)
    }

    /// Same as `subscribe` with a channel capacity of its own, unbounded when `None`.
    pub fn subscribe_with_buffer(&self, topic: &str, buffer: Option<usize>) -> Result<Watch<E>, BusError> {
        if self.is_shut_down() {
            return Err(BusError::Shutdown);
        }
        let commands = self.commands(topic)?;
        let (sender, receiver) = match buffer {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        commands.send(Command::Subscribe { id, sender }).map_err(|_| BusError::Shutdown)?;
        Ok(Watch { id, receiver, commands })
    }

    /// Stops all topic workers. Subscriber channels are closed once drained, further publishing
    /// and subscribing fail with `BusError::Shutdown`.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let workers: Vec<(String, Topic<E>)> = self.topics.lock().drain().collect();
        for (name, mut topic) in workers {
            let _ = topic.commands.send(Command::Shutdown);
            if let Some(worker) = topic.worker.take() {
                if worker.join().is_err() {
                    error!("Worker of topic {} panicked", name);
                }
            }
        }
        debug!("Event bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn commands(&self, topic: &str) -> Result<Sender<Command<E>>, BusError> {
        self.topics.lock()
            .get(topic)
            .map(|topic| topic.commands.clone())
            .ok_or_else(|| BusError::UnknownTopic(topic.to_string()))
    }
}

impl<E> Drop for EventBus<E> {
    fn drop(&mut self) {
        for (_, topic) in self.topics.get_mut().drain() {
            let _ = topic.commands.send(Command::Shutdown);
        }
    }
}

fn run_topic<E: Clone>(name: String, inbox: Receiver<Command<E>>) {
    let mut subscribers: Vec<(u64, Sender<E>)> = Vec::new();
    for command in inbox.iter() {
        match command {
            Command::Subscribe { id, sender } => {
                trace!("Topic {}: subscriber {} added", name, id);
                subscribers.push((id, sender));
            }
            Command::Unsubscribe { id } => {
                trace!("Topic {}: subscriber {} removed", name, id);
                subscribers.retain(|(subscriber, _)| *subscriber != id);
            }
            Command::Publish { event, ack } => {
                // a failed send means the watch is gone
                subscribers.retain(|(_, sender)| sender.send(event.clone()).is_ok());
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }
}

/// One subscription to a topic. Dropping it unsubscribes.
pub struct Watch<E> {
    id: u64,
    receiver: Receiver<E>,
    commands: Sender<Command<E>>,
}

impl<E> Watch<E> {
    /// Blocks until the next event, `None` once the bus is shut down and the channel drained.
    pub fn recv(&self) -> Option<E> {
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<E, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn iter(&self) -> impl Iterator<Item = E> + '_ {
        self.receiver.iter()
    }

    /// Events already delivered and not read yet.
    pub fn drain(&self) -> Vec<E> {
        self.receiver.try_iter().collect()
    }
}

impl<E> Drop for Watch<E> {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe { id: self.id });
    }
}
