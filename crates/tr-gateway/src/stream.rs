use std::fmt;
use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use tr_core::Observation;
use tr_simulation::{ModelConnection, ModelKey, SharedSimulation, SpectateEvent};

/// Where a stream writes its items: usually the transport connection.
pub trait EventSink<T> {
    /// Why a send failed.
    type Error: fmt::Display;

    /// Deliver one item.
    fn send(&mut self, item: T) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T: Send> EventSink<T> for mpsc::Sender<T> {
    type Error = mpsc::error::SendError<T>;

    async fn send(&mut self, item: T) -> Result<(), Self::Error> {
        mpsc::Sender::send(self, item).await
    }
}

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The queue was closed by deregistration on the world side.
    QueueClosed,
    /// Writing to the sink failed, usually because the peer went away.
    SinkFailed,
    /// The transport signalled that the stream is over.
    Cancelled,
}

async fn drain<T, K, C>(receiver: &mut mpsc::Receiver<T>, sink: &mut K, cancel: C) -> StreamEnd
where
    K: EventSink<T>,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => return StreamEnd::Cancelled,
            item = receiver.recv() => match item {
                None => return StreamEnd::QueueClosed,
                Some(item) => {
                    if let Err(err) = sink.send(item).await {
                        debug!(%err, "stream sink failed");
                        return StreamEnd::SinkFailed;
                    }
                }
            },
        }
    }
}

/// A spectator's event queue. Closing it removes the spectator; dropping it
/// without closing schedules the removal on the current runtime.
#[derive(Debug)]
pub struct SpectatorStream {
    id: String,
    receiver: mpsc::Receiver<SpectateEvent>,
    sim: SharedSimulation,
    closed: bool,
}

impl SpectatorStream {
    pub(crate) fn new(id: String, receiver: mpsc::Receiver<SpectateEvent>, sim: SharedSimulation) -> Self {
        Self {
            id,
            receiver,
            sim,
            closed: false,
        }
    }

    /// The spectator id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event. `None` once the spectator is removed.
    pub async fn next(&mut self) -> Option<SpectateEvent> {
        self.receiver.recv().await
    }

    /// The next queued event, without waiting.
    pub fn try_next(&mut self) -> Option<SpectateEvent> {
        self.receiver.try_recv().ok()
    }

    /// Remove the spectator from the stadium.
    pub async fn close(mut self) {
        self.sim.lock().await.remove_spectator(&self.id);
        self.closed = true;
    }

    /// Forward events to `sink` until the queue closes, the sink fails, or
    /// `cancel` completes; then remove the spectator.
    pub async fn pump<K, C>(mut self, sink: &mut K, cancel: C) -> StreamEnd
    where
        K: EventSink<SpectateEvent>,
        C: Future<Output = ()>,
    {
        let end = drain(&mut self.receiver, sink, cancel).await;
        debug!(spectator = %self.id, ?end, "spectator stream ended");
        self.close().await;
        end
    }
}

/// A remote model's observation queue. Closing it deregisters the model;
/// dropping it without closing schedules the deregistration.
#[derive(Debug)]
pub struct ModelStream {
    connection: ModelConnection,
    sim: SharedSimulation,
    closed: bool,
}

impl ModelStream {
    pub(crate) fn new(connection: ModelConnection, sim: SharedSimulation) -> Self {
        Self {
            connection,
            sim,
            closed: false,
        }
    }

    /// The session's owner and model name.
    pub fn key(&self) -> &ModelKey {
        &self.connection.key
    }

    /// Wait for the next observation. `None` once deregistered.
    pub async fn next(&mut self) -> Option<Observation> {
        self.connection.receiver.recv().await
    }

    /// The next queued observation, without waiting.
    pub fn try_next(&mut self) -> Option<Observation> {
        self.connection.receiver.try_recv().ok()
    }

    /// Deregister this session. A newer session with the same key survives.
    pub async fn close(mut self) {
        let key = &self.connection.key;
        self.sim
            .lock()
            .await
            .deregister_model(&key.owner_id, &key.model_name, self.connection.token);
        self.closed = true;
    }

    /// Forward observations to `sink` until the queue closes, the sink
    /// fails, or `cancel` completes; then deregister.
    pub async fn pump<K, C>(mut self, sink: &mut K, cancel: C) -> StreamEnd
    where
        K: EventSink<Observation>,
        C: Future<Output = ()>,
    {
        let end = drain(&mut self.connection.receiver, sink, cancel).await;
        debug!(model = %self.connection.key, ?end, "model stream ended");
        self.close().await;
        end
    }
}

/// Run `cleanup` on the current runtime, if there is one.
fn spawn_cleanup<F>(what: &str, cleanup: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(cleanup);
        }
        Err(_) => warn!(stream = what, "stream dropped outside a runtime; cleanup skipped"),
    }
}

impl Drop for SpectatorStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let sim = self.sim.clone();
        let id = std::mem::take(&mut self.id);
        debug!(spectator = %id, "spectator stream dropped without close");
        spawn_cleanup("spectator", async move {
            sim.lock().await.remove_spectator(&id);
        });
    }
}

impl Drop for ModelStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let sim = self.sim.clone();
        let key = self.connection.key.clone();
        let token = self.connection.token;
        debug!(model = %key, "model stream dropped without close");
        spawn_cleanup("model", async move {
            sim.lock()
                .await
                .deregister_model(&key.owner_id, &key.model_name, token);
        });
    }
}
