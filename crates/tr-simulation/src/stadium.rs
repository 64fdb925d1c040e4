use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};
use tr_core::{Entity, Position, Region};

use crate::error::{SimError, SimResult};
use crate::event::{CellUpdate, ServerAction, SpectateEvent};

#[derive(Debug)]
struct Spectator {
    queue: mpsc::Sender<SpectateEvent>,
    regions: BTreeSet<Region>,
    dropped: u64,
}

impl Spectator {
    /// Never waits: a full queue loses the event for this spectator only.
    fn deliver(&mut self, id: &str, event: SpectateEvent) -> bool {
        match self.queue.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                debug!(spectator = id, dropped = self.dropped, "spectator queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(spectator = id, "spectator queue closed");
                false
            }
        }
    }
}

/// Region-scoped pub/sub for spectators.
///
/// Holds each spectator's bounded queue and the region subscriptions.
/// Lives inside the world's cell observer, so every broadcast happens
/// under the same lock as the mutation that caused it.
#[derive(Debug)]
pub struct Stadium {
    region_size: i32,
    capacity: usize,
    spectators: HashMap<String, Spectator>,
    regions: HashMap<Region, Vec<String>>,
}

impl Stadium {
    /// An empty stadium; each spectator queue holds `capacity` events.
    pub fn new(region_size: i32, capacity: usize) -> Self {
        Self {
            region_size,
            capacity: capacity.max(1),
            spectators: HashMap::new(),
            regions: HashMap::new(),
        }
    }

    /// Side of a region.
    pub fn region_size(&self) -> i32 {
        self.region_size
    }

    // -----------------------------------------------------------------------
    // Spectator lifecycle
    // -----------------------------------------------------------------------

    /// Register a spectator and hand back the receiving end of its queue.
    pub fn add_spectator(&mut self, id: &str) -> SimResult<mpsc::Receiver<SpectateEvent>> {
        if self.spectators.contains_key(id) {
            return Err(SimError::SpectatorExists(id.to_string()));
        }
        let (queue, receiver) = mpsc::channel(self.capacity);
        self.spectators.insert(
            id.to_string(),
            Spectator {
                queue,
                regions: BTreeSet::new(),
                dropped: 0,
            },
        );
        info!(spectator = id, "spectator connected");
        Ok(receiver)
    }

    /// Drop a spectator, its subscriptions, and its queue. Returns whether it
    /// was registered.
    pub fn remove_spectator(&mut self, id: &str) -> bool {
        let Some(spectator) = self.spectators.remove(id) else {
            return false;
        };
        for region in &spectator.regions {
            self.detach(id, *region);
        }
        info!(spectator = id, dropped = spectator.dropped, "spectator disconnected");
        true
    }

    /// Subscribe to a region. Returns `false` if already subscribed.
    pub fn subscribe(&mut self, id: &str, region: Region) -> SimResult<bool> {
        let spectator = self
            .spectators
            .get_mut(id)
            .ok_or_else(|| SimError::SpectatorNotFound(id.to_string()))?;
        if !spectator.regions.insert(region) {
            return Ok(false);
        }
        self.regions.entry(region).or_default().push(id.to_string());
        Ok(true)
    }

    /// Unsubscribe from a region. Returns `false` if not subscribed.
    pub fn unsubscribe(&mut self, id: &str, region: Region) -> SimResult<bool> {
        let spectator = self
            .spectators
            .get_mut(id)
            .ok_or_else(|| SimError::SpectatorNotFound(id.to_string()))?;
        if !spectator.regions.remove(&region) {
            return Ok(false);
        }
        self.detach(id, region);
        Ok(true)
    }

    fn detach(&mut self, id: &str, region: Region) {
        if let Some(subscribers) = self.regions.get_mut(&region) {
            subscribers.retain(|s| s != id);
            if subscribers.is_empty() {
                self.regions.remove(&region);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Enqueue a cell update for every subscriber of the cell's region.
    pub fn broadcast_cell_update(&mut self, position: Position, occupant: Option<&Entity>) {
        let region = position.region(self.region_size);
        let Some(subscribers) = self.regions.get(&region) else {
            return;
        };
        let event = SpectateEvent::CellUpdate(CellUpdate::new(position, occupant));
        for id in subscribers {
            if let Some(spectator) = self.spectators.get_mut(id) {
                spectator.deliver(id, event);
            }
        }
    }

    /// Enqueue a server action on every spectator queue.
    pub fn broadcast_server_action(&mut self, action: ServerAction) {
        let event = SpectateEvent::ServerAction { action };
        for (id, spectator) in &mut self.spectators {
            spectator.deliver(id, event);
        }
    }

    /// Enqueue a cell update for one spectator regardless of subscriptions.
    pub fn send_cell_update(&mut self, id: &str, position: Position, occupant: Option<&Entity>) -> bool {
        let event = SpectateEvent::CellUpdate(CellUpdate::new(position, occupant));
        self.spectators
            .get_mut(id)
            .is_some_and(|spectator| spectator.deliver(id, event))
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// Whether `id` is a live spectator.
    pub fn contains(&self, id: &str) -> bool {
        self.spectators.contains_key(id)
    }

    /// Number of live spectators.
    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    /// Regions that currently have at least one subscriber.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Spectators subscribed to `region`, in subscription order.
    pub fn subscribers(&self, region: Region) -> &[String] {
        self.regions.get(&region).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `id` is subscribed to `region`.
    pub fn is_subscribed(&self, id: &str, region: Region) -> bool {
        self.spectators
            .get(id)
            .is_some_and(|s| s.regions.contains(&region))
    }

    /// Events dropped for a spectator because its queue was full.
    pub fn dropped(&self, id: &str) -> Option<u64> {
        self.spectators.get(id).map(|s| s.dropped)
    }
}
