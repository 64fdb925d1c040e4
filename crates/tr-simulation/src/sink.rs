use tr_core::keyspace::Keyspace;
use tr_core::{CellObserver, Entity, Position};

use crate::stadium::Stadium;

/// The world's cell observer: forwards every update to the stadium and,
/// when enabled, to the keyspace mirror.
#[derive(Debug)]
pub struct CellSink {
    /// Receives every cell update.
    pub stadium: Stadium,
    /// Present when the keyspace mirror is enabled.
    pub keyspace: Option<Keyspace>,
}

impl CellSink {
    /// A sink without a keyspace mirror.
    pub fn new(stadium: Stadium) -> Self {
        Self {
            stadium,
            keyspace: None,
        }
    }

    /// Also mirror updates into `keyspace`.
    pub fn with_keyspace(mut self, keyspace: Keyspace) -> Self {
        self.keyspace = Some(keyspace);
        self
    }
}

impl CellObserver for CellSink {
    fn on_cell_update(&mut self, position: Position, occupant: Option<&Entity>) {
        if let Some(keyspace) = self.keyspace.as_mut() {
            keyspace.on_cell_update(position, occupant);
        }
        self.stadium.broadcast_cell_update(position, occupant);
    }

    fn on_vitals_changed(&mut self, entity: &Entity) {
        if let Some(keyspace) = self.keyspace.as_mut() {
            keyspace.on_vitals_changed(entity);
        }
    }
}
