use std::collections::HashMap;

use crate::entity::EntityId;
use crate::error::{WorldError, WorldResult};
use crate::position::{Position, Region};

/// Sparse mapping from occupied cells to the entity standing on them.
///
/// The grid only stores entity references; the [`EntityStore`](crate::store::EntityStore)
/// holds the records. The world keeps the two in agreement.
#[derive(Debug, Clone, Default)]
pub struct GridIndex {
    cells: HashMap<Position, EntityId>,
}

impl GridIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any entity stands on `pos`.
    pub fn occupied(&self, pos: Position) -> bool {
        self.cells.contains_key(&pos)
    }

    /// The entity id on `pos`, if any.
    pub fn get(&self, pos: Position) -> Option<EntityId> {
        self.cells.get(&pos).copied()
    }

    /// Place an entity on an empty cell.
    pub fn place(&mut self, pos: Position, id: EntityId) -> WorldResult<()> {
        if self.cells.contains_key(&pos) {
            return Err(WorldError::PositionTaken(pos));
        }
        self.cells.insert(pos, id);
        Ok(())
    }

    /// Clear a cell, returning whoever stood there.
    pub fn remove(&mut self, pos: Position) -> Option<EntityId> {
        self.cells.remove(&pos)
    }

    /// All occupied cells inside `region`.
    ///
    /// Small regions are answered by probing each cell; when the region has
    /// more cells than the grid has entries, the occupied set is filtered
    /// instead.
    pub fn scan_region(&self, region: Region, region_size: i32) -> Vec<(Position, EntityId)> {
        let area = usize::try_from(region_size)
            .unwrap_or(0)
            .saturating_mul(usize::try_from(region_size).unwrap_or(0));
        if area <= self.cells.len() {
            region
                .positions(region_size)
                .filter_map(|pos| self.get(pos).map(|id| (pos, id)))
                .collect()
        } else {
            let mut found: Vec<(Position, EntityId)> = self
                .cells
                .iter()
                .filter(|(pos, _)| pos.region(region_size) == region)
                .map(|(pos, id)| (*pos, *id))
                .collect();
            found.sort_by_key(|(pos, _)| (pos.y, pos.x));
            found
        }
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no cell is occupied.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Every occupied cell, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, EntityId)> + '_ {
        self.cells.iter().map(|(pos, id)| (*pos, *id))
    }

    /// Forget every cell.
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}
