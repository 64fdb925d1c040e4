//! Ordered-set representation of the world for shared key-value backends.
//!
//! A position is turned into a fixed-width binary key by interlocking the
//! bits of its two offset coordinates, most significant first. Records are
//! `key:x:y:classId:ownerId:modelName:energy:health:entityId`, so sorting
//! the records lexicographically groups entities by aligned square blocks
//! and a block becomes a single prefix range.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::entity::{Entity, EntityClass, EntityId};
use crate::error::{WorldError, WorldResult};
use crate::position::{Position, WorldBounds};
use crate::world::CellObserver;

/// Encodes positions inside a bounded square as interlocked binary keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionKeyCodec {
    origin: i32,
    digits: u32,
    limit: u32,
}

impl Default for PositionKeyCodec {
    fn default() -> Self {
        Self::for_bounds(&WorldBounds::default())
    }
}

impl PositionKeyCodec {
    /// Binary digits needed for offsets `0..=max_position`, i.e.
    /// `ceil(log2(max_position + 1))`, at least one.
    pub fn digits_for(max_position: u32) -> u32 {
        (u32::BITS - max_position.leading_zeros()).max(1)
    }

    /// A codec covering `bounds`, offsetting coordinates by `bounds.min`.
    pub fn for_bounds(bounds: &WorldBounds) -> Self {
        let span = bounds.span();
        Self {
            origin: bounds.min,
            digits: Self::digits_for(span),
            limit: span,
        }
    }

    /// A codec for non-negative coordinates with `digits` bits each.
    pub fn with_digits(digits: u32) -> Self {
        let digits = digits.clamp(1, 31);
        Self {
            origin: 0,
            digits,
            limit: (1u32 << digits) - 1,
        }
    }

    /// Bits per axis.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    fn offset(&self, coord: i32) -> Option<u32> {
        let offset = i64::from(coord) - i64::from(self.origin);
        u32::try_from(offset).ok().filter(|o| *o <= self.limit)
    }

    fn interlock(&self, ox: u32, oy: u32) -> String {
        let mut key = String::with_capacity(self.digits as usize * 2);
        for bit in (0..self.digits).rev() {
            key.push(if (ox >> bit) & 1 == 1 { '1' } else { '0' });
            key.push(if (oy >> bit) & 1 == 1 { '1' } else { '0' });
        }
        key
    }

    /// Encode a position, refusing coordinates outside the covered square.
    pub fn encode(&self, pos: Position) -> WorldResult<String> {
        match (self.offset(pos.x), self.offset(pos.y)) {
            (Some(ox), Some(oy)) => Ok(self.interlock(ox, oy)),
            _ => Err(WorldError::InvalidPosition(pos)),
        }
    }

    /// Inverse of [`encode`](Self::encode). `None` for malformed keys.
    pub fn decode(&self, key: &str) -> Option<Position> {
        if key.len() != self.digits as usize * 2 {
            return None;
        }
        let (mut ox, mut oy) = (0u32, 0u32);
        for pair in key.as_bytes().chunks(2) {
            let bit = |b: u8| match b {
                b'0' => Some(0),
                b'1' => Some(1),
                _ => None,
            };
            ox = (ox << 1) | bit(pair[0])?;
            oy = (oy << 1) | bit(pair[1])?;
        }
        let x = i32::try_from(i64::from(ox) + i64::from(self.origin)).ok()?;
        let y = i32::try_from(i64::from(oy) + i64::from(self.origin)).ok()?;
        Some(Position::new(x, y))
    }

    /// Key prefix shared by every cell of the aligned `2^exp` block that
    /// contains offset `(ox, oy)`.
    fn block_prefix(&self, ox: u32, oy: u32, exp: u32) -> String {
        let mut key = self.interlock(ox, oy);
        key.truncate(((self.digits - exp) * 2) as usize);
        key
    }
}

/// Serialize an entity as an ordered-set record.
pub fn encode_record(codec: &PositionKeyCodec, entity: &Entity) -> WorldResult<String> {
    if entity.owner_id.contains(':') || entity.model_name.contains(':') {
        return Err(WorldError::MalformedRecord(format!(
            "entity {} has ':' in owner or model",
            entity.id
        )));
    }
    let key = codec.encode(entity.position)?;
    Ok(format!(
        "{key}:{}:{}:{}:{}:{}:{}:{}:{}",
        entity.position.x,
        entity.position.y,
        entity.class.class_id(),
        entity.owner_id,
        entity.model_name,
        entity.energy,
        entity.health,
        entity.id.0
    ))
}

/// Parse a record produced by [`encode_record`].
pub fn decode_record(record: &str) -> WorldResult<Entity> {
    let malformed = || WorldError::MalformedRecord(record.to_string());
    let parts: Vec<&str> = record.split(':').collect();
    let [_, x, y, class, owner, model, energy, health, id] = parts.as_slice() else {
        return Err(malformed());
    };
    let class_id: u32 = class.parse().map_err(|_| malformed())?;
    Ok(Entity {
        id: EntityId(id.parse().map_err(|_| malformed())?),
        class: EntityClass::from_class_id(class_id).ok_or_else(malformed)?,
        position: Position::new(
            x.parse().map_err(|_| malformed())?,
            y.parse().map_err(|_| malformed())?,
        ),
        energy: energy.parse().map_err(|_| malformed())?,
        health: health.parse().map_err(|_| malformed())?,
        owner_id: (*owner).to_string(),
        model_name: (*model).to_string(),
    })
}

/// Entity records kept in a lexicographically ordered set, with an
/// id-to-record map and per-(owner, model) id sets.
#[derive(Debug, Clone, Default)]
pub struct Keyspace {
    codec: PositionKeyCodec,
    ordered: BTreeSet<String>,
    content: HashMap<EntityId, String>,
    by_model: HashMap<(String, String), BTreeSet<EntityId>>,
    rejected: u64,
}

impl Keyspace {
    /// An empty keyspace over `codec`'s square.
    pub fn new(codec: PositionKeyCodec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }

    /// The codec keys are built with.
    pub fn codec(&self) -> &PositionKeyCodec {
        &self.codec
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether no record is stored.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Updates that could not be stored because the position was outside
    /// the codec's square or the record was not encodable.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Insert or replace the record for `entity`.
    pub fn upsert(&mut self, entity: &Entity) -> WorldResult<()> {
        let record = encode_record(&self.codec, entity)?;
        self.remove(entity.id);
        self.ordered.insert(record.clone());
        self.content.insert(entity.id, record);
        if entity.class == EntityClass::Agent {
            self.by_model
                .entry((entity.owner_id.clone(), entity.model_name.clone()))
                .or_default()
                .insert(entity.id);
        }
        Ok(())
    }

    /// The stored record for `id`, decoded.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        self.content.get(&id).and_then(|r| decode_record(r).ok())
    }

    /// Drop the record for `id`, returning it.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let record = self.content.remove(&id)?;
        self.ordered.remove(&record);
        let entity = decode_record(&record).ok()?;
        let model_key = (entity.owner_id.clone(), entity.model_name.clone());
        if let Some(ids) = self.by_model.get_mut(&model_key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_model.remove(&model_key);
            }
        }
        Some(entity)
    }

    fn records_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a String> {
        self.ordered
            .range(prefix.to_string()..)
            .take_while(move |r| r.starts_with(prefix))
    }

    /// The entity standing on `pos`, if any.
    pub fn at(&self, pos: Position) -> Option<Entity> {
        let prefix = format!("{}:", self.codec.encode(pos).ok()?);
        self.records_with_prefix(&prefix)
            .next()
            .and_then(|r| decode_record(r).ok())
    }

    /// Drop whatever record sits on `pos`.
    pub fn remove_at(&mut self, pos: Position) -> Option<Entity> {
        let id = self.at(pos)?.id;
        self.remove(id)
    }

    /// Agent ids registered under `(owner_id, model_name)`.
    pub fn model_entities(&self, owner_id: &str, model_name: &str) -> Vec<EntityId> {
        self.by_model
            .get(&(owner_id.to_string(), model_name.to_string()))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every entity inside the inclusive rectangle `min..=max`.
    ///
    /// The rectangle is covered by at most 3x3 aligned blocks whose side is
    /// the largest power of two not exceeding the rectangle's longer side;
    /// each block is one prefix range, filtered to the exact rectangle.
    pub fn scan_rect(&self, min: Position, max: Position) -> Vec<Entity> {
        let clamp = |c: i32| {
            let offset = i64::from(c) - i64::from(self.codec.origin);
            offset.clamp(0, i64::from(self.codec.limit)) as u32
        };
        if min.x > max.x || min.y > max.y {
            return Vec::new();
        }
        let (x0, x1, y0, y1) = (clamp(min.x), clamp(max.x), clamp(min.y), clamp(max.y));
        let longest = (x1 - x0).max(y1 - y0) + 1;
        let exp = (u32::BITS - 1 - longest.leading_zeros()).min(self.codec.digits);

        let mut found = Vec::new();
        for bx in (x0 >> exp)..=(x1 >> exp) {
            for by in (y0 >> exp)..=(y1 >> exp) {
                let prefix = self.codec.block_prefix(bx << exp, by << exp, exp);
                found.extend(
                    self.records_with_prefix(&prefix)
                        .filter_map(|r| decode_record(r).ok())
                        .filter(|e| {
                            (min.x..=max.x).contains(&e.position.x)
                                && (min.y..=max.y).contains(&e.position.y)
                        }),
                );
            }
        }
        found
    }
}

impl CellObserver for Keyspace {
    fn on_cell_update(&mut self, position: Position, occupant: Option<&Entity>) {
        match occupant {
            Some(entity) => self.on_vitals_changed(entity),
            None => {
                self.remove_at(position);
            }
        }
    }

    fn on_vitals_changed(&mut self, entity: &Entity) {
        if let Err(err) = self.upsert(entity) {
            self.rejected += 1;
            warn!(entity = %entity.id, %err, "keyspace rejected entity");
        }
    }
}
