//! Typed entity graph for rooms and per-measurement aggregates (C6).
//!
//! Leaves and the registry are built in two phases — first allocate every
//! `Leaf`, then install it into the registry keyed by identifier — so the
//! registry never needs a back-pointer into the leaves it owns (spec note:
//! avoid the `RawValue` ↔ registry reference cycle the Python original has).

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Urgency of a change. Ordered `No < Later < Immediate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeClass {
    No,
    Later,
    Immediate,
}

/// A single nullable scalar: either a coerced boolean or a quantized number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
}

/// How a leaf turns a raw wire value into its stored representation.
#[derive(Debug, Clone, Copy)]
enum LeafKind {
    Bool,
    Rounded { scale: f64 },
}

impl LeafKind {
    fn coerce(self, raw: f64) -> Value {
        match self {
            LeafKind::Bool => Value::Bool(raw != 0.0),
            LeafKind::Rounded { scale } => Value::Number((raw / scale).round() * scale),
        }
    }
}

/// One leaf measurement: a single identifier-UUID's most recent quantized
/// value, plus the change class an update to it should report.
#[derive(Debug)]
pub struct Leaf {
    kind: LeafKind,
    change_class: ChangeClass,
    value: Option<Value>,
}

impl Leaf {
    fn new_bool(change_class: ChangeClass) -> Self {
        Leaf {
            kind: LeafKind::Bool,
            change_class,
            value: None,
        }
    }

    fn new_rounded(change_class: ChangeClass, scale: f64) -> Self {
        Leaf {
            kind: LeafKind::Rounded { scale },
            change_class,
            value: None,
        }
    }

    pub fn value(&self) -> Option<Value> {
        self.value
    }

    /// Quantize/coerce `raw`, compare to the stored value *after*
    /// quantization, and only report a change class when it actually moved.
    fn set(&mut self, raw: Option<f64>) -> ChangeClass {
        let candidate = raw.map(|v| self.kind.coerce(v));
        if candidate == self.value {
            return ChangeClass::No;
        }
        self.value = candidate;
        self.change_class
    }
}

/// A reduction over a set of leaves. Pull-on-read: no caching.
#[derive(Debug, Clone, Copy)]
pub enum AggregateKind {
    Or,
    And,
    Mean,
    /// Lower-median convention: on an even-length input, the smaller of the
    /// two middle elements (an arbitrary but documented choice — the
    /// reference leaves this unspecified).
    Median,
}

/// An aggregate over zero or more leaves, identified by index into the
/// `Building`'s leaf arena.
pub struct Aggregate {
    kind: AggregateKind,
    leaves: Vec<usize>,
}

impl Aggregate {
    fn get(&self, arena: &[Leaf]) -> Option<Value> {
        match self.kind {
            AggregateKind::Or | AggregateKind::And => {
                let values: Vec<bool> = self
                    .leaves
                    .iter()
                    .filter_map(|&i| arena[i].value())
                    .map(|v| match v {
                        Value::Bool(b) => b,
                        Value::Number(n) => n != 0.0,
                    })
                    .collect();
                if values.is_empty() {
                    return None;
                }
                let reduced = match self.kind {
                    AggregateKind::Or => values.iter().any(|&b| b),
                    AggregateKind::And => values.iter().all(|&b| b),
                    _ => unreachable!(),
                };
                Some(Value::Bool(reduced))
            }
            AggregateKind::Mean | AggregateKind::Median => {
                let mut values: Vec<f64> = self
                    .leaves
                    .iter()
                    .filter_map(|&i| arena[i].value())
                    .map(|v| match v {
                        Value::Number(n) => n,
                        Value::Bool(b) => b as u8 as f64,
                    })
                    .collect();
                if values.is_empty() {
                    return None;
                }
                let reduced = match self.kind {
                    AggregateKind::Mean => values.iter().sum::<f64>() / values.len() as f64,
                    AggregateKind::Median => {
                        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
                        let mid = (values.len() - 1) / 2;
                        values[mid]
                    }
                    _ => unreachable!(),
                };
                Some(Value::Number(reduced))
            }
        }
    }

    pub fn value_as_bool(&self, arena: &[Leaf]) -> Option<bool> {
        self.get(arena).map(|v| match v {
            Value::Bool(b) => b,
            Value::Number(n) => n != 0.0,
        })
    }

    pub fn value_as_f64(&self, arena: &[Leaf]) -> Option<f64> {
        self.get(arena).map(|v| match v {
            Value::Number(n) => n,
            Value::Bool(b) => b as u8 as f64,
        })
    }
}

/// One room: a name plus one aggregate per measurement kind.
pub struct Room {
    pub id: String,
    pub name: String,
    pub temperature: Aggregate,
    pub temperature_target: Aggregate,
    pub humidity: Aggregate,
    pub light: Aggregate,
    pub shading: Aggregate,
    pub valve: Aggregate,
    pub ventilation: Aggregate,
    pub presence: Aggregate,
}

/// A snapshot-ready view of one room, with nullable measurement columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub temperature: Option<f64>,
    pub temperature_target: Option<f64>,
    pub humidity: Option<f64>,
    pub light: Option<bool>,
    pub shading: Option<f64>,
    pub valve: Option<f64>,
    pub ventilation: Option<bool>,
    pub presence: Option<bool>,
}

impl RoomSnapshot {
    /// True when every measurement is null — such a room is skipped by the
    /// persistence loop rather than writing an all-NULL row.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.temperature_target.is_none()
            && self.humidity.is_none()
            && self.light.is_none()
            && self.shading.is_none()
            && self.valve.is_none()
            && self.ventilation.is_none()
            && self.presence.is_none()
    }
}

impl Room {
    pub fn snapshot(&self, arena: &[Leaf]) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            temperature: self.temperature.value_as_f64(arena),
            temperature_target: self.temperature_target.value_as_f64(arena),
            humidity: self.humidity.value_as_f64(arena),
            light: self.light.value_as_bool(arena),
            shading: self.shading.value_as_f64(arena),
            valve: self.valve.value_as_f64(arena),
            ventilation: self.ventilation.value_as_bool(arena),
            presence: self.presence.value_as_bool(arena),
        }
    }
}

/// The entity graph: every room, every leaf, and the identifier → leaf
/// routing table. The routing table is frozen after construction.
pub struct Building {
    pub name: String,
    pub serial: String,
    pub last_modified: String,
    pub rooms: Vec<Room>,
    leaves: Vec<Leaf>,
    routing: HashMap<String, usize>,
    pub change: ChangeClass,
    pub last_persisted: Option<i64>,
}

/// Accumulates leaves and their routing during two-phase construction.
/// Dropped once `Building` is built.
pub struct Builder {
    leaves: Vec<Leaf>,
    routing: HashMap<String, usize>,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            leaves: Vec::new(),
            routing: HashMap::new(),
        }
    }

    fn install(&mut self, identifier: &str, leaf: Leaf) -> Result<usize> {
        let index = self.leaves.len();
        self.leaves.push(leaf);
        if self.routing.insert(identifier.to_string(), index).is_some() {
            return Err(Error::DuplicateIdentifier(identifier.to_string()));
        }
        Ok(index)
    }

    pub fn bool_leaf(&mut self, identifier: &str, change_class: ChangeClass) -> Result<usize> {
        self.install(identifier, Leaf::new_bool(change_class))
    }

    pub fn rounded_leaf(
        &mut self,
        identifier: &str,
        change_class: ChangeClass,
        scale: f64,
    ) -> Result<usize> {
        self.install(identifier, Leaf::new_rounded(change_class, scale))
    }

    pub fn or_aggregate(&self, leaves: Vec<usize>) -> Aggregate {
        Aggregate { kind: AggregateKind::Or, leaves }
    }

    pub fn mean_aggregate(&self, leaves: Vec<usize>) -> Aggregate {
        Aggregate { kind: AggregateKind::Mean, leaves }
    }

    #[allow(dead_code)]
    pub fn and_aggregate(&self, leaves: Vec<usize>) -> Aggregate {
        Aggregate { kind: AggregateKind::And, leaves }
    }

    #[allow(dead_code)]
    pub fn median_aggregate(&self, leaves: Vec<usize>) -> Aggregate {
        Aggregate { kind: AggregateKind::Median, leaves }
    }

    pub fn build(
        self,
        name: String,
        serial: String,
        last_modified: String,
        rooms: Vec<Room>,
    ) -> Building {
        Building {
            name,
            serial,
            last_modified,
            rooms,
            leaves: self.leaves,
            routing: self.routing,
            change: ChangeClass::No,
            last_persisted: None,
        }
    }
}

impl Building {
    /// Route a wire update to its leaf. Unknown identifiers classify as
    /// `No` and are not an error (spec §4.6/§7).
    pub fn update(&mut self, identifier: &str, raw: Option<f64>) -> ChangeClass {
        let Some(&index) = self.routing.get(identifier) else {
            tracing::debug!(identifier, "update for unregistered identifier");
            return ChangeClass::No;
        };
        let response = self.leaves[index].set(raw);
        self.change = self.change.max(response);
        response
    }

    pub fn snapshots(&self) -> Vec<RoomSnapshot> {
        self.rooms.iter().map(|r| r.snapshot(&self.leaves)).collect()
    }

    pub fn mark_persisted(&mut self, at_unix_seconds: i64) {
        self.last_persisted = Some(at_unix_seconds);
        self.change = ChangeClass::No;
    }
}
