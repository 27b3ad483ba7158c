//! Parses the controller's `LoxAPP3.json` structure document into a
//! [`crate::model::Building`] (C6's construction phase).
//!
//! Grounded on the Python reference's `Building`/`Room` constructors: for
//! each room, gather the controls whose `room` field names it, bucket them
//! by `type`, and wire one leaf per relevant state into the room's
//! aggregates. The measurement bindings below are transcribed verbatim from
//! that constructor; `valve` has no controller binding in the reference and
//! stays an always-empty aggregate here too.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{Builder, Building, ChangeClass, Room};

#[derive(Debug, Deserialize)]
struct MsInfo {
    #[serde(rename = "msName")]
    ms_name: String,
    #[serde(rename = "serialNr")]
    serial_nr: String,
}

#[derive(Debug, Deserialize)]
struct RoomDef {
    uuid: String,
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct ControlDef {
    #[serde(rename = "type")]
    kind: Option<String>,
    room: Option<String>,
    states: Option<HashMap<String, String>>,
    #[serde(rename = "subControls", default)]
    sub_controls: HashMap<String, ControlDef>,
}

#[derive(Debug, Deserialize)]
struct StructureDoc {
    #[serde(rename = "msInfo")]
    ms_info: MsInfo,
    #[serde(rename = "lastModified")]
    last_modified: String,
    rooms: HashMap<String, RoomDef>,
    controls: HashMap<String, ControlDef>,
    #[serde(rename = "globalStates", default)]
    global_states: HashMap<String, String>,
}

/// Parse a raw `LoxAPP3.json` document and build the entity graph it
/// describes.
pub fn parse_building(json: &str) -> Result<Building> {
    let doc: StructureDoc = serde_json::from_str(json)?;
    build(doc)
}

fn state_id<'a>(states: &'a Option<HashMap<String, String>>, key: &str) -> Option<&'a str> {
    states.as_ref().and_then(|m| m.get(key)).map(|s| s.as_str())
}

fn build(doc: StructureDoc) -> Result<Building> {
    let mut builder = Builder::new();

    // Register global states purely so unknown-identifier logging in
    // Building::update has something to attribute them to; none of them
    // currently feed a room aggregate.
    for id in doc.global_states.values() {
        let _ = id;
    }

    let mut rooms = Vec::with_capacity(doc.rooms.len());
    for room_def in doc.rooms.values() {
        let controls: Vec<&ControlDef> = doc
            .controls
            .values()
            .filter(|c| c.room.as_deref() == Some(room_def.uuid.as_str()))
            .collect();

        let heating: Vec<&ControlDef> = controls
            .iter()
            .copied()
            .filter(|c| c.kind.as_deref() == Some("IRoomControllerV2"))
            .collect();
        let lights: Vec<&ControlDef> = controls
            .iter()
            .copied()
            .filter(|c| c.kind.as_deref() == Some("LightControllerV2"))
            .collect();
        let switches: Vec<&ControlDef> = lights
            .iter()
            .flat_map(|lc| lc.sub_controls.values())
            .filter(|sc| sc.kind.as_deref() == Some("Switch"))
            .collect();
        let presence: Vec<&ControlDef> = controls
            .iter()
            .copied()
            .filter(|c| c.kind.as_deref() == Some("PresenceDetector"))
            .collect();
        let shades: Vec<&ControlDef> = controls
            .iter()
            .copied()
            .filter(|c| c.kind.as_deref() == Some("Jalousie"))
            .collect();

        let mut temperature_leaves = Vec::new();
        let mut temperature_target_leaves = Vec::new();
        let mut humidity_leaves = Vec::new();
        let mut ventilation_leaves = Vec::new();
        for hc in &heating {
            if let Some(id) = state_id(&hc.states, "tempActual") {
                temperature_leaves.push(builder.rounded_leaf(id, ChangeClass::Later, 0.5)?);
            }
            if let Some(id) = state_id(&hc.states, "tempTarget") {
                temperature_target_leaves.push(builder.rounded_leaf(id, ChangeClass::Later, 0.5)?);
            }
            if let Some(id) = state_id(&hc.states, "humidityActual") {
                humidity_leaves.push(builder.rounded_leaf(id, ChangeClass::Later, 0.5)?);
            }
            if let Some(id) = state_id(&hc.states, "openWindow") {
                ventilation_leaves.push(builder.bool_leaf(id, ChangeClass::Later)?);
            }
        }

        let mut light_leaves = Vec::new();
        for sc in &switches {
            if let Some(id) = state_id(&sc.states, "active") {
                light_leaves.push(builder.bool_leaf(id, ChangeClass::Immediate)?);
            }
        }

        let mut shading_leaves = Vec::new();
        for sc in &shades {
            if let Some(id) = state_id(&sc.states, "position") {
                shading_leaves.push(builder.rounded_leaf(id, ChangeClass::Later, 1.0)?);
            }
        }

        let mut presence_leaves = Vec::new();
        for pc in &presence {
            if let Some(id) = state_id(&pc.states, "active") {
                presence_leaves.push(builder.bool_leaf(id, ChangeClass::Immediate)?);
            }
        }

        rooms.push(Room {
            id: room_def.uuid.clone(),
            name: room_def.name.clone(),
            temperature: builder.mean_aggregate(temperature_leaves),
            temperature_target: builder.mean_aggregate(temperature_target_leaves),
            humidity: builder.mean_aggregate(humidity_leaves),
            light: builder.or_aggregate(light_leaves),
            shading: builder.mean_aggregate(shading_leaves),
            // No controller type in the structure document maps to a valve
            // measurement; the aggregate always reduces to null.
            valve: builder.mean_aggregate(vec![]),
            ventilation: builder.or_aggregate(ventilation_leaves),
            presence: builder.or_aggregate(presence_leaves),
        });
    }

    if rooms.is_empty() {
        return Err(Error::MissingField("rooms"));
    }

    Ok(builder.build(doc.ms_info.ms_name, doc.ms_info.serial_nr, doc.last_modified, rooms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> String {
        r#"{
            "msInfo": { "msName": "Home", "serialNr": "504F00001234" },
            "lastModified": "2024-01-01T00:00:00.000Z",
            "globalStates": {},
            "rooms": {
                "r1": { "uuid": "room-uuid-1", "name": "Kitchen" }
            },
            "controls": {
                "c1": {
                    "type": "IRoomControllerV2",
                    "room": "room-uuid-1",
                    "states": {
                        "tempActual": "0b0b0b0b-0000-0000-0000000000000001",
                        "tempTarget": "0b0b0b0b-0000-0000-0000000000000002",
                        "humidityActual": "0b0b0b0b-0000-0000-0000000000000003",
                        "openWindow": "0b0b0b0b-0000-0000-0000000000000004"
                    }
                },
                "c2": {
                    "type": "LightControllerV2",
                    "room": "room-uuid-1",
                    "subControls": {
                        "c2.1": {
                            "type": "Switch",
                            "states": { "active": "0b0b0b0b-0000-0000-0000000000000005" }
                        }
                    }
                },
                "c3": {
                    "type": "PresenceDetector",
                    "room": "room-uuid-1",
                    "states": { "active": "0b0b0b0b-0000-0000-0000000000000006" }
                },
                "c4": {
                    "type": "Jalousie",
                    "room": "room-uuid-1",
                    "states": { "position": "0b0b0b0b-0000-0000-0000000000000007" }
                }
            }
        }"#
        .to_string()
    }

    #[test]
    fn parses_rooms_and_wires_leaves() {
        let building = parse_building(&sample_document()).unwrap();
        assert_eq!(building.name, "Home");
        assert_eq!(building.serial, "504F00001234");
        assert_eq!(building.rooms.len(), 1);
        assert_eq!(building.rooms[0].name, "Kitchen");
    }

    #[test]
    fn updates_route_through_parsed_identifiers() {
        let mut building = parse_building(&sample_document()).unwrap();
        let change = building.update("0b0b0b0b-0000-0000-0000000000000005", Some(1.0));
        assert_eq!(change, ChangeClass::Immediate);
        let snapshot = building.snapshots().remove(0);
        assert_eq!(snapshot.light, Some(true));
        assert_eq!(snapshot.valve, None);
    }

    #[test]
    fn rejects_document_with_no_rooms() {
        let doc = r#"{
            "msInfo": { "msName": "Home", "serialNr": "x" },
            "lastModified": "2024-01-01T00:00:00.000Z",
            "globalStates": {},
            "rooms": {},
            "controls": {}
        }"#;
        assert!(matches!(parse_building(doc), Err(Error::MissingField("rooms"))));
    }
}
