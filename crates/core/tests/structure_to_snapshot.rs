//! End-to-end through `structure::parse_building` and the live entity
//! graph: a two-room document, live value updates across rooms, a
//! multi-leaf aggregate, and the persist-reset cycle.

use loxone_core::model::ChangeClass;
use loxone_core::structure::parse_building;

fn document() -> &'static str {
    r#"{
        "msInfo": { "msName": "Home", "serialNr": "504F00001234" },
        "lastModified": "2024-01-01T00:00:00.000Z",
        "globalStates": {},
        "rooms": {
            "r1": { "uuid": "room-1", "name": "Kitchen" },
            "r2": { "uuid": "room-2", "name": "Bedroom" }
        },
        "controls": {
            "shade1": {
                "type": "Jalousie",
                "room": "room-1",
                "states": { "position": "00000000-0000-0000-0000-000000000001" }
            },
            "shade2": {
                "type": "Jalousie",
                "room": "room-1",
                "states": { "position": "00000000-0000-0000-0000-000000000002" }
            },
            "presence": {
                "type": "PresenceDetector",
                "room": "room-2",
                "states": { "active": "00000000-0000-0000-0000-000000000003" }
            }
        }
    }"#
}

#[test]
fn live_updates_across_two_rooms_flow_into_independent_snapshots() {
    let mut building = parse_building(document()).unwrap();
    assert_eq!(building.rooms.len(), 2);
    assert_eq!(building.change, ChangeClass::No);

    // Two shading leaves in the same room average into one aggregate.
    let change = building.update("00000000-0000-0000-0000-000000000001", Some(20.0));
    assert_eq!(change, ChangeClass::Later);
    building.update("00000000-0000-0000-0000-000000000002", Some(40.0));
    assert_eq!(building.change, ChangeClass::Later);

    // An unrelated room's presence sensor is an immediate change and wins
    // the building-wide urgency even though shading was reported first.
    let change = building.update("00000000-0000-0000-0000-000000000003", Some(1.0));
    assert_eq!(change, ChangeClass::Immediate);
    assert_eq!(building.change, ChangeClass::Immediate);

    let snapshots = building.snapshots();
    let kitchen = snapshots.iter().find(|s| s.id == "room-1").unwrap();
    let bedroom = snapshots.iter().find(|s| s.id == "room-2").unwrap();
    assert_eq!(kitchen.shading, Some(30.0));
    assert_eq!(bedroom.presence, Some(true));

    building.mark_persisted(1_000);
    assert_eq!(building.change, ChangeClass::No);
    assert_eq!(building.last_persisted, Some(1_000));
}

#[test]
fn unknown_identifier_does_not_disturb_the_change_class() {
    let mut building = parse_building(document()).unwrap();
    let change = building.update("not-a-known-identifier", Some(1.0));
    assert_eq!(change, ChangeClass::No);
    assert_eq!(building.change, ChangeClass::No);
}
