//! The streamed IDL document must be valid JSON describing the full
//! device, including the mandatory commands, events and properties of
//! every feature.

mod common;

use common::Rig;
use hdc_device::{
    ArgSpec, Command, DType, Event, Exception, Feature, HDC_VERSION, Property, PropertyCell,
    State, Value, exc_id,
};
use serde_json::Value as Json;

fn demo_features() -> Vec<Feature> {
    vec![
        Feature::new(0x00, "Core", "MinimalCore", "1.0.0")
            .with_doc("Core feature of the minimal demo.")
            .with_state(State::new(0x00, "Off"))
            .with_state(State::new(0x01, "Initializing"))
            .with_state(State::new(0x02, "Ready"))
            .with_state(State::new(0xFF, "Error"))
            .with_command(
                Command::new(0x01, "Reset", |ctx, _req| ctx.reply_void())
                    .with_doc("Reinitializes the whole device.")
                    .raises(Exception::not_now()),
            )
            .with_event(
                Event::new(0x01, "ButtonEvent")
                    .with_doc("Notifies host about the button being pressed on the device.")
                    .arg(ArgSpec::named(DType::UInt8, "ButtonID"))
                    .arg(ArgSpec::named(DType::UInt8, "ButtonState")),
            )
            .with_property(
                Property::new(0x10, "uC_DEVID", DType::UInt32)
                    .read_only()
                    .with_getter(|_| Value::UInt32(0x449))
                    .with_doc("32bit Device-ID of the microcontroller."),
            )
            .with_property(
                Property::new(0x12, "uC_UID", DType::Blob)
                    .read_only()
                    .with_size(12)
                    .backed_by(PropertyCell::zeroed(12)),
            ),
        Feature::new(0x01, "Blinky", "LedBlinker", "0.3")
            .with_property(
                Property::new(0x13, "LedBlinkingRate", DType::UInt8)
                    .backed_by(PropertyCell::new(vec![5u8])),
            ),
    ]
}

fn fetch_idl(rig: &mut Rig) -> Json {
    let replies = rig.request(&[0xF0, 0xF2]);
    assert_eq!(replies.len(), 1);
    let message = &replies[0];
    assert_eq!(&message[..2], &[0xF0, 0xF2]);
    serde_json::from_slice(&message[2..]).expect("IDL reply must be valid JSON")
}

#[test]
fn idl_document_describes_the_device() {
    let mut rig = Rig::new(demo_features());
    let idl = fetch_idl(&mut rig);

    assert_eq!(idl["version"], HDC_VERSION);
    assert_eq!(idl["max_req"], 128);

    let features = idl["features"].as_array().unwrap();
    assert_eq!(features.len(), 2);

    let core = &features[0];
    assert_eq!(core["id"], 0);
    assert_eq!(core["name"], "Core");
    assert_eq!(core["cls"], "MinimalCore");
    assert_eq!(core["version"], "1.0.0");
    assert_eq!(core["doc"], "Core feature of the minimal demo.");
    assert_eq!(core["states"].as_array().unwrap().len(), 4);
    assert_eq!(core["states"][3]["id"], 0xFF);
}

#[test]
fn every_feature_lists_the_mandatory_descriptors() {
    let mut rig = Rig::new(demo_features());
    let idl = fetch_idl(&mut rig);

    for feature in idl["features"].as_array().unwrap() {
        let commands = feature["commands"].as_array().unwrap();
        let names: Vec<&str> = commands.iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"GetPropertyValue"));
        assert!(names.contains(&"SetPropertyValue"));

        let events = feature["events"].as_array().unwrap();
        let names: Vec<&str> = events.iter().map(|e| e["name"].as_str().unwrap()).collect();
        assert!(names.contains(&"Log"));
        assert!(names.contains(&"FeatureStateTransition"));

        let properties = feature["properties"].as_array().unwrap();
        let names: Vec<&str> = properties
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"LogEventThreshold"));
        assert!(names.contains(&"FeatureState"));
    }
}

#[test]
fn command_metadata_is_complete() {
    let mut rig = Rig::new(demo_features());
    let idl = fetch_idl(&mut rig);

    let commands = idl["features"][0]["commands"].as_array().unwrap();
    let reset = commands.iter().find(|c| c["name"] == "Reset").unwrap();
    assert_eq!(reset["id"], 1);
    assert_eq!(reset["doc"], "Reinitializes the whole device.");
    assert_eq!(reset["raises"][0]["id"], exc_id::NOT_NOW);
    assert_eq!(reset["raises"][0]["name"], "NotNow");

    let get = commands
        .iter()
        .find(|c| c["name"] == "GetPropertyValue")
        .unwrap();
    assert_eq!(get["id"], 0xF0);
    assert_eq!(get["args"][0]["dtype"], "UINT8");
    assert_eq!(get["args"][0]["name"], "PropertyID");
    assert_eq!(get["returns"][0]["dtype"], "BLOB");
    assert_eq!(get["raises"][0]["name"], "UnknownProperty");
}

#[test]
fn property_metadata_reports_dtype_size_and_readonly() {
    let mut rig = Rig::new(demo_features());
    let idl = fetch_idl(&mut rig);

    let properties = idl["features"][0]["properties"].as_array().unwrap();

    let devid = properties.iter().find(|p| p["name"] == "uC_DEVID").unwrap();
    assert_eq!(devid["dtype"], "UINT32");
    assert_eq!(devid["ro"], true);
    // Fixed-size dtypes carry no "size" key.
    assert!(devid.get("size").is_none());

    let uid = properties.iter().find(|p| p["name"] == "uC_UID").unwrap();
    assert_eq!(uid["dtype"], "BLOB");
    assert_eq!(uid["size"], 12);

    let rate = &idl["features"][1]["properties"][0];
    assert_eq!(rate["name"], "LedBlinkingRate");
    assert_eq!(rate["ro"], false);
}

#[test]
fn absent_docs_are_omitted_not_null() {
    let mut rig = Rig::new(demo_features());
    let idl = fetch_idl(&mut rig);

    // Blinky has no doc string at all.
    let blinky = &idl["features"][1];
    assert!(blinky.get("doc").is_none());
}

#[test]
fn idl_spans_multiple_packets() {
    let mut rig = Rig::new(demo_features());
    let replies = rig.request(&[0xF0, 0xF2]);
    // The document is far larger than one 255-byte packet; arriving as
    // one message proves multi-packet reassembly end to end.
    assert!(replies[0].len() > 600);
}
