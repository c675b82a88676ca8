//! Building a rig from a TOML configuration.

use std::io::Write;
use std::time::Duration;

use rig_core::{ParamValue, RigConfig, SamplePayload};
use rig_driver_mock::{build_all, build_device};

const RIG: &str = r#"
[logging]
level = "debug"

[acquisition]
join_timeout = "2s"
event_channel_capacity = 2

[[devices]]
id = "spec0"
kind = "spectrometer"

[devices.parameters]
integration_time_ms = 50
trigger_mode = 0

[devices.options]
pixels = 16
read_latency_ms = 1

[[devices]]
id = "cam0"
kind = "camera"

[devices.parameters]
camera_id = 2
color_mode = 2

[devices.options]
width = 8
height = 8
available_ids = [2]
read_latency_ms = 1

[[devices]]
id = "ser0"
kind = "serial"

[devices.parameters]
comport = "COM3"
baud_rate = 57600

[devices.options]
available_ports = ["COM3"]
read_latency_ms = 1
"#;

#[test]
fn builds_and_runs_every_configured_device() {
    let config = RigConfig::from_toml_str(RIG).unwrap();
    assert_eq!(config.acquisition.join_timeout, Duration::from_secs(2));

    let devices = build_all(&config).unwrap();
    let names: Vec<&str> = devices.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["spec0", "cam0", "ser0"]);

    for device in &devices {
        device.connect().unwrap();
        assert_eq!(device.current_state(), "ON");
        let sample = device.capture_once().unwrap();
        assert_eq!(sample.sequence, 1);
        device.disconnect().unwrap();
        assert_eq!(device.current_state(), "DISCONNECTED");
    }

    assert_eq!(
        devices[0].get("integration_time_ms").unwrap(),
        ParamValue::Float(50.0)
    );
    assert_eq!(devices[1].get("camera_id").unwrap(), ParamValue::Int(2));
}

#[test]
fn options_reach_the_backend() {
    let config = RigConfig::from_toml_str(RIG).unwrap();
    let spec = build_device(&config.devices[0]).unwrap();
    spec.connect().unwrap();
    match &spec.capture_once().unwrap().payload {
        SamplePayload::Spectrum(values) => assert_eq!(values.len(), 16),
        other => panic!("unexpected payload {:?}", other),
    }
}

#[test]
fn duplicate_ids_are_rejected() {
    let toml = r#"
[[devices]]
id = "a"
kind = "camera"

[[devices]]
id = "a"
kind = "serial"
"#;
    let config = RigConfig::from_toml_str(toml).unwrap();
    assert!(build_all(&config).is_err());
}

#[test]
fn loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(RIG.as_bytes()).unwrap();

    let config = RigConfig::load_from(file.path()).unwrap();
    assert_eq!(config.devices.len(), 3);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn control_surface_subscription() {
    let config = RigConfig::from_toml_str(RIG).unwrap();
    let device = build_device(&config.devices[2]).unwrap();
    let (_id, mut rx) = device.subscribe_channel(4);
    device.connect().unwrap();
    device.capture_once().unwrap();

    let sample = rx.try_recv().unwrap();
    assert_eq!(sample.payload, SamplePayload::Text("MOCK-SERIAL v1.0\r\n".to_string()));
}

#[test]
fn buffered_subscription_uses_configured_capacity() {
    let config = RigConfig::from_toml_str(RIG).unwrap();
    let devices = build_all(&config).unwrap();
    let serial = &devices[2];
    let (_id, mut rx) = serial.subscribe_buffered();
    serial.connect().unwrap();
    for _ in 0..3 {
        serial.capture_once().unwrap();
    }

    let received: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|sample| sample.sequence)
        .collect();
    assert_eq!(received, vec![1, 2]);
}
