//! Loads a complete board description from the default paths and walks
//! every device through the chassis.

use sonic_platform_common::{Chassis, DeviceBase, Fan, FanDirection, Psu, Sfp, Thermal};
use sonic_platform_pddf::data::PDDF_DEVICE_JSON;
use sonic_platform_pddf::plugin::PD_PLUGIN_JSON;
use sonic_platform_pddf::PddfChassis;
use sonic_platform_test::FakeSysfs;

const DEVICE_JSON: &str = r#"{
    "PLATFORM": { "name": "x86_64-test_board-r0", "num_psus": 1, "num_fantrays": 1,
                  "num_fans_pertray": 1, "num_ports": 1, "num_temps": 1 },
    "PSU1": { "attr_list": [
        { "attr_name": "psu_present", "path": "/sys/bus/i2c/devices/3-0060/psu_present" },
        { "attr_name": "psu_power_good", "path": "/sys/bus/i2c/devices/3-0060/psu_power_good" },
        { "attr_name": "psu_v_out", "path": "/sys/bus/i2c/devices/11-0058/psu_v_out" },
        { "attr_name": "psu_fan1_speed_rpm", "path": "/sys/bus/i2c/devices/11-0058/psu_fan1_speed_rpm" },
        { "attr_name": "psu_fan_dir", "path": "/sys/bus/i2c/devices/11-0058/psu_fan_dir" }
    ] },
    "FAN-CTRL": { "attr_list": [
        { "attr_name": "fan1_present", "path": "/sys/bus/i2c/devices/3-0066/fan1_present" },
        { "attr_name": "fan1_direction", "path": "/sys/bus/i2c/devices/3-0066/fan1_direction" },
        { "attr_name": "fan1_input", "path": "/sys/bus/i2c/devices/3-0066/fan1_input" },
        { "attr_name": "fan1_pwm", "path": "/sys/bus/i2c/devices/3-0066/fan1_pwm" }
    ] },
    "TEMP1": { "attr_list": [
        { "attr_name": "temp1_input", "path": "/sys/bus/i2c/devices/15-0048/hwmon/hwmon*/temp1_input" }
    ] },
    "PORT1": { "attr_list": [
        { "attr_name": "xcvr_present", "path": "/sys/bus/i2c/devices/12-0061/module_present_1" },
        { "attr_name": "eeprom", "path": "/sys/bus/i2c/devices/25-0050/eeprom" }
    ] }
}"#;

const PLUGIN_JSON: &str = r#"{
    "PSU": { "psu_fan_dir": { "i2c": { "valmap": { "F2B": "EXHAUST", "B2F": "INTAKE" } } },
             "PSU_FAN_MAX_SPEED": "18000" },
    "FAN": { "direction": { "i2c": { "valmap": { "1": "INTAKE", "0": "EXHAUST" } } },
             "FAN_MAX_SPEED": "20000" }
}"#;

#[test]
fn test_load_and_read_every_device() {
    let fake = FakeSysfs::new();
    fake.file(PDDF_DEVICE_JSON, DEVICE_JSON)
        .file(PD_PLUGIN_JSON, PLUGIN_JSON)
        .file("/sys/bus/i2c/devices/3-0060/psu_present", "1")
        .file("/sys/bus/i2c/devices/3-0060/psu_power_good", "1")
        .file("/sys/bus/i2c/devices/11-0058/psu_v_out", "12000")
        .file("/sys/bus/i2c/devices/11-0058/psu_fan1_speed_rpm", "4500")
        .file("/sys/bus/i2c/devices/11-0058/psu_fan_dir", "F2B")
        .file("/sys/bus/i2c/devices/3-0066/fan1_present", "1")
        .file("/sys/bus/i2c/devices/3-0066/fan1_direction", "1")
        .file("/sys/bus/i2c/devices/3-0066/fan1_input", "15000")
        .file("/sys/bus/i2c/devices/3-0066/fan1_pwm", "191")
        .file("/sys/bus/i2c/devices/15-0048/hwmon/hwmon5/temp1_input", "27750")
        .file("/sys/bus/i2c/devices/12-0061/module_present_1", "1")
        .bytes("/sys/bus/i2c/devices/25-0050/eeprom", &[0x18; 256]);

    let chassis = PddfChassis::load(fake.sysfs()).unwrap();
    assert_eq!(chassis.name(), "x86_64-test_board-r0");

    let psu = &chassis.psus()[0];
    assert!(psu.status().unwrap());
    assert_eq!(psu.voltage().unwrap(), 12.0);
    let psu_fan = &psu.fans()[0];
    assert_eq!(psu_fan.direction().unwrap(), FanDirection::Exhaust);
    assert_eq!(psu_fan.speed().unwrap(), 25);

    let fan = &chassis.fans()[0];
    assert_eq!(fan.direction().unwrap(), FanDirection::Intake);
    assert_eq!(fan.speed().unwrap(), 75);
    assert_eq!(fan.target_speed().unwrap(), 75);
    assert!(!fan.is_under_speed().unwrap());
    assert!(!fan.is_over_speed().unwrap());

    assert_eq!(chassis.thermals()[0].temperature().unwrap(), 27.75);

    let sfp = chassis.get_sfp(1).unwrap();
    assert!(sfp.presence().unwrap());
    assert_eq!(
        sfp.transceiver_type().unwrap(),
        "QSFP-DD Double Density 8X Pluggable Transceiver"
    );
}

#[test]
fn test_missing_description_fails_to_load() {
    let fake = FakeSysfs::new();
    assert!(PddfChassis::load(fake.sysfs()).is_err());
}
