//! Whole-chassis behaviour over a fake AS4630 sysfs tree.

use pretty_assertions::assert_eq;
use sonic_platform_accton::{AccChassis, Namespace};
use sonic_platform_common::{Chassis, DeviceBase, Fan, FanDirection, PresenceChange, Psu, Thermal};
use sonic_platform_test::fixtures::{hwmon_fixtures, i2c_fixtures};
use sonic_platform_test::{FakeSysfs, SysfsVerifier};

const PORT_CPLD: &str = "/sys/bus/i2c/devices/13-0061";

fn board() -> FakeSysfs {
    let fake = FakeSysfs::new();
    let mut fan_attrs = vec![("fan_duty_cycle_percentage".to_string(), "50".to_string())];
    for tray in 1..=3 {
        fan_attrs.push((format!("fan_present_{tray}"), "1".to_string()));
        fan_attrs.push((format!("fan_direction_{tray}"), "0".to_string()));
        fan_attrs.push((format!("fan{tray}_input"), "6250".to_string()));
        fan_attrs.push((format!("fan_fault_{tray}"), "0".to_string()));
    }
    let fan_attrs: Vec<(&str, &str)> = fan_attrs
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    i2c_fixtures::client(&fake, 3, 0x60, &fan_attrs);

    i2c_fixtures::client(&fake, 10, 0x50, &[("psu_present", "1"), ("psu_power_good", "1")]);
    i2c_fixtures::client(&fake, 11, 0x51, &[("psu_present", "0"), ("psu_power_good", "0")]);
    i2c_fixtures::client(&fake, 10, 0x58, &[("psu_p_out", "98000")]);

    hwmon_fixtures::i2c_hwmon(&fake, 14, 0x48, 4, &[("temp1_input", "33000")]);
    hwmon_fixtures::coretemp(&fake, 0, &[("temp1_input", "51000")]);

    for port in 1..=16 {
        fake.file(format!("{PORT_CPLD}/module_present_{port}"), "0");
    }
    fake
}

#[test]
fn test_inventory_readings() {
    let fake = board();
    let chassis = AccChassis::with_namespace(fake.sysfs(), Namespace::Host).unwrap();

    for fan in chassis.fans() {
        assert_eq!(fan.speed().unwrap(), 50);
        assert_eq!(fan.direction().unwrap(), FanDirection::Intake);
        assert!(fan.status().unwrap());
    }

    let psus = chassis.psus();
    assert!(psus[0].presence().unwrap());
    assert_eq!(psus[0].power().unwrap(), 98.0);
    assert!(!psus[1].presence().unwrap());
    assert_eq!(psus[1].power().unwrap(), 0.0);
    assert_eq!(
        psus[1].fans()[0].direction().unwrap(),
        FanDirection::NotApplicable
    );

    let temps: Vec<(String, Option<f64>)> = chassis
        .thermals()
        .iter()
        .take(4)
        .map(|t| (t.name(), t.temperature().ok()))
        .collect();
    assert_eq!(
        temps,
        vec![
            ("MB_temp(0x48)".to_string(), Some(33.0)),
            ("CB_temp(0x4B)".to_string(), None),
            ("FB_temp(0x4A)".to_string(), None),
            ("CPU_Package_temp".to_string(), Some(51.0)),
        ]
    );
}

#[test]
fn test_change_event_reports_insert_then_remove() {
    let fake = board();
    let chassis = AccChassis::with_namespace(fake.sysfs(), Namespace::Host).unwrap();

    fake.file(format!("{PORT_CPLD}/module_present_7"), "1");
    let event = chassis.change_event(10).unwrap();
    assert_eq!(event.sfp.len(), 16);
    assert_eq!(event.sfp.get(&7), Some(&PresenceChange::Inserted));
    assert_eq!(event.sfp.get(&8), Some(&PresenceChange::Removed));

    assert!(chassis.change_event(10).unwrap().is_empty());

    fake.file(format!("{PORT_CPLD}/module_present_7"), "0");
    let event = chassis.change_event(10).unwrap();
    assert_eq!(event.sfp.get(&7), Some(&PresenceChange::Removed));
}

#[test]
fn test_fan_speed_request_lands_on_cpld() {
    let fake = board();
    fake.dir("/tmp");
    let chassis = AccChassis::with_namespace(fake.sysfs(), Namespace::Pmon).unwrap();

    chassis.fans()[0].set_speed(75).unwrap();
    SysfsVerifier::new(&fake)
        .assert_content("/sys/bus/i2c/devices/3-0060/fan_duty_cycle_percentage", "75")
        .unwrap();
    SysfsVerifier::new(&fake)
        .assert_content("/tmp/fan_target_speed", "75")
        .unwrap();
    assert_eq!(chassis.fans()[2].target_speed().unwrap(), 75);
}
