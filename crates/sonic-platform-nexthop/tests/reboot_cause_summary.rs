//! End-to-end reboot-cause summaries over fake DPM blackboxes.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use sonic_platform_common::{Chassis, RebootCauseInfo};
use sonic_platform_nexthop::adm1266::CUSTOM_EPOCH;
use sonic_platform_nexthop::{CauseKind, DpmLogger, NexthopChassis, RebootCauseManager, Timestamp};
use sonic_platform_pddf::{PddfChassis, PddfContext, PddfData, PddfPlugin};
use sonic_platform_test::FakeSysfs;

const CPU_NVMEM: &str = "/sys/bus/i2c/devices/2-0040/nvmem";
const CPU_COUNTER: &str = "/sys/bus/i2c/devices/2-0040/powerup_counter";
const SWITCH_NVMEM: &str = "/sys/bus/i2c/devices/3-0041/nvmem";
const SWITCH_COUNTER: &str = "/sys/bus/i2c/devices/3-0041/powerup_counter";
const SW_CAUSE_FILE: &str = "/host/reboot-cause/platform/reboot_reason";

fn plugin_json() -> String {
    let rule = r#"{
        "pdio_mask": "0b0000_0000_0000_0001",
        "gpio_mask": "0b0000_0000_0000_0000",
        "pdio_value": "0b0000_0000_0000_0001",
        "gpio_value": "0b0000_0000_0000_0000",
        "hw_cause": "PDI1_FAULT",
        "hw_desc": "Power button held",
        "reboot_cause": "REBOOT_CAUSE_HARDWARE_OTHER"
    }"#;
    format!(
        r#"{{
        "REBOOT_CAUSE": {{ "reboot_cause_file": "{SW_CAUSE_FILE}" }},
        "DPM": {{
            "cpu_card": {{
                "type": "adm1266",
                "nvmem_path": "{CPU_NVMEM}",
                "powerup_counter_path": "{CPU_COUNTER}",
                "dpm_signal_to_fault_cause": [{rule}],
                "pin_to_name": {{ "PDI1": "PWR_BTN" }}
            }},
            "switch_card": {{
                "type": "adm1266",
                "nvmem_path": "{SWITCH_NVMEM}",
                "powerup_counter_path": "{SWITCH_COUNTER}",
                "dpm_signal_to_fault_cause": [{rule}]
            }}
        }}
    }}"#
    )
}

/// One blackbox record: powerup counter, PDIO inputs and raw seconds.
fn record(powerup: u16, pdio_in: u16, secs: u64) -> Vec<u8> {
    let mut b = vec![0xffu8; 64];
    b[0..2].copy_from_slice(&7u16.to_le_bytes());
    b[2] = 0;
    b[3] = 0;
    b[4] = 0;
    b[5] = 0;
    for offset in (6..18).step_by(2) {
        b[offset..offset + 2].copy_from_slice(&[0, 0]);
    }
    b[18..20].copy_from_slice(&pdio_in.to_le_bytes());
    b[20..22].copy_from_slice(&[0, 0]);
    b[22..24].copy_from_slice(&powerup.to_le_bytes());
    b[24..26].copy_from_slice(&[0, 0]);
    b[26..32].copy_from_slice(&secs.to_le_bytes()[..6]);
    b
}

fn cpu_fault_secs() -> u64 {
    let t = Utc.with_ymd_and_hms(2025, 10, 2, 23, 22, 56).unwrap();
    (t.timestamp() - CUSTOM_EPOCH) as u64
}

fn setup() -> FakeSysfs {
    let fake = FakeSysfs::new();
    let cpu: Vec<u8> = [record(10, 0, 100), record(11, 0b1, cpu_fault_secs())].concat();
    let switch: Vec<u8> = [
        record(1, 0b1, 70),
        vec![0xff; 64],
        record(2, 0, 20),
        record(3, 0, 5),
    ]
    .concat();
    fake.bytes(CPU_NVMEM, &cpu)
        .file(CPU_COUNTER, "12\n")
        .bytes(SWITCH_NVMEM, &switch)
        .file(SWITCH_COUNTER, "3\n");
    fake
}

#[test]
fn test_summary_orders_causes_across_dpms() {
    let fake = setup();
    let plugin = PddfPlugin::from_json(&plugin_json()).unwrap();
    let manager = RebootCauseManager::from_plugin(fake.sysfs(), &plugin).unwrap();

    let causes = manager.summarize().unwrap();
    assert_eq!(causes.len(), 2);

    assert_eq!(causes[0].kind, CauseKind::Hardware);
    assert_eq!(causes[0].source, "switch_card");
    assert_eq!(causes[0].cause, "PDI1_FAULT");
    assert_eq!(
        causes[0].timestamp,
        Timestamp::SincePowerOn(std::time::Duration::from_secs(70))
    );

    assert_eq!(causes[1].source, "cpu_card");
    assert_eq!(
        causes[1].timestamp,
        Timestamp::Utc(Utc.with_ymd_and_hms(2025, 10, 2, 23, 22, 56).unwrap())
    );

    let history = DpmLogger::new(fake.sysfs()).load();
    let data = history.as_v1().unwrap();
    assert_eq!(data.causes.len(), 2);
    assert_eq!(data.dpms.len(), 2);
    assert_eq!(data.dpms[0].name, "cpu_card");
    assert_eq!(data.dpms[0].records.len(), 2);
    assert_eq!(data.dpms[1].records.len(), 3);

    assert_eq!(fake.read(CPU_NVMEM), "1");
    assert_eq!(fake.read(SWITCH_NVMEM), "1");
    assert!(manager.summarize().unwrap().is_empty());
}

#[test]
fn test_chassis_reports_oldest_and_comments_the_rest() {
    let fake = setup();
    fake.file(
        SW_CAUSE_FILE,
        "User issued 'reboot' command [User: admin, Time: Thu Oct  2 11:25:00 PM UTC 2025]",
    );
    let plugin = PddfPlugin::from_json(&plugin_json()).unwrap();
    let pddf = PddfChassis::new(PddfContext::new(fake.sysfs(), PddfData::default(), plugin));
    let chassis = NexthopChassis::from_pddf(pddf);

    let cause = chassis.reboot_cause().unwrap();
    assert_eq!(
        cause,
        RebootCauseInfo::new(
            "Hardware - Other",
            "Power button held, time: 70.000000s after power-on, src: switch_card"
        )
    );
    assert_eq!(
        fake.read(SW_CAUSE_FILE),
        "System rebooted 2 more times: \
         Hardware - Other (Power button held, time: 2025-10-02 23:22:56 UTC, src: cpu_card); \
         reboot (time: 2025-10-02 23:25:00 UTC, src: SW)"
    );

    assert!(chassis.watchdog().err().unwrap().is_not_supported());
}

#[test]
fn test_software_reboot_alone_is_non_hardware() {
    let fake = FakeSysfs::new();
    fake.bytes(CPU_NVMEM, &[])
        .file(CPU_COUNTER, "4")
        .bytes(SWITCH_NVMEM, &[0xff; 128])
        .file(SWITCH_COUNTER, "9")
        .file(
            SW_CAUSE_FILE,
            "User issued 'reboot' command [User: admin, Time: Thu Oct  2 11:25:00 PM UTC 2025]",
        );
    let plugin = PddfPlugin::from_json(&plugin_json()).unwrap();
    let pddf = PddfChassis::new(PddfContext::new(fake.sysfs(), PddfData::default(), plugin));
    let chassis = NexthopChassis::from_pddf(pddf);

    assert_eq!(
        chassis.reboot_cause().unwrap(),
        RebootCauseInfo::new("Non-Hardware", "")
    );
}
