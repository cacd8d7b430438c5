//! Points every ADM1266 RTC at the shared custom epoch, so blackbox records
//! carry wall clock timestamps.

use sonic_platform_common::Sysfs;
use sonic_platform_pddf::PddfPlugin;
use tracing::{error, info};

use crate::adm1266::{dpm_configs, Adm1266};
use crate::dpm::DpmType;
use crate::error::{DpmError, DpmResult};

#[derive(Debug, Default)]
pub struct RtcSyncReport {
    pub synced: Vec<String>,
    pub failed: Vec<(String, DpmError)>,
}

impl RtcSyncReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Syncs every ADM1266 of the plugin's `DPM` section. A DPM that fails does
/// not stop the others.
pub fn sync_rtc(sysfs: &Sysfs, plugin: &PddfPlugin) -> DpmResult<RtcSyncReport> {
    let mut report = RtcSyncReport::default();
    for (name, config) in dpm_configs(&plugin.dpm)? {
        if config.dpm_type != DpmType::Adm1266.as_str() {
            continue;
        }
        let result = Adm1266::new(sysfs.clone(), name.clone(), config)
            .and_then(|dpm| dpm.set_rtc_epoch_offset(None));
        match result {
            Ok(()) => report.synced.push(name),
            Err(e) => {
                error!(dpm = %name, error = %e, "Failed to set RTC epoch offset");
                report.failed.push((name, e));
            }
        }
    }
    info!(synced = report.synced.len(), failed = report.failed.len(), "DPM RTC sync done");
    Ok(report)
}
