//! Nexthop chassis: the PDDF chassis plus DPM reboot causes, the FPGA
//! watchdog and the FPGA ASIC thermals.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use sonic_platform_common::{
    Chassis, DeviceBase, Fan, FanDrawer, LedColor, PlatformResult, PresenceTracker, Psu,
    RebootCauseInfo, Sfp, Sysfs, Thermal, Watchdog,
};
use sonic_platform_pddf::{PddfChassis, PddfContext};
use tracing::{info, warn};

use crate::reboot_cause::{chassis_reboot_cause, RebootCauseManager};
use crate::thermal::{FpgaAsicThermal, SfpThermal};
use crate::watchdog::FpgaWatchdog;

pub struct NexthopChassis {
    pddf: PddfChassis,
    thermals: Vec<Arc<dyn Thermal>>,
    sfp_thermals: Vec<Arc<dyn Thermal>>,
    reboot_causes: Option<RebootCauseManager>,
    watchdog: OnceCell<Arc<dyn Watchdog>>,
}

impl NexthopChassis {
    /// The FPGA ASIC sensors follow the PDDF thermals, numbered on from them.
    pub fn new(pddf: PddfChassis, reboot_causes: Option<RebootCauseManager>) -> Self {
        let ctx = pddf.context();
        let mut thermals = pddf.thermals().to_vec();
        let offset = thermals.len();
        thermals.extend(
            FpgaAsicThermal::all_from_pddf(&ctx.sysfs, &ctx.data, offset)
                .into_iter()
                .map(|t| Arc::new(t) as Arc<dyn Thermal>),
        );
        let sfp_thermals = pddf
            .sfps()
            .iter()
            .map(|sfp| Arc::new(SfpThermal::new(sfp.clone())) as Arc<dyn Thermal>)
            .collect();
        Self {
            pddf,
            thermals,
            sfp_thermals,
            reboot_causes,
            watchdog: OnceCell::new(),
        }
    }

    /// Wraps a PDDF chassis, building the reboot-cause manager from its
    /// plugin data. A malformed `DPM` section leaves the chassis without
    /// one.
    pub fn from_pddf(pddf: PddfChassis) -> Self {
        let ctx = pddf.context();
        let manager = match RebootCauseManager::from_plugin(ctx.sysfs.clone(), &ctx.plugin) {
            Ok(manager) => Some(manager),
            Err(e) => {
                warn!(error = %e, "Reboot-cause manager unavailable");
                None
            }
        };
        Self::new(pddf, manager)
    }

    /// Loads the PDDF descriptions from their default locations.
    pub fn load(sysfs: Sysfs) -> PlatformResult<Self> {
        Ok(Self::from_pddf(PddfChassis::load(sysfs)?))
    }

    pub fn context(&self) -> &PddfContext {
        self.pddf.context()
    }

    /// One thermal per transceiver cage, in port order.
    pub fn sfp_thermals(&self) -> &[Arc<dyn Thermal>] {
        &self.sfp_thermals
    }

    /// Overwrites the plugin's reboot-cause file with the extra reboots, so
    /// they end up as the comment of the reported cause.
    fn attach_reboot_cause_comment(&self, comment: &str) -> PlatformResult<()> {
        let ctx = self.pddf.context();
        let Some(path) = ctx.plugin.reboot_cause.reboot_cause_file.as_deref() else {
            return Ok(());
        };
        ctx.sysfs.write_str(path, comment)
    }
}

impl DeviceBase for NexthopChassis {
    fn name(&self) -> String {
        self.pddf.name()
    }

    fn presence(&self) -> PlatformResult<bool> {
        self.pddf.presence()
    }

    fn model(&self) -> PlatformResult<String> {
        self.pddf.model()
    }

    fn serial(&self) -> PlatformResult<String> {
        self.pddf.serial()
    }

    fn revision(&self) -> PlatformResult<String> {
        self.pddf.revision()
    }

    fn status(&self) -> PlatformResult<bool> {
        self.pddf.status()
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Chassis for NexthopChassis {
    fn fan_drawers(&self) -> &[Arc<dyn FanDrawer>] {
        self.pddf.fan_drawers()
    }

    fn fans(&self) -> &[Arc<dyn Fan>] {
        self.pddf.fans()
    }

    fn psus(&self) -> &[Arc<dyn Psu>] {
        self.pddf.psus()
    }

    fn thermals(&self) -> &[Arc<dyn Thermal>] {
        &self.thermals
    }

    fn sfps(&self) -> &[Arc<dyn Sfp>] {
        self.pddf.sfps()
    }

    fn watchdog(&self) -> PlatformResult<Arc<dyn Watchdog>> {
        self.watchdog
            .get_or_try_init(|| {
                let ctx = self.pddf.context();
                let wd = FpgaWatchdog::from_pddf(ctx.sysfs.clone(), &ctx.data)?;
                Ok(Arc::new(wd) as Arc<dyn Watchdog>)
            })
            .cloned()
    }

    /// The oldest reboot since the last call. Later reboots are written to
    /// the reboot-cause file as a comment.
    fn reboot_cause(&self) -> PlatformResult<RebootCauseInfo> {
        let Some(manager) = &self.reboot_causes else {
            return Ok(RebootCauseInfo::unknown());
        };
        let causes = match manager.summarize() {
            Ok(causes) => causes,
            Err(e) => {
                warn!(error = %e, "Failed to summarize reboot causes");
                return Ok(RebootCauseInfo::unknown());
            }
        };
        let (cause, comment) = chassis_reboot_cause(&causes);
        if let Some(comment) = comment {
            info!(comment = %comment, "Multiple reboots since last boot");
            self.attach_reboot_cause_comment(&comment)?;
        }
        Ok(cause)
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        self.pddf.status_led()
    }

    fn set_status_led(&self, color: LedColor) -> PlatformResult<()> {
        self.pddf.set_status_led(color)
    }

    fn presence_tracker(&self) -> Option<&PresenceTracker> {
        self.pddf.presence_tracker()
    }
}
