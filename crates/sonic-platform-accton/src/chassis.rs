//! The chassis: owns every device and answers reboot-cause queries.

use std::sync::Arc;

use sonic_platform_common::{
    Chassis, Component, DeviceBase, Fan, FanDrawer, PlatformResult, PresenceTracker, Psu,
    RebootCauseCategory, RebootCauseInfo, Sfp, Sysfs, Thermal, Watchdog,
};
use tracing::warn;

use crate::component::AccComponent;
use crate::fan_drawer::{AccFanDrawer, NUM_FAN_TRAYS};
use crate::platform::Namespace;
use crate::psu::{AccPsu, NUM_PSUS};
use crate::sfp::{AccSfp, NUM_PORTS};
use crate::thermal::{AccThermal, SENSORS};
use crate::watchdog::AccWatchdog;

pub const PLATFORM_NAME: &str = "AS4630-54NPE";

/// Software reboot cause written by the reboot scripts.
pub const REBOOT_CAUSE_FILE: &str = "/host/reboot-cause/reboot-cause.txt";

pub struct AccChassis {
    sysfs: Sysfs,
    namespace: Namespace,
    fan_drawers: Vec<Arc<dyn FanDrawer>>,
    fans: Vec<Arc<dyn Fan>>,
    psus: Vec<Arc<dyn Psu>>,
    thermals: Vec<Arc<dyn Thermal>>,
    sfps: Vec<Arc<dyn Sfp>>,
    components: Vec<Arc<dyn Component>>,
    presence: PresenceTracker,
}

impl AccChassis {
    pub fn new(sysfs: Sysfs) -> PlatformResult<Self> {
        let namespace = Namespace::detect(&sysfs);
        Self::with_namespace(sysfs, namespace)
    }

    pub fn with_namespace(sysfs: Sysfs, namespace: Namespace) -> PlatformResult<Self> {
        let drawers: Vec<AccFanDrawer> = (1..=NUM_FAN_TRAYS)
            .map(|i| AccFanDrawer::new(sysfs.clone(), namespace, i))
            .collect();
        let fans = drawers
            .iter()
            .flat_map(|d| d.fans().iter().cloned())
            .collect();
        let fan_drawers = drawers
            .into_iter()
            .map(|d| Arc::new(d) as Arc<dyn FanDrawer>)
            .collect();
        let psus = (1..=NUM_PSUS)
            .map(|i| Arc::new(AccPsu::new(sysfs.clone(), namespace, i)) as Arc<dyn Psu>)
            .collect();
        let thermals = (1..=SENSORS.len())
            .map(|i| Ok(Arc::new(AccThermal::new(sysfs.clone(), i)?) as Arc<dyn Thermal>))
            .collect::<PlatformResult<_>>()?;
        let sfps = (1..=NUM_PORTS)
            .map(|i| Arc::new(AccSfp::new(sysfs.clone(), i)) as Arc<dyn Sfp>)
            .collect();
        let components = AccComponent::all(&sysfs)
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn Component>)
            .collect();

        Ok(Self {
            sysfs,
            namespace,
            fan_drawers,
            fans,
            psus,
            thermals,
            sfps,
            components,
            presence: PresenceTracker::new(),
        })
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }
}

impl DeviceBase for AccChassis {
    fn name(&self) -> String {
        PLATFORM_NAME.to_string()
    }

    fn presence(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn status(&self) -> PlatformResult<bool> {
        Ok(true)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(false)
    }
}

impl Chassis for AccChassis {
    fn fan_drawers(&self) -> &[Arc<dyn FanDrawer>] {
        &self.fan_drawers
    }

    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn psus(&self) -> &[Arc<dyn Psu>] {
        &self.psus
    }

    fn thermals(&self) -> &[Arc<dyn Thermal>] {
        &self.thermals
    }

    fn sfps(&self) -> &[Arc<dyn Sfp>] {
        &self.sfps
    }

    fn components(&self) -> &[Arc<dyn Component>] {
        &self.components
    }

    fn watchdog(&self) -> PlatformResult<Arc<dyn Watchdog>> {
        Ok(Arc::new(AccWatchdog::new(&self.sysfs, self.namespace)?))
    }

    /// The board keeps no hardware cause register, so every reboot is
    /// reported as software with the recorded reason.
    fn reboot_cause(&self) -> PlatformResult<RebootCauseInfo> {
        let description = match self.sysfs.read_str(REBOOT_CAUSE_FILE) {
            Ok(text) => text,
            Err(e) => {
                warn!("No software reboot cause: {e}");
                "Unknown".to_string()
            }
        };
        Ok(RebootCauseInfo::new(
            RebootCauseCategory::NonHardware.as_str(),
            description,
        ))
    }

    fn presence_tracker(&self) -> Option<&PresenceTracker> {
        Some(&self.presence)
    }
}
