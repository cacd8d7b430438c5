//! Fan trays. Each tray carries a single fan.

use std::sync::Arc;

use sonic_platform_common::{DeviceBase, Fan, FanDrawer, LedColor, PlatformResult, Sysfs};

use crate::fan::AccFan;
use crate::platform::Namespace;

/// Number of fan trays.
pub const NUM_FAN_TRAYS: usize = 3;

pub struct AccFanDrawer {
    index: usize,
    fans: Vec<Arc<dyn Fan>>,
}

impl AccFanDrawer {
    /// Tray `index` (1-based).
    pub fn new(sysfs: Sysfs, namespace: Namespace, index: usize) -> Self {
        Self {
            index,
            fans: vec![Arc::new(AccFan::tray(sysfs, namespace, index))],
        }
    }

    fn fan(&self) -> &Arc<dyn Fan> {
        &self.fans[0]
    }
}

impl DeviceBase for AccFanDrawer {
    fn name(&self) -> String {
        format!("FanTray{}", self.index)
    }

    fn presence(&self) -> PlatformResult<bool> {
        self.fan().presence()
    }

    fn status(&self) -> PlatformResult<bool> {
        self.fan().status()
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.index)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl FanDrawer for AccFanDrawer {
    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn status_led(&self) -> PlatformResult<LedColor> {
        self.fan().status_led()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fan::{FAN_CPLD_ADDR, FAN_CPLD_BUS};
    use sonic_platform_test::fixtures::i2c_fixtures;
    use sonic_platform_test::FakeSysfs;

    #[test]
    fn test_drawer_follows_its_fan() {
        let fake = FakeSysfs::new();
        i2c_fixtures::client(
            &fake,
            FAN_CPLD_BUS,
            FAN_CPLD_ADDR,
            &[("fan_present_3", "1"), ("fan_fault_3", "1")],
        );
        let drawer = AccFanDrawer::new(fake.sysfs(), Namespace::Host, 3);

        assert_eq!(drawer.name(), "FanTray3");
        assert_eq!(drawer.num_fans(), 1);
        assert_eq!(drawer.fans()[0].name(), "FAN-3");
        assert!(drawer.presence().unwrap());
        assert!(!drawer.status().unwrap());
        assert_eq!(drawer.status_led().unwrap(), LedColor::Red);
    }
}
