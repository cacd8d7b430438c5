//! Power supplies.
//!
//! Electrical attributes follow the hwmon units: `psu_v_out` in mV,
//! `psu_i_out` in mA, `psu_p_out` in µW and `psu_temp1_input` in m°C.
//! An attribute's `mult` overrides the default scale.

use std::sync::Arc;

use sonic_platform_common::{DeviceBase, Fan, PlatformResult, Psu};

use crate::context::PddfContext;
use crate::fan::PddfFan;

const MILLI: f64 = 0.001;
const MICRO: f64 = 0.000_001;

pub struct PddfPsu {
    ctx: PddfContext,
    index: usize,
    device: String,
    fans: Vec<Arc<dyn Fan>>,
}

impl PddfPsu {
    /// PSU `index` (1-based), keyed `PSU{index}` in the board description.
    pub fn new(ctx: PddfContext, index: usize) -> Self {
        let fans = (1..=ctx.data.platform.num_psu_fans)
            .map(|fan| Arc::new(PddfFan::psu_fan(ctx.clone(), index, fan)) as Arc<dyn Fan>)
            .collect();
        Self {
            device: format!("PSU{index}"),
            ctx,
            index,
            fans,
        }
    }
}

impl DeviceBase for PddfPsu {
    fn name(&self) -> String {
        self.ctx.display_name(&self.device)
    }

    fn presence(&self) -> PlatformResult<bool> {
        self.ctx.read_flag(
            &self.device,
            "psu_present",
            self.ctx.plugin.psu.psu_present.as_ref(),
        )
    }

    fn model(&self) -> PlatformResult<String> {
        self.ctx.read_str(&self.device, "psu_model_name")
    }

    fn serial(&self) -> PlatformResult<String> {
        self.ctx.read_str(&self.device, "psu_serial_num")
    }

    fn revision(&self) -> PlatformResult<String> {
        self.ctx.read_str(&self.device, "psu_mfr_revision")
    }

    fn status(&self) -> PlatformResult<bool> {
        self.powergood_status()
    }

    fn position_in_parent(&self) -> PlatformResult<usize> {
        Ok(self.index)
    }

    fn is_replaceable(&self) -> PlatformResult<bool> {
        Ok(true)
    }
}

impl Psu for PddfPsu {
    fn fans(&self) -> &[Arc<dyn Fan>] {
        &self.fans
    }

    fn voltage(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_v_out", MILLI)
    }

    fn current(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_i_out", MILLI)
    }

    fn power(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_p_out", MICRO)
    }

    fn powergood_status(&self) -> PlatformResult<bool> {
        self.ctx.read_flag(
            &self.device,
            "psu_power_good",
            self.ctx.plugin.psu.psu_power_good.as_ref(),
        )
    }

    fn temperature(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_temp1_input", MILLI)
    }

    fn temperature_high_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_temp1_high_threshold", MILLI)
    }

    fn voltage_high_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_v_out_max", MILLI)
    }

    fn voltage_low_threshold(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_v_out_min", MILLI)
    }

    fn maximum_supplied_power(&self) -> PlatformResult<f64> {
        self.ctx.read_scaled(&self.device, "psu_p_out_max", MICRO)
    }
}
