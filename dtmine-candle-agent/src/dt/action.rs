//! Action groups and sampling settings.
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use dtmine_core::error::DtError;
use serde::{Deserialize, Serialize};

/// Widths of the three logit groups produced by the action head.
///
/// The action head outputs `action_size()` logits per timestep, laid out as
/// `[button | camera | esc]`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ActionGroups {
    /// Number of button actions.
    pub agent_num_button_actions: usize,

    /// Number of camera actions.
    pub agent_num_camera_actions: usize,

    /// Number of escape button actions.
    pub agent_esc_button: usize,
}

impl ActionGroups {
    /// Creates action groups.
    pub fn new(button: usize, camera: usize, esc: usize) -> Self {
        Self {
            agent_num_button_actions: button,
            agent_num_camera_actions: camera,
            agent_esc_button: esc,
        }
    }

    /// Total number of logits.
    pub fn action_size(&self) -> usize {
        self.agent_num_button_actions + self.agent_num_camera_actions + self.agent_esc_button
    }

    /// Checks that all groups are non-empty.
    pub fn check(&self) -> Result<(), DtError> {
        if self.agent_num_button_actions == 0
            || self.agent_num_camera_actions == 0
            || self.agent_esc_button == 0
        {
            return Err(DtError::InvalidConfig(format!(
                "action groups must be positive, got {:?}",
                self
            )));
        }
        Ok(())
    }

    /// Splits `logits` along the last dimension into button, camera and esc groups.
    pub fn split(&self, logits: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let width = logits.dim(D::Minus1)?;
        if width != self.action_size() {
            return Err(DtError::shape("action logits", self.action_size(), width).into());
        }
        let nb = self.agent_num_button_actions;
        let nc = self.agent_num_camera_actions;
        let ne = self.agent_esc_button;
        Ok((
            logits.narrow(D::Minus1, 0, nb)?.contiguous()?,
            logits.narrow(D::Minus1, nb, nc)?.contiguous()?,
            logits.narrow(D::Minus1, nb + nc, ne)?.contiguous()?,
        ))
    }
}

/// One decoded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtAction {
    /// Index of the button action.
    pub button: i64,

    /// Index of the camera action.
    pub camera: i64,

    /// Index of the escape action.
    pub esc: i64,
}

impl DtAction {
    /// `[button, camera, esc]`
    pub fn to_vec(&self) -> Vec<i64> {
        vec![self.button, self.camera, self.esc]
    }

    /// Returns the action as an i64 tensor of shape `[1, 3]`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::new(&[[self.button, self.camera, self.esc]], device)?)
    }
}

fn default_temperature() -> f64 {
    1.0
}

/// Per-group sampling temperatures and the escape-disable switch.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_temperature")]
    pub temperature_buttons: f64,

    #[serde(default = "default_temperature")]
    pub temperature_camera: f64,

    #[serde(default = "default_temperature")]
    pub temperature_esc: f64,

    /// If `true`, the escape channel of decoded actions is always 0.
    #[serde(default)]
    pub disable_esc_button: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature_buttons: default_temperature(),
            temperature_camera: default_temperature(),
            temperature_esc: default_temperature(),
            disable_esc_button: false,
        }
    }
}

impl SamplingConfig {
    /// Sets the three temperatures.
    pub fn temperatures(mut self, buttons: f64, camera: f64, esc: f64) -> Self {
        self.temperature_buttons = buttons;
        self.temperature_camera = camera;
        self.temperature_esc = esc;
        self
    }

    /// Sets the escape-disable switch.
    pub fn disable_esc_button(mut self, v: bool) -> Self {
        self.disable_esc_button = v;
        self
    }

    /// Checks that all temperatures are finite and positive.
    pub fn check(&self) -> Result<(), DtError> {
        for (name, t) in [
            ("temperature_buttons", self.temperature_buttons),
            ("temperature_camera", self.temperature_camera),
            ("temperature_esc", self.temperature_esc),
        ]
        .iter()
        {
            if !(t.is_finite() && *t > 0.0) {
                return Err(DtError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, t
                )));
            }
        }
        Ok(())
    }
}
