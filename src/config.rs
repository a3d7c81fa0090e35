//! Card configuration
//!
//! Dashboards configure the robot card in YAML. The only required field is
//! the entity id; everything else has a sensible default.

use serde::{Deserialize, Serialize};

use crate::{Result, RobotError};

fn default_true() -> bool {
    true
}

/// Configuration for one robot card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardConfig {
    /// Domain-qualified entity id, e.g. `sensor.esp32_robot_kitchen`
    pub entity: String,

    /// Card title; falls back to the entity's friendly name
    #[serde(default)]
    pub title: Option<String>,

    /// Show the FPS / stream-state row
    #[serde(default = "default_true")]
    pub show_status: bool,

    /// Show the joystick control
    #[serde(default = "default_true")]
    pub show_joystick: bool,
}

impl CardConfig {
    /// Create a config for an entity with default toggles.
    pub fn new(entity: impl Into<String>) -> Self {
        Self { entity: entity.into(), title: None, show_status: true, show_joystick: true }
    }

    /// Parse a YAML card configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CardConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| RobotError::config(format!("YAML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// The entity id is required and must be domain-qualified, since the
    /// robot id used in proxy paths is the part after the dot.
    pub fn validate(&self) -> Result<()> {
        if self.entity.is_empty() {
            return Err(RobotError::config("you need to define an entity"));
        }
        let mut parts = self.entity.splitn(2, '.');
        let domain = parts.next().unwrap_or_default();
        match parts.next() {
            Some(object_id) if !domain.is_empty() && !object_id.is_empty() => Ok(()),
            _ => Err(RobotError::config(format!(
                "entity '{}' is not a domain-qualified id",
                self.entity
            ))),
        }
    }

    /// The robot id used in proxy paths: the entity id without its domain.
    pub fn robot_id(&self) -> &str {
        self.entity.split_once('.').map(|(_, id)| id).unwrap_or(&self.entity)
    }
}
