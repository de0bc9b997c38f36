// src/machine.rs - machine profile registry
//
// Steps-per-mm and extruder count for the supported bots, with TOML
// overrides for custom machines.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown machine id '{0}'")]
    UnknownMachine(String),
}

/// Per-axis conversion between raw device steps and millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisProfile {
    pub steps_per_mm: f64,
}

/// One machine's identity and geometry as far as the bridge needs it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MachineProfile {
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_type_name")]
    pub type_name: String,
    #[serde(default = "default_extruder_count")]
    pub extruder_count: u32,
    #[serde(default = "default_xy_axis")]
    pub x: AxisProfile,
    #[serde(default = "default_xy_axis")]
    pub y: AxisProfile,
    #[serde(default = "default_z_axis")]
    pub z: AxisProfile,
    #[serde(default = "default_tool_axis")]
    pub a: AxisProfile,
    #[serde(default = "default_tool_axis")]
    pub b: AxisProfile,
}

impl MachineProfile {
    /// Built-in profile by id, or `None` for an id we don't know.
    pub fn named(id: &str) -> Option<Self> {
        match id {
            "r1" => Some(replicator_1()),
            "r2" => Some(replicator_2()),
            "r2x" => Some(replicator_2x()),
            _ => None,
        }
    }

    /// Load a custom profile from a TOML file; missing fields fall back to
    /// the Replicator 2 values.
    pub fn load(path: &str) -> Result<Self, ProfileError> {
        let contents = std::fs::read_to_string(path)?;
        let profile: MachineProfile = toml::from_str(&contents)?;
        tracing::info!(id = %profile.id, "loaded machine profile");
        Ok(profile)
    }
}

impl Default for MachineProfile {
    fn default() -> Self {
        replicator_2()
    }
}

fn replicator_1() -> MachineProfile {
    MachineProfile {
        id: "r1".to_string(),
        type_name: "Replicator".to_string(),
        extruder_count: 1,
        x: AxisProfile { steps_per_mm: 94.139704 },
        y: AxisProfile { steps_per_mm: 94.139704 },
        z: AxisProfile { steps_per_mm: 400.0 },
        a: AxisProfile { steps_per_mm: 96.275202 },
        b: AxisProfile { steps_per_mm: 96.275202 },
    }
}

fn replicator_2() -> MachineProfile {
    MachineProfile {
        id: "r2".to_string(),
        type_name: "Replicator 2".to_string(),
        extruder_count: 1,
        x: AxisProfile { steps_per_mm: 88.573186 },
        y: AxisProfile { steps_per_mm: 88.573186 },
        z: AxisProfile { steps_per_mm: 400.0 },
        a: AxisProfile { steps_per_mm: 96.275202 },
        b: AxisProfile { steps_per_mm: 96.275202 },
    }
}

fn replicator_2x() -> MachineProfile {
    MachineProfile {
        extruder_count: 2,
        id: "r2x".to_string(),
        type_name: "Replicator 2X".to_string(),
        ..replicator_2()
    }
}

fn default_id() -> String {
    "r2".to_string()
}

fn default_type_name() -> String {
    "Replicator 2".to_string()
}

fn default_extruder_count() -> u32 {
    1
}

fn default_xy_axis() -> AxisProfile {
    AxisProfile { steps_per_mm: 88.573186 }
}

fn default_z_axis() -> AxisProfile {
    AxisProfile { steps_per_mm: 400.0 }
}

fn default_tool_axis() -> AxisProfile {
    AxisProfile { steps_per_mm: 96.275202 }
}
