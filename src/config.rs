//! Deployment configuration
//!
//! Everything that differs between robots lives here: the poll interval, the
//! gamepad adapter settings and the table mapping channel identities to raw
//! device indices. Stored as TOML:
//!
//! ```toml
//! [dispatcher]
//! poll_interval_ms = 20
//!
//! [gamepad]
//! joystick_deadzone = 0.05
//! refresh_interval_ms = 10
//!
//! [[channels.buttons]]
//! button = "A"
//! index = 1
//!
//! [[channels.axes]]
//! axis = "Joy1X"
//! index = 0
//! ```

use crate::listener::listenable::{Axis, Button};
use crate::listener::ManagerSettings;
use crate::source::{GamepadSettings, RawIndexTable};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Button {0:?} has no raw index")]
    MissingButton(Button),

    #[error("Button {0:?} is mapped more than once")]
    DuplicateButton(Button),

    #[error("Axis {0:?} has no raw index")]
    MissingAxis(Axis),

    #[error("Axis {0:?} is mapped more than once")]
    DuplicateAxis(Axis),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonBinding {
    pub button: Button,
    pub index: u32,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisBinding {
    pub axis: Axis,
    pub index: u32,
}

/// Serializable form of the [`RawIndexTable`]
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelMap {
    pub buttons: Vec<ButtonBinding>,
    pub axes: Vec<AxisBinding>,
}

impl ChannelMap {
    /// Builds the index table; every button and axis must appear exactly once.
    pub fn to_table(&self) -> Result<RawIndexTable, ConfigError> {
        let mut buttons: [Option<u32>; Button::COUNT] = [None; Button::COUNT];
        for binding in &self.buttons {
            let slot = &mut buttons[binding.button.index()];
            if slot.replace(binding.index).is_some() {
                return Err(ConfigError::DuplicateButton(binding.button));
            }
        }

        let mut axes: [Option<u32>; Axis::COUNT] = [None; Axis::COUNT];
        for binding in &self.axes {
            let slot = &mut axes[binding.axis.index()];
            if slot.replace(binding.index).is_some() {
                return Err(ConfigError::DuplicateAxis(binding.axis));
            }
        }

        let mut button_table = [0; Button::COUNT];
        for button in Button::ALL {
            button_table[button.index()] =
                buttons[button.index()].ok_or(ConfigError::MissingButton(button))?;
        }

        let mut axis_table = [0; Axis::COUNT];
        for axis in Axis::ALL {
            axis_table[axis.index()] = axes[axis.index()].ok_or(ConfigError::MissingAxis(axis))?;
        }

        Ok(RawIndexTable::new(button_table, axis_table))
    }
}

impl From<RawIndexTable> for ChannelMap {
    fn from(table: RawIndexTable) -> Self {
        Self {
            buttons: Button::ALL
                .into_iter()
                .map(|button| ButtonBinding {
                    button,
                    index: table.button(button),
                })
                .collect(),
            axes: Axis::ALL
                .into_iter()
                .map(|axis| AxisBinding {
                    axis,
                    index: table.axis(axis),
                })
                .collect(),
        }
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        RawIndexTable::default().into()
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dispatcher: ManagerSettings,
    pub gamepad: GamepadSettings,
    pub channels: ChannelMap,
}

impl Config {
    /// `<config dir>/controlpoll/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("controlpoll").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: Config = toml::from_str(&content)?;
        config.channels.to_table()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults
    pub async fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::load(path).await,
            Ok(false) => {
                info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Saved config to {}", path.display());
        Ok(())
    }

    pub fn index_table(&self) -> Result<RawIndexTable, ConfigError> {
        self.channels.to_table()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_map_matches_default_table() {
        let table = ChannelMap::default().to_table().unwrap();
        assert_eq!(table, RawIndexTable::default());
    }

    #[test]
    fn missing_and_duplicate_bindings_are_rejected() {
        let mut map = ChannelMap::default();
        map.buttons.retain(|binding| binding.button != Button::Start);
        assert!(matches!(
            map.to_table(),
            Err(ConfigError::MissingButton(Button::Start))
        ));

        let mut map = ChannelMap::default();
        map.axes.push(AxisBinding {
            axis: Axis::Joy1Y,
            index: 7,
        });
        assert!(matches!(
            map.to_table(),
            Err(ConfigError::DuplicateAxis(Axis::Joy1Y))
        ));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str("[dispatcher]\npoll_interval_ms = 5\n").unwrap();
        assert_eq!(config.dispatcher.poll_interval_ms, 5);
        assert_eq!(config.gamepad, GamepadSettings::default());
        assert_eq!(config.channels, ChannelMap::default());
    }

    #[tokio::test]
    async fn save_then_load_keeps_custom_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.dispatcher.poll_interval_ms = 50;
        config.channels.axes[0].index = 3;
        config.save(&path).await.unwrap();

        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.index_table().unwrap().axis(Axis::Joy1X), 3);
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn invalid_table_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[channels]\nbuttons = []\n")
            .await
            .unwrap();

        assert!(matches!(
            Config::load(&path).await,
            Err(ConfigError::MissingButton(Button::A))
        ));
    }
}
