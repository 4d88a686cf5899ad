//! Configuration management.
//!
//! The configuration names the remote instances the client can talk to and
//! which one is active. It lives as a YAML file under the per-user
//! configuration directory; `LMCLI_CONFIG_DIR` overrides the location for
//! tests and non-standard setups. Credentials are never stored here.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_APPLICATION_ID: &str = "lmcli";
pub const DEFAULT_CONFIGURATION_FILE_NAME: &str = "config.yml";
pub const CONFIG_DIR_ENV: &str = "LMCLI_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to resolve the configuration directory")]
    FailedToFindConfigurationDirectory,
    #[error("failed to load configuration data, because of: {cause:?}")]
    FailedToLoadData { cause: Box<dyn std::error::Error> },
    #[error("failed to write configuration data to file, because of: {cause:?}")]
    FailedToWriteData { cause: Box<dyn std::error::Error> },
    #[error("no instance named {name:?} is configured")]
    UnknownInstance { name: String },
    #[error("no active instance is set; run `lmcli config set active --name <name>`")]
    NoActiveInstance,
}

/// A configured remote deployment: a name and the API base URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub base_url: Url,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(skip_serializing_if = "Option::is_none")]
    active_instance: Option<String>,
    #[serde(default)]
    instances: BTreeMap<String, Instance>,
}

impl Configuration {
    pub fn get_default_configuration_file_path() -> Result<PathBuf, ConfigurationError> {
        // Environment override takes precedence over the platform directory.
        if let Ok(config_dir_str) = std::env::var(CONFIG_DIR_ENV) {
            let mut config_path = PathBuf::from(config_dir_str);
            config_path.push(DEFAULT_CONFIGURATION_FILE_NAME);
            return Ok(config_path);
        }

        match config_dir() {
            Some(configuration_directory) => {
                let mut default_config_file_path = configuration_directory;
                default_config_file_path.push(DEFAULT_APPLICATION_ID);
                default_config_file_path.push(DEFAULT_CONFIGURATION_FILE_NAME);
                Ok(default_config_file_path)
            }
            None => Err(ConfigurationError::FailedToFindConfigurationDirectory),
        }
    }

    /// Load the default configuration, creating an empty one if none exists.
    pub fn load_or_create_default() -> Result<Configuration, ConfigurationError> {
        let default_file_path = Configuration::get_default_configuration_file_path()?;
        debug!("Loading configuration from {:?}...", default_file_path);

        match Configuration::load_from_file(default_file_path.clone()) {
            Ok(configuration) => Ok(configuration),
            Err(ConfigurationError::FailedToLoadData { cause })
                if cause
                    .downcast_ref::<std::io::Error>()
                    .map(|e| e.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false) =>
            {
                debug!("Configuration file not found, creating default configuration");
                let configuration = Configuration::default();
                configuration.save(&default_file_path)?;
                Ok(configuration)
            }
            Err(e) => Err(e),
        }
    }

    pub fn load_from_file(path: PathBuf) -> Result<Configuration, ConfigurationError> {
        match fs::read_to_string(path) {
            Ok(content) => serde_yaml::from_str(&content)
                .map_err(|cause| ConfigurationError::FailedToLoadData {
                    cause: Box::new(cause),
                }),
            Err(cause) => Err(ConfigurationError::FailedToLoadData {
                cause: Box::new(cause),
            }),
        }
    }

    pub fn save(&self, path: &PathBuf) -> Result<(), ConfigurationError> {
        let configuration_directory = path
            .parent()
            .ok_or(ConfigurationError::FailedToFindConfigurationDirectory)?;
        fs::create_dir_all(configuration_directory)
            .map_err(|_| ConfigurationError::FailedToFindConfigurationDirectory)?;

        let file = File::create(path)
            .map_err(|e| ConfigurationError::FailedToWriteData { cause: Box::new(e) })?;
        self.write(Box::new(file))
    }

    pub fn write(&self, writer: Box<dyn Write>) -> Result<(), ConfigurationError> {
        serde_yaml::to_writer(writer, self)
            .map_err(|e| ConfigurationError::FailedToWriteData { cause: Box::new(e) })
    }

    pub fn save_to_default(&self) -> Result<(), ConfigurationError> {
        self.save(&Self::get_default_configuration_file_path()?)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instance(&self, name: &str) -> Result<&Instance, ConfigurationError> {
        self.instances
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownInstance {
                name: name.to_string(),
            })
    }

    pub fn add_instance(&mut self, instance: Instance) {
        if self.active_instance.is_none() {
            self.active_instance = Some(instance.name.clone());
        }
        self.instances.insert(instance.name.clone(), instance);
    }

    pub fn delete_instance(&mut self, name: &str) {
        self.instances.remove(name);
        if self.active_instance.as_deref() == Some(name) {
            self.active_instance = None;
        }
    }

    pub fn active_instance_name(&self) -> Option<&str> {
        self.active_instance.as_deref()
    }

    pub fn set_active_instance(&mut self, name: &str) -> Result<(), ConfigurationError> {
        self.instance(name)?;
        self.active_instance = Some(name.to_string());
        Ok(())
    }

    /// Resolve the instance a command should run against: the explicit name
    /// when one is given, the active instance otherwise.
    pub fn resolve_instance(&self, name: Option<&str>) -> Result<&Instance, ConfigurationError> {
        match name {
            Some(name) => self.instance(name),
            None => {
                let active = self
                    .active_instance
                    .as_deref()
                    .ok_or(ConfigurationError::NoActiveInstance)?;
                self.instance(active)
            }
        }
    }
}
