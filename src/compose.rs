use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// File name of the compose project description inside an app directory.
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// The slice of a `docker-compose.yml` the update core cares about:
/// which services exist and which pinned image each one runs.
#[derive(Debug, Deserialize)]
pub struct ComposeInfo {
    #[serde(default)]
    services: BTreeMap<String, Service>,
}

#[derive(Debug, Deserialize)]
struct Service {
    image: Option<String>,
}

impl ComposeInfo {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_yaml::from_str(&fs::read_to_string(path)?)?)
    }

    /// `(service name, image reference)` for every service. A service
    /// without an image reference cannot be registered and is an error.
    pub fn images(&self) -> Result<Vec<(&str, &str)>> {
        self.services
            .iter()
            .map(|(name, service)| {
                service
                    .image
                    .as_deref()
                    .map(|image| (name.as_str(), image))
                    .ok_or_else(|| Error::MissingImage(name.clone()))
            })
            .collect()
    }
}
