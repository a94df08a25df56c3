//! Named-volume lifecycle: create-if-absent, and wipe on a fresh start.
use crate::error::BootstrapError;
use crate::runtime::ContainerRuntime;
use crate::stack::VolumeSpec;
use anyhow::{Context, Result};

pub struct VolumeLifecycle<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> VolumeLifecycle<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Create the volume unless it already exists.
    pub fn ensure(&self, name: &str) -> Result<()> {
        if self
            .runtime
            .volume_exists(name)
            .with_context(|| format!("inspect volume {name}"))?
        {
            tracing::debug!(volume = name, "volume present");
            return Ok(());
        }
        let output = self
            .runtime
            .volume_create(name)
            .with_context(|| format!("create volume {name}"))?;
        if !output.success() {
            return Err(BootstrapError::CommandFailed {
                step: format!("create volume {name}"),
                exit: output.exit_display(),
                detail: output.detail(),
            }
            .into());
        }
        tracing::info!(volume = name, "volume created");
        Ok(())
    }

    /// Remove the volume and its contents; an absent volume is already wiped.
    pub fn wipe(&self, name: &str) -> Result<()> {
        if !self
            .runtime
            .volume_exists(name)
            .with_context(|| format!("inspect volume {name}"))?
        {
            tracing::debug!(volume = name, "volume already absent");
            return Ok(());
        }
        let output = self
            .runtime
            .volume_remove(name)
            .with_context(|| format!("remove volume {name}"))?;
        if !output.success() {
            return Err(BootstrapError::CommandFailed {
                step: format!("remove volume {name}"),
                exit: output.exit_display(),
                detail: output.detail(),
            }
            .into());
        }
        tracing::info!(volume = name, "volume wiped");
        Ok(())
    }

    /// Bring every declared volume into existence, wiping first when `fresh`.
    ///
    /// A fresh start stops the stack before wiping so no volume is in use.
    pub fn prepare(&self, volumes: &[VolumeSpec], fresh: bool) -> Result<Vec<String>> {
        if fresh {
            tracing::warn!("fresh start requested; removing all service data");
            match self.runtime.compose_down() {
                Ok(output) if output.success() => {}
                Ok(output) => tracing::warn!(
                    exit = %output.exit_display(),
                    detail = %output.detail(),
                    "compose down failed; continuing with volume removal"
                ),
                Err(err) => tracing::warn!(
                    error = %format!("{err:#}"),
                    "compose down failed; continuing with volume removal"
                ),
            }
            for volume in volumes {
                self.wipe(&volume.name)?;
            }
        }
        let mut prepared = Vec::with_capacity(volumes.len());
        for volume in volumes {
            self.ensure(&volume.name)?;
            prepared.push(volume.name.clone());
        }
        Ok(prepared)
    }
}
