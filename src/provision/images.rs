use crate::error::BootstrapError;
use crate::runtime::ContainerRuntime;
use anyhow::{Context, Result};

/// Pull every image; the first failure aborts the run.
pub fn pull_all(runtime: &dyn ContainerRuntime, images: &[&str]) -> Result<()> {
    for image in images {
        tracing::info!(image, "pulling image");
        let output = runtime
            .pull(image)
            .with_context(|| format!("pull {image}"))?;
        if !output.success() {
            return Err(BootstrapError::ImagePull {
                image: image.to_string(),
                detail: output.detail(),
            }
            .into());
        }
        tracing::debug!(image, duration_ms = output.duration_ms, "image pulled");
    }
    Ok(())
}
