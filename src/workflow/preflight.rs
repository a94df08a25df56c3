use crate::error::BootstrapError;
use crate::stack::Config;
use anyhow::Result;

/// Resolve every external tool the run shells out to.
pub fn preflight(config: &Config) -> Result<()> {
    let mut tools = vec![config.runtime.binary.as_str()];
    if let Some(head) = config.runtime.compose.first() {
        if !tools.contains(&head.as_str()) {
            tools.push(head);
        }
    }
    for tool in tools {
        match which::which(tool) {
            Ok(path) => tracing::debug!(tool, path = %path.display(), "tool found"),
            Err(_) => {
                return Err(BootstrapError::MissingTool {
                    tool: tool.to_string(),
                }
                .into())
            }
        }
    }
    Ok(())
}
