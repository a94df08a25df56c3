//! Generate-once credential files.
//!
//! A non-empty secret file is never rewritten; removing the file out-of-band
//! is the only way to rotate a credential.
use crate::artifacts::write_atomic;
use crate::stack::{
    ProjectPaths, SecretOutcome, SecretRecord, BROKER_ADMIN_SECRET, BROKER_APP_SECRET,
    FLOW_ADMIN_SECRET,
};
use anyhow::{Context, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Written when the OS random source is unavailable. Weak on purpose and
/// always reported as such.
pub const FALLBACK_SECRET: &str = "ChangeMe-LabStack-0";
pub const SECRET_LENGTH: usize = 24;
const SECRET_FILE_MODE: u32 = 0o600;
const SECRETS_DIR_MODE: u32 = 0o700;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Source of fresh secret values.
pub trait SecretGenerator {
    fn generate(&self) -> Result<String>;
}

/// Alphanumeric secrets drawn from the operating system's random source.
#[derive(Debug, Clone, Copy)]
pub struct OsRandom {
    pub length: usize,
}

impl Default for OsRandom {
    fn default() -> Self {
        Self {
            length: SECRET_LENGTH,
        }
    }
}

impl SecretGenerator for OsRandom {
    fn generate(&self) -> Result<String> {
        let mut value = String::with_capacity(self.length);
        let mut buf = [0u8; 64];
        while value.len() < self.length {
            OsRng
                .try_fill_bytes(&mut buf)
                .context("read OS random source")?;
            // Rejection sampling keeps the alphabet uniform: 248 = 4 * 62.
            for byte in buf.iter().copied().filter(|byte| *byte < 248) {
                value.push(ALPHABET[usize::from(byte) % ALPHABET.len()] as char);
                if value.len() == self.length {
                    break;
                }
            }
        }
        Ok(value)
    }
}

/// Create the secret at `path` unless a non-empty one already exists.
pub fn ensure_secret<G>(path: &Path, generator: &G) -> Result<SecretOutcome>
where
    G: SecretGenerator + ?Sized,
{
    if let Ok(meta) = fs::metadata(path) {
        if meta.is_file() && meta.len() > 0 {
            tracing::info!(path = %path.display(), "reusing existing secret");
            return Ok(SecretOutcome::Reused);
        }
    }

    let (value, outcome) = match generator.generate() {
        Ok(value) => (value, SecretOutcome::Created),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{err:#}"),
                "no secure random source; writing the weak fallback secret, replace it before sharing this stack"
            );
            (FALLBACK_SECRET.to_string(), SecretOutcome::CreatedWeak)
        }
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    write_atomic(path, value.as_bytes(), SECRET_FILE_MODE)
        .with_context(|| format!("write secret {}", path.display()))?;
    tracing::info!(path = %path.display(), "created secret");
    Ok(outcome)
}

/// Read a secret value back, ignoring a trailing newline added by hand edits.
pub fn read_secret(path: &Path) -> Result<String> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read secret {}", path.display()))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

/// Generated credentials for one run.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub broker_admin: String,
    pub broker_app: String,
    pub flow_admin: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("broker_admin", &"<redacted>")
            .field("broker_app", &"<redacted>")
            .field("flow_admin", &"<redacted>")
            .finish()
    }
}

/// Ensure every stack secret exists and load their values.
pub fn provision_secrets<G>(
    paths: &ProjectPaths,
    generator: &G,
) -> Result<(Secrets, Vec<SecretRecord>)>
where
    G: SecretGenerator + ?Sized,
{
    let dir = paths.secrets_dir();
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    if let Err(err) = fs::set_permissions(&dir, fs::Permissions::from_mode(SECRETS_DIR_MODE)) {
        tracing::warn!(path = %dir.display(), error = %err, "could not restrict secrets directory");
    }

    let mut records = Vec::new();
    for name in [BROKER_ADMIN_SECRET, BROKER_APP_SECRET, FLOW_ADMIN_SECRET] {
        let outcome = ensure_secret(&paths.secret_path(name), generator)?;
        records.push(SecretRecord {
            name: name.to_string(),
            outcome,
        });
    }
    let secrets = Secrets {
        broker_admin: read_secret(&paths.secret_path(BROKER_ADMIN_SECRET))?,
        broker_app: read_secret(&paths.secret_path(BROKER_APP_SECRET))?,
        flow_admin: read_secret(&paths.secret_path(FLOW_ADMIN_SECRET))?,
    };
    Ok((secrets, records))
}
