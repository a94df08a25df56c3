//! Failure evidence gathered when the broker never reports a running state.
//!
//! Collection is best effort: each missing piece is logged and skipped, and
//! whatever was gathered is left under `diagnostics/<run-stamp>/`.
use crate::runtime::ContainerRuntime;
use crate::util::truncate_string;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const LOGS_FILE: &str = "broker-logs.txt";
const FFST_FILE: &str = "broker-ffst.txt";
const PS_FILE: &str = "compose-ps.txt";
const FDC_LISTING: &str = "ls -t /var/mqm/errors/*.FDC 2>/dev/null | head -n 1";
const MAX_FFST_BYTES: usize = 64 * 1024;

/// Header fields kept from a first-failure-capture record.
const FFST_FIELDS: &[&str] = &[
    "Date/Time",
    "Probe Id",
    "Component",
    "Program Name",
    "Major Errorcode",
    "Minor Errorcode",
    "Comment1",
    "Probe Description",
];

pub struct DiagnosticsCollector<'a> {
    runtime: &'a dyn ContainerRuntime,
    container: String,
    dir: PathBuf,
    log_tail: u32,
    timeout: Option<Duration>,
}

impl<'a> DiagnosticsCollector<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        container: &str,
        dir: PathBuf,
        log_tail: u32,
    ) -> Self {
        Self {
            runtime,
            container: container.to_string(),
            dir,
            log_tail,
            timeout: None,
        }
    }

    /// Bound every container call made while collecting.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Gather logs, the newest FDC record and service status into the
    /// diagnostics directory.
    pub fn collect(&self) -> PathBuf {
        tracing::info!(dir = %self.dir.display(), "collecting broker diagnostics");
        if let Err(err) = fs::create_dir_all(&self.dir) {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %err,
                "cannot create diagnostics directory"
            );
            return self.dir.clone();
        }
        for (name, result) in [
            (LOGS_FILE, self.log_tail_text()),
            (FFST_FILE, self.latest_ffst()),
            (PS_FILE, self.service_status()),
        ] {
            let written = result.and_then(|text| {
                let path = self.dir.join(name);
                fs::write(&path, text).with_context(|| format!("write {}", path.display()))
            });
            if let Err(err) = written {
                tracing::warn!(file = name, error = %format!("{err:#}"), "diagnostic skipped");
            }
        }
        self.dir.clone()
    }

    fn log_tail_text(&self) -> Result<String> {
        let output = self
            .runtime
            .logs(&self.container, self.log_tail, self.timeout)
            .context("read broker logs")?;
        if output.timed_out {
            bail!("broker logs timed out");
        }
        // Container logs interleave both streams.
        let mut text = output.stdout;
        if !output.stderr.is_empty() {
            text.push_str(&output.stderr);
        }
        Ok(text)
    }

    fn latest_ffst(&self) -> Result<String> {
        let listing = self
            .runtime
            .exec(&self.container, &["sh", "-c", FDC_LISTING], self.timeout)
            .context("list FDC files")?;
        if listing.timed_out {
            bail!("listing FDC files timed out");
        }
        let Some(file) = listing.stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok("no first-failure-capture records found\n".to_string());
        };
        let body = self
            .runtime
            .exec(&self.container, &["cat", file], self.timeout)
            .with_context(|| format!("read {file}"))?;
        if body.timed_out {
            bail!("reading {file} timed out");
        }
        let body = truncate_string(&body.stdout, MAX_FFST_BYTES);
        let mut text = format!("source: {file}\n");
        text.push_str(&filter_ffst(&body)?);
        Ok(text)
    }

    fn service_status(&self) -> Result<String> {
        let output = self.runtime.compose_ps(self.timeout).context("compose ps")?;
        if output.timed_out {
            bail!("compose ps timed out");
        }
        Ok(output.stdout)
    }
}

/// Reduce an FDC record to `Field: value` lines for the key header fields.
pub fn filter_ffst(text: &str) -> Result<String> {
    let alternatives = FFST_FIELDS
        .iter()
        .map(|field| regex::escape(field))
        .collect::<Vec<_>>()
        .join("|");
    let pattern = Regex::new(&format!(
        r"^\s*\|?\s*({alternatives})\s*:-\s*(.*?)\s*\|?\s*$"
    ))
    .context("compile FFST field pattern")?;
    let mut out = String::new();
    for line in text.lines() {
        if let Some(caps) = pattern.captures(line) {
            out.push_str(&caps[1]);
            out.push_str(": ");
            out.push_str(&caps[2]);
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;

    const FDC: &str = "\
+-----------------------------------------------------------------------------+
|                                                                             |
| WebSphere MQ First Failure Symptom Report                                   |
| =========================================                                   |
|                                                                             |
| Date/Time         :- Thu January 01 2026 12:00:00 UTC                       |
| Host Name         :- 3f2a9c                                                 |
| Probe Id          :- XC130003                                               |
| Component         :- xehExceptionHandler                                    |
| Program Name      :- amqzxma0                                               |
| Major Errorcode   :- STOP                                                   |
| Minor Errorcode   :- OK                                                     |
| Probe Description :- AMQ6109E: An internal IBM MQ error has occurred.       |
| Comment1          :- SIGSEGV: address not mapped(0x0)                       |
+-----------------------------------------------------------------------------+
MQM Function Stack
";

    #[test]
    fn filter_keeps_key_fields_only() {
        let filtered = filter_ffst(FDC).expect("filter");
        assert_eq!(
            filtered,
            "Date/Time: Thu January 01 2026 12:00:00 UTC\n\
             Probe Id: XC130003\n\
             Component: xehExceptionHandler\n\
             Program Name: amqzxma0\n\
             Major Errorcode: STOP\n\
             Minor Errorcode: OK\n\
             Probe Description: AMQ6109E: An internal IBM MQ error has occurred.\n\
             Comment1: SIGSEGV: address not mapped(0x0)\n"
        );
        assert!(!filtered.contains("Host Name"));
    }

    #[test]
    fn collect_writes_logs_ffst_and_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("diagnostics").join("stamp");
        let runtime = FakeRuntime::new();
        runtime.set_fdc("/var/mqm/errors/AMQ123.0.FDC\n", FDC);

        let written = DiagnosticsCollector::new(&runtime, "lab-broker", target.clone(), 50).collect();

        assert_eq!(written, target);
        let logs = fs::read_to_string(target.join(LOGS_FILE)).expect("logs");
        assert!(logs.contains("AMQ5026I"));
        let ffst = fs::read_to_string(target.join(FFST_FILE)).expect("ffst");
        assert!(ffst.starts_with("source: /var/mqm/errors/AMQ123.0.FDC\n"));
        assert!(ffst.contains("Probe Id: XC130003\n"));
        assert!(target.join(PS_FILE).exists());
        assert_eq!(runtime.count_calls("logs lab-broker 50"), 1);
    }

    #[test]
    fn missing_fdc_is_noted_not_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let runtime = FakeRuntime::new();
        let target = DiagnosticsCollector::new(&runtime, "lab-broker", dir.path().join("d"), 10).collect();
        let ffst = fs::read_to_string(target.join(FFST_FILE)).expect("ffst");
        assert!(ffst.starts_with("no first-failure-capture records"));
        assert_eq!(runtime.count_calls("exec lab-broker cat"), 0);
    }
}
