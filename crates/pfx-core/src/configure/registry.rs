//! Registry writes through the runtime's `reg` tool.

use std::time::Duration;

use tracing::debug;

use super::entries::{ConfigEntry, ConfigValue};
use super::ConfigError;
use crate::cancel::CancellationToken;
use crate::process::{OutputSink, ProcessRunner};
use crate::runtime::RuntimeEnv;

/// Destination for configuration entries.
pub trait ConfigWriter {
    /// Current value, `None` when unset or unreadable.
    fn current(&self, entry: &ConfigEntry) -> Result<Option<ConfigValue>, ConfigError>;

    fn write(&self, entry: &ConfigEntry) -> Result<(), ConfigError>;
}

/// `<runtime> reg query|add` inside the prefix.
pub struct RegistryWriter<'a> {
    env: RuntimeEnv,
    runner: ProcessRunner,
    timeout: Duration,
    sink: &'a OutputSink,
    cancel: &'a CancellationToken,
}

impl<'a> RegistryWriter<'a> {
    pub fn new(env: RuntimeEnv, sink: &'a OutputSink, cancel: &'a CancellationToken) -> Self {
        Self {
            env,
            runner: ProcessRunner::default(),
            timeout: Duration::from_secs(60),
            sink,
            cancel,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl ConfigWriter for RegistryWriter<'_> {
    fn current(&self, entry: &ConfigEntry) -> Result<Option<ConfigValue>, ConfigError> {
        let command = self
            .env
            .command(["reg", "query", entry.path.as_str(), "/v", entry.name.as_str()])
            .label("reg");
        let outcome = self.runner.run(&command, self.timeout, self.sink, self.cancel)?;
        if outcome.cancelled {
            return Err(ConfigError::Cancelled);
        }
        if !outcome.success() {
            debug!(key = %entry.key(), exit_code = ?outcome.exit_code, "registry value not present");
            return Ok(None);
        }
        Ok(parse_query_output(&outcome.lines, &entry.name))
    }

    fn write(&self, entry: &ConfigEntry) -> Result<(), ConfigError> {
        let data = entry.value.reg_data();
        let command = self
            .env
            .command([
                "reg",
                "add",
                entry.path.as_str(),
                "/v",
                entry.name.as_str(),
                "/t",
                entry.value.reg_type(),
                "/d",
                data.as_str(),
                "/f",
            ])
            .label("reg");
        let outcome = self.runner.run(&command, self.timeout, self.sink, self.cancel)?;
        if outcome.cancelled {
            return Err(ConfigError::Cancelled);
        }
        if outcome.timed_out {
            return Err(ConfigError::TimedOut {
                key: entry.key(),
                timeout_secs: self.timeout.as_secs(),
            });
        }
        if !outcome.success() {
            return Err(ConfigError::Rejected {
                key: entry.key(),
                exit_code: outcome.exit_code,
            });
        }
        Ok(())
    }
}

/// Value of `name` in `reg query` output.
///
/// ```text
/// HKEY_CURRENT_USER\Software\Wine\Direct3D
///     csmt    REG_DWORD    0x0
/// ```
pub fn parse_query_output(lines: &[String], name: &str) -> Option<ConfigValue> {
    lines.iter().find_map(|line| {
        let mut columns = line.trim().split("    ").map(str::trim).filter(|c| !c.is_empty());
        let value_name = columns.next()?;
        if !value_name.eq_ignore_ascii_case(name) {
            return None;
        }
        let reg_type = columns.next()?;
        let data = columns.collect::<Vec<_>>().join("    ");
        ConfigValue::parse(reg_type, &data)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::entries::DIRECT3D_KEY;
    use crate::process::LineFilter;
    use crate::test_utils::write_script;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_query_output() {
        let output = lines(
            "HKEY_CURRENT_USER\\Software\\Wine\\Direct3D\n    csmt    REG_DWORD    0x0\n    OffscreenRenderingMode    REG_SZ    backbuffer\n",
        );
        assert_eq!(parse_query_output(&output, "csmt"), Some(ConfigValue::Dword(0)));
        assert_eq!(
            parse_query_output(&output, "offscreenrenderingmode"),
            Some(ConfigValue::Str("backbuffer".to_string()))
        );
        assert_eq!(parse_query_output(&output, "LogPixels"), None);
    }

    #[test]
    fn test_parse_ignores_key_header() {
        let output = lines("HKEY_CURRENT_USER\\Control Panel\\Desktop\n");
        assert_eq!(parse_query_output(&output, "Desktop"), None);
    }

    /// Fake runtime storing each value in `$WINEPREFIX/<name>`.
    fn fake_reg(dir: &std::path::Path) -> std::path::PathBuf {
        write_script(
            dir,
            "wine",
            r#"#!/bin/sh
[ "$1" = "reg" ] || exit 2
case "$2" in
  query)
    [ -f "$WINEPREFIX/$5" ] || exit 1
    echo "$3"
    echo "    $5    $(cat "$WINEPREFIX/$5.type")    $(cat "$WINEPREFIX/$5")"
    ;;
  add)
    [ "$5" = "reject" ] && exit 5
    [ "$5" = "slow" ] && sleep 30
    printf '%s' "$9" > "$WINEPREFIX/$5"
    printf '%s' "$7" > "$WINEPREFIX/$5.type"
    ;;
esac
"#,
        )
    }

    #[test]
    fn test_write_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("prefix");
        std::fs::create_dir_all(&prefix).unwrap();
        let runtime = fake_reg(dir.path());
        let (sink, _, raw) = OutputSink::memory(LineFilter::passthrough());
        let cancel = CancellationToken::detached();
        let writer = RegistryWriter::new(RuntimeEnv::new(&runtime, &prefix, "win64"), &sink, &cancel);

        let entry = ConfigEntry::new(DIRECT3D_KEY, "csmt", ConfigValue::Dword(0), true);
        assert_eq!(writer.current(&entry).unwrap(), None);
        writer.write(&entry).unwrap();
        assert_eq!(writer.current(&entry).unwrap(), Some(ConfigValue::Dword(0)));
        assert!(raw.contents().contains("reg add"));
    }

    #[test]
    fn test_rejected_write() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_reg(dir.path());
        let sink = OutputSink::discard();
        let cancel = CancellationToken::detached();
        let writer = RegistryWriter::new(RuntimeEnv::new(&runtime, dir.path(), "win64"), &sink, &cancel);

        let entry = ConfigEntry::new(DIRECT3D_KEY, "reject", ConfigValue::Dword(1), false);
        match writer.write(&entry).unwrap_err() {
            ConfigError::Rejected { exit_code, .. } => assert_eq!(exit_code, Some(5)),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_write_honours_configured_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = fake_reg(dir.path());
        let sink = OutputSink::discard();
        let cancel = CancellationToken::detached();
        let writer = RegistryWriter::new(RuntimeEnv::new(&runtime, dir.path(), "win64"), &sink, &cancel)
            .with_timeout(Duration::from_millis(300));

        let start = std::time::Instant::now();
        let entry = ConfigEntry::new(DIRECT3D_KEY, "slow", ConfigValue::Dword(1), false);
        match writer.write(&entry).unwrap_err() {
            ConfigError::TimedOut { key, .. } => assert!(key.ends_with("slow")),
            other => panic!("expected TimedOut, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
