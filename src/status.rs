// src/status.rs

//! Progress reporting for front-ends and the action log
//!
//! Front-ends pass `--status-fd N` and read one `key: value : ...` line per
//! event. Multi-line messages are flattened: every newline inside a message
//! becomes a space, so a line on the channel is always one event.

use crate::buffer::VarBuf;
use crate::config::Config;
use crate::error::Result;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// Fan-out of status messages to every configured channel
#[derive(Default)]
pub struct StatusReporter {
    channels: Vec<File>,
    log: Option<File>,
    buf: VarBuf,
}

impl StatusReporter {
    /// A reporter that goes nowhere
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the status descriptors and action log named in `config`
    pub fn open(config: &Config) -> Result<Self> {
        let mut reporter = Self::new();
        for fd in &config.status_fds {
            let file = OpenOptions::new()
                .append(true)
                .open(format!("/dev/fd/{}", fd))?;
            reporter.add_channel(file);
        }
        if let Some(path) = &config.log_file {
            reporter.set_log(path)?;
        }
        Ok(reporter)
    }

    pub fn add_channel(&mut self, file: File) {
        self.channels.push(file);
    }

    /// Append action log lines to `path`
    pub fn set_log(&mut self, path: &Path) -> Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.log = Some(file);
        Ok(())
    }

    /// Send one message to every status channel
    pub fn send(&mut self, args: fmt::Arguments<'_>) {
        if self.channels.is_empty() {
            return;
        }

        self.buf.reset();
        self.buf.add_fmt(args);
        self.buf.subst_char(b'\n', b' ');
        self.buf.add_char(b'\n');

        for channel in &mut self.channels {
            if let Err(e) = channel.write_all(self.buf.as_bytes()) {
                warn!("unable to write to status fd: {}", e);
            }
        }
    }

    /// `status: <pkg>: <status>`
    pub fn package_status(&mut self, package: &str, status: &str) {
        self.send(format_args!("status: {}: {}", package, status));
    }

    /// `processing: <action>: <pkg>`
    pub fn processing(&mut self, action: &str, package: &str) {
        self.send(format_args!("processing: {}: {}", action, package));
    }

    /// `status: <pkg>: error: <message>`
    pub fn package_error(&mut self, package: &str, message: &str) {
        self.send(format_args!("status: {}: error: {}", package, message));
    }

    /// Emitted just before an interactive conffile question
    pub fn conffile_prompt(&mut self, path: &str, old: &str, new: &str, user_edited: bool, dist_edited: bool) {
        self.send(format_args!(
            "status: {} : conffile-prompt : '{}' '{}' {} {}",
            path, old, new, user_edited as i32, dist_edited as i32
        ));
    }

    /// Write a timestamped line to the action log
    pub fn log(&mut self, args: fmt::Arguments<'_>) {
        let Some(log) = self.log.as_mut() else {
            return;
        };

        self.buf.reset();
        self.buf
            .add_fmt(format_args!("{} ", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        self.buf.add_fmt(args);
        self.buf.add_char(b'\n');

        if let Err(e) = log.write_all(self.buf.as_bytes()) {
            warn!("unable to write to log file: {}", e);
        }
    }

    /// `<action> <pkg> <old version> <new version>`
    pub fn log_action(&mut self, action: &str, package: &str, old: &str, new: &str) {
        self.log(format_args!("{} {} {} {}", action, package, old, new));
    }

    /// `status <status> <pkg> <version>`, mirrored on the status channels
    pub fn log_status(&mut self, status: &str, package: &str, version: &str) {
        self.log(format_args!("status {} {} {}", status, package, version));
        self.package_status(package, status);
    }

    /// `conffile <path> <decision>`
    pub fn log_conffile(&mut self, path: &str, decision: &str) {
        self.log(format_args!("conffile {} {}", path, decision));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_messages_are_single_lines() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("status");
        let file = File::create(&out).unwrap();

        let mut reporter = StatusReporter::new();
        reporter.add_channel(file);
        reporter.processing("configure", "foo");
        reporter.package_error("foo", "subprocess failed\nwith status 1");
        reporter.conffile_prompt("/etc/foo.conf", "/etc/foo.conf", "/etc/foo.conf.dpkg-new", true, true);

        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "processing: configure: foo");
        assert_eq!(lines[1], "status: foo: error: subprocess failed with status 1");
        assert_eq!(
            lines[2],
            "status: /etc/foo.conf : conffile-prompt : '/etc/foo.conf' '/etc/foo.conf.dpkg-new' 1 1"
        );
    }

    #[test]
    fn test_action_log_format() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("settle.log");

        let mut reporter = StatusReporter::new();
        reporter.set_log(&log_path).unwrap();
        reporter.log_action("configure", "foo", "1.0-1", "1.0-2");
        reporter.log_status("installed", "foo", "1.0-2");

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        // "YYYY-MM-DD HH:MM:SS " prefix
        assert_eq!(lines[0].as_bytes()[4], b'-');
        assert_eq!(lines[0].as_bytes()[19], b' ');
        assert!(lines[0].ends_with("configure foo 1.0-1 1.0-2"));
        assert!(lines[1].ends_with("status installed foo 1.0-2"));
    }

    #[test]
    fn test_silent_without_channels() {
        let mut reporter = StatusReporter::new();
        reporter.package_status("foo", "installed");
        reporter.log_conffile("/etc/foo.conf", "keep");
    }
}
