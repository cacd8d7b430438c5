//! Watchdog client for the platform watchdog daemon.
//!
//! The daemon owns `/dev/watchdog` and keeps it kicked; clients talk to it
//! over a unix stream socket, one command per connection:
//!
//! | request | reply on success |
//! |---------|------------------|
//! | `settimeout,<secs>` | `0,<applied secs>` |
//! | `enable` / `disable` | `0,<text>` |
//! | `is_armed` | `0,1` or `0,0` |
//! | `get_remaining_time` | `0,<secs>` |
//!
//! A non-zero code in the reply is a failure and the message says why.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use sonic_platform_common::{PlatformError, PlatformResult, Sysfs, Watchdog};
use tracing::{debug, info};

use crate::platform::{machine_conf_value, Namespace};

/// Socket path as seen from the pmon container.
pub const PMON_SOCKET: &str = "/usr/share/sonic/platform/watchdogd.socket";

/// Device directory holding the socket on the host, per ONIE platform.
pub const HOST_DEVICE_DIR: &str = "/usr/share/sonic/device";

pub const MIN_TIMEOUT_SECS: u32 = 70;
pub const MAX_TIMEOUT_SECS: u32 = 180;

const REPLY_LIMIT: usize = 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct AccWatchdog {
    socket: PathBuf,
    timeout: Mutex<u32>,
}

impl AccWatchdog {
    /// Locates the daemon socket for the namespace the caller runs in.
    pub fn new(sysfs: &Sysfs, namespace: Namespace) -> PlatformResult<Self> {
        let logical = match namespace {
            Namespace::Pmon => PathBuf::from(PMON_SOCKET),
            Namespace::Host => {
                let platform = machine_conf_value(sysfs, "onie_platform")?.ok_or_else(|| {
                    PlatformError::invalid_config("onie_platform", "missing from machine.conf")
                })?;
                PathBuf::from(format!("{HOST_DEVICE_DIR}/{platform}/watchdogd.socket"))
            }
        };
        Ok(Self::with_socket(sysfs.resolve(logical)))
    }

    pub fn with_socket(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            timeout: Mutex::new(MAX_TIMEOUT_SECS),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    /// Last timeout the daemon accepted.
    pub fn timeout(&self) -> u32 {
        *self.timeout.lock()
    }

    fn send(&self, command: &str) -> PlatformResult<(i32, String)> {
        let io_err = |e: std::io::Error| PlatformError::io(&self.socket, e);
        let mut stream = UnixStream::connect(&self.socket).map_err(io_err)?;
        stream.set_read_timeout(Some(IO_TIMEOUT)).map_err(io_err)?;
        stream.set_write_timeout(Some(IO_TIMEOUT)).map_err(io_err)?;
        stream.write_all(command.as_bytes()).map_err(io_err)?;

        let mut buf = [0u8; REPLY_LIMIT];
        let n = stream.read(&mut buf).map_err(io_err)?;
        let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
        debug!(command, reply = %reply, "watchdogd exchange");

        let (code, message) = reply
            .split_once(',')
            .ok_or_else(|| PlatformError::parse("watchdogd reply", reply.clone(), "missing ','"))?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|e| PlatformError::parse("watchdogd reply code", code, e))?;
        Ok((code, message.trim().to_string()))
    }

    fn send_ok(&self, command: &str) -> PlatformResult<String> {
        match self.send(command)? {
            (0, message) => Ok(message),
            (code, message) => Err(PlatformError::access(format!(
                "watchdogd rejected '{command}' with {code}: {message}"
            ))),
        }
    }

    fn parse_secs(context: &str, text: &str) -> PlatformResult<u32> {
        text.parse::<u32>()
            .map_err(|e| PlatformError::parse(context, text, e))
    }
}

impl Watchdog for AccWatchdog {
    fn arm(&self, seconds: u32) -> PlatformResult<u32> {
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&seconds) {
            return Err(PlatformError::out_of_range(
                "watchdog timeout",
                i64::from(seconds),
                i64::from(MIN_TIMEOUT_SECS),
                i64::from(MAX_TIMEOUT_SECS),
            ));
        }
        let applied = self.send_ok(&format!("settimeout,{seconds}"))?;
        let applied = Self::parse_secs("settimeout reply", &applied)?;
        *self.timeout.lock() = applied;

        if !self.is_armed()? {
            self.send_ok("enable")?;
        }
        info!(timeout = applied, "Watchdog armed");
        Ok(applied)
    }

    fn disarm(&self) -> PlatformResult<()> {
        self.send_ok("disable")?;
        info!("Watchdog disarmed");
        Ok(())
    }

    fn is_armed(&self) -> PlatformResult<bool> {
        let (code, message) = self.send("is_armed")?;
        Ok(code == 0 && message == "1")
    }

    fn remaining_time(&self) -> PlatformResult<Option<u32>> {
        if !self.is_armed()? {
            return Ok(None);
        }
        let left = self.send_ok("get_remaining_time")?;
        Self::parse_secs("get_remaining_time reply", &left).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::sync::Arc;
    use std::thread;

    use crate::platform::MACHINE_CONF;
    use sonic_platform_test::FakeSysfs;

    #[derive(Default)]
    struct Daemon {
        armed: bool,
        timeout: u32,
        commands: Vec<String>,
    }

    /// Answers like watchdogd, one command per connection.
    fn spawn_daemon(path: &Path) -> Arc<Mutex<Daemon>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let listener = UnixListener::bind(path).unwrap();
        let state = Arc::new(Mutex::new(Daemon::default()));
        let shared = Arc::clone(&state);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).unwrap_or(0);
                let command = String::from_utf8_lossy(&buf[..n]).into_owned();
                let reply = {
                    let mut d = shared.lock();
                    d.commands.push(command.clone());
                    match command.split_once(',') {
                        Some(("settimeout", secs)) => {
                            d.timeout = secs.parse().unwrap_or(0);
                            format!("0,{}", d.timeout)
                        }
                        _ => match command.as_str() {
                            "enable" => {
                                d.armed = true;
                                "0,enabled".to_string()
                            }
                            "disable" => {
                                d.armed = false;
                                "0,disabled".to_string()
                            }
                            "is_armed" => format!("0,{}", u8::from(d.armed)),
                            "get_remaining_time" => format!("0,{}", d.timeout - 3),
                            _ => "1,unknown command".to_string(),
                        },
                    }
                };
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        state
    }

    #[test]
    fn test_arm_enables_once_and_reports_remaining() {
        let fake = FakeSysfs::new();
        let watchdog = AccWatchdog::new(&fake.sysfs(), Namespace::Pmon).unwrap();
        let daemon = spawn_daemon(watchdog.socket_path());

        assert!(!watchdog.is_armed().unwrap());
        assert_eq!(watchdog.remaining_time().unwrap(), None);

        assert_eq!(watchdog.arm(120).unwrap(), 120);
        assert!(watchdog.is_armed().unwrap());
        assert_eq!(watchdog.remaining_time().unwrap(), Some(117));

        assert_eq!(watchdog.arm(90).unwrap(), 90);
        assert_eq!(watchdog.timeout(), 90);
        let enables = daemon
            .lock()
            .commands
            .iter()
            .filter(|c| c.as_str() == "enable")
            .count();
        assert_eq!(enables, 1);

        watchdog.disarm().unwrap();
        assert!(!watchdog.is_armed().unwrap());
    }

    #[test]
    fn test_timeout_range_checked_before_sending() {
        let fake = FakeSysfs::new();
        let watchdog = AccWatchdog::new(&fake.sysfs(), Namespace::Pmon).unwrap();
        let daemon = spawn_daemon(watchdog.socket_path());

        assert!(watchdog.arm(69).is_err());
        assert!(watchdog.arm(181).is_err());
        assert!(daemon.lock().commands.is_empty());
    }

    #[test]
    fn test_host_socket_follows_onie_platform() {
        let fake = FakeSysfs::new();
        assert!(AccWatchdog::new(&fake.sysfs(), Namespace::Host).is_err());

        fake.file(MACHINE_CONF, "onie_platform=x86_64-accton_as4630_54npe-r0\n");
        let watchdog = AccWatchdog::new(&fake.sysfs(), Namespace::Host).unwrap();
        assert_eq!(
            watchdog.socket_path(),
            fake.path("/usr/share/sonic/device/x86_64-accton_as4630_54npe-r0/watchdogd.socket").as_path()
        );
    }

    #[test]
    fn test_daemon_unreachable() {
        let fake = FakeSysfs::new();
        let watchdog = AccWatchdog::new(&fake.sysfs(), Namespace::Pmon).unwrap();
        assert!(watchdog.is_armed().is_err());
        assert!(watchdog.disarm().is_err());
    }
}
