//! Host-level device re-enumeration.
//!
//! When a radio stops answering on every link, the last thing left to try is
//! cycling its USB network adapter on the host: disable the device, wait,
//! enable it again. On Windows hosts this is done through PowerShell's
//! PnP cmdlets and needs an administrator session.
//!
//! [`HostRecovery::run`] never fails: problems running the commands are
//! logged and returned as text so the retry loop can carry on.

use std::time::Duration;

use rigbench_core::DeviceLog;

/// Friendly-name pattern of the radio's USB adapter.
pub const DEFAULT_DEVICE_PATTERN: &str = "*Motorola*";

/// Pause between disabling and re-enabling the device.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    Disabled,
    Cycle {
        disable: Vec<String>,
        enable: Vec<String>,
    },
}

/// A disable/settle/enable cycle run through external commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecovery {
    plan: Plan,
    settle: Duration,
    runs: u32,
}

impl HostRecovery {
    /// Cycle PnP devices whose friendly name matches `pattern`.
    pub fn pnp(pattern: &str) -> Self {
        Self::custom(pnp_command(pattern, "Disable"), pnp_command(pattern, "Enable"))
    }

    /// Cycle using arbitrary commands, given as program followed by
    /// arguments.
    pub fn custom(disable: Vec<String>, enable: Vec<String>) -> Self {
        Self {
            plan: Plan::Cycle { disable, enable },
            settle: DEFAULT_SETTLE,
            runs: 0,
        }
    }

    /// A recovery that does nothing.
    pub fn disabled() -> Self {
        Self {
            plan: Plan::Disabled,
            settle: Duration::ZERO,
            runs: 0,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.plan != Plan::Disabled
    }

    /// How many times [`run`](Self::run) has been invoked.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Disable the device, wait, enable it again.
    ///
    /// Returns everything the commands wrote to stderr, plus any failure to
    /// start them. An empty string means both steps ran cleanly.
    pub async fn run(&mut self, log: &DeviceLog) -> String {
        self.runs += 1;
        let Plan::Cycle { disable, enable } = &self.plan else {
            return String::new();
        };

        log.log(
            "Trying to reconfigure radio as PnP device in order to fix a common issue setting up the radio with Windows, only works when run from an administrator environment",
        );
        tracing::warn!(settle_secs = self.settle.as_secs(), "Cycling radio USB device");

        let mut errors = run_step(disable).await;
        tokio::time::sleep(self.settle).await;
        errors.push_str(&run_step(enable).await);

        if !errors.is_empty() {
            log.log(&format!(
                "Tried to reconfigure radio as PnP device, but the process failed. Make sure this is running in an administrator environment: {}",
                errors.trim_end()
            ));
        }
        errors
    }
}

impl Default for HostRecovery {
    fn default() -> Self {
        Self::pnp(DEFAULT_DEVICE_PATTERN)
    }
}

fn pnp_command(pattern: &str, verb: &str) -> Vec<String> {
    let name = format!("\"{pattern}\"");
    let cmdlet = format!("{verb}-PnpDevice");
    [
        "powershell.exe",
        "Get-PnpDevice",
        "-PresentOnly",
        "-FriendlyName",
        name.as_str(),
        "|",
        cmdlet.as_str(),
        "-Confirm:$false",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Run one command to completion and return its stderr.
async fn run_step(command: &[String]) -> String {
    let Some((program, args)) = command.split_first() else {
        return String::new();
    };

    tracing::debug!(program, ?args, "Running recovery command");
    match tokio::process::Command::new(program).args(args).output().await {
        Ok(output) => {
            if !output.status.success() {
                tracing::warn!(program, status = %output.status, "Recovery command failed");
            }
            String::from_utf8_lossy(&output.stderr).into_owned()
        }
        Err(e) => {
            tracing::error!(program, error = %e, "Failed to start recovery command");
            format!("failed to run {program}: {e}\n")
        }
    }
}
