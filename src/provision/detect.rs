// file: src/provision/detect.rs
// version: 1.2.0
// guid: a9b1c3d5-4e6f-4a8b-90c2-d4e6f8a0b2c4

//! Remote OS family detection
//!
//! Probes the target over the established SSH channel, cheapest signal
//! first. The first probe returning a recognizable signature wins and
//! suppresses the remaining probes.

use crate::network::{RemoteRunner, SshTarget};
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote operating system family, as a closed enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
    Unknown,
}

impl OsFamily {
    /// Get the OS family as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Macos => "macos",
            OsFamily::Windows => "windows",
            OsFamily::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `uname -s` output. MSYS/Git Bash on Windows reports MSYS_NT-*
/// or MINGW*, so those count as Windows.
fn classify_uname(output: &str) -> Option<OsFamily> {
    let out = output.trim().to_lowercase();
    if out.contains("linux") {
        return Some(OsFamily::Linux);
    }
    if out.contains("darwin") {
        return Some(OsFamily::Macos);
    }
    if out.contains("msys") || out.contains("mingw") || out.contains("cygwin") {
        return Some(OsFamily::Windows);
    }
    None
}

/// Detect the OS family of a remote host.
///
/// Probe order: `uname -s` (Unix and Unix-alike shells), then the cmd.exe
/// variable echo, then a PowerShell environment query. All probes failing
/// yields `Unknown`.
pub async fn detect_os(runner: &dyn RemoteRunner, target: &SshTarget) -> OsFamily {
    let out = runner.run(target, "uname -s", PROBE_TIMEOUT).await;
    if out.success {
        if let Some(family) = classify_uname(&out.output) {
            debug!("uname probe resolved {} as {}", target, family);
            return family;
        }
    }

    let out = runner.run(target, "echo %OS%", PROBE_TIMEOUT).await;
    if out.success && out.output.to_lowercase().contains("windows") {
        debug!("cmd probe resolved {} as windows", target);
        return OsFamily::Windows;
    }

    let out = runner
        .run(target, "powershell -Command \"$env:OS\"", PROBE_TIMEOUT)
        .await;
    if out.success && out.output.to_lowercase().contains("windows") {
        debug!("powershell probe resolved {} as windows", target);
        return OsFamily::Windows;
    }

    OsFamily::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::testing::MockRunner;

    #[test]
    fn test_classify_uname_signatures() {
        assert_eq!(classify_uname("Linux\n"), Some(OsFamily::Linux));
        assert_eq!(classify_uname("Darwin"), Some(OsFamily::Macos));
        assert_eq!(classify_uname("MSYS_NT-10.0-19045"), Some(OsFamily::Windows));
        assert_eq!(classify_uname("MINGW64_NT-10.0"), Some(OsFamily::Windows));
        assert_eq!(classify_uname("CYGWIN_NT-10.0"), Some(OsFamily::Windows));
        assert_eq!(classify_uname("SunOS"), None);
    }

    #[tokio::test]
    async fn test_linux_detected_without_windows_probes() {
        let runner = MockRunner::new().respond("uname -s", true, "Linux");
        let target = SshTarget::new("steve@host", 22);

        let family = detect_os(&runner, &target).await;
        assert_eq!(family, OsFamily::Linux);

        // First probe won; no Windows-specific probes were issued
        let commands = runner.commands();
        assert_eq!(commands, vec!["uname -s".to_string()]);
    }

    #[tokio::test]
    async fn test_windows_detected_via_cmd_echo() {
        let runner = MockRunner::new()
            .respond("uname -s", false, "command not found")
            .respond("echo %OS%", true, "Windows_NT");
        let target = SshTarget::new("steve@host", 22);

        assert_eq!(detect_os(&runner, &target).await, OsFamily::Windows);
    }

    #[tokio::test]
    async fn test_windows_detected_via_powershell_fallback() {
        let runner = MockRunner::new()
            .respond("uname -s", false, "")
            .respond("echo %OS%", true, "%OS%")
            .respond("powershell -Command \"$env:OS\"", true, "Windows_NT");
        let target = SshTarget::new("steve@host", 22);

        assert_eq!(detect_os(&runner, &target).await, OsFamily::Windows);
    }

    #[tokio::test]
    async fn test_unknown_when_all_probes_fail() {
        let runner = MockRunner::new();
        let target = SshTarget::new("steve@host", 22);
        assert_eq!(detect_os(&runner, &target).await, OsFamily::Unknown);
    }
}
