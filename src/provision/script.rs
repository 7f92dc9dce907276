// file: src/provision/script.rs
// version: 1.3.0
// guid: b8c0d2e4-5f6a-4b7c-81d3-e5f7a9b1c3d5

//! Windows join-script generator
//!
//! Session 0 isolation keeps an SSH session from talking to the Tailscale
//! service's IPN backend, so the join itself must happen in an interactive
//! desktop session. This module synthesizes that script as an ordered list
//! of typed statements rendered to PowerShell at the boundary, which keeps
//! the content testable without string-matching the whole script.

/// Destination path of the generated script on the target
pub const SCRIPT_PATH: &str = r"C:\temp\join-mesh.ps1";
/// Path of the transcript log the script writes
pub const LOG_PATH: &str = r"C:\temp\join-mesh.log";
/// Tailscale executable location on Windows
pub const TAILSCALE_EXE: &str = r"C:\Program Files\Tailscale\tailscale.exe";

/// One typed statement of the generated script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `# text`
    Comment(String),
    /// Empty line
    Blank,
    /// `$Name = 'value'`
    Assign { name: String, value: String },
    /// `Write-Host 'text' -ForegroundColor color`
    Banner { text: String, color: String },
    /// `Log "message"`
    Log(String),
    /// Raw PowerShell line
    Run(String),
    /// `if (condition) { ... } else { ... }`
    If {
        condition: String,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
}

impl Statement {
    fn assign(name: &str, value: &str) -> Self {
        Statement::Assign {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    fn banner(text: &str, color: &str) -> Self {
        Statement::Banner {
            text: text.to_string(),
            color: color.to_string(),
        }
    }

    fn render_into(&self, out: &mut String, indent: usize) {
        let pad = "    ".repeat(indent);
        match self {
            Statement::Comment(text) => {
                out.push_str(&pad);
                out.push_str("# ");
                out.push_str(text);
                out.push('\n');
            }
            Statement::Blank => out.push('\n'),
            Statement::Assign { name, value } => {
                out.push_str(&format!("{}${} = '{}'\n", pad, name, value));
            }
            Statement::Banner { text, color } => {
                out.push_str(&format!(
                    "{}Write-Host '{}' -ForegroundColor {}\n",
                    pad, text, color
                ));
            }
            Statement::Log(msg) => {
                out.push_str(&format!("{}Log \"{}\"\n", pad, msg));
            }
            Statement::Run(line) => {
                out.push_str(&pad);
                out.push_str(line);
                out.push('\n');
            }
            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                out.push_str(&format!("{}if ({}) {{\n", pad, condition));
                for stmt in then_body {
                    stmt.render_into(out, indent + 1);
                }
                if !else_body.is_empty() {
                    out.push_str(&format!("{}}} else {{\n", pad));
                    for stmt in else_body {
                        stmt.render_into(out, indent + 1);
                    }
                }
                out.push_str(&format!("{}}}\n", pad));
            }
        }
    }
}

/// Parameters of one generated join script
#[derive(Debug, Clone)]
pub struct JoinScript {
    pub server_url: String,
    pub auth_key: String,
    /// Conflicting VPN products detected on the target, listed in the header
    pub conflicts: Vec<String>,
}

impl JoinScript {
    pub fn new(server_url: &str, auth_key: &str, conflicts: &[String]) -> Self {
        Self {
            server_url: server_url.to_string(),
            auth_key: auth_key.to_string(),
            conflicts: conflicts.to_vec(),
        }
    }

    /// Build the ordered statement list
    pub fn statements(&self) -> Vec<Statement> {
        let mut stmts = vec![
            Statement::Comment("join-mesh.ps1 - Generated by meshctl remote provision".into()),
            Statement::Comment(format!("Server: {}", self.server_url)),
            Statement::Comment(format!("Log: {}", LOG_PATH)),
        ];
        if !self.conflicts.is_empty() {
            stmts.push(Statement::Comment(format!(
                "WARNING: Detected conflicting VPN(s): {}",
                self.conflicts.join(", ")
            )));
            stmts.push(Statement::Comment(
                "Consider disconnecting before running.".into(),
            ));
        }
        stmts.extend([
            Statement::Blank,
            Statement::Run("$ErrorActionPreference = 'Continue'".into()),
            Statement::assign("TailscaleExe", TAILSCALE_EXE),
            Statement::assign("ServerUrl", &self.server_url),
            Statement::assign("AuthKey", &self.auth_key),
            Statement::assign("LogFile", LOG_PATH),
            Statement::Blank,
            Statement::Run("Start-Transcript -Path $LogFile -Force".into()),
            Statement::Blank,
            Statement::Run(
                "function Log($msg) { $ts = Get-Date -Format 'HH:mm:ss'; Write-Host \"[$ts] $msg\" }"
                    .into(),
            ),
            Statement::Blank,
            Statement::banner("=== Joining Mesh Network ===", "Cyan"),
            Statement::Log("Starting mesh join - Server: $ServerUrl".into()),
            Statement::Blank,
            Statement::Comment("Step 1: Stop any running Tailscale processes".into()),
            Statement::banner("[1/5] Stopping Tailscale processes...", "Yellow"),
            Statement::Run(
                "Stop-Process -Name 'tailscale-ipn' -Force -ErrorAction SilentlyContinue".into(),
            ),
            Statement::Run("Stop-Service Tailscale -Force -ErrorAction SilentlyContinue".into()),
            Statement::Run("Start-Sleep 2".into()),
            Statement::Blank,
            Statement::Comment("Step 2: Configure registry for this mesh".into()),
            Statement::banner("[2/5] Configuring mesh settings...", "Yellow"),
            Statement::Run(r"$regPath = 'HKLM:\SOFTWARE\Tailscale IPN'".into()),
            Statement::Run(
                "if (!(Test-Path $regPath)) { New-Item -Path $regPath -Force | Out-Null }".into(),
            ),
            Statement::Run(
                "Set-ItemProperty -Path $regPath -Name 'LoginURL' -Value $ServerUrl".into(),
            ),
            Statement::Run(
                "Set-ItemProperty -Path $regPath -Name 'UnattendedMode' -Value 'always'".into(),
            ),
            Statement::Blank,
            Statement::Comment("Step 3: Start fresh service".into()),
            Statement::banner("[3/5] Starting Tailscale service...", "Yellow"),
            Statement::Run("Start-Service Tailscale".into()),
            Statement::Run("Start-Sleep 3".into()),
            Statement::Run("$svcStatus = (Get-Service Tailscale).Status".into()),
            Statement::Log("Service status: $svcStatus".into()),
            Statement::Blank,
            Statement::Comment("Step 4: Connect to mesh".into()),
            Statement::banner("[4/5] Connecting to mesh network...", "Yellow"),
            // The command echo redacts the credential; only the invocation
            // itself references $AuthKey.
            Statement::Log(
                "Command: $TailscaleExe up --login-server=$ServerUrl --authkey=<redacted> \
                 --accept-routes --unattended --reset --timeout=30s"
                    .into(),
            ),
            Statement::Run(
                "$upOutput = & $TailscaleExe up --login-server=$ServerUrl --authkey=$AuthKey \
                 --accept-routes --unattended --reset --timeout=30s 2>&1 | Out-String"
                    .into(),
            ),
            Statement::Run("$connectResult = $LASTEXITCODE".into()),
            Statement::Log("tailscale up exit code: $connectResult".into()),
            Statement::Log("tailscale up output: $upOutput".into()),
            Statement::Blank,
            Statement::Comment("Step 5: Verify connection".into()),
            Statement::banner("[5/5] Verifying connection...", "Yellow"),
            Statement::Run("Start-Sleep 2".into()),
            Statement::Run("$status = & $TailscaleExe status 2>&1 | Out-String".into()),
            Statement::Log("Status output: $status".into()),
            Statement::Blank,
            Statement::Run("Write-Host ''".into()),
            Statement::If {
                condition: "$connectResult -eq 0 -and $status -notmatch 'Logged out'".into(),
                then_body: vec![
                    Statement::banner("SUCCESS: Connected to mesh network!", "Green"),
                    Statement::Log("SUCCESS".into()),
                    Statement::Run("& $TailscaleExe status".into()),
                ],
                else_body: vec![
                    Statement::banner("FAILED: Could not connect to mesh", "Red"),
                    Statement::Run("Write-Host \"Status: $status\" -ForegroundColor Red".into()),
                    Statement::Log("FAILED - exit code: $connectResult".into()),
                ],
            },
            Statement::Blank,
            Statement::Run("Stop-Transcript".into()),
            Statement::banner(&format!("Log saved to: {}", LOG_PATH), "Gray"),
            Statement::Run("Read-Host 'Press Enter to exit'".into()),
        ]);
        stmts
    }

    /// Render the statement list to PowerShell text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for stmt in self.statements() {
            stmt.render_into(&mut out, 0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script() -> JoinScript {
        JoinScript::new("http://192.168.50.1:8080", "feedface".repeat(6).as_str(), &[])
    }

    #[test]
    fn test_statement_rendering() {
        let mut out = String::new();
        Statement::assign("ServerUrl", "http://x:8080").render_into(&mut out, 0);
        assert_eq!(out, "$ServerUrl = 'http://x:8080'\n");

        let mut out = String::new();
        Statement::banner("hello", "Cyan").render_into(&mut out, 0);
        assert_eq!(out, "Write-Host 'hello' -ForegroundColor Cyan\n");

        let mut out = String::new();
        Statement::Log("msg: $var".into()).render_into(&mut out, 0);
        assert_eq!(out, "Log \"msg: $var\"\n");
    }

    #[test]
    fn test_conditional_rendering_with_indent() {
        let stmt = Statement::If {
            condition: "$x -eq 0".into(),
            then_body: vec![Statement::Run("Do-Thing".into())],
            else_body: vec![Statement::Run("Other-Thing".into())],
        };
        let mut out = String::new();
        stmt.render_into(&mut out, 0);
        assert_eq!(
            out,
            "if ($x -eq 0) {\n    Do-Thing\n} else {\n    Other-Thing\n}\n"
        );
    }

    #[test]
    fn test_script_embeds_parameters() {
        let rendered = script().render();
        assert!(rendered.contains("$ServerUrl = 'http://192.168.50.1:8080'"));
        assert!(rendered.contains("Start-Transcript"));
        assert!(rendered.contains("--login-server=$ServerUrl"));
        assert!(rendered.contains("--unattended --reset --timeout=30s"));
        assert!(rendered.contains("Stop-Service Tailscale"));
        assert!(rendered.contains("UnattendedMode"));
    }

    #[test]
    fn test_credential_appears_once_and_echo_is_redacted() {
        let s = script();
        let rendered = s.render();
        // The key itself only appears in the assignment; the logged command
        // echo uses the redacted placeholder.
        assert_eq!(rendered.matches(s.auth_key.as_str()).count(), 1);
        assert!(rendered.contains("--authkey=<redacted>"));
        assert!(rendered.contains("--authkey=$AuthKey"));
    }

    #[test]
    fn test_conflict_warning_in_header() {
        let s = JoinScript::new(
            "http://x:8080",
            "k".repeat(48).as_str(),
            &["NordVPN".to_string(), "Surfshark".to_string()],
        );
        let rendered = s.render();
        assert!(rendered.contains("# WARNING: Detected conflicting VPN(s): NordVPN, Surfshark"));

        let plain = script().render();
        assert!(!plain.contains("WARNING: Detected conflicting"));
    }

    #[test]
    fn test_statements_order_ends_with_pause() {
        let stmts = script().statements();
        assert!(matches!(stmts.first(), Some(Statement::Comment(_))));
        assert!(matches!(stmts.last(), Some(Statement::Run(line)) if line.contains("Read-Host")));
    }
}
