//! Read-only scans
//!
//! Each scanner is installed on demand. When the install fails a cheaper
//! read-only diagnostic runs in its place so the operator still gets
//! something useful.

use super::{cmd, OperationContext};
use crate::system::CommandSpec;
use anyhow::{bail, Result};

/// `clamscan` and `rkhunter` exit with 1 when they found something
const EXIT_FINDINGS: i32 = 1;

pub fn lynis(ctx: &mut OperationContext) -> Result<String> {
    if !ctx.ensure_tool("lynis", "lynis")? {
        bail!("Lynis is not installed and could not be installed");
    }

    let timeout = ctx.timeouts().scan;
    ctx.run_checked(
        "Lynis audit",
        cmd(&["lynis", "audit", "system", "--quick", "--no-colors"])
            .timeout(timeout)
            .elevated(),
    )?;
    Ok("Lynis audit completed; see the output for warnings and suggestions".to_string())
}

pub fn clamav(ctx: &mut OperationContext) -> Result<String> {
    let target = ctx.config().paths.malware_scan.display().to_string();
    let scan_timeout = ctx.timeouts().scan;
    let update_timeout = ctx.timeouts().update;

    if !ctx.has_tool("clamscan") {
        if !ctx.ensure_tool("clamscan", "clamav")? {
            ctx.note("ClamAV unavailable; listing world-writable shell scripts under /home instead");
            ctx.run(
                "World-writable scripts",
                cmd(&["find", "/home", "-type", "f", "-name", "*.sh", "-perm", "-o+w"]).timeout(scan_timeout),
            )?;
            return Ok("Fallback check completed (ClamAV not available)".to_string());
        }

        let refreshed = ctx.run(
            "Update signatures",
            cmd(&["freshclam"]).timeout(update_timeout).elevated(),
        )?;
        if !refreshed.success() {
            ctx.note("freshclam failed; scanning with the signatures shipped in the package");
        }
    }

    let result = ctx.run(
        "ClamAV scan",
        CommandSpec::new(vec![
            "clamscan".to_string(),
            "-r".to_string(),
            target.clone(),
            "--no-summary".to_string(),
            "-i".to_string(),
        ])
        .timeout(scan_timeout),
    )?;

    match result.exit_code {
        0 => Ok(format!("No infected files found in {}", target)),
        EXIT_FINDINGS => {
            ctx.note("ClamAV reported infected files; review the scan output");
            Ok(format!("Infected files found in {}", target))
        }
        _ => bail!("ClamAV scan: {}", result.error_summary()),
    }
}

pub fn rkhunter(ctx: &mut OperationContext) -> Result<String> {
    let timeout = ctx.timeouts().scan;

    if !ctx.ensure_tool("rkhunter", "rkhunter")? {
        ctx.note("RKHunter unavailable; listing setuid binaries instead");
        ctx.run(
            "Setuid binaries",
            cmd(&["find", "/sbin", "/bin", "/usr/bin", "-type", "f", "-perm", "-4000"]).timeout(timeout),
        )?;
        return Ok("Fallback check completed (RKHunter not available)".to_string());
    }

    let result = ctx.run(
        "RKHunter check",
        cmd(&["rkhunter", "--check", "--skip-keypress"])
            .timeout(timeout)
            .elevated(),
    )?;

    match result.exit_code {
        0 => Ok("RKHunter found no warnings".to_string()),
        EXIT_FINDINGS => {
            ctx.note("RKHunter reported warnings; review the check output");
            Ok("RKHunter finished with warnings".to_string())
        }
        _ => bail!("RKHunter check: {}", result.error_summary()),
    }
}

pub fn nmap(ctx: &mut OperationContext) -> Result<String> {
    let timeout = ctx.timeouts().scan;

    if !ctx.ensure_tool("nmap", "nmap")? {
        ctx.note("Nmap unavailable; listing listening sockets instead");
        let listing = if ctx.has_tool("ss") {
            cmd(&["ss", "-tuln"])
        } else if ctx.has_tool("netstat") {
            cmd(&["netstat", "-tuln"])
        } else {
            bail!("Neither nmap, ss nor netstat is available");
        };
        ctx.run_checked("Listening sockets", listing)?;
        return Ok("Fallback check completed (Nmap not available)".to_string());
    }

    ctx.run_checked(
        "Nmap localhost",
        cmd(&["nmap", "-sV", "-p", "1-1000", "localhost"]).timeout(timeout),
    )?;
    Ok("Port scan of localhost completed".to_string())
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;

    #[test]
    fn test_lynis_runs_elevated_with_scan_timeout() {
        let runner = Arc::new(Recorder::default());
        let mut config = Config::default();
        config.timeouts.scan = 42;
        let mut ctx = context(runner.clone(), config);

        lynis(&mut ctx).unwrap();

        let specs = runner.specs.lock().unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].command_text(), "lynis audit system --quick --no-colors");
        assert!(specs[0].needs_elevation);
        assert_eq!(specs[0].timeout_secs, 42);
    }

    #[test]
    fn test_lynis_fails_when_install_fails() {
        let runner = Arc::new(
            Recorder::default()
                .without("lynis")
                .answer("apt-get install -y lynis", 100, "E: Unable to locate package lynis"),
        );
        let mut ctx = context(runner.clone(), Config::default());

        assert!(lynis(&mut ctx).is_err());
        assert_eq!(runner.commands(), vec!["apt-get install -y lynis"]);
    }

    #[test]
    fn test_clamav_installs_and_refreshes_signatures() {
        let runner = Arc::new(Recorder::default().without("clamscan"));
        let mut ctx = context(runner.clone(), Config::default());

        clamav(&mut ctx).unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                "apt-get install -y clamav",
                "freshclam",
                "clamscan -r /tmp --no-summary -i",
            ]
        );
    }

    #[test]
    fn test_clamav_findings_are_not_a_failure() {
        let runner = Arc::new(Recorder::default().answer(
            "clamscan -r /tmp --no-summary -i",
            1,
            "/tmp/eicar.com: Eicar-Signature FOUND",
        ));
        let mut ctx = context(runner, Config::default());

        let summary = clamav(&mut ctx).unwrap();
        assert!(summary.contains("Infected files found"));
        assert_eq!(ctx.notes.len(), 1);
    }

    #[test]
    fn test_clamav_error_exit_fails() {
        let runner = Arc::new(Recorder::default().answer(
            "clamscan -r /tmp --no-summary -i",
            2,
            "ERROR: Can't open file or directory",
        ));
        let mut ctx = context(runner, Config::default());
        assert!(clamav(&mut ctx).is_err());
    }

    #[test]
    fn test_clamav_fallback_when_install_fails() {
        let runner = Arc::new(
            Recorder::default()
                .without("clamscan")
                .answer("apt-get install -y clamav", 100, "no candidate"),
        );
        let mut ctx = context(runner.clone(), Config::default());

        let summary = clamav(&mut ctx).unwrap();

        assert!(summary.contains("Fallback"));
        let commands = runner.commands();
        assert_eq!(
            commands.last().map(String::as_str),
            Some("find /home -type f -name *.sh -perm -o+w")
        );
        assert!(!commands.iter().any(|c| c.starts_with("clamscan")));
    }

    #[test]
    fn test_rkhunter_fallback_lists_setuid() {
        let runner = Arc::new(
            Recorder::default()
                .without("rkhunter")
                .answer("apt-get install -y rkhunter", 100, "no candidate"),
        );
        let mut ctx = context(runner.clone(), Config::default());

        rkhunter(&mut ctx).unwrap();
        assert_eq!(
            runner.commands().last().map(String::as_str),
            Some("find /sbin /bin /usr/bin -type f -perm -4000")
        );
    }

    #[test]
    fn test_nmap_scans_localhost() {
        let runner = Arc::new(Recorder::default());
        let mut ctx = context(runner.clone(), Config::default());

        nmap(&mut ctx).unwrap();
        assert_eq!(runner.commands(), vec!["nmap -sV -p 1-1000 localhost"]);
    }

    #[test]
    fn test_nmap_fallback_prefers_ss_then_netstat() {
        let runner = Arc::new(
            Recorder::default()
                .without("nmap")
                .without("ss")
                .answer("apt-get install -y nmap", 100, "no candidate"),
        );
        let mut ctx = context(runner.clone(), Config::default());

        nmap(&mut ctx).unwrap();
        assert_eq!(runner.commands().last().map(String::as_str), Some("netstat -tuln"));
    }

    #[test]
    fn test_nmap_without_any_tool_fails() {
        let runner = Arc::new(
            Recorder::default()
                .without("nmap")
                .without("ss")
                .without("netstat")
                .answer("apt-get install -y nmap", 100, "no candidate"),
        );
        let mut ctx = context(runner, Config::default());
        assert!(nmap(&mut ctx).is_err());
    }
}
