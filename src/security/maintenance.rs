//! Maintenance tasks: updates, log review, resource checks, backups, reports

use super::{cmd, OperationContext};
use crate::system::packages::{list_upgradable_argv, upgrade_argvs};
use crate::system::CommandSpec;
use anyhow::{bail, Context, Result};
use chrono::Local;
use std::fmt::Write as _;
use std::fs;

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// GNU tar: some files changed while being read
const TAR_FILES_CHANGED: i32 = 1;

pub fn update_system(ctx: &mut OperationContext) -> Result<String> {
    let Some(manager) = ctx.profile().package_manager() else {
        bail!("No supported package manager detected; cannot update");
    };
    let timeout = ctx.timeouts().update;

    let steps = upgrade_argvs(manager);
    let total = steps.len();
    for (i, argv) in steps.into_iter().enumerate() {
        let mut spec = CommandSpec::new(argv).timeout(timeout);
        if manager.needs_elevation() {
            spec = spec.elevated();
        }
        ctx.run_checked(&format!("Update ({}/{})", i + 1, total), spec)?;
    }

    Ok(format!("System packages updated with {}", manager.as_str()))
}

pub fn analyze_logs(ctx: &mut OperationContext) -> Result<String> {
    let timeout = ctx.timeouts().scan;

    if ctx.ensure_tool("logwatch", "logwatch")? {
        ctx.run_checked(
            "Logwatch",
            cmd(&[
                "logwatch", "--output", "stdout", "--format", "text", "--detail", "high", "--range",
                "today",
            ])
            .timeout(timeout)
            .elevated(),
        )?;
        return Ok("Logwatch summary for today generated".to_string());
    }

    if !ctx.has_tool("journalctl") {
        bail!("Neither logwatch nor journalctl is available");
    }
    ctx.run_checked(
        "Recent warnings",
        cmd(&["journalctl", "-p", "warning", "-n", "200", "--no-pager"])
            .timeout(timeout)
            .elevated(),
    )?;
    Ok("Showing the last 200 journal warnings (logwatch not available)".to_string())
}

pub fn check_resources(ctx: &mut OperationContext) -> Result<String> {
    let views: [(&str, &[&str]); 4] = [
        ("Uptime", &["uptime"]),
        ("Memory", &["free", "-h"]),
        ("Disk", &["df", "-h"]),
        ("Top processes", &["ps", "aux", "--sort=-%cpu"]),
    ];

    let mut collected = 0;
    for (title, argv) in views {
        if !ctx.has_tool(argv[0]) {
            ctx.note(format!("{} skipped: {} not available", title, argv[0]));
            continue;
        }
        let result = ctx.run(title, cmd(argv))?;
        if result.success() {
            collected += 1;
        } else {
            ctx.note(format!("{}: {}", title, result.error_summary()));
        }
    }

    if collected == 0 {
        bail!("No resource information could be collected");
    }
    Ok(format!("Collected {} of {} resource views", collected, views.len()))
}

pub fn backup_home(ctx: &mut OperationContext) -> Result<String> {
    let archive = ctx
        .config()
        .paths
        .backup_dir
        .join(format!("home_backup_{}.tar.gz", Local::now().format(STAMP_FORMAT)));
    let timeout = ctx.timeouts().update;

    let result = ctx.run(
        "Archive /home",
        CommandSpec::new(vec![
            "tar".to_string(),
            "-czf".to_string(),
            archive.display().to_string(),
            "--exclude=.cache".to_string(),
            "/home".to_string(),
        ])
        .timeout(timeout)
        .elevated(),
    )?;

    match result.exit_code {
        0 => {}
        TAR_FILES_CHANGED => ctx.note("Some files changed while they were being archived"),
        _ => bail!("Archive /home: {}", result.error_summary()),
    }
    Ok(format!("Home directories archived to {}", archive.display()))
}

pub fn generate_report(ctx: &mut OperationContext) -> Result<String> {
    let now = Local::now();
    let report_dir = ctx.config().paths.report_dir.clone();
    let update_timeout = ctx.timeouts().update;
    let scan_timeout = ctx.timeouts().scan;

    let mut sections: Vec<(&str, CommandSpec)> = vec![
        ("Kernel", cmd(&["uname", "-a"])),
        ("Users", cmd(&["cut", "-d:", "-f1,3,4", "/etc/passwd"])),
        ("Network interfaces", cmd(&["ip", "addr", "show"])),
        ("Listening sockets", cmd(&["ss", "-tuln"])),
    ];
    match ctx.profile().package_manager() {
        Some(manager) => sections.push((
            "Pending updates",
            CommandSpec::new(list_upgradable_argv(manager)).timeout(update_timeout),
        )),
        None => ctx.note("No package manager detected; pending updates not listed"),
    }
    if ctx.has_tool("lynis") {
        sections.push((
            "Lynis audit",
            cmd(&["lynis", "audit", "system", "--quick", "--no-colors"])
                .timeout(scan_timeout)
                .elevated(),
        ));
    }

    let mut body = String::new();
    let _ = writeln!(body, "Security report");
    let _ = writeln!(body, "Generated: {}", now.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(body, "Host: {}", ctx.profile().summary());

    for (title, spec) in sections {
        let program = spec.program().unwrap_or_default().to_string();
        let _ = writeln!(body);
        let _ = writeln!(body, "== {} ==", title);
        if !ctx.has_tool(&program) {
            let _ = writeln!(body, "(skipped: {} not available)", program);
            continue;
        }
        let result = ctx.run(title, spec)?;
        if !result.success() {
            let _ = writeln!(body, "(exit {})", result.exit_code);
        }
        let _ = writeln!(body, "{}", result.combined_output());
    }

    fs::create_dir_all(&report_dir)
        .with_context(|| format!("Failed to create report directory {:?}", report_dir))?;
    let path = report_dir.join(format!("security_report_{}.txt", now.format(STAMP_FORMAT)));
    fs::write(&path, body).with_context(|| format!("Failed to write report to {:?}", path))?;

    Ok(format!("Report written to {}", path.display()))
}
