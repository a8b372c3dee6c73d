//! Configuration hardening
//!
//! These operations change the system. Every command is elevated and the
//! first failure aborts the sequence.

use super::{cmd, OperationContext};
use crate::system::{CommandSpec, ServiceVerb};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// sshd directives enforced by `harden_ssh`, in the order they are applied
pub const SSH_DIRECTIVES: [(&str, &str); 3] = [
    ("PasswordAuthentication", "no"),
    ("PermitRootLogin", "no"),
    ("PubkeyAuthentication", "yes"),
];

/// Unit names the SSH daemon ships under across distros
const SSH_UNITS: [&str; 3] = ["ssh", "sshd", "openssh"];

const WEB_OWNER: &str = "www-data:www-data";

/// sed expression that rewrites a directive, commented out or not
pub fn directive_substitution(key: &str, value: &str) -> String {
    format!("s/^#?[[:space:]]*{key}([[:space:]].*)?$/{key} {value}/")
}

fn directive_pattern(key: &str, value: &str) -> String {
    format!("^{key} {value}$")
}

pub fn harden_ssh(ctx: &mut OperationContext) -> Result<String> {
    let config_path = ctx.config().paths.ssh_config.clone();
    if !ctx.profile().is_simulated() && !config_path.is_file() {
        bail!(
            "{} not found; install the OpenSSH server first",
            config_path.display()
        );
    }

    let backups = ctx.backups();
    backups
        .backup_then(&config_path, |record| {
            ctx.note(format!("Backup saved to {}", record.backup_path.display()));
            apply_ssh_directives(ctx, &config_path).with_context(|| {
                format!(
                    "SSH config left partially edited; restore it from {}",
                    record.backup_path.display()
                )
            })
        })
        .context("Could not back up the SSH config; nothing was changed")??;

    match ctx.find_service(&SSH_UNITS)? {
        Some((unit, manager)) => {
            ctx.note(format!("Restarting {} via {}", unit, manager.as_str()));
            let restarted = ctx.control_service(ServiceVerb::Restart, &unit)?;
            if !restarted.success() {
                bail!("Restarting {}: {}", unit, restarted.error_summary());
            }
        }
        None => ctx.note("No SSH service detected to restart; the new settings apply on next start"),
    }

    Ok("SSH hardened: password and root login disabled, key authentication enabled".to_string())
}

fn apply_ssh_directives(ctx: &mut OperationContext, config_path: &Path) -> Result<()> {
    let path = config_path.display().to_string();

    for (key, value) in SSH_DIRECTIVES {
        ctx.run_checked(
            &format!("Set {}", key),
            CommandSpec::new(vec![
                "sed".to_string(),
                "-i".to_string(),
                "-E".to_string(),
                directive_substitution(key, value),
                path.clone(),
            ])
            .elevated(),
        )?;

        let present = ctx.run(
            &format!("Verify {}", key),
            CommandSpec::new(vec![
                "grep".to_string(),
                "-Eq".to_string(),
                directive_pattern(key, value),
                path.clone(),
            ])
            .elevated(),
        )?;

        // No line to rewrite: append the directive instead
        if !present.success() {
            ctx.run_checked(
                &format!("Append {}", key),
                CommandSpec::new(vec!["tee".to_string(), "-a".to_string(), path.clone()])
                    .stdin(format!("{} {}\n", key, value))
                    .elevated(),
            )?;
        }
    }

    if ctx.has_tool("sshd") {
        ctx.run_checked("Validate sshd config", cmd(&["sshd", "-t"]).elevated())?;
    } else {
        ctx.note("sshd not on PATH; configuration was not validated");
    }
    Ok(())
}

pub fn firewall(ctx: &mut OperationContext) -> Result<String> {
    let timeout = ctx.timeouts().default;

    if !ctx.ensure_tool("ufw", "ufw")? {
        let probe = if ctx.has_tool("firewall-cmd") {
            cmd(&["firewall-cmd", "--state"])
        } else if ctx.has_tool("iptables") {
            cmd(&["iptables", "-L", "-n"])
        } else {
            bail!("UFW could not be installed and no other firewall tool was found");
        };
        ctx.run("Current firewall state", probe.timeout(timeout).elevated())?;
        bail!("UFW could not be installed; no firewall changes were made");
    }

    ctx.run_checked(
        "Deny incoming",
        cmd(&["ufw", "default", "deny", "incoming"]).timeout(timeout).elevated(),
    )?;
    ctx.run_checked(
        "Allow outgoing",
        cmd(&["ufw", "default", "allow", "outgoing"]).timeout(timeout).elevated(),
    )?;

    let rules = ctx.config().firewall.allow.clone();
    for rule in &rules {
        ctx.run_checked(
            &format!("Allow {}", rule),
            CommandSpec::new(vec!["ufw".to_string(), "allow".to_string(), rule.clone()])
                .timeout(timeout)
                .elevated(),
        )?;
    }

    ctx.run_checked(
        "Enable",
        cmd(&["ufw", "--force", "enable"])
            .stdin("y\n")
            .timeout(timeout)
            .elevated(),
    )?;
    ctx.run_checked(
        "Status",
        cmd(&["ufw", "status", "verbose"]).timeout(timeout).elevated(),
    )?;

    Ok(format!(
        "Firewall enabled: incoming denied, outgoing allowed, {} rule(s) opened",
        rules.len()
    ))
}

pub fn secure_web(ctx: &mut OperationContext) -> Result<String> {
    let roots = ctx.config().paths.web_roots.clone();
    let root = select_web_root(&roots, ctx.profile().is_simulated()).with_context(|| {
        let checked: Vec<String> = roots.iter().map(|p| p.display().to_string()).collect();
        format!("No web root found (checked: {})", checked.join(", "))
    })?;
    let root = root.display().to_string();
    let timeout = ctx.timeouts().default;

    for (title, kind, mode) in [("Directories to 750", "d", "750"), ("Files to 640", "f", "640")] {
        ctx.run_checked(
            title,
            CommandSpec::new(vec![
                "find".to_string(),
                root.clone(),
                "-type".to_string(),
                kind.to_string(),
                "-exec".to_string(),
                "chmod".to_string(),
                mode.to_string(),
                "{}".to_string(),
                "+".to_string(),
            ])
            .timeout(timeout)
            .elevated(),
        )?;
    }

    ctx.run_checked(
        "Owner to web server",
        CommandSpec::new(vec![
            "chown".to_string(),
            "-R".to_string(),
            WEB_OWNER.to_string(),
            root.clone(),
        ])
        .timeout(timeout)
        .elevated(),
    )?;

    Ok(format!("{} locked down (dirs 750, files 640, owner {})", root, WEB_OWNER))
}

/// First configured root that exists; in simulation the first configured one
fn select_web_root(roots: &[PathBuf], simulated: bool) -> Option<&PathBuf> {
    if simulated {
        roots.first()
    } else {
        roots.iter().find(|p| p.is_dir())
    }
}
