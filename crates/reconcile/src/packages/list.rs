//! Listing installed packages.

use super::{DPKG_QUERY, REG, RPM};
use crate::error::Result;
use runner::{CommandRunner, CommandSpec};
use std::collections::HashSet;
use std::path::Path;

const UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall",
    r"HKLM\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall",
];

fn run_listing(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<String> {
    let output = runner.run(spec)?;
    output.ensure_code(spec, &[0])?;
    Ok(output.stdout_str())
}

/// Names dpkg reports as installed.
pub fn dpkg_installed(runner: &dyn CommandRunner) -> Result<HashSet<String>> {
    let spec = CommandSpec::new(DPKG_QUERY).args(["-W", "-f", "${Package} ${db:Status-Status}\n"]);
    Ok(parse_dpkg_query(&run_listing(runner, &spec)?))
}

/// Names from `dpkg-query` output whose status is `installed`.
pub fn parse_dpkg_query(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(name), Some("installed")) => Some(name.to_string()),
                (Some(_), Some(_)) => None,
                _ => {
                    if !line.trim().is_empty() {
                        log::warn!("Skipping unexpected dpkg-query line: {:?}", line);
                    }
                    None
                }
            }
        })
        .collect()
}

/// Names rpm reports as installed.
pub fn rpm_installed(runner: &dyn CommandRunner) -> Result<HashSet<String>> {
    let spec = CommandSpec::new(RPM).args(["--query", "--all", "--queryformat", "%{NAME}\n"]);
    Ok(parse_rpm_query(&run_listing(runner, &spec)?))
}

/// One package name per line.
pub fn parse_rpm_query(output: &str) -> HashSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Names GooGet reports as installed.
pub fn googet_installed(runner: &dyn CommandRunner, exe: &Path) -> Result<HashSet<String>> {
    let spec = CommandSpec::new(exe.display().to_string()).arg("installed");
    Ok(parse_googet_installed(&run_listing(runner, &spec)?))
}

/// Parse `googet installed` output: a header, then `<name>.<arch> <version>` lines.
pub fn parse_googet_installed(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter(|line| !line.trim_end().ends_with(':'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let (Some(package), Some(_version), None) = (fields.next(), fields.next(), fields.next())
            else {
                return None;
            };
            match package.rsplit_once('.') {
                Some((name, _arch)) if !name.is_empty() => Some(name.to_string()),
                _ => {
                    log::warn!("Skipping unexpected googet line: {:?}", line);
                    None
                }
            }
        })
        .collect()
}

/// Whether an MSI product code is registered under either Uninstall key.
///
/// `reg query` exits 0 when the key exists and 1 when it does not.
pub fn msi_installed(runner: &dyn CommandRunner, product_code: &str) -> Result<bool> {
    for key in UNINSTALL_KEYS {
        let spec = CommandSpec::new(REG).args(["query", &format!(r"{key}\{product_code}")]);
        let output = runner.run(&spec)?;
        output.ensure_code(&spec, &[0, 1])?;
        if output.code == 0 {
            return Ok(true);
        }
    }
    Ok(false)
}
