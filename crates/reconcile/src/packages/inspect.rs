//! Reading package metadata out of artifacts.

use super::{DPKG_DEB, POWERSHELL, RPM};
use crate::cache::PackageInfo;
use crate::error::{Error, Result};
use runner::{CommandRunner, CommandSpec};
use std::path::Path;

fn run_inspection(runner: &dyn CommandRunner, spec: &CommandSpec) -> Result<String> {
    let output = runner.run(spec)?;
    output.ensure_code(spec, &[0])?;
    Ok(output.stdout_str())
}

fn parse_error(what: &str, message: impl Into<String>) -> Error {
    Error::Parse {
        what: what.to_string(),
        message: message.into(),
    }
}

/// Name, architecture and version of a .deb file.
pub fn deb_info(runner: &dyn CommandRunner, path: &Path) -> Result<PackageInfo> {
    let spec = CommandSpec::new(DPKG_DEB)
        .arg("-f")
        .arg(path.display().to_string())
        .args(["Package", "Architecture", "Version"]);
    parse_deb_fields(&run_inspection(runner, &spec)?)
}

/// Parse `Key: value` control fields.
pub fn parse_deb_fields(output: &str) -> Result<PackageInfo> {
    let mut info = PackageInfo::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "Package" => info.name = value,
            "Architecture" => info.arch = value,
            "Version" => info.version = value,
            _ => {}
        }
    }
    if info.name.is_empty() {
        return Err(parse_error("dpkg-deb output", format!("no Package field in {output:?}")));
    }
    Ok(info)
}

/// Name, architecture and version-release of an .rpm file.
pub fn rpm_info(runner: &dyn CommandRunner, path: &Path) -> Result<PackageInfo> {
    let spec = CommandSpec::new(RPM)
        .args([
            "--query",
            "--queryformat",
            "%{NAME} %{ARCH} %{VERSION}-%{RELEASE}",
            "--package",
        ])
        .arg(path.display().to_string());
    parse_rpm_fields(&run_inspection(runner, &spec)?)
}

/// Parse `<name> <arch> <version>-<release>`.
pub fn parse_rpm_fields(output: &str) -> Result<PackageInfo> {
    let fields: Vec<&str> = output.split_whitespace().collect();
    let [name, arch, version] = fields.as_slice() else {
        return Err(parse_error(
            "rpm query output",
            format!("expected 3 fields, got {:?}", output.trim()),
        ));
    };
    Ok(PackageInfo {
        name: (*name).to_string(),
        arch: (*arch).to_string(),
        version: (*version).to_string(),
        ..Default::default()
    })
}

/// PowerShell reading ProductCode and ProductName from an MSI database.
fn msi_query_script(path: &Path) -> String {
    let quoted = path.display().to_string().replace('\'', "''");
    format!(
        "$installer = New-Object -ComObject WindowsInstaller.Installer; \
         $db = $installer.GetType().InvokeMember('OpenDatabase', 'InvokeMethod', $null, $installer, @('{quoted}', 0)); \
         foreach ($prop in 'ProductCode', 'ProductName') {{ \
         $view = $db.GetType().InvokeMember('OpenView', 'InvokeMethod', $null, $db, (\"SELECT Value FROM Property WHERE Property = '$prop'\")); \
         $view.GetType().InvokeMember('Execute', 'InvokeMethod', $null, $view, $null); \
         $record = $view.GetType().InvokeMember('Fetch', 'InvokeMethod', $null, $view, $null); \
         Write-Output $record.GetType().InvokeMember('StringData', 'GetProperty', $null, $record, 1) }}"
    )
}

/// Product code and name of an .msi file.
pub fn msi_info(runner: &dyn CommandRunner, path: &Path) -> Result<PackageInfo> {
    let spec = CommandSpec::new(POWERSHELL)
        .args(["-NonInteractive", "-NoProfile", "-Command"])
        .arg(msi_query_script(path));
    parse_msi_fields(&run_inspection(runner, &spec)?)
}

/// Parse the product code line followed by the product name line.
pub fn parse_msi_fields(output: &str) -> Result<PackageInfo> {
    let mut lines = output.lines().map(str::trim).filter(|l| !l.is_empty());
    let (Some(code), Some(name)) = (lines.next(), lines.next()) else {
        return Err(parse_error(
            "msi properties",
            format!("expected product code and name, got {:?}", output.trim()),
        ));
    };
    if !(code.starts_with('{') && code.ends_with('}')) {
        return Err(parse_error("msi properties", format!("invalid product code {code:?}")));
    }
    Ok(PackageInfo {
        name: name.to_string(),
        product_code: code.to_string(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner::{CommandOutput, MockRunner};

    #[test]
    fn test_parse_deb_fields() {
        let info =
            parse_deb_fields("Package: foo\nArchitecture: amd64\nVersion: 1:2.3-4\n").unwrap();
        assert_eq!(info.name, "foo");
        assert_eq!(info.arch, "amd64");
        assert_eq!(info.version, "1:2.3-4");
    }

    #[test]
    fn test_parse_deb_fields_without_package() {
        assert!(matches!(
            parse_deb_fields("Version: 1.0\n"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_rpm_info() {
        let mock = MockRunner::new();
        mock.respond("rpm", &["--query"], CommandOutput::ok("vim x86_64 9.0-1.el9"));
        let info = rpm_info(&mock, Path::new("/tmp/vim.rpm")).unwrap();
        assert_eq!(info.name, "vim");
        assert_eq!(info.version, "9.0-1.el9");
        assert_eq!(mock.calls()[0].args.last().unwrap(), "/tmp/vim.rpm");
    }

    #[test]
    fn test_parse_rpm_fields_rejects_garbage() {
        assert!(parse_rpm_fields("error: not an rpm package").is_err());
    }

    #[test]
    fn test_parse_msi_fields() {
        let info =
            parse_msi_fields("{12345678-1234-1234-1234-123456789012}\r\nMy Product\r\n").unwrap();
        assert_eq!(info.product_code, "{12345678-1234-1234-1234-123456789012}");
        assert_eq!(info.name, "My Product");
        assert!(parse_msi_fields("only one line").is_err());
    }

    #[test]
    fn test_msi_script_escapes_quotes() {
        let script = msi_query_script(Path::new(r"C:\it's\a.msi"));
        assert!(script.contains(r"@('C:\it''s\a.msi', 0)"));
    }
}
