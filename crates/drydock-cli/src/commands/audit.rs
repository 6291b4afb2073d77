use super::{colorize_severity, json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use drydock_core::Workspace;
use std::path::Path;

pub fn run(directory: &Path, database: &Path, suite: &str, json: bool) -> Result<u8, String> {
    let workspace = Workspace::open(directory).map_err(|e| e.to_string())?;

    let pb = if json {
        None
    } else {
        Some(spinner("auditing locked packages..."))
    };

    let report = match workspace.audit(database, suite) {
        Ok(report) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, "audit complete");
            }
            report
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "audit failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        for source in &report.sources {
            if source.vulnerabilities.is_empty() {
                continue;
            }
            println!(
                "{} {} ({} open)",
                source.name,
                source.version,
                source.vulnerabilities.len()
            );
            for vuln in &source.vulnerabilities {
                let severity = vuln.severity.as_deref().unwrap_or("unknown");
                let fixed = vuln
                    .fixed_version
                    .as_deref()
                    .map(|v| format!("fixed in {v}"))
                    .unwrap_or_else(|| "no fix yet".to_owned());
                println!(
                    "  {} [{}] {}",
                    vuln.name,
                    colorize_severity(severity),
                    fixed
                );
            }
        }
        println!(
            "{} sources audited, {} open vulnerabilities",
            report.sources.len(),
            report.vulnerability_count()
        );
        println!("report: {}", workspace.report_file().display());
    }
    Ok(EXIT_SUCCESS)
}
