// Report writing from measured URLMeasurement trees

use crate::error::Result;
use crate::model::UrlMeasurement;
use crate::step::{ArchivalSingleStepMeasurement, SingleStepMeasurement};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use websteps_scanner::EndpointMeasurement;

/// One line of a JSONL report: everything measured for one input URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub input: String,
    pub measurement_start_time: DateTime<Utc>,
    pub software_name: String,
    pub software_version: String,
    pub urls: Vec<ArchivalSingleStepMeasurement>,
}

impl MeasurementReport {
    pub fn new(input: &str, begin: DateTime<Utc>, tree: &[UrlMeasurement]) -> Self {
        let steps: Vec<SingleStepMeasurement> =
            tree.iter().cloned().map(SingleStepMeasurement::from).collect();
        Self::from_steps(input, begin, &steps)
    }

    pub fn from_steps(input: &str, begin: DateTime<Utc>, steps: &[SingleStepMeasurement]) -> Self {
        Self {
            input: input.to_string(),
            measurement_start_time: begin,
            software_name: env!("CARGO_PKG_NAME").to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            urls: steps
                .iter()
                .map(|step| ArchivalSingleStepMeasurement::from_step(step, begin))
                .collect(),
        }
    }
}

/// Appends one JSON line for `input` to the report at `path`.
pub fn write_jsonl_report(
    path: &Path,
    begin: DateTime<Utc>,
    input: &str,
    tree: &[UrlMeasurement],
) -> Result<()> {
    append_report(path, &MeasurementReport::new(input, begin, tree))
}

/// Like [`write_jsonl_report`], keeping the test helper's answers.
pub fn write_jsonl_steps(
    path: &Path,
    begin: DateTime<Utc>,
    input: &str,
    steps: &[SingleStepMeasurement],
) -> Result<()> {
    append_report(path, &MeasurementReport::from_steps(input, begin, steps))
}

fn append_report(path: &Path, report: &MeasurementReport) -> Result<()> {
    let mut line = serde_json::to_string(report)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Reads back every line of a JSONL report. Blank lines are ignored.
pub fn read_jsonl_report(path: &Path) -> Result<Vec<MeasurementReport>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn endpoint_outcome(epnt: &EndpointMeasurement) -> String {
    if let Some(ref failure) = epnt.failure {
        return format!("{}", failure.red());
    }
    let code = epnt.response_status_code();
    let status = match code {
        200..=299 => format!("{}", code.to_string().green()),
        300..=399 => format!("{}", code.to_string().cyan()),
        400..=499 => format!("{}", code.to_string().yellow()),
        500..=599 => format!("{}", code.to_string().red()),
        _ => code.to_string(),
    };
    match epnt.location {
        Some(ref location) => format!("{} -> {}", status, location),
        None => status,
    }
}

/// Renders a human readable summary of a traversal.
pub fn generate_measurement_report(tree: &[UrlMeasurement]) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Summary:\n");
    report.push_str(&format!("  URLs measured: {}\n", tree.len()));

    let total_dns: usize = tree.iter().map(|um| um.dns().len()).sum();
    report.push_str(&format!("  DNS lookups: {}\n", total_dns));

    let total_endpoints: usize = tree.iter().map(|um| um.endpoint().len()).sum();
    let failed: usize = tree
        .iter()
        .flat_map(|um| um.endpoint())
        .filter(|e| !e.is_success())
        .count();
    report.push_str(&format!(
        "  Endpoints probed: {} ({} failed)\n",
        total_endpoints, failed
    ));

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");

    for um in tree {
        report.push_str(&format!("## [{}] {}\n", um.id(), um.url));
        if !um.endpoint_ids.is_empty() {
            let ids: Vec<String> = um.endpoint_ids.iter().map(|id| id.to_string()).collect();
            report.push_str(&format!("  redirected from endpoints {}\n", ids.join(", ")));
        }
        for dns in um.dns() {
            match dns.failure {
                Some(ref failure) => {
                    report.push_str(&format!("  dns {} {}\n", dns.domain, failure.red()))
                }
                None => report.push_str(&format!(
                    "  dns {} {}\n",
                    dns.domain,
                    dns.addresses.join(" ")
                )),
            }
        }
        for epnt in um.endpoint() {
            report.push_str(&format!(
                "  {:<5} {:<8} {} {}\n",
                epnt.url.scheme(),
                epnt.network.as_str(),
                epnt.address,
                endpoint_outcome(epnt)
            ));
        }
        report.push('\n');
    }

    report
}

/// Renders [`generate_measurement_report`] followed by what the test
/// helper answered for each hop.
pub fn generate_steps_report(steps: &[SingleStepMeasurement]) -> String {
    let tree: Vec<UrlMeasurement> = steps.iter().map(|s| s.probe_initial.clone()).collect();
    let mut report = generate_measurement_report(&tree);
    report.push_str("# Test helper:\n");
    for step in steps {
        let um = &step.probe_initial;
        match step.th {
            Some(ref th) => report.push_str(&format!(
                "  [{}] {} dns, {} endpoints, {} additional\n",
                um.id(),
                th.dns.len(),
                th.endpoint.len(),
                step.probe_additional.len()
            )),
            None => report.push_str(&format!("  [{}] {}\n", um.id(), "no answer".yellow())),
        }
        for epnt in &step.probe_additional {
            report.push_str(&format!(
                "    {:<5} {:<8} {} {}\n",
                epnt.url.scheme(),
                epnt.network.as_str(),
                epnt.address,
                endpoint_outcome(epnt)
            ));
        }
    }
    report.push('\n');
    report
}
