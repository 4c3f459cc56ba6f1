use log::{debug, info, warn};

use proxy_votes::matcher::MatchFilter;
use proxy_votes::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::analysis::config_reader::*;
use crate::args::Args;

pub mod config_reader;

#[derive(Debug, Snafu)]
pub enum RunError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Expected a number for field {field}, found {found}"))]
    ParsingJsonNumber { field: String, found: String },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The dataset is inconsistent: {}", issues.join("; ")))]
    InvalidDataset { issues: Vec<String> },
    #[snafu(display("Difference detected between calculated summary and reference summary"))]
    ReferenceMismatch {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RunResult<T> = Result<T, RunError>;

/// The summary written by the program: the configuration on top, every report
/// view, plus the external evidence block of the dataset, passed through untouched.
fn build_summary_js(report: &AnalysisReport, external_evidence: &Option<JSValue>) -> RunResult<JSValue> {
    let mut report_js = serde_json::to_value(report).context(ParsingJsonSnafu {})?;
    let (config_js, signature_js) = match report_js.as_object_mut() {
        Some(views) => (views.remove("config"), views.remove("configSignature")),
        None => (None, None),
    };
    Ok(json!({
        "config": config_js,
        "configSignature": signature_js,
        "report": report_js,
        "externalEvidence": external_evidence,
    }))
}

fn write_output(out: &Option<String>, pretty_js: &str) -> RunResult<()> {
    match out.as_deref() {
        None | Some("") | Some("stdout") => {
            println!("{}", pretty_js);
        }
        Some(path) => {
            info!("Writing summary to {}", path);
            fs::write(path, pretty_js).context(WritingOutputSnafu { path })?;
        }
    }
    Ok(())
}

fn check_reference(reference_path: &str, pretty_js_stats: &str) -> RunResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference string");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        return ReferenceMismatchSnafu {}.fail();
    }
    info!("Summary matches the reference {}", reference_path);
    Ok(())
}

/// Computes the summary of an analysis run without writing it.
pub fn summarize(args: &Args) -> RunResult<JSValue> {
    let input = read_dataset(&args.data)?;
    let dataset = input.dataset;

    if let Err(issues) = dataset.validate() {
        let issues: Vec<String> = issues.iter().map(|e| e.to_string()).collect();
        if args.strict {
            return InvalidDatasetSnafu { issues }.fail();
        }
        for issue in issues.iter() {
            warn!("dataset: {}", issue);
        }
    }

    let config_file = match &args.config {
        Some(path) => Some(read_config(path)?),
        None => None,
    };
    let (config, filter): (AnalysisConfig, MatchFilter) = build_config(&config_file, args)?;
    debug!("run: config: {:?}, filter: {:?}", config, filter);

    let report = run_analysis(&dataset, &config, &filter);
    info!(
        "Analysis done: {} matched rows, placebo p-value {:?}",
        report.matches.rows.len(),
        report.permutation.summary.as_ref().map(|s| s.p_value)
    );
    build_summary_js(&report, &input.external_evidence)
}

pub fn run(args: &Args) -> RunResult<()> {
    let result_js = summarize(args)?;
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_output(&args.out, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        check_reference(reference_path, &pretty_js_stats)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn fixture_args() -> Args {
        Args {
            data: fixture("two_areas.json"),
            iterations: Some(20),
            ..Args::default()
        }
    }

    #[test]
    fn summary_of_two_areas() {
        let js = summarize(&fixture_args()).unwrap();
        let groups = js["report"]["bySourceParty"].as_array().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0]["key"]["sourcePartyCode"], json!("PX"));
        assert_eq!(groups[0]["proxyVotes"], json!(500));
        assert_eq!(groups[0]["sourceConstituencyVotes"], json!(10000));
        assert_eq!(groups[0]["areaCount"], json!(1));
        assert_eq!(groups[0]["normalizedByConstituency"], json!(0.05));
        assert_eq!(js["config"]["iterations"], json!(20));
        assert_eq!(js["configSignature"].as_str().map(|s| s.len()), Some(64));
        assert!(js["report"].get("config").is_none());
        assert!(js["report"].get("configSignature").is_none());
        assert_eq!(js["externalEvidence"]["source"], json!("batch"));
        assert_eq!(js["report"]["permutation"]["iterationsCompleted"], json!(20));
    }

    #[test]
    fn reference_round_trip() {
        let args = fixture_args();
        let pretty = serde_json::to_string_pretty(&summarize(&args).unwrap()).unwrap();
        let dir = std::env::temp_dir().join(format!("proxyvote-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let ref_path = dir.join("reference.json").display().to_string();
        write_output(&Some(ref_path.clone()), &pretty).unwrap();
        let out_path = dir.join("out.json").display().to_string();
        let checked = Args {
            out: Some(out_path),
            reference: Some(ref_path.clone()),
            ..fixture_args()
        };
        assert!(run(&checked).is_ok());

        let other_seed = Args {
            seed: Some(70),
            reference: Some(ref_path),
            out: Some(dir.join("out2.json").display().to_string()),
            ..fixture_args()
        };
        assert!(matches!(run(&other_seed), Err(RunError::ReferenceMismatch {})));
    }

    #[test]
    fn strict_mode_rejects_duplicate_candidates() {
        let args = Args {
            data: fixture("duplicate_candidates.json"),
            strict: true,
            ..fixture_args()
        };
        match summarize(&args) {
            Err(RunError::InvalidDataset { issues }) => assert_eq!(issues.len(), 1),
            x => panic!("expected an invalid dataset, got {:?}", x.map(|_| ())),
        }
        let lenient = Args {
            strict: false,
            ..args
        };
        assert!(summarize(&lenient).is_ok());
    }

    #[test]
    fn missing_file() {
        let args = Args {
            data: fixture("nope.json"),
            ..Args::default()
        };
        assert!(matches!(summarize(&args), Err(RunError::OpeningJson { .. })));
    }
}
