mod config;
use log::{debug, info};

#[cfg(feature = "serde")]
use serde::Serialize;

pub use crate::config::*;

pub mod aggregate;
pub mod builder;
pub mod eligibility;
pub mod hotspot;
pub mod manual;
pub mod matcher;
pub mod permutation;
pub mod stats;

use crate::aggregate::{AggregateRow, RelationRow, WinLoseComparison};
use crate::eligibility::{Eligibility, MajorPartyRow, SmallPartyOverview};
use crate::hotspot::{HotspotRanking, InvalidBallotRanking, ResidualAnalysis, SuspicionComparison};
use crate::matcher::{MatchFilter, MatchOutcome, OutlierBand};
use crate::permutation::{PermutationBase, PermutationEngine, PermutationResult};

/// Every report view, computed from one dataset and one clamped configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AnalysisReport {
    pub config: AnalysisConfig,
    pub config_signature: String,
    pub small_parties: SmallPartyOverview,
    pub major_parties: Vec<MajorPartyRow>,
    pub matches: MatchOutcome,
    /// Source party groups, largest proxy vote first.
    pub by_source_party: Vec<AggregateRow>,
    pub by_source_party_total: AggregateRow,
    pub by_province: Vec<AggregateRow>,
    /// Source party groups restricted to the areas the source party won.
    pub won_areas: Vec<AggregateRow>,
    pub win_lose: WinLoseComparison,
    pub relations: Vec<RelationRow>,
    pub outliers: Vec<OutlierBand>,
    pub permutation: PermutationResult,
    pub hotspots: HotspotRanking,
    pub invalid_ballots: InvalidBallotRanking,
    pub residuals: ResidualAnalysis,
    pub suspicion: SuspicionComparison,
}

/// Runs every view of the analysis.
///
/// Arguments:
/// * `dataset` the election snapshot
/// * `config` the analysis knobs; out-of-range values are clamped
/// * `filter` province / small party selection for the match based views. The
/// placebo test and the area rankings always cover the whole dataset.
pub fn run_analysis(dataset: &Dataset, config: &AnalysisConfig, filter: &MatchFilter) -> AnalysisReport {
    let config = config.clamped();
    let config_signature = config.signature();
    info!(
        "Processing {:?} areas, {:?} parties, config {}",
        dataset.areas.len(),
        dataset.parties.len(),
        config_signature
    );
    debug!("run_analysis: config: {:?} filter: {:?}", config, filter);

    let eligibility = Eligibility::from_config(dataset, &config);
    let small_parties = eligibility::small_party_overview(dataset, &eligibility);
    let major_parties = eligibility::major_party_overview(dataset, &eligibility);

    let matches = matcher::match_dataset(dataset, &eligibility, filter);
    info!(
        "Matched {} rows out of {} small-party entries",
        matches.summary.matched_rows, matches.summary.analysed_entries
    );
    let rows = &matches.rows;
    let by_source_party = aggregate::by_source_party(rows);
    let by_source_party_total =
        aggregate::total_row(&by_source_party, rows, aggregate::key_by_source_party);
    let by_province = aggregate::by_province_and_source_party(rows);
    let won: Vec<matcher::MatchedRow> = rows
        .iter()
        .filter(|r| r.source_party_won_area)
        .cloned()
        .collect();
    let won_areas = aggregate::by_source_party(&won);
    let win_lose = aggregate::win_lose_comparison(rows);
    let relations = aggregate::relation_summary(rows);
    let outliers = matcher::outliers_by_percentile(rows, &config.outlier_percentiles);

    let base = PermutationBase::build(dataset, &eligibility);
    let permutation = PermutationEngine::new(base, config.iterations, config.seed).run();

    let hotspots = hotspot::rank_hotspots(dataset, &eligibility, config.hotspot_top_n);
    let invalid_ballots =
        hotspot::rank_invalid_ballots(dataset, config.bad_vote_type, config.bad_vote_top_n);
    let residuals = hotspot::province_residuals(dataset, &eligibility);
    let suspicion = hotspot::suspicion_comparison(&residuals);

    AnalysisReport {
        config,
        config_signature,
        small_parties,
        major_parties,
        matches,
        by_source_party,
        by_source_party_total,
        by_province,
        won_areas,
        win_lose,
        relations,
        outliers,
        permutation,
        hotspots,
        invalid_ballots,
        residuals,
        suspicion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::tests::{two_area_config, two_area_dataset};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn end_to_end_two_areas() {
        init_logger();
        let ds = two_area_dataset();
        let cfg = AnalysisConfig {
            iterations: 50,
            ..two_area_config()
        };
        let report = run_analysis(&ds, &cfg, &MatchFilter::default());
        assert_eq!(report.config_signature, cfg.signature());
        assert_eq!(report.by_source_party.len(), 1);
        let x = &report.by_source_party[0];
        assert_eq!(x.key.source_party_code, "X");
        assert_eq!(x.proxy_votes, 500);
        assert_eq!(x.area_count, 1);
        assert_eq!(x.source_constituency_votes, 10_000);
        assert!((x.normalized_by_constituency - 0.05).abs() < 1e-12);
        assert!((x.share_of_proxy_votes - 1.0).abs() < 1e-12);
        assert_eq!(report.by_source_party_total.proxy_votes, 500);
        assert_eq!(report.won_areas.len(), 1);
        assert_eq!(report.by_province.len(), 1);
        assert_eq!(report.by_province[0].key.province_name.as_deref(), Some("North"));
        assert_eq!(report.by_province[0].source_constituency_votes, 10_000);
        let majors: Vec<&str> = report
            .major_parties
            .iter()
            .map(|p| p.party_code.as_str())
            .collect();
        assert_eq!(majors, vec!["X", "Y"]);
        assert_eq!(report.major_parties[1].constituency_votes, 14_000);
        assert_eq!(report.permutation.actual_total, 500);
        assert_eq!(report.permutation.iterations_completed, 50);
        assert_eq!(report.hotspots.area_count, 2);
        assert_eq!(report.residuals.rows.len(), 2);
        // the same inputs give the same report
        assert_eq!(report, run_analysis(&ds, &cfg, &MatchFilter::default()));
    }

    #[test]
    fn empty_small_party_set_degrades_to_empty_views() {
        init_logger();
        let ds = two_area_dataset();
        let cfg = AnalysisConfig {
            range_min: 40,
            range_max: 50,
            ..two_area_config()
        };
        let report = run_analysis(&ds, &cfg, &MatchFilter::default());
        assert!(report.small_parties.rows.is_empty());
        assert!(report.matches.rows.is_empty());
        assert!(report.by_source_party.is_empty());
        assert_eq!(report.by_source_party_total.proxy_votes, 0);
        assert!(report.permutation.is_no_data());
        assert!(report.hotspots.rows.iter().all(|r| r.small_vote_share == 0.0));
    }
}
