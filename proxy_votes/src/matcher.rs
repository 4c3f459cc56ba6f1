use std::collections::HashMap;

use log::{debug, warn};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::{Area, Candidate, Dataset};
use crate::eligibility::{Eligibility, PartyCodeSet};
use crate::stats::{quantile, safe_div};

/// One small party of one area whose ballot number coincides with a
/// constituency candidate number.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchedRow {
    pub area_code: String,
    pub area_name: String,
    pub province_name: String,
    pub small_party_code: String,
    pub small_party_no: u32,
    pub small_party_name: String,
    pub small_party_votes: u64,
    /// Party-list vote percent of the small party in the area, as published.
    pub small_party_vote_percent: f64,
    pub candidate_no: u32,
    pub candidate_name: String,
    pub source_party_code: String,
    pub source_party_no: u32,
    pub source_party_name: String,
    pub source_is_major: bool,
    pub source_constituency_votes_in_area: u64,
    pub source_constituency_share_in_area: f64,
    pub source_party_won_area: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRestriction {
    /// Drop rows whose source party is not a major source party.
    MajorOnly,
    /// Keep every match, for broader reporting.
    Any,
}

/// Candidate lookup by ballot number. The first listed candidate wins a
/// duplicated number. Number 0 marks a candidate without a ballot number.
fn candidates_by_number<'a>(area: &'a Area) -> HashMap<u32, &'a Candidate> {
    let mut res: HashMap<u32, &Candidate> = HashMap::new();
    for c in area.candidates.iter().filter(|c| c.candidate_no > 0) {
        if res.contains_key(&c.candidate_no) {
            warn!(
                "area {}: candidate number {} appears more than once, keeping {:?}",
                area.area_code, c.candidate_no, res[&c.candidate_no].candidate_name
            );
            continue;
        }
        res.insert(c.candidate_no, c);
    }
    res
}

/// All matches of one area. Pure: same inputs, same rows.
pub fn match_area(
    area: &Area,
    eligible_codes: &PartyCodeSet,
    major_source_codes: &PartyCodeSet,
    restriction: SourceRestriction,
) -> Vec<MatchedRow> {
    let by_number = candidates_by_number(area);
    let winner_code = area.constituency_winner().map(|w| w.party_code.as_str());
    let mut res: Vec<MatchedRow> = Vec::new();
    for pr in area
        .party_results
        .iter()
        .filter(|pr| eligible_codes.contains(&pr.party_code))
    {
        let cand = match by_number.get(&pr.party_no) {
            Some(c) => *c,
            None => {
                debug!(
                    "match_area: {}: no candidate #{} for {}",
                    area.area_code, pr.party_no, pr.party_code
                );
                continue;
            }
        };
        let source_is_major = major_source_codes.contains(&cand.candidate_party_code);
        if restriction == SourceRestriction::MajorOnly && !source_is_major {
            continue;
        }
        let source_votes = area.constituency_votes_of(&cand.candidate_party_code);
        res.push(MatchedRow {
            area_code: area.area_code.clone(),
            area_name: area.area_name.clone(),
            province_name: area.province_name.clone(),
            small_party_code: pr.party_code.clone(),
            small_party_no: pr.party_no,
            small_party_name: pr.party_name.clone(),
            small_party_votes: pr.vote_total,
            small_party_vote_percent: pr.vote_percent,
            candidate_no: cand.candidate_no,
            candidate_name: cand.candidate_name.clone(),
            source_party_code: cand.candidate_party_code.clone(),
            source_party_no: cand.candidate_party_no,
            source_party_name: cand.candidate_party_name.clone(),
            source_is_major,
            source_constituency_votes_in_area: source_votes,
            source_constituency_share_in_area: safe_div(
                source_votes as f64,
                area.constituency_totals.total_votes as f64,
            ),
            source_party_won_area: winner_code == Some(cand.candidate_party_code.as_str()),
        });
    }
    res
}

/// The selection that used to live in the dashboard state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFilter {
    pub province: Option<String>,
    pub small_party_code: Option<String>,
    pub restrict_to_major_sources: bool,
}

impl Default for MatchFilter {
    fn default() -> Self {
        MatchFilter {
            province: None,
            small_party_code: None,
            restrict_to_major_sources: true,
        }
    }
}

impl MatchFilter {
    fn restriction(&self) -> SourceRestriction {
        if self.restrict_to_major_sources {
            SourceRestriction::MajorOnly
        } else {
            SourceRestriction::Any
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchSummary {
    /// Eligible small-party entries looked at, across the selected areas.
    pub analysed_entries: usize,
    pub matched_rows: usize,
    pub unmatched_entries: usize,
    pub match_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MatchOutcome {
    pub rows: Vec<MatchedRow>,
    pub summary: MatchSummary,
}

/// Runs `match_area` once over each selected area.
pub fn match_dataset(dataset: &Dataset, eligibility: &Eligibility, filter: &MatchFilter) -> MatchOutcome {
    let eligible: PartyCodeSet = match &filter.small_party_code {
        Some(code) => eligibility
            .small_codes
            .iter()
            .filter(|c| *c == code)
            .cloned()
            .collect(),
        None => eligibility.small_codes.clone(),
    };
    let mut rows: Vec<MatchedRow> = Vec::new();
    let mut analysed_entries = 0;
    for area in dataset.areas.iter() {
        if let Some(p) = &filter.province {
            if &area.province_name != p {
                continue;
            }
        }
        analysed_entries += area
            .party_results
            .iter()
            .filter(|pr| eligible.contains(&pr.party_code))
            .count();
        rows.extend(match_area(
            area,
            &eligible,
            &eligibility.major_codes,
            filter.restriction(),
        ));
    }
    debug!(
        "match_dataset: {} matched rows out of {} entries",
        rows.len(),
        analysed_entries
    );
    let summary = MatchSummary {
        analysed_entries,
        matched_rows: rows.len(),
        unmatched_entries: analysed_entries.saturating_sub(rows.len()),
        match_rate: safe_div(rows.len() as f64, analysed_entries as f64),
    };
    MatchOutcome { rows, summary }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OutlierBand {
    pub percentile: f64,
    /// Small-party vote count at the percentile.
    pub threshold: f64,
    /// Rows at or above the threshold, largest first.
    pub rows: Vec<MatchedRow>,
}

pub fn outliers_by_percentile(rows: &[MatchedRow], percentiles: &[f64]) -> Vec<OutlierBand> {
    let votes: Vec<f64> = rows.iter().map(|r| r.small_party_votes as f64).collect();
    percentiles
        .iter()
        .map(|p| {
            let threshold = quantile(&votes, *p);
            let mut selected: Vec<MatchedRow> = rows
                .iter()
                .filter(|r| r.small_party_votes as f64 >= threshold)
                .cloned()
                .collect();
            selected.sort_by(|a, b| b.small_party_votes.cmp(&a.small_party_votes));
            OutlierBand {
                percentile: *p,
                threshold,
                rows: selected,
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;
    use crate::config::{AnalysisConfig, BallotType, PartyResult, VoteTotals};
    use crate::permutation::PermutationBase;

    /// Two areas. In A1 the small party S7 (#7) lines up with X's candidate #7,
    /// in A2 nobody carries #7.
    pub(crate) fn two_area_dataset() -> Dataset {
        let mut b = DatasetBuilder::new()
            .party("X", 9, "Party X")
            .unwrap()
            .party("Y", 27, "Party Y")
            .unwrap()
            .party("S7", 7, "Small Seven")
            .unwrap()
            .party("Z", 3, "Party Z")
            .unwrap();
        b.area("A1", "North", "North 1").unwrap();
        b.area("A2", "South", "South 1").unwrap();
        b.party_list_result("A1", "S7", 500).unwrap();
        b.party_list_result("A1", "X", 9000).unwrap();
        b.party_list_result("A2", "S7", 40).unwrap();
        b.party_list_result("A2", "Y", 7000).unwrap();
        b.constituency_result("A1", "X", 10_000).unwrap();
        b.constituency_result("A1", "Y", 8_000).unwrap();
        b.constituency_result("A1", "Z", 2_000).unwrap();
        b.constituency_result("A2", "Y", 6_000).unwrap();
        b.candidate("A1", 7, "Cand X", "X").unwrap();
        b.candidate("A1", 1, "Cand Y", "Y").unwrap();
        b.candidate("A1", 2, "Cand Z", "Z").unwrap();
        b.candidate("A2", 1, "Cand Y2", "Y").unwrap();
        b.totals(
            "A1",
            BallotType::Constituency,
            VoteTotals {
                total_votes: 20_000,
                good_votes: 20_000,
                bad_votes: 0,
                no_votes: 0,
            },
        )
        .unwrap();
        b.build()
    }

    pub(crate) fn two_area_config() -> AnalysisConfig {
        AnalysisConfig {
            exclude_top: 2,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn matches_number_coincidence() {
        let ds = two_area_dataset();
        let el = Eligibility::from_config(&ds, &two_area_config());
        assert!(el.is_small("S7"));
        let out = match_dataset(&ds, &el, &MatchFilter::default());
        assert_eq!(out.rows.len(), 1);
        let r = &out.rows[0];
        assert_eq!(r.area_code, "A1");
        assert_eq!(r.source_party_code, "X");
        assert_eq!(r.small_party_votes, 500);
        assert_eq!(r.source_constituency_votes_in_area, 10_000);
        assert!((r.source_constituency_share_in_area - 0.5).abs() < 1e-12);
        assert!(r.source_party_won_area);
        assert_eq!(out.summary.analysed_entries, 2);
        assert_eq!(out.summary.unmatched_entries, 1);
        assert!((out.summary.match_rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn restriction_and_filters() {
        let ds = two_area_dataset();
        let mut el = Eligibility::from_config(&ds, &two_area_config());
        el.major_codes.remove("X");
        let restricted = match_dataset(&ds, &el, &MatchFilter::default());
        assert!(restricted.rows.is_empty());
        let broad = match_dataset(
            &ds,
            &el,
            &MatchFilter {
                restrict_to_major_sources: false,
                ..MatchFilter::default()
            },
        );
        assert_eq!(broad.rows.len(), 1);
        assert!(!broad.rows[0].source_is_major);

        let el = Eligibility::from_config(&ds, &two_area_config());
        let south = match_dataset(
            &ds,
            &el,
            &MatchFilter {
                province: Some("South".to_string()),
                ..MatchFilter::default()
            },
        );
        assert!(south.rows.is_empty());
        assert_eq!(south.summary.analysed_entries, 1);
        let other_party = match_dataset(
            &ds,
            &el,
            &MatchFilter {
                small_party_code: Some("nope".to_string()),
                ..MatchFilter::default()
            },
        );
        assert_eq!(other_party.summary.analysed_entries, 0);
        assert_eq!(other_party.summary.match_rate, 0.0);
    }

    #[test]
    fn first_listed_candidate_wins() {
        let mut ds = two_area_dataset();
        let dup = Candidate {
            candidate_no: 7,
            candidate_name: "Late".to_string(),
            candidate_party_code: "Y".to_string(),
            candidate_party_no: 27,
            candidate_party_name: "Party Y".to_string(),
        };
        ds.areas[0].candidates.push(dup);
        let el = Eligibility::from_config(&ds, &two_area_config());
        let rows = match_area(&ds.areas[0], &el.small_codes, &el.major_codes, SourceRestriction::Any);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_party_code, "X");
    }

    #[test]
    fn unnumbered_candidates_never_match() {
        let mut ds = two_area_dataset();
        ds.areas[0].candidates.push(Candidate {
            candidate_no: 0,
            candidate_name: "Unnumbered".to_string(),
            candidate_party_code: "X".to_string(),
            candidate_party_no: 9,
            candidate_party_name: "Party X".to_string(),
        });
        ds.areas[0].party_results.push(PartyResult {
            party_code: "N0".to_string(),
            party_no: 0,
            party_name: "Number Zero".to_string(),
            vote_total: 80,
            vote_percent: 0.0,
            rank: None,
        });
        let mut el = Eligibility::from_config(&ds, &two_area_config());
        el.small_codes.insert("N0".to_string());
        let rows = match_area(&ds.areas[0], &el.small_codes, &el.major_codes, SourceRestriction::Any);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].small_party_code, "S7");
        // the placebo base counts the same pairs
        let base = PermutationBase::build(&ds, &el);
        assert_eq!(base.actual_total(), 500);
    }

    #[test]
    fn empty_eligible_set_gives_nothing() {
        let ds = two_area_dataset();
        let rows = match_area(
            &ds.areas[0],
            &PartyCodeSet::new(),
            &PartyCodeSet::new(),
            SourceRestriction::Any,
        );
        assert!(rows.is_empty());
    }

    #[test]
    fn outlier_bands() {
        let ds = two_area_dataset();
        let el = Eligibility::from_config(&ds, &two_area_config());
        let mut rows = match_dataset(&ds, &el, &MatchFilter::default()).rows;
        let mut second = rows[0].clone();
        second.small_party_votes = 100;
        rows.push(second);
        let bands = outliers_by_percentile(&rows, &[0.0, 0.9]);
        assert_eq!(bands[0].rows.len(), 2);
        assert_eq!(bands[0].rows[0].small_party_votes, 500);
        assert_eq!(bands[1].rows.len(), 1);
        assert!((bands[1].threshold - 460.0).abs() < 1e-9);
    }
}
