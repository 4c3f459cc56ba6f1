use std::collections::BTreeSet;

use log::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::{AnalysisConfig, Dataset, Party, PartyTotal};
use crate::stats::safe_div;

pub type PartyCodeSet = BTreeSet<String>;

/// Small parties by ballot number range, once the `exclude_top` largest
/// parties (by national party-list votes) are removed.
///
/// Ties in vote totals keep the input order.
pub fn small_party_codes(
    party_totals: &[PartyTotal],
    range_min: u32,
    range_max: u32,
    exclude_top: usize,
) -> PartyCodeSet {
    let mut by_votes: Vec<&PartyTotal> = party_totals.iter().collect();
    // Stable: equal totals stay in input order.
    by_votes.sort_by(|a, b| b.vote_total.cmp(&a.vote_total));
    let excluded: BTreeSet<&str> = by_votes
        .iter()
        .take(exclude_top)
        .map(|p| p.party_code.as_str())
        .collect();
    debug!("small_party_codes: excluded as large: {:?}", excluded);
    by_votes
        .iter()
        .skip(exclude_top)
        .filter(|p| p.party_no >= range_min && p.party_no <= range_max)
        .map(|p| p.party_code.clone())
        .collect()
}

/// Resolves configured major party numbers to party codes.
///
/// Numbers with no registered party are skipped.
pub fn major_source_party_codes(dataset: &Dataset, major_nos: &BTreeSet<u32>) -> PartyCodeSet {
    let mut res = PartyCodeSet::new();
    for no in major_nos.iter() {
        match dataset.party_by_no(*no) {
            Some(p) => {
                res.insert(p.party_code.clone());
            }
            None => {
                warn!("major_source_party_codes: no party with number {}", no);
            }
        }
    }
    res
}

/// The two party sets every downstream view is parameterised by.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Eligibility {
    pub small_codes: PartyCodeSet,
    pub major_codes: PartyCodeSet,
    /// The major source parties, in party number order.
    pub majors: Vec<Party>,
}

impl Eligibility {
    pub fn from_config(dataset: &Dataset, config: &AnalysisConfig) -> Eligibility {
        let small_codes = small_party_codes(
            &dataset.party_totals,
            config.range_min,
            config.range_max,
            config.exclude_top,
        );
        let major_codes = major_source_party_codes(dataset, &config.major_party_nos);
        let mut majors: Vec<Party> = major_codes
            .iter()
            .filter_map(|code| dataset.party_by_code(code))
            .cloned()
            .collect();
        majors.sort_by_key(|p| p.party_no);
        info!(
            "Eligibility: {} small parties in [{}, {}], {} major source parties",
            small_codes.len(),
            config.range_min,
            config.range_max,
            major_codes.len()
        );
        if small_codes.is_empty() {
            warn!("Eligibility: no small party matches the configuration");
        }
        Eligibility {
            small_codes,
            major_codes,
            majors,
        }
    }

    pub fn is_small(&self, party_code: &str) -> bool {
        self.small_codes.contains(party_code)
    }

    pub fn is_major(&self, party_code: &str) -> bool {
        self.major_codes.contains(party_code)
    }

    /// Position of a party in `majors`.
    pub fn major_index(&self, party_code: &str) -> Option<usize> {
        self.majors.iter().position(|p| p.party_code == party_code)
    }
}

// ********* Overviews ***********

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SmallPartyRow {
    pub party_code: String,
    pub party_no: u32,
    pub party_name: String,
    pub party_list_votes: u64,
    pub constituency_votes: u64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SmallPartyOverview {
    /// Sorted by party number.
    pub rows: Vec<SmallPartyRow>,
    pub mean_party_list_votes: f64,
    pub mean_constituency_votes: f64,
    /// Mean party-list votes over mean constituency votes, 0 without the latter.
    pub party_list_to_constituency_ratio: f64,
}

fn national_total(totals: &[PartyTotal], party_code: &str) -> u64 {
    totals
        .iter()
        .find(|t| t.party_code == party_code)
        .map(|t| t.vote_total)
        .unwrap_or(0)
}

pub fn small_party_overview(dataset: &Dataset, eligibility: &Eligibility) -> SmallPartyOverview {
    let mut rows: Vec<SmallPartyRow> = dataset
        .party_totals
        .iter()
        .filter(|t| eligibility.is_small(&t.party_code))
        .map(|t| SmallPartyRow {
            party_code: t.party_code.clone(),
            party_no: t.party_no,
            party_name: t.party_name.clone(),
            party_list_votes: t.vote_total,
            constituency_votes: national_total(
                &dataset.constituency_party_totals,
                &t.party_code,
            ),
        })
        .collect();
    rows.sort_by_key(|r| r.party_no);
    let n = rows.len() as f64;
    let mean_party_list_votes = safe_div(
        rows.iter().map(|r| r.party_list_votes as f64).sum::<f64>(),
        n,
    );
    let mean_constituency_votes = safe_div(
        rows.iter().map(|r| r.constituency_votes as f64).sum::<f64>(),
        n,
    );
    SmallPartyOverview {
        rows,
        mean_party_list_votes,
        mean_constituency_votes,
        party_list_to_constituency_ratio: safe_div(mean_party_list_votes, mean_constituency_votes),
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MajorPartyRow {
    pub party_code: String,
    pub party_no: u32,
    pub party_name: String,
    pub party_list_votes: u64,
    pub constituency_votes: u64,
    /// Share of all national party-list votes.
    pub party_list_share: f64,
    /// Share of all national constituency votes.
    pub constituency_share: f64,
}

pub fn major_party_overview(dataset: &Dataset, eligibility: &Eligibility) -> Vec<MajorPartyRow> {
    let list_all: u64 = dataset.party_totals.iter().map(|t| t.vote_total).sum();
    let cons_all: u64 = dataset
        .constituency_party_totals
        .iter()
        .map(|t| t.vote_total)
        .sum();
    eligibility
        .majors
        .iter()
        .map(|p| {
            let party_list_votes = national_total(&dataset.party_totals, &p.party_code);
            let constituency_votes =
                national_total(&dataset.constituency_party_totals, &p.party_code);
            MajorPartyRow {
                party_code: p.party_code.clone(),
                party_no: p.party_no,
                party_name: p.party_name.clone(),
                party_list_votes,
                constituency_votes,
                party_list_share: safe_div(party_list_votes as f64, list_all as f64),
                constituency_share: safe_div(constituency_votes as f64, cons_all as f64),
            }
        })
        .collect()
}
