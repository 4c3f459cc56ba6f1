// ********* Input data structures ***********

use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::Serialize;

/// A party as registered for the election.
///
/// `party_code` is the stable join key across every table. The ballot number
/// `party_no` is only unique within one ballot type: the constituency number of
/// a candidate may coincide with the party-list number of an unrelated party.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Party {
    pub party_code: String,
    /// Ballot number. 0 when unknown.
    pub party_no: u32,
    pub party_name: String,
}

/// A national vote total for one party, for one ballot type.
#[derive(Eq, PartialEq, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PartyTotal {
    pub party_code: String,
    pub party_no: u32,
    pub party_name: String,
    pub vote_total: u64,
}

/// Ballot counts for one area and one ballot type. Missing counts are 0.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct VoteTotals {
    pub total_votes: u64,
    pub good_votes: u64,
    pub bad_votes: u64,
    pub no_votes: u64,
}

/// One line of an area result, for either ballot type.
#[derive(PartialEq, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PartyResult {
    pub party_code: String,
    pub party_no: u32,
    pub party_name: String,
    pub vote_total: u64,
    /// As published. Some sources use a 0-1 fraction, others 0-100.
    pub vote_percent: f64,
    /// 1 is the winner. `None` when the source did not rank the entry.
    pub rank: Option<u32>,
}

impl PartyResult {
    /// The vote percent on a 0-100 scale, whatever the source convention was.
    pub fn percent_0_100(&self) -> f64 {
        if self.vote_percent <= 1.0 {
            self.vote_percent * 100.0
        } else {
            self.vote_percent
        }
    }
}

/// A constituency candidate.
#[derive(Eq, PartialEq, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Candidate {
    /// Number printed on the constituency ballot. 0 when unknown.
    pub candidate_no: u32,
    pub candidate_name: String,
    pub candidate_party_code: String,
    pub candidate_party_no: u32,
    pub candidate_party_name: String,
}

/// An electoral constituency with both ballots.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Area {
    pub area_code: String,
    pub province_name: String,
    pub area_name: String,
    /// Party-list ballot totals.
    pub totals: VoteTotals,
    /// Constituency ballot totals.
    pub constituency_totals: VoteTotals,
    /// Party-list results, ordered by rank.
    pub party_results: Vec<PartyResult>,
    /// Constituency results, ordered by rank.
    pub constituency_party_results: Vec<PartyResult>,
    pub candidates: Vec<Candidate>,
}

impl Area {
    /// The rank 1 entry of the constituency ballot.
    pub fn constituency_winner(&self) -> Option<&PartyResult> {
        self.constituency_party_results
            .iter()
            .find(|r| r.rank == Some(1))
    }

    /// The rank 1 entry of the party-list ballot.
    pub fn party_list_winner(&self) -> Option<&PartyResult> {
        self.party_results.iter().find(|r| r.rank == Some(1))
    }

    pub fn winner(&self, ballot: BallotType) -> Option<&PartyResult> {
        match ballot {
            BallotType::Constituency => self.constituency_winner(),
            BallotType::PartyList => self.party_list_winner(),
        }
    }

    pub fn totals_for(&self, ballot: BallotType) -> &VoteTotals {
        match ballot {
            BallotType::Constituency => &self.constituency_totals,
            BallotType::PartyList => &self.totals,
        }
    }

    /// Constituency votes of a party in this area, 0 if the party did not run.
    pub fn constituency_votes_of(&self, party_code: &str) -> u64 {
        self.constituency_party_results
            .iter()
            .find(|r| r.party_code == party_code)
            .map(|r| r.vote_total)
            .unwrap_or(0)
    }
}

/// The read-only snapshot every analysis runs against.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Dataset {
    pub parties: Vec<Party>,
    /// National party-list totals.
    pub party_totals: Vec<PartyTotal>,
    /// National constituency totals.
    pub constituency_party_totals: Vec<PartyTotal>,
    pub areas: Vec<Area>,
}

impl Dataset {
    pub fn party_by_no(&self, party_no: u32) -> Option<&Party> {
        self.parties.iter().find(|p| p.party_no == party_no)
    }

    pub fn party_by_code(&self, party_code: &str) -> Option<&Party> {
        self.parties.iter().find(|p| p.party_code == party_code)
    }

    /// Distinct province names, in the order they first appear.
    pub fn provinces(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut res: Vec<String> = Vec::new();
        for a in self.areas.iter() {
            if seen.insert(a.province_name.as_str()) {
                res.push(a.province_name.clone());
            }
        }
        res
    }

    /// Checks the structural assumptions the matcher relies on.
    ///
    /// The analysis itself never fails on these: the first listed candidate
    /// wins a duplicated number. Callers decide whether a report is enough.
    pub fn validate(&self) -> Result<(), Vec<AnalysisErrors>> {
        let mut issues: Vec<AnalysisErrors> = Vec::new();
        let mut area_codes: HashSet<&str> = HashSet::new();
        for area in self.areas.iter() {
            if !area_codes.insert(area.area_code.as_str()) {
                issues.push(AnalysisErrors::DuplicateAreaCode(area.area_code.clone()));
            }
            let mut numbers: HashSet<u32> = HashSet::new();
            for c in area.candidates.iter().filter(|c| c.candidate_no > 0) {
                if !numbers.insert(c.candidate_no) {
                    issues.push(AnalysisErrors::DuplicateCandidateNumber {
                        area_code: area.area_code.clone(),
                        candidate_no: c.candidate_no,
                    });
                }
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Errors raised while assembling or validating a dataset.
///
/// The analysis functions themselves do not fail: degenerate inputs give
/// zero or empty results.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    DuplicateAreaCode(String),
    DuplicateCandidateNumber { area_code: String, candidate_no: u32 },
    DuplicateParty(String),
    UnknownParty(String),
    UnknownArea(String),
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::DuplicateAreaCode(code) => write!(f, "duplicate area code {}", code),
            AnalysisErrors::DuplicateCandidateNumber {
                area_code,
                candidate_no,
            } => write!(
                f,
                "area {}: candidate number {} is listed more than once",
                area_code, candidate_no
            ),
            AnalysisErrors::DuplicateParty(code) => write!(f, "duplicate party {}", code),
            AnalysisErrors::UnknownParty(code) => write!(f, "unknown party {}", code),
            AnalysisErrors::UnknownArea(code) => write!(f, "unknown area {}", code),
        }
    }
}

// ********* Configuration **********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum BallotType {
    Constituency,
    PartyList,
}

/// Upper bound on permutation rounds. Keeps a run bounded and predictable.
pub const MAX_ITERATIONS: i64 = 5000;
/// Seeds live in the multiplicative group of the Lehmer generator.
pub const MAX_SEED: i64 = 2_147_483_646;

/// Every knob the report views depend on.
///
/// Derived results are pure functions of a dataset and one of these. Nothing
/// here is remembered between runs; see `signature` for a memoisation key.
#[derive(PartialEq, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AnalysisConfig {
    /// Inclusive party-list number range for small parties.
    pub range_min: u32,
    pub range_max: u32,
    /// Number of parties, by national party-list votes, never counted as small.
    pub exclude_top: usize,
    /// Party numbers of the major source parties.
    pub major_party_nos: BTreeSet<u32>,
    /// Requested permutation rounds, clamped into `[0, MAX_ITERATIONS]`.
    pub iterations: i64,
    /// Requested permutation seed, clamped into `[1, MAX_SEED]`.
    pub seed: i64,
    pub hotspot_top_n: usize,
    pub bad_vote_top_n: usize,
    pub bad_vote_type: BallotType,
    pub outlier_percentiles: Vec<f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            range_min: 1,
            range_max: 10,
            exclude_top: 6,
            major_party_nos: [9, 27, 37, 42, 46].into_iter().collect(),
            iterations: 1000,
            seed: 69,
            hotspot_top_n: 30,
            bad_vote_top_n: 30,
            bad_vote_type: BallotType::Constituency,
            outlier_percentiles: vec![0.9, 0.95, 0.99],
        }
    }
}

impl AnalysisConfig {
    /// Brings every value into its supported range instead of failing.
    pub fn clamped(&self) -> AnalysisConfig {
        let (range_min, range_max) = if self.range_min > self.range_max {
            (self.range_max, self.range_min)
        } else {
            (self.range_min, self.range_max)
        };
        AnalysisConfig {
            range_min,
            range_max,
            iterations: clamp_iterations(self.iterations),
            seed: clamp_seed(self.seed),
            outlier_percentiles: self
                .outlier_percentiles
                .iter()
                .filter(|p| p.is_finite())
                .map(|p| p.clamp(0.0, 1.0))
                .collect(),
            ..self.clone()
        }
    }

    /// Hex SHA-256 of the clamped configuration. Two configurations with the
    /// same signature produce identical reports on the same dataset.
    pub fn signature(&self) -> String {
        let canonical = format!("{:?}", self.clamped());
        sha256::digest(canonical.as_str())
    }
}

pub fn clamp_iterations(iterations: i64) -> i64 {
    iterations.clamp(0, MAX_ITERATIONS)
}

pub fn clamp_seed(seed: i64) -> i64 {
    seed.clamp(1, MAX_SEED)
}
