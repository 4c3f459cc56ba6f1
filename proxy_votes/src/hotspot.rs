use std::collections::HashMap;

use log::{debug, info};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::{Area, BallotType, Dataset, PartyResult};
use crate::eligibility::Eligibility;
use crate::stats::{
    bootstrap_diff_mean, linear_trend, mean, quantile, safe_div, sample_std, LehmerRng, Trend,
};

/// Winner of one ballot in one area.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AreaWinner {
    pub party_code: Option<String>,
    pub party_no: Option<u32>,
    pub party_name: Option<String>,
    pub vote_total: u64,
    /// 0-100 scale.
    pub vote_percent: f64,
}

impl AreaWinner {
    fn of(area: &Area, ballot: BallotType) -> AreaWinner {
        match area.winner(ballot) {
            Some(w) => AreaWinner {
                party_code: Some(w.party_code.clone()),
                party_no: Some(w.party_no),
                party_name: Some(w.party_name.clone()),
                vote_total: w.vote_total,
                vote_percent: w.percent_0_100(),
            },
            None => AreaWinner::default(),
        }
    }
}

// ********* Small-party vote share ***********

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HotspotRow {
    pub area_code: String,
    pub province_name: String,
    pub area_name: String,
    pub small_vote_total: u64,
    /// Party-list total votes of the area.
    pub area_total_votes: u64,
    pub small_vote_share: f64,
    pub small_party_count: usize,
    pub top_small_party_no: Option<u32>,
    pub top_small_party_name: Option<String>,
    pub top_small_party_votes: u64,
    /// Constituency winner.
    pub winner: AreaWinner,
    pub winner_is_major: bool,
}

/// Every area with its small-party share, largest share first.
pub fn hotspot_rows(dataset: &Dataset, eligibility: &Eligibility) -> Vec<HotspotRow> {
    let mut rows: Vec<HotspotRow> = dataset
        .areas
        .iter()
        .map(|area| {
            let small: Vec<&PartyResult> = area
                .party_results
                .iter()
                .filter(|pr| eligibility.is_small(&pr.party_code))
                .collect();
            let small_vote_total: u64 = small.iter().map(|pr| pr.vote_total).sum();
            // first of the largest, in result order
            let mut top: Option<&PartyResult> = None;
            for pr in small.iter() {
                if top.map(|t| pr.vote_total > t.vote_total).unwrap_or(true) {
                    top = Some(*pr);
                }
            }
            let winner = AreaWinner::of(area, BallotType::Constituency);
            let winner_is_major = winner
                .party_code
                .as_ref()
                .map(|c| eligibility.is_major(c))
                .unwrap_or(false);
            HotspotRow {
                area_code: area.area_code.clone(),
                province_name: area.province_name.clone(),
                area_name: area.area_name.clone(),
                small_vote_total,
                area_total_votes: area.totals.total_votes,
                small_vote_share: safe_div(small_vote_total as f64, area.totals.total_votes as f64),
                small_party_count: small.len(),
                top_small_party_no: top.map(|pr| pr.party_no),
                top_small_party_name: top.map(|pr| pr.party_name.clone()),
                top_small_party_votes: top.map(|pr| pr.vote_total).unwrap_or(0),
                winner,
                winner_is_major,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.small_vote_share.total_cmp(&a.small_vote_share));
    rows
}

/// Sums over exactly the rows given.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HotspotTotal {
    pub area_count: usize,
    pub small_vote_total: u64,
    pub area_total_votes: u64,
    pub small_vote_share: f64,
    pub top_small_party_votes: u64,
}

pub fn hotspot_total(rows: &[HotspotRow]) -> HotspotTotal {
    let small_vote_total: u64 = rows.iter().map(|r| r.small_vote_total).sum();
    let area_total_votes: u64 = rows.iter().map(|r| r.area_total_votes).sum();
    HotspotTotal {
        area_count: rows.len(),
        small_vote_total,
        area_total_votes,
        small_vote_share: safe_div(small_vote_total as f64, area_total_votes as f64),
        top_small_party_votes: rows.iter().map(|r| r.top_small_party_votes).sum(),
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WinnerConcentrationRow {
    /// `None` for the bucket of every other winner.
    pub party_code: Option<String>,
    pub party_no: Option<u32>,
    pub party_name: String,
    pub top_count: usize,
    pub top_share: f64,
    pub all_count: usize,
    pub all_share: f64,
    /// Top-N share over all-area share, 0 when the latter is 0.
    pub lift: f64,
}

const OTHER_BUCKET: &str = "Other";

fn concentration_row(
    party_code: Option<String>,
    party_no: Option<u32>,
    party_name: String,
    top_count: usize,
    top_len: usize,
    all_count: usize,
    all_len: usize,
) -> WinnerConcentrationRow {
    let top_share = safe_div(top_count as f64, top_len as f64);
    let all_share = safe_div(all_count as f64, all_len as f64);
    WinnerConcentrationRow {
        party_code,
        party_no,
        party_name,
        top_count,
        top_share,
        all_count,
        all_share,
        lift: safe_div(top_share, all_share),
    }
}

/// One bucket per major source party plus one for everybody else.
pub fn major_winner_concentration(
    top: &[&AreaWinner],
    all: &[&AreaWinner],
    eligibility: &Eligibility,
) -> Vec<WinnerConcentrationRow> {
    let count = |ws: &[&AreaWinner], code: Option<&str>| {
        ws.iter()
            .filter(|w| match code {
                Some(c) => w.party_code.as_deref() == Some(c),
                None => !w
                    .party_code
                    .as_ref()
                    .map(|c| eligibility.is_major(c))
                    .unwrap_or(false),
            })
            .count()
    };
    let mut res: Vec<WinnerConcentrationRow> = eligibility
        .majors
        .iter()
        .map(|p| {
            concentration_row(
                Some(p.party_code.clone()),
                Some(p.party_no),
                p.party_name.clone(),
                count(top, Some(p.party_code.as_str())),
                top.len(),
                count(all, Some(p.party_code.as_str())),
                all.len(),
            )
        })
        .collect();
    res.push(concentration_row(
        None,
        None,
        OTHER_BUCKET.to_string(),
        count(top, None),
        top.len(),
        count(all, None),
        all.len(),
    ));
    res.sort_by(|a, b| b.top_count.cmp(&a.top_count));
    res
}

/// One bucket per party that won at least one of the top areas.
pub fn any_winner_concentration(top: &[&AreaWinner], all: &[&AreaWinner]) -> Vec<WinnerConcentrationRow> {
    let key = |w: &AreaWinner| match (&w.party_code, w.party_no) {
        (Some(c), _) => c.clone(),
        (None, Some(no)) => format!("UNKNOWN-{}", no),
        (None, None) => "UNKNOWN".to_string(),
    };
    let mut order: Vec<String> = Vec::new();
    let mut firsts: HashMap<String, &AreaWinner> = HashMap::new();
    let mut top_counts: HashMap<String, usize> = HashMap::new();
    for w in top.iter() {
        let k = key(*w);
        if !firsts.contains_key(&k) {
            order.push(k.clone());
            firsts.insert(k.clone(), *w);
        }
        *top_counts.entry(k).or_insert(0) += 1;
    }
    let mut all_counts: HashMap<String, usize> = HashMap::new();
    for w in all.iter() {
        *all_counts.entry(key(*w)).or_insert(0) += 1;
    }
    let mut res: Vec<WinnerConcentrationRow> = order
        .into_iter()
        .map(|k| {
            let first = firsts[&k];
            concentration_row(
                first.party_code.clone(),
                first.party_no,
                first.party_name.clone().unwrap_or_else(|| k.clone()),
                top_counts.get(&k).copied().unwrap_or(0),
                top.len(),
                all_counts.get(&k).copied().unwrap_or(0),
                all.len(),
            )
        })
        .collect();
    res.sort_by(|a, b| b.top_count.cmp(&a.top_count));
    res
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HotspotRanking {
    pub area_count: usize,
    /// The top-N areas.
    pub rows: Vec<HotspotRow>,
    /// Over `rows` only.
    pub total: HotspotTotal,
    pub winner_concentration: Vec<WinnerConcentrationRow>,
}

pub fn rank_hotspots(dataset: &Dataset, eligibility: &Eligibility, top_n: usize) -> HotspotRanking {
    let all = hotspot_rows(dataset, eligibility);
    let rows: Vec<HotspotRow> = all.iter().take(top_n).cloned().collect();
    let top_w: Vec<&AreaWinner> = rows.iter().map(|r| &r.winner).collect();
    let all_w: Vec<&AreaWinner> = all.iter().map(|r| &r.winner).collect();
    let winner_concentration = major_winner_concentration(&top_w, &all_w, eligibility);
    debug!("rank_hotspots: top {} of {} areas", rows.len(), all.len());
    HotspotRanking {
        area_count: all.len(),
        total: hotspot_total(&rows),
        rows,
        winner_concentration,
    }
}

// ********* Invalid ballots ***********

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct InvalidBallotRow {
    pub area_code: String,
    pub province_name: String,
    pub area_name: String,
    pub total_votes: u64,
    pub good_votes: u64,
    pub bad_votes: u64,
    pub no_votes: u64,
    pub bad_rate: f64,
    /// Winner of the same ballot.
    pub winner: AreaWinner,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct InvalidBallotTotal {
    pub area_count: usize,
    pub total_votes: u64,
    pub bad_votes: u64,
    pub bad_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct InvalidBallotRanking {
    pub ballot: BallotType,
    pub area_count: usize,
    pub rows: Vec<InvalidBallotRow>,
    pub total: InvalidBallotTotal,
    pub winner_concentration: Vec<WinnerConcentrationRow>,
}

/// Areas by bad-ballot rate of one ballot, largest first.
pub fn invalid_ballot_rows(dataset: &Dataset, ballot: BallotType) -> Vec<InvalidBallotRow> {
    let mut rows: Vec<InvalidBallotRow> = dataset
        .areas
        .iter()
        .map(|area| {
            let t = area.totals_for(ballot);
            InvalidBallotRow {
                area_code: area.area_code.clone(),
                province_name: area.province_name.clone(),
                area_name: area.area_name.clone(),
                total_votes: t.total_votes,
                good_votes: t.good_votes,
                bad_votes: t.bad_votes,
                no_votes: t.no_votes,
                bad_rate: safe_div(t.bad_votes as f64, t.total_votes as f64),
                winner: AreaWinner::of(area, ballot),
            }
        })
        .collect();
    rows.sort_by(|a, b| b.bad_rate.total_cmp(&a.bad_rate));
    rows
}

pub fn rank_invalid_ballots(dataset: &Dataset, ballot: BallotType, top_n: usize) -> InvalidBallotRanking {
    let all = invalid_ballot_rows(dataset, ballot);
    let rows: Vec<InvalidBallotRow> = all.iter().take(top_n).cloned().collect();
    let top_w: Vec<&AreaWinner> = rows.iter().map(|r| &r.winner).collect();
    let all_w: Vec<&AreaWinner> = all.iter().map(|r| &r.winner).collect();
    let total_votes: u64 = rows.iter().map(|r| r.total_votes).sum();
    let bad_votes: u64 = rows.iter().map(|r| r.bad_votes).sum();
    InvalidBallotRanking {
        ballot,
        area_count: all.len(),
        total: InvalidBallotTotal {
            area_count: rows.len(),
            total_votes,
            bad_votes,
            bad_rate: safe_div(bad_votes as f64, total_votes as f64),
        },
        winner_concentration: any_winner_concentration(&top_w, &all_w),
        rows,
    }
}

// ********* Province residuals ***********

pub const SUSPICIOUS_QUANTILE: f64 = 0.9;
const LOW_INFORMATION_STD: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ResidualRow {
    pub area_code: String,
    pub province_name: String,
    pub small_vote_share: f64,
    /// Constituency winner share, 0-1.
    pub winner_share: f64,
    /// Z-score of the share within its province.
    pub residual_score: f64,
    pub suspicious: bool,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProvinceStats {
    pub province_name: String,
    pub area_count: usize,
    pub mean: f64,
    /// Sample standard deviation.
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ResidualAnalysis {
    /// In area order.
    pub rows: Vec<ResidualRow>,
    pub provinces: Vec<ProvinceStats>,
    /// Provinces where every area has the same share; their residuals are 0.
    pub low_information_provinces: Vec<String>,
    pub threshold: f64,
    pub suspicious_count: usize,
    pub control_count: usize,
}

fn province_groups<'a, T, F>(items: &'a [T], province: F) -> Vec<(String, Vec<&'a T>)>
where
    F: Fn(&T) -> &str,
{
    let mut res: Vec<(String, Vec<&T>)> = Vec::new();
    for it in items.iter() {
        let p = province(it);
        match res.iter_mut().find(|(name, _)| name == p) {
            Some((_, group)) => group.push(it),
            None => res.push((p.to_string(), vec![it])),
        }
    }
    res
}

/// Flags areas whose small-party share stands out within their province.
pub fn province_residuals(dataset: &Dataset, eligibility: &Eligibility) -> ResidualAnalysis {
    let hot = hotspot_rows(dataset, eligibility);
    let share_of: HashMap<&str, &HotspotRow> = hot.iter().map(|r| (r.area_code.as_str(), r)).collect();
    let mut rows: Vec<ResidualRow> = dataset
        .areas
        .iter()
        .map(|a| ResidualRow {
            area_code: a.area_code.clone(),
            province_name: a.province_name.clone(),
            small_vote_share: share_of
                .get(a.area_code.as_str())
                .map(|r| r.small_vote_share)
                .unwrap_or(0.0),
            winner_share: a
                .constituency_winner()
                .map(|w| safe_div(w.vote_percent, 100.0))
                .unwrap_or(0.0),
            residual_score: 0.0,
            suspicious: false,
        })
        .collect();

    let mut provinces: Vec<ProvinceStats> = Vec::new();
    let mut low_information_provinces: Vec<String> = Vec::new();
    for (name, group) in province_groups(&rows, |r| r.province_name.as_str()) {
        let shares: Vec<f64> = group.iter().map(|r| r.small_vote_share).collect();
        let std = sample_std(&shares);
        if std <= LOW_INFORMATION_STD {
            low_information_provinces.push(name.clone());
        }
        provinces.push(ProvinceStats {
            province_name: name,
            area_count: shares.len(),
            mean: mean(&shares),
            std,
        });
    }

    for r in rows.iter_mut() {
        if let Some(p) = provinces.iter().find(|p| p.province_name == r.province_name) {
            r.residual_score = if p.std > LOW_INFORMATION_STD {
                (r.small_vote_share - p.mean) / p.std
            } else {
                0.0
            };
        }
    }
    let residuals: Vec<f64> = rows.iter().map(|r| r.residual_score).collect();
    let threshold = quantile(&residuals, SUSPICIOUS_QUANTILE);
    let mut suspicious_count = 0;
    for r in rows.iter_mut() {
        r.suspicious = r.residual_score >= threshold;
        if r.suspicious {
            suspicious_count += 1;
        }
    }
    info!(
        "Province residuals: {} suspicious areas out of {}, threshold {:.3}",
        suspicious_count,
        rows.len(),
        threshold
    );
    ResidualAnalysis {
        control_count: rows.len() - suspicious_count,
        rows,
        provinces,
        low_information_provinces,
        threshold,
        suspicious_count,
    }
}

// ********* Suspicious vs control ***********

pub const COMPARISON_BOOTSTRAP_ROUNDS: usize = 500;
const SHARE_BOOTSTRAP_SEED: i64 = 20_260_209;
const WINNER_BOOTSTRAP_SEED: i64 = 20_260_210;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GroupComparison {
    pub suspicious_count: usize,
    pub control_count: usize,
    pub mean_small_share_suspicious: f64,
    pub mean_small_share_control: f64,
    pub diff_small_share: f64,
    pub mean_winner_share_suspicious: f64,
    pub mean_winner_share_control: f64,
    pub diff_winner_share: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ProvinceComparison {
    pub province_name: String,
    pub comparison: GroupComparison,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct SuspicionComparison {
    pub overall: GroupComparison,
    /// Bootstrap 95% range of `diff_small_share`.
    pub diff_small_share_ci: (f64, f64),
    /// Bootstrap 95% range of `diff_winner_share`.
    pub diff_winner_share_ci: (f64, f64),
    pub by_province: Vec<ProvinceComparison>,
    /// Relation between small-party share (x) and winner share (y) over all areas.
    pub share_trend: Option<Trend>,
}

fn compare_groups(rows: &[&ResidualRow]) -> (GroupComparison, [Vec<f64>; 4]) {
    let pick = |suspicious: bool, f: fn(&ResidualRow) -> f64| -> Vec<f64> {
        rows.iter().filter(|r| r.suspicious == suspicious).map(|r| f(r)).collect()
    };
    let s_shares = pick(true, |r| r.small_vote_share);
    let c_shares = pick(false, |r| r.small_vote_share);
    let s_wins = pick(true, |r| r.winner_share);
    let c_wins = pick(false, |r| r.winner_share);
    let cmp = GroupComparison {
        suspicious_count: s_shares.len(),
        control_count: c_shares.len(),
        mean_small_share_suspicious: mean(&s_shares),
        mean_small_share_control: mean(&c_shares),
        diff_small_share: mean(&s_shares) - mean(&c_shares),
        mean_winner_share_suspicious: mean(&s_wins),
        mean_winner_share_control: mean(&c_wins),
        diff_winner_share: mean(&s_wins) - mean(&c_wins),
    };
    (cmp, [s_shares, c_shares, s_wins, c_wins])
}

pub fn suspicion_comparison(residuals: &ResidualAnalysis) -> SuspicionComparison {
    let all: Vec<&ResidualRow> = residuals.rows.iter().collect();
    let (overall, [s_shares, c_shares, s_wins, c_wins]) = compare_groups(&all);
    let mut by_province: Vec<ProvinceComparison> = province_groups(&residuals.rows, |r| r.province_name.as_str())
        .into_iter()
        .map(|(name, group)| ProvinceComparison {
            province_name: name,
            comparison: compare_groups(&group).0,
        })
        .collect();
    by_province.sort_by(|a, b| {
        b.comparison
            .diff_small_share
            .total_cmp(&a.comparison.diff_small_share)
            .then(b.comparison.suspicious_count.cmp(&a.comparison.suspicious_count))
    });
    let diff_small_share_ci = bootstrap_diff_mean(
        &s_shares,
        &c_shares,
        &mut LehmerRng::new(SHARE_BOOTSTRAP_SEED),
        COMPARISON_BOOTSTRAP_ROUNDS,
    );
    let diff_winner_share_ci = bootstrap_diff_mean(
        &s_wins,
        &c_wins,
        &mut LehmerRng::new(WINNER_BOOTSTRAP_SEED),
        COMPARISON_BOOTSTRAP_ROUNDS,
    );
    let xs: Vec<f64> = residuals.rows.iter().map(|r| r.small_vote_share).collect();
    let ys: Vec<f64> = residuals.rows.iter().map(|r| r.winner_share).collect();
    SuspicionComparison {
        overall,
        diff_small_share_ci,
        diff_winner_share_ci,
        by_province,
        share_trend: linear_trend(&xs, &ys),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;
    use crate::config::{AnalysisConfig, VoteTotals};

    /// Areas of 1000 list votes each where the small party S takes `shares`
    /// percent. X wins the constituency in the first area, Y elsewhere.
    fn shares_dataset(shares: &[(&str, u64)]) -> (Dataset, Eligibility) {
        let mut b = DatasetBuilder::new()
            .party("X", 9, "X")
            .unwrap()
            .party("Y", 27, "Y")
            .unwrap()
            .party("S", 5, "S")
            .unwrap();
        for (i, (province, pct)) in shares.iter().enumerate() {
            let code = format!("A{}", i);
            b.area(&code, province, &code).unwrap();
            b.party_list_result(&code, "S", pct * 10).unwrap();
            b.party_list_result(&code, "X", 100_000).unwrap();
            b.party_list_result(&code, "Y", 1000 - pct * 10).unwrap();
            b.totals(
                &code,
                BallotType::PartyList,
                VoteTotals {
                    total_votes: 1000,
                    good_votes: 900,
                    bad_votes: 100 - i as u64,
                    no_votes: 0,
                },
            )
            .unwrap();
            let (first, second) = if i == 0 { ("X", "Y") } else { ("Y", "X") };
            b.constituency_result(&code, first, 600).unwrap();
            b.constituency_result(&code, second, 400).unwrap();
        }
        let ds = b.build();
        let cfg = AnalysisConfig {
            exclude_top: 2,
            ..AnalysisConfig::default()
        };
        let el = Eligibility::from_config(&ds, &cfg);
        (ds, el)
    }

    #[test]
    fn ranks_by_share_and_totals_displayed_rows() {
        let (ds, el) = shares_dataset(&[("P", 10), ("P", 40)]);
        let ranking = rank_hotspots(&ds, &el, 1);
        assert_eq!(ranking.area_count, 2);
        assert_eq!(ranking.rows.len(), 1);
        assert_eq!(ranking.rows[0].area_code, "A1");
        assert!((ranking.rows[0].small_vote_share - 0.4).abs() < 1e-12);
        assert_eq!(ranking.total.small_vote_share, ranking.rows[0].small_vote_share);
        assert_eq!(ranking.rows[0].top_small_party_no, Some(5));
        assert_eq!(ranking.rows[0].winner.party_code.as_deref(), Some("Y"));
        assert!(ranking.rows[0].winner_is_major);

        let y = ranking
            .winner_concentration
            .iter()
            .find(|r| r.party_code.as_deref() == Some("Y"))
            .unwrap();
        assert_eq!(y.top_count, 1);
        assert!((y.all_share - 0.5).abs() < 1e-12);
        assert!((y.lift - 2.0).abs() < 1e-12);
        let other = ranking.winner_concentration.last().unwrap();
        assert_eq!(other.party_code, None);
        assert_eq!(other.all_count, 0);
    }

    #[test]
    fn invalid_ballot_ranking() {
        let (ds, _) = shares_dataset(&[("P", 10), ("P", 40), ("Q", 5)]);
        let r = rank_invalid_ballots(&ds, BallotType::PartyList, 2);
        assert_eq!(r.rows[0].area_code, "A0");
        assert!((r.rows[0].bad_rate - 0.1).abs() < 1e-12);
        assert_eq!(r.total.bad_votes, 199);
        assert_eq!(r.rows[0].winner.party_code.as_deref(), Some("X"));
        assert_eq!(r.winner_concentration[0].top_count, 2);
        assert!((r.winner_concentration[0].lift - 1.0).abs() < 1e-12);
        let cons = rank_invalid_ballots(&ds, BallotType::Constituency, 30);
        assert_eq!(cons.rows.len(), 3);
        assert_eq!(cons.total.bad_rate, 0.0);
        assert!((cons.rows[0].winner.vote_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn residuals_flag_the_province_outlier() {
        let (ds, el) = shares_dataset(&[
            ("P", 10),
            ("P", 11),
            ("P", 9),
            ("P", 10),
            ("P", 40),
            ("Q", 20),
            ("Q", 20),
        ]);
        let res = province_residuals(&ds, &el);
        assert_eq!(res.low_information_provinces, vec!["Q".to_string()]);
        assert!(res.rows[4].suspicious);
        assert!(res.rows[4].residual_score > 1.0);
        assert_eq!(res.rows[5].residual_score, 0.0);
        assert_eq!(res.suspicious_count, 1);

        let cmp = suspicion_comparison(&res);
        assert_eq!(cmp.overall.suspicious_count, 1);
        assert!(cmp.overall.diff_small_share > 0.0);
        let (lo, hi) = cmp.diff_small_share_ci;
        assert!(lo <= hi);
        assert_eq!(cmp.by_province[0].province_name, "P");
        assert!((cmp.overall.mean_winner_share_suspicious - 0.6).abs() < 1e-9);
    }
}
