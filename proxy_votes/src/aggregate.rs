use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use log::debug;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::matcher::MatchedRow;
use crate::stats::{linear_trend, mean, pearson, safe_div, Trend};

/// What a group of matched rows is keyed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct GroupKey {
    pub source_party_code: String,
    pub province_name: Option<String>,
    pub won_area: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AggregateRow {
    pub key: GroupKey,
    pub source_party_no: u32,
    pub source_party_name: String,
    pub proxy_votes: u64,
    /// Source party constituency votes, counted once per area.
    pub source_constituency_votes: u64,
    pub row_count: usize,
    pub area_count: usize,
    pub normalized_by_constituency: f64,
    pub share_of_proxy_votes: f64,
}

struct Accumulator {
    key: GroupKey,
    source_party_no: u32,
    source_party_name: String,
    proxy_votes: u64,
    row_count: usize,
    // (area, source party) -> constituency votes, first seen value
    denominators: HashMap<(String, String), u64>,
    areas: BTreeSet<String>,
}

impl Accumulator {
    fn new(key: GroupKey, first: &MatchedRow) -> Accumulator {
        Accumulator {
            key,
            source_party_no: first.source_party_no,
            source_party_name: first.source_party_name.clone(),
            proxy_votes: 0,
            row_count: 0,
            denominators: HashMap::new(),
            areas: BTreeSet::new(),
        }
    }

    fn add(&mut self, row: &MatchedRow) {
        self.proxy_votes += row.small_party_votes;
        self.row_count += 1;
        self.areas.insert(row.area_code.clone());
        self.denominators
            .entry((row.area_code.clone(), row.source_party_code.clone()))
            .or_insert(row.source_constituency_votes_in_area);
    }

    fn finish(self, all_proxy_votes: u64) -> AggregateRow {
        let denominator: u64 = self.denominators.values().sum();
        AggregateRow {
            key: self.key,
            source_party_no: self.source_party_no,
            source_party_name: self.source_party_name,
            proxy_votes: self.proxy_votes,
            source_constituency_votes: denominator,
            row_count: self.row_count,
            area_count: self.areas.len(),
            normalized_by_constituency: safe_div(self.proxy_votes as f64, denominator as f64),
            share_of_proxy_votes: safe_div(self.proxy_votes as f64, all_proxy_votes as f64),
        }
    }
}

/// Groups matched rows by `key_fn`.
///
/// Groups come out largest `proxy_votes` first, ties in order of first
/// appearance. The denominator of a group counts every area once, however many
/// small parties of that area point to the source party.
pub fn aggregate<F>(rows: &[MatchedRow], key_fn: F) -> Vec<AggregateRow>
where
    F: Fn(&MatchedRow) -> GroupKey,
{
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Accumulator> = Vec::new();
    for row in rows.iter() {
        let key = key_fn(row);
        let pos = match index.get(&key) {
            Some(pos) => *pos,
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Accumulator::new(key, row));
                groups.len() - 1
            }
        };
        groups[pos].add(row);
    }
    let all_proxy_votes: u64 = groups.iter().map(|g| g.proxy_votes).sum();
    let mut res: Vec<AggregateRow> = groups
        .into_iter()
        .map(|g| g.finish(all_proxy_votes))
        .collect();
    sort_rows(&mut res, SortKey::ProxyVotes, SortOrder::Descending);
    debug!("aggregate: {} rows into {} groups", rows.len(), res.len());
    res
}

pub fn key_by_source_party(row: &MatchedRow) -> GroupKey {
    GroupKey {
        source_party_code: row.source_party_code.clone(),
        province_name: None,
        won_area: None,
    }
}

pub fn key_by_source_party_and_outcome(row: &MatchedRow) -> GroupKey {
    GroupKey {
        won_area: Some(row.source_party_won_area),
        ..key_by_source_party(row)
    }
}

pub fn key_by_province_and_source_party(row: &MatchedRow) -> GroupKey {
    GroupKey {
        province_name: Some(row.province_name.clone()),
        ..key_by_source_party(row)
    }
}

pub fn by_source_party(rows: &[MatchedRow]) -> Vec<AggregateRow> {
    aggregate(rows, key_by_source_party)
}

pub fn by_source_party_and_outcome(rows: &[MatchedRow]) -> Vec<AggregateRow> {
    aggregate(rows, key_by_source_party_and_outcome)
}

pub fn by_province_and_source_party(rows: &[MatchedRow]) -> Vec<AggregateRow> {
    aggregate(rows, key_by_province_and_source_party)
}

/// Sum over the displayed groups.
///
/// The denominator is recomputed from the matched rows of those groups, one
/// value per (area, source party), never by adding the group denominators.
/// `share_of_proxy_votes` is the summed share of the displayed groups.
pub fn total_row<F>(displayed: &[AggregateRow], matched: &[MatchedRow], key_fn: F) -> AggregateRow
where
    F: Fn(&MatchedRow) -> GroupKey,
{
    let shown: Vec<&GroupKey> = displayed.iter().map(|r| &r.key).collect();
    let total_key = GroupKey {
        source_party_code: "TOTAL".to_string(),
        province_name: None,
        won_area: None,
    };
    let mut acc: Option<Accumulator> = None;
    for row in matched.iter().filter(|r| shown.contains(&&key_fn(r))) {
        acc.get_or_insert_with(|| Accumulator::new(total_key.clone(), row))
            .add(row);
    }
    let share: f64 = displayed.iter().map(|r| r.share_of_proxy_votes).sum();
    match acc {
        Some(acc) => {
            let mut res = acc.finish(0);
            res.source_party_no = 0;
            res.source_party_name = "Total".to_string();
            res.share_of_proxy_votes = share;
            res
        }
        None => AggregateRow {
            key: total_key,
            source_party_no: 0,
            source_party_name: "Total".to_string(),
            proxy_votes: 0,
            source_constituency_votes: 0,
            row_count: 0,
            area_count: 0,
            normalized_by_constituency: 0.0,
            share_of_proxy_votes: share,
        },
    }
}

// ********* Sorting ***********

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    ProxyVotes,
    SourceConstituencyVotes,
    NormalizedByConstituency,
    ShareOfProxyVotes,
    RowCount,
    AreaCount,
    SourcePartyNo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn toggled(self) -> SortOrder {
        match self {
            SortOrder::Ascending => SortOrder::Descending,
            SortOrder::Descending => SortOrder::Ascending,
        }
    }
}

fn compare(a: &AggregateRow, b: &AggregateRow, key: SortKey) -> Ordering {
    match key {
        SortKey::ProxyVotes => a.proxy_votes.cmp(&b.proxy_votes),
        SortKey::SourceConstituencyVotes => a.source_constituency_votes.cmp(&b.source_constituency_votes),
        SortKey::NormalizedByConstituency => a
            .normalized_by_constituency
            .total_cmp(&b.normalized_by_constituency),
        SortKey::ShareOfProxyVotes => a.share_of_proxy_votes.total_cmp(&b.share_of_proxy_votes),
        SortKey::RowCount => a.row_count.cmp(&b.row_count),
        SortKey::AreaCount => a.area_count.cmp(&b.area_count),
        SortKey::SourcePartyNo => a.source_party_no.cmp(&b.source_party_no),
    }
}

/// Re-sorts an existing result. Stable in both directions: equal rows keep
/// their current order.
pub fn sort_rows(rows: &mut [AggregateRow], key: SortKey, order: SortOrder) {
    match order {
        SortOrder::Ascending => rows.sort_by(|a, b| compare(a, b, key)),
        SortOrder::Descending => rows.sort_by(|a, b| compare(b, a, key)),
    }
}

// ********* Win / lose comparison ***********

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WinLoseRow {
    pub source_party_code: String,
    pub source_party_no: u32,
    pub source_party_name: String,
    /// Normalized ratio in the areas the source party won.
    pub win_ratio: f64,
    /// Normalized ratio in the areas it lost.
    pub lose_ratio: f64,
    pub difference: f64,
    pub win_area_count: usize,
    pub lose_area_count: usize,
    pub win_row_count: usize,
    pub lose_row_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct WinLoseComparison {
    /// Largest difference first.
    pub rows: Vec<WinLoseRow>,
    pub overall_win_ratio: f64,
    pub overall_lose_ratio: f64,
    pub overall_difference: f64,
}

pub fn win_lose_comparison(rows: &[MatchedRow]) -> WinLoseComparison {
    let buckets = by_source_party_and_outcome(rows);
    let mut res: Vec<WinLoseRow> = Vec::new();
    for party in by_source_party(rows).iter() {
        let code = &party.key.source_party_code;
        let bucket = |won: bool| {
            buckets
                .iter()
                .find(|b| &b.key.source_party_code == code && b.key.won_area == Some(won))
        };
        let win = bucket(true);
        let lose = bucket(false);
        let win_ratio = win.map(|b| b.normalized_by_constituency).unwrap_or(0.0);
        let lose_ratio = lose.map(|b| b.normalized_by_constituency).unwrap_or(0.0);
        res.push(WinLoseRow {
            source_party_code: code.clone(),
            source_party_no: party.source_party_no,
            source_party_name: party.source_party_name.clone(),
            win_ratio,
            lose_ratio,
            difference: win_ratio - lose_ratio,
            win_area_count: win.map(|b| b.area_count).unwrap_or(0),
            lose_area_count: lose.map(|b| b.area_count).unwrap_or(0),
            win_row_count: win.map(|b| b.row_count).unwrap_or(0),
            lose_row_count: lose.map(|b| b.row_count).unwrap_or(0),
        });
    }
    res.sort_by(|a, b| b.difference.total_cmp(&a.difference));
    let overall = |won: bool| {
        let (num, den) = buckets
            .iter()
            .filter(|b| b.key.won_area == Some(won))
            .fold((0u64, 0u64), |(n, d), b| {
                (n + b.proxy_votes, d + b.source_constituency_votes)
            });
        safe_div(num as f64, den as f64)
    };
    let overall_win_ratio = overall(true);
    let overall_lose_ratio = overall(false);
    WinLoseComparison {
        rows: res,
        overall_win_ratio,
        overall_lose_ratio,
        overall_difference: overall_win_ratio - overall_lose_ratio,
    }
}

// ********* Relation between source strength and small-party vote ***********

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RelationRow {
    pub source_party_code: String,
    pub source_party_no: u32,
    pub source_party_name: String,
    pub point_count: usize,
    /// Mean source constituency share, in percent.
    pub mean_source_share_pct: f64,
    pub mean_small_party_pct: f64,
    pub correlation: f64,
    /// Absent when every point has the same source share.
    pub trend: Option<Trend>,
}

/// Per source party: source constituency share (x, %) against the small
/// party's list vote percent (y). Most points first.
pub fn relation_summary(rows: &[MatchedRow]) -> Vec<RelationRow> {
    let mut order: Vec<&str> = Vec::new();
    let mut points: HashMap<&str, (Vec<f64>, Vec<f64>, &MatchedRow)> = HashMap::new();
    for r in rows.iter() {
        let entry = points.entry(r.source_party_code.as_str()).or_insert_with(|| {
            order.push(r.source_party_code.as_str());
            (Vec::new(), Vec::new(), r)
        });
        entry.0.push(r.source_constituency_share_in_area * 100.0);
        entry.1.push(r.small_party_vote_percent);
    }
    let mut res: Vec<RelationRow> = order
        .iter()
        .filter_map(|code| points.get(code))
        .map(|(xs, ys, first)| RelationRow {
            source_party_code: first.source_party_code.clone(),
            source_party_no: first.source_party_no,
            source_party_name: first.source_party_name.clone(),
            point_count: xs.len(),
            mean_source_share_pct: mean(xs),
            mean_small_party_pct: mean(ys),
            correlation: pearson(xs, ys),
            trend: linear_trend(xs, ys),
        })
        .collect();
    res.sort_by(|a, b| b.point_count.cmp(&a.point_count));
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::Eligibility;
    use crate::matcher::tests::{two_area_config, two_area_dataset};
    use crate::matcher::{match_dataset, MatchFilter};

    fn row(area: &str, source: &str, votes: u64, source_votes: u64, won: bool) -> MatchedRow {
        MatchedRow {
            area_code: area.to_string(),
            area_name: area.to_string(),
            province_name: format!("prov-{}", area),
            small_party_code: format!("S{}", votes),
            small_party_no: 1,
            small_party_name: "small".to_string(),
            small_party_votes: votes,
            small_party_vote_percent: votes as f64 / 100.0,
            candidate_no: 1,
            candidate_name: "c".to_string(),
            source_party_code: source.to_string(),
            source_party_no: 9,
            source_party_name: source.to_string(),
            source_is_major: true,
            source_constituency_votes_in_area: source_votes,
            source_constituency_share_in_area: source_votes as f64 / 40_000.0,
            source_party_won_area: won,
        }
    }

    #[test]
    fn two_area_scenario() {
        let ds = two_area_dataset();
        let el = Eligibility::from_config(&ds, &two_area_config());
        let rows = match_dataset(&ds, &el, &MatchFilter::default()).rows;
        let groups = by_source_party(&rows);
        assert_eq!(groups.len(), 1);
        let x = &groups[0];
        assert_eq!(x.key.source_party_code, "X");
        assert_eq!(x.proxy_votes, 500);
        assert_eq!(x.area_count, 1);
        assert_eq!(x.source_constituency_votes, 10_000);
        assert!((x.normalized_by_constituency - 0.05).abs() < 1e-12);
        assert!((x.share_of_proxy_votes - 1.0).abs() < 1e-12);
    }

    #[test]
    fn denominator_counts_each_area_once() {
        let rows = vec![
            row("A", "X", 100, 1_000, true),
            row("A", "X", 300, 1_000, true),
            row("B", "X", 50, 4_000, false),
            row("B", "Y", 10, 2_000, true),
        ];
        let groups = by_source_party(&rows);
        let x = groups.iter().find(|g| g.key.source_party_code == "X").unwrap();
        assert_eq!(x.source_constituency_votes, 5_000);
        assert_eq!(x.row_count, 3);
        assert_eq!(x.area_count, 2);
        assert_eq!(x.proxy_votes, 450);
        assert!((x.share_of_proxy_votes - 450.0 / 460.0).abs() < 1e-12);

        let total = total_row(&groups, &rows, key_by_source_party);
        assert_eq!(total.proxy_votes, 460);
        assert_eq!(total.source_constituency_votes, 7_000);
        assert_eq!(total.area_count, 2);
        assert!((total.share_of_proxy_votes - 1.0).abs() < 1e-12);

        let only_y = total_row(&groups[1..], &rows, key_by_source_party);
        assert_eq!(only_y.proxy_votes, 10);
        assert_eq!(only_y.source_constituency_votes, 2_000);
    }

    #[test]
    fn sort_toggle_is_stable() {
        let rows = vec![
            row("A", "X", 100, 1_000, true),
            row("B", "Y", 100, 500, true),
            row("C", "Z", 300, 1_000, true),
        ];
        let mut groups = by_source_party(&rows);
        let codes = |g: &[AggregateRow]| {
            g.iter()
                .map(|r| r.key.source_party_code.clone())
                .collect::<Vec<String>>()
        };
        assert_eq!(codes(&groups), vec!["Z", "X", "Y"]);
        sort_rows(&mut groups, SortKey::ProxyVotes, SortOrder::Descending.toggled());
        assert_eq!(codes(&groups), vec!["X", "Y", "Z"]);
        sort_rows(&mut groups, SortKey::NormalizedByConstituency, SortOrder::Descending);
        assert_eq!(codes(&groups), vec!["Z", "Y", "X"]);
    }

    #[test]
    fn win_lose_and_relation() {
        let rows = vec![
            row("A", "X", 200, 1_000, true),
            row("B", "X", 100, 2_000, false),
            row("C", "X", 30, 3_000, false),
            row("D", "Y", 10, 1_000, false),
        ];
        let cmp = win_lose_comparison(&rows);
        let x = cmp.rows.iter().find(|r| r.source_party_code == "X").unwrap();
        assert!((x.win_ratio - 0.2).abs() < 1e-12);
        assert!((x.lose_ratio - 130.0 / 5_000.0).abs() < 1e-12);
        assert_eq!(x.lose_area_count, 2);
        assert_eq!(cmp.rows[0].source_party_code, "X");
        assert!((cmp.overall_win_ratio - 0.2).abs() < 1e-12);
        assert!((cmp.overall_lose_ratio - 140.0 / 6_000.0).abs() < 1e-12);

        let rel = relation_summary(&rows);
        assert_eq!(rel[0].source_party_code, "X");
        assert_eq!(rel[0].point_count, 3);
        assert!(rel[0].correlation < 0.0);
        assert!(rel[0].trend.is_some());
        assert_eq!(rel[1].trend, None);
    }

    #[test]
    fn province_groups_keep_their_own_denominator() {
        let in_province = |area: &str, province: &str, votes: u64, source_votes: u64| MatchedRow {
            province_name: province.to_string(),
            ..row(area, "X", votes, source_votes, true)
        };
        let rows = vec![
            in_province("N1", "North", 100, 1_000),
            in_province("N1", "North", 40, 1_000),
            in_province("N2", "North", 60, 3_000),
            in_province("S1", "South", 300, 2_000),
        ];
        let groups = by_province_and_source_party(&rows);
        assert_eq!(groups.len(), 2);
        let find = |province: &str| {
            groups
                .iter()
                .find(|g| g.key.province_name.as_deref() == Some(province))
                .unwrap()
        };
        let north = find("North");
        assert_eq!(north.key.source_party_code, "X");
        assert_eq!(north.key.won_area, None);
        assert_eq!(north.proxy_votes, 200);
        assert_eq!(north.source_constituency_votes, 4_000);
        assert_eq!(north.area_count, 2);
        assert_eq!(north.row_count, 3);
        assert!((north.normalized_by_constituency - 0.05).abs() < 1e-12);
        let south = find("South");
        assert_eq!(south.proxy_votes, 300);
        assert_eq!(south.source_constituency_votes, 2_000);
        assert!((south.normalized_by_constituency - 0.15).abs() < 1e-12);
        // largest proxy vote first
        assert_eq!(groups[0].key.province_name.as_deref(), Some("South"));
        assert!((groups[0].share_of_proxy_votes - 0.6).abs() < 1e-12);
    }
}
