// Label-shuffle placebo test.
//
// In every round, each area keeps its candidate numbers but the true parties
// of its candidates are shuffled. The proxy votes that then land on a major
// source party form the null distribution of the real attribution.
//
// The 95% interval reported next to the distribution is the normal
// approximation mean +/- 1.96 std. It is not read off the empirical
// distribution.

use std::collections::HashMap;

use log::{debug, info};

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::config::{clamp_iterations, clamp_seed, Dataset, Party};
use crate::eligibility::Eligibility;
use crate::stats::{
    mean, population_std, quantile, safe_div, shuffle, Histogram, LehmerRng, Significance,
    UniformSource, DEFAULT_HISTOGRAM_BINS,
};

const NULL_QUANTILES: [f64; 5] = [0.01, 0.05, 0.5, 0.95, 0.99];

#[derive(Debug, Clone, PartialEq, Eq)]
struct AreaBase {
    area_code: String,
    /// For each distinct candidate, the index of its party in the major list.
    sources: Vec<Option<usize>>,
    /// (candidate position, small-party votes) for every small party whose
    /// number is carried by a candidate.
    small_pairs: Vec<(usize, u64)>,
}

/// The per-area structure shared by every round. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationBase {
    areas: Vec<AreaBase>,
    majors: Vec<Party>,
    actual_total: u64,
    actual_by_party: Vec<u64>,
}

impl PermutationBase {
    pub fn build(dataset: &Dataset, eligibility: &Eligibility) -> PermutationBase {
        let majors = eligibility.majors.clone();
        let mut areas: Vec<AreaBase> = Vec::new();
        for area in dataset.areas.iter() {
            let mut positions: HashMap<u32, usize> = HashMap::new();
            let mut sources: Vec<Option<usize>> = Vec::new();
            for c in area.candidates.iter().filter(|c| c.candidate_no > 0) {
                if positions.contains_key(&c.candidate_no) {
                    continue;
                }
                positions.insert(c.candidate_no, sources.len());
                sources.push(eligibility.major_index(&c.candidate_party_code));
            }
            if sources.is_empty() {
                continue;
            }
            let small_pairs: Vec<(usize, u64)> = area
                .party_results
                .iter()
                .filter(|pr| eligibility.is_small(&pr.party_code))
                .filter_map(|pr| positions.get(&pr.party_no).map(|pos| (*pos, pr.vote_total)))
                .collect();
            if small_pairs.is_empty() {
                continue;
            }
            areas.push(AreaBase {
                area_code: area.area_code.clone(),
                sources,
                small_pairs,
            });
        }
        let mut actual_by_party = vec![0u64; majors.len()];
        let actual_total = attribute(&areas, |a| a.sources.clone(), &mut actual_by_party);
        debug!(
            "PermutationBase::build: {} areas, actual total {}",
            areas.len(),
            actual_total
        );
        PermutationBase {
            areas,
            majors,
            actual_total,
            actual_by_party,
        }
    }

    pub fn area_count(&self) -> usize {
        self.areas.len()
    }

    /// Areas taking part in the test, in traversal order.
    pub fn area_codes(&self) -> Vec<&str> {
        self.areas.iter().map(|a| a.area_code.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    /// Proxy votes on major source parties under the true assignment.
    pub fn actual_total(&self) -> u64 {
        self.actual_total
    }

    fn iteration<R: UniformSource + ?Sized>(&self, rng: &mut R, by_party: &mut [u64]) -> u64 {
        by_party.iter_mut().for_each(|v| *v = 0);
        attribute(&self.areas, |a| shuffle(&a.sources, &mut *rng), by_party)
    }
}

/// Adds up the small-party votes that land on a major party, areas in order.
fn attribute<F>(areas: &[AreaBase], mut assignment: F, by_party: &mut [u64]) -> u64
where
    F: FnMut(&AreaBase) -> Vec<Option<usize>>,
{
    let mut total = 0;
    for area in areas.iter() {
        let sources = assignment(area);
        for (pos, votes) in area.small_pairs.iter() {
            if let Some(Some(m)) = sources.get(*pos) {
                total += votes;
                by_party[*m] += votes;
            }
        }
    }
    total
}

/// Iteration count and seed, clamped into their supported ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermutationSettings {
    pub iterations: u32,
    pub seed: i64,
}

impl PermutationSettings {
    pub fn new(iterations: i64, seed: i64) -> PermutationSettings {
        PermutationSettings {
            iterations: clamp_iterations(iterations) as u32,
            seed: clamp_seed(seed),
        }
    }
}

// ********* Results ***********

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct QuantilePoint {
    pub q: f64,
    pub value: f64,
}

/// Statistics of the null distribution against the real total.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct NullSummary {
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    /// Share of rounds at or above the real total.
    pub p_value: f64,
    /// Share of rounds at or below the real total.
    pub percentile: f64,
    pub significance: Significance,
    pub delta: f64,
    /// 0 when the distribution has no spread.
    pub z_score: f64,
    /// Normal approximation, mean - 1.96 std.
    pub normal_low: f64,
    /// Normal approximation, mean + 1.96 std.
    pub normal_high: f64,
    pub quantiles: Vec<QuantilePoint>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PartyPermutationRow {
    pub party_code: String,
    pub party_no: u32,
    pub party_name: String,
    pub actual_votes: u64,
    pub placebo_mean_votes: f64,
    pub delta_votes: f64,
    /// Actual over placebo mean, 0 when the placebo mean is 0.
    pub lift_vs_placebo: f64,
    pub p_value: f64,
    /// `1 / p_value`. Absent when no round reached the actual value, which
    /// reads as "fewer than one in `iterations_completed`".
    pub one_in_odds: Option<f64>,
    pub significance: Significance,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PermutationResult {
    pub iterations_requested: u32,
    pub iterations_completed: u32,
    pub seed: i64,
    pub aborted: bool,
    pub partitioned: bool,
    pub area_count: usize,
    pub actual_total: u64,
    /// Total attributed votes of every completed round, in order.
    pub distribution: Vec<u64>,
    /// `None` when there was nothing to test: no round or no base area.
    pub summary: Option<NullSummary>,
    pub histogram: Histogram,
    /// Largest delta first.
    pub parties: Vec<PartyPermutationRow>,
}

impl PermutationResult {
    pub fn is_no_data(&self) -> bool {
        self.summary.is_none()
    }
}

struct Collector {
    distribution: Vec<u64>,
    party_sums: Vec<u64>,
    party_at_least_actual: Vec<u64>,
}

impl Collector {
    fn new(parties: usize, capacity: u32) -> Collector {
        Collector {
            distribution: Vec::with_capacity(capacity as usize),
            party_sums: vec![0; parties],
            party_at_least_actual: vec![0; parties],
        }
    }

    fn push(&mut self, total: u64, by_party: &[u64], actual_by_party: &[u64]) {
        self.distribution.push(total);
        for (i, v) in by_party.iter().enumerate() {
            self.party_sums[i] += v;
            if *v >= actual_by_party[i] {
                self.party_at_least_actual[i] += 1;
            }
        }
    }
}

/// Runs the placebo test over a fixed base.
///
/// Every round draws from one generator, areas in dataset order, so a result
/// is a pure function of the base, the iteration count and the seed.
#[derive(Debug, Clone)]
pub struct PermutationEngine {
    base: PermutationBase,
    settings: PermutationSettings,
}

impl PermutationEngine {
    pub fn new(base: PermutationBase, iterations: i64, seed: i64) -> PermutationEngine {
        PermutationEngine {
            base,
            settings: PermutationSettings::new(iterations, seed),
        }
    }

    /// Runs with the Lehmer generator seeded from the settings.
    pub fn run(&self) -> PermutationResult {
        let mut rng = LehmerRng::new(self.settings.seed);
        self.run_with(&mut rng)
    }

    pub fn run_with<R: UniformSource + ?Sized>(&self, rng: &mut R) -> PermutationResult {
        self.run_with_abort(rng, |_| true)
    }

    /// `should_continue` is asked before every round with the number of
    /// completed rounds. Returning false stops the run.
    pub fn run_with_abort<R, F>(&self, rng: &mut R, mut should_continue: F) -> PermutationResult
    where
        R: UniformSource + ?Sized,
        F: FnMut(u32) -> bool,
    {
        let iterations = self.effective_iterations();
        info!(
            "Running placebo test: {} rounds over {} areas, seed {}",
            iterations,
            self.base.area_count(),
            self.settings.seed
        );
        let mut collector = Collector::new(self.base.majors.len(), iterations);
        let mut by_party = vec![0u64; self.base.majors.len()];
        let mut aborted = false;
        for i in 0..iterations {
            if !should_continue(i) {
                info!("Placebo test stopped after {} rounds", i);
                aborted = true;
                break;
            }
            let total = self.base.iteration(rng, &mut by_party);
            collector.push(total, &by_party, &self.base.actual_by_party);
            if (i + 1) % 500 == 0 {
                debug!("run_with_abort: {} rounds done", i + 1);
            }
        }
        self.finish(collector, aborted, false)
    }

    /// One seed per round, drawn up front from the master stream.
    pub fn sub_seeds(seed: i64, iterations: u32) -> Vec<i64> {
        let mut master = LehmerRng::new(clamp_seed(seed));
        (0..iterations).map(|_| master.next_raw() as i64).collect()
    }

    /// Each round runs on its own generator seeded from `sub_seeds`, so rounds
    /// can be computed in any order and still give the same result.
    pub fn run_partitioned(&self) -> PermutationResult {
        let iterations = self.effective_iterations();
        let seeds = PermutationEngine::sub_seeds(self.settings.seed, iterations);
        info!(
            "Running partitioned placebo test: {} rounds, seed {}",
            iterations, self.settings.seed
        );
        let mut collector = Collector::new(self.base.majors.len(), iterations);
        let mut by_party = vec![0u64; self.base.majors.len()];
        for sub_seed in seeds.iter() {
            let mut rng = LehmerRng::new(*sub_seed);
            let total = self.base.iteration(&mut rng, &mut by_party);
            collector.push(total, &by_party, &self.base.actual_by_party);
        }
        self.finish(collector, false, true)
    }

    fn effective_iterations(&self) -> u32 {
        if self.base.is_empty() {
            0
        } else {
            self.settings.iterations
        }
    }

    fn finish(&self, collector: Collector, aborted: bool, partitioned: bool) -> PermutationResult {
        let completed = collector.distribution.len() as u32;
        let values: Vec<f64> = collector.distribution.iter().map(|v| *v as f64).collect();
        let actual = self.base.actual_total as f64;
        let n = completed as f64;

        let summary = if completed == 0 {
            info!("Placebo test: no data");
            None
        } else {
            let m = mean(&values);
            let std = population_std(&values);
            let p_value = values.iter().filter(|v| **v >= actual).count() as f64 / n;
            let percentile = values.iter().filter(|v| **v <= actual).count() as f64 / n;
            info!(
                "Placebo test: actual {} mean {:.1} std {:.1} p-value {:.4}",
                actual, m, std, p_value
            );
            Some(NullSummary {
                mean: m,
                std,
                p_value,
                percentile,
                significance: Significance::from_p_value(p_value),
                delta: actual - m,
                z_score: safe_div(actual - m, std),
                normal_low: m - 1.96 * std,
                normal_high: m + 1.96 * std,
                quantiles: NULL_QUANTILES
                    .iter()
                    .map(|q| QuantilePoint {
                        q: *q,
                        value: quantile(&values, *q),
                    })
                    .collect(),
            })
        };

        let mut parties: Vec<PartyPermutationRow> = Vec::new();
        if completed > 0 {
            for (i, party) in self.base.majors.iter().enumerate() {
                let actual_votes = self.base.actual_by_party[i];
                let placebo_mean_votes = collector.party_sums[i] as f64 / n;
                let p_value = collector.party_at_least_actual[i] as f64 / n;
                parties.push(PartyPermutationRow {
                    party_code: party.party_code.clone(),
                    party_no: party.party_no,
                    party_name: party.party_name.clone(),
                    actual_votes,
                    placebo_mean_votes,
                    delta_votes: actual_votes as f64 - placebo_mean_votes,
                    lift_vs_placebo: safe_div(actual_votes as f64, placebo_mean_votes),
                    p_value,
                    one_in_odds: if p_value > 0.0 { Some(1.0 / p_value) } else { None },
                    significance: Significance::from_p_value(p_value),
                });
            }
            parties.sort_by(|a, b| b.delta_votes.total_cmp(&a.delta_votes));
        }

        PermutationResult {
            iterations_requested: self.settings.iterations,
            iterations_completed: completed,
            seed: self.settings.seed,
            aborted,
            partitioned,
            area_count: self.base.area_count(),
            actual_total: self.base.actual_total,
            histogram: Histogram::from_values(&values, DEFAULT_HISTOGRAM_BINS),
            distribution: collector.distribution,
            summary,
            parties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatasetBuilder;
    use crate::config::AnalysisConfig;
    use crate::matcher::tests::{two_area_config, two_area_dataset};
    use crate::stats::tests::TopOfRange;

    /// One area, two candidates: #1 runs for the major party X, #2 for Y
    /// which is not major. The small party S carries number 1.
    fn single_area() -> (Dataset, Eligibility) {
        let mut b = DatasetBuilder::new()
            .party("X", 9, "X")
            .unwrap()
            .party("Y", 30, "Y")
            .unwrap()
            .party("S", 1, "S")
            .unwrap();
        b.area("A", "P", "A").unwrap();
        b.party_list_result("A", "X", 5_000).unwrap();
        b.party_list_result("A", "Y", 4_000).unwrap();
        b.party_list_result("A", "S", 100).unwrap();
        b.constituency_result("A", "X", 6_000).unwrap();
        b.constituency_result("A", "Y", 3_000).unwrap();
        b.candidate("A", 1, "cx", "X").unwrap();
        b.candidate("A", 2, "cy", "Y").unwrap();
        let ds = b.build();
        let cfg = AnalysisConfig {
            exclude_top: 2,
            ..AnalysisConfig::default()
        };
        let el = Eligibility::from_config(&ds, &cfg);
        (ds, el)
    }

    #[test]
    fn identity_round_reproduces_actual() {
        let (ds, el) = single_area();
        let base = PermutationBase::build(&ds, &el);
        assert_eq!(base.actual_total(), 100);
        // Seed 100000 draws about 0.78 first: the two-candidate swap is a no-op.
        let res = PermutationEngine::new(base.clone(), 1, 100_000).run();
        assert_eq!(res.distribution, vec![100]);
        let summary = res.summary.unwrap();
        assert_eq!(summary.p_value, 1.0);
        assert_eq!(summary.percentile, 1.0);
        assert_eq!(summary.z_score, 0.0);

        let res = PermutationEngine::new(base, 3, 1).run_with(&mut TopOfRange);
        assert_eq!(res.distribution, vec![100, 100, 100]);
        assert_eq!(res.parties[0].party_code, "X");
        assert_eq!(res.parties[0].p_value, 1.0);
        assert_eq!(res.parties[0].one_in_odds, Some(1.0));
    }

    #[test]
    fn deterministic_for_a_seed() {
        let (ds, el) = single_area();
        let base = PermutationBase::build(&ds, &el);
        let engine = PermutationEngine::new(base, 200, 69);
        let a = engine.run();
        let b = engine.run();
        assert_eq!(a, b);
        assert_eq!(a.iterations_completed, 200);
        // every round gives either 0 or 100
        assert!(a.distribution.iter().all(|v| *v == 0 || *v == 100));
        let s = a.summary.unwrap();
        assert_eq!(s.percentile, 1.0);
        assert!(s.p_value > 0.2 && s.p_value < 0.8);
        assert!(s.normal_low < s.mean && s.mean < s.normal_high);
        assert_eq!(a.histogram.counts.iter().sum::<u64>(), 200);
    }

    #[test]
    fn no_data_conditions() {
        let (ds, el) = single_area();
        let base = PermutationBase::build(&ds, &el);
        let res = PermutationEngine::new(base, 0, 69).run();
        assert!(res.is_no_data());
        assert!(res.distribution.is_empty());
        assert!(res.parties.is_empty());

        let empty = PermutationBase::build(&Dataset::default(), &Eligibility::default());
        let res = PermutationEngine::new(empty, 1000, 69).run();
        assert!(res.is_no_data());
        assert_eq!(res.area_count, 0);
    }

    #[test]
    fn out_of_range_settings_are_clamped() {
        let s = PermutationSettings::new(1_000_000, 0);
        assert_eq!(s.iterations, 5000);
        assert_eq!(s.seed, 1);
        assert_eq!(PermutationSettings::new(-5, i64::MAX).seed, 2_147_483_646);
        assert_eq!(PermutationSettings::new(-5, 3).iterations, 0);
    }

    #[test]
    fn abort_stops_early() {
        let (ds, el) = single_area();
        let engine = PermutationEngine::new(PermutationBase::build(&ds, &el), 50, 69);
        let mut rng = LehmerRng::new(69);
        let res = engine.run_with_abort(&mut rng, |done| done < 3);
        assert!(res.aborted);
        assert_eq!(res.iterations_completed, 3);
        assert_eq!(res.iterations_requested, 50);
        let res = engine.run_with_abort(&mut rng, |_| false);
        assert!(res.is_no_data());
    }

    #[test]
    fn partitioned_runs_agree() {
        let seeds = PermutationEngine::sub_seeds(69, 10);
        assert_eq!(seeds.len(), 10);
        assert!(seeds.iter().all(|s| *s >= 1 && *s <= 2_147_483_646));
        assert_eq!(seeds[0], 69 * 16_807);

        let (ds, el) = single_area();
        let engine = PermutationEngine::new(PermutationBase::build(&ds, &el), 100, 69);
        let a = engine.run_partitioned();
        let b = engine.run_partitioned();
        assert!(a.partitioned);
        assert_eq!(a.distribution, b.distribution);
        assert_eq!(a.iterations_completed, 100);
    }

    #[test]
    fn partitioned_rounds_are_independent() {
        let (ds, el) = single_area();
        let base = PermutationBase::build(&ds, &el);
        let seeds = PermutationEngine::sub_seeds(69, 40);
        // one round at a time, last seed first
        let mut expected: Vec<u64> = seeds
            .iter()
            .rev()
            .map(|s| PermutationEngine::new(base.clone(), 1, *s).run().distribution[0])
            .collect();
        expected.reverse();
        assert!(expected.contains(&0) && expected.contains(&100));
        let res = PermutationEngine::new(base, 40, 69).run_partitioned();
        assert_eq!(res.distribution, expected);
        assert_eq!(res.seed, 69);
    }

    #[test]
    fn two_area_base() {
        let ds = two_area_dataset();
        let el = Eligibility::from_config(&ds, &two_area_config());
        let base = PermutationBase::build(&ds, &el);
        // A2 has no candidate #7
        assert_eq!(base.area_codes(), vec!["A1"]);
        assert_eq!(base.actual_total(), 500);
    }
}
