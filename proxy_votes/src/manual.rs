/*!

This is the long-form manual for `proxy_votes` and `proxyvote`.

## What is measured

In a two-ballot election every voter receives a constituency ballot (candidates,
each with a number) and a party-list ballot (parties, each with a number). The
numbers are drawn independently, so in a given area candidate #7 and party #7
usually have nothing to do with each other.

If voters copy the number of their constituency candidate onto the party-list
ballot, the small party that happens to carry that number picks up votes that
were meant for the candidate's party. These are the *proxy votes*, and the
candidate's party is their *source party*.

## Pipeline

1. `eligibility`: the small parties are the parties whose party-list number is
   in `[range_min, range_max]`, once the `exclude_top` parties with the most
   national party-list votes are removed. The major source parties are given
   by number and resolved to party codes.
2. `matcher`: in each area, every small party is matched with the candidate
   carrying the same number. The match records the source party, its
   constituency votes in the area and whether it won the area.
3. `aggregate`: matched rows are grouped by source party (optionally by
   province or by won / lost area). The normalized ratio divides the proxy
   votes by the source party's constituency votes, each area counted once.
4. `permutation`: the placebo test. Each round shuffles, in every area, which
   party each candidate number belongs to, and counts the proxy votes that
   would have landed on a major source party. The p-value is the share of
   rounds reaching the real total.
5. `hotspot`: area rankings by small-party vote share and by bad-ballot rate,
   winner concentration among the top areas, and the province residual
   comparison.

## Example

```
use proxy_votes::builder::DatasetBuilder;
use proxy_votes::matcher::MatchFilter;
use proxy_votes::{run_analysis, AnalysisConfig, AnalysisErrors};

let mut b = DatasetBuilder::new()
    .party("X", 9, "Party X")?
    .party("Y", 27, "Party Y")?
    .party("S", 7, "Small")?;
b.area("A1", "North", "North 1")?;
b.party_list_result("A1", "X", 9_000)?;
b.party_list_result("A1", "Y", 7_000)?;
b.party_list_result("A1", "S", 500)?;
b.constituency_result("A1", "X", 10_000)?;
b.constituency_result("A1", "Y", 8_000)?;
b.candidate("A1", 7, "Someone", "X")?;
let dataset = b.build();

let config = AnalysisConfig {
    exclude_top: 2,
    iterations: 100,
    ..AnalysisConfig::default()
};
let report = run_analysis(&dataset, &config, &MatchFilter::default());
assert_eq!(report.by_source_party[0].proxy_votes, 500);
assert_eq!(report.permutation.iterations_completed, 100);
# Ok::<(), AnalysisErrors>(())
```

## Configuration

| field | default | notes |
|-------|---------|-------|
| `range_min`, `range_max` | 1, 10 | swapped when reversed |
| `exclude_top` | 6 | |
| `major_party_nos` | 9, 27, 37, 42, 46 | unknown numbers are skipped |
| `iterations` | 1000 | clamped into 0..=5000, 0 gives a "no data" placebo result |
| `seed` | 69 | clamped into 1..=2147483646 |
| `hotspot_top_n`, `bad_vote_top_n` | 30 | |
| `bad_vote_type` | constituency | |
| `outlier_percentiles` | 0.9, 0.95, 0.99 | |

`AnalysisConfig::signature` hashes the clamped configuration. Reports are pure
functions of the dataset and the configuration, so the signature can be used to
cache them.

## Reading the placebo test

The interval `mean +/- 1.96 std` reported with the null distribution is a normal
approximation meant as a visual aid. The empirical p-value and percentile are
the numbers to rely on. With `n` rounds, a p-value of 0 means "fewer than one in
`n`", not "impossible".

## Malformed input

Two candidates sharing a number in one area is not valid input. The matcher
keeps the first listed one and logs a warning. `Dataset::validate` reports
these cases, and `proxyvote --strict` refuses to run on them.

 */
