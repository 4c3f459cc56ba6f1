use clap::Parser;

/// Detects proxy votes in a two-ballot election: small parties whose list number
/// coincides with the number of a constituency candidate.
#[derive(Parser, Debug, Clone, Default)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The normalized election dataset in JSON format, with `areas`,
    /// `dimensions.parties`, `overview.party_totals` and `overview.constituency_party_totals`.
    #[clap(short, long, value_parser)]
    pub data: String,

    /// (file path, optional) An analysis configuration in JSON format. Every field is optional.
    /// The options below override the values of this file.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the JSON summary of the analysis.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, proxyvote will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (default 1) Smallest party-list number of a small party.
    #[clap(long, value_parser)]
    pub range_min: Option<u32>,

    /// (default 10) Largest party-list number of a small party.
    #[clap(long, value_parser)]
    pub range_max: Option<u32>,

    /// (default 6) Number of parties with the most party-list votes that are never small.
    #[clap(long, value_parser)]
    pub exclude_top: Option<usize>,

    /// (default 1000, at most 5000) Rounds of the placebo test.
    #[clap(long, value_parser)]
    pub iterations: Option<i64>,

    /// (default 69) Seed of the placebo test.
    #[clap(long, value_parser)]
    pub seed: Option<i64>,

    /// (optional) Only match areas of this province.
    #[clap(long, value_parser)]
    pub province: Option<String>,

    /// (optional) Only match this small party (party code).
    #[clap(long, value_parser)]
    pub small_party: Option<String>,

    /// (default 30) Number of areas in the hotspot and bad-ballot rankings.
    #[clap(long, value_parser)]
    pub top_n: Option<usize>,

    /// (constituency or partylist, default constituency) The ballot of the bad-ballot ranking.
    #[clap(long, value_parser)]
    pub bad_vote_type: Option<String>,

    /// If passed as an argument, small parties are also matched with candidates
    /// of parties outside the major source parties.
    #[clap(long, takes_value = false)]
    pub all_sources: bool,

    /// If passed as an argument, inconsistencies in the dataset (duplicate candidate
    /// numbers, duplicate areas) stop the analysis instead of being logged.
    #[clap(long, takes_value = false)]
    pub strict: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
