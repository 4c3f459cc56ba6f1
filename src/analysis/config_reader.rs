use crate::analysis::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

// ********* Dataset file ***********

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct VoteTotalsJs {
    #[serde(rename = "totalVotes")]
    pub total_votes: Option<JSValue>,
    #[serde(rename = "goodVotes")]
    pub good_votes: Option<JSValue>,
    #[serde(rename = "badVotes")]
    pub bad_votes: Option<JSValue>,
    #[serde(rename = "noVotes")]
    pub no_votes: Option<JSValue>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyResultJs {
    #[serde(rename = "partyCode")]
    pub party_code: Option<String>,
    #[serde(rename = "partyNo")]
    pub party_no: Option<JSValue>,
    #[serde(rename = "partyName")]
    pub party_name: Option<String>,
    #[serde(rename = "voteTotal")]
    pub vote_total: Option<JSValue>,
    #[serde(rename = "votePercent")]
    pub vote_percent: Option<f64>,
    pub rank: Option<JSValue>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CandidateJs {
    #[serde(rename = "candidateNo")]
    pub candidate_no: Option<JSValue>,
    #[serde(rename = "candidateName")]
    pub candidate_name: Option<String>,
    #[serde(rename = "candidatePartyCode")]
    pub candidate_party_code: Option<String>,
    #[serde(rename = "candidatePartyNo")]
    pub candidate_party_no: Option<JSValue>,
    #[serde(rename = "candidatePartyName")]
    pub candidate_party_name: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AreaJs {
    #[serde(rename = "areaCode")]
    pub area_code: Option<String>,
    #[serde(rename = "provinceName")]
    pub province_name: Option<String>,
    #[serde(rename = "areaName")]
    pub area_name: Option<String>,
    pub totals: Option<VoteTotalsJs>,
    #[serde(rename = "constituencyTotals")]
    pub constituency_totals: Option<VoteTotalsJs>,
    #[serde(rename = "partyResults")]
    pub party_results: Option<Vec<PartyResultJs>>,
    #[serde(rename = "constituencyPartyResults")]
    pub constituency_party_results: Option<Vec<PartyResultJs>>,
    pub candidates: Option<Vec<CandidateJs>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyJs {
    #[serde(rename = "partyCode")]
    pub party_code: Option<String>,
    #[serde(rename = "partyNo")]
    pub party_no: Option<JSValue>,
    #[serde(rename = "partyName")]
    pub party_name: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DimensionsJs {
    pub parties: Option<Vec<PartyJs>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PartyTotalJs {
    #[serde(rename = "partyCode")]
    pub party_code: Option<String>,
    #[serde(rename = "partyNo")]
    pub party_no: Option<JSValue>,
    #[serde(rename = "partyName")]
    pub party_name: Option<String>,
    #[serde(rename = "voteTotal")]
    pub vote_total: Option<JSValue>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OverviewJs {
    pub party_totals: Option<Vec<PartyTotalJs>>,
    pub constituency_party_totals: Option<Vec<PartyTotalJs>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub areas: Option<Vec<AreaJs>>,
    pub dimensions: Option<DimensionsJs>,
    pub overview: Option<OverviewJs>,
    #[serde(rename = "analysisEvidence")]
    pub analysis_evidence: Option<JSValue>,
}

/// A dataset as read from disk.
#[derive(PartialEq, Debug, Clone)]
pub struct DatasetInput {
    pub dataset: Dataset,
    /// Results of an external batch job, carried along without interpretation.
    pub external_evidence: Option<JSValue>,
}

// ********* Analysis configuration file ***********

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisConfigFile {
    #[serde(rename = "rangeMin")]
    pub range_min: Option<u32>,
    #[serde(rename = "rangeMax")]
    pub range_max: Option<u32>,
    #[serde(rename = "excludeTop")]
    pub exclude_top: Option<usize>,
    #[serde(rename = "majorPartyNos")]
    pub major_party_nos: Option<Vec<u32>>,
    pub iterations: Option<i64>,
    pub seed: Option<i64>,
    #[serde(rename = "hotspotTopN")]
    pub hotspot_top_n: Option<usize>,
    #[serde(rename = "badVoteTopN")]
    pub bad_vote_top_n: Option<usize>,
    #[serde(rename = "badVoteType")]
    pub bad_vote_type: Option<String>,
    #[serde(rename = "outlierPercentiles")]
    pub outlier_percentiles: Option<Vec<f64>>,
    pub province: Option<String>,
    #[serde(rename = "smallPartyCode")]
    pub small_party_code: Option<String>,
    #[serde(rename = "restrictToMajorSources")]
    pub restrict_to_major_sources: Option<bool>,
}

// ********* Readers ***********

fn read_json_file(path: &str) -> RunResult<String> {
    info!("Attempting to read file {:?}", path);
    fs::read_to_string(path).context(OpeningJsonSnafu { path })
}

pub fn read_summary(path: &str) -> RunResult<JSValue> {
    let contents = read_json_file(path)?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

pub fn read_config(path: &str) -> RunResult<AnalysisConfigFile> {
    let contents = read_json_file(path)?;
    let config: AnalysisConfigFile = serde_json::from_str(&contents).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_dataset(path: &str) -> RunResult<DatasetInput> {
    let contents = read_json_file(path)?;
    parse_dataset(&contents)
}

pub fn parse_dataset(contents: &str) -> RunResult<DatasetInput> {
    let file: DatasetFile = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    let areas: Vec<Area> = file
        .areas
        .unwrap_or_default()
        .iter()
        .map(area_from_js)
        .collect::<RunResult<Vec<Area>>>()?;

    let overview = file.overview.unwrap_or(OverviewJs {
        party_totals: None,
        constituency_party_totals: None,
    });
    let party_totals = match overview.party_totals {
        Some(l) => totals_from_js(&l)?,
        None => {
            info!("read_dataset: no party totals, summing the area results");
            summed_totals(&areas, |a| &a.party_results)
        }
    };
    let constituency_party_totals = match overview.constituency_party_totals {
        Some(l) => totals_from_js(&l)?,
        None => {
            info!("read_dataset: no constituency totals, summing the area results");
            summed_totals(&areas, |a| &a.constituency_party_results)
        }
    };

    let parties: Vec<Party> = match file.dimensions.and_then(|d| d.parties) {
        Some(l) => l
            .iter()
            .map(|p| {
                Ok(Party {
                    party_code: p.party_code.clone().unwrap_or_default(),
                    party_no: read_js_u32(&p.party_no, "partyNo")?,
                    party_name: p.party_name.clone().unwrap_or_default(),
                })
            })
            .collect::<RunResult<Vec<Party>>>()?,
        None => party_totals
            .iter()
            .map(|t| Party {
                party_code: t.party_code.clone(),
                party_no: t.party_no,
                party_name: t.party_name.clone(),
            })
            .collect(),
    };

    info!(
        "read_dataset: {} areas, {} parties, {} party totals",
        areas.len(),
        parties.len(),
        party_totals.len()
    );
    Ok(DatasetInput {
        dataset: Dataset {
            parties,
            party_totals,
            constituency_party_totals,
            areas,
        },
        external_evidence: file.analysis_evidence,
    })
}

fn area_from_js(a: &AreaJs) -> RunResult<Area> {
    let results = |l: &Option<Vec<PartyResultJs>>| -> RunResult<Vec<PartyResult>> {
        l.as_deref()
            .unwrap_or_default()
            .iter()
            .map(result_from_js)
            .collect()
    };
    let candidates = a
        .candidates
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|c| {
            Ok(Candidate {
                candidate_no: read_js_u32(&c.candidate_no, "candidateNo")?,
                candidate_name: c.candidate_name.clone().unwrap_or_default(),
                candidate_party_code: c.candidate_party_code.clone().unwrap_or_default(),
                candidate_party_no: read_js_u32(&c.candidate_party_no, "candidatePartyNo")?,
                candidate_party_name: c.candidate_party_name.clone().unwrap_or_default(),
            })
        })
        .collect::<RunResult<Vec<Candidate>>>()?;
    Ok(Area {
        area_code: a.area_code.clone().unwrap_or_default(),
        province_name: a.province_name.clone().unwrap_or_default(),
        area_name: a.area_name.clone().unwrap_or_default(),
        totals: totals_of(&a.totals)?,
        constituency_totals: totals_of(&a.constituency_totals)?,
        party_results: results(&a.party_results)?,
        constituency_party_results: results(&a.constituency_party_results)?,
        candidates,
    })
}

fn totals_of(t: &Option<VoteTotalsJs>) -> RunResult<VoteTotals> {
    match t {
        None => Ok(VoteTotals::default()),
        Some(t) => Ok(VoteTotals {
            total_votes: read_js_u64(&t.total_votes, "totalVotes")?,
            good_votes: read_js_u64(&t.good_votes, "goodVotes")?,
            bad_votes: read_js_u64(&t.bad_votes, "badVotes")?,
            no_votes: read_js_u64(&t.no_votes, "noVotes")?,
        }),
    }
}

fn result_from_js(r: &PartyResultJs) -> RunResult<PartyResult> {
    let rank = match &r.rank {
        None | Some(JSValue::Null) => None,
        x => Some(read_js_u32(x, "rank")?),
    };
    Ok(PartyResult {
        party_code: r.party_code.clone().unwrap_or_default(),
        party_no: read_js_u32(&r.party_no, "partyNo")?,
        party_name: r.party_name.clone().unwrap_or_default(),
        vote_total: read_js_u64(&r.vote_total, "voteTotal")?,
        vote_percent: r.vote_percent.unwrap_or(0.0),
        rank,
    })
}

fn totals_from_js(l: &[PartyTotalJs]) -> RunResult<Vec<PartyTotal>> {
    l.iter()
        .map(|t| {
            Ok(PartyTotal {
                party_code: t.party_code.clone().unwrap_or_default(),
                party_no: read_js_u32(&t.party_no, "partyNo")?,
                party_name: t.party_name.clone().unwrap_or_default(),
                vote_total: read_js_u64(&t.vote_total, "voteTotal")?,
            })
        })
        .collect()
}

/// National totals from the area results, in order of first appearance.
fn summed_totals<F>(areas: &[Area], results: F) -> Vec<PartyTotal>
where
    F: Fn(&Area) -> &Vec<PartyResult>,
{
    let mut res: Vec<PartyTotal> = Vec::new();
    for r in areas.iter().flat_map(|a| results(a).iter()) {
        match res.iter_mut().find(|t| t.party_code == r.party_code) {
            Some(t) => t.vote_total += r.vote_total,
            None => res.push(PartyTotal {
                party_code: r.party_code.clone(),
                party_no: r.party_no,
                party_name: r.party_name.clone(),
                vote_total: r.vote_total,
            }),
        }
    }
    res
}

/// Missing and null values read as 0. Numbers may also be written as strings.
fn read_js_u64(x: &Option<JSValue>, field: &str) -> RunResult<u64> {
    match x {
        None | Some(JSValue::Null) => Ok(0),
        Some(JSValue::Number(n)) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| *f >= 0.0 && f.fract() == 0.0)
                    .map(|f| f as u64)
            })
            .context(ParsingJsonNumberSnafu {
                field,
                found: n.to_string(),
            }),
        Some(JSValue::String(s)) => s.trim().parse::<u64>().ok().context(ParsingJsonNumberSnafu {
            field,
            found: s.clone(),
        }),
        Some(other) => ParsingJsonNumberSnafu {
            field,
            found: other.to_string(),
        }
        .fail(),
    }
}

fn read_js_u32(x: &Option<JSValue>, field: &str) -> RunResult<u32> {
    let v = read_js_u64(x, field)?;
    u32::try_from(v).ok().context(ParsingJsonNumberSnafu {
        field,
        found: v.to_string(),
    })
}

fn parse_ballot_type(s: &str) -> RunResult<BallotType> {
    match s.to_lowercase().replace('_', "").as_str() {
        "constituency" => Ok(BallotType::Constituency),
        "partylist" => Ok(BallotType::PartyList),
        x => whatever!("Unknown ballot type {:?}: expected constituency or partylist", x),
    }
}

/// Library defaults, then the configuration file, then the command line.
pub fn build_config(file: &Option<AnalysisConfigFile>, args: &Args) -> RunResult<(AnalysisConfig, MatchFilter)> {
    let default_file = AnalysisConfigFile::default();
    let file = file.as_ref().unwrap_or(&default_file);
    let defaults = AnalysisConfig::default();
    let top_n = args.top_n;

    let bad_vote_type = match args.bad_vote_type.as_ref().or(file.bad_vote_type.as_ref()) {
        Some(s) => parse_ballot_type(s)?,
        None => defaults.bad_vote_type,
    };

    let config = AnalysisConfig {
        range_min: args.range_min.or(file.range_min).unwrap_or(defaults.range_min),
        range_max: args.range_max.or(file.range_max).unwrap_or(defaults.range_max),
        exclude_top: args.exclude_top.or(file.exclude_top).unwrap_or(defaults.exclude_top),
        major_party_nos: match &file.major_party_nos {
            Some(l) => l.iter().copied().collect(),
            None => defaults.major_party_nos.clone(),
        },
        iterations: args.iterations.or(file.iterations).unwrap_or(defaults.iterations),
        seed: args.seed.or(file.seed).unwrap_or(defaults.seed),
        hotspot_top_n: top_n.or(file.hotspot_top_n).unwrap_or(defaults.hotspot_top_n),
        bad_vote_top_n: top_n.or(file.bad_vote_top_n).unwrap_or(defaults.bad_vote_top_n),
        bad_vote_type,
        outlier_percentiles: file
            .outlier_percentiles
            .clone()
            .unwrap_or_else(|| defaults.outlier_percentiles.clone()),
    };
    let filter = MatchFilter {
        province: args.province.clone().or_else(|| file.province.clone()),
        small_party_code: args
            .small_party
            .clone()
            .or_else(|| file.small_party_code.clone()),
        restrict_to_major_sources: !args.all_sources
            && file.restrict_to_major_sources.unwrap_or(true),
    };
    Ok((config, filter))
}
