pub use crate::config::*;

use crate::stats::safe_div;

/// Assembles a `Dataset` from individual results.
///
/// Ranks, vote percents, missing ballot totals and the national party totals
/// are derived when calling `build`.
///
/// ```
/// use proxy_votes::builder::DatasetBuilder;
/// # use proxy_votes::AnalysisErrors;
///
/// let mut builder = DatasetBuilder::new()
///     .party("X", 9, "Party X")?
///     .party("S", 7, "Small")?;
///
/// builder.area("A1", "North", "North 1")?;
/// builder.party_list_result("A1", "S", 500)?;
/// builder.constituency_result("A1", "X", 10_000)?;
/// builder.candidate("A1", 7, "Someone", "X")?;
///
/// let dataset = builder.build();
/// assert_eq!(dataset.areas[0].constituency_winner().unwrap().party_code, "X");
/// # Ok::<(), AnalysisErrors>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    pub(crate) _parties: Vec<Party>,
    pub(crate) _areas: Vec<AreaDraft>,
}

#[derive(Debug, Clone)]
pub(crate) struct AreaDraft {
    area: Area,
    totals: Option<VoteTotals>,
    constituency_totals: Option<VoteTotals>,
}

impl DatasetBuilder {
    pub fn new() -> DatasetBuilder {
        DatasetBuilder::default()
    }

    /// Registers a party. Codes must be unique.
    pub fn party(mut self, code: &str, no: u32, name: &str) -> Result<DatasetBuilder, AnalysisErrors> {
        if self._parties.iter().any(|p| p.party_code == code) {
            return Err(AnalysisErrors::DuplicateParty(code.to_string()));
        }
        self._parties.push(Party {
            party_code: code.to_string(),
            party_no: no,
            party_name: name.to_string(),
        });
        Ok(self)
    }

    pub fn area(&mut self, code: &str, province: &str, name: &str) -> Result<(), AnalysisErrors> {
        if self._areas.iter().any(|d| d.area.area_code == code) {
            return Err(AnalysisErrors::DuplicateAreaCode(code.to_string()));
        }
        self._areas.push(AreaDraft {
            area: Area {
                area_code: code.to_string(),
                province_name: province.to_string(),
                area_name: name.to_string(),
                ..Area::default()
            },
            totals: None,
            constituency_totals: None,
        });
        Ok(())
    }

    fn lookup(&mut self, area_code: &str, party_code: &str) -> Result<(&mut AreaDraft, Party), AnalysisErrors> {
        let party = self
            ._parties
            .iter()
            .find(|p| p.party_code == party_code)
            .cloned()
            .ok_or_else(|| AnalysisErrors::UnknownParty(party_code.to_string()))?;
        let draft = self
            ._areas
            .iter_mut()
            .find(|d| d.area.area_code == area_code)
            .ok_or_else(|| AnalysisErrors::UnknownArea(area_code.to_string()))?;
        Ok((draft, party))
    }

    pub fn party_list_result(&mut self, area_code: &str, party_code: &str, votes: u64) -> Result<(), AnalysisErrors> {
        let (draft, party) = self.lookup(area_code, party_code)?;
        draft.area.party_results.push(result_line(&party, votes));
        Ok(())
    }

    pub fn constituency_result(&mut self, area_code: &str, party_code: &str, votes: u64) -> Result<(), AnalysisErrors> {
        let (draft, party) = self.lookup(area_code, party_code)?;
        draft.area.constituency_party_results.push(result_line(&party, votes));
        Ok(())
    }

    /// Adds a constituency candidate running for `party_code`.
    pub fn candidate(&mut self, area_code: &str, no: u32, name: &str, party_code: &str) -> Result<(), AnalysisErrors> {
        let (draft, party) = self.lookup(area_code, party_code)?;
        draft.area.candidates.push(Candidate {
            candidate_no: no,
            candidate_name: name.to_string(),
            candidate_party_code: party.party_code,
            candidate_party_no: party.party_no,
            candidate_party_name: party.party_name,
        });
        Ok(())
    }

    /// Sets the ballot counts of an area. Without it, the total and good votes
    /// are the sum of the results and there are no bad or blank ballots.
    pub fn totals(&mut self, area_code: &str, ballot: BallotType, totals: VoteTotals) -> Result<(), AnalysisErrors> {
        let draft = self
            ._areas
            .iter_mut()
            .find(|d| d.area.area_code == area_code)
            .ok_or_else(|| AnalysisErrors::UnknownArea(area_code.to_string()))?;
        match ballot {
            BallotType::Constituency => draft.constituency_totals = Some(totals),
            BallotType::PartyList => draft.totals = Some(totals),
        }
        Ok(())
    }

    pub fn build(self) -> Dataset {
        let areas: Vec<Area> = self
            ._areas
            .into_iter()
            .map(|d| {
                let mut area = d.area;
                area.totals = d.totals.unwrap_or_else(|| summed_totals(&area.party_results));
                area.constituency_totals = d
                    .constituency_totals
                    .unwrap_or_else(|| summed_totals(&area.constituency_party_results));
                rank_results(&mut area.party_results);
                rank_results(&mut area.constituency_party_results);
                area
            })
            .collect();
        let party_totals = national_totals(&self._parties, &areas, |a| &a.party_results);
        let constituency_party_totals =
            national_totals(&self._parties, &areas, |a| &a.constituency_party_results);
        Dataset {
            parties: self._parties,
            party_totals,
            constituency_party_totals,
            areas,
        }
    }
}

fn result_line(party: &Party, votes: u64) -> PartyResult {
    PartyResult {
        party_code: party.party_code.clone(),
        party_no: party.party_no,
        party_name: party.party_name.clone(),
        vote_total: votes,
        vote_percent: 0.0,
        rank: None,
    }
}

fn summed_totals(results: &[PartyResult]) -> VoteTotals {
    let sum: u64 = results.iter().map(|r| r.vote_total).sum();
    VoteTotals {
        total_votes: sum,
        good_votes: sum,
        bad_votes: 0,
        no_votes: 0,
    }
}

fn rank_results(results: &mut [PartyResult]) {
    let sum: u64 = results.iter().map(|r| r.vote_total).sum();
    results.sort_by(|a, b| b.vote_total.cmp(&a.vote_total));
    for (i, r) in results.iter_mut().enumerate() {
        r.rank = Some(i as u32 + 1);
        r.vote_percent = 100.0 * safe_div(r.vote_total as f64, sum as f64);
    }
}

fn national_totals<F>(parties: &[Party], areas: &[Area], results: F) -> Vec<PartyTotal>
where
    F: Fn(&Area) -> &Vec<PartyResult>,
{
    parties
        .iter()
        .map(|p| PartyTotal {
            party_code: p.party_code.clone(),
            party_no: p.party_no,
            party_name: p.party_name.clone(),
            vote_total: areas
                .iter()
                .flat_map(|a| results(a).iter())
                .filter(|r| r.party_code == p.party_code)
                .map(|r| r.vote_total)
                .sum(),
        })
        .collect()
}
