use diesel::prelude::*;

use super::schema::candidates;
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{
    format_timestamp, parse_optional_timestamp, parse_timestamp, Candidate, CandidateId,
};

/// One row of the `candidates` table; timestamps are canonical strings.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = candidates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CandidateRow {
    pub id: String,
    pub name: String,
    pub candidate_type: String,
    pub author: String,
    pub date_added: String,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    pub magnitude: Option<f64>,
    pub num_exposures: Option<i32>,
    pub exposure_time: Option<f64>,
    pub rmse_ra: Option<f64>,
    pub rmse_dec: Option<f64>,
    pub approach_color: Option<String>,
    pub d_ra: Option<f64>,
    pub d_dec: Option<f64>,
    pub updated: Option<String>,
    pub transit_time: Option<String>,
    pub start_observability: Option<String>,
    pub end_observability: Option<String>,
    pub score: Option<f64>,
    pub n_obs: Option<i32>,
    pub notes: Option<String>,
    pub rejected_reason: Option<String>,
    pub removed_reason: Option<String>,
    pub removed_dt: Option<String>,
    pub date_last_edited: Option<String>,
}

impl From<&Candidate> for CandidateRow {
    fn from(c: &Candidate) -> Self {
        let ts = |t: &Option<chrono::DateTime<chrono::Utc>>| t.as_ref().map(format_timestamp);
        Self {
            id: c.id.as_str().to_string(),
            name: c.name.clone(),
            candidate_type: c.candidate_type.clone(),
            author: c.author.clone(),
            date_added: format_timestamp(&c.date_added),
            ra: c.ra,
            dec: c.dec,
            magnitude: c.magnitude,
            num_exposures: c.num_exposures,
            exposure_time: c.exposure_time,
            rmse_ra: c.rmse_ra,
            rmse_dec: c.rmse_dec,
            approach_color: c.approach_color.map(|color| color.as_str().to_string()),
            d_ra: c.d_ra,
            d_dec: c.d_dec,
            updated: ts(&c.updated),
            transit_time: ts(&c.transit_time),
            start_observability: ts(&c.start_observability),
            end_observability: ts(&c.end_observability),
            score: c.score,
            n_obs: c.n_obs,
            notes: c.notes.clone(),
            rejected_reason: c.rejected_reason.map(|r| r.as_str().to_string()),
            removed_reason: c.removed_reason.clone(),
            removed_dt: ts(&c.removed_dt),
            date_last_edited: ts(&c.date_last_edited),
        }
    }
}

impl TryFrom<CandidateRow> for Candidate {
    type Error = RepositoryError;

    fn try_from(row: CandidateRow) -> RepositoryResult<Self> {
        let context = |e: RepositoryError| e.with_operation("decode_row").with_entity_id(&row.id);
        let ts = |raw: &Option<String>| parse_optional_timestamp(raw.as_deref());

        Ok(Candidate {
            date_added: parse_timestamp(&row.date_added)
                .map_err(|e| context(e.into()))?,
            approach_color: row
                .approach_color
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|e: String| context(RepositoryError::parse(e)))?,
            rejected_reason: row
                .rejected_reason
                .as_deref()
                .map(str::parse)
                .transpose()
                .map_err(|e: String| context(RepositoryError::parse(e)))?,
            updated: ts(&row.updated).map_err(|e| context(e.into()))?,
            transit_time: ts(&row.transit_time).map_err(|e| context(e.into()))?,
            start_observability: ts(&row.start_observability).map_err(|e| context(e.into()))?,
            end_observability: ts(&row.end_observability).map_err(|e| context(e.into()))?,
            removed_dt: ts(&row.removed_dt).map_err(|e| context(e.into()))?,
            date_last_edited: ts(&row.date_last_edited).map_err(|e| context(e.into()))?,
            id: CandidateId::from_raw(row.id.clone()),
            name: row.name,
            candidate_type: row.candidate_type,
            author: row.author,
            ra: row.ra,
            dec: row.dec,
            magnitude: row.magnitude,
            num_exposures: row.num_exposures,
            exposure_time: row.exposure_time,
            rmse_ra: row.rmse_ra,
            rmse_dec: row.rmse_dec,
            d_ra: row.d_ra,
            d_dec: row.d_dec,
            score: row.score,
            n_obs: row.n_obs,
            notes: row.notes,
            removed_reason: row.removed_reason,
        })
    }
}
