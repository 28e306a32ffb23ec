//! Interpretation of VetStat responses.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::request::AntibioticsQuery;
use crate::soap::ns;
use crate::xml::{self, Document};

/// One `eks:Data` element flattened to local name -> text
pub type Record = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Malformed response body: {0}")]
    Xml(#[from] xml::Error),
}

/// What a query returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// `200`: the records found, possibly none, and the response as received
    Records { records: Vec<Record>, raw: String },
    /// `500`: the service has nothing for this query
    NoData,
    /// Any other status
    Unexpected { status: u16, body: String },
}

impl QueryOutcome {
    pub fn records(&self) -> &[Record] {
        match self {
            QueryOutcome::Records { records, .. } => records,
            _ => &[],
        }
    }

    /// Response body of a `200` or unexpected answer
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            QueryOutcome::Records { raw, .. } => Some(raw),
            QueryOutcome::Unexpected { body, .. } => Some(body),
            QueryOutcome::NoData => None,
        }
    }
}

pub fn interpret(
    status: u16,
    body: &str,
    query: &AntibioticsQuery,
) -> Result<QueryOutcome, ResponseError> {
    match status {
        200 => {
            let records = extract_records(body, query)?;
            if records.is_empty() {
                warn!(%query, "No antibiotic usage data in response");
            } else {
                info!(%query, records = records.len(), "Parsed antibiotic usage records");
            }
            Ok(QueryOutcome::Records {
                records,
                raw: body.to_string(),
            })
        }
        // The service answers 500 when it holds no data for the query
        500 => {
            info!(%query, "No data available");
            Ok(QueryOutcome::NoData)
        }
        _ => {
            error!(%query, status, "Unexpected response from VetStat");
            Ok(QueryOutcome::Unexpected {
                status,
                body: body.to_string(),
            })
        }
    }
}

fn extract_records(body: &str, query: &AntibioticsQuery) -> Result<Vec<Record>, ResponseError> {
    let doc = Document::parse(body).map_err(|e| {
        error!(%query, "Failed to parse response: {e}");
        e
    })?;

    let mut records = Vec::new();
    for data in doc
        .descendants(doc.root())
        .filter(|node| doc.matches(*node, ns::EKS, "Data"))
    {
        let mut record = Record::new();
        for child in doc.children(data).iter().copied() {
            let Some(name) = doc.local_name(child) else {
                continue;
            };
            let text = doc.text(child);
            let text = text.trim();
            if !text.is_empty() {
                record.insert(name.to_string(), text.to_string());
            }
        }

        record
            .entry("CHRNummer".to_string())
            .or_insert_with(|| query.chr_number.to_string());
        record
            .entry("DyreArtKode".to_string())
            .or_insert_with(|| query.species_code.to_string());

        if !record.is_empty() {
            records.push(record);
        }
    }
    Ok(records)
}
