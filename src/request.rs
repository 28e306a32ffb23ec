use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Client id reported in `GLRCHRWSInfoInbound` unless configured otherwise
pub const DEFAULT_CLIENT_ID: &str = "LandbrugsData";

const SESSION_ID: &str = "1";

/// Antibiotics usage lookup for one herd owner, species and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AntibioticsQuery {
    /// CHR number of the property
    pub chr_number: u64,
    /// Species code (`DyreArtKode`)
    pub species_code: u32,
    pub period_from: NaiveDate,
    pub period_to: NaiveDate,
}

impl AntibioticsQuery {
    pub fn new(chr_number: u64, species_code: u32, period_from: NaiveDate, period_to: NaiveDate) -> Self {
        Self {
            chr_number,
            species_code,
            period_from,
            period_to,
        }
    }
}

impl fmt::Display for AntibioticsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CHR {} species {} ({}..{})",
            self.chr_number, self.species_code, self.period_from, self.period_to
        )
    }
}

/// Body payload of the `hentAntibiotikaforbrug` operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "eks:VetStat_CHRHentAntibiotikaForbrugRequest")]
pub struct AntibioticsRequest {
    #[serde(rename = "glr:GLRCHRWSInfoInbound")]
    info: InfoInbound,
    #[serde(rename = "eks:Request")]
    request: RequestParams,
}

impl AntibioticsRequest {
    pub fn new(query: &AntibioticsQuery, username: &str, client_id: &str, track_id: String) -> Self {
        Self {
            info: InfoInbound {
                client_id: client_id.to_string(),
                username: username.to_string(),
                session_id: SESSION_ID.to_string(),
                ip_address: String::new(),
                track_id,
            },
            request: RequestParams {
                species_code: query.species_code,
                period_from: query.period_from.to_string(),
                period_to: query.period_to.to_string(),
                chr_number: query.chr_number,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct InfoInbound {
    #[serde(rename = "glr:KlientId")]
    client_id: String,
    #[serde(rename = "glr:BrugerNavn")]
    username: String,
    #[serde(rename = "glr:SessionId")]
    session_id: String,
    #[serde(rename = "glr:IPAdresse")]
    ip_address: String,
    #[serde(rename = "glr:TrackID")]
    track_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct RequestParams {
    #[serde(rename = "glr:DyreArtKode")]
    species_code: u32,
    #[serde(rename = "eks:PeriodeFra")]
    period_from: String,
    #[serde(rename = "eks:PeriodeTil")]
    period_to: String,
    #[serde(rename = "eks:CHRNummer")]
    chr_number: u64,
}
