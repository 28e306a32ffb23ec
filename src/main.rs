use chrono::NaiveDate;
use clap::Parser;
use color_eyre::eyre::{WrapErr, eyre};
use tracing::{error, info, warn};
use vetstat_wsse::{
    client::{ClientSettings, VetStatClient},
    config::Config,
    credential::{ConfigCredentialProvider, CredentialProvider},
    request::AntibioticsQuery,
    response::QueryOutcome,
    telemetry,
    transport::HttpTransport,
    wsse,
};

/// Fetch antibiotic usage from VetStat with WS-Security signed requests.
///
/// Endpoint, retries and credentials come from `config/settings` and
/// `APP_*` environment variables (a `.env` file is read first).
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CHR numbers to query
    #[arg(long = "chr", required = true, num_args = 1..)]
    chr_numbers: Vec<u64>,

    /// Species code, e.g. 15 for pigs
    #[arg(long)]
    species: u32,

    /// First day of the period (YYYY-MM-DD)
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the period (YYYY-MM-DD)
    #[arg(long)]
    to: NaiveDate,

    /// Print the signed envelopes instead of sending them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let args = Args::parse();
    if args.from > args.to {
        return Err(eyre!("--from {} is after --to {}", args.from, args.to));
    }

    let config = Config::load().wrap_err("Failed to load configuration")?;
    let credentials = config
        .credentials
        .clone()
        .ok_or_else(|| eyre!("No credentials configured (APP_CREDENTIALS__*)"))?;
    let credential = ConfigCredentialProvider::new(credentials)
        .credential()
        .await
        .wrap_err("Failed to load signing credential")?;
    if let Ok(info) = credential.certificate_info() {
        info!(subject = %info.subject, not_after = %info.not_after, "Using certificate");
    }

    let queries: Vec<AntibioticsQuery> = args
        .chr_numbers
        .iter()
        .map(|chr| AntibioticsQuery::new(*chr, args.species, args.from, args.to))
        .collect();

    if args.dry_run {
        for query in &queries {
            let signed = wsse::sign_envelope(&credential, query, &config.vetstat.client_id)?;
            println!("{}", signed.to_xml());
        }
        return Ok(());
    }

    let transport = HttpTransport::from_config(&config.vetstat)?;
    info!(endpoint = transport.endpoint(), queries = queries.len(), "Querying VetStat");
    let client = VetStatClient::new(
        transport,
        credential,
        ClientSettings::from_config(&config.vetstat),
    );

    let mut failures = 0;
    for (query, result) in client.fetch_all(queries).await {
        match result {
            Ok(QueryOutcome::Records { records, .. }) => {
                for record in records {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
            Ok(QueryOutcome::NoData) => info!(%query, "No data"),
            Ok(QueryOutcome::Unexpected { status, .. }) => {
                warn!(%query, status, "Unexpected response");
                failures += 1;
            }
            Err(e) => {
                error!(%query, "Query failed: {e}");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(eyre!("{failures} of {} queries failed", args.chr_numbers.len()));
    }
    Ok(())
}
