use std::env;

use anyhow::{Context, Result};
use disaster_zips::query::{self, RecordFilter};
use disaster_zips::{ClientConfig, DisasterClient, Pipeline, PipelineStatus, export};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    state: Option<String>,
    disaster: Option<String>,
    counties: Vec<String>,
    eligibilities: Vec<String>,
    raw: bool,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [STATE] [DISASTER_NAME] [options]", program);
    eprintln!("  no arguments:        list states with recent declarations");
    eprintln!("  STATE:               list declarations in a state (e.g. CA)");
    eprintln!("  STATE DISASTER_NAME: show affected areas and write <name>_data.csv");
    eprintln!("Options:");
    eprintln!("  --county NAME        keep only this county (repeatable)");
    eprintln!("  --eligibility LABEL  keep only this eligibility label (repeatable)");
    eprintln!("  --raw                print the raw declarations JSON and exit");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let mut argv = env::args();
    let program = argv.next().unwrap_or_else(|| "disaster-zips".to_string());

    let mut args = Args {
        state: None,
        disaster: None,
        counties: Vec::new(),
        eligibilities: Vec::new(),
        raw: false,
    };
    let mut positional = Vec::new();

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--county" => match argv.next() {
                Some(v) => args.counties.push(v),
                None => usage(&program),
            },
            "--eligibility" => match argv.next() {
                Some(v) => args.eligibilities.push(v),
                None => usage(&program),
            },
            "--raw" => args.raw = true,
            "-h" | "--help" => usage(&program),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    args.state = positional.next().map(|s| s.trim().to_uppercase());
    args.disaster = positional.next();
    if positional.next().is_some() {
        usage(&program);
    }
    args
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "disaster_zips=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args();
    let client = DisasterClient::with_config(ClientConfig::from_env())
        .context("Failed to build HTTP client")?;
    let pipeline = Pipeline::new(client);

    if args.raw {
        let raw = pipeline
            .declarations()
            .await
            .context("Failed to fetch declarations")?;
        println!("{}", serde_json::to_string_pretty(raw.as_ref())?);
        return Ok(());
    }

    println!("Fetching and processing disaster data...");
    let outcome = pipeline.run().await;

    match &outcome.status {
        PipelineStatus::Ready => {}
        PipelineStatus::NoDataForPeriod => {
            println!("No disaster data available for the specified period.");
            return Ok(());
        }
        PipelineStatus::SourceUnavailable(errors) => {
            for error in errors {
                eprintln!("Error: {}", error);
            }
            println!("No disaster data available for the specified period.");
            return Ok(());
        }
    }

    let records = &outcome.records;
    println!("Total number of disaster declarations: {}", records.len());
    if !outcome.rejected.is_empty() {
        eprintln!("Skipped {} declaration(s) with unreadable dates", outcome.rejected.len());
    }

    let Some(state) = args.state else {
        for state in query::regions(records) {
            let count = records.iter().filter(|r| r.state == state).count();
            println!("  {}  {} record(s)", state, count);
        }
        return Ok(());
    };

    let Some(disaster) = args.disaster else {
        let names = query::declarations_in(records, &state);
        if names.is_empty() {
            println!("No declarations found for {}", state);
        }
        for name in names {
            println!("  {}", name);
        }
        return Ok(());
    };

    let selected = query::select(records, &state, &disaster);
    let Some(summary) = query::summarize(&selected) else {
        println!(
            "No data found for {} in {}. This may be due to data updates or changes in the FEMA database.",
            disaster, state
        );
        return Ok(());
    };

    println!("\n{}", summary.disaster_name);
    println!("  Declaration Date: {}", summary.declaration_date);
    println!("  Incident Type: {}", summary.incident_type);
    println!("\nAffected Areas and Zip Codes");

    let filter = RecordFilter {
        counties: (!args.counties.is_empty()).then(|| args.counties.into_iter().collect()),
        eligibilities: (!args.eligibilities.is_empty())
            .then(|| args.eligibilities.into_iter().collect()),
    };
    let filtered = query::filter(&selected, &filter);

    for row in &filtered {
        println!("\n  {}, {}", row.county, row.state);
        println!("    Eligibility: {}", row.eligibility);
        println!("    Zip Codes: {}", row.zip_codes);
    }

    let file_name = export::export_file_name(&summary.disaster_name);
    let csv = export::to_csv(&filtered).context("Failed to encode CSV")?;
    std::fs::write(&file_name, csv).with_context(|| format!("Failed to write {}", file_name))?;
    println!("\nWrote {} row(s) to {}", filtered.len(), file_name);

    Ok(())
}
