use anyhow::{anyhow, Result};
use std::env;

use tarot_reading::{CardCatalog, Config, ReadingService};

#[derive(Debug)]
struct DrawArgs {
    reading_type: String,
    question: String,
    card_ids: Vec<i64>,
    verbose: bool,
}

fn parse_args(args: &[String]) -> Result<DrawArgs> {
    let mut reading_type = "one-card".to_string();
    let mut verbose = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--type" | "-t" => {
                reading_type = iter
                    .next()
                    .ok_or_else(|| anyhow!("--type needs a value"))?
                    .clone();
            }
            "--verbose" | "-v" => verbose = true,
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let question = positional
        .next()
        .ok_or_else(|| anyhow!("usage: draw [--type one-card|three-card|celtic-cross] [--verbose] \"question\" <card id>..."))?;

    let card_ids = positional
        .map(|id| {
            id.parse::<i64>()
                .map_err(|_| anyhow!("Invalid card id '{}'", id))
        })
        .collect::<Result<Vec<_>>>()?;

    if card_ids.is_empty() {
        return Err(anyhow!("Select at least one card id"));
    }

    Ok(DrawArgs {
        reading_type,
        question,
        card_ids,
        verbose,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let args = parse_args(&args)?;

    let config = Config::from_env()?;
    config.validate()?;

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.level))
            .with_writer(std::io::stderr)
            .init();
    }

    let catalog = CardCatalog::load(&config.catalog.path).await?;
    let cards = catalog.select(&args.card_ids);
    if cards.is_empty() {
        return Err(anyhow!("None of the card ids exist in the catalog ({} cards)", catalog.len()));
    }

    let service = ReadingService::from_config(&config.providers, &config.reading);
    let result = service.generate(&args.question, &args.reading_type, &cards).await;

    println!("{}", result.text);

    if args.verbose {
        eprintln!("\n=== Provenance: {} ===", result.provenance);
        for report in &result.reports {
            eprintln!("{}: {:?} ({} attempts)", report.provider, report.verdict, report.attempts.len());
        }
    }

    Ok(())
}
