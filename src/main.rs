use std::fs::read_to_string;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::portfolio::{Mutation, Portfolio};
use crate::prices::{CoinGecko, PriceSource, StaticPrices, COINGECKO_API};
use crate::stake::{from_string, normalize_asset_id, StakeForm};
use crate::store::RecordStore;

use chrono::Utc;
use clap::{arg, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use eyre::{eyre, WrapErr};
use serde::Deserialize;
use serde::Serialize;

mod error;
mod format;
mod portfolio;
mod prices;
mod stake;
mod store;
mod tui;
mod valuation;

const APP_NAME: &str = "stake_rs";
const CONFIG_NAME: &str = "config";

#[derive(Serialize, Deserialize)]
struct Config {
    /// Path of the stake database. Empty means `stakes.db` next to this file.
    database: String,
    /// Fiat currency prices are quoted in and fees are entered in.
    currency: String,
    price_api: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: String::new(),
            currency: "eur".to_string(),
            price_api: COINGECKO_API.to_string(),
        }
    }
}

fn text_arg(name: &'static str, value_name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).value_name(value_name).help(help)
}

fn yes_arg() -> Arg {
    Arg::new("yes")
        .short('y')
        .long("yes")
        .action(ArgAction::SetTrue)
        .help("Do not ask for confirmation")
}

fn cli() -> Command {
    Command::new(APP_NAME)
        .about("Track staked crypto positions and what they earn")
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .global(true)
                .help("Stake database to use instead of the configured one"),
        )
        .arg(
            Arg::new("offline")
                .long("offline")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not fetch prices; every stake is valued at 0"),
        )
        .subcommand(Command::new("config").about("Print the path to the config file"))
        .subcommand(Command::new("list").about("Show your stakes and the portfolio summary"))
        .subcommand(
            Command::new("add")
                .about("Record a new stake")
                .arg(text_arg("platform", "NAME", "Protocol or exchange, e.g. Lido").required(true))
                .arg(text_arg("token", "TICKER", "Ticker of the staked token").required(true))
                .arg(text_arg(
                    "asset-id",
                    "ID",
                    "CoinGecko id used to price the token, e.g. ethereum",
                ))
                .arg(
                    text_arg("amount", "QUANTITY", "Amount of the token staked")
                        .required(true)
                        .allow_negative_numbers(true),
                )
                .arg(text_arg("derivative", "TICKER", "Receipt token received, e.g. stETH"))
                .arg(
                    text_arg("fee", "AMOUNT", "Fee already paid, in the configured currency")
                        .allow_negative_numbers(true),
                )
                .arg(
                    text_arg("yield", "PERCENT", "Advertised reward rate, e.g. 3.5")
                        .required(true)
                        .allow_negative_numbers(true),
                )
                .arg(text_arg("yield-kind", "KIND", "APR or APY (default APR)"))
                .arg(text_arg("lockup", "TEXT", "Whether the funds are locked"))
                .arg(text_arg("withdrawal", "TEXT", "How long a withdrawal takes"))
                .arg(text_arg("wallet", "LABEL", "Wallet holding the position"))
                .arg(text_arg("notes", "TEXT", "Free-form notes")),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete one stake by its row number in `list`")
                .arg(
                    arg!(<ROW> "Row number shown by `list`")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("clear")
                .about("Delete every stake (cannot be undone)")
                .arg(yes_arg()),
        )
        .subcommand(
            Command::new("allocation").about("Show how your staked value is spread over platforms"),
        )
        .subcommand(
            Command::new("import")
                .about("Append the stakes of a JSON file")
                .arg(arg!(<FILE> "JSON file with an array of stakes")),
        )
        .subcommand(Command::new("export").about("Print all stakes as JSON"))
        .subcommand(Command::new("tui").about("Start the interactive view"))
}

fn form_from_matches(matches: &ArgMatches) -> StakeForm {
    let text = |name: &str| {
        matches
            .get_one::<String>(name)
            .cloned()
            .unwrap_or_default()
    };
    StakeForm {
        platform: text("platform"),
        staked_token: text("token"),
        price_asset_id: text("asset-id"),
        staked_quantity: text("amount"),
        derivative_token: text("derivative"),
        fee_paid: text("fee"),
        yield_rate: text("yield"),
        yield_kind: text("yield-kind"),
        lockup_status: text("lockup"),
        withdrawal_terms: text("withdrawal"),
        wallet_label: text("wallet"),
        notes: text("notes"),
    }
}

// the --db argument wins over the config, which wins over the default location
fn database_path(cfg: &Config, matches: &ArgMatches) -> PathBuf {
    if let Some(path) = matches.get_one::<String>("db") {
        return PathBuf::from(path);
    }
    if !cfg.database.is_empty() {
        return PathBuf::from(&cfg.database);
    }
    confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join("stakes.db")))
        .unwrap_or_else(|| PathBuf::from("stakes.db"))
}

fn confirm(prompt: &str) -> io::Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}

fn init_logging(subcommand: Option<&str>) {
    // log lines would draw over the alternate screen
    let default_filter = if subcommand == Some("tui") { "off" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.subcommand_name());

    let cfg: Config = confy::load(APP_NAME, CONFIG_NAME)?;

    let Some((subcommand, sub_matches)) = matches.subcommand() else {
        cli().print_help()?;
        return Ok(());
    };

    if subcommand == "config" {
        println!(
            "Your config file is located here: \n{}",
            confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)?.display()
        );
        return Ok(());
    }

    let db_path = database_path(&cfg, sub_matches);
    let store = RecordStore::open(&db_path)
        .wrap_err_with(|| format!("Failed to open stake database {}", db_path.display()))?;
    let source: Box<dyn PriceSource> = if sub_matches.get_flag("offline") {
        Box::new(StaticPrices::default())
    } else {
        Box::new(CoinGecko::new(&cfg.price_api, &cfg.currency))
    };
    let mut portfolio = Portfolio::new(store, source, &cfg.currency);
    // mutations refresh on their own; reading rows keeps their order as listed
    portfolio.load_records();

    match subcommand {
        "list" => {
            portfolio.refresh().await;
            portfolio.print();
            portfolio.print_summary();
        }
        "add" => {
            let record = match form_from_matches(sub_matches).admit(&cfg.currency, Utc::now()) {
                Ok(record) => record,
                Err(e) => {
                    eprintln!("{} {e}", "Stake not added:".red().bold());
                    std::process::exit(2);
                }
            };
            let label = format!("{} stake on {}", record.staked_token, record.platform);
            portfolio.apply(Mutation::Add(record)).await?;
            println!("{} {label}", "Added".green().bold());
            portfolio.print();
            portfolio.print_summary();
        }
        "delete" => {
            let row = sub_matches.get_one::<usize>("ROW").copied().unwrap_or(0);
            let Some(record) = row.checked_sub(1).and_then(|i| portfolio.records.get(i)) else {
                return Err(eyre!(
                    "No stake at row {row}; `{APP_NAME} list` shows {} row(s)",
                    portfolio.records.len()
                ));
            };
            let label = format!("{} stake on {}", record.staked_token, record.platform);

            if !sub_matches.get_flag("yes") && !confirm(&format!("Delete the {label}?"))? {
                println!("Nothing deleted.");
                return Ok(());
            }
            portfolio.apply(Mutation::Remove(row - 1)).await?;
            println!("{} {label}", "Deleted".green().bold());
            portfolio.print();
            portfolio.print_summary();
        }
        "clear" => {
            // an unreadable slot loads as empty and is still erased here
            let warning = format!(
                "This permanently deletes all {} stakes and cannot be undone. Continue?",
                portfolio.records.len()
            );
            if !sub_matches.get_flag("yes") && !confirm(&warning.red().to_string())? {
                println!("Nothing deleted.");
                return Ok(());
            }
            portfolio.apply(Mutation::Clear).await?;
            println!("{}", "All stakes deleted.".green().bold());
            portfolio.print();
        }
        "allocation" => {
            portfolio.refresh().await;
            portfolio.draw_pie_chart();
            portfolio.print_allocation();
        }
        "import" => {
            let filename = sub_matches
                .get_one::<String>("FILE")
                .ok_or_else(|| eyre!("No file given"))?;
            let data = read_to_string(filename)
                .wrap_err_with(|| format!("Error reading file: {filename}"))?;
            let mut records =
                from_string(&data).wrap_err_with(|| format!("{filename} is not a stake list"))?;

            for (i, record) in records.iter_mut().enumerate() {
                record.price_asset_id = normalize_asset_id(&record.price_asset_id);
                record
                    .check()
                    .map_err(|e| eyre!("Stake {} in {filename} is invalid: {e}", i + 1))?;
            }

            let count = records.len();
            portfolio.apply(Mutation::Import(records)).await?;
            println!("{} {count} stake(s)", "Imported".green().bold());
            portfolio.print();
            portfolio.print_summary();
        }
        "export" => {
            println!("{}", serde_json::to_string_pretty(&portfolio.records)?);
        }
        "tui" => {
            tui::run_tui(portfolio).await?;
        }
        _ => {
            cli().print_help()?;
        }
    }

    Ok(())
}
