use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use walkslot::config::EngineConfig;
use walkslot::engine::{Engine, Verdict};
use walkslot::holidays::{ComputedGermanHolidays, HolidaySource, HttpHolidaySource};
use walkslot::model::{Category, Reservation, TimeOfDay};
use walkslot::store::DurableStore;

/// Dog-walk booking rules, availability and reservations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the rule category of a date
    Classify { date: NaiveDate },
    /// List bookable times for a date
    Slots {
        date: NaiveDate,
        /// Step in minutes; defaults to WALKSLOT_GRANULARITY_MINUTES
        #[arg(long)]
        granularity: Option<u16>,
        /// Leave out times this resource already holds
        #[arg(long)]
        resource: Option<Ulid>,
    },
    /// Print bookable time ranges for a date
    Windows { date: NaiveDate },
    /// Check whether a time can be booked, without booking it
    Validate { date: NaiveDate, time: TimeOfDay },
    /// Book a slot for a resource
    Reserve {
        resource: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
    },
    /// List reservations of a resource on a date
    Reservations { resource: Ulid, date: NaiveDate },
    Approve { id: Ulid },
    Reject { id: Ulid },
    Cancel { id: Ulid },
    Complete { id: Ulid },
    /// Manage operating-hour rules
    #[command(subcommand)]
    Rules(RuleCommand),
    /// Manage holidays
    #[command(subcommand)]
    Holidays(HolidayCommand),
    /// Rewrite the store log to its minimal form
    Compact,
}

#[derive(Subcommand, Debug)]
enum RuleCommand {
    List {
        category: Category,
    },
    Add {
        category: Category,
        name: String,
        start: TimeOfDay,
        end: TimeOfDay,
        #[arg(long)]
        blocked: bool,
    },
    Update {
        category: Category,
        name: String,
        start: TimeOfDay,
        end: TimeOfDay,
        #[arg(long)]
        blocked: bool,
    },
    Delete {
        category: Category,
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum HolidayCommand {
    /// Administrator holiday rows
    List,
    /// All holidays of a year in the configured region
    Year { year: i32 },
    Set { date: NaiveDate, name: String },
    Deactivate { date: NaiveDate },
    /// Copy the external holiday set of a year into holiday rows
    Import { year: i32 },
}

fn print_reservation(r: &Reservation) {
    println!(
        "{}  {} {}  {:?}/{:?}{}",
        r.id,
        r.date,
        r.time,
        r.status,
        r.approval_status,
        if r.requires_approval { "  (approval)" } else { "" }
    );
}

fn holiday_source(config: &EngineConfig) -> Result<Arc<dyn HolidaySource>, Box<dyn std::error::Error>> {
    let kind = std::env::var("WALKSLOT_HOLIDAY_SOURCE").unwrap_or_else(|_| "computed".into());
    match kind.as_str() {
        "computed" => Ok(Arc::new(ComputedGermanHolidays)),
        "http" => {
            let url = std::env::var("WALKSLOT_HOLIDAY_API_URL").ok();
            Ok(Arc::new(HttpHolidaySource::new(url, config.holiday_fetch_timeout)?))
        }
        other => Err(format!("WALKSLOT_HOLIDAY_SOURCE: unknown source {other:?}").into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let metrics_port: Option<u16> = std::env::var("WALKSLOT_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    walkslot::observability::init(metrics_port)?;

    let data_dir = std::env::var("WALKSLOT_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: usize = std::env::var("WALKSLOT_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    std::fs::create_dir_all(&data_dir)?;

    let config = EngineConfig::from_env()?;
    let store = Arc::new(DurableStore::open(&PathBuf::from(&data_dir).join("walkslot.wal"))?);
    let source = holiday_source(&config)?;
    let engine = Engine::new(Arc::clone(&store), source, config)?;
    info!(data_dir, region = engine.calendar().region(), "store opened");

    match args.command {
        Command::Classify { date } => println!("{}", engine.classify(date).await?),
        Command::Slots {
            date,
            granularity,
            resource,
        } => {
            let slots = match (resource, granularity) {
                (Some(resource), _) => engine.available_slots(resource, date).await?,
                (None, Some(g)) => engine.slots_for_granularity(date, g).await?,
                (None, None) => engine.slots_for(date).await?,
            };
            for slot in slots {
                println!("{slot}");
            }
        }
        Command::Windows { date } => {
            for window in engine.free_windows(date).await? {
                println!("{window}");
            }
        }
        Command::Validate { date, time } => match engine.validate(date, time).await? {
            Verdict::Accepted { category } => println!("ok ({category})"),
            Verdict::Rejected(reason) => println!("rejected: {reason}"),
        },
        Command::Reserve {
            resource,
            date,
            time,
        } => {
            let outcome = engine.reserve(resource, date, time).await?;
            match outcome.reservation() {
                Some(r) => print_reservation(r),
                None => println!("{outcome}"),
            }
        }
        Command::Reservations { resource, date } => {
            for r in engine.reservations_for(resource, date).await? {
                print_reservation(&r);
            }
        }
        Command::Approve { id } => print_reservation(&engine.approve(id).await?),
        Command::Reject { id } => print_reservation(&engine.reject(id).await?),
        Command::Cancel { id } => print_reservation(&engine.cancel(id).await?),
        Command::Complete { id } => print_reservation(&engine.complete(id).await?),
        Command::Rules(cmd) => run_rule_command(&engine, cmd).await?,
        Command::Holidays(cmd) => run_holiday_command(&engine, cmd).await?,
        Command::Compact => {
            store.compact().await?;
            println!("compacted");
            return Ok(());
        }
    }

    if store.replayed_events() >= compact_threshold {
        store.compact().await?;
        info!(replayed = store.replayed_events(), "compacted store log");
    }
    Ok(())
}

async fn run_rule_command(
    engine: &Engine<DurableStore>,
    cmd: RuleCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        RuleCommand::List { category } => {
            for rule in engine.windows_for(category).await? {
                let kind = if rule.blocked { "blocked" } else { "open" };
                println!("{}  {}  {kind}", rule.window, rule.name);
            }
        }
        RuleCommand::Add {
            category,
            name,
            start,
            end,
            blocked,
        } => {
            let rule = engine.create_rule(category, &name, start, end, blocked).await?;
            println!("{}  {}", rule.id, rule.window);
        }
        RuleCommand::Update {
            category,
            name,
            start,
            end,
            blocked,
        } => {
            let rule = engine.update_rule(category, &name, start, end, blocked).await?;
            println!("{}  {}", rule.id, rule.window);
        }
        RuleCommand::Delete { category, name } => {
            let rule = engine.delete_rule(category, &name).await?;
            println!("deleted {}", rule.name);
        }
    }
    Ok(())
}

async fn run_holiday_command(
    engine: &Engine<DurableStore>,
    cmd: HolidayCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        HolidayCommand::List => {
            for h in engine.list_holidays().await? {
                let state = if h.active { "active" } else { "inactive" };
                println!("{}  {}  {:?} {state}", h.date, h.name, h.source);
            }
        }
        HolidayCommand::Year { year } => {
            let region = engine.calendar().region().to_string();
            for (date, name) in engine.calendar().holidays_for_year(year, &region).await? {
                println!("{date}  {name}");
            }
        }
        HolidayCommand::Set { date, name } => {
            let h = engine.upsert_holiday(date, &name).await?;
            println!("{}  {}", h.date, h.name);
        }
        HolidayCommand::Deactivate { date } => {
            let h = engine.deactivate_holiday(date).await?;
            println!("{}  {}  inactive", h.date, h.name);
        }
        HolidayCommand::Import { year } => {
            let written = engine.import_holidays(year).await?;
            println!("imported {} holidays", written.len());
        }
    }
    Ok(())
}
