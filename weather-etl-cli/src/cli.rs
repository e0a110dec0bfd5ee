use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use inquire::{CustomType, Text};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weather_etl_core::{
    Config, MemoryStore, NwsClient, PgObservationStore, Pipeline, RunParams, RunSummary,
    config::validate_run_params,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Weather station ETL pipeline")]
pub struct Cli {
    /// Read configuration from this file instead of the platform config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch stations and observations, then load them into the database.
    Run(RunArgs),

    /// Create or update the `weather_observations` table.
    Migrate,

    /// Interactively edit the configuration file.
    Configure,

    /// Show dashboard aggregates for a station, or list known stations.
    Stats {
        /// Station display name, as stored in `station_name`.
        #[arg(long)]
        station: Option<String>,
    },
}

#[derive(Debug, Args, Default)]
pub struct RunArgs {
    /// Number of stations to fetch observations for (directory order).
    #[arg(long)]
    pub stations: Option<usize>,

    /// Length of the trailing observation window, in days.
    #[arg(long)]
    pub days: Option<u32>,

    /// Rows per insert statement.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Load into memory instead of the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with an error when the load stage fails.
    #[arg(long)]
    pub strict: bool,
}

impl RunArgs {
    fn params(&self, base: RunParams) -> RunParams {
        RunParams {
            number_of_stations: self.stations.unwrap_or(base.number_of_stations),
            start_date_offset: self.days.unwrap_or(base.start_date_offset),
            batch_size: self.batch_size.unwrap_or(base.batch_size),
        }
    }
}

impl Cli {
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);

        if self.json {
            builder.json().init();
        } else {
            builder.init();
        }
    }

    pub async fn run(self) -> Result<()> {
        dotenvy::dotenv().ok();

        match self.command {
            Command::Run(ref args) => run_pipeline(&self.load_config()?, args).await,
            Command::Migrate => {
                let store = connect(&self.load_config()?)?;
                let result = store.run_migrations().await;
                store.close().await;
                result.context("Failed to apply migrations")?;
                println!("Database schema is up to date.");
                Ok(())
            }
            Command::Configure => configure(self.config.as_deref()),
            Command::Stats { ref station } => show_stats(&self.load_config()?, station.as_deref()).await,
        }
    }

    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        config.override_database_url(std::env::var("DATABASE_URL").ok());
        config.validate()?;
        Ok(config)
    }
}

fn connect(config: &Config) -> Result<PgObservationStore> {
    let store =
        PgObservationStore::connect_lazy(config.database_url()?, config.database.max_connections)
            .context("Invalid database URL")?;
    Ok(store)
}

async fn run_pipeline(config: &Config, args: &RunArgs) -> Result<()> {
    let params = args.params(config.run);
    validate_run_params(&params)?;

    let source = NwsClient::new(&config.api).context("Failed to build HTTP client")?;

    let summary = if args.dry_run {
        info!("Dry run: observations are loaded into memory only");
        let store = MemoryStore::new();
        Pipeline::new(&source, &store, params).run().await?
    } else {
        let store = connect(config)?;
        let result = Pipeline::new(&source, &store, params).run().await;
        store.close().await;
        result.context("Fetch stage failed; nothing was loaded. The run can be retried.")?
    };

    print_summary(&summary, args.dry_run);

    if let Some(err) = &summary.load.error {
        if args.strict {
            bail!("Load stage failed, transaction rolled back: {err}");
        }
        warn!("Load stage failed; exiting successfully because --strict was not given");
    }

    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let ctx = &summary.context;
    println!(
        "Window:       {} .. {}",
        ctx.window.start_param(),
        ctx.window.end_param()
    );
    println!(
        "Stations:     {} fetched, {} selected",
        summary.stations_fetched, summary.stations_selected
    );
    println!("Observations: {} fetched", summary.observations_fetched);
    println!("Dropped:      {}", summary.warnings.len());

    let load = &summary.load;
    let target = if dry_run { "memory" } else { "database" };
    match &load.error {
        None => println!(
            "Loaded:       {} new rows into {target} ({} duplicates, {} batches)",
            load.inserted,
            load.duplicates(),
            load.batches
        ),
        Some(err) => println!(
            "Loaded:       0 of {} rows, rolled back after batch {}: {err}",
            load.attempted, load.batches
        ),
    }
}

async fn show_stats(config: &Config, station: Option<&str>) -> Result<()> {
    let store = connect(config)?;

    let result = async {
        match station {
            Some(name) => {
                let avg = store.average_temperature_last_week(name).await?;
                let wind = store.max_wind_speed_change(name).await?;
                println!("Station: {name}");
                println!("Average temperature (last week): {}", fmt_value(avg));
                println!("Max wind speed change (7 days):  {}", fmt_value(wind));
            }
            None => {
                for name in store.station_names().await? {
                    println!("{name}");
                }
            }
        }
        anyhow::Ok(())
    }
    .await;

    store.close().await;
    result
}

fn fmt_value(value: Option<f64>) -> String {
    value.map_or_else(|| "no data".to_string(), |v| format!("{v:.2}"))
}

fn configure(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::config_file_path()?,
    };
    let mut cfg = Config::load_from(&path)?;

    cfg.api.user_agent = Text::new("User-Agent sent to the weather API:")
        .with_default(&cfg.api.user_agent)
        .with_help_message("api.weather.gov asks for contact info, e.g. `weather-etl (ops@example.com)`")
        .prompt()?;

    let db_default = cfg.database.url.clone().unwrap_or_default();
    let db_url = Text::new("Database URL:")
        .with_default(&db_default)
        .prompt()?;
    cfg.database.url = Some(db_url).filter(|u| !u.trim().is_empty());

    cfg.run.number_of_stations = CustomType::<usize>::new("Number of stations per run:")
        .with_default(cfg.run.number_of_stations)
        .prompt()?;
    cfg.run.start_date_offset = CustomType::<u32>::new("Observation window (days):")
        .with_default(cfg.run.start_date_offset)
        .prompt()?;
    cfg.run.batch_size = CustomType::<usize>::new("Insert batch size:")
        .with_default(cfg.run.batch_size)
        .prompt()?;

    cfg.validate()?;
    cfg.save_to(&path)?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}
