//! incident-report CLI
//!
//! # Main Commands
//!
//! ```bash
//! incident-report run --config report.json --password secret   # Query Postgres, write report
//! incident-report replay --config report.json --fixtures f.json # Same run over canned rows
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! incident-report plan --config report.json           # Show each query's resolved shape
//! incident-report group rows.json --group-key team    # Nest a JSON array of rows
//! incident-report directive incidents_by_a_by_b       # Parse a query name
//! ```

use clap::{Args, Parser, Subcommand};
use incident_report::output::to_indented_json;
use incident_report::{
    logs, nest_by_period, normalize, run_against_postgres, run_to_file, ConnectionSettings,
    Directive, FixtureSource, GroupingKeys, ReportConfig, ReportResult, ResultSet,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "incident-report")]
#[command(
    about = "Run incident analytics queries and export a grouped JSON report",
    long_about = None
)]
struct Cli {
    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all configured queries against PostgreSQL and write the report
    Run {
        /// Report config file
        #[arg(short, long)]
        config: PathBuf,

        /// Output file (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Run all configured queries against a fixture file and write the report
    Replay {
        /// Report config file
        #[arg(short, long)]
        config: PathBuf,

        /// Fixture file: query name to array of rows
        #[arg(short, long)]
        fixtures: PathBuf,

        /// Output file (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the execution plan: each query and how its rows are shaped
    Plan {
        /// Report config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Nest a JSON array of rows by a group column
    Group {
        /// Input JSON file (array of rows)
        input: PathBuf,

        /// Column whose values become the top-level keys
        #[arg(short, long)]
        group_key: String,

        /// Period column
        #[arg(long, default_value = "month_year")]
        date_key: String,

        /// Count column
        #[arg(long, default_value = "count")]
        count_key: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse the grouping directive of a query name
    Directive {
        /// Query name, e.g. incidents_by_severity
        name: String,
    },
}

/// PostgreSQL connection flags, with the usual libpq environment fallbacks
#[derive(Args)]
struct ConnectionArgs {
    /// Full connection URL (overrides the other connection flags)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Database host
    #[arg(long, env = "PGHOST", default_value = incident_report::config::DEFAULT_HOST)]
    host: String,

    /// Database port
    #[arg(long, env = "PGPORT", default_value_t = incident_report::config::DEFAULT_PORT)]
    port: u16,

    /// Database user
    #[arg(long, env = "PGUSER", default_value = incident_report::config::DEFAULT_USER)]
    user: String,

    /// Database name
    #[arg(long, env = "PGDATABASE", default_value = incident_report::config::DEFAULT_DBNAME)]
    dbname: String,

    /// Database password
    #[arg(long, env = "PGPASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl From<ConnectionArgs> for ConnectionSettings {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            url: args.database_url,
            host: args.host,
            port: args.port,
            user: args.user,
            dbname: args.dbname,
            password: args.password,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present) before clap reads env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logs::set_quiet(cli.quiet);

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Run {
            config,
            output,
            connection,
        } => cmd_run(&config, output.as_deref(), connection.into())
            .await
            .map_err(Into::into),

        Commands::Replay {
            config,
            fixtures,
            output,
        } => cmd_replay(&config, &fixtures, output.as_deref()).await,

        Commands::Plan { config } => cmd_plan(&config),

        Commands::Group {
            input,
            group_key,
            date_key,
            count_key,
            output,
        } => cmd_group(&input, &group_key, &date_key, &count_key, output.as_deref()),

        Commands::Directive { name } => cmd_directive(&name),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_run(
    config_path: &Path,
    output: Option<&Path>,
    settings: ConnectionSettings,
) -> ReportResult<()> {
    let config = ReportConfig::load(config_path)?;
    let output = output.unwrap_or(config.output.as_path());

    log_config(config_path, &config);
    let result = run_against_postgres(&config, &settings, output).await?;
    logs::log_success(format!(
        "✨ Done: {} tables in {}",
        result.tables,
        result.output.display()
    ));
    Ok(())
}

async fn cmd_replay(
    config_path: &Path,
    fixtures: &Path,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReportConfig::load(config_path)?;
    let output = output.unwrap_or(config.output.as_path());

    log_config(config_path, &config);
    logs::log_info(format!("📦 Fixtures: {}", fixtures.display()));
    let mut source = FixtureSource::from_path(fixtures)?;

    let result = run_to_file(&config, &mut source, output).await?;
    logs::log_success(format!(
        "✨ Done: {} tables in {}",
        result.tables,
        result.output.display()
    ));
    Ok(())
}

fn log_config(path: &Path, config: &ReportConfig) {
    logs::log_info(format!(
        "📄 Config: {} ({} queries)",
        path.display(),
        config.queries.len()
    ));
}

fn cmd_plan(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReportConfig::load(config_path)?;
    let plan = config.plan()?;

    println!("📋 {} queries → {}", plan.len(), config.output.display());
    println!("   type: {}", config.data_type);
    println!(
        "   period column: {}, count column: {}",
        config.columns.date, config.columns.count
    );
    println!();
    for (i, query) in plan.iter().enumerate() {
        println!("  [{:2}] {} ({})", i + 1, query.name, query.shape);
    }
    Ok(())
}

fn cmd_group(
    input: &Path,
    group_key: &str,
    date_key: &str,
    count_key: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📦 Grouping: {}", input.display());

    let content = fs::read_to_string(input)?;
    let rows: ResultSet = serde_json::from_str(&content)?;
    eprintln!("   {} rows", rows.len());

    let keys = GroupingKeys {
        group_key,
        date_key,
        count_key,
    };
    let grouped = nest_by_period(&normalize(rows), &keys)?;
    eprintln!("   {} groups by {}", grouped.len(), group_key);

    let json = to_indented_json(&grouped)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_directive(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    match Directive::parse(name)? {
        Some(directive) => {
            println!("{} is groupable", name);
            println!("   dimensions: {}", directive.dimensions().join(" → "));
            println!("   grouping key: {}", directive.primary());
            if directive.is_chained() {
                println!("   (only the last dimension is nested)");
            }
        }
        None => println!("{} is not groupable: rows are kept flat", name),
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
