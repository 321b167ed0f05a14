//! polydb CLI - Offline front end for the dialect and schema-sync engine.

use clap::{Parser, Subcommand};
use polydb::{
    paginate, ConnectionsFile, Database, DbConfig, DbError, DbType, Migration, Platform,
    SchemaSync, SyncPlan, Table,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, Level};

#[derive(Parser)]
#[command(name = "polydb")]
#[command(about = "SQL dialects, pagination and schema diffs for ten database backends")]
#[command(version)]
struct Cli {
    /// Connection string, or a connection name when --connections is given
    #[arg(short, long, default_value = "Provider=sqlite")]
    connection: String,

    /// YAML file of named connections
    #[arg(long)]
    connections: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List driver module names tried when resolving a backend
    Candidates {
        /// Backend name (sqlserver, postgresql, sqlite, dm, ...)
        db_type: String,

        /// Operating system tag (win, linux, osx)
        #[arg(long)]
        os: Option<String>,

        /// Architecture tag (x86, x64, arm, arm64)
        #[arg(long)]
        arch: Option<String>,

        /// Host runtime version, e.g. 8.0
        #[arg(long)]
        runtime: Option<String>,
    },

    /// Rewrite a query to return one page of rows
    Paginate {
        /// The SELECT statement
        sql: String,

        /// Rows to skip
        #[arg(long, default_value = "0")]
        start: i64,

        /// Rows to return (0 for all remaining)
        #[arg(long, default_value = "0")]
        max: i64,

        /// Sortable key column, optionally with "desc"
        #[arg(long)]
        key: Option<String>,

        /// Server version used to choose the paging strategy
        #[arg(long)]
        server_version: Option<String>,
    },

    /// Print the CREATE statements for a schema file
    Ddl {
        /// YAML or JSON schema file
        schema: PathBuf,
    },

    /// Plan the statements that bring a live schema in line with a desired one
    Diff {
        /// Desired schema file
        desired: PathBuf,

        /// Live schema file (as read from the catalog)
        live: PathBuf,

        /// Override the connection's migration mode
        #[arg(long)]
        migration: Option<String>,

        /// Server version, for version-dependent DDL
        #[arg(long)]
        server_version: Option<String>,
    },
}

/// Schema file layout.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    tables: Vec<Table>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), DbError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Candidates {
            ref db_type,
            ref os,
            ref arch,
            ref runtime,
        } => {
            let db_type: DbType = db_type.parse()?;
            let current = Platform::current();
            let runtime = match runtime {
                Some(r) => parse_runtime(r)?,
                None => current.runtime,
            };
            let platform = Platform::new(
                os.clone().unwrap_or(current.os),
                arch.clone().unwrap_or(current.arch),
                runtime,
            );
            let names = platform.candidates(db_type.driver_module());

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }

        Commands::Paginate {
            ref sql,
            start,
            max,
            ref key,
            ref server_version,
        } => {
            let db = database(&cli)?;
            let style = db.dialect().paging_style(server_version.as_deref());
            debug!("Paging {} with {:?}", db.db_type(), style);
            let paged = paginate(style, sql, start, max, key.as_deref())?;

            if cli.output_json {
                println!("{}", serde_json::json!({ "sql": paged }));
            } else {
                println!("{}", paged);
            }
        }

        Commands::Ddl { ref schema } => {
            let db = database(&cli)?;
            let tables = load_schema(schema)?;
            let sync = SchemaSync::new(db.dialect(), db.names(), Migration::Full);
            let plan = sync.plan(&tables, &[]);
            print_plan(&plan, cli.output_json)?;
            fail_on_errors(plan)?;
        }

        Commands::Diff {
            ref desired,
            ref live,
            ref migration,
            ref server_version,
        } => {
            let db = database(&cli)?;
            let migration = match migration {
                Some(m) => m.parse()?,
                None => db.config().migration,
            };
            let desired = load_schema(desired)?;
            let live = load_schema(live)?;
            info!(
                "Comparing {} desired with {} live table(s) for {}",
                desired.len(),
                live.len(),
                db.db_type()
            );
            let sync = SchemaSync::new(db.dialect(), db.names(), migration)
                .with_version(server_version.clone());
            let plan = sync.plan(&desired, &live);
            print_plan(&plan, cli.output_json)?;
            fail_on_errors(plan)?;
        }
    }

    Ok(())
}

fn database(cli: &Cli) -> Result<Database, DbError> {
    let config = match &cli.connections {
        Some(path) => ConnectionsFile::load(path)?.config(&cli.connection)?,
        None => DbConfig::from_connection_string("cli", &cli.connection, None)?,
    };
    info!("Using {} connection {}", config.db_type, config.name);
    Ok(Database::from_config(config))
}

fn load_schema(path: &Path) -> Result<Vec<Table>, DbError> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let mut file: SchemaFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    for table in &mut file.tables {
        table.fix();
    }
    debug!("Loaded {} table(s) from {:?}", file.tables.len(), path);
    Ok(file.tables)
}

fn parse_runtime(text: &str) -> Result<(u32, u32), DbError> {
    let invalid = || DbError::Config(format!("Invalid runtime version '{}'", text));
    let mut parts = text.trim().splitn(2, '.');
    let major = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(invalid)?;
    let minor = match parts.next() {
        Some(p) => p.parse().map_err(|_| invalid())?,
        None => 0,
    };
    Ok((major, minor))
}

fn print_plan(plan: &SyncPlan, json: bool) -> Result<(), DbError> {
    if json {
        let errors: Vec<serde_json::Value> = plan
            .errors
            .iter()
            .map(|(table, e)| serde_json::json!({ "table": table, "error": e.to_string() }))
            .collect();
        let output = serde_json::json!({
            "in_sync": plan.is_in_sync(),
            "tables": plan.tables,
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for table in &plan.tables {
        println!("-- {}: {}", table.table, table.state);
        for reason in &table.reasons {
            println!("--   {}", reason);
        }
        for statement in &table.statements {
            println!("{};", statement);
        }
        if !table.destructive.is_empty() {
            println!("-- suppressed by migration mode:");
            for statement in &table.destructive {
                println!("-- {};", statement);
            }
        }
    }
    Ok(())
}

fn fail_on_errors(plan: SyncPlan) -> Result<(), DbError> {
    match plan.errors.into_iter().next() {
        Some((table, e)) => {
            eprintln!("Table {} could not be planned", table);
            Err(e)
        }
        None => Ok(()),
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
