//! camcops-dbtool - maintenance commands for CamCOPS local databases.
//!
//! Usage: camcops-dbtool [--database <file>] [--key <passphrase>] <command>
//!
//! Without `--database`, the data database from the CamCOPS configuration
//! is used.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use camcops_config::{init_logging, Config, LogConfig, Paths};
use camcops_db::{
    encrypt_plain_database_in_place, ConnectionFactory, DatabaseError, DatabaseManager,
    SqlCipherDriver,
};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};

/// Maintenance tool for CamCOPS databases.
#[derive(Parser, Debug)]
#[command(name = "camcops-dbtool")]
#[command(about = "Inspect, rekey and maintain CamCOPS SQLCipher databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (defaults to the configured data database)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Use the system database rather than the data database
    #[arg(long, global = true)]
    system: bool,

    /// Passphrase for an encrypted database
    #[arg(long, env = "CAMCOPS_DB_KEY", global = true, hide_env_values = true)]
    key: Option<String>,

    /// CamCOPS data directory (defaults to the platform data directory)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List user tables
    Tables,

    /// Print the database, or one table, as JSON
    DumpJson {
        /// Only this table
        #[arg(long)]
        table: Option<String>,
    },

    /// Check that the database can be read with the given key
    CheckKey,

    /// Change the passphrase
    Rekey {
        /// New passphrase
        new_key: String,
    },

    /// Encrypt a plaintext database in place, using --key as the passphrase
    EncryptInPlace,

    /// Rebuild the database file to reclaim space
    Vacuum,

    /// Print the approximate size in bytes
    Size,
}

fn resolve_paths(cli: &Cli) -> anyhow::Result<Paths> {
    match &cli.base_dir {
        Some(base) => Ok(Paths::with_base_dir(base.clone())),
        None => Paths::new().context("cannot locate the CamCOPS data directory"),
    }
}

fn open_database(
    cli: &Cli,
    config: &Config,
    path: PathBuf,
    factory: Arc<dyn ConnectionFactory>,
) -> anyhow::Result<DatabaseManager> {
    let db = DatabaseManager::open(path.clone(), "dbtool", factory, config.threaded_databases)
        .with_context(|| format!("cannot open {}", path.display()))?
        .with_system_db(cli.system);
    db.set_vacuum_on_close(config.vacuum_on_close);

    match &cli.key {
        Some(key) => {
            if !db.decrypt(key) {
                bail!("cannot decrypt {} with the key given", path.display());
            }
        }
        None => {
            if !db.can_read_database() {
                bail!("cannot read {}; is it encrypted? Use --key", path.display());
            }
        }
    }
    debug!(file = %path.display(), "Database open and readable");
    Ok(db)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = resolve_paths(&cli)?;
    let config = Config::load(&paths)?;

    let level = cli.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&LogConfig {
        service_name: "camcops-dbtool".into(),
        default_level: level,
        log_path: config.log_to_file.then(|| paths.log_file()),
        also_stderr: true,
    })?;

    let path = match &cli.database {
        Some(path) => path.clone(),
        None if cli.system => config.system_database_path(&paths),
        None => config.data_database_path(&paths),
    };
    let factory: Arc<dyn ConnectionFactory> = Arc::new(SqlCipherDriver::new());
    info!(file = %path.display(), "camcops-dbtool starting");
    let open = || open_database(&cli, &config, path.clone(), Arc::clone(&factory));

    match &cli.command {
        Commands::Tables => {
            for table in open()?.get_all_tables() {
                println!("{table}");
            }
        }
        Commands::DumpJson { table: Some(table) } => {
            let db = open()?;
            if !db.table_exists(table) {
                bail!("no such table: {table}");
            }
            println!("{}", serde_json::to_string_pretty(&db.get_table_as_json(table))?);
        }
        Commands::DumpJson { table: None } => {
            println!("{}", open()?.get_database_as_json()?);
        }
        Commands::CheckKey => {
            open()?;
            println!("OK: database is readable");
        }
        Commands::Rekey { new_key } => {
            if !open()?.pragma_rekey(new_key) {
                bail!("rekey failed");
            }
            println!("Passphrase changed");
        }
        Commands::EncryptInPlace => {
            let Some(key) = &cli.key else {
                bail!("encrypt-in-place needs --key");
            };
            let mut temp = path.clone().into_os_string();
            temp.push(".encrypting");
            encrypt_plain_database_in_place(&path, &PathBuf::from(temp), key, Arc::clone(&factory))?;
            println!("Encrypted {}", path.display());
        }
        Commands::Vacuum => {
            open()?.vacuum();
            println!("Vacuumed");
        }
        Commands::Size => {
            println!("{}", open()?.approximate_database_size());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let fatal = e
                .downcast_ref::<DatabaseError>()
                .is_some_and(DatabaseError::is_fatal);
            if fatal {
                error!(error = %e, "Unrecoverable schema error");
            }
            eprintln!("Error: {e:#}");
            if fatal {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "camcops-dbtool",
            "dump-json",
            "--table",
            "patient",
            "--database",
            "/tmp/x.sqlite",
            "--key",
            "pw",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::DumpJson { table: Some(ref t) } if t == "patient"));
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(cli.key.as_deref(), Some("pw"));
    }

    #[test]
    fn test_rekey_requires_new_key() {
        assert!(Cli::try_parse_from(["camcops-dbtool", "rekey"]).is_err());
        let cli = Cli::try_parse_from(["camcops-dbtool", "rekey", "new"]).unwrap();
        assert!(matches!(cli.command, Commands::Rekey { ref new_key } if new_key == "new"));
    }

    #[test]
    fn test_open_database_rejects_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.sqlite");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let cli = Cli::try_parse_from(["camcops-dbtool", "tables"]).unwrap();
        let config = Config {
            threaded_databases: false,
            ..Config::default()
        };
        let factory: Arc<dyn ConnectionFactory> = Arc::new(SqlCipherDriver::new());
        assert!(open_database(&cli, &config, path, factory).is_err());
    }
}
