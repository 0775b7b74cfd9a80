use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::browser::WebDriverConfig;
use crate::ledger::{DEFAULT_RESOLVED_TABLE, DEFAULT_UNRESOLVED_TABLE, LedgerTables};
use crate::portal::DEFAULT_PORTAL_URL;
use crate::query::{DEFAULT_MAX_SUBMIT_ATTEMPTS, DEFAULT_WAIT_TIMEOUT_MS, QuerySettings};

#[derive(Parser, Debug)]
#[command(
    name = "tracksync",
    version,
    about = "Carrier tracking lookup and order ledger reconciliation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query the portal for every order in one or more input spreadsheets.
    Run(RunArgs),
    /// Query the portal again for every row of one ledger table.
    Recheck(RecheckArgs),
    Status(StatusArgs),
    Export(ExportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = ".cache/tracksync")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_RESOLVED_TABLE)]
    pub resolved_table: String,

    #[arg(long, default_value = DEFAULT_UNRESOLVED_TABLE)]
    pub unresolved_table: String,
}

impl StoreArgs {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join("ledger.sqlite"))
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.cache_root.join("manifests")
    }

    pub fn tables(&self) -> LedgerTables {
        LedgerTables {
            resolved: self.resolved_table.clone(),
            unresolved: self.unresolved_table.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PortalArgs {
    #[arg(long, default_value = DEFAULT_PORTAL_URL)]
    pub portal_url: String,

    #[arg(long, default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    #[arg(long, default_value_t = false)]
    pub show_browser: bool,

    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    #[arg(long, default_value_t = DEFAULT_WAIT_TIMEOUT_MS)]
    pub wait_timeout_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_SUBMIT_ATTEMPTS)]
    pub max_submit_attempts: usize,

    /// JSON file overriding the portal's element locators.
    #[arg(long)]
    pub selectors: Option<PathBuf>,
}

impl PortalArgs {
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn query_settings(&self) -> QuerySettings {
        QuerySettings {
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
            max_submit_attempts: self.max_submit_attempts.max(1),
        }
    }

    pub fn webdriver_config(&self) -> WebDriverConfig {
        WebDriverConfig {
            server_url: self.webdriver_url.clone(),
            headless: !self.show_browser,
            request_timeout: Duration::from_millis(self.wait_timeout_ms.max(1_000) * 6),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub portal: PortalArgs,

    #[arg(long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Process every spreadsheet in this directory, one run per file.
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TableChoice {
    Resolved,
    Unresolved,
}

impl TableChoice {
    pub fn table_name(self, tables: &LedgerTables) -> &str {
        match self {
            Self::Resolved => &tables.resolved,
            Self::Unresolved => &tables.unresolved,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RecheckArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub portal: PortalArgs,

    #[arg(long, value_enum, default_value_t = TableChoice::Unresolved)]
    pub table: TableChoice,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_enum)]
    pub table: TableChoice,

    #[arg(long)]
    pub output: PathBuf,
}
