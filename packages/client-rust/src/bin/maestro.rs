//! Command-line access to a Maestro backend.
//!
//! Usage:
//!   maestro list empleados --search ana --sort nombre --desc
//!   maestro details contratos 42
//!   maestro options cargos

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use maestro_client::{
    ClientConfig, GridStateHandle, HttpApi, MasterController, MasterDetailController,
    NoopNavigator, OptionResolver, RestApi, TracingNotifier,
};
use maestro_core::query::{SortOrder, Sorter};
use maestro_core::table::{TableModel, TableOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "maestro")]
#[command(about = "Browse metadata-driven HR tables and master-detail records")]
struct Cli {
    /// REST API root
    #[arg(long, env = "MAESTRO_BASE_URL", default_value = "http://localhost:8000/api")]
    base_url: String,

    /// Bearer token
    #[arg(long, env = "MAESTRO_TOKEN")]
    token: Option<String>,

    /// Company scope sent with list queries
    #[arg(long, env = "MAESTRO_RUT_COMPANY")]
    rut_company: Option<String>,

    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one page of a master table as tab-separated text
    List {
        path: String,
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long)]
        page_size: Option<u64>,
        #[arg(long)]
        search: Option<String>,
        /// Column to sort by
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, requires = "sort")]
        desc: bool,
    },
    /// Print a master-detail record: header values, then each detail tab
    Details { path: String, id: String },
    /// Print the options of a remote select
    Options { api_ref: String },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_rows(rows: &[Vec<String>]) {
    for line in rows {
        println!("{}", line.join("\t"));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = ClientConfig {
        base_url: cli.base_url,
        token: cli.token,
        rut_company: cli.rut_company,
        request_timeout: Duration::from_secs(cli.timeout_secs),
        ..ClientConfig::default()
    };
    let api: Arc<dyn RestApi> = Arc::new(HttpApi::new(&config)?);
    let options = Arc::new(OptionResolver::new(api.clone()));
    let table_options = TableOptions { files: config.files(), edition_disabled: true, ..TableOptions::default() };

    match cli.command {
        Command::List { path, page, page_size, search, sort, desc } => {
            let grid = GridStateHandle::isolated(config.grid_state());
            grid.update(|s| {
                if let Some(size) = page_size {
                    s.change_page(1, size);
                }
                s.change_page(page, s.pagination.page_size);
                s.search = search;
                s.sorter = sort.map(|field| Sorter {
                    field,
                    order: if desc { SortOrder::Descend } else { SortOrder::Ascend },
                });
            });
            let controller = MasterController::new(
                path.as_str(),
                api,
                Arc::new(TracingNotifier),
                Arc::new(NoopNavigator),
                grid,
            )
            .with_rut_company(config.rut_company.clone())
            .with_options(options);
            controller
                .load()
                .await
                .with_context(|| format!("listing {path}"))?;
            let page = controller.page();
            print_rows(&controller.table(table_options).export_rows(&page.rows));
            eprintln!("{} of {} rows", page.rows.len(), page.total);
        }
        Command::Details { path, id } => {
            let controller = MasterDetailController::new(
                path.as_str(),
                api,
                Arc::new(TracingNotifier),
                Arc::new(NoopNavigator),
            )
            .with_options(options);
            controller
                .open(&id)
                .await
                .with_context(|| format!("opening {path}/{id}"))?;
            let session = controller.snapshot();
            for (field, value) in session.header().iter() {
                println!("{field}\t{}", value.display(None));
            }
            for tab in session.tabs() {
                println!("\n[{}]", tab.title);
                let table = TableModel::derive(&tab.structure, &tab.rows, table_options.clone());
                print_rows(&table.export_rows(&tab.rows));
            }
        }
        Command::Options { api_ref } => {
            let resolved = options
                .resolve(&api_ref)
                .await
                .with_context(|| format!("resolving {api_ref}"))?;
            for option in resolved {
                println!("{}\t{}", option.value, option.label);
            }
        }
    }
    Ok(())
}
