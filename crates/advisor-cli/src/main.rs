//! advisor: command-line client for the Advisor reports API.
//!
//! Reads ADVISOR_API_URL and ADVISOR_API_TOKEN (a JWT access token or the master key).
//! `advisor login` prints an access token to export as ADVISOR_API_TOKEN.

use advisor_api_client::{ApiClient, GenerateOutcome};
use advisor_cli::{client_rows, init_tracing, print_json, report_rows};
use advisor_core::models::{
    ClientListQuery, CreateClientRequest, CreateReportRequest, GenerateReportRequest,
    ReportFormat, ReportListQuery, ReportType,
};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "advisor", about = "Advisor reports API CLI", version)]
struct Cli {
    /// API base URL
    #[arg(long, env = "ADVISOR_API_URL", default_value = "http://localhost:8000", global = true)]
    api_url: String,

    /// Bearer token
    #[arg(long, env = "ADVISOR_API_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Print tables instead of JSON for list commands
    #[arg(long, global = true)]
    table: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange email and password for an access token
    Login {
        #[arg(long)]
        email: String,
        /// Read from ADVISOR_PASSWORD when omitted
        #[arg(long, env = "ADVISOR_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Show the authenticated user
    Whoami,
    /// Client operations
    Clients {
        #[command(subcommand)]
        sub: ClientCommands,
    },
    /// Report operations
    Reports {
        #[command(subcommand)]
        sub: ReportCommands,
    },
    /// Background task operations
    Tasks {
        #[command(subcommand)]
        sub: TaskCommands,
    },
    /// Portfolio analytics
    Analytics {
        #[command(subcommand)]
        sub: AnalyticsCommands,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// List clients
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        page_size: Option<i64>,
    },
    /// Create a client
    Create {
        /// Company name
        name: String,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        contact_person: Option<String>,
        #[arg(long)]
        contact_email: Option<String>,
        /// Azure subscription ID; repeat for several
        #[arg(long = "subscription")]
        subscriptions: Vec<String>,
    },
    /// Show one client
    Get { id: Uuid },
    /// Recommendation and savings statistics for a client
    Stats { id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    Detailed,
    Executive,
    Cost,
    Security,
    Operations,
}

impl From<TypeArg> for ReportType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Detailed => ReportType::Detailed,
            TypeArg::Executive => ReportType::Executive,
            TypeArg::Cost => ReportType::Cost,
            TypeArg::Security => ReportType::Security,
            TypeArg::Operations => ReportType::Operations,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Csv,
    Html,
    Pdf,
}

impl From<FormatArg> for ReportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => ReportFormat::Csv,
            FormatArg::Html => ReportFormat::Html,
            FormatArg::Pdf => ReportFormat::Pdf,
        }
    }
}

#[derive(Subcommand)]
enum ReportCommands {
    /// List reports
    List {
        #[arg(long)]
        client: Option<Uuid>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<i64>,
        #[arg(long)]
        page_size: Option<i64>,
    },
    /// Create a report for a client
    Create {
        #[arg(long)]
        client: Uuid,
        #[arg(long = "type", value_enum, default_value = "detailed")]
        report_type: TypeArg,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        template: Option<Uuid>,
    },
    /// Show one report
    Get { id: Uuid },
    /// Upload an Azure Advisor CSV export
    Upload { id: Uuid, file: PathBuf },
    /// Generate the report outputs
    Generate {
        id: Uuid,
        /// Output format; repeat for several (default: html and pdf)
        #[arg(long = "format", value_enum)]
        formats: Vec<FormatArg>,
        /// Queue the work instead of waiting for it
        #[arg(long = "async")]
        run_async: bool,
        /// With --async, poll until the report settles
        #[arg(long, requires = "run_async")]
        wait: bool,
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "600")]
        wait_timeout: u64,
    },
    /// Processing status, retries and the latest task
    Status { id: Uuid },
    /// Cancel an in-flight report
    Cancel { id: Uuid },
    /// Download a generated file
    Download {
        id: Uuid,
        #[arg(value_enum)]
        format: FormatArg,
        /// Destination file (default: report-<id>.<format>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Show one task
    Get { id: Uuid },
    /// List recent tasks, optionally for one report
    List {
        #[arg(long)]
        report: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum AnalyticsCommands {
    /// Portfolio-wide totals
    Dashboard,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut client =
        ApiClient::new(cli.api_url.clone(), None).context("Failed to create API client")?;
    if let Some(token) = cli.token.clone() {
        client = client.with_token(token);
    }

    match cli.command {
        Commands::Login { email, password } => {
            let tokens = client.login(&email, &password).await?;
            if cli.table {
                println!("export ADVISOR_API_TOKEN={}", tokens.access_token);
            } else {
                print_json(&tokens)?;
            }
        }
        Commands::Whoami => print_json(&client.me().await?)?,
        Commands::Clients { sub } => run_clients(&client, sub, cli.table).await?,
        Commands::Reports { sub } => run_reports(&client, sub, cli.table).await?,
        Commands::Tasks { sub } => match sub {
            TaskCommands::Get { id } => print_json(&client.get_task(id).await?)?,
            TaskCommands::List { report } => print_json(&client.list_tasks(report).await?)?,
        },
        Commands::Analytics { sub } => match sub {
            AnalyticsCommands::Dashboard => print_json(&client.dashboard().await?)?,
        },
    }

    Ok(())
}

async fn run_clients(client: &ApiClient, sub: ClientCommands, table: bool) -> anyhow::Result<()> {
    match sub {
        ClientCommands::List {
            search,
            industry,
            page,
            page_size,
        } => {
            let filter = ClientListQuery {
                search,
                industry,
                ..Default::default()
            };
            let clients = client.list_clients(&filter, page, page_size).await?;
            if table {
                client_rows(&clients.results)
                    .iter()
                    .for_each(|row| println!("{}", row));
                println!("{} of {} clients", clients.results.len(), clients.count);
            } else {
                print_json(&clients)?;
            }
        }
        ClientCommands::Create {
            name,
            industry,
            contact_person,
            contact_email,
            subscriptions,
        } => {
            let request = CreateClientRequest {
                company_name: name,
                industry,
                contact_person,
                contact_email,
                contact_phone: None,
                azure_subscription_ids: subscriptions,
                status: Default::default(),
                notes: None,
            };
            print_json(&client.create_client(&request).await?)?;
        }
        ClientCommands::Get { id } => print_json(&client.get_client(id).await?)?,
        ClientCommands::Stats { id } => print_json(&client.client_statistics(id).await?)?,
    }
    Ok(())
}

async fn run_reports(client: &ApiClient, sub: ReportCommands, table: bool) -> anyhow::Result<()> {
    match sub {
        ReportCommands::List {
            client: client_id,
            search,
            page,
            page_size,
        } => {
            let filter = ReportListQuery {
                client_id,
                search,
                ..Default::default()
            };
            let reports = client.list_reports(&filter, page, page_size).await?;
            if table {
                report_rows(&reports.results)
                    .iter()
                    .for_each(|row| println!("{}", row));
                println!("{} of {} reports", reports.results.len(), reports.count);
            } else {
                print_json(&reports)?;
            }
        }
        ReportCommands::Create {
            client: client_id,
            report_type,
            title,
            template,
        } => {
            let request = CreateReportRequest {
                client_id,
                report_type: report_type.into(),
                title,
                template_id: template,
            };
            print_json(&client.create_report(&request).await?)?;
        }
        ReportCommands::Get { id } => print_json(&client.get_report(id).await?)?,
        ReportCommands::Upload { id, file } => print_json(&client.upload_csv(id, &file).await?)?,
        ReportCommands::Generate {
            id,
            formats,
            run_async,
            wait,
            wait_timeout,
        } => {
            if formats.contains(&FormatArg::Csv) {
                anyhow::bail!("CSV is the uploaded source and cannot be generated");
            }
            let request = GenerateReportRequest {
                run_async,
                formats: (!formats.is_empty())
                    .then(|| formats.into_iter().map(ReportFormat::from).collect()),
            };
            match client.generate_report(id, &request).await? {
                GenerateOutcome::Queued(accepted) if wait => {
                    eprintln!("Queued task {}; waiting for the report", accepted.task_id);
                    let report = client
                        .wait_for_report(
                            id,
                            Duration::from_secs(2),
                            Duration::from_secs(wait_timeout),
                        )
                        .await?;
                    print_json(&report)?;
                }
                outcome => print_json(&outcome)?,
            }
        }
        ReportCommands::Status { id } => print_json(&client.report_status(id).await?)?,
        ReportCommands::Cancel { id } => print_json(&client.cancel_report(id).await?)?,
        ReportCommands::Download { id, format, output } => {
            let format = ReportFormat::from(format);
            let data = client.download_report(id, format).await?;
            let path =
                output.unwrap_or_else(|| PathBuf::from(format!("report-{}.{}", id, format)));
            tokio::fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {} bytes to {}", data.len(), path.display());
        }
    }
    Ok(())
}
