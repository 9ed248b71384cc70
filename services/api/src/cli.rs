use crate::demo::{run_auto_assign, run_demo, AutoAssignArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dormitory_allocation::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Dormitory Allocation",
    about = "Run and demonstrate the dormitory room allocation service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a sample campus through intake, payment, placement, and check-in
    Demo(DemoArgs),
    /// Place every unassigned first-year student from a roster into the room inventory
    AutoAssign(AutoAssignArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Room inventory CSV loaded into the store before serving
    #[arg(long)]
    pub(crate) inventory: Option<PathBuf>,
    /// Student roster CSV loaded into the store before serving
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
    /// Academic year registered with the default policy
    #[arg(long, default_value = crate::infra::DEFAULT_ACADEMIC_YEAR)]
    pub(crate) academic_year: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| {
        Command::Serve(ServeArgs {
            academic_year: crate::infra::DEFAULT_ACADEMIC_YEAR.to_string(),
            ..ServeArgs::default()
        })
    });

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::AutoAssign(args) => run_auto_assign(args),
    }
}
