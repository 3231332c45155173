use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use ngo_connect::auth::hash_password;
use ngo_connect::error::AppError;
use ngo_connect::marketplace::ServiceError;

#[derive(Parser, Debug)]
#[command(
    name = "NGO Connect",
    about = "Run the NGO Connect volunteer marketplace from the command line",
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
    /// Print an argon2 hash suitable for APP_ADMIN_PASSWORD_HASH
    HashPassword {
        /// Plain-text password to hash
        password: String,
    },
    /// Walk an NGO and a volunteer through the marketplace in-process
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::HashPassword { password } => {
            let hash = hash_password(&password).map_err(ServiceError::from)?;
            println!("{hash}");
            Ok(())
        }
        Command::Demo(args) => run_demo(args),
    }
}
