// file: src/main.rs
// version: 1.2.0
// guid: c5d7e9f1-6a8b-4203-b4d6-f7a9b1c3d5e7

//! meshctl - Main entry point

use clap::Parser;
use meshctl::{
    cli::{
        args::{Cli, Commands, HostCommands, RemoteCommands},
        commands::*,
    },
    logging::logger,
    Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logger::init_logger(cli.verbose, cli.quiet)?;

    match cli.command {
        Commands::Status => status_command().await,
        Commands::Host { command } => match command {
            HostCommands::Add {
                name,
                ip,
                port,
                user,
                no_ssh,
            } => host_add_command(&name, &ip, port, user, no_ssh).await,
            HostCommands::Remove { name, keep_ssh } => {
                host_remove_command(&name, keep_ssh).await
            }
            HostCommands::List => host_list_command().await,
            HostCommands::Status { name } => host_status_command(&name).await,
        },
        Commands::Remote { command } => match command {
            RemoteCommands::Provision {
                host,
                port,
                server,
                user,
                skip_syncthing,
                force,
            } => remote_provision_command(&host, port, server, &user, skip_syncthing, force).await,
            RemoteCommands::ProvisionAll {
                server,
                user,
                skip_syncthing,
                force,
            } => remote_provision_all_command(server, &user, skip_syncthing, force).await,
            RemoteCommands::Status { host, port } => remote_status_command(&host, port).await,
            RemoteCommands::Prepare { host, port } => remote_prepare_command(&host, port).await,
        },
    }
}
