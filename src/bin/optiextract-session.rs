use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Arg, Command};

use optiextract_client::config::ClientOptions;
use optiextract_client::routes::{RecordingNavigator, RouteOutcome};
use optiextract_client::session::{FileStore, LogNotifier};
use optiextract_client::OptiExtract;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init();

    let matches = Command::new("optiextract-session")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Manage an OptiExtract session stored on disk")
        .arg(
            Arg::new("store")
                .short('s')
                .long("store")
                .value_name("FILE")
                .help("Session storage file")
                .takes_value(true)
                .default_value("optiextract-storage.json"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("login")
                .about("Sign in and store the session")
                .arg(
                    Arg::new("email")
                        .long("email")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::new("password")
                        .long("password")
                        .takes_value(true)
                        .required(true),
                ),
        )
        .subcommand(Command::new("check").about("Run the session guard and show the profile"))
        .subcommand(Command::new("logout").about("Remove the stored session"))
        .get_matches();

    let store_path = PathBuf::from(matches.value_of("store").unwrap_or("optiextract-storage.json"));
    let options = ClientOptions::from_env()?.with_redirect_delay(Duration::ZERO);
    let client = OptiExtract::new(
        options,
        Arc::new(FileStore::new(&store_path)),
        Arc::new(LogNotifier),
        Arc::new(RecordingNavigator::new()),
    )?;

    match matches.subcommand() {
        Some(("login", sub)) => {
            let email = sub.value_of("email").context("missing --email")?;
            let password = sub.value_of("password").context("missing --password")?;
            client
                .sign_in(email, password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("Session stored in {}", store_path.display());
        }
        Some(("check", _)) => {
            let profile = client.profile();
            let outcome = client
                .protected_route()
                .enter(|| async move { profile.current().await })
                .await;
            match outcome {
                RouteOutcome::Rendered(Ok(user)) => {
                    println!("Signed in as {} <{}>", user.full_name(), user.email)
                }
                RouteOutcome::Rendered(Err(e)) => bail!("session valid, profile failed: {}", e),
                RouteOutcome::Redirected(route) => bail!("no valid session; go to {}", route.path()),
            }
        }
        Some(("logout", _)) => {
            client.sign_out()?;
            println!("Signed out");
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
