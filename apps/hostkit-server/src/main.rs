//! Hostkit server binary: loads a boot profile, assembles the host, and runs
//! it in daemon or batch-job mode.
//!
//! Feature loaders shipped with this binary are registered in
//! [`feature_catalog`]; boot profiles reference them by feature name.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use hostkit::bootstrap::{self, BootProfile, FeatureCatalog};
use hostkit::{BatchJobOutcome, MicroserviceHost};
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Debug, Parser)]
#[command(name = "hostkit-server", version, about = "Modular microservice host")]
struct CliArgs {
    /// Path to the YAML boot profile.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective boot profile as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Run the registered batch job instead of daemon mode, overriding the
    /// profile's `batch_job` flag.
    #[arg(long)]
    batch: bool,
}

/// Feature loaders compiled into this server.
///
/// Deployments embedding hostkit register their modules' loaders here;
/// the stock server ships an empty catalog.
fn feature_catalog() -> FeatureCatalog {
    FeatureCatalog::new()
}

fn load_profile(args: &CliArgs) -> anyhow::Result<BootProfile> {
    let mut profile = BootProfile::load(args.config.as_deref())?;
    // Bare invocations get a usable default identity; profiles loaded from a
    // file must name the microservice themselves (validation enforces it).
    if args.config.is_none() && profile.microservice_name.is_empty() {
        profile.microservice_name = "hostkit".to_owned();
    }
    Ok(profile)
}

async fn run(args: CliArgs) -> anyhow::Result<ExitCode> {
    let profile = load_profile(&args)?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&profile)?);
        return Ok(ExitCode::SUCCESS);
    }

    bootstrap::logging::init(profile.log_level);

    let batch_mode = args.batch || profile.batch_job;
    let catalog = feature_catalog();
    let config = profile.into_boot_configuration(&catalog)?.freeze()?;
    info!(
        microservice = config.microservice_name(),
        batch_mode, "boot configuration validated"
    );

    let host = MicroserviceHost::new(config);
    if batch_mode {
        match host.run_registered_batch_job().await {
            Ok(BatchJobOutcome::Completed) => Ok(ExitCode::SUCCESS),
            Ok(BatchJobOutcome::Canceled) => {
                info!("batch job canceled by operator");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                error!(error = %err, "batch job run failed");
                Ok(ExitCode::FAILURE)
            }
        }
    } else {
        match host.run_as_daemon().await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(err) => {
                error!(error = %err, "daemon run failed");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    run(CliArgs::parse()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> CliArgs {
        CliArgs::parse_from(argv)
    }

    #[test]
    fn bare_invocation_gets_a_default_identity() {
        let profile = load_profile(&args(&["hostkit-server"])).unwrap();
        assert_eq!(profile.microservice_name, "hostkit");
    }

    #[test]
    fn file_profiles_keep_their_own_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.yaml");
        std::fs::write(&path, "microservice_name: orders\n").unwrap();

        let profile = load_profile(&args(&[
            "hostkit-server",
            "--config",
            path.to_str().unwrap(),
        ]))
        .unwrap();
        assert_eq!(profile.microservice_name, "orders");
    }

    #[test]
    fn file_profiles_without_a_name_stay_unnamed() {
        // Validation rejects the empty name later; the CLI must not paper
        // over a misconfigured file.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.yaml");
        std::fs::write(&path, "log_level: error\n").unwrap();

        let profile = load_profile(&args(&[
            "hostkit-server",
            "--config",
            path.to_str().unwrap(),
        ]))
        .unwrap();
        assert!(profile.microservice_name.is_empty());
    }
}
