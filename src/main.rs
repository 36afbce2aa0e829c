//! Binary entry point for the pbmachine CLI.

mod cli;

use std::env;
use std::io::{self, Write};
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pbmachine::api::{DatacenterId, ServerId};
use pbmachine::{
    ApiError, ConfigError, Driver, DriverError, HttpCloudApi, Machine, MachineDriver,
    MachineStore, ProcessCommandRunner, ProfitBricksConfig, SshKeygen, StoreError,
};

use crate::cli::{Cli, Command, CreateCommand, MachineArg, SpecOverrides};

const LOG_ENV: &str = "PBMACHINE_LOG";
const STORE_DIR_NAME: &str = ".pbmachine";
const KEYS_DIR: &str = "keys";

type CliDriver = Driver<HttpCloudApi, SshKeygen<ProcessCommandRunner>>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("machine store error: {0}")]
    Store(#[from] StoreError),
    #[error("provider client error: {0}")]
    Client(#[from] ApiError),
    #[error("machine '{0}' already exists")]
    AlreadyExists(String),
    #[error("machine '{name}' was created ({resources}) but its record could not be saved: {source}")]
    Unrecorded {
        name: String,
        resources: String,
        source: StoreError,
    },
    #[error("cannot locate the store directory: pass --store-dir or set HOME")]
    NoStoreDir,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli, &mut io::stdout()) {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn dispatch(cli: Cli, out: &mut impl Write) -> Result<(), CliError> {
    let root = resolve_store_dir(cli.store_dir, env::var("HOME").ok())?;
    let mut config = ProfitBricksConfig::load_without_cli_args()?;
    let store = MachineStore::new(root.clone());

    match cli.command {
        Command::Create(args) => create(&mut config, &root, &store, args, out),
        Command::Check(overrides) => {
            apply_overrides(&mut config, overrides);
            let spec = config.as_spec()?;
            build_driver(&config, &root)?.pre_create_check(&spec)?;
            writeln!(out, "ok").ok();
            Ok(())
        }
        Command::Start(arg) => {
            with_machine(&config, &root, &store, &arg, |driver, machine| driver.start(machine))
        }
        Command::Stop(arg) => {
            with_machine(&config, &root, &store, &arg, |driver, machine| driver.stop(machine))
        }
        Command::Restart(arg) => {
            with_machine(&config, &root, &store, &arg, |driver, machine| driver.restart(machine))
        }
        Command::Kill(arg) => {
            with_machine(&config, &root, &store, &arg, |driver, machine| driver.kill(machine))
        }
        Command::Remove(arg) => remove(&config, &root, &store, &arg),
        Command::Ip(arg) => print_with(&config, &root, &store, &arg, out, |driver, machine| {
            driver.get_ip(machine)
        }),
        Command::State(arg) => print_with(&config, &root, &store, &arg, out, |driver, machine| {
            driver.get_state(machine).map(|state| state.to_string())
        }),
        Command::Url(arg) => print_with(&config, &root, &store, &arg, out, |driver, machine| {
            driver.get_url(machine)
        }),
    }
}

fn resolve_store_dir(
    explicit: Option<String>,
    home: Option<String>,
) -> Result<Utf8PathBuf, CliError> {
    explicit
        .filter(|dir| !dir.trim().is_empty())
        .map(Utf8PathBuf::from)
        .or_else(|| home.map(|dir| Utf8PathBuf::from(dir).join(STORE_DIR_NAME)))
        .ok_or(CliError::NoStoreDir)
}

fn apply_overrides(config: &mut ProfitBricksConfig, overrides: SpecOverrides) {
    if let Some(location) = overrides.location {
        config.location = location;
    }
    if let Some(image) = overrides.image {
        config.image = image;
    }
    if let Some(disk_type) = overrides.disk_type {
        config.disk_type = disk_type;
    }
    if let Some(disk_size) = overrides.disk_size {
        config.disk_size = disk_size;
    }
    if let Some(ram) = overrides.ram {
        config.ram = ram;
    }
    if let Some(cores) = overrides.cores {
        config.cores = cores;
    }
    if let Some(cpu_family) = overrides.cpu_family {
        config.cpu_family = cpu_family;
    }
    if let Some(datacenter_id) = overrides.datacenter_id {
        config.datacenter_id = Some(datacenter_id);
    }
    if let Some(strategy) = overrides.server_strategy {
        config.server_strategy = strategy;
    }
}

fn machine_name(requested: Option<String>) -> String {
    requested
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("pbmachine-{}", Uuid::new_v4()))
}

fn build_driver(config: &ProfitBricksConfig, root: &Utf8Path) -> Result<CliDriver, CliError> {
    let credentials = config.credentials()?;
    let api = HttpCloudApi::new(&config.endpoint, credentials.clone())?;
    let keys = SshKeygen::new(root.join(KEYS_DIR), ProcessCommandRunner);
    Ok(Driver::new(api, credentials, keys))
}

fn create(
    config: &mut ProfitBricksConfig,
    root: &Utf8Path,
    store: &MachineStore,
    args: CreateCommand,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let name = machine_name(args.name);
    if store.exists(&name)? {
        return Err(CliError::AlreadyExists(name));
    }
    apply_overrides(config, args.overrides);
    let spec = config.as_spec()?;
    let driver = build_driver(config, root)?;

    let mut machine = Machine::new(name.as_str());
    driver.create(&mut machine, &spec)?;
    let path = record_created(store, &machine)?;
    info!(machine = name.as_str(), record = path.as_str(), "machine created");
    writeln!(out, "{name}").ok();
    Ok(())
}

/// Saves a freshly created machine. On failure the provider identifiers are
/// logged and carried in the error so the resources can be found by hand.
fn record_created(store: &MachineStore, machine: &Machine) -> Result<Utf8PathBuf, CliError> {
    store.save(machine).map_err(|source| {
        let resources = describe_resources(machine);
        error!(
            machine = machine.name.as_str(),
            resources = resources.as_str(),
            "created machine could not be recorded"
        );
        CliError::Unrecorded {
            name: machine.name.clone(),
            resources,
            source,
        }
    })
}

fn describe_resources(machine: &Machine) -> String {
    format!(
        "datacenter {}, server {}, address {}",
        machine.datacenter_id.as_ref().map_or("-", DatacenterId::as_str),
        machine.server_id.as_ref().map_or("-", ServerId::as_str),
        machine.ip_address.as_deref().unwrap_or("-"),
    )
}

fn remove(
    config: &ProfitBricksConfig,
    root: &Utf8Path,
    store: &MachineStore,
    arg: &MachineArg,
) -> Result<(), CliError> {
    let mut machine = store.load(&arg.name)?;
    build_driver(config, root)?.remove(&mut machine)?;
    store.delete(&arg.name)?;
    Ok(())
}

/// Runs `operation` on a stored machine and saves the record when it
/// changed.
fn with_machine<T, F>(
    config: &ProfitBricksConfig,
    root: &Utf8Path,
    store: &MachineStore,
    arg: &MachineArg,
    operation: F,
) -> Result<T, CliError>
where
    F: FnOnce(&CliDriver, &mut Machine) -> Result<T, DriverError>,
{
    let mut machine = store.load(&arg.name)?;
    let before = machine.clone();
    let driver = build_driver(config, root)?;
    let value = operation(&driver, &mut machine)?;
    if machine != before {
        store.save(&machine)?;
    }
    Ok(value)
}

fn print_with<F>(
    config: &ProfitBricksConfig,
    root: &Utf8Path,
    store: &MachineStore,
    arg: &MachineArg,
    out: &mut impl Write,
    query: F,
) -> Result<(), CliError>
where
    F: FnOnce(&CliDriver, &mut Machine) -> Result<String, DriverError>,
{
    let rendered = with_machine(config, root, store, arg, query)?;
    writeln!(out, "{rendered}").ok();
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
