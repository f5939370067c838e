use std::{
    io,
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use kregen::{
    Change, Error, Kind, Lifecycle, Outcome, Report, Request, SizeRequest,
    backup::FileBackupStore,
    client::KubeControlPlane,
    config::Config,
    poll::Poller,
    prompt::{AssumeYes, Prompter, Terminal},
    transform::{EnvUpsert, ValueEncoding},
};
use tracing_subscriber::EnvFilter;

/// Regenerate a Kubernetes Job or StatefulSet with modified configuration.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct GlobalArgs {
    /// Directory StatefulSet backups are written to
    #[arg(long, env = "KREGEN_BACKUP_DIR", default_value = ".", global = true)]
    backup_dir: PathBuf,
    /// Field manager used for server-side apply
    #[arg(long, env = "KREGEN_FIELD_MANAGER", default_value = "kregen", global = true)]
    field_manager: String,
    #[arg(long, env = "KREGEN_POLL_INTERVAL_SECS", default_value_t = 10, global = true)]
    poll_interval_secs: u64,
    /// How long to wait for a deleted object to disappear
    #[arg(long, env = "KREGEN_DELETE_TIMEOUT_SECS", default_value_t = 60, global = true)]
    delete_timeout_secs: u64,
    /// Default filter directive, `RUST_LOG` takes precedence
    #[arg(long, env = "KREGEN_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
    #[arg(long, value_enum, default_value_t = LogFormat::Compact, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnvEncoding {
    /// Treat values containing whitespace as token sets
    Auto,
    Scalar,
    TokenSet,
}

impl EnvEncoding {
    fn encoding(self) -> Option<ValueEncoding> {
        match self {
            EnvEncoding::Auto => None,
            EnvEncoding::Scalar => Some(ValueEncoding::Scalar),
            EnvEncoding::TokenSet => Some(ValueEncoding::TokenSet),
        }
    }
}

#[derive(clap::Subcommand)]
enum Command {
    /// Recreate a Job on the `latest` image, optionally upserting an environment variable
    Job {
        #[arg(long, alias = "job-name")]
        name: String,
        #[arg(long)]
        namespace: String,
        #[arg(long, requires = "env_var_value")]
        env_var_name: Option<String>,
        #[arg(long, requires = "env_var_name")]
        env_var_value: Option<String>,
        #[arg(long, value_enum, default_value_t = EnvEncoding::Auto)]
        env_encoding: EnvEncoding,
        /// Watch the recreated Job until it finishes
        #[arg(long)]
        monitor: bool,
        /// Monitoring timeout in minutes
        #[arg(long, default_value_t = 10)]
        timeout: u64,
        #[arg(long)]
        dry_run: bool,
    },
    /// Recreate a StatefulSet without restarting its pods, optionally resizing its volume claims
    StatefulSet {
        #[arg(long, alias = "statefulset-name")]
        name: String,
        #[arg(long)]
        namespace: String,
        /// New storage request for every volume claim template; prompted for when omitted
        #[arg(long)]
        new_pv_size: Option<String>,
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

impl GlobalArgs {
    fn config(&self) -> Config {
        Config {
            backup_dir: self.backup_dir.clone(),
            field_manager: self.field_manager.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            delete_timeout: Duration::from_secs(self.delete_timeout_secs),
        }
    }
}

fn init_tracing(args: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    match args.log_format {
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.global);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let Some(err) = err.downcast_ref::<Error>() else {
                return ExitCode::FAILURE;
            };

            if let Error::RecreateFailed { id, backup, .. } = err {
                match backup {
                    Some(backup) => eprintln!(
                        "`{id}` no longer exists in the cluster; restore it with `kubectl apply -f {}`",
                        backup.display()
                    ),
                    None => eprintln!(
                        "`{id}` no longer exists in the cluster and no backup was taken; recreate it by hand"
                    ),
                }
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.global.config();
    let (request, mut prompter) = request(args.command, &config)?;

    let control_plane = KubeControlPlane::new(&config).await?;
    let backups = FileBackupStore::new(&config.backup_dir);
    let outcome = Lifecycle::new(&control_plane, &backups, prompter.as_mut())
        .run(&request)
        .await?;

    render(&outcome, &mut io::stdout().lock()).context("writing report")
}

fn request(command: Command, config: &Config) -> kregen::Result<(Request, Box<dyn Prompter>)> {
    match command {
        Command::Job {
            name,
            namespace,
            env_var_name,
            env_var_value,
            env_encoding,
            monitor,
            timeout,
            dry_run,
        } => {
            let env = EnvUpsert::from_pair(env_var_name, env_var_value)?
                .map(|env| env.with_encoding(env_encoding.encoding()));
            let monitor = monitor.then(|| {
                Poller::new(Duration::from_secs(timeout * 60)).with_interval(config.poll_interval)
            });
            let request = Request {
                dry_run,
                latest_tag: true,
                env,
                monitor,
                ..Request::new(Kind::Job, name, namespace)
            };
            let prompter: Box<dyn Prompter> = Box::new(Terminal);
            Ok((request, prompter))
        }
        Command::StatefulSet {
            name,
            namespace,
            new_pv_size,
            dry_run,
            yes,
        } => {
            let request = Request {
                dry_run,
                volume: new_pv_size.map_or(SizeRequest::Ask, SizeRequest::Set),
                ..Request::new(Kind::StatefulSet, name, namespace)
            };
            let prompter: Box<dyn Prompter> = if yes {
                Box::new(AssumeYes)
            } else {
                Box::new(Terminal)
            };
            Ok((request, prompter))
        }
    }
}

fn render(outcome: &Outcome, out: &mut impl io::Write) -> anyhow::Result<()> {
    match outcome {
        Outcome::DryRun(report) => {
            kregen::yaml::to_writer(&mut *out, &report.descriptor)?;
            writeln!(out, "# dry run, no changes were made")?;
            write_backup(report, out)?;
            writeln!(
                out,
                "# would delete {} with {} propagation",
                report.id, report.propagation
            )?;
            writeln!(out, "# would apply the descriptor above")?;
            write_changes(report, out)?;
        }
        Outcome::Recreated(report) => {
            write_backup(report, out)?;
            writeln!(out, "recreated {}", report.id)?;
            write_changes(report, out)?;
            if !report.orphaned_pods.is_empty() {
                writeln!(out, "pods kept running: {}", report.orphaned_pods.join(", "))?;
            }
            if let Some(poll) = report.poll {
                writeln!(out, "job {poll}")?;
            }
        }
        Outcome::Cancelled(report) => {
            write_backup(report, out)?;
            writeln!(out, "cancelled, {} was left untouched", report.id)?;
        }
    }
    Ok(())
}

fn write_backup(report: &Report, out: &mut impl io::Write) -> io::Result<()> {
    match &report.backup {
        Some(backup) => writeln!(out, "# backup written to {}", backup.display()),
        None => Ok(()),
    }
}

fn write_changes(report: &Report, out: &mut impl io::Write) -> io::Result<()> {
    let changes = report
        .changes
        .iter()
        .filter(|change| !matches!(change, Change::Stripped { .. }));
    for change in changes {
        writeln!(out, "# {change}")?;
    }
    Ok(())
}
