use std::process::ExitCode;
use std::time::Instant;

use camino::Utf8Path;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use beneuro_data::app::{App, ProgressSink, ProgressSinkKind, SyncResult, ValidateResult};
use beneuro_data::config::{ConfigLoader, ResolvedConfig};
use beneuro_data::domain::{Modality, ModalityFlags, ModalitySelection};
use beneuro_data::error::BndError;
use beneuro_data::inspect::InspectPolicy;
use beneuro_data::output::{JsonOutput, OutputMode, TextOutput};
use beneuro_data::sync::{CompareMode, SyncOptions};
use beneuro_data::tui::{Tui, summary_line};

#[derive(Parser)]
#[command(name = "bnd")]
#[command(about = "Validate raw experiment sessions and sync them between the local and remote roots")]
#[command(version, author)]
struct Cli {
    /// Config file (default: $BND_CONFIG, then the user config dir)
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    non_interactive: bool,

    /// Report every problem instead of stopping at the first one
    #[arg(long, global = true)]
    all_problems: bool,

    /// Skip the confirmation before transfers
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate one session folder")]
    ValidateSession(SessionArgs),
    #[command(about = "Validate the last local session of a subject")]
    ValidateLast(SubjectArgs),
    #[command(about = "Validate every local session recorded today")]
    ValidateToday(TodayArgs),
    #[command(about = "Validate every local session of a subject")]
    ValidateSessions(SubjectArgs),
    #[command(about = "List local sessions recorded today with their size")]
    ListToday(ListTodayArgs),
    #[command(about = "Rename videos to <session>_cameras/<session>_camera_<i>.avi")]
    RenameVideos(RenameArgs),
    #[command(about = "Prefix comment and other extra files with the session name")]
    RenameExtraFiles(RenameArgs),
    #[command(about = "Upload a local session to the remote root")]
    UploadSession(UploadArgs),
    #[command(about = "Upload the last local session of a subject")]
    UploadLast(UploadLastArgs),
    #[command(about = "Download a remote session to the local root")]
    DownloadSession(DownloadArgs),
    #[command(about = "Download the last remote session of a subject")]
    DownloadLast(DownloadLastArgs),
    #[command(about = "Print the resolved config")]
    ShowConfig,
    #[command(about = "Write a new config file")]
    Init(InitArgs),
}

#[derive(Args, Clone, Copy, Default)]
struct ModalityArgs {
    #[arg(long)]
    check_behavior: bool,
    #[arg(long)]
    ignore_behavior: bool,
    #[arg(long)]
    check_ephys: bool,
    #[arg(long)]
    ignore_ephys: bool,
    #[arg(long)]
    check_videos: bool,
    #[arg(long)]
    ignore_videos: bool,
}

impl ModalityArgs {
    fn selection(self) -> Result<ModalitySelection, BndError> {
        ModalitySelection::from_flags(ModalityFlags {
            check_behavior: self.check_behavior,
            ignore_behavior: self.ignore_behavior,
            check_ephys: self.check_ephys,
            ignore_ephys: self.ignore_ephys,
            check_videos: self.check_videos,
            ignore_videos: self.ignore_videos,
        })
    }
}

#[derive(Args)]
struct SessionArgs {
    session_path: String,
    subject: String,
    #[command(flatten)]
    modalities: ModalityArgs,
}

#[derive(Args)]
struct SubjectArgs {
    subject: String,
    #[command(flatten)]
    modalities: ModalityArgs,
}

#[derive(Args)]
struct TodayArgs {
    subject: Option<String>,
    #[command(flatten)]
    modalities: ModalityArgs,
}

#[derive(Args)]
struct ListTodayArgs {
    subject: Option<String>,
}

#[derive(Args)]
struct RenameArgs {
    session_path: String,
    subject: String,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Clone, Copy)]
struct TransferArgs {
    #[command(flatten)]
    modalities: ModalityArgs,
    #[arg(long, value_enum, default_value_t = CompareMode::Content)]
    compare: CompareMode,
}

#[derive(Args, Clone, Copy)]
struct UploadFlags {
    #[command(flatten)]
    transfer: TransferArgs,
    /// Do not rename videos before validating
    #[arg(long)]
    no_rename_videos: bool,
    /// Do not rename extra files before validating
    #[arg(long)]
    no_rename_extra_files: bool,
}

impl UploadFlags {
    fn options(self) -> Result<SyncOptions, BndError> {
        let selection = self.transfer.modalities.selection()?;
        Ok(SyncOptions {
            rename_videos_first: !self.no_rename_videos && selection.contains(Modality::Video),
            rename_extra_files_first: !self.no_rename_extra_files,
            compare: self.transfer.compare,
            selection,
        })
    }
}

impl TransferArgs {
    fn download_options(self) -> Result<SyncOptions, BndError> {
        Ok(SyncOptions {
            selection: self.modalities.selection()?,
            rename_videos_first: false,
            rename_extra_files_first: false,
            compare: self.compare,
        })
    }
}

/// Modality selection and transfer options parsed from the command's flags.
#[derive(Debug)]
enum Prepared {
    Selection(ModalitySelection),
    Sync(SyncOptions),
    Bare,
}

impl Prepared {
    fn selection(self) -> ModalitySelection {
        match self {
            Prepared::Selection(selection) => selection,
            Prepared::Sync(options) => options.selection,
            Prepared::Bare => ModalitySelection::all(),
        }
    }

    fn sync_options(self) -> SyncOptions {
        match self {
            Prepared::Sync(options) => options,
            Prepared::Selection(selection) => SyncOptions {
                selection,
                ..SyncOptions::default()
            },
            Prepared::Bare => SyncOptions::default(),
        }
    }
}

impl Commands {
    fn prepare(&self) -> Result<Prepared, BndError> {
        Ok(match self {
            Commands::ValidateSession(args) => Prepared::Selection(args.modalities.selection()?),
            Commands::ValidateLast(args) | Commands::ValidateSessions(args) => {
                Prepared::Selection(args.modalities.selection()?)
            }
            Commands::ValidateToday(args) => Prepared::Selection(args.modalities.selection()?),
            Commands::UploadSession(args) => Prepared::Sync(args.flags.options()?),
            Commands::UploadLast(args) => Prepared::Sync(args.flags.options()?),
            Commands::DownloadSession(args) => Prepared::Sync(args.transfer.download_options()?),
            Commands::DownloadLast(args) => Prepared::Sync(args.transfer.download_options()?),
            Commands::ListToday(_)
            | Commands::RenameVideos(_)
            | Commands::RenameExtraFiles(_)
            | Commands::ShowConfig
            | Commands::Init(_) => Prepared::Bare,
        })
    }
}

/// Flags are checked before the config file is read.
fn startup(cli: &Cli) -> Result<(Prepared, ResolvedConfig), BndError> {
    let prepared = cli.command.prepare()?;
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    Ok((prepared, config))
}

#[derive(Args)]
struct UploadArgs {
    session_path: String,
    subject: String,
    #[command(flatten)]
    flags: UploadFlags,
}

#[derive(Args)]
struct UploadLastArgs {
    subject: String,
    #[command(flatten)]
    flags: UploadFlags,
}

#[derive(Args)]
struct DownloadArgs {
    session_path: String,
    subject: String,
    #[command(flatten)]
    transfer: TransferArgs,
}

#[derive(Args)]
struct DownloadLastArgs {
    subject: String,
    #[command(flatten)]
    transfer: TransferArgs,
}

#[derive(Args)]
struct InitArgs {
    #[arg(long)]
    local_path: String,
    #[arg(long)]
    remote_path: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(bnd) = report.downcast_ref::<BndError>() {
            return ExitCode::from(map_exit_code(bnd));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BndError) -> u8 {
    match error {
        BndError::MissingConfig(_)
        | BndError::ConfigRead(_)
        | BndError::ConfigParse(_)
        | BndError::InvalidConfig(_)
        | BndError::ConflictingModalityFlags(_)
        | BndError::NoModalitiesSelected
        | BndError::MalformedSessionName(_)
        | BndError::SubjectMismatch { .. }
        | BndError::NoSessionsFound { .. }
        | BndError::OutsideStorageRoot(_)
        | BndError::UnsupportedProcessingLevel(_)
        | BndError::NotRawSession { .. }
        | BndError::MissingDirectory(_) => 2,
        BndError::ValidationFailed { .. } => 3,
        BndError::AlreadyExists(_) | BndError::VerificationFailed { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let policy = if cli.all_problems {
        InspectPolicy::CollectAll
    } else {
        InspectPolicy::FirstProblem
    };

    if let Commands::Init(args) = &cli.command {
        let (path, resolved) =
            ConfigLoader::init(cli.config.as_deref(), &args.local_path, &args.remote_path)?;
        match output_mode {
            OutputMode::NonInteractive => JsonOutput::print_json(&resolved).into_diagnostic()?,
            OutputMode::Interactive => println!("wrote config to {}", path.display()),
        }
        return Ok(());
    }

    let (prepared, config) = startup(&cli)?;
    let app = App::new(config, policy);
    let confirm = matches!(output_mode, OutputMode::Interactive) && !cli.yes;

    match cli.command {
        Commands::ValidateSession(args) => {
            let selection = prepared.selection();
            let result = app.validate_session(
                Utf8Path::new(&args.session_path),
                &args.subject,
                &selection,
                sink(output_mode),
            )?;
            print_validate(output_mode, &result)?;
            fail_if_invalid(&result)
        }
        Commands::ValidateLast(args) => {
            let selection = prepared.selection();
            let result = app.validate_last(&args.subject, &selection, sink(output_mode))?;
            print_validate(output_mode, &result)?;
            fail_if_invalid(&result)
        }
        Commands::ValidateToday(args) => {
            let selection = prepared.selection();
            let result =
                app.validate_today(args.subject.as_deref(), &selection, sink(output_mode))?;
            print_validate(output_mode, &result)?;
            fail_if_invalid(&result)
        }
        Commands::ValidateSessions(args) => {
            let selection = prepared.selection();
            let result = app.validate_sessions(&args.subject, &selection, sink(output_mode))?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_subject(&result),
                OutputMode::Interactive => TextOutput::print_subject(&result),
            }
            .into_diagnostic()?;
            if let Some(report) = result.reports.iter().find(|report| !report.is_valid()) {
                return Err(report.clone().into_error().into());
            }
            if let Some(name) = result.invalid_names.first() {
                return Err(BndError::MalformedSessionName(name.clone()).into());
            }
            Ok(())
        }
        Commands::ListToday(args) => {
            let result = app.list_today(args.subject.as_deref(), sink(output_mode))?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_list_today(&result),
                OutputMode::Interactive => TextOutput::print_list_today(&result),
            }
            .into_diagnostic()
        }
        Commands::RenameVideos(args) => {
            let result = app.rename_videos(
                Utf8Path::new(&args.session_path),
                &args.subject,
                args.dry_run,
                sink(output_mode),
            )?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_rename(&result),
                OutputMode::Interactive => TextOutput::print_rename(&result),
            }
            .into_diagnostic()
        }
        Commands::RenameExtraFiles(args) => {
            let result = app.rename_extra_files(
                Utf8Path::new(&args.session_path),
                &args.subject,
                args.dry_run,
                sink(output_mode),
            )?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_rename(&result),
                OutputMode::Interactive => TextOutput::print_rename(&result),
            }
            .into_diagnostic()
        }
        Commands::UploadSession(args) => {
            let options = prepared.sync_options();
            let prompt = format!("Upload {} ({}) to the remote root?", args.session_path, args.subject);
            if confirm && !Tui::confirm(&prompt)? {
                return Err(miette::Report::msg("aborted"));
            }
            let result = transfer(output_mode, ProgressSinkKind::Upload, move |sink| {
                app.upload_session(
                    Utf8Path::new(&args.session_path),
                    &args.subject,
                    &options,
                    sink,
                )
            })?;
            finish_upload(&result)
        }
        Commands::UploadLast(args) => {
            let options = prepared.sync_options();
            let prompt = format!("Upload the last session of {} to the remote root?", args.subject);
            if confirm && !Tui::confirm(&prompt)? {
                return Err(miette::Report::msg("aborted"));
            }
            let result = transfer(output_mode, ProgressSinkKind::Upload, move |sink| {
                app.upload_last(&args.subject, &options, sink)
            })?;
            finish_upload(&result)
        }
        Commands::DownloadSession(args) => {
            let options = prepared.sync_options();
            let prompt = format!("Download {} ({})?", args.session_path, args.subject);
            if confirm && !Tui::confirm(&prompt)? {
                return Err(miette::Report::msg("aborted"));
            }
            transfer(output_mode, ProgressSinkKind::Download, move |sink| {
                app.download_session(
                    Utf8Path::new(&args.session_path),
                    &args.subject,
                    &options,
                    sink,
                )
            })?;
            Ok(())
        }
        Commands::DownloadLast(args) => {
            let options = prepared.sync_options();
            let prompt = format!("Download the last remote session of {}?", args.subject);
            if confirm && !Tui::confirm(&prompt)? {
                return Err(miette::Report::msg("aborted"));
            }
            transfer(output_mode, ProgressSinkKind::Download, move |sink| {
                app.download_last(&args.subject, &options, sink)
            })?;
            Ok(())
        }
        Commands::ShowConfig => {
            let path = ConfigLoader::config_path(cli.config.as_deref())?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_json(app.config()).into_diagnostic(),
                OutputMode::Interactive => {
                    println!("# {}", path.display());
                    JsonOutput::print_json(app.config()).into_diagnostic()
                }
            }
        }
        Commands::Init(_) => Ok(()),
    }
}

fn sink(mode: OutputMode) -> &'static dyn ProgressSink {
    match mode {
        OutputMode::NonInteractive => &JsonOutput,
        OutputMode::Interactive => &TextOutput,
    }
}

fn print_validate(mode: OutputMode, result: &ValidateResult) -> miette::Result<()> {
    match mode {
        OutputMode::NonInteractive => JsonOutput::print_validate(result),
        OutputMode::Interactive => TextOutput::print_validate(result),
    }
    .into_diagnostic()
}

fn fail_if_invalid(result: &ValidateResult) -> miette::Result<()> {
    match result.first_invalid() {
        Some(report) => Err(report.clone().into_error().into()),
        None => Ok(()),
    }
}

/// Runs a transfer behind the progress screen when interactive, then prints its report.
fn transfer<F>(mode: OutputMode, kind: ProgressSinkKind, f: F) -> miette::Result<SyncResult>
where
    F: FnOnce(&dyn ProgressSink) -> Result<SyncResult, BndError> + Send + 'static,
{
    let start = Instant::now();
    let result = match mode {
        OutputMode::NonInteractive => f(&JsonOutput)?,
        OutputMode::Interactive => Tui::new(kind).run(f)?,
    };
    match mode {
        OutputMode::NonInteractive => JsonOutput::print_sync(&result).into_diagnostic()?,
        OutputMode::Interactive => {
            TextOutput::print_sync(&result).into_diagnostic()?;
            println!(
                "{}",
                summary_line(
                    result.report.copied.len(),
                    result.report.bytes_copied,
                    start.elapsed()
                )
            );
        }
    }
    Ok(result)
}

fn finish_upload(result: &SyncResult) -> miette::Result<()> {
    match result.conflict_error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
