use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

mod controller;
mod domain;
mod editor;
mod inputter;
mod logging;
mod model;
mod names;
mod picker;
mod spreadsheet;
mod table;
mod ui;

use controller::Controller;
use domain::{AppConfig, OverwritePolicy, SortResult};
use model::{Model, Status};
use picker::PickerKind;
use ui::TableUI;

/// Sort the comma separated names inside a spreadsheet column.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Spreadsheet to open right away (xlsx, csv, parquet, arrow)
    file: Option<PathBuf>,

    /// How long to wait for terminal events, in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Widest a column is drawn before its text is cut
    #[arg(long, default_value_t = 40)]
    max_column_width: usize,

    /// Refuse to replace an existing <name>_sorted file
    #[arg(long)]
    no_overwrite: bool,

    /// Where namesort.log is written (defaults to the temp dir)
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let log_dir = args.log_dir.clone().unwrap_or_else(std::env::temp_dir);
    let _guard = logging::init(&log_dir);

    let result = run(args);
    ratatui::restore();
    match result {
        Err(e) => {
            tracing::error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: Args) -> SortResult<()> {
    let cfg = AppConfig::default()
        .with_event_poll_time(args.poll_ms)
        .with_max_column_width(args.max_column_width)
        .with_overwrite(if args.no_overwrite {
            OverwritePolicy::Refuse
        } else {
            OverwritePolicy::Replace
        });
    tracing::debug!("Starting with {:?}", cfg);

    let mut terminal = ratatui::init();
    let size = terminal.size()?;
    let mut model = Model::init(
        &cfg,
        PickerKind::platform(),
        size.width as usize,
        size.height as usize,
    );
    if let Some(path) = args.file {
        model.open(path);
    }

    let mut ui = TableUI::new();
    let controller = Controller::new(&cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(&model, f))?;

        // Handle events and map to a Message
        if let Some(message) = controller.handle_event(&model)? {
            model.update(message);
        }
    }

    Ok(())
}
