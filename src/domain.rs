use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

pub type SortResult<T> = Result<T, SortError>;

#[derive(Error, Debug)]
pub enum SortError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Excel read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),

    #[error("Excel write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("File not found")]
    FileNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Unknown file type: {0}")]
    UnknownFileType(String),

    #[error("Loading failed: {0}")]
    LoadingFailed(String),

    #[error("Row {row} has {found} cells but the header has {expected}")]
    MalformedTable {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("Column \"{0}\" appears more than once")]
    DuplicateColumn(String),

    #[error("No file selected")]
    NoFileSelected,

    #[error("No column selected")]
    NoColumnSelected,

    #[error("Unknown column \"{0}\"")]
    InvalidColumn(String),

    #[error("Could not read {}: {source}", path.display())]
    UnreadableFile {
        path: PathBuf,
        source: Box<SortError>,
    },

    #[error("Could not write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        source: Box<SortError>,
    },

    #[error("{} already exists", .0.display())]
    OutputExists(PathBuf),
}

/// What happens when the derived output file is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    #[default]
    Replace,
    Refuse,
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct AppConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub overwrite: OverwritePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 40,
            overwrite: OverwritePolicy::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CMDMode {
    OpenFile,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    OpenFile,
    ChooseColumn,
    SortByLastName,
    SortByFirstName,
    Save,
    CloseFile,
    Help,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}

pub const HELP_TEXT: &str = "\
o            open a spreadsheet
Left/Right   move the column cursor
Enter/Space  choose the column to sort
L            sort names by last name
F            sort names by first name
s            save next to the source as <name>_sorted
c            close the current file
Up/Down      scroll rows (PgUp/PgDn, Home/End)
?            show this help
Esc          close this popup
q            quit";
