use std::path::PathBuf;

use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, info, trace};

use crate::domain::{AppConfig, CMDMode, HELP_TEXT, Message};
use crate::editor::{EditorEvent, EditorState, EditorStateMachine, Notification};
use crate::inputter::{InputResult, Inputter};
use crate::names::SortKey;
use crate::picker::PickerKind;
use crate::spreadsheet::SpreadsheetStore;
use crate::ui::{
    COLUMN_WIDTH_MARGIN, HINTBAR_HEIGHT, SCROLLBAR_WIDTH, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT,
};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    POPUP,
    CMDINPUT,
}

#[derive(Clone, Debug)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub data: Vec<String>,
    /// Marks the column whose names get sorted.
    pub chosen: bool,
}

/// Cursor and scroll state over the loaded table.
struct TableView {
    cursor_row: usize,
    cursor_column: usize,
    offset_row: usize,
    offset_column: usize,
    visible_columns: Vec<usize>,
    data: Vec<ColumnView>,
}

impl TableView {
    fn empty() -> Self {
        TableView {
            cursor_row: 0,
            cursor_column: 0,
            offset_row: 0,
            offset_column: 0,
            visible_columns: Vec::new(),
            data: Vec::new(),
        }
    }
}

pub struct UIData {
    pub name: String,
    pub hint: String,
    pub table: Vec<ColumnView>,
    pub nrows: usize,
    pub selected_row: usize,
    pub selected_column: usize,
    pub abs_selected_row: usize,
    pub show_popup: bool,
    pub popup_message: String,
    pub cmdinput: InputResult,
    pub cmd_mode: Option<CMDMode>,
    pub active_cmdinput: bool,
    pub status_message: String,
    pub status_is_error: bool,
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width.saturating_sub(SCROLLBAR_WIDTH),
            table_height: ui_height
                .saturating_sub(HINTBAR_HEIGHT + TABLE_HEADER_HEIGHT + STATUSLINE_HEIGHT),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

pub struct Model {
    config: AppConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    editor: EditorStateMachine<SpreadsheetStore>,
    picker: PickerKind,
    // Display text of the table, header first. Rebuilt whenever the table changes.
    projection: Vec<Vec<String>>,
    // Widest cell (or header) per column in chars
    content_widths: Vec<usize>,
    view: TableView,
    uilayout: UILayout,
    uidata: UIData,
    input: Inputter,
    cmd_mode: Option<CMDMode>,
    last_input: InputResult,
    active_cmdinput: bool,
    popup_message: Option<String>,
    status_message: String,
    status_is_error: bool,
}

impl Model {
    pub fn init(config: &AppConfig, picker: PickerKind, ui_width: usize, ui_height: usize) -> Self {
        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            editor: EditorStateMachine::new(SpreadsheetStore, config.overwrite),
            picker,
            projection: Vec::new(),
            content_widths: Vec::new(),
            view: TableView::empty(),
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData {
                name: String::new(),
                hint: String::new(),
                table: Vec::new(),
                nrows: 0,
                selected_row: 0,
                selected_column: 0,
                abs_selected_row: 0,
                show_popup: false,
                popup_message: String::new(),
                cmdinput: InputResult::default(),
                cmd_mode: None,
                active_cmdinput: false,
                status_message: String::new(),
                status_is_error: false,
            },
            input: Inputter::default(),
            cmd_mode: None,
            last_input: InputResult::default(),
            active_cmdinput: false,
            popup_message: None,
            status_message: "Started namesort!".to_string(),
            status_is_error: false,
        };
        model.update_table_data();
        model
    }

    /// Loads a file given on the command line.
    pub fn open(&mut self, path: PathBuf) {
        self.dispatch(EditorEvent::FileChosen(Some(path)));
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn editor_state(&self) -> EditorState {
        self.editor.state()
    }

    pub fn raw_keyevents(&self) -> bool {
        self.active_cmdinput
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    pub fn update(&mut self, message: Message) {
        match self.modus {
            Modus::TABLE => match message {
                Message::Quit => self.quit(),
                Message::MoveUp => self.move_row_selection_up(1),
                Message::MoveDown => self.move_row_selection_down(1),
                Message::MovePageUp => self.move_row_selection_up(self.page_size()),
                Message::MovePageDown => self.move_row_selection_down(self.page_size()),
                Message::MoveBeginning => self.move_row_selection_up(usize::MAX),
                Message::MoveEnd => self.move_row_selection_down(usize::MAX),
                Message::MoveLeft => self.move_column_selection_left(),
                Message::MoveRight => self.move_column_selection_right(),
                Message::OpenFile => self.open_file(),
                Message::ChooseColumn => self.choose_column(),
                Message::SortByLastName => {
                    self.dispatch(EditorEvent::SortRequested(SortKey::ByLastName))
                }
                Message::SortByFirstName => {
                    self.dispatch(EditorEvent::SortRequested(SortKey::ByFirstName))
                }
                Message::Save => self.dispatch(EditorEvent::SaveRequested),
                Message::CloseFile => self.dispatch(EditorEvent::CloseRequested),
                Message::Help => self.show_help(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::RawKey(_) => (),
            },
            Modus::POPUP => match message {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Help => self.close_popup(),
                _ => (),
            },
            Modus::CMDINPUT => match message {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
    }

    // -------------------- Editor ---------------------- //

    fn dispatch(&mut self, event: EditorEvent) {
        let before = self.editor.state();
        let outcome = self.editor.handle(event);
        let after = self.editor.state();

        if outcome.changed {
            if before == EditorState::Empty || after == EditorState::Empty {
                // A different table (or none); start at the top left again
                self.view = TableView::empty();
            }
            self.refresh_projection();
        }
        match outcome.notification {
            Some(Notification::Info(message)) => self.set_status_message(message, false),
            Some(Notification::Error(message)) => self.set_status_message(message, true),
            None => {}
        }
        self.update_table_data();
    }

    fn open_file(&mut self) {
        if self.editor.state() != EditorState::Empty {
            self.set_status_message("Close the current file with <c> before opening another", false);
            self.update_uidata();
            return;
        }
        match &self.picker {
            PickerKind::Prompt => self.enter_cmd_mode(CMDMode::OpenFile),
            PickerKind::Dialog(pick) => {
                let path = pick();
                self.dispatch(EditorEvent::FileChosen(path));
            }
        }
    }

    fn choose_column(&mut self) {
        let column = self
            .editor
            .table()
            .and_then(|table| table.column_ref(self.view.cursor_column));
        if let Some(column) = column {
            self.dispatch(EditorEvent::ColumnChosen(column));
        }
    }

    fn refresh_projection(&mut self) {
        self.projection = match self.editor.table() {
            Some(table) => table
                .project()
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|cell| cell.replace("\r\n", " ↵ ").replace('\n', " ↵ "))
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };

        let ncols = self.projection.first().map(|h| h.len()).unwrap_or(0);
        self.content_widths = (0..ncols)
            .map(|idx| {
                self.projection
                    .iter()
                    .map(|row| row.get(idx).map(|c| c.chars().count()).unwrap_or(0))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        debug!("Refreshed projection, widths {:?}", self.content_widths);
    }

    // -------------------- Command line ---------------------- //

    fn enter_cmd_mode(&mut self, mode: CMDMode) {
        trace!("Entering command mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::CMDINPUT;
        self.cmd_mode = Some(mode);
        self.active_cmdinput = true;
        self.input.clear();
        self.last_input = self.input.get();
        self.update_uidata();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        if self.active_cmdinput {
            self.last_input = self.input.read(key);
            if self.last_input.finished {
                self.handle_cmd_input();
            }
            self.update_uidata();
        }
    }

    fn handle_cmd_input(&mut self) {
        trace!("Handle cmd input {}", self.last_input.input);
        self.active_cmdinput = false;
        self.modus = self.previous_modus;
        self.previous_modus = Modus::CMDINPUT;

        match self.cmd_mode.take() {
            Some(CMDMode::OpenFile) => {
                let path = self.last_input.as_path();
                self.dispatch(EditorEvent::FileChosen(path));
            }
            None => info!("Cmd mode is none!"),
        }
    }

    // -------------------- Popup ---------------------- //

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.popup_message = Some(HELP_TEXT.to_string());
        self.update_uidata();
    }

    fn close_popup(&mut self) {
        trace!("Close popup ...");
        self.modus = self.previous_modus;
        self.previous_modus = Modus::POPUP;
        self.popup_message = None;
        self.update_uidata();
    }

    // -------------------- Cursor movement ---------------------- //

    fn nrows(&self) -> usize {
        self.projection.len().saturating_sub(1)
    }

    fn page_size(&self) -> usize {
        self.uilayout.table_height.max(1)
    }

    fn move_row_selection_up(&mut self, size: usize) {
        self.view.cursor_row = self.view.cursor_row.saturating_sub(size);
        self.update_table_data();
    }

    fn move_row_selection_down(&mut self, size: usize) {
        let last = self.nrows().saturating_sub(1);
        self.view.cursor_row = self.view.cursor_row.saturating_add(size).min(last);
        self.update_table_data();
    }

    fn move_column_selection_left(&mut self) {
        self.view.cursor_column = self.view.cursor_column.saturating_sub(1);
        self.update_table_data();
    }

    fn move_column_selection_right(&mut self) {
        if self.view.cursor_column + 1 < self.content_widths.len() {
            self.view.cursor_column += 1;
        }
        self.update_table_data();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.update_table_data();
    }

    // -------------------- View building ---------------------- //

    fn column_width(&self, idx: usize) -> usize {
        let width = self.content_widths.get(idx).copied().unwrap_or(0) + COLUMN_WIDTH_MARGIN;
        std::cmp::min(width, self.config.max_column_width.max(1))
    }

    /// Columns from `offset_column` on that fit into the table width. The last
    /// one may only be partially visible.
    fn fit_columns(&self) -> Vec<(usize, usize)> {
        let budget = self.uilayout.table_width;
        let mut visible = Vec::new();
        let mut used = 0;
        for idx in self.view.offset_column..self.content_widths.len() {
            let width = self.column_width(idx);
            if used + width + 1 <= budget {
                visible.push((idx, width));
                used += width + 1;
            } else {
                if used < budget {
                    visible.push((idx, budget - used));
                }
                break;
            }
        }
        visible
    }

    fn update_table_data(&mut self) {
        let ncols = self.content_widths.len();
        let nrows = self.nrows();
        let view = &mut self.view;
        view.data.clear();
        view.visible_columns.clear();

        if ncols == 0 {
            self.update_uidata();
            return;
        }

        // Keep both cursors inside the table and on screen
        view.cursor_column = view.cursor_column.min(ncols - 1);
        view.cursor_row = view.cursor_row.min(nrows.saturating_sub(1));
        view.offset_column = view.offset_column.min(view.cursor_column);
        let height = self.uilayout.table_height;
        if view.cursor_row < view.offset_row {
            view.offset_row = view.cursor_row;
        } else if height > 0 && view.cursor_row >= view.offset_row + height {
            view.offset_row = view.cursor_row + 1 - height;
        }

        let mut visible = self.fit_columns();
        while self.view.offset_column < self.view.cursor_column
            && !visible
                .iter()
                .any(|&(idx, width)| idx == self.view.cursor_column && width == self.column_width(idx))
        {
            self.view.offset_column += 1;
            visible = self.fit_columns();
        }

        let chosen = self
            .editor
            .selected_column()
            .and_then(|column| self.editor.table().and_then(|t| t.column_index(column)));
        let rbegin = self.view.offset_row;
        let rend = std::cmp::min(rbegin + height, nrows);

        let mut data = Vec::with_capacity(visible.len());
        for &(idx, width) in visible.iter() {
            let header = self.projection.first().and_then(|h| h.get(idx));
            let name = Self::get_visible_name(header.map(String::as_str).unwrap_or(""), width);
            let cells = self.projection[rbegin + 1..rend + 1]
                .iter()
                .map(|row| row.get(idx).cloned().unwrap_or_default())
                .collect();
            data.push(ColumnView {
                name,
                width,
                data: cells,
                chosen: chosen == Some(idx),
            });
        }

        self.view.visible_columns = visible.iter().map(|&(idx, _)| idx).collect();
        self.view.data = data;
        trace!(
            "Table: Cr {}, Cc {}, Or {}, Oc {}, visible {:?}",
            self.view.cursor_row,
            self.view.cursor_column,
            self.view.offset_row,
            self.view.offset_column,
            self.view.visible_columns
        );
        self.update_uidata();
    }

    fn get_visible_name(name: &str, width: usize) -> String {
        if width < 3 {
            return String::new();
        }
        if name.chars().count() > width {
            let mut reduced: String = name.chars().take(width - 3).collect();
            reduced.push_str("...");
            reduced
        } else {
            name.to_string()
        }
    }

    fn hint(&self) -> String {
        match self.editor.state() {
            EditorState::Empty => {
                "Press <o> to choose the spreadsheet you want to sort. <q> to quit.".to_string()
            }
            EditorState::Loaded => {
                "Move to the column you want to sort and press <Enter>. <?> for help.".to_string()
            }
            EditorState::ColumnSelected | EditorState::Sorted => {
                let column = self
                    .editor
                    .selected_column()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                format!(
                    "Sort \"{column}\" by <L>ast or <F>irst name, <s> to save, <Enter> picks another column."
                )
            }
        }
    }

    fn set_status_message(&mut self, message: impl Into<String>, is_error: bool) {
        self.status_message = message.into();
        self.status_is_error = is_error;
    }

    fn update_uidata(&mut self) {
        let name = self
            .editor
            .source()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let selected_column = self
            .view
            .visible_columns
            .iter()
            .position(|&c| c == self.view.cursor_column)
            .unwrap_or(0);

        self.uidata = UIData {
            name,
            hint: self.hint(),
            table: self.view.data.clone(),
            nrows: self.nrows(),
            selected_row: self.view.cursor_row - self.view.offset_row.min(self.view.cursor_row),
            selected_column,
            abs_selected_row: self.view.cursor_row,
            show_popup: self.popup_message.is_some(),
            popup_message: self.popup_message.clone().unwrap_or_default(),
            cmdinput: self.last_input.clone(),
            cmd_mode: self.cmd_mode,
            active_cmdinput: self.active_cmdinput,
            status_message: self.status_message.clone(),
            status_is_error: self.status_is_error,
        };
    }
}
