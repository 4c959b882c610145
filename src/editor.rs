use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::domain::{OverwritePolicy, SortError, SortResult};
use crate::names::SortKey;
use crate::spreadsheet::{TableStore, derive_output_path};
use crate::table::{ColumnRef, TableModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Empty,
    Loaded,
    ColumnSelected,
    Sorted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// `None` when the picker was cancelled.
    FileChosen(Option<PathBuf>),
    ColumnChosen(ColumnRef),
    SortRequested(SortKey),
    SaveRequested,
    CloseRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Info(String),
    Error(String),
}

/// Result of handling one event.
#[derive(Debug, Default, PartialEq)]
pub struct Outcome {
    /// The table or selection changed and has to be re-rendered.
    pub changed: bool,
    pub notification: Option<Notification>,
}

impl Outcome {
    fn unchanged() -> Self {
        Self::default()
    }

    fn changed() -> Self {
        Self {
            changed: true,
            notification: None,
        }
    }

    fn with_info(mut self, message: impl Into<String>) -> Self {
        self.notification = Some(Notification::Info(message.into()));
        self
    }
}

#[derive(Debug, Default)]
struct EditorContext {
    source: Option<PathBuf>,
    table: Option<TableModel>,
    selected_column: Option<ColumnRef>,
}

/// Drives load, column choice, sort and save. One event is handled to
/// completion before the next one is accepted.
pub struct EditorStateMachine<S: TableStore> {
    store: S,
    overwrite: OverwritePolicy,
    state: EditorState,
    context: EditorContext,
}

impl<S: TableStore> EditorStateMachine<S> {
    pub fn new(store: S, overwrite: OverwritePolicy) -> Self {
        Self {
            store,
            overwrite,
            state: EditorState::Empty,
            context: EditorContext::default(),
        }
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn table(&self) -> Option<&TableModel> {
        self.context.table.as_ref()
    }

    pub fn selected_column(&self) -> Option<&ColumnRef> {
        self.context.selected_column.as_ref()
    }

    pub fn source(&self) -> Option<&Path> {
        self.context.source.as_deref()
    }

    pub fn handle(&mut self, event: EditorEvent) -> Outcome {
        debug!("Editor event {:?} in state {:?}", event, self.state);
        let result = match event {
            EditorEvent::FileChosen(path) => self.file_chosen(path),
            EditorEvent::ColumnChosen(column) => self.column_chosen(column),
            EditorEvent::SortRequested(key) => self.sort_requested(key),
            EditorEvent::SaveRequested => self.save_requested(),
            EditorEvent::CloseRequested => self.close_requested(),
        };

        match result {
            Ok(outcome) => outcome,
            Err(
                e @ (SortError::NoFileSelected
                | SortError::NoColumnSelected
                | SortError::InvalidColumn(_)),
            ) => {
                debug!("Ignored: {e}");
                Outcome::unchanged()
            }
            Err(e) => {
                error!("{e}");
                Outcome {
                    changed: false,
                    notification: Some(Notification::Error(e.to_string())),
                }
            }
        }
    }

    fn file_chosen(&mut self, path: Option<PathBuf>) -> SortResult<Outcome> {
        if self.state != EditorState::Empty {
            debug!("A file is already loaded, ignoring FileChosen");
            return Ok(Outcome::unchanged());
        }
        let path = path.ok_or(SortError::NoFileSelected)?;

        let table = self
            .store
            .read(&path)
            .and_then(TableModel::load)
            .map_err(|e| SortError::UnreadableFile {
                path: path.clone(),
                source: Box::new(e),
            })?;

        info!("Loaded {}", path.display());
        let message = format!(
            "Loaded {} ({} rows)",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            table.row_count()
        );
        self.context = EditorContext {
            source: Some(path),
            table: Some(table),
            selected_column: None,
        };
        self.state = EditorState::Loaded;
        Ok(Outcome::changed().with_info(message))
    }

    fn column_chosen(&mut self, column: ColumnRef) -> SortResult<Outcome> {
        let Some(table) = &self.context.table else {
            return Ok(Outcome::unchanged());
        };
        if table.column_index(&column).is_none() {
            return Err(SortError::InvalidColumn(column.name().to_string()));
        }

        debug!("Selected column {}", column);
        let message = format!("Selected column \"{column}\"");
        self.context.selected_column = Some(column);
        self.state = EditorState::ColumnSelected;
        Ok(Outcome::changed().with_info(message))
    }

    fn sort_requested(&mut self, key: SortKey) -> SortResult<Outcome> {
        if !matches!(
            self.state,
            EditorState::ColumnSelected | EditorState::Sorted
        ) {
            return Err(SortError::NoColumnSelected);
        }
        let column = self
            .context
            .selected_column
            .as_ref()
            .ok_or(SortError::NoColumnSelected)?;
        let table = self
            .context
            .table
            .as_mut()
            .ok_or(SortError::NoColumnSelected)?;

        table.apply_sort(column, key)?;
        info!("Sorted column {} by {}", column, key.label());
        let message = format!("Sorted \"{column}\" by {}", key.label());
        self.state = EditorState::Sorted;
        Ok(Outcome::changed().with_info(message))
    }

    fn save_requested(&mut self) -> SortResult<Outcome> {
        let (Some(table), Some(source)) = (&self.context.table, &self.context.source) else {
            debug!("Nothing loaded, ignoring SaveRequested");
            return Ok(Outcome::unchanged());
        };

        let target = derive_output_path(source);
        let replaced = self.store.exists(&target);
        if replaced {
            if self.overwrite == OverwritePolicy::Refuse {
                return Err(SortError::WriteFailure {
                    source: Box::new(SortError::OutputExists(target.clone())),
                    path: target,
                });
            }
            warn!("Overwriting existing file {}", target.display());
        }

        self.store
            .write(&target, &table.export())
            .map_err(|e| SortError::WriteFailure {
                path: target.clone(),
                source: Box::new(e),
            })?;

        let message = if replaced {
            format!("Saved to {} (replaced existing file)", target.display())
        } else {
            format!("Saved to {}", target.display())
        };
        Ok(Outcome::unchanged().with_info(message))
    }

    fn close_requested(&mut self) -> SortResult<Outcome> {
        if self.state == EditorState::Empty {
            return Ok(Outcome::unchanged());
        }
        if let Some(source) = &self.context.source {
            info!("Closed {}", source.display());
        }
        self.context = EditorContext::default();
        self.state = EditorState::Empty;
        Ok(Outcome::changed().with_info("Closed file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{CellValue, TabularData};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory stand-in for the spreadsheet files.
    #[derive(Default)]
    struct MemoryStore {
        files: RefCell<HashMap<PathBuf, TabularData>>,
        fail_writes: bool,
    }

    impl MemoryStore {
        fn with_file(path: &str, data: TabularData) -> Self {
            let store = MemoryStore::default();
            store.files.borrow_mut().insert(PathBuf::from(path), data);
            store
        }
    }

    impl TableStore for MemoryStore {
        fn read(&self, path: &Path) -> SortResult<TabularData> {
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or(SortError::FileNotFound)
        }

        fn write(&self, path: &Path, data: &TabularData) -> SortResult<()> {
            if self.fail_writes {
                return Err(SortError::PermissionDenied);
            }
            self.files
                .borrow_mut()
                .insert(path.to_path_buf(), data.clone());
            Ok(())
        }

        fn exists(&self, path: &Path) -> bool {
            self.files.borrow().contains_key(path)
        }
    }

    fn report() -> TabularData {
        TabularData {
            columns: vec!["title".into(), "authors".into()],
            rows: vec![
                vec!["Paper A".into(), "Bob Smith, Alice Jones".into()],
                vec!["Paper B".into(), "Zed, Amy Young".into()],
            ],
        }
    }

    fn loaded() -> EditorStateMachine<MemoryStore> {
        let mut editor = EditorStateMachine::new(
            MemoryStore::with_file("/d/report.xlsx", report()),
            OverwritePolicy::Replace,
        );
        editor.handle(EditorEvent::FileChosen(Some("/d/report.xlsx".into())));
        editor
    }

    fn authors() -> ColumnRef {
        ColumnRef::new("authors")
    }

    #[test]
    fn file_chosen_loads_the_table() {
        let editor = loaded();
        assert_eq!(editor.state(), EditorState::Loaded);
        assert_eq!(editor.table().unwrap().export(), report());
        assert_eq!(editor.selected_column(), None);
        assert_eq!(editor.source(), Some(Path::new("/d/report.xlsx")));
    }

    #[test]
    fn cancelled_picker_is_silent() {
        let mut editor = EditorStateMachine::new(MemoryStore::default(), OverwritePolicy::Replace);
        let outcome = editor.handle(EditorEvent::FileChosen(None));
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(editor.state(), EditorState::Empty);
    }

    #[test]
    fn unreadable_file_notifies_and_stays_empty() {
        let mut editor = EditorStateMachine::new(MemoryStore::default(), OverwritePolicy::Replace);
        let outcome = editor.handle(EditorEvent::FileChosen(Some("/d/missing.xlsx".into())));
        assert!(!outcome.changed);
        assert!(matches!(outcome.notification, Some(Notification::Error(_))));
        assert_eq!(editor.state(), EditorState::Empty);
        assert!(editor.table().is_none());
    }

    #[test]
    fn ragged_file_is_unreadable() {
        let mut data = report();
        data.rows[0].push("extra".into());
        let mut editor = EditorStateMachine::new(
            MemoryStore::with_file("/d/bad.csv", data),
            OverwritePolicy::Replace,
        );
        let outcome = editor.handle(EditorEvent::FileChosen(Some("/d/bad.csv".into())));
        assert!(matches!(outcome.notification, Some(Notification::Error(_))));
        assert_eq!(editor.state(), EditorState::Empty);
    }

    #[test]
    fn repeated_header_is_unreadable() {
        let mut data = report();
        data.columns[0] = data.columns[1].clone();
        let mut editor = EditorStateMachine::new(
            MemoryStore::with_file("/d/twice.csv", data),
            OverwritePolicy::Replace,
        );
        let outcome = editor.handle(EditorEvent::FileChosen(Some("/d/twice.csv".into())));
        match outcome.notification {
            Some(Notification::Error(message)) => assert!(message.contains("more than once")),
            other => panic!("unexpected notification {other:?}"),
        }
        assert_eq!(editor.state(), EditorState::Empty);
    }

    #[test]
    fn second_file_is_ignored_while_loaded() {
        let mut editor = loaded();
        let outcome = editor.handle(EditorEvent::FileChosen(Some("/d/other.xlsx".into())));
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(editor.source(), Some(Path::new("/d/report.xlsx")));
    }

    #[test]
    fn sort_without_column_is_ignored() {
        let mut editor = loaded();
        let outcome = editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(editor.state(), EditorState::Loaded);
        assert_eq!(editor.table().unwrap().export(), report());
    }

    #[test]
    fn sort_before_load_is_ignored() {
        let mut editor = EditorStateMachine::new(MemoryStore::default(), OverwritePolicy::Replace);
        editor.handle(EditorEvent::ColumnChosen(authors()));
        let outcome = editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(editor.state(), EditorState::Empty);
    }

    #[test]
    fn choose_then_sort() {
        let mut editor = loaded();
        editor.handle(EditorEvent::ColumnChosen(authors()));
        assert_eq!(editor.state(), EditorState::ColumnSelected);
        assert_eq!(editor.selected_column(), Some(&authors()));

        let outcome = editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));
        assert!(outcome.changed);
        assert_eq!(editor.state(), EditorState::Sorted);
        let table = editor.table().unwrap();
        assert_eq!(table.cell(0, 1), Some(&CellValue::from("Alice Jones, Bob Smith")));
        assert_eq!(table.cell(1, 1), Some(&CellValue::from("Amy Young, Zed")));
        assert_eq!(table.cell(0, 0), Some(&CellValue::from("Paper A")));

        // repeated sorts stay in Sorted
        editor.handle(EditorEvent::SortRequested(SortKey::ByFirstName));
        assert_eq!(editor.state(), EditorState::Sorted);
    }

    #[test]
    fn choosing_a_column_again_returns_to_column_selected() {
        let mut editor = loaded();
        editor.handle(EditorEvent::ColumnChosen(authors()));
        editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));
        editor.handle(EditorEvent::ColumnChosen(ColumnRef::new("title")));
        assert_eq!(editor.state(), EditorState::ColumnSelected);
        assert_eq!(editor.selected_column(), Some(&ColumnRef::new("title")));
    }

    #[test]
    fn unknown_column_is_ignored() {
        let mut editor = loaded();
        let outcome = editor.handle(EditorEvent::ColumnChosen(ColumnRef::new("nope")));
        assert_eq!(outcome, Outcome::unchanged());
        assert_eq!(editor.state(), EditorState::Loaded);
    }

    #[test]
    fn save_writes_next_to_the_source() {
        let mut editor = loaded();
        editor.handle(EditorEvent::ColumnChosen(authors()));
        editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));

        let outcome = editor.handle(EditorEvent::SaveRequested);
        assert_eq!(
            outcome.notification,
            Some(Notification::Info("Saved to /d/report_sorted.xlsx".into()))
        );
        assert!(!outcome.changed);
        assert_eq!(editor.state(), EditorState::Sorted);

        let files = editor.store.files.borrow();
        let written = &files[Path::new("/d/report_sorted.xlsx")];
        assert_eq!(written.rows[0][1], CellValue::from("Alice Jones, Bob Smith"));
        // the source stays untouched
        assert_eq!(files[Path::new("/d/report.xlsx")], report());
    }

    #[test]
    fn save_replaces_existing_output() {
        let mut editor = loaded();
        editor.handle(EditorEvent::SaveRequested);
        let outcome = editor.handle(EditorEvent::SaveRequested);
        assert_eq!(
            outcome.notification,
            Some(Notification::Info(
                "Saved to /d/report_sorted.xlsx (replaced existing file)".into()
            ))
        );
    }

    #[test]
    fn save_can_refuse_to_overwrite() {
        let store = MemoryStore::with_file("/d/report.xlsx", report());
        store
            .files
            .borrow_mut()
            .insert(PathBuf::from("/d/report_sorted.xlsx"), TabularData::default());
        let mut editor = EditorStateMachine::new(store, OverwritePolicy::Refuse);
        editor.handle(EditorEvent::FileChosen(Some("/d/report.xlsx".into())));

        let outcome = editor.handle(EditorEvent::SaveRequested);
        assert!(matches!(outcome.notification, Some(Notification::Error(_))));
        let files = editor.store.files.borrow();
        assert_eq!(files[Path::new("/d/report_sorted.xlsx")], TabularData::default());
    }

    #[test]
    fn failed_write_keeps_the_table() {
        let mut store = MemoryStore::with_file("/d/report.xlsx", report());
        store.fail_writes = true;
        let mut editor = EditorStateMachine::new(store, OverwritePolicy::Replace);
        editor.handle(EditorEvent::FileChosen(Some("/d/report.xlsx".into())));
        editor.handle(EditorEvent::ColumnChosen(authors()));
        editor.handle(EditorEvent::SortRequested(SortKey::ByLastName));
        let before = editor.table().unwrap().export();

        let outcome = editor.handle(EditorEvent::SaveRequested);
        assert!(matches!(outcome.notification, Some(Notification::Error(_))));
        assert_eq!(editor.state(), EditorState::Sorted);
        assert_eq!(editor.table().unwrap().export(), before);
    }

    #[test]
    fn save_without_table_is_ignored() {
        let mut editor = EditorStateMachine::new(MemoryStore::default(), OverwritePolicy::Replace);
        assert_eq!(editor.handle(EditorEvent::SaveRequested), Outcome::unchanged());
        assert!(editor.store.files.borrow().is_empty());
    }

    #[test]
    fn close_resets_selection_for_the_next_file() {
        let mut editor = loaded();
        editor.handle(EditorEvent::ColumnChosen(authors()));
        editor.handle(EditorEvent::CloseRequested);
        assert_eq!(editor.state(), EditorState::Empty);
        assert!(editor.table().is_none());

        editor.handle(EditorEvent::FileChosen(Some("/d/report.xlsx".into())));
        assert_eq!(editor.state(), EditorState::Loaded);
        assert_eq!(editor.selected_column(), None);
    }
}
