use std::path::PathBuf;

/// How the user chooses the spreadsheet to open.
pub enum PickerKind {
    /// Type the path into the command line.
    Prompt,
    /// Ask the platform file dialog; `None` when the user cancels.
    Dialog(Box<dyn Fn() -> Option<PathBuf>>),
}

impl PickerKind {
    #[cfg(feature = "native-dialog")]
    pub fn platform() -> Self {
        PickerKind::Dialog(Box::new(native_dialog))
    }

    #[cfg(not(feature = "native-dialog"))]
    pub fn platform() -> Self {
        PickerKind::Prompt
    }
}

#[cfg(feature = "native-dialog")]
fn native_dialog() -> Option<PathBuf> {
    let path = rfd::FileDialog::new()
        .set_title("Select the spreadsheet you want to sort")
        .add_filter("Spreadsheets", crate::spreadsheet::SUPPORTED_EXTENSIONS)
        .pick_file();
    tracing::debug!("File dialog returned {:?}", path);
    path
}
