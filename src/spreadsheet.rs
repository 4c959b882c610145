use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use calamine::{Data, DataType as _, Reader, Xlsx, open_workbook};
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use polars::prelude::*;
use rayon::prelude::*;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, info};

use crate::domain::{SortError, SortResult};
use crate::table::{CellValue, TabularData};

/// Reads and writes whole tables. The editor only talks to this seam.
pub trait TableStore {
    fn read(&self, path: &Path) -> SortResult<TabularData>;

    fn write(&self, path: &Path, data: &TabularData) -> SortResult<()>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FileType {
    CSV,
    PARQUET,
    XLSX,
    ARROW,
}

/// Extensions offered by the file dialog.
#[cfg(feature = "native-dialog")]
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "csv", "parquet", "pq", "arrow", "ipc", "feather"];

#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetStore;

impl TableStore for SpreadsheetStore {
    fn read(&self, path: &Path) -> SortResult<TabularData> {
        check_file(path)?;
        let file_type = detect_file_type(path)?;
        let start_time = Instant::now();

        let data = match file_type {
            FileType::XLSX => read_xlsx(path)?,
            FileType::CSV => frame_to_table(load_csv(path)?)?,
            FileType::PARQUET => frame_to_table(load_parquet(path)?)?,
            FileType::ARROW => frame_to_table(load_arrow(path)?)?,
        };

        info!(
            "Read {} ({:?}, {} columns, {} rows) in {}ms",
            path.display(),
            file_type,
            data.columns.len(),
            data.rows.len(),
            start_time.elapsed().as_millis()
        );
        Ok(data)
    }

    fn write(&self, path: &Path, data: &TabularData) -> SortResult<()> {
        match detect_file_type(path)? {
            FileType::XLSX => write_xlsx(path, data)?,
            FileType::CSV => {
                let mut df = table_to_frame(data)?;
                let mut file = File::create(path)?;
                CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
            }
            FileType::PARQUET => {
                let mut df = table_to_frame(data)?;
                ParquetWriter::new(File::create(path)?).finish(&mut df)?;
            }
            FileType::ARROW => {
                let mut df = table_to_frame(data)?;
                IpcWriter::new(File::create(path)?).finish(&mut df)?;
            }
        }
        info!("Wrote {} rows to {}", data.rows.len(), path.display());
        Ok(())
    }
}

/// `<dir>/<stem>_sorted.<ext>` next to the source file.
pub fn derive_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match source.extension() {
        Some(ext) => format!("{stem}_sorted.{}", ext.to_string_lossy()),
        None => format!("{stem}_sorted"),
    };
    source.with_file_name(name)
}

fn check_file(path: &Path) -> SortResult<()> {
    let metadata = fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SortError::FileNotFound,
        ErrorKind::PermissionDenied => SortError::PermissionDenied,
        _ => SortError::Io(e),
    })?;
    if !metadata.is_file() {
        return Err(SortError::LoadingFailed("Not a file!".into()));
    }
    Ok(())
}

fn detect_file_type(path: &Path) -> SortResult<FileType> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_uppercase());
    match ext.as_deref() {
        Some("CSV") => Ok(FileType::CSV),
        Some("PARQUET") | Some("PQ") => Ok(FileType::PARQUET),
        Some("XLSX") => Ok(FileType::XLSX),
        Some("ARROW") | Some("IPC") | Some("FEATHER") => Ok(FileType::ARROW),
        _ => Err(SortError::UnknownFileType(
            ext.unwrap_or_else(|| "<none>".to_string()),
        )),
    }
}

// -------------------- xlsx ---------------------- //

/// Serial number of 1970-01-01 in the 1900 date system.
const EXCEL_UNIX_EPOCH: f64 = 25569.0;

fn read_xlsx(path: &Path) -> SortResult<TabularData> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| SortError::LoadingFailed("Workbook has no sheets".into()))?;
    let range = workbook.worksheet_range(&sheet)?;
    debug!("Reading sheet \"{}\" of size {:?}", sheet, range.get_size());

    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => unique_headers(
            header
                .iter()
                .enumerate()
                .map(|(idx, cell)| match cell {
                    Data::Empty => format!("col_{idx}"),
                    other => other.to_string(),
                })
                .collect(),
        ),
        None => Vec::new(),
    };
    let rows = rows
        .map(|row| row.iter().map(cell_from_xlsx).collect())
        .collect();

    Ok(TabularData { columns, rows })
}

/// Appends `_1`, `_2`, ... to repeated header names so every column can be
/// addressed by name.
fn unique_headers(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = names.iter().cloned().collect();
    let mut seen = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .map(|name| {
            if seen.insert(name.clone()) {
                return name;
            }
            let mut n = 1;
            let mut candidate = format!("{name}_{n}");
            while taken.contains(&candidate) {
                n += 1;
                candidate = format!("{name}_{n}");
            }
            debug!("Renamed repeated header \"{}\" to \"{}\"", name, candidate);
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

fn cell_from_xlsx(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        // xlsx stores every number as a float
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => CellValue::Int(*f as i64),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) if dt.is_duration() => duration_cell(cell),
        Data::DurationIso(_) => duration_cell(cell),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => datetime_cell(dt),
            None => CellValue::Text(cell.to_string()),
        },
        other => CellValue::Text(other.to_string()),
    }
}

/// Midnight values become dates, anything else a millisecond datetime.
fn datetime_cell(dt: NaiveDateTime) -> CellValue {
    let since_epoch = dt - DateTime::<Utc>::UNIX_EPOCH.naive_utc();
    if dt.time() == NaiveTime::MIN {
        CellValue::Native(AnyValue::Date(since_epoch.num_days() as i32))
    } else {
        CellValue::Native(AnyValue::Datetime(
            since_epoch.num_milliseconds(),
            TimeUnit::Milliseconds,
            None,
        ))
    }
}

fn duration_cell(cell: &Data) -> CellValue {
    match cell.as_duration() {
        Some(d) => CellValue::Native(AnyValue::Duration(
            d.num_milliseconds(),
            TimeUnit::Milliseconds,
        )),
        None => CellValue::Text(cell.to_string()),
    }
}

fn units_per_day(unit: TimeUnit) -> f64 {
    match unit {
        TimeUnit::Nanoseconds => 86_400_000_000_000.0,
        TimeUnit::Microseconds => 86_400_000_000.0,
        TimeUnit::Milliseconds => 86_400_000.0,
    }
}

struct DateFormats {
    date: Format,
    datetime: Format,
    duration: Format,
}

impl DateFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            duration: Format::new().set_num_format("[h]:mm:ss"),
        }
    }
}

fn write_xlsx(path: &Path, data: &TabularData) -> SortResult<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let formats = DateFormats::new();

    for (col, name) in data.columns.iter().enumerate() {
        worksheet.write_string(0, col as u16, name)?;
    }
    for (ridx, row) in data.rows.iter().enumerate() {
        let r = (ridx + 1) as u32;
        for (cidx, cell) in row.iter().enumerate() {
            let c = cidx as u16;
            match cell {
                CellValue::Empty => {}
                CellValue::Text(s) => {
                    worksheet.write_string(r, c, s)?;
                }
                CellValue::Int(i) => {
                    worksheet.write_number(r, c, *i as f64)?;
                }
                CellValue::Float(f) => {
                    worksheet.write_number(r, c, *f)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                CellValue::Native(value) => write_native(worksheet, r, c, value, &formats)?,
            }
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Dates and durations go back as serial numbers with a date format.
fn write_native(
    worksheet: &mut Worksheet,
    r: u32,
    c: u16,
    value: &AnyValue,
    formats: &DateFormats,
) -> Result<(), XlsxError> {
    match value {
        AnyValue::Null => {}
        AnyValue::Boolean(b) => {
            worksheet.write_boolean(r, c, *b)?;
        }
        AnyValue::Date(days) => {
            let serial = EXCEL_UNIX_EPOCH + *days as f64;
            worksheet.write_number_with_format(r, c, serial, &formats.date)?;
        }
        AnyValue::Datetime(v, unit, _) | AnyValue::DatetimeOwned(v, unit, _) => {
            let serial = EXCEL_UNIX_EPOCH + *v as f64 / units_per_day(*unit);
            worksheet.write_number_with_format(r, c, serial, &formats.datetime)?;
        }
        AnyValue::Duration(v, unit) => {
            let days = *v as f64 / units_per_day(*unit);
            worksheet.write_number_with_format(r, c, days, &formats.duration)?;
        }
        other => match other.extract::<f64>() {
            Some(number) if other.is_primitive_numeric() => {
                worksheet.write_number(r, c, number)?;
            }
            _ => {
                worksheet.write_string(r, c, other.to_string())?;
            }
        },
    }
    Ok(())
}

// -------------------- polars formats ---------------------- //

/// Every CSV field is kept as text so untouched columns are written back as read.
fn load_csv(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyCsvReader::new(PlPath::Local(path.into()))
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()
}

fn load_parquet(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_parquet(PlPath::Local(path.into()), ScanArgsParquet::default())
}

fn load_arrow(path: &Path) -> Result<LazyFrame, PolarsError> {
    LazyFrame::scan_ipc(
        PlPath::Local(path.into()),
        polars::io::ipc::IpcScanOptions,
        UnifiedScanArgs::default(),
    )
}

fn frame_to_table(frame: LazyFrame) -> SortResult<TabularData> {
    let df = frame.collect()?;
    let columns: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    // Each column is decoded on its own thread, then transposed into rows.
    let decoded: Result<Vec<Vec<CellValue>>, PolarsError> = columns
        .par_iter()
        .map(|name| load_column(&df, name))
        .collect();
    let decoded = decoded?;

    let rows = (0..df.height())
        .map(|ridx| {
            decoded
                .iter()
                .map(|col| col.get(ridx).cloned().unwrap_or(CellValue::Empty))
                .collect()
        })
        .collect();

    Ok(TabularData { columns, rows })
}

/// String columns become text cells; every other type keeps its polars value.
fn load_column(df: &DataFrame, col_name: &str) -> Result<Vec<CellValue>, PolarsError> {
    let column = df.column(col_name)?.rechunk();
    let dtype = column.dtype().clone();

    let cells = if dtype == DataType::String {
        column
            .str()?
            .into_iter()
            .map(|v| v.map_or(CellValue::Empty, |s| CellValue::Text(s.to_string())))
            .collect()
    } else {
        column
            .as_materialized_series()
            .iter()
            .map(|v| match v {
                AnyValue::Null => CellValue::Empty,
                v => CellValue::Native(v.into_static()),
            })
            .collect()
    };
    debug!("Decoded column \"{}\" ({:?})", col_name, dtype);
    Ok(cells)
}

fn table_to_frame(data: &TabularData) -> SortResult<DataFrame> {
    let columns = data
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| build_column(name, data.rows.iter().map(|row| &row[idx])))
        .collect::<Result<Vec<Column>, PolarsError>>()?;
    Ok(DataFrame::new(columns)?)
}

/// Native cells are written with their own type, other cells with the
/// narrowest polars type that holds every non-empty cell.
fn build_column<'a>(
    name: &str,
    cells: impl Iterator<Item = &'a CellValue> + Clone,
) -> Result<Column, PolarsError> {
    let mut non_empty = cells.clone().filter(|c| **c != CellValue::Empty);
    let native_dtype = match non_empty.clone().next() {
        Some(CellValue::Native(v)) => Some(v.dtype()),
        _ => None,
    };
    if let Some(dtype) = native_dtype {
        if non_empty
            .clone()
            .all(|c| matches!(c, CellValue::Native(v) if v.dtype() == dtype))
        {
            let values: Vec<AnyValue> = cells
                .map(|c| match c {
                    CellValue::Native(v) => v.clone(),
                    _ => AnyValue::Null,
                })
                .collect();
            let series = Series::from_any_values_and_dtype(name.into(), &values, &dtype, true)?;
            return Ok(Column::from(series));
        }
    }

    let all_int = non_empty.clone().all(|c| matches!(c, CellValue::Int(_)));
    let all_number = non_empty
        .clone()
        .all(|c| matches!(c, CellValue::Int(_) | CellValue::Float(_)));
    let all_bool = non_empty.clone().all(|c| matches!(c, CellValue::Bool(_)));
    let has_values = non_empty.next().is_some();

    let column = if has_values && all_int {
        let values: Vec<Option<i64>> = cells
            .map(|c| match c {
                CellValue::Int(i) => Some(*i),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else if has_values && all_number {
        let values: Vec<Option<f64>> = cells
            .map(|c| match c {
                CellValue::Int(i) => Some(*i as f64),
                CellValue::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else if has_values && all_bool {
        let values: Vec<Option<bool>> = cells
            .map(|c| match c {
                CellValue::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .map(|c| match c {
                CellValue::Empty => None,
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), values)
    };
    Ok(column)
}
