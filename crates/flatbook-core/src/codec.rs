//! Serialisation of a [`Dataset`] into its artifact forms: Parquet for the columnar copy,
//! an xlsx workbook for the spreadsheet copy, and CSV for exports.

use std::io::Cursor;

use polars::io::parquet::write::{ParquetCompression, ParquetWriter, StatisticsOptions};
use polars::prelude::*;
use rust_xlsxwriter::{Workbook, XlsxError};
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError, Scalar};

pub const PARQUET_CONTENT_TYPE: &str = "application/vnd.apache.parquet";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Largest magnitude a spreadsheet number cell holds without rounding.
const EXACT_SHEET_INTEGER: u64 = 1 << 53;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to flush CSV buffer: {0}")]
    Io(#[from] std::io::Error),
    #[error("column '{column}' has unsupported type {dtype}")]
    UnsupportedColumn { column: String, dtype: String },
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error("dataset of {rows} rows and {columns} columns does not fit in a worksheet")]
    SheetLimit { rows: usize, columns: usize },
    #[error(transparent)]
    Shape(#[from] DatasetError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Text,
}

/// Narrowest type that holds every non-null value of a column.
fn column_kind<'a>(values: impl Iterator<Item = &'a Scalar>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for value in values {
        let next = match value {
            Scalar::Null => continue,
            Scalar::Bool(_) => ColumnKind::Boolean,
            Scalar::Int(_) => ColumnKind::Integer,
            Scalar::Float(_) => ColumnKind::Float,
            Scalar::Text(_) => return ColumnKind::Text,
        };
        kind = Some(match (kind, next) {
            (None, next) => next,
            (Some(current), next) if current == next => current,
            (Some(ColumnKind::Integer), ColumnKind::Float)
            | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
            _ => return ColumnKind::Text,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

pub fn to_dataframe(dataset: &Dataset) -> Result<DataFrame, CodecError> {
    let mut columns: Vec<Column> = Vec::with_capacity(dataset.columns().len());

    for (position, name) in dataset.columns().iter().enumerate() {
        let values = || dataset.rows().iter().map(move |row| &row[position]);
        let name: PlSmallStr = name.as_str().into();

        let series = match column_kind(values()) {
            ColumnKind::Boolean => {
                let data: Vec<Option<bool>> = values()
                    .map(|value| match value {
                        Scalar::Bool(flag) => Some(*flag),
                        _ => None,
                    })
                    .collect();
                Series::new(name, data)
            }
            ColumnKind::Integer => {
                let data: Vec<Option<i64>> = values()
                    .map(|value| match value {
                        Scalar::Int(number) => Some(*number),
                        _ => None,
                    })
                    .collect();
                Series::new(name, data)
            }
            ColumnKind::Float => {
                let data: Vec<Option<f64>> = values()
                    .map(|value| match value {
                        Scalar::Int(number) => Some(*number as f64),
                        Scalar::Float(number) => Some(*number),
                        _ => None,
                    })
                    .collect();
                Series::new(name, data)
            }
            ColumnKind::Text => {
                let data: Vec<Option<String>> = values()
                    .map(|value| (!value.is_null()).then(|| value.to_string()))
                    .collect();
                Series::new(name, data)
            }
        };
        columns.push(series.into());
    }

    Ok(DataFrame::new(columns)?)
}

pub fn from_dataframe(df: &DataFrame) -> Result<Dataset, CodecError> {
    let height = df.height();
    let mut names = Vec::with_capacity(df.width());
    let mut rows: Vec<Vec<Scalar>> = (0..height)
        .map(|_| Vec::with_capacity(df.width()))
        .collect();

    for column in df.get_columns() {
        names.push(column.name().to_string());
        let values = column_scalars(column)?;
        for (row, value) in rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    Ok(Dataset::from_parts(names, rows)?)
}

fn column_scalars(column: &Column) -> Result<Vec<Scalar>, CodecError> {
    let series = column.as_materialized_series();
    let values = match series.dtype() {
        DataType::Null => vec![Scalar::Null; series.len()],
        DataType::Boolean => series
            .bool()?
            .into_iter()
            .map(|value| value.map_or(Scalar::Null, Scalar::Bool))
            .collect(),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let cast = series.cast(&DataType::Int64)?;
            cast.i64()?
                .into_iter()
                .map(|value| value.map_or(Scalar::Null, Scalar::Int))
                .collect()
        }
        DataType::UInt64 | DataType::Float32 | DataType::Float64 => {
            let cast = series.cast(&DataType::Float64)?;
            cast.f64()?
                .into_iter()
                .map(|value| value.map_or(Scalar::Null, Scalar::Float))
                .collect()
        }
        DataType::String => text_scalars(series)?,
        // Temporal and other foreign columns are kept as their text rendering.
        other => match series.cast(&DataType::String) {
            Ok(cast) => text_scalars(&cast)?,
            Err(_) => {
                return Err(CodecError::UnsupportedColumn {
                    column: series.name().to_string(),
                    dtype: other.to_string(),
                })
            }
        },
    };
    Ok(values)
}

fn text_scalars(series: &Series) -> Result<Vec<Scalar>, CodecError> {
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map_or(Scalar::Null, |text| Scalar::Text(text.to_string())))
        .collect())
}

pub fn encode_parquet(dataset: &Dataset) -> Result<Vec<u8>, CodecError> {
    let mut df = to_dataframe(dataset)?;
    let mut buffer = Vec::new();
    {
        let mut cursor = Cursor::new(&mut buffer);
        ParquetWriter::new(&mut cursor)
            .with_compression(ParquetCompression::Zstd(None))
            .with_statistics(StatisticsOptions::default())
            .finish(&mut df)?;
    }
    Ok(buffer)
}

pub fn decode_parquet(bytes: &[u8]) -> Result<Dataset, CodecError> {
    let df = ParquetReader::new(Cursor::new(bytes)).finish()?;
    from_dataframe(&df)
}

/// Single worksheet named `sheet_name`: the header row, then one row per record. Null
/// cells are left empty; integers beyond what a number cell holds exactly are written as
/// text.
pub fn encode_xlsx(dataset: &Dataset, sheet_name: &str) -> Result<Vec<u8>, CodecError> {
    let limit = || CodecError::SheetLimit {
        rows: dataset.len(),
        columns: dataset.columns().len(),
    };

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet_name)?;

    for (position, name) in dataset.columns().iter().enumerate() {
        let column = u16::try_from(position).map_err(|_| limit())?;
        worksheet.write_string(0, column, name.as_str())?;
    }

    for (index, values) in dataset.rows().iter().enumerate() {
        let row = u32::try_from(index + 1).map_err(|_| limit())?;
        for (position, value) in values.iter().enumerate() {
            let column = u16::try_from(position).map_err(|_| limit())?;
            match value {
                Scalar::Null => {}
                Scalar::Bool(flag) => {
                    worksheet.write_boolean(row, column, *flag)?;
                }
                Scalar::Int(number) if number.unsigned_abs() <= EXACT_SHEET_INTEGER => {
                    worksheet.write_number(row, column, *number as f64)?;
                }
                Scalar::Float(number) if number.is_finite() => {
                    worksheet.write_number(row, column, *number)?;
                }
                other => {
                    worksheet.write_string(row, column, other.to_string())?;
                }
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Header row is the column set; null cells are written empty.
pub fn encode_csv(dataset: &Dataset) -> Result<Vec<u8>, CodecError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(dataset.columns())?;
    for row in dataset.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    writer.into_inner().map_err(|err| CodecError::Io(err.into_error()))
}
