//! Tabular encoding through Arrow: CSV in, CSV or Parquet out.

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::core::types::{FileFormat, ReportRow};
use crate::io::config::TargetConfig;

/// A CSV object decoded as strings. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl CsvTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).and_then(|v| v.as_deref()))
                .collect(),
        )
    }

    /// Convert to a record batch with one nullable UTF-8 column per header.
    pub fn to_batch(&self) -> Result<RecordBatch> {
        let schema = utf8_schema(&self.columns);
        let arrays: Vec<ArrayRef> = (0..self.columns.len())
            .map(|idx| {
                let values: StringArray = self
                    .rows
                    .iter()
                    .map(|row| row.get(idx).and_then(|v| v.as_deref()))
                    .collect();
                Arc::new(values) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(schema, arrays).context("assemble string batch")
    }
}

/// Decode a UTF-8 CSV document whose first line is the header.
pub fn decode_csv(data: &[u8], delimiter: u8) -> Result<CsvTable> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(CsvTable::default());
    }
    std::str::from_utf8(data).context("csv is not valid utf-8")?;

    let format = Format::default()
        .with_header(true)
        .with_delimiter(delimiter);
    let (inferred, _) = format
        .infer_schema(Cursor::new(data), None)
        .context("read csv header")?;
    let columns: Vec<String> = inferred
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();

    // Every column is read as text; typed parsing happens where the column
    // meaning is known.
    let reader = ReaderBuilder::new(utf8_schema(&columns))
        .with_format(format)
        .build(Cursor::new(data))
        .context("open csv reader")?;

    let mut table = CsvTable::new(columns);
    for batch in reader {
        let batch = batch.context("decode csv")?;
        let arrays = batch
            .columns()
            .iter()
            .map(|col| {
                col.as_string_opt::<i32>()
                    .ok_or_else(|| anyhow!("csv column decoded as {}", col.data_type()))
            })
            .collect::<Result<Vec<_>>>()?;
        for row in 0..batch.num_rows() {
            table.rows.push(
                arrays
                    .iter()
                    .map(|arr| {
                        (arr.is_valid(row) && !arr.value(row).is_empty())
                            .then(|| arr.value(row).to_string())
                    })
                    .collect(),
            );
        }
    }
    Ok(table)
}

/// Encode a batch in the requested file format.
pub fn encode_batch(batch: &RecordBatch, format: FileFormat) -> Result<Vec<u8>> {
    match format {
        FileFormat::Csv => {
            let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
            writer.write(batch).context("encode csv")?;
            Ok(writer.into_inner())
        }
        FileFormat::Parquet => {
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut buf = Vec::new();
            let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
                .context("open parquet writer")?;
            writer.write(batch).context("encode parquet")?;
            writer.close().context("finish parquet")?;
            Ok(buf)
        }
    }
}

/// Decode a Parquet object into its record batches.
pub fn decode_parquet(data: Bytes) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(data)
        .context("open parquet reader")?
        .build()
        .context("build parquet reader")?;
    reader
        .collect::<Result<Vec<_>, _>>()
        .context("decode parquet")
}

/// Build the report 1 batch with the configured target column names.
pub fn report_batch(rows: &[ReportRow], target: &TargetConfig) -> Result<RecordBatch> {
    let schema: SchemaRef = Arc::new(Schema::new(vec![
        Field::new(&target.col_isin, DataType::Utf8, false),
        Field::new(&target.col_date, DataType::Utf8, false),
        Field::new(&target.col_op_price, DataType::Float64, false),
        Field::new(&target.col_close_price, DataType::Float64, false),
        Field::new(&target.col_min_price, DataType::Float64, false),
        Field::new(&target.col_max_price, DataType::Float64, false),
        Field::new(&target.col_daily_trade_vol, DataType::Int64, false),
        Field::new(&target.col_ch_prev_close, DataType::Float64, true),
    ]));

    let floats = |f: fn(&ReportRow) -> f64| -> ArrayRef {
        Arc::new(rows.iter().map(f).collect::<Float64Array>())
    };
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.isin.as_str()))),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.date.format("%Y-%m-%d").to_string()),
        )),
        floats(|r| r.opening_price),
        floats(|r| r.closing_price),
        floats(|r| r.minimum_price),
        floats(|r| r.maximum_price),
        Arc::new(
            rows.iter()
                .map(|r| r.daily_traded_volume)
                .collect::<Int64Array>(),
        ),
        Arc::new(
            rows.iter()
                .map(|r| r.change_prev_closing)
                .collect::<Float64Array>(),
        ),
    ];
    RecordBatch::try_new(schema, columns).context("assemble report batch")
}

fn utf8_schema(columns: &[String]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}
