//! Summary CSV outputs of an aggregation run.

use std::fs::File;
use std::path::{Path, PathBuf};

use bs_space::ParameterSpace;
use bs_types::{HarvestError, ResultRecord};
use csv::{Writer, WriterBuilder};

pub const SUMMARY_HEADER: [&str; 5] = ["configuration-id", "success", "fitness", "generations", "solution"];

/// Fitness as it appears in per-parameter bucket cells: three decimals and a
/// signed exponent of at least two digits, e.g. `1.235e-04`.
pub fn format_bucket_fitness(fitness: f64) -> String {
    if fitness.is_nan() {
        return "nan".to_string();
    }
    if fitness.is_infinite() {
        return if fitness > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let formatted = format!("{:.3e}", fitness);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => formatted,
    }
}

/// Per-record summary file, truncated and headed once per run.
pub struct SummaryWriter {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl SummaryWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, HarvestError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| summary_error(&path, e))?;
        writer.write_record(SUMMARY_HEADER).map_err(|e| summary_error(&path, e))?;
        writer.flush().map_err(|e| HarvestError::io(&path, e))?;
        Ok(Self { path, writer, rows: 0 })
    }

    /// Append one row and flush it to disk.
    pub fn append_record(&mut self, record: &ResultRecord) -> Result<(), HarvestError> {
        let success = if record.success { "1" } else { "0" };
        let fitness = format!("{:?}", record.fitness);
        let generations = record.generations.to_string();
        self.writer
            .write_record([
                record.configuration.as_str(),
                success,
                fitness.as_str(),
                generations.as_str(),
                record.solution.as_str(),
            ])
            .map_err(|e| summary_error(&self.path, e))?;
        self.writer.flush().map_err(|e| HarvestError::io(&self.path, e))?;
        self.rows += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Formatted fitness values grouped by (dimension, digit).
#[derive(Debug, Clone)]
pub struct ParameterBuckets {
    columns: Vec<String>,
    /// Column offset of each dimension's digit 0.
    offsets: Vec<usize>,
    cells: Vec<Vec<String>>,
}

impl ParameterBuckets {
    pub fn new(space: &ParameterSpace) -> Self {
        let mut columns = Vec::new();
        let mut offsets = Vec::with_capacity(space.arity());
        for dimension in space.dimensions() {
            offsets.push(columns.len());
            columns.extend((0..dimension.cardinality()).map(|digit| format!("{}={}", dimension.name, digit)));
        }
        let cells = vec![Vec::new(); columns.len()];
        Self { columns, offsets, cells }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Add `fitness` to the bucket of each dimension's digit.
    ///
    /// `digits` must come from the same space the buckets were built for.
    pub fn record(&mut self, digits: &[usize], fitness: f64) {
        let cell = format_bucket_fitness(fitness);
        for (offset, digit) in self.offsets.iter().zip(digits) {
            if let Some(bucket) = self.cells.get_mut(offset + digit) {
                bucket.push(cell.clone());
            }
        }
    }

    pub fn bucket(&self, column: &str) -> Option<&[String]> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|index| self.cells[index].as_slice())
    }

    /// Write one column per bucket, padding shorter columns with empty cells.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), HarvestError> {
        let path = path.as_ref();
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| summary_error(path, e))?;
        writer.write_record(&self.columns).map_err(|e| summary_error(path, e))?;

        let depth = self.cells.iter().map(Vec::len).max().unwrap_or(0);
        for row in 0..depth {
            let cells = self
                .cells
                .iter()
                .map(|bucket| bucket.get(row).map(String::as_str).unwrap_or(""));
            writer.write_record(cells).map_err(|e| summary_error(path, e))?;
        }
        writer.flush().map_err(|e| HarvestError::io(path, e))?;
        Ok(())
    }
}

fn summary_error(path: &Path, error: csv::Error) -> HarvestError {
    HarvestError::Summary {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}
