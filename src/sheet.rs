use std::{fs, io, path::Path};

use compact_str::CompactString;
use csv::{Reader, ReaderBuilder, Writer, WriterBuilder};
use serde::Serialize;

pub fn serial_column(headers: &csv::StringRecord) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.to_ascii_lowercase().contains("serial"))
}

pub fn read_serials<R: io::Read>(mut reader: Reader<R>) -> anyhow::Result<Vec<CompactString>> {
    let headers = reader.headers()?;
    let Some(column) = serial_column(headers) else {
        anyhow::bail!("no column containing \"serial\" among {headers:?}");
    };

    let mut serials = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(cell) = record.get(column) else {
            continue;
        };
        let cell = cell.trim();
        if !cell.is_empty() {
            serials.push(cell.into());
        }
    }
    Ok(serials)
}

pub fn load_serial_numbers(path: &Path) -> anyhow::Result<Vec<CompactString>> {
    let reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
    read_serials(reader)
}

pub struct SheetWriter {
    inner: Writer<fs::File>,
}

impl SheetWriter {
    pub fn open(path: &Path, headers: &[&str]) -> anyhow::Result<Self> {
        let fresh = match fs::metadata(path) {
            Ok(m) => m.len() == 0,
            Err(_) => true,
        };
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;

        let mut inner = WriterBuilder::new().has_headers(false).from_writer(file);
        if fresh {
            inner.write_record(headers)?;
            inner.flush()?;
        }
        Ok(Self { inner })
    }

    pub fn append<T: Serialize>(&mut self, row: &T) -> anyhow::Result<()> {
        self.inner.serialize(row)?;
        self.inner.flush().map_err(Into::into)
    }
}
