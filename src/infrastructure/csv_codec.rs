// CSV codec - Reading uploads and writing the converted series and forecast
use crate::domain::forecast::ForecastTable;
use crate::domain::series::CanonicalSeries;
use crate::domain::table::{IngestError, RawTable};
use anyhow::Context;
use std::path::Path;

const UTF8_BOM: &str = "\u{feff}";

/// Parse uploaded bytes into a raw table. The first record is the header;
/// every record must have the same number of fields.
pub fn read_raw_table(bytes: &[u8]) -> Result<RawTable, IngestError> {
    let text = std::str::from_utf8(bytes).map_err(|_| IngestError::NotUtf8)?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);
    if text.trim().is_empty() {
        return Err(IngestError::Empty);
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::Malformed(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(IngestError::Empty);
    }

    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                .map_err(|e| IngestError::Malformed(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTable::new(columns, rows))
}

/// `ds,y` with one row per point.
pub fn encode_series(series: &CanonicalSeries) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["ds", "y"])?;
    for point in series.points() {
        writer.write_record([point.ds.as_str(), point.y.to_string().as_str()])?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV writer: {}", e.error()))
}

pub fn encode_forecast(table: &ForecastTable) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(table.record(row))?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flushing CSV writer: {}", e.error()))
}

/// Overwrite `path` with the converted series.
pub async fn write_series_artifact(path: &Path, series: &CanonicalSeries) -> anyhow::Result<()> {
    let body = encode_series(series)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), rows = series.len(), "converted data written");
    Ok(())
}
