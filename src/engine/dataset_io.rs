//! Writes the train/test CSV split a search is opened against.
//!
//! Spec §6's file layout: `<scratch>/<request_id>/{train,test}/dataset_{TRAIN,TEST}/tables/learningData.csv`,
//! referenced to the compute client by `file://` URI. The 0.9 split point is
//! taken from the front of the filtered row set, which is already ordered by
//! the index column (see [`crate::storage::gateway::DataStoreGateway::fetch_rows`]).

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::gateway::FilteredData;

const TRAIN_FRACTION: f64 = 0.9;

pub struct DatasetSplit {
    pub train_uri: String,
    pub test_uri: String,
}

pub async fn write_train_test_split(
    scratch_base: &Path,
    request_id: &str,
    data: &FilteredData,
) -> StorageResult<DatasetSplit> {
    let split_at = (((data.rows.len() as f64) * TRAIN_FRACTION).floor() as usize).min(data.rows.len());
    let (train_rows, test_rows) = data.rows.split_at(split_at);

    let train_path = learning_data_path(scratch_base, request_id, "train", "dataset_TRAIN");
    let test_path = learning_data_path(scratch_base, request_id, "test", "dataset_TEST");

    write_csv(&train_path, &data.columns, train_rows).await?;
    write_csv(&test_path, &data.columns, test_rows).await?;

    Ok(DatasetSplit { train_uri: format!("file://{}", train_path.display()), test_uri: format!("file://{}", test_path.display()) })
}

fn learning_data_path(scratch_base: &Path, request_id: &str, split_dir: &str, dataset_dir: &str) -> PathBuf {
    scratch_base.join(request_id).join(split_dir).join(dataset_dir).join("tables").join("learningData.csv")
}

async fn write_csv(path: &Path, columns: &[String], rows: &[Vec<Value>]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns).map_err(|e| StorageError::ParseError(e.to_string()))?;
    for row in rows {
        let fields: Vec<String> = row.iter().map(value_to_field).collect();
        writer.write_record(&fields).map_err(|e| StorageError::ParseError(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| StorageError::ParseError(e.to_string()))?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

fn value_to_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
