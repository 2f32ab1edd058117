//! Synthetic anonymized medical data and its registration.
//!
//! Records are deterministic so repeated runs produce the same dataset. When
//! a data API key is configured the dataset is registered remotely, otherwise
//! (or on any API failure) it is written to disk and referenced by a
//! content-derived `ipfs://` URI.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::DataConfig;
use crate::error::DataError;

pub const DEFAULT_DATA_TYPE: &str = "drug_discovery_data";
pub const DEFAULT_RECORD_COUNT: usize = 100;
/// Returned when the API accepts the data but omits a reference.
pub const UNKNOWN_REFERENCE: &str = "API_REFERENCE_UNKNOWN";
pub const CSV_FILE_NAME: &str = "anonymized_medical_data.csv";

const DIAGNOSIS_CODES: [&str; 6] = ["C00", "C18", "J45", "I10", "E11", "F32"];
const TREATMENT_OUTCOMES: [&str; 3] = ["Improved", "Stable", "Worsened"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizedRecord {
    pub patient_id_hash: String,
    pub age_group: String,
    pub diagnosis_code: String,
    pub treatment_outcome: String,
}

pub fn generate_anonymized_records(count: usize) -> Vec<AnonymizedRecord> {
    (0..count)
        .map(|i| {
            let decade = i % 7 + 1;
            AnonymizedRecord {
                patient_id_hash: hex_digest(format!("patient_{i}").as_bytes()),
                age_group: format!("{}-{}", 10 * decade, 10 * (decade + 1) - 1),
                diagnosis_code: DIAGNOSIS_CODES[i % DIAGNOSIS_CODES.len()].to_string(),
                treatment_outcome: TREATMENT_OUTCOMES[i % TREATMENT_OUTCOMES.len()].to_string(),
            }
        })
        .collect()
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Write the records as CSV with a header row.
pub fn write_csv(records: &[AnonymizedRecord], path: &Path) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Where a dataset ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataReference {
    /// Reference handed back by the data API.
    Registered(String),
    /// Written locally; `uri` is the content-derived `ipfs://` reference.
    Local { uri: String, path: PathBuf },
}

impl DataReference {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Registered(reference) => reference,
            Self::Local { uri, .. } => uri,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    #[serde(default)]
    data_reference: Option<String>,
}

pub struct DataProvider {
    client: Client,
    api_key: Option<SecretString>,
    base_url: String,
    out_dir: PathBuf,
}

impl DataProvider {
    pub fn new(config: &DataConfig, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.clone(),
            out_dir: out_dir.into(),
        }
    }

    /// Register the dataset with the data API, or fall back to local storage.
    pub async fn make_data_available(
        &self,
        records: &[AnonymizedRecord],
        data_type: &str,
    ) -> Result<DataReference, DataError> {
        let Some(api_key) = &self.api_key else {
            tracing::info!("DATA_API_KEY not set; storing {} locally", data_type);
            return self.store_locally(records, data_type);
        };

        match self.register(api_key, records, data_type).await {
            Ok(reference) => {
                tracing::info!(reference = %reference, "Dataset registered with data API");
                Ok(DataReference::Registered(reference))
            }
            Err(e) => {
                tracing::warn!("Data API registration failed: {}. Falling back to local storage", e);
                self.store_locally(records, data_type)
            }
        }
    }

    async fn register(
        &self,
        api_key: &SecretString,
        records: &[AnonymizedRecord],
        data_type: &str,
    ) -> Result<String, DataError> {
        let url = format!("{}/data/register", self.base_url);
        let payload = json!({
            "dataType": data_type,
            "dataContent": records,
            "metadata": { "source": "simulated_hospital_A", "anonymized": true },
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DataError::Api(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::Api(format!("HTTP {status}")));
        }
        let body: RegisterResponse = response
            .json()
            .await
            .map_err(|e| DataError::Api(format!("invalid response body: {e}")))?;
        Ok(body
            .data_reference
            .unwrap_or_else(|| UNKNOWN_REFERENCE.to_string()))
    }

    /// Write `anonymized_data_<type>.json` and derive an `ipfs://` reference
    /// from the compact JSON encoding.
    pub fn store_locally(
        &self,
        records: &[AnonymizedRecord],
        data_type: &str,
    ) -> Result<DataReference, DataError> {
        std::fs::create_dir_all(&self.out_dir)?;
        let path = self.out_dir.join(format!("anonymized_data_{data_type}.json"));

        let mut pretty = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut pretty, formatter);
        records.serialize(&mut serializer)?;
        std::fs::write(&path, pretty)?;

        let compact = serde_json::to_vec(records)?;
        let uri = format!("ipfs://{}", hex_digest(&compact));
        tracing::info!(path = %path.display(), uri = %uri, "Dataset stored locally");
        Ok(DataReference::Local { uri, path })
    }
}
