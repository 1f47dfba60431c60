//! Static catalog of offerings.
//!
//! The catalog is an externally supplied JSON document, one per backend kind.
//! It is read on every request so operators can edit it without a restart.

use std::path::{Path, PathBuf};

use crate::backend::ProvisionerKind;
use crate::error::BrokerError;

#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// The catalog document for `kind` inside `dir`.
    pub fn for_kind(dir: impl AsRef<Path>, kind: ProvisionerKind) -> Self {
        Self {
            path: dir.as_ref().join(kind.catalog_file()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the document. It must be a JSON object with a
    /// `services` array; it is otherwise returned verbatim.
    pub async fn load(&self) -> Result<serde_json::Value, BrokerError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "catalog read failed");
            BrokerError::Io("catalog document could not be read".to_string())
        })?;

        let doc: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "catalog parse failed");
            BrokerError::Io("catalog document is not valid JSON".to_string())
        })?;

        if !doc.get("services").map(|s| s.is_array()).unwrap_or(false) {
            tracing::error!(path = %self.path.display(), "catalog has no services array");
            return Err(BrokerError::Io(
                "catalog document has no services array".to_string(),
            ));
        }
        Ok(doc)
    }
}
