use serde::Deserialize;
use serde_json::Value;

/// `{"error": {"code": 498, "message": "Invalid token.", "details": []}}`
#[derive(Debug, Deserialize)]
pub struct ServiceErrorEnvelope {
    pub error: ServiceError,
}

#[derive(Debug, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<Value>,
}

impl ServiceError {
    pub fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("service error");
        if self.details.is_empty() {
            message.to_owned()
        } else {
            let details: Vec<String> = self
                .details
                .iter()
                .map(|detail| match detail {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect();
            format!("{message} ({})", details.join("; "))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Page body in either GeoJSON or esri JSON output.
///
/// GeoJSON output reports the transfer limit under `properties`.
#[derive(Debug, Deserialize)]
pub struct PageResponse {
    pub features: Vec<Value>,
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: Option<bool>,
    #[serde(default)]
    pub properties: Option<PageProperties>,
}

#[derive(Debug, Deserialize)]
pub struct PageProperties {
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: Option<bool>,
}

impl PageResponse {
    pub fn exceeded_transfer_limit(&self) -> bool {
        self.exceeded_transfer_limit
            .or_else(|| {
                self.properties
                    .as_ref()
                    .and_then(|props| props.exceeded_transfer_limit)
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
pub struct LayerInfo {
    #[serde(default)]
    pub fields: Vec<crate::LayerField>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceDirectory {
    #[serde(default)]
    pub services: Vec<crate::ServiceEntry>,
}
