use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One bounded batch of features returned by an offset query.
#[derive(Clone, Debug, PartialEq)]
pub struct FeaturePage {
    /// `resultOffset` the page was requested at.
    pub offset: u64,
    pub features: Vec<Value>,
    /// The server truncated the page below the requested size.
    pub exceeded_transfer_limit: bool,
}

impl FeaturePage {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// GeoJSON `FeatureCollection` assembled from every page of a fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Value>) -> Self {
        Self {
            kind: "FeatureCollection".to_owned(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Field definition from layer metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerField {
    pub name: String,
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Entry of a REST services directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
}
