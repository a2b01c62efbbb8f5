use crate::BoundingBox;

const GEOMETRY_TYPE_ENVELOPE: &str = "esriGeometryEnvelope";
const SPATIAL_REL_INTERSECTS: &str = "esriSpatialRelIntersects";

/// Query parameters as sent on the wire.
pub type QueryParams = Vec<(&'static str, String)>;

/// One logical layer fetch: the predicate shared by the count query and
/// every page query.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerQuery {
    layer_url: String,
    where_clause: String,
    out_fields: Vec<String>,
    geometry: Option<BoundingBox>,
    return_geometry: bool,
    max_records: Option<u64>,
}

impl LayerQuery {
    /// Matches every feature of the layer (`where=1=1`, `outFields=*`).
    pub fn new(layer_url: impl Into<String>) -> Self {
        Self {
            layer_url: layer_url.into().trim_end_matches('/').to_owned(),
            where_clause: "1=1".to_owned(),
            out_fields: vec!["*".to_owned()],
            geometry: None,
            return_geometry: true,
            max_records: None,
        }
    }

    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = where_clause.into();
        self
    }

    /// An empty list falls back to `*`.
    pub fn with_out_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        self.out_fields = if fields.is_empty() {
            vec!["*".to_owned()]
        } else {
            fields
        };
        self
    }

    pub fn with_geometry(mut self, geometry: BoundingBox) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_return_geometry(mut self, return_geometry: bool) -> Self {
        self.return_geometry = return_geometry;
        self
    }

    /// Caps this fetch only; the client configuration is left untouched.
    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn layer_url(&self) -> &str {
        &self.layer_url
    }

    pub fn where_clause(&self) -> &str {
        &self.where_clause
    }

    pub fn geometry(&self) -> Option<&BoundingBox> {
        self.geometry.as_ref()
    }

    pub fn max_records(&self) -> Option<u64> {
        self.max_records
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.layer_url)
    }

    pub fn count_params(&self) -> QueryParams {
        let mut params = vec![
            ("where", self.where_clause.clone()),
            ("returnCountOnly", "true".to_owned()),
            ("f", "json".to_owned()),
        ];
        push_geometry_params(&mut params, self.geometry.as_ref());
        params
    }

    pub fn page_request(&self, offset: u64, page_size: u64) -> PageRequest {
        PageRequest {
            layer_url: self.layer_url.clone(),
            where_clause: self.where_clause.clone(),
            out_fields: self.out_fields.join(","),
            geometry: self.geometry,
            return_geometry: self.return_geometry,
            offset,
            page_size,
        }
    }
}

/// Fully determines one page query.
#[derive(Clone, Debug, PartialEq)]
pub struct PageRequest {
    layer_url: String,
    where_clause: String,
    out_fields: String,
    geometry: Option<BoundingBox>,
    return_geometry: bool,
    offset: u64,
    page_size: u64,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn query_url(&self) -> String {
        format!("{}/query", self.layer_url)
    }

    pub fn params(&self) -> QueryParams {
        let mut params = vec![
            ("where", self.where_clause.clone()),
            ("outFields", self.out_fields.clone()),
            ("returnGeometry", self.return_geometry.to_string()),
            ("resultOffset", self.offset.to_string()),
            ("resultRecordCount", self.page_size.to_string()),
            ("f", "geojson".to_owned()),
        ];
        push_geometry_params(&mut params, self.geometry.as_ref());
        params
    }
}

fn push_geometry_params(params: &mut QueryParams, geometry: Option<&BoundingBox>) {
    if let Some(bbox) = geometry {
        let wkid = bbox.wkid().to_string();
        params.extend([
            ("geometry", bbox.to_envelope()),
            ("geometryType", GEOMETRY_TYPE_ENVELOPE.to_owned()),
            ("spatialRel", SPATIAL_REL_INTERSECTS.to_owned()),
            ("inSR", wkid.clone()),
            ("outSR", wkid),
        ]);
    }
}
