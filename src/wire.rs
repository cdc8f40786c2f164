use serde::Deserialize;

/// `GET /`
#[derive(Debug, Deserialize)]
pub struct Welcome {
    #[serde(default)]
    pub couchdb: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub vendor: Option<Vendor>,
}

#[derive(Debug, Deserialize)]
pub struct Vendor {
    #[serde(default)]
    pub name: Option<String>,
}

/// `GET /{db}`
#[derive(Debug, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default)]
    pub data_size: Option<u64>,
    #[serde(default)]
    pub sizes: Option<Sizes>,
    #[serde(default)]
    pub instance_start_time: Option<String>,
}

/// Size block reported by CouchDB 2.x and later in place of `data_size`.
#[derive(Debug, Deserialize)]
pub struct Sizes {
    #[serde(default)]
    pub external: Option<u64>,
}

/// `GET /_uuids`
#[derive(Debug, Deserialize)]
pub struct Uuids {
    pub uuids: Vec<String>,
}

/// `GET /{db}/_all_docs`
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
pub struct AllDocs {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    pub value: RowValue,
}

#[derive(Debug, Deserialize)]
pub struct RowValue {
    pub rev: String,
}

/// `_revisions` member of `GET /{db}/{id}?revs=true`.
#[derive(Debug, Deserialize)]
pub struct Revisions {
    pub start: u64,
    pub ids: Vec<String>,
}

/// Reply to document and attachment writes.
#[derive(Debug, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub ok: bool,
    pub id: String,
    pub rev: String,
}
