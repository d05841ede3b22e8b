//! # KEKCC mdst catalog
//! Builds catalog query URLs for data and MC, performs the lookup and parses the returned file list.

mod client;
mod query;
pub use self::client::{
    parse_mdst_list, CatalogClient, CatalogSource, HttpCatalog, DEFAULT_CATALOG_URL,
};
pub use self::query::{DataType, EventType, QueryParameters, Stream, DATA_TYPES, EVENT_TYPES};
pub use url::Url;
