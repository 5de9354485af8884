//! Executes planned search requests against the product catalogue.
mod opensearch;
pub use opensearch::{fill_template, EoCatalogue};

use crate::context::RunContext;
use crate::error::Result;
use crate::product::{parse_filename, ProductMetadata};
use crate::request::{QueryParams, SearchRequest};
use std::cmp::Reverse;
use tracing::{info, warn};

/// One entry of a catalogue result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub identifier: String,
    /// Host serving the download, e.g. `ec-pdgs-dissemination1.eo.esa.int`.
    pub server: String,
    pub url: String,
}

pub trait CatalogSearch {
    async fn search(self: &Self, collection: &str, params: &QueryParams) -> Result<Vec<CatalogItem>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundProduct {
    pub identifier: String,
    pub server: String,
    pub url: String,
    pub metadata: ProductMetadata,
}

impl From<CatalogItem> for FoundProduct {
    fn from(item: CatalogItem) -> Self {
        let metadata = parse_filename(&item.identifier);
        Self {
            identifier: item.identifier,
            server: item.server,
            url: item.url,
            metadata,
        }
    }
}

/// Keeps one file per product name and sensing start time: the one with the
/// latest processing start time.
pub fn drop_duplicate_files(mut products: Vec<FoundProduct>) -> Vec<FoundProduct> {
    products.sort_by_key(|p| {
        (
            p.metadata.product_name.clone(),
            p.metadata.sensing_start_time,
            Reverse(p.metadata.processing_start_time),
        )
    });
    products.dedup_by(|later, first| {
        later.metadata.product_name == first.metadata.product_name
            && later.metadata.sensing_start_time == first.metadata.sensing_start_time
    });
    products
}

/// Runs every request, trying its collections in order until one returns
/// results, and returns the deduplicated products sorted by identifier.
pub async fn execute(
    catalog: &impl CatalogSearch,
    requests: Vec<SearchRequest>,
    ctx: &RunContext,
) -> Result<Vec<FoundProduct>> {
    let total = requests.len();
    info!("Number of pending search requests: {}", total);

    let mut found: Vec<FoundProduct> = vec![];
    for (i, mut request) in requests.into_iter().enumerate() {
        request.restrict_collections(ctx.allowed_collections());
        info!("Search request #{}/{}: {}", i + 1, total, request);

        if request.collections().is_empty() {
            warn!(
                "No accessible collection for {}. Add the appropriate collections to the \
                 configuration file if your account may access them.",
                request.product().type_code
            );
            continue;
        }

        let params = request.query_params(ctx.limits.results_per_query);
        for collection in request.collections() {
            info!(" - Trying collection: {}", collection);
            let items = catalog.search(collection, &params).await?;
            let products = drop_duplicate_files(items.into_iter().map(FoundProduct::from).collect());
            info!(" - Request results: {}", products.len());
            if !products.is_empty() {
                found.extend(products);
                break;
            }
        }
    }

    let mut found = drop_duplicate_files(found);
    found.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::context::Limits;
    use crate::product::resolve_product_type;
    use crate::request::Filters;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const OLD: &str = "ECA_EXAC_ATL_NOM_1B_20240731T134500Z_20240801T010101Z_01234E";
    const NEW: &str = "ECA_EXAD_ATL_NOM_1B_20240731T134500Z_20240901T010101Z_01234E";
    const OTHER: &str = "ECA_EXAC_ATL_NOM_1B_20240731T140000Z_20240801T010101Z_01234F";

    fn item(identifier: &str) -> CatalogItem {
        CatalogItem {
            identifier: identifier.to_string(),
            server: "dissemination.example.org".to_string(),
            url: format!("https://dissemination.example.org/oads/data/{identifier}.ZIP"),
        }
    }

    #[derive(Default)]
    struct MockCatalog {
        results: HashMap<String, Vec<CatalogItem>>,
        calls: Mutex<Vec<String>>,
    }

    impl CatalogSearch for MockCatalog {
        async fn search(self: &Self, collection: &str, _params: &QueryParams) -> Result<Vec<CatalogItem>> {
            self.calls.lock().unwrap().push(collection.to_string());
            Ok(self.results.get(collection).cloned().unwrap_or_default())
        }
    }

    fn context(collections: &[&str]) -> RunContext {
        RunContext::with_credentials(Credentials {
            username: "user".to_string(),
            password: "secret".to_string(),
            collections: collections.iter().map(|c| c.to_string()).collect(),
        })
        .with_limits(Limits::default())
    }

    fn request(collections: &[&str]) -> SearchRequest {
        SearchRequest::new(
            resolve_product_type("ANOM").unwrap(),
            collections.iter().map(|c| c.to_string()).collect(),
            Filters::default(),
            50,
        )
        .unwrap()
    }

    #[test]
    fn test_drop_duplicate_files_keeps_latest_processing() {
        let products = vec![item(OLD), item(OTHER), item(NEW)]
            .into_iter()
            .map(FoundProduct::from)
            .collect();
        let kept = drop_duplicate_files(products);
        let ids: Vec<&str> = kept.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec![NEW, OTHER]);
    }

    #[tokio::test]
    async fn test_stops_at_first_collection_with_results() {
        let mut catalog = MockCatalog::default();
        catalog.results.insert("C".to_string(), vec![item(OLD)]);
        catalog.results.insert("D".to_string(), vec![item(OTHER)]);
        let ctx = context(&["B", "C", "D"]);

        let found = execute(&catalog, vec![request(&["A", "B", "C", "D"])], &ctx)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].identifier, OLD);
        assert_eq!(found[0].metadata.orbit_number, 1234);
        assert_eq!(*catalog.calls.lock().unwrap(), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_skips_request_without_allowed_collection() {
        let catalog = MockCatalog::default();
        let ctx = context(&["X"]);
        let found = execute(&catalog, vec![request(&["A"])], &ctx).await.unwrap();
        assert!(found.is_empty());
        assert!(catalog.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_are_merged_deduplicated_and_sorted() {
        let mut catalog = MockCatalog::default();
        catalog.results.insert("A".to_string(), vec![item(OTHER), item(OLD)]);
        catalog.results.insert("B".to_string(), vec![item(NEW)]);
        let ctx = context(&["A", "B"]);

        let found = execute(&catalog, vec![request(&["A"]), request(&["B"])], &ctx)
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec![OTHER, NEW]);
    }
}
