use super::{CatalogItem, CatalogSearch};
use crate::error::{Error, Result};
use crate::request::QueryParams;
use reqwest::header::ACCEPT;
use roxmltree::{Document, Node};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use url::Url;

const OPENSEARCH_NS: &str = "http://a9.com/-/spec/opensearch/1.1/";
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

const ATOM_TYPE: &str = "application/atom+xml";
const OSDD_TYPE: &str = "application/opensearchdescription+xml";

/// OpenSearch access to the EO-CAT catalogue.
pub struct EoCatalogue {
    client: reqwest::Client,
    osdd_url: String,
    templates: Mutex<HashMap<String, String>>,
}

impl EoCatalogue {
    pub fn new(client: reqwest::Client, osdd_url: &str) -> Self {
        Self {
            client,
            osdd_url: osdd_url.to_string(),
            templates: Mutex::new(HashMap::new()),
        }
    }

    async fn get_text(self: &Self, url: &str, accept: Option<&str>) -> Result<String> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        let text = request.send().await?.error_for_status()?.text().await?;
        Ok(text)
    }

    /// Resolves the product search template of a collection: the catalogue
    /// description leads to the collection entry, whose own description holds
    /// the template.
    async fn product_search_template(self: &Self, collection: &str) -> Result<String> {
        if let Some(template) = self.cached_template(collection) {
            return Ok(template);
        }

        let osdd = self.get_text(&self.osdd_url, None).await?;
        let collection_template = find_template(&osdd, "collection")?;

        let mut params = QueryParams::new();
        params.set("geo:uid", collection);
        let collection_url = fill_template(&collection_template, &params)?;
        let feed = self.get_text(collection_url.as_str(), None).await?;

        let description_url = parse_feed(&feed)?
            .into_iter()
            .find_map(|entry| entry.search)
            .ok_or_else(|| {
                Error::BadResponse(format!("collection '{collection}' has no search description"))
            })?;
        let description = self.get_text(&description_url, Some(OSDD_TYPE)).await?;
        let template = find_template(&description, "results")?;

        if let Ok(mut templates) = self.templates.lock() {
            templates.insert(collection.to_string(), template.clone());
        }
        Ok(template)
    }

    fn cached_template(self: &Self, collection: &str) -> Option<String> {
        self.templates.lock().ok()?.get(collection).cloned()
    }
}

impl CatalogSearch for EoCatalogue {
    async fn search(self: &Self, collection: &str, params: &QueryParams) -> Result<Vec<CatalogItem>> {
        let template = self.product_search_template(collection).await?;
        let url = fill_template(&template, params)?;
        debug!("API request: {}", url);
        let feed = self.get_text(url.as_str(), None).await?;

        let items = parse_feed(&feed)?
            .into_iter()
            .filter_map(|entry| {
                let url = entry.enclosure?;
                let server = Url::parse(&url).ok()?.host_str()?.to_string();
                Some(CatalogItem {
                    identifier: entry.identifier,
                    server,
                    url,
                })
            })
            .collect();
        Ok(items)
    }
}

/// Builds a request URL from an OpenSearch URL template. Pairs whose value is
/// a `{name}` or `{name?}` placeholder are kept only when `params` holds a
/// value for `name`; literal pairs are kept as they are.
pub fn fill_template(template: &str, params: &QueryParams) -> Result<Url> {
    let (base, query) = template.split_once('?').unwrap_or((template, ""));
    let mut url = Url::parse(base)?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match placeholder(&value) {
                Some(name) => {
                    if let Some(value) = params.get(name) {
                        pairs.append_pair(&key, value);
                    }
                }
                None => {
                    pairs.append_pair(&key, &value);
                }
            }
        }
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    Ok(url)
}

fn placeholder(value: &str) -> Option<&str> {
    let name = value.strip_prefix('{')?.strip_suffix('}')?;
    Some(name.trim_end_matches('?'))
}

/// Picks the Atom `template` of the description's `Url` element with the
/// given `rel`.
fn find_template(osdd: &str, rel: &str) -> Result<String> {
    let doc = Document::parse(osdd)?;
    doc.descendants()
        .filter(|n| n.has_tag_name((OPENSEARCH_NS, "Url")))
        .find(|n| n.attribute("rel") == Some(rel) && n.attribute("type") == Some(ATOM_TYPE))
        .and_then(|n| n.attribute("template"))
        .map(str::to_string)
        .ok_or_else(|| Error::BadResponse(format!("no '{rel}' search template in description")))
}

#[derive(Debug, Default, PartialEq)]
struct AtomEntry {
    identifier: String,
    enclosure: Option<String>,
    search: Option<String>,
}

fn parse_feed(xml: &str) -> Result<Vec<AtomEntry>> {
    let doc = Document::parse(xml)?;
    let entries = doc
        .descendants()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
        .filter_map(AtomEntry::new)
        .collect();
    Ok(entries)
}

impl AtomEntry {
    fn new(entry: Node) -> Option<Self> {
        let identifier = entry
            .children()
            .find(|n| n.has_tag_name((DC_NS, "identifier")))?
            .text()?
            .trim()
            .to_string();
        Some(Self {
            identifier,
            enclosure: Self::link(entry, "enclosure", None),
            search: Self::link(entry, "search", Some(OSDD_TYPE)),
        })
    }

    fn link(entry: Node, rel: &str, link_type: Option<&str>) -> Option<String> {
        entry
            .children()
            .filter(|n| n.has_tag_name((ATOM_NS, "link")))
            .find(|n| {
                n.attribute("rel") == Some(rel)
                    && link_type.map_or(true, |t| n.attribute("type") == Some(t))
            })?
            .attribute("href")
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OSDD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<OpenSearchDescription xmlns="http://a9.com/-/spec/opensearch/1.1/">
  <ShortName>EO-CAT</ShortName>
  <Url type="application/json" rel="collection" template="https://eocat.esa.int/eo-catalogue/series?uid={geo:uid?}"/>
  <Url type="application/atom+xml" rel="collection" template="https://eocat.esa.int/eo-catalogue/series?httpAccept=application/atom%2Bxml&amp;uid={geo:uid?}&amp;startRecord={os:startIndex?}"/>
</OpenSearchDescription>"#;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <entry>
    <dc:identifier>ECA_EXAC_ATL_NOM_1B_20240731T134500Z_20240801T010101Z_01234E</dc:identifier>
    <link rel="enclosure" href="https://ec-pdgs-dissemination1.eo.esa.int/oads/data/EarthCAREL1Validated/ECA_EXAC_ATL_NOM_1B_20240731T134500Z_20240801T010101Z_01234E.ZIP"/>
    <link rel="search" type="application/opensearchdescription+xml" href="https://eocat.esa.int/eo-catalogue/series/EarthCAREL1Validated/api"/>
  </entry>
  <entry>
    <dc:identifier>no-links</dc:identifier>
  </entry>
</feed>"#;

    #[test]
    fn test_find_template() {
        let template = find_template(OSDD, "collection").unwrap();
        assert!(template.contains("httpAccept=application/atom%2Bxml"));
        assert!(matches!(find_template(OSDD, "results"), Err(Error::BadResponse(_))));
    }

    #[test]
    fn test_fill_template_skips_missing_params() {
        let template = find_template(OSDD, "collection").unwrap();
        let mut params = QueryParams::new();
        params.set("geo:uid", "EarthCAREL1Validated");
        let url = fill_template(&template, &params).unwrap();

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("httpAccept".to_string(), "application/atom+xml".to_string()),
                ("uid".to_string(), "EarthCAREL1Validated".to_string()),
            ]
        );
    }

    #[test]
    fn test_fill_template_default_namespace() {
        let template = "https://example.org/search?maximumRecords={os:count?}&frame={eo:frame?}";
        let mut params = QueryParams::new();
        params.set("count", "1000");
        let url = fill_template(template, &params).unwrap();
        assert_eq!(url.as_str(), "https://example.org/search?maximumRecords=1000");

        let url = fill_template(template, &QueryParams::new()).unwrap();
        assert_eq!(url.as_str(), "https://example.org/search");
    }

    #[test]
    fn test_parse_feed() {
        let entries = parse_feed(FEED).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].enclosure.as_deref().unwrap().ends_with("01234E.ZIP"));
        assert_eq!(
            entries[0].search.as_deref(),
            Some("https://eocat.esa.int/eo-catalogue/series/EarthCAREL1Validated/api")
        );
        assert_eq!(entries[1].identifier, "no-links");
        assert_eq!(entries[1].enclosure, None);
    }
}
