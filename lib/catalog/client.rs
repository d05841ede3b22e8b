//! Catalog lookups: a single fetch per query and parsing of the returned file list.

use crate::catalog::query::QueryParameters;
use crate::utils::errors::BellesubError;

use std::future::Future;
use std::time::Duration;
use url::Url;

/// KEKCC catalog host
pub const DEFAULT_CATALOG_URL: &str = "http://bweb3.cc.kek.jp/";

// Number of results logged for operator sanity checks
const PREVIEW_COUNT: usize = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Performs the lookup behind a catalog URL and returns the raw page body.
pub trait CatalogSource {
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<String, BellesubError>> + Send;
}

/// Fetches catalog pages over HTTP.
pub struct HttpCatalog {
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn new() -> Result<Self, BellesubError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Reuse an existing [`reqwest::Client`], e.g. one with custom proxy settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl CatalogSource for HttpCatalog {
    async fn fetch(&self, url: &Url) -> Result<String, BellesubError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Returns Belle mdst file lists on KEKCC based on experiment information.
///
/// # Example Usage
///
/// ```rust, ignore
/// let client = CatalogClient::new(DEFAULT_CATALOG_URL)?;
/// let mdst_list = client.get_mdst_list(&QueryParameters::new(true, 69)).await?;
/// ```
pub struct CatalogClient<S = HttpCatalog> {
    source: S,
    base_url: Url,
}

impl CatalogClient<HttpCatalog> {
    /// Create an HTTP backed client for the catalog at `base_url`
    pub fn new(base_url: &str) -> Result<Self, BellesubError> {
        Self::with_source(HttpCatalog::new()?, base_url)
    }
}

impl<S: CatalogSource> CatalogClient<S> {
    pub fn with_source(source: S, base_url: &str) -> Result<Self, BellesubError> {
        let mut base_url = Url::parse(base_url).map_err(|e| {
            BellesubError::Validation(format!("Invalid catalog url {}: {}", base_url, e))
        })?;
        // Page names are joined onto the base, which must therefore name a directory
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { source, base_url })
    }

    /// Query the catalog once and return the matching mdst paths in catalog order.
    /// An empty list means nothing matched.
    ///
    /// The query is validated before any request is made.
    pub async fn get_mdst_list(&self, query: &QueryParameters) -> Result<Vec<String>, BellesubError> {
        query.validate()?;
        let url = query.url(&self.base_url)?;

        log::info!("Getting mdst from {}", url);
        let body = self.source.fetch(&url).await?;
        let mdst_list = parse_mdst_list(&body);

        if !mdst_list.is_empty() {
            let preview = mdst_list.len().min(PREVIEW_COUNT);
            log::info!("The first {} of {} mdst files are:", preview, mdst_list.len());
            for mdst in &mdst_list[..preview] {
                log::info!("{}", mdst);
            }
        }
        Ok(mdst_list)
    }
}

/// Extract the mdst paths from a catalog page.
///
/// Entries are separated by `<br>` tags or line breaks. Every entry that is an
/// absolute path ending in `.mdst` is kept, in page order.
pub fn parse_mdst_list(body: &str) -> Vec<String> {
    strip_tags(body)
        .lines()
        .map(str::trim)
        .filter(|entry| entry.starts_with('/') && entry.ends_with(".mdst"))
        .map(str::to_string)
        .collect()
}

// Replace every markup tag with a line break
fn strip_tags(body: &str) -> String {
    let mut text = String::with_capacity(body.len());
    let mut in_tag = false;
    for c in body.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push('\n');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::query::DataType;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;

    /// Serves a canned page and remembers the requested urls
    struct StubCatalog {
        body: String,
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
    }

    impl StubCatalog {
        fn new(body: String) -> Self {
            Self {
                body,
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CatalogSource for &StubCatalog {
        async fn fetch(&self, url: &Url) -> Result<String, BellesubError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls
                .lock()
                .map_err(|e| BellesubError::Catalog(format!("{:?}", e)))?
                .push(url.to_string());
            Ok(self.body.clone())
        }
    }

    /// Page listing `count` exp 69 HadronBJ mdst files
    fn exp69_page(count: usize) -> String {
        let mut page = String::from("<html><body>\n");
        for run in 1..=count {
            page.push_str(&format!(
                "/group/belle/bdata_b/dstprod/dat/e000069/HadronBJ/0127/on_resonance/00/HadronBJ-e000069r{:06}-b20090127_0910.mdst<br>\n",
                run
            ));
        }
        page.push_str("</body></html>\n");
        page
    }

    fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/", addr)
    }

    fn local_client(base_url: &str) -> Result<CatalogClient, BellesubError> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        CatalogClient::with_source(HttpCatalog::with_client(client), base_url)
    }

    #[test]
    fn test_parse_mdst_list() {
        let body = "<html><body>Found 2 files<br />\
                    /group/belle/a/HadronBJ-e000045r000047.mdst<br>\
                    /group/belle/a/HadronBJ-e000045r000048.mdst<BR>\n\
                    mdst: listing done<br></body></html>";
        assert_eq!(
            parse_mdst_list(body),
            vec![
                "/group/belle/a/HadronBJ-e000045r000047.mdst".to_string(),
                "/group/belle/a/HadronBJ-e000045r000048.mdst".to_string(),
            ]
        );
        assert!(parse_mdst_list("").is_empty());
    }

    #[tokio::test]
    async fn test_exp69_data_fixture() -> Result<(), BellesubError> {
        let stub = StubCatalog::new(exp69_page(758));
        let client = CatalogClient::with_source(&stub, DEFAULT_CATALOG_URL)?;

        let mdst_list = client.get_mdst_list(&QueryParameters::new(true, 69)).await?;
        assert_eq!(mdst_list.len(), 758);
        assert!(mdst_list[0].ends_with("HadronBJ-e000069r000001-b20090127_0910.mdst"));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            stub.urls.lock().map_err(|e| BellesubError::Catalog(format!("{:?}", e)))?[0],
            "http://bweb3.cc.kek.jp/mdst.php?ex=69&rs=1&re=9999&skm=HadronBorJ&dt=Any&bl=caseB"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_no_matching_run_is_empty() -> Result<(), BellesubError> {
        let stub = StubCatalog::new("<html><body></body></html>".to_string());
        let client = CatalogClient::with_source(&stub, DEFAULT_CATALOG_URL)?;

        let mut query = QueryParameters::new(true, 69);
        query.data_type = DataType::Scan2S;
        assert!(client.get_mdst_list(&query).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_query_never_fetches() -> Result<(), BellesubError> {
        let stub = StubCatalog::new(exp69_page(3));
        let client = CatalogClient::with_source(&stub, DEFAULT_CATALOG_URL)?;

        let mut query = QueryParameters::new(false, 65);
        query.run_start = 10;
        query.run_end = 1;
        let res = client.get_mdst_list(&query).await;
        assert!(matches!(res, Err(BellesubError::Validation(_))));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_base_url_gets_trailing_slash() -> Result<(), BellesubError> {
        let stub = StubCatalog::new(String::new());
        let client = CatalogClient::with_source(&stub, "http://localhost:8080/belle")?;
        assert_eq!(client.base_url.as_str(), "http://localhost:8080/belle/");

        assert!(matches!(
            CatalogClient::with_source(&stub, "not a url"),
            Err(BellesubError::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_http_fetch() -> Result<(), BellesubError> {
        let body = exp69_page(2);
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let client = local_client(&serve_once(response))?;

        let mdst_list = client.get_mdst_list(&QueryParameters::new(true, 69)).await?;
        assert_eq!(mdst_list.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_status() -> Result<(), BellesubError> {
        let response =
            "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string();
        let client = local_client(&serve_once(response))?;

        let res = client.get_mdst_list(&QueryParameters::new(true, 69)).await;
        assert!(matches!(res, Err(BellesubError::Catalog(_))));
        Ok(())
    }
}
