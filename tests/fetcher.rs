use imoveis_scout::config::FetchConfig;
use imoveis_scout::error::FetchError;
use imoveis_scout::jobs::run_site;
use imoveis_scout::models::Category;
use imoveis_scout::scrapers::sites::SOLAR;
use imoveis_scout::scrapers::{CrawlOptions, HttpFetcher, PageSource};
use imoveis_scout::store::ListingStore;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config() -> FetchConfig {
    FetchConfig {
        max_retries: 2,
        retry_interval_ms: 10,
        max_retry_interval_ms: 50,
        polite_delay_ms: 0,
        polite_jitter_ms: 0,
        timeout_secs: 5,
        ..FetchConfig::default()
    }
}

fn fetcher(server: &MockServer) -> HttpFetcher {
    HttpFetcher::new(&format!("{}/", server.uri()), fast_config()).unwrap()
}

#[tokio::test]
async fn test_fetch_returns_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/imoveis-para-venda.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = fetcher(&mock_server)
        .fetch("imoveis-para-venda.php?pagina=1")
        .await
        .unwrap();
    assert_eq!(body, "<html>ok</html>");
}

#[tokio::test]
async fn test_fetch_retries_transient_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let body = fetcher(&mock_server).fetch("flaky").await.unwrap();
    assert_eq!(body, "recovered");
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server).fetch("down").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status, .. } if status.as_u16() == 502));
}

#[tokio::test]
async fn test_fetch_does_not_retry_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = fetcher(&mock_server).fetch("missing").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status, .. } if status.as_u16() == 404));
}

#[tokio::test]
async fn test_crawl_over_http() {
    let mock_server = MockServer::start().await;

    let page = r#"
        <html><body>
          <div class="ltn__product-item">
            <div class="product-badge"><ul><li><span class="code_style">274</span></li></ul></div>
            <div class="product-price"><div class="venda">R$ 399.000,00</div></div>
            <h2 class="imov-title"><a href="detalhes-imovel-venda.php?id_imovel=274">Centro - Erechim</a></h2>
          </div>
        </body></html>
    "#;
    Mock::given(method("GET"))
        .and(path("/imoveis-para-venda.php"))
        .and(query_param("pagina", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/imoveis-para-venda.php"))
        .and(query_param("pagina", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
        .mount(&mock_server)
        .await;

    let store = ListingStore::open_in_memory().unwrap();
    let source = fetcher(&mock_server);
    let options = CrawlOptions {
        max_pages: None,
        fetch_details: false,
    };

    let reports = run_site(&SOLAR, &source, &[Category::Sale], options, true, &store)
        .await
        .unwrap();

    assert_eq!(reports[0].pages, 1);
    assert_eq!(reports[0].upserted, 1);
    let stored = store.find("solar", "274", Category::Sale).unwrap().unwrap();
    assert_eq!(stored.price_brl, Some(399_000.0));
}

#[tokio::test]
async fn test_failing_listing_page_ends_pass() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let store = ListingStore::open_in_memory().unwrap();
    let source = fetcher(&mock_server);

    let reports = run_site(&SOLAR, &source, &[Category::Rental], CrawlOptions::default(), true, &store)
        .await
        .unwrap();

    assert_eq!(reports[0].pages, 0);
    assert_eq!(reports[0].cards_seen, 0);
    assert_eq!(store.count().unwrap(), 0);
}
