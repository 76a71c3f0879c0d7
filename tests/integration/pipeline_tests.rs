//! Integration tests for the harvest pipeline
//!
//! These tests use wiremock to serve a small news site and run the full
//! discover, fetch and merge cycle end-to-end over the HTTP renderer.

use paper_harvest::config::{parse_config, Config};
use paper_harvest::crawler::Coordinator;
use paper_harvest::storage::{lock_storage, Storage};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Builds a validated configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &TempDir, archive: bool) -> Config {
    let archive_line = if archive {
        format!(
            "archive-dir = \"{}\"",
            dir.path().join("archive").display()
        )
    } else {
        String::new()
    };

    let toml = format!(
        r#"
[site]
base-url = "{base}"
link-selector = "a.link-layer-imt"
date-selector = "p.date[data-field='distributionDate']"
date-format = "%d/%m/%Y, %H:%M"
body-selector = "div[data-field='body']"

[crawler]
max-pages = 20
empty-streak-limit = 3
max-category-workers = 2
page-timeout-ms = 2000

[fetcher]
workers = 4
navigation-timeout-ms = 2000
scroll-pause-ms = 100
settle-ms = 100

[user-agent]
crawler-name = "TestHarvest"
crawler-version = "1.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
staging-dir = "{staging}"
{archive_line}

[[categories]]
id = 1
url = "{base}/tai-chinh.htm"
"#,
        base = base_url,
        db = dir.path().join("news.db").display(),
        staging = dir.path().join("staging").display(),
        archive_line = archive_line,
    );

    parse_config(&toml).expect("Test config should be valid")
}

fn listing(hrefs: &[&str]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|href| format!(r#"<h3><a class="link-layer-imt" href="{}">story</a></h3>"#, href))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

fn article(date: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{}</p>", p)).collect();
    format!(
        r#"<html><body>
        <p class="date" data-field="distributionDate">{}</p>
        <div data-field="body">{}</div>
        </body></html>"#,
        date, body
    )
}

async fn mount_html(server: &MockServer, route: &str, page: Option<&str>, html: String) {
    let mock = Mock::given(method("GET")).and(path(route));
    let mock = match page {
        Some(page) => mock.and(query_param("page", page)),
        None => mock,
    };
    mock.respond_with(
        ResponseTemplate::new(200)
            .set_body_string(html)
            .insert_header("content-type", "text/html; charset=utf-8"),
    )
    .mount(server)
    .await;
}

/// Mounts a category with two listing pages of stories; later pages repeat page 1
async fn mount_site(server: &MockServer) {
    mount_html(
        server,
        "/tai-chinh.htm",
        Some("1"),
        listing(&["/gia-vang.htm", "/ty-gia.htm"]),
    )
    .await;
    mount_html(
        server,
        "/tai-chinh.htm",
        Some("2"),
        listing(&["/ty-gia.htm", "/lai-suat.htm"]),
    )
    .await;
    // Fallback for every other page number
    mount_html(server, "/tai-chinh.htm", None, listing(&["/gia-vang.htm"])).await;

    mount_html(
        server,
        "/gia-vang.htm",
        None,
        article("01/03/2024, 09:30", &["Gold rises.", "Demand is strong."]),
    )
    .await;
    mount_html(
        server,
        "/ty-gia.htm",
        None,
        article("01/03/2024, 10:15", &["Exchange rate steady."]),
    )
    .await;
    mount_html(
        server,
        "/lai-suat.htm",
        None,
        article("02/03/2024, 08:00", &["Rates fall."]),
    )
    .await;
}

#[tokio::test]
async fn test_full_pipeline_single_category() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir, true);

    let coordinator = Coordinator::new(config).expect("Failed to create coordinator");
    let summary = coordinator.run().await.expect("Harvest failed");

    let report = &summary.discovered["tai-chinh"];
    assert_eq!(report.outcome.links.len(), 3);
    // Pages 1-2 yield links, pages 3-5 only repeat them
    assert_eq!(report.outcome.pages_visited, 5);

    assert_eq!(summary.fetch_successes(), 3);
    assert_eq!(summary.fetch_failures(), 0);
    assert_eq!(summary.links.totals().inserted, 3);
    assert_eq!(summary.contents.totals().inserted, 3);

    {
        let storage = lock_storage(coordinator.storage()).unwrap();
        assert_eq!(storage.count_links(Some(1)).unwrap(), 3);
        assert_eq!(storage.count_contents(Some(1)).unwrap(), 3);
        assert_eq!(storage.max_link_sequence(1).unwrap(), 3);
        assert_eq!(storage.max_content_sequence(1).unwrap(), 3);
    }

    // Staging is drained after the merge
    assert!(coordinator.staging().list_link_batches().unwrap().is_empty());
    assert!(coordinator
        .staging()
        .list_content_batches()
        .unwrap()
        .is_empty());

    // Bodies are archived per category
    let archived = dir
        .path()
        .join("archive")
        .join("tai-chinh")
        .join("2024-03-01-09-30-gia-vang.txt");
    assert_eq!(
        std::fs::read_to_string(archived).unwrap(),
        "Gold rises.\n\nDemand is strong."
    );
}

#[tokio::test]
async fn test_second_run_adds_nothing() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let dir = TempDir::new().unwrap();

    let first = Coordinator::new(create_test_config(&mock_server.uri(), &dir, false))
        .expect("Failed to create coordinator");
    first.run().await.expect("First harvest failed");
    drop(first);

    let second = Coordinator::new(create_test_config(&mock_server.uri(), &dir, false))
        .expect("Failed to reopen coordinator");
    let summary = second.run().await.expect("Second harvest failed");

    let report = &summary.discovered["tai-chinh"];
    assert!(report.outcome.links.is_empty());
    // Every page is empty now: the streak ends the crawl at page 3
    assert_eq!(report.outcome.pages_visited, 3);
    assert!(summary.fetched.is_empty());

    let storage = lock_storage(second.storage()).unwrap();
    assert_eq!(storage.count_links(None).unwrap(), 3);
    assert_eq!(storage.count_contents(None).unwrap(), 3);
    assert_eq!(storage.max_link_sequence(1).unwrap(), 3);
}

#[tokio::test]
async fn test_staged_run_resumes_after_interruption() {
    let mock_server = MockServer::start().await;
    mount_site(&mock_server).await;

    let dir = TempDir::new().unwrap();

    // The first run only discovers, as if it died before fetching
    let interrupted = Coordinator::new(create_test_config(&mock_server.uri(), &dir, false))
        .expect("Failed to create coordinator");
    interrupted.discover_all().await.expect("Discovery failed");
    assert_eq!(
        interrupted.staging().list_link_batches().unwrap(),
        vec!["tai-chinh".to_string()]
    );
    drop(interrupted);

    let resumed = Coordinator::new(create_test_config(&mock_server.uri(), &dir, false))
        .expect("Failed to reopen coordinator");
    let summary = resumed.run().await.expect("Resumed harvest failed");

    // Nothing new to discover; the leftover batch is fetched and merged
    assert!(summary.discovered["tai-chinh"].outcome.links.is_empty());
    assert_eq!(summary.discovered["tai-chinh"].staged, 3);
    assert_eq!(summary.fetch_successes(), 3);

    let storage = lock_storage(resumed.storage()).unwrap();
    assert_eq!(storage.count_links(Some(1)).unwrap(), 3);
    assert_eq!(storage.count_contents(Some(1)).unwrap(), 3);
    assert_eq!(storage.max_link_sequence(1).unwrap(), 3);
}

#[tokio::test]
async fn test_missing_article_is_isolated() {
    let mock_server = MockServer::start().await;
    mount_html(
        &mock_server,
        "/tai-chinh.htm",
        Some("1"),
        listing(&["/gia-vang.htm", "/mat-tich.htm"]),
    )
    .await;
    mount_html(&mock_server, "/tai-chinh.htm", None, listing(&[])).await;
    mount_html(
        &mock_server,
        "/gia-vang.htm",
        None,
        article("01/03/2024, 09:30", &["Gold rises."]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/mat-tich.htm"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let coordinator = Coordinator::new(create_test_config(&mock_server.uri(), &dir, false))
        .expect("Failed to create coordinator");
    let summary = coordinator.run().await.expect("Harvest failed");

    assert_eq!(summary.fetch_successes(), 1);
    assert_eq!(summary.fetch_failures(), 1);

    let storage = lock_storage(coordinator.storage()).unwrap();
    // Both links are stored; only the reachable article has content
    assert_eq!(storage.count_links(Some(1)).unwrap(), 2);
    assert_eq!(storage.count_contents(Some(1)).unwrap(), 1);
}
