//! Integration tests for the session and the reference adapters
//!
//! These tests use wiremock to create mock forum servers and run detection,
//! board discovery and pagination end-to-end.

use forum_dl::config::SessionConfig;
use forum_dl::crawler::Request;
use forum_dl::output::{write_url, JsonlWriter, WriteOptions};
use forum_dl::{detect, Extractor, ForumError, NodePath, Session};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Session with a tiny backoff so retry tests stay fast
fn test_session(max_attempts: u32) -> Session {
    Session::new(&SessionConfig {
        max_attempts,
        backoff_ms: 1,
        ..SessionConfig::default()
    })
    .expect("Failed to build session")
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.to_string())
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Writes everything below `url` as JSON Lines and parses the records back
async fn crawl_to_records(extractor: &mut Extractor, url: &str) -> Vec<Value> {
    let mut writer = JsonlWriter::new(Vec::new());
    let stats = write_url(extractor, url, &mut writer, &WriteOptions::default())
        .await
        .expect("write_url failed");
    assert_eq!(stats.failed_chains, 0);

    let out = String::from_utf8(writer.into_inner()).unwrap();
    out.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// `type:path` summary of each record
fn summarize(records: &[Value]) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            let path: Vec<&str> = record["path"]
                .as_array()
                .unwrap()
                .iter()
                .map(|segment| segment.as_str().unwrap())
                .collect();
            format!("{}:/{}", record["type"].as_str().unwrap(), path.join("/"))
        })
        .collect()
}

// ===== Session =====

#[tokio::test]
async fn test_cached_request_hits_network_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("<p>hi</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(1);
    let url = format!("{}/page", server.uri());

    let first = session.get_cached(&url).await.unwrap();
    let second = session.get_cached(&url).await.unwrap();
    assert_eq!(first.content, second.content);
    assert_eq!(second.text(), "<p>hi</p>");
}

#[tokio::test]
async fn test_plain_request_consumes_cached_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(1);
    let url = format!("{}/page", server.uri());
    let request = Request::new(url.as_str());

    session.get_cached(&url).await.unwrap();
    assert!(session.cached(&request.key()).is_some());

    session.get(&url).await.unwrap();
    assert!(session.cached(&request.key()).is_none());

    let again = session.get(&url).await;
    assert!(matches!(again, Err(ForumError::CycleDetected { .. })));
}

#[tokio::test]
async fn test_repeated_plain_request_is_a_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let session = test_session(1);
    let url = format!("{}/page", server.uri());

    session.get(&url).await.unwrap();
    let result = session.get(&url).await;
    assert!(matches!(result, Err(ForumError::CycleDetected { .. })));

    // Different params are a different request
    let paged = session
        .request(Request::new(url.as_str()).param("page", "2"))
        .await;
    assert!(paged.is_ok());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(html("recovered"))
        .mount(&server)
        .await;

    let session = test_session(3);
    let response = session
        .get(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "recovered");
}

#[tokio::test]
async fn test_not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(5);
    let result = session.get(&format!("{}/missing", server.uri())).await;

    assert!(matches!(
        result,
        Err(ForumError::HttpStatus { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_retry_budget_exhaustion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let session = test_session(2);
    let result = session.get(&format!("{}/down", server.uri())).await;

    match result {
        Err(ForumError::Transport { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected a transport error, got {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn test_forbidden_and_no_retry_return_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(403).set_body_string("members only"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .expect(1)
        .mount(&server)
        .await;

    let session = test_session(3);

    let forbidden = session.get(&format!("{}/private", server.uri())).await.unwrap();
    assert_eq!(forbidden.status, 403);

    let response = session
        .request(Request::new(format!("{}/missing", server.uri())).no_retry())
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.text(), "nope");
}

// ===== Discourse =====

fn hello_topic() -> Value {
    json!({
        "id": 10,
        "slug": "hello",
        "title": "Hello",
        "category_id": 1,
        "post_stream": {
            "posts": [{
                "id": 100, "post_number": 1, "topic_id": 10, "topic_slug": "hello",
                "username": "alice", "created_at": "2023-01-02T03:04:05Z",
                "cooked": "<p>First <img src=\"/uploads/a.png\"></p>"
            }],
            "stream": [100, 101]
        }
    })
}

async fn mount_discourse(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><meta name="generator" content="Discourse 3.1.0"></head><body></body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/site.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "categories": [
                {"id": 1, "slug": "general", "name": "General"},
                {"id": 2, "slug": "help", "name": "Help", "parent_category_id": 1}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/c/general/1.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "topic_list": {
                "topics": [{"id": 10, "slug": "hello", "title": "Hello"}],
                "more_topics_url": "/c/general/1/l/latest?page=1"
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/c/general/1/l/latest.json"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "topic_list": {
                "topics": [{"id": 11, "slug": "world", "title": "World"}]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/c/help/2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "topic_list": {"topics": []}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/t/hello/10.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hello_topic()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/t/10/posts.json"))
        .and(query_param("post_ids[]", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post_stream": {
                "posts": [{
                    "id": 101, "post_number": 2, "topic_id": 10, "topic_slug": "hello",
                    "username": "bob", "cooked": "<p>Reply</p>"
                }]
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/t/world/11.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "slug": "world",
            "title": "World",
            "category_id": 1,
            "post_stream": {
                "posts": [{
                    "id": 102, "post_number": 1, "topic_id": 11, "topic_slug": "world",
                    "username": "carol", "cooked": "<p>Hi</p>"
                }],
                "stream": [102]
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_discourse_detection_and_categories() {
    let server = MockServer::start().await;
    mount_discourse(&server).await;

    let session = Arc::new(test_session(1));
    let adapter = detect(session, &server.uri()).await.unwrap();
    assert_eq!(adapter.name(), "discourse");
    assert_eq!(adapter.base_url(), format!("{}/", server.uri()));

    let mut extractor = Extractor::new(adapter);
    extractor.fetch().await.unwrap();

    let help = extractor
        .find_board(&NodePath::from(&["1", "2"][..]))
        .await
        .unwrap();
    assert_eq!(extractor.board(help).title, "Help");
    assert_eq!(extractor.board(help).url, format!("{}/c/help/2", server.uri()));
    assert!(extractor.tree().is_fetched(help));
}

#[tokio::test]
async fn test_discourse_full_crawl() {
    let server = MockServer::start().await;
    mount_discourse(&server).await;

    let session = Arc::new(test_session(1));
    let url = format!("{}/", server.uri());
    let mut extractor = Extractor::new(detect(session, &url).await.unwrap());
    extractor.fetch().await.unwrap();

    let records = crawl_to_records(&mut extractor, &url).await;

    assert_eq!(
        summarize(&records),
        vec![
            "board:/",
            "board:/1",
            "thread:/1/10",
            "post:/1/10",
            "post:/1/10",
            "thread:/1/11",
            "post:/1/11",
            "board:/1/2",
        ]
    );

    assert_eq!(records[3]["subpath"], json!([]));
    assert_eq!(records[3]["author"], "alice");
    assert_eq!(records[4]["subpath"], json!(["101"]));
    assert_eq!(records[4]["author"], "bob");

    // The rest of the post stream is fetched in one batch
    let requests = server.received_requests().await.unwrap();
    let batches = requests
        .iter()
        .filter(|request| request.url.path() == "/t/10/posts.json")
        .count();
    assert_eq!(batches, 1);
}

#[tokio::test]
async fn test_discourse_thread_url_resolves_to_thread() {
    let server = MockServer::start().await;
    mount_discourse(&server).await;

    // Topic URLs are resolved through the id-only endpoint
    Mock::given(method("GET"))
        .and(path("/t/10.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hello_topic()))
        .expect(1)
        .mount(&server)
        .await;

    let session = Arc::new(test_session(1));
    let mut extractor = Extractor::new(detect(session, &server.uri()).await.unwrap());
    extractor.fetch().await.unwrap();

    let records = crawl_to_records(&mut extractor, &format!("{}/t/hello/10", server.uri())).await;
    assert_eq!(
        summarize(&records),
        vec!["thread:/1/10", "post:/1/10", "post:/1/10"]
    );
    assert_eq!(records[0]["title"], "Hello");
}

// ===== phpBB =====

async fn mount_phpbb(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/index.php"))
        .respond_with(html(
            r#"<html><body>
            <ul class="topiclist"><li class="header"><a href="./viewforum.php?f=1">Category</a></li></ul>
            <ul class="topiclist forums"><li><a class="forumtitle" href="./viewforum.php?f=2">Support</a></li></ul>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "1"))
        .respond_with(html(
            r#"<html><body>
            <ul class="breadcrumbs"><li><a href="./index.php">Board index</a></li>
            <li><a href="./viewforum.php?f=1">Category</a></li></ul>
            <ul class="forums"><li><a class="forumtitle" href="./viewforum.php?f=2">Support</a></li></ul>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    // Page 2 of forum 2; registered before page 1 so it wins for start=25
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "2"))
        .and(query_param("start", "25"))
        .respond_with(html(
            r#"<html><body>
            <ul class="breadcrumbs"><li><a href="./viewforum.php?f=1">Category</a></li>
            <li><a href="./viewforum.php?f=2">Support</a></li></ul>
            <a class="topictitle" href="./viewtopic.php?t=11">Second</a>
            <a href="./viewforum.php?f=2&amp;start=0">1</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .and(query_param("f", "2"))
        .respond_with(html(
            r#"<html><body>
            <ul class="breadcrumbs"><li><a href="./viewforum.php?f=1">Category</a></li>
            <li><a href="./viewforum.php?f=2">Support</a></li></ul>
            <a class="topictitle" href="./viewtopic.php?t=10&amp;sid=abc">First</a>
            <a href="./viewforum.php?f=2&amp;start=25">2</a>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    // Without a forum id phpBB answers with its error page
    Mock::given(method("GET"))
        .and(path("/viewforum.php"))
        .respond_with(html(
            "<html><body><p>The forum you selected does not exist.</p></body></html>",
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "10"))
        .respond_with(html(
            r#"<html><body>
            <ul class="breadcrumbs"><li><a href="./viewforum.php?f=1">Category</a></li>
            <li><a href="./viewforum.php?f=2">Support</a></li></ul>
            <h2 class="topic-title"><a href="./viewtopic.php?t=10">First</a></h2>
            <div class="post" id="p100"><p class="author"><a class="username">alice</a></p>
              <div class="content">Question</div></div>
            <div class="post" id="p101"><p class="author"><a class="username">bob</a></p>
              <div class="content">Answer</div></div>
            </body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/viewtopic.php"))
        .and(query_param("t", "11"))
        .respond_with(html(
            r#"<html><body>
            <div class="post" id="p200"><p class="author"><span class="username-coloured">carol</span></p>
              <div class="content">Another</div></div>
            </body></html>"#,
        ))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_phpbb_detection() {
    let server = MockServer::start().await;
    mount_phpbb(&server).await;

    let session = Arc::new(test_session(1));
    let adapter = detect(session, &format!("{}/", server.uri())).await.unwrap();

    assert_eq!(adapter.name(), "phpbb");
    assert_eq!(adapter.base_url(), format!("{}/", server.uri()));
}

#[tokio::test]
async fn test_unknown_forum_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(html("<html><body>just a blog</body></html>"))
        .mount(&server)
        .await;

    let session = Arc::new(test_session(1));
    let result = detect(session, &server.uri()).await;

    match result {
        Err(e) => assert!(e.is_not_found()),
        Ok(adapter) => panic!("unexpected adapter {}", adapter.name()),
    }
}

#[tokio::test]
async fn test_phpbb_breadcrumbs_relocate_provisional_forum() {
    let server = MockServer::start().await;
    mount_phpbb(&server).await;

    let session = Arc::new(test_session(1));
    let mut extractor = Extractor::new(detect(session, &server.uri()).await.unwrap());
    extractor.fetch().await.unwrap();

    // The index lists both forums at the top level
    assert!(extractor.tree().lookup(&NodePath::from(&["2"][..])).is_some());

    let category = extractor
        .find_board(&NodePath::from(&["1"][..]))
        .await
        .unwrap();
    let children = extractor.subboards(category).await;

    assert_eq!(children.len(), 1);
    assert_eq!(extractor.board(children[0]).path, NodePath::from(&["1", "2"][..]));
    assert_eq!(extractor.board(children[0]).title, "Support");
    assert!(extractor.tree().lookup(&NodePath::from(&["2"][..])).is_none());
}

#[tokio::test]
async fn test_phpbb_full_crawl_follows_pagination() {
    let server = MockServer::start().await;
    mount_phpbb(&server).await;

    let session = Arc::new(test_session(1));
    let url = format!("{}/", server.uri());
    let mut extractor = Extractor::new(detect(session, &url).await.unwrap());
    extractor.fetch().await.unwrap();

    let records = crawl_to_records(&mut extractor, &url).await;

    assert_eq!(
        summarize(&records),
        vec![
            "board:/",
            "board:/1",
            "board:/1/2",
            "thread:/1/2/10",
            "post:/1/2/10",
            "post:/1/2/10",
            "thread:/1/2/11",
            "post:/1/2/11",
        ]
    );

    assert_eq!(records[3]["title"], "First");
    assert_eq!(records[4]["subpath"], json!([]));
    assert_eq!(records[4]["author"], "alice");
    assert_eq!(records[5]["subpath"], json!(["101"]));
    assert_eq!(records[7]["author"], "carol");
}

#[tokio::test]
async fn test_phpbb_topic_url_resolves_through_breadcrumbs() {
    let server = MockServer::start().await;
    mount_phpbb(&server).await;

    let session = Arc::new(test_session(1));
    let mut extractor = Extractor::new(detect(session, &server.uri()).await.unwrap());
    extractor.fetch().await.unwrap();

    let records = crawl_to_records(
        &mut extractor,
        &format!("{}/viewtopic.php?f=2&t=10", server.uri()),
    )
    .await;

    assert_eq!(
        summarize(&records),
        vec!["thread:/1/2/10", "post:/1/2/10", "post:/1/2/10"]
    );
}
