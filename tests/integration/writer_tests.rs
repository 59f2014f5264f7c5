//! Integration tests for the output pipeline
//!
//! Fixed in-memory forums are walked through `write_url` into each writer.
//! Downloads go to a wiremock server.

use async_trait::async_trait;
use forum_dl::board::{BoardAttrs, BoardId, BoardTree};
use forum_dl::config::SessionConfig;
use forum_dl::crawler::{Adapter, Node, Page};
use forum_dl::model::{PostEntry, ThreadEntry};
use forum_dl::output::{write_url, JsonlWriter, MaildirWriter, MboxWriter, WriteOptions};
use forum_dl::{Board, Extractor, File, ForumError, NodePath, PageState, Post, Session, Thread};
use serde_json::Value;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BASE: &str = "https://forum.example/";

/// Two boards (`/a`, `/a/b`), one thread each; the first thread has a reply tree
/// spread over two pages
struct StaticForum {
    session: Session,
    base: String,
    /// Fail the second page of the first thread
    failing: bool,
    /// File URLs embedded in the first thread's root post
    files: Vec<String>,
}

impl StaticForum {
    fn new() -> Self {
        Self {
            session: Session::new(&SessionConfig::default()).unwrap(),
            base: BASE.to_string(),
            failing: false,
            files: Vec::new(),
        }
    }

    fn at(mut self, base: &str) -> Self {
        self.base = base.to_string();
        self
    }

    fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn with_files(mut self, files: &[&str]) -> Self {
        self.files = files.iter().map(|url| url.to_string()).collect();
        self
    }

    fn post(thread: &Thread, subpath: &[&str], author: &str, content: &str) -> PostEntry {
        PostEntry::Post(Post {
            path: thread.path.clone(),
            subpath: NodePath::from(subpath),
            url: thread.url.clone(),
            origin: thread.url.clone(),
            author: author.to_string(),
            creation_time: "2023-01-02T03:04:05Z".to_string(),
            content: content.to_string(),
            ..Post::default()
        })
    }

    fn file(&self, url: &str, origin: &str) -> File {
        File {
            path: NodePath::from(&["a", "t1"][..]),
            url: url.to_string(),
            origin: origin.to_string(),
            ..File::default()
        }
    }
}

#[async_trait]
impl Adapter for StaticForum {
    fn name(&self) -> &'static str {
        "static"
    }

    fn base_url(&self) -> &str {
        &self.base
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn fetch_top_boards(&self, tree: &mut BoardTree) -> forum_dl::Result<()> {
        let attrs = BoardAttrs::new(format!("{}a", self.base), "Announcements");
        tree.set_board(&NodePath::from(&["a"][..]), attrs, None)?;
        Ok(())
    }

    async fn fetch_subboards(&self, tree: &mut BoardTree, board: BoardId) -> forum_dl::Result<()> {
        if tree.get(board).path == NodePath::from(&["a"][..]) {
            let attrs = BoardAttrs::new(format!("{}a/b", self.base), "Releases").fetched(true);
            tree.set_board(&NodePath::from(&["a", "b"][..]), attrs, None)?;
        }
        Ok(())
    }

    async fn resolve_node(&self, _tree: &BoardTree, url: &str) -> forum_dl::Result<Node> {
        match url.strip_prefix(self.base.as_str()) {
            Some("") => Ok(Node::Board(NodePath::root())),
            Some(rest) if rest.ends_with(".png") => Ok(Node::File(self.file(url, url))),
            Some(rest) => Ok(Node::Board(rest.split('/').collect())),
            None => Err(ForumError::ExtractorNotFound {
                url: url.to_string(),
            }),
        }
    }

    async fn fetch_board_page(
        &self,
        board: &Board,
        _state: PageState,
    ) -> forum_dl::Result<Page<ThreadEntry>> {
        if board.path.is_root() {
            return Ok(Page::empty());
        }

        let id = if board.path.len() == 1 { "t1" } else { "t2" };
        let thread = Thread {
            path: board.path.child(id),
            url: format!("{}t/{}", self.base, id),
            origin: board.url.clone(),
            title: format!("Thread {}", id),
            ..Thread::default()
        };
        Ok(Page::new(vec![ThreadEntry::Thread(thread)], None))
    }

    async fn fetch_thread_page(
        &self,
        thread: &Thread,
        state: PageState,
    ) -> forum_dl::Result<Page<PostEntry>> {
        if thread.path.last() == Some("t2") {
            return Ok(Page::new(vec![Self::post(thread, &[], "dave", "<p>v2</p>")], None));
        }

        if state.is_first() {
            let mut items = vec![Self::post(thread, &[], "alice", "<p>Welcome</p>")];
            items.extend(
                self.files
                    .iter()
                    .map(|url| PostEntry::File(self.file(url, &thread.url))),
            );
            items.push(Self::post(thread, &["p1"], "bob", "<p>Thanks</p>"));

            let next = state.next(format!("{}?page=2", thread.url));
            Ok(Page::new(items, Some(next)))
        } else if self.failing {
            Err(ForumError::markup(state.url, "div.post"))
        } else {
            let items = vec![
                Self::post(thread, &["p1", "p2"], "carol", "<p>Agreed\nFrom now on</p>"),
                Self::post(thread, &["p3"], "erin", "<p>Late</p>"),
            ];
            Ok(Page::new(items, None))
        }
    }
}

/// Registers `/b` at the top level; `/a`'s listing later reveals it as `/a/b`
struct RelocatingForum {
    session: Session,
}

#[async_trait]
impl Adapter for RelocatingForum {
    fn name(&self) -> &'static str {
        "relocating"
    }

    fn base_url(&self) -> &str {
        BASE
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn fetch_top_boards(&self, tree: &mut BoardTree) -> forum_dl::Result<()> {
        tree.set_board(&NodePath::from(&["b"][..]), BoardAttrs::new(format!("{}b", BASE), "Releases"), None)?;
        tree.set_board(&NodePath::from(&["a"][..]), BoardAttrs::new(format!("{}a", BASE), "Announcements"), None)?;
        Ok(())
    }

    async fn fetch_subboards(&self, tree: &mut BoardTree, board: BoardId) -> forum_dl::Result<()> {
        if tree.get(board).path == NodePath::from(&["a"][..]) {
            let attrs = BoardAttrs::new(format!("{}b", BASE), "Releases").fetched(true);
            tree.set_board(
                &NodePath::from(&["a", "b"][..]),
                attrs,
                Some(&NodePath::from(&["b"][..])),
            )?;
        }
        Ok(())
    }

    async fn resolve_node(&self, _tree: &BoardTree, _url: &str) -> forum_dl::Result<Node> {
        Ok(Node::Board(NodePath::root()))
    }

    async fn fetch_board_page(
        &self,
        _board: &Board,
        _state: PageState,
    ) -> forum_dl::Result<Page<ThreadEntry>> {
        Ok(Page::empty())
    }

    async fn fetch_thread_page(
        &self,
        _thread: &Thread,
        _state: PageState,
    ) -> forum_dl::Result<Page<PostEntry>> {
        Ok(Page::empty())
    }
}

async fn extractor_for(adapter: impl Adapter + 'static) -> Extractor {
    let mut extractor = Extractor::new(Box::new(adapter));
    extractor.fetch().await.unwrap();
    extractor
}

async fn extractor() -> Extractor {
    extractor_for(StaticForum::new()).await
}

fn records(writer: JsonlWriter<Vec<u8>>) -> Vec<Value> {
    let out = String::from_utf8(writer.into_inner()).unwrap();
    out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
}

fn header<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    let prefix = format!("{}: ", name);
    message
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix(prefix.as_str()))
}

#[tokio::test]
async fn test_jsonl_walk_order() {
    let mut extractor = extractor().await;
    let mut writer = JsonlWriter::new(Vec::new());

    let stats = write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.boards, 3);
    assert_eq!(stats.threads, 2);
    assert_eq!(stats.posts, 5);
    assert!(!stats.is_partial());

    let records = records(writer);
    let kinds: Vec<&str> = records.iter().map(|r| r["type"].as_str().unwrap()).collect();

    assert_eq!(
        kinds,
        vec!["board", "board", "thread", "post", "post", "post", "post", "board", "thread", "post"]
    );
    assert_eq!(records[1]["title"], "Announcements");
    assert_eq!(records[5]["subpath"], serde_json::json!(["p1", "p2"]));
    assert_eq!(records[7]["path"], serde_json::json!(["a", "b"]));
}

#[tokio::test]
async fn test_failed_page_ends_only_its_thread() {
    let mut extractor = extractor_for(StaticForum::new().failing()).await;
    let mut writer = JsonlWriter::new(Vec::new());

    let stats = write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.failed_chains, 1);
    assert!(stats.is_partial());
    assert_eq!(stats.boards, 3);
    assert_eq!(stats.threads, 2);
    assert_eq!(stats.posts, 3);

    // The sibling board and its thread are still written
    let records = records(writer);
    let authors: Vec<&str> = records
        .iter()
        .filter(|r| r["type"] == "post")
        .map(|r| r["author"].as_str().unwrap())
        .collect();
    assert_eq!(authors, vec!["alice", "bob", "dave"]);
    assert_eq!(records.last().unwrap()["path"], serde_json::json!(["a", "b", "t2"]));
}

#[tokio::test]
async fn test_write_options_skip_posts() {
    let mut extractor = extractor().await;
    let mut writer = JsonlWriter::new(Vec::new());
    let options = WriteOptions {
        write_posts: false,
        ..WriteOptions::default()
    };

    let stats = write_url(&mut extractor, &format!("{}a", BASE), &mut writer, &options)
        .await
        .unwrap();

    assert_eq!(stats.boards, 2);
    assert_eq!(stats.threads, 2);
    assert_eq!(stats.posts, 0);
    assert_eq!(writer.records(), 4);
}

#[tokio::test]
async fn test_unknown_url_is_rejected() {
    let mut extractor = extractor().await;
    let mut writer = JsonlWriter::new(Vec::new());

    let result = write_url(
        &mut extractor,
        "https://elsewhere.example/",
        &mut writer,
        &WriteOptions::default(),
    )
    .await;

    assert!(matches!(result, Err(ForumError::ExtractorNotFound { .. })));
    assert_eq!(writer.records(), 0);
}

#[tokio::test]
async fn test_files_downloaded_and_failures_still_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"PNG".to_vec())
                .insert_header("content-type", "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = format!("{}/", server.uri());
    let forum = StaticForum::new().at(&base).with_files(&[
        &format!("{}img.png", base),
        &format!("{}missing.png", base),
    ]);
    let mut extractor = extractor_for(forum).await;

    let dir = TempDir::new().unwrap();
    let options = WriteOptions {
        write_files: true,
        files_dir: dir.path().join("files"),
        ..WriteOptions::default()
    };
    let mut writer = JsonlWriter::new(Vec::new());

    let stats = write_url(&mut extractor, &base, &mut writer, &options)
        .await
        .unwrap();

    assert_eq!(stats.files, 2);
    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.posts, 5);

    let records = records(writer);
    let files: Vec<&Value> = records.iter().filter(|r| r["type"] == "file").collect();
    assert_eq!(files.len(), 2);

    let stored = files[0]["os_path"].as_str().unwrap();
    assert!(stored.starts_with(dir.path().join("files").to_str().unwrap()));
    assert_eq!(fs::read(stored).unwrap(), b"PNG");
    assert_eq!(files[0]["content_type"], "image/png");

    assert_eq!(files[1]["url"], format!("{}missing.png", base).as_str());
    assert!(files[1]["os_path"].is_null());
}

#[tokio::test]
async fn test_file_url_needs_file_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"LOGO".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let base = format!("{}/", server.uri());
    let url = format!("{}logo.png", base);

    // Downloads off: nothing is fetched or written
    let mut extractor = extractor_for(StaticForum::new().at(&base)).await;
    let mut writer = JsonlWriter::new(Vec::new());
    let stats = write_url(&mut extractor, &url, &mut writer, &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(writer.records(), 0);

    let dir = TempDir::new().unwrap();
    let options = WriteOptions {
        write_files: true,
        files_dir: dir.path().to_path_buf(),
        ..WriteOptions::default()
    };
    let mut extractor = extractor_for(StaticForum::new().at(&base)).await;
    let mut writer = JsonlWriter::new(Vec::new());
    let stats = write_url(&mut extractor, &url, &mut writer, &options)
        .await
        .unwrap();

    assert_eq!(stats.files, 1);
    assert_eq!(stats.files_failed, 0);
    let records = records(writer);
    assert_eq!(records.len(), 1);
    assert_eq!(fs::read(records[0]["os_path"].as_str().unwrap()).unwrap(), b"LOGO");
}

#[tokio::test]
async fn test_mbox_threads_replies() {
    let mut extractor = extractor().await;
    let mut writer = MboxWriter::new(Vec::new(), "forum.example", false);

    write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(writer.messages(), 5);

    let out = String::from_utf8(writer.into_inner()).unwrap();
    let messages: Vec<&str> = out
        .split("From forum-dl ")
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.split_once('\n').unwrap().1)
        .collect();
    assert_eq!(messages.len(), 5);

    let root = messages[0];
    assert_eq!(header(root, "Message-ID"), Some("<a.t1@forum.example>"));
    assert_eq!(header(root, "Subject"), Some("Thread t1"));
    assert_eq!(header(root, "From"), Some("alice"));
    assert_eq!(header(root, "In-Reply-To"), None);

    let nested = messages[2];
    assert_eq!(header(nested, "Message-ID"), Some("<a.t1.p1.p2@forum.example>"));
    assert_eq!(header(nested, "In-Reply-To"), Some("<a.t1.p1@forum.example>"));
    assert_eq!(
        header(nested, "References"),
        Some("<a.t1@forum.example> <a.t1.p1@forum.example>")
    );
    assert!(nested.contains("\n>From now on"));

    let sibling = messages[3];
    assert_eq!(header(sibling, "In-Reply-To"), Some("<a.t1@forum.example>"));

    // A new thread starts a new reference chain
    let other = messages[4];
    assert_eq!(header(other, "Message-ID"), Some("<a.b.t2@forum.example>"));
    assert_eq!(header(other, "References"), None);
}

#[tokio::test]
async fn test_maildir_folders_per_board() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("archive");

    let mut extractor = extractor().await;
    let mut writer = MaildirWriter::create(&root, "forum.example", false).unwrap();

    write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(writer.delivered(), 5);

    let count = |folder: &std::path::Path| fs::read_dir(folder.join("new")).unwrap().count();

    assert_eq!(count(&root), 0);
    assert_eq!(count(&root.join(".a")), 4);
    assert_eq!(count(&root.join(".a.b")), 1);
    assert!(root.join(".a.b").join("maildirfolder").exists());
    assert!(root.join("cur").is_dir());
}

#[tokio::test]
async fn test_maildir_sees_relocated_boards_at_final_path() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("archive");

    let session = Session::new(&SessionConfig::default()).unwrap();
    let mut extractor = extractor_for(RelocatingForum { session }).await;
    let mut writer = MaildirWriter::create(&root, "forum.example", false).unwrap();

    write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();

    assert!(root.join(".a").is_dir());
    assert!(root.join(".a.b").join("maildirfolder").exists());
    assert!(!root.join(".b").exists());
}

#[tokio::test]
async fn test_streaming_writer_keeps_provisional_path() {
    let session = Session::new(&SessionConfig::default()).unwrap();
    let mut extractor = extractor_for(RelocatingForum { session }).await;
    let mut writer = JsonlWriter::new(Vec::new());

    write_url(&mut extractor, BASE, &mut writer, &WriteOptions::default())
        .await
        .unwrap();

    // `/b` is written before `/a`'s listing moves it
    let paths: Vec<Value> = records(writer).iter().map(|r| r["path"].clone()).collect();
    assert_eq!(
        paths,
        vec![
            serde_json::json!([]),
            serde_json::json!(["b"]),
            serde_json::json!(["a"]),
        ]
    );
}
