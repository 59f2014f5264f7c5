//! phpBB adapter
//!
//! phpBB only reveals where a forum sits through the breadcrumbs of its own
//! `viewforum.php` page. The index lists forums without their nesting, so they
//! are registered at the top level first and moved under their real parent once
//! that parent's page (or their own) has been seen.
//!
//! Listings paginate with a `start` offset; the next page is the smallest offset
//! linked from the current page that is larger than the current one.
//!
//! Only topic pages are scanned for embedded files. Forum listings carry nothing
//! but the style's own chrome, so board pages yield threads only.

use crate::adapters::{select_all, select_first, text_of};
use crate::board::{BoardAttrs, BoardId, BoardTree};
use crate::crawler::{collect_files, scan_fragment, Adapter, FileScope, Node, Page, Request, Session};
use crate::model::{Board, NodePath, Post, PostEntry, Thread, ThreadEntry};
use crate::state::PageState;
use crate::url::{last_segment, normalize_url, query_param, relative_path, resolve_link, NormalizeOptions};
use crate::{ForumError, Result};
use async_trait::async_trait;
use scraper::Html;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

pub const NAME: &str = "phpbb";

/// Text of the page phpBB serves for `viewforum.php` without a forum id
const FORUM_MISSING: &str = "The forum you selected does not exist.";

const PAGE_SUFFIXES: &[&str] = &["viewforum.php", "viewtopic.php"];

/// A forum link: id, canonical URL, title
#[derive(Debug, Clone, PartialEq)]
struct ForumLink {
    id: String,
    url: String,
    title: String,
}

/// Forum hierarchy as seen from one index or viewforum page
#[derive(Debug, Default)]
struct ForumListing {
    /// Breadcrumb forums, outermost first
    trail: Vec<ForumLink>,
    /// Forums listed on the page, excluding the trail
    forums: Vec<ForumLink>,
}

/// Adapter for phpBB forums
pub struct PhpbbAdapter {
    session: Arc<Session>,
    base_url: Url,
}

impl PhpbbAdapter {
    pub fn new(session: Arc<Session>, base_url: Url) -> Self {
        Self { session, base_url }
    }

    /// Recognizes phpBB by its "forum does not exist" page
    pub async fn detect(session: Arc<Session>, url: &str) -> Result<Option<Self>> {
        let base = normalize_url(url, &suffix_options())?;
        let listing = base.join("viewforum.php")?;

        let response = session
            .request(Request::new(listing.as_str()).no_retry())
            .await?;

        if !response.text().contains(FORUM_MISSING) {
            return Ok(None);
        }

        let base_url = normalize_url(&response.url, &suffix_options())?;
        tracing::debug!("Detected {} forum at {}", NAME, base_url);

        Ok(Some(Self::new(session, base_url)))
    }

    fn forum_url(&self, id: &str) -> String {
        self.join(&format!("viewforum.php?f={}", id))
    }

    fn topic_url(&self, id: &str) -> String {
        self.join(&format!("viewtopic.php?t={}", id))
    }

    fn join(&self, relative: &str) -> String {
        self.base_url
            .join(relative)
            .map(String::from)
            .unwrap_or_else(|_| format!("{}{}", self.base_url, relative))
    }

    /// Query value `key` of `url` if it is a `script` page of this forum
    fn page_param(&self, url: &Url, script: &str, key: &str) -> Option<String> {
        if last_segment(url) != Some(script) || relative_path(url, &self.base_url).is_err() {
            return None;
        }
        query_param(url, key)
    }

    fn forum_id(&self, url: &Url) -> Option<String> {
        self.page_param(url, "viewforum.php", "f")
    }

    fn topic_id(&self, url: &Url) -> Option<String> {
        self.page_param(url, "viewtopic.php", "t")
    }

    /// Smallest `start` offset above `current` among `script` links for `id`
    fn next_start(&self, root: scraper::ElementRef<'_>, page_url: &Url, script: &str, key: &str, id: &str, current: u32) -> Option<u32> {
        select_all(root, "a[href]")
            .into_iter()
            .filter_map(|anchor| resolve_link(anchor.value().attr("href")?, page_url))
            .filter(|url| self.page_param(url, script, key).as_deref() == Some(id))
            .filter_map(|url| query_param(&url, "start")?.parse::<u32>().ok())
            .filter(|&start| start > current)
            .min()
    }

    fn parse_forum_listing(&self, html: &str, page_url: &Url) -> ForumListing {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let mut listing = ForumListing::default();

        for anchor in select_all(root, ".breadcrumbs a[href]") {
            let Some(url) = anchor.value().attr("href").and_then(|href| resolve_link(href, page_url)) else {
                continue;
            };
            if let Some(id) = self.forum_id(&url) {
                listing.trail.push(ForumLink {
                    url: self.forum_url(&id),
                    title: text_of(anchor),
                    id,
                });
            }
        }

        let mut seen: HashSet<String> = listing.trail.iter().map(|link| link.id.clone()).collect();
        if let Some(own) = query_param(page_url, "f") {
            seen.insert(own);
        }

        for anchor in select_all(root, "a.forumtitle[href], li.header a[href]") {
            let Some(url) = anchor.value().attr("href").and_then(|href| resolve_link(href, page_url)) else {
                continue;
            };
            let Some(id) = self.forum_id(&url) else {
                continue;
            };
            if seen.insert(id.clone()) {
                listing.forums.push(ForumLink {
                    url: self.forum_url(&id),
                    title: text_of(anchor),
                    id,
                });
            }
        }

        listing
    }

    /// Registers `link` at `path`, moving a board with the same id found elsewhere
    fn place(tree: &mut BoardTree, path: &NodePath, link: &ForumLink, origin: &str, fetched: bool) -> Result<BoardId> {
        let stray = tree
            .find(|board| board.path.last() == Some(link.id.as_str()) && !path.starts_with(&board.path))
            .map(|id| tree.get(id).path.clone());

        let mut attrs = BoardAttrs::new(link.url.as_str(), link.title.as_str()).origin(origin);
        if fetched {
            attrs = attrs.fetched(true);
        }

        tree.set_board(path, attrs, stray.as_ref())
    }

    fn parse_board_page(&self, html: &str, board: &Board, page_url: &Url, origin: &str) -> Result<Page<ThreadEntry>> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let forum_id = board.path.last().unwrap_or_default();

        let mut anchors = select_all(root, "a.topictitle[href]");
        if anchors.is_empty() {
            anchors = select_all(root, "a[href]");
        }

        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in anchors {
            let Some(url) = anchor.value().attr("href").and_then(|href| resolve_link(href, page_url)) else {
                continue;
            };
            let Some(id) = self.topic_id(&url) else {
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            items.push(ThreadEntry::Thread(Thread {
                path: board.path.child(id.as_str()),
                url: self.topic_url(&id),
                origin: origin.to_string(),
                title: text_of(anchor),
                ..Thread::default()
            }));
        }

        let current = start_of(page_url);
        let next = self
            .next_start(root, page_url, "viewforum.php", "f", forum_id, current)
            .map(|start| self.join(&format!("viewforum.php?f={}&start={}", forum_id, start)));

        Ok(Page::new(items, next.map(|url| PageState::new(url))))
    }

    fn parse_thread_page(&self, html: &str, thread: &Thread, state: &PageState, page_url: &Url, origin: &str) -> Result<Page<PostEntry>> {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let topic_id = thread
            .path
            .last()
            .map(str::to_string)
            .or_else(|| query_param(page_url, "t"))
            .ok_or_else(|| ForumError::markup(origin, "topic id"))?;

        let blocks = select_all(root, "div.post");
        let current = start_of(page_url);

        if blocks.is_empty() && state.is_first() {
            return Err(ForumError::markup(origin, "div.post"));
        }

        let mut items = Vec::new();
        // Post-level URLs, kept out of the page-level pass
        let mut page_seen = HashSet::new();

        for (index, block) in blocks.into_iter().enumerate() {
            let post_id = block
                .value()
                .id()
                .map(|id| id.trim_start_matches('p').to_string())
                .unwrap_or_else(|| (current as usize + index).to_string());

            let subpath = if state.is_first() && index == 0 {
                NodePath::root()
            } else {
                NodePath::root().child(post_id.as_str())
            };

            let author = select_first(block, ".author .username, .author .username-coloured")
                .map(text_of)
                .unwrap_or_default();
            let creation_time = select_first(block, ".author time")
                .and_then(|time| time.value().attr("datetime").map(str::to_string).or_else(|| Some(text_of(time))))
                .unwrap_or_default();
            let content = select_first(block, "div.content")
                .map(|content| content.inner_html())
                .unwrap_or_default();

            let mut post_seen = HashSet::new();
            let files = scan_fragment(
                &content,
                page_url,
                FileScope {
                    path: &thread.path,
                    subpath: &subpath,
                    origin,
                },
                &mut post_seen,
            );
            page_seen.extend(post_seen);

            items.push(PostEntry::Post(Post {
                path: thread.path.clone(),
                subpath,
                url: self.join(&format!("viewtopic.php?p={0}#p{0}", post_id)),
                origin: origin.to_string(),
                author,
                creation_time,
                content,
                ..Post::default()
            }));
            items.extend(files.into_iter().map(PostEntry::File));
        }

        let page_root = NodePath::root();
        let page_files = collect_files(
            root,
            page_url,
            FileScope {
                path: &thread.path,
                subpath: &page_root,
                origin,
            },
            &mut page_seen,
        );
        items.extend(page_files.into_iter().map(PostEntry::File));

        let next = self
            .next_start(root, page_url, "viewtopic.php", "t", &topic_id, current)
            .map(|start| state.next(self.join(&format!("viewtopic.php?t={}&start={}", topic_id, start))));

        Ok(Page::new(items, next))
    }
}

#[async_trait]
impl Adapter for PhpbbAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn session(&self) -> &Session {
        &self.session
    }

    async fn fetch_top_boards(&self, tree: &mut BoardTree) -> Result<()> {
        let response = self.session.get_cached(&self.join("index.php")).await?;
        let page_url = Url::parse(&response.url)?;
        let listing = self.parse_forum_listing(&response.text(), &page_url);

        for link in &listing.forums {
            // Known boards keep their place; new ones wait at the top level
            if tree.find(|board| board.path.last() == Some(link.id.as_str())).is_none() {
                let path = NodePath::root().child(link.id.as_str());
                Self::place(tree, &path, link, &response.url, false)?;
            }
        }

        Ok(())
    }

    async fn fetch_subboards(&self, tree: &mut BoardTree, board: BoardId) -> Result<()> {
        let path = tree.get(board).path.clone();
        let Some(id) = path.last().map(str::to_string) else {
            return Ok(());
        };

        let response = self.session.get_cached(&self.forum_url(&id)).await?;
        let page_url = Url::parse(&response.url)?;

        if relative_path(&page_url, &self.base_url).is_err() {
            tracing::debug!("Forum {} redirected off-site to {}", id, response.url);
            return Ok(());
        }

        let listing = self.parse_forum_listing(&response.text(), &page_url);

        // Breadcrumbs give the true path of every ancestor and of this forum
        let mut trail_path = NodePath::root();
        for link in &listing.trail {
            trail_path = trail_path.child(link.id.as_str());
            let is_self = link.id == id;
            Self::place(tree, &trail_path, link, &response.url, is_self)?;
        }

        let own_path = if listing.trail.last().map(|link| link.id.as_str()) == Some(id.as_str()) {
            trail_path
        } else {
            tree.get(board).path.clone()
        };

        for link in &listing.forums {
            Self::place(tree, &own_path.child(link.id.as_str()), link, &response.url, false)?;
        }

        Ok(())
    }

    async fn resolve_node(&self, _tree: &BoardTree, url: &str) -> Result<Node> {
        // The board index itself
        if normalize_url(url, &NormalizeOptions::default())? == self.base_url {
            return Ok(Node::Board(NodePath::root()));
        }

        let response = self.session.get_cached(url).await?;
        let keep = NormalizeOptions {
            keep_queries: &["f", "t"],
            ..NormalizeOptions::default()
        };
        let resolved = normalize_url(&response.url, &keep)?;

        match last_segment(&resolved) {
            Some("viewforum.php") => {
                let Some(id) = query_param(&resolved, "f") else {
                    return Ok(Node::Board(NodePath::root()));
                };

                let listing = self.parse_forum_listing(&response.text(), &resolved);
                let mut trail: Vec<String> = listing.trail.into_iter().map(|link| link.url).collect();
                let own = self.forum_url(&id);
                if trail.last() != Some(&own) {
                    trail.push(own);
                }

                Ok(Node::BoardTrail(trail))
            }
            Some("viewtopic.php") => {
                let id = query_param(&resolved, "t").ok_or_else(|| ForumError::markup(url, "topic id"))?;
                let (board_path, title) = self.parse_topic_header(&response.text(), &resolved);

                Ok(Node::Thread(Thread {
                    path: board_path.child(id.as_str()),
                    url: self.topic_url(&id),
                    origin: response.url.clone(),
                    title,
                    ..Thread::default()
                }))
            }
            _ if normalize_url(resolved.as_str(), &suffix_options())? == self.base_url => {
                Ok(Node::Board(NodePath::root()))
            }
            _ => Err(ForumError::ExtractorNotFound {
                url: url.to_string(),
            }),
        }
    }

    async fn fetch_board_page(&self, board: &Board, state: PageState) -> Result<Page<ThreadEntry>> {
        let Some(forum_id) = board.path.last() else {
            return Ok(Page::empty());
        };

        // Placeholder boards have no URL of their own yet
        let url = if state.url.is_empty() {
            self.forum_url(forum_id)
        } else {
            state.url.clone()
        };

        let response = self.session.get(&url).await?;
        let page_url = Url::parse(&response.url)?;
        let page = self.parse_board_page(&response.text(), board, &page_url, &response.url)?;

        Ok(Page::new(
            page.items,
            page.next.map(|next| state.next(next.url)),
        ))
    }

    async fn fetch_thread_page(&self, thread: &Thread, state: PageState) -> Result<Page<PostEntry>> {
        let response = self.session.get(&state.url).await?;
        let page_url = Url::parse(&response.url)?;
        self.parse_thread_page(&response.text(), thread, &state, &page_url, &response.url)
    }
}

impl PhpbbAdapter {
    /// Board path from a topic page's breadcrumbs, and the topic title
    fn parse_topic_header(&self, html: &str, page_url: &Url) -> (NodePath, String) {
        let listing = self.parse_forum_listing(html, page_url);
        let path = listing.trail.into_iter().map(|link| link.id).collect();

        let document = Html::parse_document(html);
        let root = document.root_element();
        let title = select_first(root, "h2.topic-title a, h2.topic-title, h2 a")
            .map(text_of)
            .unwrap_or_default();

        (path, title)
    }
}

fn suffix_options() -> NormalizeOptions<'static> {
    NormalizeOptions {
        remove_suffixes: PAGE_SUFFIXES,
        ..NormalizeOptions::default()
    }
}

fn start_of(url: &Url) -> u32 {
    query_param(url, "start")
        .and_then(|start| start.parse().ok())
        .unwrap_or(0)
}
