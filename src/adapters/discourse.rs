//! Discourse adapter
//!
//! Discourse serves every page as JSON when `.json` is appended. Categories come
//! from `site.json` in one go, so the whole board tree is known after the top
//! fetch. A topic's first page carries the full post-id stream; later pages ask
//! `posts.json` for the next batch of ids, which travel in `PageState::pending`.

use crate::adapters::{select_all, select_first};
use crate::board::{BoardAttrs, BoardId, BoardTree};
use crate::crawler::{scan_fragment, Adapter, FileScope, Node, Page, Request, Session};
use crate::model::{Attributes, Board, File, NodePath, Post, PostEntry, Thread, ThreadEntry};
use crate::state::PageState;
use crate::url::{normalize_url, relative_path, NormalizeOptions};
use crate::{ForumError, Result};
use async_trait::async_trait;
use scraper::Html;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

pub const NAME: &str = "discourse";

/// Post ids requested per `posts.json` call
const POST_BATCH: usize = 20;

#[derive(Debug, Deserialize)]
struct Site {
    categories: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Category {
    id: u64,
    slug: String,
    name: String,
    #[serde(default)]
    parent_category_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TopicListPage {
    topic_list: TopicList,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    topics: Vec<Value>,
    #[serde(default)]
    more_topics_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopicSummary {
    id: u64,
    slug: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct TopicPage {
    id: u64,
    slug: String,
    title: String,
    #[serde(default)]
    category_id: Option<u64>,
    post_stream: PostStream,
}

#[derive(Debug, Deserialize)]
struct PostBatch {
    post_stream: PostStream,
}

#[derive(Debug, Deserialize)]
struct PostStream {
    posts: Vec<Value>,
    #[serde(default)]
    stream: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct PostData {
    id: u64,
    post_number: u64,
    topic_id: u64,
    #[serde(default)]
    topic_slug: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    cooked: Option<String>,
}

/// Adapter for Discourse forums
pub struct DiscourseAdapter {
    session: Arc<Session>,
    base_url: Url,
}

impl DiscourseAdapter {
    pub fn new(session: Arc<Session>, base_url: Url) -> Self {
        Self { session, base_url }
    }

    /// Recognizes a Discourse page by its crawler navigation or generator tag
    pub async fn detect(session: Arc<Session>, url: &str) -> Result<Option<Self>> {
        let trimmed = url.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".json").unwrap_or(trimmed);
        let page_url = normalize_url(trimmed, &NormalizeOptions::default())?;

        let response = session
            .request(Request::new(page_url.as_str()).cached().no_retry())
            .await?;

        let Some(home) = find_home_link(&response.text()) else {
            return Ok(None);
        };

        let base = Url::parse(&response.url)?.join(&home)?;
        let base_url = normalize_url(base.as_str(), &NormalizeOptions::default())?;
        tracing::debug!("Detected {} forum at {}", NAME, base_url);

        Ok(Some(Self::new(session, base_url)))
    }

    fn url(&self, relative: &str) -> Result<String> {
        Ok(self.base_url.join(relative)?.to_string())
    }

    /// Path segments of `url` below the forum root, without a `.json` suffix
    fn parts(&self, url: &str) -> Result<Vec<String>> {
        let url = url.strip_suffix(".json").unwrap_or(url);
        let relative = relative_path(&Url::parse(url)?, &self.base_url)?;
        Ok(relative
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn post_from(&self, thread_path: &NodePath, value: &Value, origin: &str) -> Result<Post> {
        let data: PostData = typed(value)?;

        let subpath = if data.post_number == 1 {
            NodePath::root()
        } else {
            NodePath::root().child(data.id.to_string())
        };

        Ok(Post {
            path: thread_path.clone(),
            subpath,
            url: self.url(&format!(
                "t/{}/{}/{}",
                data.topic_slug, data.topic_id, data.post_number
            ))?,
            origin: origin.to_string(),
            data: attributes(value),
            author: data.username.unwrap_or_default(),
            creation_time: data.created_at.unwrap_or_default(),
            content: data.cooked.unwrap_or_default(),
        })
    }

    /// Posts of one response, each followed by the files its content embeds
    fn post_entries(
        &self,
        thread: &Thread,
        posts: &[Value],
        origin: &str,
        pending: &mut Vec<String>,
    ) -> Result<Vec<PostEntry>> {
        let mut entries = Vec::new();

        for value in posts {
            let post = self.post_from(&thread.path, value, origin)?;

            if let Some(id) = value.get("id").map(Value::to_string) {
                pending.retain(|pending_id| *pending_id != id);
            }

            let files = scan_fragment(
                &post.content,
                &self.base_url,
                FileScope {
                    path: &post.path,
                    subpath: &post.subpath,
                    origin,
                },
                &mut HashSet::new(),
            );

            entries.push(PostEntry::Post(post));
            entries.extend(files.into_iter().map(PostEntry::File));
        }

        Ok(entries)
    }

    async fn topic(&self, topic_id: &str) -> Result<(TopicPage, Value, String)> {
        let response = self
            .session
            .get_cached(&self.url(&format!("t/{}.json", topic_id))?)
            .await?;
        let value: Value = response.json()?;
        Ok((typed(&value)?, value, response.url))
    }

    /// Path of the board holding category `category_id`
    fn category_path(tree: &BoardTree, category_id: u64) -> Result<NodePath> {
        let segment = category_id.to_string();
        tree.find(|board| board.path.last() == Some(segment.as_str()))
            .map(|id| tree.get(id).path.clone())
            .ok_or_else(|| ForumError::BoardNotFound {
                path: NodePath::root().child(segment),
            })
    }
}

#[async_trait]
impl Adapter for DiscourseAdapter {
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
        let response = self.session.get(&self.url("site.json")?).await?;
        let site: Site = response.json()?;

        let categories = site
            .categories
            .iter()
            .map(|value| typed::<Category>(value).map(|category| (category, value)))
            .collect::<Result<Vec<_>>>()?;

        // Parents first so children land under real boards, not placeholders
        let (top, nested): (Vec<_>, Vec<_>) = categories
            .into_iter()
            .partition(|(category, _)| category.parent_category_id.is_none());

        for (category, value) in top.into_iter().chain(nested) {
            let id = category.id.to_string();
            let path = match category.parent_category_id {
                Some(parent) => Self::category_path(tree, parent)
                    .unwrap_or_else(|_| NodePath::root().child(parent.to_string()))
                    .child(id.as_str()),
                None => NodePath::root().child(id.as_str()),
            };

            // A grandchild listed before its parent was parked under a placeholder
            let stray = Self::category_path(tree, category.id)
                .ok()
                .filter(|found| *found != path && !path.starts_with(found));

            let attrs = BoardAttrs::new(
                self.url(&format!("c/{}/{}", category.slug, id))?,
                category.name,
            )
            .origin(response.url.as_str())
            .data(attributes(value))
            .fetched(true);

            tree.set_board(&path, attrs, stray.as_ref())?;
        }

        Ok(())
    }

    async fn fetch_subboards(&self, _tree: &mut BoardTree, _board: BoardId) -> Result<()> {
        // site.json already listed every category
        Ok(())
    }

    async fn resolve_node(&self, tree: &BoardTree, url: &str) -> Result<Node> {
        let parts = self.parts(url)?;

        if parts.len() <= 1 {
            return Ok(Node::Board(NodePath::root()));
        }

        match parts[0].as_str() {
            "c" => {
                let rest = &parts[1..];
                let by_id = rest
                    .iter()
                    .rev()
                    .find(|part| part.parse::<u64>().is_ok())
                    .and_then(|id| tree.find(|board| board.path.last() == Some(id.as_str())));
                let by_slug = || {
                    rest.iter().rev().find_map(|slug| {
                        tree.find(|board| {
                            board.data.get("slug").and_then(Value::as_str) == Some(slug.as_str())
                        })
                    })
                };

                by_id
                    .or_else(by_slug)
                    .map(|id| Node::Board(tree.get(id).path.clone()))
                    .ok_or_else(|| ForumError::BoardNotFound {
                        path: rest.iter().map(String::as_str).collect(),
                    })
            }
            "t" => {
                // t/<id>, t/<slug>/<id> or t/<slug>/<id>/<post number>
                let numeric: Vec<&String> = parts[1..]
                    .iter()
                    .filter(|part| part.parse::<u64>().is_ok())
                    .collect();
                let topic_id = numeric.first().map_or(parts[1].as_str(), |id| id.as_str());

                let (topic, value, origin) = self.topic(topic_id).await?;
                let category = topic.category_id.ok_or_else(|| {
                    ForumError::markup(origin.as_str(), "category_id")
                })?;
                let path = Self::category_path(tree, category)?.child(topic.id.to_string());

                let thread = Thread {
                    path,
                    url: self.url(&format!("t/{}/{}", topic.slug, topic.id))?,
                    origin: origin.clone(),
                    data: attributes(&value),
                    title: topic.title,
                };

                let post_number = numeric.get(1).and_then(|n| n.parse::<u64>().ok());
                match post_number {
                    Some(number) if number > 1 => {
                        let response = self
                            .session
                            .get(&self.url(&format!("posts/by_number/{}/{}.json", topic.id, number))?)
                            .await?;
                        let post_value: Value = response.json()?;
                        Ok(Node::Post(self.post_from(&thread.path, &post_value, &response.url)?))
                    }
                    _ => Ok(Node::Thread(thread)),
                }
            }
            "uploads" => Ok(Node::File(File {
                url: url.to_string(),
                origin: url.to_string(),
                ..File::default()
            })),
            _ => Err(ForumError::ExtractorNotFound {
                url: url.to_string(),
            }),
        }
    }

    async fn fetch_board_page(&self, board: &Board, state: PageState) -> Result<Page<ThreadEntry>> {
        let mut state = state;

        if state.url == board.url {
            let parts = self.parts(&state.url)?;
            if parts.len() <= 1 || parts[0] != "c" {
                return Ok(Page::empty());
            }
            state.url = format!("{}.json", state.url);
        }

        let response = self.session.get(&state.url).await?;
        let page: TopicListPage = response.json()?;

        let mut items = Vec::with_capacity(page.topic_list.topics.len());
        for value in &page.topic_list.topics {
            let topic: TopicSummary = typed(value)?;
            let id = topic.id.to_string();

            items.push(ThreadEntry::Thread(Thread {
                path: board.path.child(id.as_str()),
                url: self.url(&format!("t/{}/{}", topic.slug, id))?,
                origin: response.url.clone(),
                data: attributes(value),
                title: topic.title,
            }));
        }

        let next = match page.topic_list.more_topics_url {
            Some(more) => {
                let mut more_url = self.base_url.join(&more)?;
                let json_path = format!("{}.json", more_url.path());
                more_url.set_path(&json_path);
                Some(state.next(more_url.as_str()))
            }
            None => None,
        };

        Ok(Page::new(items, next))
    }

    async fn fetch_thread_page(&self, thread: &Thread, state: PageState) -> Result<Page<PostEntry>> {
        if state.url == thread.url {
            let response = self.session.get(&format!("{}.json", thread.url)).await?;
            let value: Value = response.json()?;
            let topic: TopicPage = typed(&value)?;

            let mut pending: Vec<String> = topic
                .post_stream
                .stream
                .iter()
                .map(u64::to_string)
                .collect();
            let items =
                self.post_entries(thread, &topic.post_stream.posts, &response.url, &mut pending)?;

            let next = (!pending.is_empty())
                .then(|| self.url(&format!("t/{}/posts.json", topic.id)))
                .transpose()?
                .map(|url| state.next(url).with_pending(pending));

            return Ok(Page::new(items, next));
        }

        let batch: Vec<String> = state.pending.iter().take(POST_BATCH).cloned().collect();
        if batch.is_empty() {
            return Ok(Page::empty());
        }

        let request = batch
            .iter()
            .fold(Request::new(state.url.as_str()), |request, id| {
                request.param("post_ids[]", id.as_str())
            });
        let response = self.session.request(request).await?;
        let page: PostBatch = response.json()?;

        // Requested ids are done even if the forum no longer returns them
        let mut pending: Vec<String> = state.pending[batch.len()..].to_vec();
        let items = self.post_entries(thread, &page.post_stream.posts, &response.url, &mut pending)?;

        let next = (!pending.is_empty()).then(|| state.next(state.url.as_str()).with_pending(pending));

        Ok(Page::new(items, next))
    }
}

/// Link to the forum home in a server-rendered Discourse page
fn find_home_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let root = document.root_element();

    if let Some(href) = select_first(root, "nav.crawler-nav a[href]")
        .and_then(|anchor| anchor.value().attr("href"))
    {
        return Some(href.to_string());
    }

    let generated_by_discourse = select_all(root, r#"meta[name="generator"]"#)
        .iter()
        .filter_map(|meta| meta.value().attr("content"))
        .any(|content| content.starts_with("Discourse"));

    generated_by_discourse.then(|| "/".to_string())
}

fn typed<T: DeserializeOwned>(value: &Value) -> Result<T> {
    Ok(T::deserialize(value)?)
}

fn attributes(value: &Value) -> Attributes {
    value.as_object().cloned().unwrap_or_default()
}
