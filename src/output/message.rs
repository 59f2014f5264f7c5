//! RFC 5322 rendering of posts for the mail-style writers

use crate::model::{Post, Thread};
use crate::output::reconstruct::PostLinks;
use chrono::{DateTime, TimeZone, Utc};
use scraper::Html;

/// Longest subject taken from post content
const CONTENT_TITLE_CHARS: usize = 98;

/// Parses the site's timestamp: RFC 3339, RFC 2822 or unix seconds
pub fn post_date(creation_time: &str) -> Option<DateTime<Utc>> {
    let value = creation_time.trim();

    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }

    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Subject line: the thread title, or the start of the post's text
pub fn subject(thread: &Thread, post: &Post, content_as_title: bool) -> String {
    if !content_as_title {
        return thread.title.clone();
    }

    let fragment = Html::parse_fragment(&post.content);
    let text = fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    text.chars().take(CONTENT_TITLE_CHARS).collect()
}

/// Header values cannot carry line breaks
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders one post as a complete message with CRLF-free `\n` line endings
pub fn render(thread: &Thread, post: &Post, links: &PostLinks, content_as_title: bool) -> String {
    let mut headers: Vec<(&str, String)> = vec![("Message-ID", links.message_id.clone())];

    let author = if post.author.is_empty() {
        "unknown"
    } else {
        post.author.as_str()
    };
    headers.push(("From", header_value(author)));
    headers.push(("Subject", header_value(&subject(thread, post, content_as_title))));

    if let Some(date) = post_date(&post.creation_time) {
        headers.push(("Date", date.to_rfc2822()));
    }
    if let Some(parent) = &links.in_reply_to {
        headers.push(("In-Reply-To", parent.clone()));
    }
    if !links.references.is_empty() {
        headers.push(("References", links.references.join(" ")));
    }
    if !post.url.is_empty() {
        headers.push(("X-Forum-URL", header_value(&post.url)));
    }
    headers.push(("MIME-Version", "1.0".to_string()));
    headers.push(("Content-Type", "text/html; charset=utf-8".to_string()));
    headers.push(("Content-Transfer-Encoding", "8bit".to_string()));

    let mut message = String::new();
    for (name, value) in headers {
        message.push_str(name);
        message.push_str(": ");
        message.push_str(&value);
        message.push('\n');
    }
    message.push('\n');
    message.push_str(&post.content.replace("\r\n", "\n"));
    if !message.ends_with('\n') {
        message.push('\n');
    }

    message
}
