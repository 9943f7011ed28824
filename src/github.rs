// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub GraphQL access.
//!
//! A few installers need to know about upstream releases: the newest pandoc
//! `.deb`, or the tag of ROOT to build. Deskup asks GitHub's GraphQL API for
//! this using a personal access token.
//!
//! # Failure Kinds
//!
//! GitHub signals a bad token with HTTP 401, which is reported as
//! [`GitHubError::InvalidToken`]. A query that GitHub understands but cannot
//! answer still comes back as HTTP 200, with an `errors` array in the body.
//! That is reported as [`GitHubError::Query`], carrying every server message
//! with its source locations.

use crate::prompt::{choose, Choice, PromptError, Prompter};

use serde_json::{json, Value};
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// GraphQL endpoint of GitHub.
pub const GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Tag of a repository with the tarball of its commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTag {
    pub name: String,
    pub tarball_url: String,
}

/// Downloadable asset attached to a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Name of the release the asset belongs to.
    pub release: String,

    /// File name of the asset.
    pub name: String,

    pub download_url: String,
}

/// Authenticated GitHub GraphQL client.
#[derive(Clone)]
pub struct GitHub {
    token: String,
    endpoint: String,
    agent: ureq::Agent,
}

impl GitHub {
    /// Construct new client authenticating with `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_endpoint(token, GRAPHQL_URL)
    }

    /// Construct new client that posts queries to `endpoint` instead of
    /// GitHub's.
    pub fn with_endpoint(token: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: endpoint.into(),
            agent: ureq::Agent::new(),
        }
    }

    /// Execute GraphQL `query`, returning the full response body.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError::InvalidToken`] if GitHub rejects the token.
    /// - Return [`GitHubError::Query`] if response reports query errors.
    /// - Return [`GitHubError::Http`] if request fails for any other reason.
    /// - Return [`GitHubError::Decode`] if response body is not JSON.
    #[instrument(skip(self, query), level = "debug")]
    pub fn execute(&self, query: &str) -> Result<Value> {
        debug!("POST {}", self.endpoint);
        let response = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("token {}", self.token))
            .send_json(json!({ "query": query }));

        let response = match response {
            Ok(response) => response,
            Err(ureq::Error::Status(401, _)) => return Err(GitHubError::InvalidToken),
            Err(error) => return Err(GitHubError::Http(Box::new(error))),
        };

        check_response(response.into_json()?)
    }

    /// Check that the token can run a trivial query.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError`] from [`GitHub::execute`].
    pub fn validate_token(&self) -> Result<()> {
        self.execute(r#"{ repository(owner: "root-project", name: "root") { name } }"#)?;
        Ok(())
    }

    /// Find alphabetically last tag of repository `owner/name`.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError::Shape`] if repository has no usable tag.
    /// - Return [`GitHubError`] from [`GitHub::execute`].
    pub fn latest_tag(&self, owner: &str, name: &str) -> Result<GitTag> {
        let mut tags = self.tags(owner, name, 1);
        match tags.next() {
            Some(tag) => tag,
            None => Err(GitHubError::Shape(format!("{owner}/{name} has no tags"))),
        }
    }

    /// Iterate over tags of repository `owner/name` in descending
    /// alphabetical order, fetching `page_size` tags per request.
    ///
    /// Tags that do not end at a commit with a tarball are skipped.
    pub fn tags(&self, owner: &str, name: &str, page_size: usize) -> Tags<'_> {
        Tags {
            github: self,
            owner: owner.into(),
            name: name.into(),
            page_size,
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Find asset of the newest release of `owner/name` whose file name ends
    /// with `suffix`.
    ///
    /// # Errors
    ///
    /// - Return [`GitHubError::Shape`] if no such asset exists.
    /// - Return [`GitHubError`] from [`GitHub::execute`].
    pub fn latest_release_asset(&self, owner: &str, name: &str, suffix: &str) -> Result<ReleaseAsset> {
        let query = format!(
            r#"{{
  repository(owner: {owner}, name: {name}) {{
    releases(first: 1, orderBy: {{field: CREATED_AT, direction: DESC}}) {{
      nodes {{
        name
        releaseAssets(first: 10) {{
          nodes {{
            name
            contentType
            downloadUrl
          }}
        }}
      }}
    }}
  }}
}}"#,
            owner = quote(owner),
            name = quote(name),
        );

        release_asset_from(&self.execute(&query)?, suffix)
    }

    fn tags_page(&self, owner: &str, name: &str, page_size: usize, cursor: Option<&str>) -> Result<Value> {
        let after = cursor
            .map(|cursor| format!(", after: {}", quote(cursor)))
            .unwrap_or_default();
        let query = format!(
            r#"{{
  repository(owner: {owner}, name: {name}) {{
    refs(refPrefix: "refs/tags/", first: {page_size}{after}, orderBy: {{field: ALPHABETICAL, direction: DESC}}) {{
      edges {{
        cursor
        node {{
          name
          target {{
            ... on Tag {{
              name
              target {{
                ... on Commit {{
                  tarballUrl
                }}
              }}
            }}
            ... on Commit {{
              tarballUrl
            }}
          }}
        }}
      }}
    }}
  }}
}}"#,
            owner = quote(owner),
            name = quote(name),
        );

        self.execute(&query)
    }
}

/// Paginated tag iterator, see [`GitHub::tags`].
pub struct Tags<'github> {
    github: &'github GitHub,
    owner: String,
    name: String,
    page_size: usize,
    cursor: Option<String>,
    buffer: VecDeque<GitTag>,
    done: bool,
}

impl Iterator for Tags<'_> {
    type Item = Result<GitTag>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tag) = self.buffer.pop_front() {
                return Some(Ok(tag));
            }

            if self.done {
                return None;
            }

            let page = self.github.tags_page(
                &self.owner,
                &self.name,
                self.page_size,
                self.cursor.as_deref(),
            );
            let page = match page.and_then(|result| tags_from(&result)) {
                Ok(page) => page,
                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            };

            match page.cursor {
                Some(cursor) => self.cursor = Some(cursor),
                None => self.done = true,
            }
            self.buffer.extend(page.tags);
        }
    }
}

/// Ask user to pick a tag of `owner/name`.
///
/// Offers the newest `n_options` tags, and lets the user type any other tag
/// name instead. An unknown tag name starts the selection over.
///
/// # Errors
///
/// - Return [`GitHubError::Prompt`] if input cannot be read.
/// - Return [`GitHubError`] from [`GitHub::execute`].
pub fn select_tag(
    github: &GitHub,
    prompter: &mut dyn Prompter,
    owner: &str,
    name: &str,
    n_options: usize,
) -> Result<GitTag> {
    let latest = github
        .tags(owner, name, 50)
        .take(n_options)
        .collect::<Result<Vec<_>>>()?;
    let names = latest.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>();

    loop {
        match choose(prompter, &format!("Select tag for {owner}/{name}:"), &names)? {
            Choice::Option(index) => return Ok(latest[index].clone()),
            Choice::Other => {
                let wanted = prompter.read_line("Enter tag name:")?;
                for tag in github.tags(owner, name, 50) {
                    let tag = tag?;
                    if tag.name == wanted.trim() {
                        return Ok(tag);
                    }
                }
            }
        }
    }
}

struct TagsPage {
    tags: Vec<GitTag>,

    /// Cursor of the last edge, absent when the page was empty.
    cursor: Option<String>,
}

fn tags_from(result: &Value) -> Result<TagsPage> {
    let edges = result["data"]["repository"]["refs"]["edges"]
        .as_array()
        .ok_or_else(|| GitHubError::Shape("response has no tag edges".into()))?;

    let mut page = TagsPage {
        tags: Vec::new(),
        cursor: None,
    };
    for edge in edges {
        page.cursor = edge["cursor"].as_str().map(Into::into);
        if let Some(tag) = tag_from_node(&edge["node"]) {
            page.tags.push(tag);
        }
    }

    Ok(page)
}

/// Follow target chain of ref `node` down to the commit tarball.
///
/// Annotated tags point at a tag object that points at a commit, lightweight
/// tags point at the commit directly.
fn tag_from_node(node: &Value) -> Option<GitTag> {
    let name = node["name"].as_str()?;
    let mut object = node;
    while let Some(target) = object.get("target") {
        object = target;
    }

    Some(GitTag {
        name: name.into(),
        tarball_url: object.get("tarballUrl")?.as_str()?.into(),
    })
}

fn release_asset_from(result: &Value, suffix: &str) -> Result<ReleaseAsset> {
    let release = result["data"]["repository"]["releases"]["nodes"]
        .get(0)
        .ok_or_else(|| GitHubError::Shape("repository has no releases".into()))?;
    let release_name = release["name"].as_str().unwrap_or_default();

    release["releaseAssets"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .find_map(|asset| {
            let name = asset["name"].as_str()?;
            if !name.ends_with(suffix) {
                return None;
            }

            Some(ReleaseAsset {
                release: release_name.into(),
                name: name.into(),
                download_url: asset["downloadUrl"].as_str()?.into(),
            })
        })
        .ok_or_else(|| {
            GitHubError::Shape(format!("release {release_name:?} has no {suffix:?} asset"))
        })
}

fn check_response(result: Value) -> Result<Value> {
    match result.get("errors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(GitHubError::Query(errors_to_string(errors))),
        _ => Ok(result),
    }
}

/// Render GraphQL errors as `message on (line L, column C), ...`, one error
/// per line.
fn errors_to_string(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|error| {
            let message = error["message"].as_str().unwrap_or("unknown error");
            let locations = error["locations"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|location| {
                    format!(
                        "(line {}, column {})",
                        location["line"], location["column"]
                    )
                })
                .collect::<Vec<_>>();
            format!("{message} on {}", locations.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Quote `value` as a GraphQL string literal.
fn quote(value: &str) -> String {
    Value::String(value.into()).to_string()
}

/// All possible error types for GitHub interaction.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// GitHub rejected the token.
    #[error("GitHub token was rejected")]
    InvalidToken,

    /// GitHub reported errors for the query.
    #[error("{0}")]
    Query(String),

    /// Request failed for any reason other than a bad token.
    #[error(transparent)]
    Http(#[from] Box<ureq::Error>),

    /// Response body is not JSON.
    #[error("failed to decode GitHub response")]
    Decode(#[from] std::io::Error),

    /// Response does not contain what was asked for.
    #[error("unexpected GitHub response: {0}")]
    Shape(String),

    /// User selection failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
}

/// Friendly result alias :3
pub type Result<T, E = GitHubError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::{
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    /// Answer one HTTP request on a local port with `status` and `body`.
    ///
    /// The join handle yields the raw request head and body.
    fn serve_once(status: &'static str, body: Value) -> anyhow::Result<(String, JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let url = format!("http://{}/graphql", listener.local_addr()?);
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("no connection");
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            let mut length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("bad request head");
                if let Some((key, value)) = line.split_once(':') {
                    if key.eq_ignore_ascii_case("content-length") {
                        length = value.trim().parse().expect("bad content length");
                    }
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut payload = vec![0; length];
            reader.read_exact(&mut payload).expect("short request body");
            request.push_str(&String::from_utf8_lossy(&payload));

            let body = body.to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader
                .get_mut()
                .write_all(response.as_bytes())
                .expect("cannot respond");
            request
        });

        Ok((url, handle))
    }

    #[test]
    fn latest_tag_asks_for_newest_tag() -> anyhow::Result<()> {
        let (url, server) = serve_once(
            "200 OK",
            json!({"data": {"repository": {"refs": {"edges": [{
                "cursor": "c1",
                "node": {"name": "v6-32-00", "target": {"tarballUrl": "https://x/v6-32-00.tar.gz"}}
            }]}}}}),
        )?;

        let tag = GitHub::with_endpoint("ghp_secret", url).latest_tag("root-project", "root")?;
        assert_eq!(
            tag,
            GitTag {
                name: "v6-32-00".into(),
                tarball_url: "https://x/v6-32-00.tar.gz".into(),
            }
        );

        let request = server.join().expect("server panicked");
        let request = request.to_lowercase();
        assert!(request.contains("authorization: token ghp_secret"));
        assert!(request.contains("first: 1"));
        assert!(request.contains(r#"repository(owner: \"root-project\", name: \"root\")"#));

        Ok(())
    }

    #[test]
    fn latest_tag_of_untagged_repository_is_an_error() -> anyhow::Result<()> {
        let (url, server) = serve_once(
            "200 OK",
            json!({"data": {"repository": {"refs": {"edges": []}}}}),
        )?;

        let result = GitHub::with_endpoint("ghp_secret", url).latest_tag("awkless", "empty");
        assert!(matches!(result, Err(GitHubError::Shape(message)) if message == "awkless/empty has no tags"));
        server.join().expect("server panicked");

        Ok(())
    }

    #[test]
    fn rejected_token_is_reported() -> anyhow::Result<()> {
        let (url, server) = serve_once("401 Unauthorized", json!({"message": "Bad credentials"}))?;

        let result = GitHub::with_endpoint("ghp_bogus", url).validate_token();
        assert!(matches!(result, Err(GitHubError::InvalidToken)));
        server.join().expect("server panicked");

        Ok(())
    }

    #[test]
    fn query_errors_are_rendered_with_locations() {
        let result = check_response(json!({
            "errors": [
                {
                    "message": "Field 'nam' doesn't exist on type 'Repository'",
                    "locations": [{"line": 3, "column": 5}, {"line": 4, "column": 1}]
                },
                {
                    "message": "Variable $owner is unused",
                    "locations": [{"line": 1, "column": 1}]
                }
            ]
        }));

        let expect = indoc! {"
            Field 'nam' doesn't exist on type 'Repository' on (line 3, column 5), (line 4, column 1)
            Variable $owner is unused on (line 1, column 1)"};
        match result {
            Err(GitHubError::Query(message)) => assert_eq!(message, expect),
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn response_without_errors_passes_through() -> anyhow::Result<()> {
        let body = json!({"data": {"repository": {"name": "root"}}});
        assert_eq!(check_response(body.clone())?, body);
        Ok(())
    }

    #[test]
    fn tags_follow_annotated_and_lightweight_targets() -> anyhow::Result<()> {
        let result = json!({"data": {"repository": {"refs": {"edges": [
            {
                "cursor": "c1",
                "node": {
                    "name": "v6-30-02",
                    "target": {"name": "v6-30-02", "target": {"tarballUrl": "https://x/v6-30-02.tar.gz"}}
                }
            },
            {
                "cursor": "c2",
                "node": {"name": "v6-30-01", "target": {"tarballUrl": "https://x/v6-30-01.tar.gz"}}
            },
            {
                "cursor": "c3",
                "node": {"name": "tree-object", "target": {}}
            }
        ]}}}});

        let page = tags_from(&result)?;
        assert_eq!(
            page.tags,
            vec![
                GitTag {
                    name: "v6-30-02".into(),
                    tarball_url: "https://x/v6-30-02.tar.gz".into()
                },
                GitTag {
                    name: "v6-30-01".into(),
                    tarball_url: "https://x/v6-30-01.tar.gz".into()
                },
            ]
        );
        assert_eq!(page.cursor.as_deref(), Some("c3"));

        Ok(())
    }

    #[test]
    fn empty_tag_page_has_no_cursor() -> anyhow::Result<()> {
        let result = json!({"data": {"repository": {"refs": {"edges": []}}}});
        let page = tags_from(&result)?;
        assert!(page.tags.is_empty());
        assert_eq!(page.cursor, None);
        Ok(())
    }

    #[test]
    fn release_asset_is_picked_by_suffix() -> anyhow::Result<()> {
        let result = json!({"data": {"repository": {"releases": {"nodes": [{
            "name": "pandoc 3.1.9",
            "releaseAssets": {"nodes": [
                {"name": "pandoc-3.1.9-windows-x86_64.msi", "downloadUrl": "https://x/msi"},
                {"name": "pandoc-3.1.9-1-amd64.deb", "downloadUrl": "https://x/deb"}
            ]}
        }]}}}});

        let asset = release_asset_from(&result, ".deb")?;
        assert_eq!(
            asset,
            ReleaseAsset {
                release: "pandoc 3.1.9".into(),
                name: "pandoc-3.1.9-1-amd64.deb".into(),
                download_url: "https://x/deb".into(),
            }
        );

        let missing = release_asset_from(&result, ".rpm");
        assert!(matches!(missing, Err(GitHubError::Shape(_))));

        Ok(())
    }

    #[test]
    fn quote_escapes_graphql_strings() {
        assert_eq!(quote("root-project"), r#""root-project""#);
        assert_eq!(quote(r#"a"b"#), r#""a\"b""#);
    }
}
