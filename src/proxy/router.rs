// Route resolver
//
// Maps an inbound (method, path) onto a backend URL. The table is built once
// from configuration and never mutated; resolution is a pure function of it.
//
// Routing rules:
// - POST /api/assetAccount/{id}/withdraw → withdrawal service, path unchanged
// - /api/assetAccount/**               → matching engine, /api/externalAssetAccount/**
// - /api/user/**                       → matching engine, path unchanged

use axum::http::Method;
use url::Url;

use crate::error::{AppError, AppResult};
use crate::proxy::config::ProxyConfig;

const ASSET_ACCOUNT_PREFIX: &str = "/api/assetAccount";
const EXTERNAL_ASSET_ACCOUNT_PREFIX: &str = "/api/externalAssetAccount";
const USER_PREFIX: &str = "/api/user";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatcher {
    /// Matches the prefix itself and anything below it on a segment boundary
    Prefix(String),
    /// Segment template; `{name}` matches exactly one non-empty segment
    Template(String),
}

impl PathMatcher {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Prefix(prefix) => matches_prefix(path, prefix),
            PathMatcher::Template(template) => matches_template(path, template),
        }
    }

    fn literal_head(&self) -> &str {
        match self {
            PathMatcher::Prefix(prefix) => prefix,
            PathMatcher::Template(template) => template.split('{').next().unwrap_or(""),
        }
    }
}

/// A configured (matcher, rewrite, destination) triple
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub name: &'static str,
    /// Restricts the route to one method; `None` accepts any
    pub method: Option<Method>,
    pub matcher: PathMatcher,
    /// Case-insensitive literal replacement applied to the path
    pub rewrite: Option<(String, String)>,
    pub destination: Url,
}

impl RouteSpec {
    fn accepts(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().map_or(true, |m| m == method) && self.matcher.matches(path)
    }

    fn target(&self, path_and_query: &str) -> AppResult<Url> {
        let rewritten = match &self.rewrite {
            Some((from, to)) => replace_ignore_ascii_case(path_and_query, from, to),
            None => path_and_query.to_string(),
        };
        let base = self.destination.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}{}", base, rewritten))?)
    }
}

/// Ordered route table; the first matching spec wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteSpec>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteSpec>) -> AppResult<Self> {
        for (i, a) in routes.iter().enumerate() {
            for b in routes.iter().skip(i + 1) {
                if a.method == b.method && overlaps(&a.matcher, &b.matcher) {
                    return Err(AppError::Config(format!(
                        "Routes '{}' and '{}' match the same requests",
                        a.name, b.name
                    )));
                }
            }
        }
        Ok(Self { routes })
    }

    /// Build the gateway's route table from configuration
    pub fn from_config(config: &ProxyConfig) -> AppResult<Self> {
        let matching_engine = parse_base(&config.matching_engine_url, "matching_engine_url")?;
        let withdrawal = parse_base(&config.withdrawal_service_url, "withdrawal_service_url")?;

        Self::new(vec![
            // Checked before the generic asset account prefix
            RouteSpec {
                name: "withdraw",
                method: Some(Method::POST),
                matcher: PathMatcher::Template(format!(
                    "{}/{{assetAccountId}}/withdraw",
                    ASSET_ACCOUNT_PREFIX
                )),
                rewrite: None,
                destination: withdrawal,
            },
            RouteSpec {
                name: "assetAccount",
                method: None,
                matcher: PathMatcher::Prefix(ASSET_ACCOUNT_PREFIX.to_string()),
                rewrite: Some((
                    ASSET_ACCOUNT_PREFIX.to_string(),
                    EXTERNAL_ASSET_ACCOUNT_PREFIX.to_string(),
                )),
                destination: matching_engine.clone(),
            },
            RouteSpec {
                name: "user",
                method: None,
                matcher: PathMatcher::Prefix(USER_PREFIX.to_string()),
                rewrite: None,
                destination: matching_engine,
            },
        ])
    }

    /// Resolve the destination for a request.
    ///
    /// `path` is matched as received; `query` (without `?`) is carried over
    /// to the destination untouched.
    pub fn resolve(&self, method: &Method, path: &str, query: Option<&str>) -> AppResult<Url> {
        let route = self
            .routes
            .iter()
            .find(|r| r.accepts(method, path))
            .ok_or_else(|| AppError::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })?;

        let mut target = route.target(path)?;
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            target.set_query(Some(q));
        }

        tracing::debug!(route = route.name, %target, "Resolved {} {}", method, path);
        Ok(target)
    }

    pub fn routes(&self) -> &[RouteSpec] {
        &self.routes
    }
}

fn parse_base(raw: &str, field: &str) -> AppResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", field, raw, e)))?;
    if url.host_str().is_none() || !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Config(format!(
            "{} must be an absolute http[s] URL, got '{}'",
            field, raw
        )));
    }
    Ok(url)
}

fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => {
            let rest = &path[prefix.len()..];
            rest.is_empty() || rest.starts_with('/')
        }
        _ => false,
    }
}

fn matches_template(path: &str, template: &str) -> bool {
    let mut path_segments = path.trim_start_matches('/').split('/');
    let mut template_segments = template.trim_start_matches('/').split('/');
    loop {
        match (template_segments.next(), path_segments.next()) {
            (None, None) => return true,
            (Some(t), Some(p)) => {
                let is_param = t.starts_with('{') && t.ends_with('}');
                if is_param {
                    if p.is_empty() {
                        return false;
                    }
                } else if !t.eq_ignore_ascii_case(p) {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn overlaps(a: &PathMatcher, b: &PathMatcher) -> bool {
    match (a, b) {
        (PathMatcher::Prefix(x), PathMatcher::Prefix(y)) => {
            matches_prefix(x, y) || matches_prefix(y, x)
        }
        (PathMatcher::Template(x), PathMatcher::Template(y)) => x.eq_ignore_ascii_case(y),
        (PathMatcher::Prefix(p), t @ PathMatcher::Template(_))
        | (t @ PathMatcher::Template(_), PathMatcher::Prefix(p)) => {
            matches_prefix(t.literal_head(), p)
        }
    }
}

/// Replace every ASCII-case-insensitive occurrence of `from` with `to`.
pub fn replace_ignore_ascii_case(haystack: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_ascii_lowercase();
    let lower_from = from.to_ascii_lowercase();

    let mut out = String::with_capacity(haystack.len());
    let mut last = 0;
    for (start, _) in lower_haystack.match_indices(&lower_from) {
        out.push_str(&haystack[last..start]);
        out.push_str(to);
        last = start + from.len();
    }
    out.push_str(&haystack[last..]);
    out
}
