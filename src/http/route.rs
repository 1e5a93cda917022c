use crate::error::Error;
use crate::ratelimit::BucketKey;
use reqwest::Method;
use serde::Serialize;
use std::fmt;

/// A method and path template plus the values substituted into it.
///
/// Placeholders are `{name}` segments filled in order. The bucket key is
/// derived from the template, so every target entity of one route shares a
/// bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: RouteTemplate,
    params: Vec<String>,
    query: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RouteTemplate {
    Static(&'static str),
    /// Caller-supplied concrete path; ids are normalized out for the key.
    Raw(String),
}

impl Route {
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template: RouteTemplate::Static(template),
            params: Vec::new(),
            query: Vec::new(),
        }
    }

    /// A route from a path that already carries its values.
    pub fn raw(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            template: RouteTemplate::Raw(path.into()),
            params: Vec::new(),
            query: Vec::new(),
        }
    }

    /// Fill the next placeholder. Values are percent-encoded.
    pub fn param(mut self, value: impl fmt::Display) -> Self {
        self.params
            .push(urlencoding::encode(&value.to_string()).into_owned());
        self
    }

    pub fn query(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn bucket_key(&self) -> BucketKey {
        match &self.template {
            RouteTemplate::Static(t) => BucketKey::new(&self.method, t),
            RouteTemplate::Raw(p) => BucketKey::from_path(&self.method, p),
        }
    }

    /// Concrete path with placeholders substituted and the query appended.
    pub fn path(&self) -> Result<String, Error> {
        let mut path = match &self.template {
            RouteTemplate::Raw(p) => p.clone(),
            RouteTemplate::Static(t) => substitute(t, &self.params)?,
        };
        if !self.query.is_empty() {
            let qs = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            path.push(if path.contains('?') { '&' } else { '?' });
            path.push_str(&qs);
        }
        Ok(path)
    }
}

fn substitute(template: &str, params: &[String]) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len() + 24);
    let mut values = params.iter();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let close = rest[open..]
            .find('}')
            .map(|c| open + c)
            .ok_or_else(|| Error::Config(format!("unterminated placeholder in {template}")))?;
        let name = &rest[open + 1..close];
        let value = values
            .next()
            .ok_or_else(|| Error::Config(format!("missing value for {{{name}}} in {template}")))?;
        out.push_str(&rest[..open]);
        out.push_str(value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    if values.next().is_some() {
        return Err(Error::Config(format!("too many values for {template}")));
    }
    Ok(out)
}

/// One logical call before it is handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) route: Route,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) reason: Option<String>,
}

impl Request {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            reason: None,
        }
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Attach an audit-log reason.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn route(&self) -> &Route {
        &self.route
    }
}
