use url::Url;

/// The server a request goes to and the identity it is sent as.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiTarget {
    base_url: Url,
    username: Option<String>,
    token: Option<String>,
}

impl ApiTarget {
    /// `base_url` may carry a path, e.g. `https://screeps.com/season`; endpoint paths are appended to
    /// it.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        Ok(Self {
            base_url: Url::parse(base_url.as_ref())?,
            username: None,
            token: None,
        })
    }

    pub fn with_username(mut self, username: impl ToString) -> Self {
        self.username = Some(username.to_string());
        self
    }

    pub fn with_token(mut self, token: Option<impl ToString>) -> Self {
        self.token = token.map(|token| token.to_string());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub(crate) fn endpoint_url(&self, path: &str, query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{path}"));
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }
}
