//! Fixed vocabularies shared by the compiler, matchers, and scorer.

use std::sync::LazyLock;

use regex::Regex;
use sa_protocol::HttpMethod;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

/// CRUD class of an action verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionClass {
    Create,
    Read,
    Update,
    Delete,
}

impl ActionClass {
    /// Detection order when a text contains verbs from several classes.
    pub const ALL: [ActionClass; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];

    pub fn verbs(&self) -> &'static [&'static str] {
        match self {
            Self::Create => &[
                "create", "add", "new", "make", "build", "generate", "insert", "post",
            ],
            Self::Read => &[
                "get", "list", "show", "fetch", "retrieve", "find", "search", "view", "read",
            ],
            Self::Update => &["update", "edit", "modify", "change", "set", "patch", "alter"],
            Self::Delete => &["delete", "remove", "destroy", "clear", "purge", "erase"],
        }
    }

    pub fn methods(&self) -> &'static [HttpMethod] {
        match self {
            Self::Create => &[HttpMethod::Post],
            Self::Read => &[HttpMethod::Get],
            Self::Update => &[HttpMethod::Put, HttpMethod::Patch],
            Self::Delete => &[HttpMethod::Delete],
        }
    }

    pub fn of_word(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|class| class.verbs().contains(&word))
    }
}

/// Verbs attached to every stub's keyword set by HTTP method.
pub fn method_keywords(method: HttpMethod) -> &'static [&'static str] {
    match method {
        HttpMethod::Post => &["create", "add", "new"],
        HttpMethod::Get => &["get", "fetch", "list", "show"],
        HttpMethod::Put | HttpMethod::Patch => &["update", "edit", "modify"],
        HttpMethod::Delete => &["delete", "remove", "destroy"],
    }
}

/// Words that weigh more in keyword matching.
pub const IMPORTANT_KEYWORDS: &[&str] = &[
    "create", "add", "new", "delete", "remove", "update", "edit", "get", "list", "fetch", "user",
    "account", "order", "product", "item", "cart", "payment",
];

/// Lowercased `\w+` tokens in order of appearance.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
