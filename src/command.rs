//! The line-oriented command vocabulary shared by server and clients.
//!
//! A client writes one line; the first whitespace-separated word is the
//! verb.  [`Request::parse`] turns that line into a [`Request`], and the
//! [`Display`](fmt::Display) impl turns a [`Request`] back into the line a
//! client should send.
//!
//! ```text
//! ping
//! query gpu
//! action timer timer up 5
//! subscribe workspace date
//! ws 3
//! ```

use std::fmt;

/// Subscription wildcard: matches every topic.
pub const WILDCARD: &str = "*";

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Ping,
    /// Full state map.
    State,
    /// `None` means the whole map (`query`, `query all`).
    Query(Option<String>),
    /// `action <provider> [args...]`; `provider` is `None` when missing.
    Action {
        provider: Option<String>,
        args: Vec<String>,
    },
    /// Streaming subscription.  Never empty: no topics means [`WILDCARD`].
    Subscribe(Vec<String>),
    /// Any other verb, left to the daemon's own handler.
    Other { verb: String, arg: String },
}

impl Request {
    /// Parse a trimmed command line.
    pub fn parse(line: &str) -> Request {
        let line = line.trim();
        let (verb, arg) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "status" => Request::Status,
            "ping" => Request::Ping,
            "state" => Request::State,
            "query" => match arg {
                "" | "all" => Request::Query(None),
                topic => Request::Query(Some(topic.to_string())),
            },
            "action" => {
                let mut words = arg.split_whitespace().map(str::to_string);
                Request::Action {
                    provider: words.next(),
                    args: words.collect(),
                }
            }
            "subscribe" => Request::Subscribe(parse_topics(arg)),
            _ => Request::Other {
                verb: verb.to_string(),
                arg: arg.to_string(),
            },
        }
    }

    /// `true` for the one command that keeps its connection open.
    pub fn is_subscribe(&self) -> bool {
        matches!(self, Request::Subscribe(_))
    }
}

/// Split subscribe arguments into topics, defaulting to the wildcard.
pub fn parse_topics(arg: &str) -> Vec<String> {
    let topics: Vec<String> = arg.split_whitespace().map(str::to_string).collect();
    if topics.is_empty() {
        vec![WILDCARD.to_string()]
    } else {
        topics
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Status => write!(f, "status"),
            Request::Ping => write!(f, "ping"),
            Request::State => write!(f, "state"),
            Request::Query(None) => write!(f, "query all"),
            Request::Query(Some(topic)) => write!(f, "query {}", topic),
            Request::Action { provider, args } => {
                write!(f, "action")?;
                if let Some(p) = provider {
                    write!(f, " {}", p)?;
                }
                for a in args {
                    write!(f, " {}", a)?;
                }
                Ok(())
            }
            Request::Subscribe(topics) => {
                if topics.len() == 1 && topics[0] == WILDCARD {
                    write!(f, "subscribe")
                } else {
                    write!(f, "subscribe {}", topics.join(" "))
                }
            }
            Request::Other { verb, arg } if arg.is_empty() => write!(f, "{}", verb),
            Request::Other { verb, arg } => write!(f, "{} {}", verb, arg),
        }
    }
}
