//! Proxy descriptors
//!
//! Accepted line formats, each with an optional `scheme://` prefix and an
//! optional `[refresh_url]` suffix:
//! - `login:password@host:port`
//! - `host:port@login:password`
//! - `host:port`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

static PROXY_FORMATS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^(?:(?P<protocol>[^:/\s]+)://)?(?P<login>[^@:\s]+):(?P<password>[^@\s]+)[@:](?P<host>[^@:\s\[]+):(?P<port>\d{1,5})(?:\[(?P<refresh_url>https?://[^\s\]]+)\])?$",
        r"^(?:(?P<protocol>[^:/\s]+)://)?(?P<host>[^@:\s]+):(?P<port>\d{1,5})[@:](?P<login>[^@:\s]+):(?P<password>[^@\s\[]+)(?:\[(?P<refresh_url>https?://[^\s\]]+)\])?$",
        r"^(?:(?P<protocol>[^:/\s]+)://)?(?P<host>[^@:\s]+):(?P<port>\d{1,5})(?:\[(?P<refresh_url>https?://[^\s\]]+)\])?$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Proxy scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
        }
    }
}

/// Parsed proxy line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
    pub login: Option<String>,
    pub password: Option<String>,
    pub refresh_url: Option<String>,
}

/// Why a proxy line was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyParseError {
    Empty,
    UnsupportedFormat,
    UnsupportedProtocol(String),
    InvalidPort,
}

impl fmt::Display for ProxyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyParseError::Empty => write!(f, "empty proxy"),
            ProxyParseError::UnsupportedFormat => write!(f, "unsupported proxy format"),
            ProxyParseError::UnsupportedProtocol(p) => {
                write!(f, "unsupported protocol '{}' (http and https only)", p)
            }
            ProxyParseError::InvalidPort => write!(f, "port must be 1-65535"),
        }
    }
}

impl std::error::Error for ProxyParseError {}

impl FromStr for Proxy {
    type Err = ProxyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ProxyParseError::Empty);
        }

        let caps = PROXY_FORMATS
            .iter()
            .find_map(|re| re.captures(s))
            .ok_or(ProxyParseError::UnsupportedFormat)?;

        let protocol = match caps.name("protocol").map(|m| m.as_str().to_lowercase()) {
            None => ProxyProtocol::Http,
            Some(p) if p == "http" => ProxyProtocol::Http,
            Some(p) if p == "https" => ProxyProtocol::Https,
            Some(p) => return Err(ProxyParseError::UnsupportedProtocol(p)),
        };

        let port: u16 = caps
            .name("port")
            .and_then(|m| m.as_str().parse().ok())
            .filter(|p| *p > 0)
            .ok_or(ProxyParseError::InvalidPort)?;

        let text = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        Ok(Proxy {
            host: text("host").ok_or(ProxyParseError::UnsupportedFormat)?,
            port,
            protocol,
            login: text("login"),
            password: text("password"),
            refresh_url: text("refresh_url"),
        })
    }
}

impl Proxy {
    /// `scheme://[login:password@]host:port`
    pub fn as_url(&self) -> String {
        match (&self.login, &self.password) {
            (Some(login), Some(password)) => format!(
                "{}://{}:{}@{}:{}",
                self.protocol.as_str(),
                login,
                password,
                self.host,
                self.port
            ),
            _ => self.server(),
        }
    }

    /// `scheme://host:port`, without credentials
    pub fn server(&self) -> String {
        format!("{}://{}:{}", self.protocol.as_str(), self.host, self.port)
    }
}

/// Mask everything in a raw proxy line except scheme, host and port.
///
/// Used for lines that failed to parse, so the parts are found heuristically:
/// the host is the first segment with a dot (or `localhost`) followed by a
/// numeric port. The refresh URL is masked too.
pub fn redact_proxy_line(line: &str) -> String {
    let line = line.trim();
    let (scheme, rest) = match line.find("://") {
        Some(i) => (&line[..i + 3], &line[i + 3..]),
        None => ("", line),
    };
    let (body, refresh) = match rest.find('[') {
        Some(i) => (&rest[..i], "[***]"),
        None => (rest, ""),
    };

    let is_separator = |c: char| c == ':' || c == '@';
    let parts: Vec<&str> = body.split(is_separator).collect();
    let separators: Vec<char> = body.chars().filter(|c| is_separator(*c)).collect();
    let host_at = parts
        .windows(2)
        .position(|pair| looks_like_host(pair[0]) && looks_like_port(pair[1]));

    let mut out = String::from(scheme);
    for (i, part) in parts.iter().enumerate() {
        let keep = host_at.is_some_and(|h| i == h || i == h + 1);
        out.push_str(if keep { part } else { "***" });
        if let Some(sep) = separators.get(i) {
            out.push(*sep);
        }
    }
    out.push_str(refresh);
    out
}

fn looks_like_host(part: &str) -> bool {
    part == "localhost" || (part.contains('.') && !part.starts_with('.') && !part.ends_with('.'))
}

fn looks_like_port(part: &str) -> bool {
    (1..=5).contains(&part.len()) && part.chars().all(|c| c.is_ascii_digit())
}

/// Credentials are never printed
impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.server())
    }
}
