use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref URL_REGEX: Regex =
        Regex::new(r#"curl\s+(?:--location\s+)?['"]?([^'"]+?)['"]?(?:\s|$)"#).unwrap();
    static ref HEADER_REGEX: Regex =
        Regex::new(r#"--header\s+['"]([^:]+):\s*([^'"]+)['"]"#).unwrap();
    static ref BODY_REGEX: Regex =
        Regex::new(r#"--data(?:-raw)?\s+(?:'([^']*)'|"([^"]*)")"#).unwrap();
}

/// URL, headers and body lifted out of a curl command line.
///
/// This is a display/verification artifact: the command it came from stays
/// the thing that gets executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RequestDescriptor {
    pub fn is_empty(&self) -> bool {
        self.url.is_empty() && self.headers.is_empty() && self.body.is_empty()
    }

    /// Render back into `curl '<url>' --header 'K: V' --data '<body>'` form.
    ///
    /// Headers are emitted sorted by name so the output is stable.
    pub fn to_curl_command(&self) -> String {
        let mut parts = vec!["curl".to_string(), format!("'{}'", self.url)];

        let mut names: Vec<&String> = self.headers.keys().collect();
        names.sort();
        for name in names {
            parts.push(format!("--header '{}: {}'", name, self.headers[name]));
        }

        if !self.body.is_empty() {
            parts.push(format!("--data '{}'", self.body));
        }

        parts.join(" ")
    }
}

/// Best-effort lexical scan of a curl command.
///
/// Never fails: anything the patterns do not recognise leaves the matching
/// field at its default. Escaped quotes, multi-line commands and shell
/// substitution are not understood, header values end at the first quote
/// character, and only the first `--data`/`--data-raw` segment is used.
pub fn parse_curl_command<'a>(cmd: impl Into<Option<&'a str>>) -> RequestDescriptor {
    let mut result = RequestDescriptor::default();

    let cmd = match cmd.into() {
        Some(c) if !c.is_empty() => c,
        _ => return result,
    };

    if let Some(caps) = URL_REGEX.captures(cmd) {
        result.url = caps[1].to_string();
    }

    for caps in HEADER_REGEX.captures_iter(cmd) {
        result
            .headers
            .insert(caps[1].to_string(), caps[2].to_string());
    }

    if let Some(caps) = BODY_REGEX.captures(cmd) {
        if let Some(body) = caps.get(1).or_else(|| caps.get(2)) {
            result.body = body.as_str().to_string();
        }
    }

    result
}
