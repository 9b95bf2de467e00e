//! Shell-style curl parsing for actually performing a request.
//!
//! Unlike [`crate::curl_parser`], this tokenizes the command the way a shell
//! would (quotes, escapes, line continuations) and understands the common
//! request-shaping flags, so the execution backend can replay the call.

use crate::error::InvocationError;
use regex::Regex;
use std::collections::HashMap;

lazy_static::lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"<[A-Z_]+>").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlInvocation {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl CurlInvocation {
    /// Render as `curl -X <method> '<url>' --header 'K: V' ... --data '<body>'`.
    ///
    /// Headers are sorted by name. Values are single-quoted for the shell, so
    /// the output parses back to the same invocation.
    pub fn to_curl_command(&self) -> String {
        let mut parts = vec![
            "curl".to_string(),
            "-X".to_string(),
            self.method.clone(),
            shell_quote(&self.url),
        ];

        let mut names: Vec<&String> = self.headers.keys().collect();
        names.sort();
        for name in names {
            parts.push("--header".to_string());
            parts.push(shell_quote(&format!("{}: {}", name, self.headers[name])));
        }

        if let Some(body) = &self.body {
            parts.push("--data".to_string());
            parts.push(shell_quote(body));
        }

        parts.join(" ")
    }
}

/// Single-quote `s`; embedded `'` becomes `'\''`.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn parse_invocation(cmd: &str) -> Result<CurlInvocation, InvocationError> {
    // Join line continuations before anything else
    let cmd = cmd.replace("\\\r\n", " ").replace("\\\n", " ");

    let placeholders: Vec<String> = PLACEHOLDER_REGEX
        .find_iter(&cmd)
        .map(|m| m.as_str().to_string())
        .collect();
    if !placeholders.is_empty() {
        return Err(InvocationError::Placeholders(placeholders));
    }

    let cmd = cmd.trim();
    let cmd = cmd.strip_prefix("curl").unwrap_or(cmd);

    let tokens = tokenize(cmd)?;

    let mut url = String::new();
    let mut method = "GET".to_string();
    let mut explicit_method = false;
    let mut headers = HashMap::new();
    let mut body: Option<String> = None;

    // Walk the flags; the first bare token is the URL
    let mut iter = tokens.into_iter();
    while let Some(token) = iter.next() {
        match token.as_str() {
            "-X" | "--request" => {
                method = next_value(&mut iter, &token)?.to_uppercase();
                explicit_method = true;
            }
            "-H" | "--header" => {
                let header = next_value(&mut iter, &token)?;
                if let Some(pos) = header.find(':') {
                    let key = header[..pos].trim().to_string();
                    let value = header[pos + 1..].trim().to_string();
                    headers.insert(key, value);
                }
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-urlencode" => {
                let data = next_value(&mut iter, &token)?;
                // curl joins repeated data segments with '&'
                body = Some(match body {
                    Some(existing) => format!("{}&{}", existing, data),
                    None => data,
                });
                if !explicit_method {
                    method = "POST".to_string();
                }
            }
            "-u" | "--user" => {
                let credentials = next_value(&mut iter, &token)?;
                let auth = format!("Basic {}", base64_encode(&credentials));
                headers.insert("Authorization".to_string(), auth);
            }
            "-A" | "--user-agent" => {
                let agent = next_value(&mut iter, &token)?;
                headers.insert("User-Agent".to_string(), agent);
            }
            "-e" | "--referer" => {
                let referer = next_value(&mut iter, &token)?;
                headers.insert("Referer".to_string(), referer);
            }
            "--url" => {
                url = next_value(&mut iter, &token)?;
            }
            "--compressed" => {
                headers.insert("Accept-Encoding".to_string(), "gzip, deflate".to_string());
            }
            "-I" | "--head" => {
                method = "HEAD".to_string();
                explicit_method = true;
            }
            "-L" | "--location" | "-k" | "--insecure" | "-s" | "--silent" | "-v"
            | "--verbose" | "-i" | "--include" => {}
            _ => {
                if !token.starts_with('-') && url.is_empty() {
                    url = token;
                }
            }
        }
    }

    if url.is_empty() {
        return Err(InvocationError::MissingUrl);
    }

    Ok(CurlInvocation {
        url,
        method,
        headers,
        body,
    })
}

fn next_value(
    iter: &mut impl Iterator<Item = String>,
    flag: &str,
) -> Result<String, InvocationError> {
    iter.next()
        .ok_or_else(|| InvocationError::MissingValue(flag.to_string()))
}

fn tokenize(cmd: &str) -> Result<Vec<String>, InvocationError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in cmd.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }

        match quote {
            Some('\'') => {
                if ch == '\'' {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            Some(q) => {
                if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => {
                if ch == '\\' {
                    escaped = true;
                    in_token = true;
                } else if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                    in_token = true;
                } else if ch.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else {
                    current.push(ch);
                    in_token = true;
                }
            }
        }
    }

    if let Some(q) = quote {
        return Err(InvocationError::UnterminatedQuote(q));
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

fn base64_encode(s: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}
