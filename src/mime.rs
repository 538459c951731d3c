//! A minimal MIME entity model.
//!
//! Only what PGP/MIME assembly needs: ordered headers, leaf bodies emitted
//! verbatim, multipart containers, and `Content-Type` parameters. Output
//! uses `\n` line endings, like the generators of most mail libraries;
//! transport code is expected to convert to `\r\n` on the wire.

use std::fmt;

use base64::Engine as _;
use rand::Rng;

use crate::error::{Error, Result};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const MIME_VERSION: &str = "MIME-Version";
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const CONTENT_DESCRIPTION: &str = "Content-Description";

const BASE64_LINE: usize = 76;

/// Body of a MIME entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeBody {
    /// Raw payload, emitted without any transfer encoding applied
    Leaf(Vec<u8>),
    /// Child entities separated by `boundary`
    Multipart {
        boundary: String,
        parts: Vec<MimePart>,
    },
}

/// A MIME entity: headers plus a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    headers: Vec<(String, String)>,
    body: MimeBody,
}

impl MimePart {
    /// A single-part entity with the given `Content-Type`.
    pub fn leaf(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: vec![
                (CONTENT_TYPE.to_string(), content_type.to_string()),
                (MIME_VERSION.to_string(), "1.0".to_string()),
            ],
            body: MimeBody::Leaf(body.into()),
        }
    }

    /// A `multipart/<subtype>` container with a freshly generated boundary.
    pub fn multipart(subtype: &str, parts: Vec<MimePart>) -> Self {
        let boundary = unique_boundary(&parts);
        Self {
            headers: vec![
                (CONTENT_TYPE.to_string(), format!("multipart/{}", subtype)),
                (MIME_VERSION.to_string(), "1.0".to_string()),
            ],
            body: MimeBody::Multipart { boundary, parts },
        }
    }

    /// A minimal `text/plain` part.
    ///
    /// ASCII text is sent as `7bit`; anything else as UTF-8 in base64.
    pub fn text(text: &str) -> Self {
        if text.is_ascii() {
            let mut part = Self::leaf("text/plain; charset=\"us-ascii\"", text.as_bytes());
            part.add_header(CONTENT_TRANSFER_ENCODING, "7bit");
            part
        } else {
            let mut part = Self::leaf("text/plain; charset=\"utf-8\"", encode_base64_lines(text.as_bytes()));
            part.add_header(CONTENT_TRANSFER_ENCODING, "base64");
            part
        }
    }

    /// Wrap an already-serialized entity.
    ///
    /// The header block is split off and unfolded; the body is kept verbatim.
    /// The entity must carry a `Content-Type` header.
    pub fn from_serialized(data: &[u8]) -> Result<Self> {
        let (head, body) = split_header_block(data).ok_or_else(|| {
            Error::InvalidInput("serialized message has no header block".to_string())
        })?;

        let head = std::str::from_utf8(head)
            .map_err(|_| Error::InvalidInput("message headers are not valid UTF-8".to_string()))?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            let line = line.trim_end_matches('\r');
            if line.starts_with(' ') || line.starts_with('\t') {
                match headers.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => {
                        return Err(Error::InvalidInput(
                            "message starts with a continuation line".to_string(),
                        ))
                    }
                }
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                Error::InvalidInput(format!("malformed header line: {}", line))
            })?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        let part = Self {
            headers,
            body: MimeBody::Leaf(body.to_vec()),
        };
        if part.content_type().is_none() {
            return Err(Error::InvalidInput(
                "serialized message has no Content-Type header".to_string(),
            ));
        }
        Ok(part)
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All headers in order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Replace the first header called `name`, or append it.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self.headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.add_header(name, value),
        }
    }

    /// Remove every header called `name`. Returns whether any was present.
    pub fn remove_header(&mut self, name: &str) -> bool {
        let before = self.headers.len();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.headers.len()
    }

    /// The `Content-Type` value, without the multipart boundary.
    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Bare media type (`type/subtype`), lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type()
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_lowercase())
    }

    /// Value of a `Content-Type` parameter, unquoted.
    pub fn param(&self, name: &str) -> Option<String> {
        let ct = self.content_type()?;
        split_params(ct)
            .into_iter()
            .skip(1)
            .find_map(|p| {
                let (k, v) = p.split_once('=')?;
                k.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| v.trim().trim_matches('"').to_string())
            })
    }

    /// Set a `Content-Type` parameter, replacing an existing one of the same name.
    pub fn set_param(&mut self, name: &str, value: &str) {
        let ct = self.content_type().unwrap_or("text/plain").to_string();
        let mut params = split_params(&ct);
        let rendered = format!("{}=\"{}\"", name, value);

        let existing = params.iter().skip(1).position(|p| {
            p.split_once('=')
                .map(|(k, _)| k.trim().eq_ignore_ascii_case(name))
                .unwrap_or(false)
        });
        match existing {
            Some(i) => params[i + 1] = rendered,
            None => params.push(rendered),
        }
        self.set_header(CONTENT_TYPE, &params.join("; "));
    }

    pub fn body(&self) -> &MimeBody {
        &self.body
    }

    /// Leaf payload, or `None` for a multipart.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            MimeBody::Leaf(data) => Some(data),
            MimeBody::Multipart { .. } => None,
        }
    }

    /// Children of a multipart; empty for a leaf.
    pub fn parts(&self) -> &[MimePart] {
        match &self.body {
            MimeBody::Leaf(_) => &[],
            MimeBody::Multipart { parts, .. } => parts,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, MimeBody::Multipart { .. })
    }

    pub fn boundary(&self) -> Option<&str> {
        match &self.body {
            MimeBody::Multipart { boundary, .. } => Some(boundary),
            MimeBody::Leaf(_) => None,
        }
    }

    /// Use a fixed boundary instead of the generated one.
    pub fn set_boundary(&mut self, new_boundary: &str) -> Result<()> {
        match &mut self.body {
            MimeBody::Multipart { boundary, .. } => {
                *boundary = new_boundary.to_string();
                Ok(())
            }
            MimeBody::Leaf(_) => Err(Error::InvalidInput(
                "cannot set a boundary on a single-part entity".to_string(),
            )),
        }
    }

    /// Serialize the entity.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            if let (true, Some(boundary)) = (name.eq_ignore_ascii_case(CONTENT_TYPE), self.boundary()) {
                out.extend_from_slice(format!("; boundary=\"{}\"", boundary).as_bytes());
            }
            out.push(b'\n');
        }
        out.push(b'\n');

        match &self.body {
            MimeBody::Leaf(data) => out.extend_from_slice(data),
            MimeBody::Multipart { boundary, parts } => {
                for part in parts {
                    out.extend_from_slice(format!("--{}\n", boundary).as_bytes());
                    part.write_to(out);
                    out.push(b'\n');
                }
                out.extend_from_slice(format!("--{}--\n", boundary).as_bytes());
            }
        }
    }
}

impl fmt::Display for MimePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.to_bytes()))
    }
}

/// Input accepted by the assembly layer.
#[derive(Debug, Clone)]
pub enum Message {
    /// Plain text, wrapped into a `text/plain` part
    Text(String),
    /// A MIME entity built by the caller
    Entity(MimePart),
    /// An already-serialized MIME entity
    Serialized(Vec<u8>),
}

impl Message {
    /// Turn the message into a MIME part. Plain text is wrapped with
    /// [`MimePart::text`]; the flag reports whether that happened.
    pub fn into_part(self) -> Result<(MimePart, bool)> {
        match self {
            Message::Text(text) => Ok((MimePart::text(&text), true)),
            Message::Entity(part) => Ok((part, false)),
            Message::Serialized(data) => Ok((MimePart::from_serialized(&data)?, false)),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<MimePart> for Message {
    fn from(part: MimePart) -> Self {
        Message::Entity(part)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Serialized(data)
    }
}

/// Split a header value into its main value and `;`-separated parameters,
/// ignoring separators inside quotes.
fn split_params(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in value.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ';' if !quoted => {
                items.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() || items.is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

fn split_header_block(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let lf = find(data, b"\n\n").map(|i| (i + 1, i + 2));
    let crlf = find(data, b"\r\n\r\n").map(|i| (i + 2, i + 4));
    let (head_end, body_start) = match (lf, crlf) {
        (Some(a), Some(b)) => if a.0 < b.0 { a } else { b },
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&data[..head_end], &data[body_start..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn encode_base64_lines(data: &[u8]) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE + 1);
    for line in encoded.as_bytes().chunks(BASE64_LINE) {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

fn random_boundary() -> String {
    let n: u64 = rand::thread_rng().gen_range(0..10_000_000_000_000_000_000);
    format!("==============={:019}==", n)
}

fn unique_boundary(parts: &[MimePart]) -> String {
    let rendered: Vec<Vec<u8>> = parts.iter().map(MimePart::to_bytes).collect();
    loop {
        let boundary = random_boundary();
        let delimiter = format!("--{}", boundary);
        if !rendered.iter().any(|r| find(r, delimiter.as_bytes()).is_some()) {
            return boundary;
        }
    }
}
