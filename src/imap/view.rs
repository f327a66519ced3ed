//! Read-only view of a stored RFC 5322 message for FETCH and SEARCH.
//!
//! Only the top-level header is interpreted. The body is treated as a
//! single part whatever its declared content type.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// One header field with its raw bytes (continuation lines included)
/// and its unfolded value.
#[derive(Debug, Clone)]
pub struct Field<'a> {
    pub name: String,
    pub value: String,
    pub raw: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct MessageView<'a> {
    raw: &'a [u8],
    body_start: usize,
}

impl<'a> MessageView<'a> {
    #[must_use]
    pub fn new(raw: &'a [u8]) -> Self {
        let body_start = find(raw, b"\r\n\r\n")
            .map(|i| i + 4)
            .or_else(|| find(raw, b"\n\n").map(|i| i + 2))
            .unwrap_or(raw.len());
        Self { raw, body_start }
    }

    /// The header including the blank separator line.
    #[must_use]
    pub fn header(&self) -> &'a [u8] {
        &self.raw[..self.body_start]
    }

    /// Everything after the blank separator line.
    #[must_use]
    pub fn text(&self) -> &'a [u8] {
        &self.raw[self.body_start..]
    }

    #[must_use]
    pub fn fields(&self) -> Vec<Field<'a>> {
        let header = self.header();
        // (start, end, name, value) with byte offsets into the header.
        let mut spans: Vec<(usize, usize, String, String)> = Vec::new();
        let mut start = 0;

        while start < header.len() {
            let end = header[start..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(header.len(), |i| start + i + 1);
            let line = String::from_utf8_lossy(&header[start..end]);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.starts_with([' ', '\t']) {
                if let Some(last) = spans.last_mut() {
                    last.1 = end;
                    last.3.push(' ');
                    last.3.push_str(line.trim());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                spans.push((start, end, name.trim().to_string(), value.trim().to_string()));
            }
            start = end;
        }

        spans
            .into_iter()
            .map(|(start, end, name, value)| Field {
                name,
                value,
                raw: &header[start..end],
            })
            .collect()
    }

    /// Unfolded value of the first field called `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields()
            .into_iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.value)
    }

    /// The header restricted to (or, with `exclude`, without) the named
    /// fields, followed by the blank line.
    #[must_use]
    pub fn header_subset(&self, names: &[String], exclude: bool) -> Vec<u8> {
        let mut out = Vec::new();
        for field in self.fields() {
            let listed = names.iter().any(|n| n.eq_ignore_ascii_case(&field.name));
            if listed != exclude {
                out.extend_from_slice(field.raw);
            }
        }
        out.extend_from_slice(b"\r\n");
        out
    }

    /// The `Date:` header, if it parses as RFC 2822.
    #[must_use]
    pub fn sent_date(&self) -> Option<DateTime<FixedOffset>> {
        let value = self.field("Date")?;
        DateTime::parse_from_rfc2822(&value).ok()
    }

    #[must_use]
    pub fn sent_day(&self) -> Option<NaiveDate> {
        self.sent_date().map(|dt| dt.date_naive())
    }

    /// The ENVELOPE structure of RFC 3501 section 7.4.2.
    #[must_use]
    pub fn envelope(&self) -> Vec<u8> {
        let from = self.field("From");
        let sender = self.field("Sender").or_else(|| from.clone());
        let reply_to = self.field("Reply-To").or_else(|| from.clone());

        let mut out = b"(".to_vec();
        out.extend(nstring(self.field("Date").as_deref().map(str::as_bytes)));
        out.push(b' ');
        out.extend(nstring(self.field("Subject").as_deref().map(str::as_bytes)));
        for list in [
            from,
            sender,
            reply_to,
            self.field("To"),
            self.field("Cc"),
            self.field("Bcc"),
        ] {
            out.push(b' ');
            out.extend(address_list(list.as_deref()));
        }
        out.push(b' ');
        out.extend(nstring(self.field("In-Reply-To").as_deref().map(str::as_bytes)));
        out.push(b' ');
        out.extend(nstring(self.field("Message-ID").as_deref().map(str::as_bytes)));
        out.push(b')');
        out
    }

    /// Single-part BODY (or, with `extended`, BODYSTRUCTURE).
    #[must_use]
    pub fn body_structure(&self, extended: bool) -> Vec<u8> {
        let content_type = self.field("Content-Type").unwrap_or_default();
        let mut parts = content_type.split(';');
        let (mut kind, mut subtype) = parts
            .next()
            .and_then(|t| t.trim().split_once('/'))
            .map_or(("TEXT".to_string(), "PLAIN".to_string()), |(t, s)| {
                (t.trim().to_uppercase(), s.trim().to_uppercase())
            });
        if kind == "MULTIPART" || kind == "MESSAGE" {
            kind = "TEXT".to_string();
            subtype = "PLAIN".to_string();
        }

        let mut params: Vec<(String, String)> = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_uppercase(), v.trim().trim_matches('"').to_string()))
            .collect();
        if kind == "TEXT" && !params.iter().any(|(k, _)| k == "CHARSET") {
            params.push(("CHARSET".to_string(), "US-ASCII".to_string()));
        }

        let encoding = self
            .field("Content-Transfer-Encoding")
            .map_or_else(|| "7BIT".to_string(), |e| e.to_uppercase());
        let text = self.text();

        let mut out = format!("({} {} ", quoted(&kind), quoted(&subtype));
        if params.is_empty() {
            out.push_str("NIL");
        } else {
            let list: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{} {}", quoted(k), quoted(v)))
                .collect();
            out.push_str(&format!("({})", list.join(" ")));
        }
        out.push_str(&format!(" NIL NIL {} {}", quoted(&encoding), text.len()));
        if kind == "TEXT" {
            out.push_str(&format!(" {}", text.iter().filter(|&&b| b == b'\n').count()));
        }
        if extended {
            out.push_str(" NIL NIL NIL");
        }
        out.push(')');
        out.into_bytes()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `"17-Jul-1996 02:44:25 +0000"`
#[must_use]
pub fn internal_date(at: &DateTime<Utc>) -> String {
    format!("\"{}\"", at.format("%d-%b-%Y %H:%M:%S %z"))
}

/// Quote a string that is known to be short and free of line breaks.
#[must_use]
pub fn quoted(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// A counted literal: `{n}\r\n` followed by the bytes.
#[must_use]
pub fn literal(data: &[u8]) -> Vec<u8> {
    let mut out = format!("{{{}}}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out
}

/// `NIL`, a quoted string, or a literal when the value cannot be quoted.
#[must_use]
pub fn nstring(value: Option<&[u8]>) -> Vec<u8> {
    match value {
        None => b"NIL".to_vec(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) if s.is_ascii() && !s.contains(['\r', '\n']) => quoted(s).into_bytes(),
            _ => literal(bytes),
        },
    }
}

fn address_list(value: Option<&str>) -> Vec<u8> {
    let addresses: Vec<Vec<u8>> = value
        .map(split_addresses)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| address(&a))
        .collect();
    if addresses.is_empty() {
        return b"NIL".to_vec();
    }

    let mut out = b"(".to_vec();
    for addr in addresses {
        out.extend(addr);
    }
    out.push(b')');
    out
}

/// Split on commas that are outside quotes and angle brackets.
fn split_addresses(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let (mut in_quotes, mut in_angle) = (false, false);

    for c in value.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => in_angle = true,
            '>' if !in_quotes => in_angle = false,
            ',' if !in_quotes && !in_angle => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    out.push(current);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `(name NIL mailbox host)`
fn address(entry: &str) -> Option<Vec<u8>> {
    let (name, addr) = match (entry.find('<'), entry.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            let name = entry[..open].trim().trim_matches('"').trim();
            let name = (!name.is_empty()).then_some(name);
            (name, entry[open + 1..close].trim())
        }
        _ => (None, entry),
    };
    if addr.is_empty() {
        return None;
    }
    let (mailbox, host) = addr.rsplit_once('@').map_or((addr, None), |(m, h)| (m, Some(h)));

    let mut out = b"(".to_vec();
    out.extend(nstring(name.map(str::as_bytes)));
    out.extend_from_slice(b" NIL ");
    out.extend(nstring(Some(mailbox.as_bytes())));
    out.push(b' ');
    out.extend(nstring(host.map(str::as_bytes)));
    out.push(b')');
    Some(out)
}
