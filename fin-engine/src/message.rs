//! Five-block SWIFT envelope parser.
//!
//! Blocks are delimited by `{N:...}` with balanced-brace extraction for
//! blocks 1/2/3/5 (block 5's body nests `{MAC:...}{CHK:...}`); block 4 is
//! delimited by `{4:` and the literal terminator `-}`, which is not a brace
//! and must not be matched by brace counting. The parser is total: a
//! well-formed message with blocks missing simply leaves the corresponding
//! projections unset. The only structural error is an absent block 4.

use crate::error::FrameError;
use once_cell::sync::Lazy;
use regex::Regex;

static FIELD_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r":(\d+[A-Z]?):").expect("valid regex"));
static BLOCK3_UETR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{108:([^}]*)\}").expect("valid regex"));
static BLOCK5_MAC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{MAC:([A-F0-9]+)\}").expect("valid regex"));
static BLOCK5_CHK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{CHK:([A-F0-9]+)\}").expect("valid regex"));
static FIELD_32A: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{6})([A-Z]{3})([\d,]+)").expect("valid regex"));

/// A fully parsed SWIFT message: the raw text, the five optional block
/// bodies, the ordered block-4 tag/value pairs, and convenience
/// projections over the most commonly consulted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub raw: String,
    pub block1: Option<String>,
    pub block2: Option<String>,
    pub block3: Option<String>,
    pub block4: Option<String>,
    pub block5: Option<String>,
    /// Block-4 tag/value pairs, in the order they appeared in the message.
    pub fields: Vec<(String, String)>,
    pub transaction_reference: Option<String>,
    pub sequence_number: i64,
    pub value_date: Option<String>,
    pub currency: Option<String>,
    pub amount: Option<String>,
    pub ordering_customer: Option<String>,
    pub beneficiary: Option<String>,
    pub uetr: Option<String>,
    pub mac: Option<String>,
    pub checksum: Option<String>,
}

impl ParsedMessage {
    /// Look up a block-4 field by exact tag, returning the first match.
    pub fn field(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Look up a block-4 field by tag prefix (e.g. any "50*" party field).
    fn field_prefixed(&self, prefix: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| t.starts_with(prefix))
            .map(|(_, v)| v.as_str())
    }

    /// True if this message carries a dedicated LOGIN envelope: either the
    /// raw text contains the literal token `LOGIN`, or field 20 is exactly
    /// `LOGIN`. See the session state machine for how this gates
    /// `authenticated`.
    pub fn is_login(&self) -> bool {
        self.field("20").map(|v| v == "LOGIN").unwrap_or(false)
            || self.raw.contains("LOGIN")
    }
}

/// Find the balanced-brace body of `{n:...}` starting at or after `from`.
/// Returns `(body, end_index)` where `end_index` is one past the closing
/// brace, so callers can continue scanning past this block.
fn extract_balanced(text: &str, n: char, from: usize) -> Option<(String, usize)> {
    let bytes = text.as_bytes();
    let marker = format!("{{{n}:");
    let start = text[from..].find(marker.as_str())? + from;
    let content_start = start + marker.len();
    let mut depth = 1usize;
    let mut i = content_start;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((text[content_start..i].to_string(), i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Extract block 4's body: bounded by `{4:` and the literal `-}` terminator.
fn extract_block4(text: &str) -> Option<String> {
    let start = text.find("{4:")? + 3;
    let end = text[start..].find("-}")? + start;
    Some(text[start..end].to_string())
}

/// Parse block-4 text into ordered tag/value pairs. Each value runs until
/// the next `:<tag>:` marker or the end of the block, with surrounding
/// whitespace trimmed; embedded newlines inside a value are preserved.
fn parse_fields(block4: &str) -> Vec<(String, String)> {
    let matches: Vec<_> = FIELD_TAG.captures_iter(block4).collect();
    let mut fields = Vec::with_capacity(matches.len());
    for (i, caps) in matches.iter().enumerate() {
        let whole = caps.get(0).unwrap();
        let tag = caps[1].to_string();
        let value_start = whole.end();
        let value_end = matches
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(block4.len());
        let value = block4[value_start..value_end].trim().to_string();
        fields.push((tag, value));
    }
    fields
}

/// Parse a complete raw SWIFT message. The only structural failure is a
/// missing block 4; everything else degrades to unset projections.
pub fn parse(raw: &str) -> Result<ParsedMessage, FrameError> {
    let block4 = extract_block4(raw).ok_or(FrameError::MissingBlock4)?;

    let block1 = extract_balanced(raw, '1', 0).map(|(b, _)| b);
    let block2 = extract_balanced(raw, '2', 0).map(|(b, _)| b);
    let block3 = extract_balanced(raw, '3', 0).map(|(b, _)| b);
    let block5 = extract_balanced(raw, '5', 0).map(|(b, _)| b);

    let fields = parse_fields(&block4);

    let mut msg = ParsedMessage {
        raw: raw.to_string(),
        block1,
        block2,
        block3: block3.clone(),
        block4: Some(block4),
        block5: block5.clone(),
        fields,
        transaction_reference: None,
        sequence_number: 1,
        value_date: None,
        currency: None,
        amount: None,
        ordering_customer: None,
        beneficiary: None,
        uetr: None,
        mac: None,
        checksum: None,
    };

    msg.transaction_reference = msg
        .field("20")
        .and_then(|v| v.split_whitespace().next())
        .map(|s| s.to_string());

    msg.sequence_number = msg
        .field("34")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(1);

    if let Some(v) = msg.field("32A") {
        if let Some(caps) = FIELD_32A.captures(v.trim()) {
            msg.value_date = Some(caps[1].to_string());
            msg.currency = Some(caps[2].to_string());
            msg.amount = Some(caps[3].to_string());
        }
    }

    msg.ordering_customer = msg
        .field("50K")
        .or_else(|| msg.field_prefixed("50"))
        .map(|s| s.to_string());
    msg.beneficiary = msg
        .field("59")
        .or_else(|| msg.field_prefixed("59"))
        .map(|s| s.to_string());

    if let Some(b3) = &block3 {
        msg.uetr = BLOCK3_UETR.captures(b3).map(|c| c[1].to_string());
    }
    if let Some(b5) = &block5 {
        msg.mac = BLOCK5_MAC.captures(b5).map(|c| c[1].to_string());
        msg.checksum = BLOCK5_CHK.captures(b5).map(|c| c[1].to_string());
    }

    Ok(msg)
}
