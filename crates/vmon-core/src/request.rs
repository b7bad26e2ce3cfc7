//! Parses a single line-framed JSON sampling request (§4.5).

use bitflags::bitflags;
use serde_json::Value;

use crate::error::RequestError;

/// The original's `jsmn`-based parser capped the token array at this many
/// JSON nodes; requests whose parsed tree exceeds it are rejected even if
/// otherwise well-formed.
pub const MAX_REQUEST_TOKENS: usize = 32;

/// `req-id` (36-char canonical form) plus its NUL terminator, as in the
/// original's `VIR_UUID_STRING_BUFLEN`. A `req-id` of this length is the
/// longest one accepted.
pub const MAX_REQ_ID_LEN: usize = 36;

bitflags! {
    /// Which stats sections a request asked for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatsMask: u8 {
        /// Domain power state.
        const STATE = 0b0000_0001;
        /// Aggregate physical CPU usage.
        const CPU_TOTAL = 0b0000_0010;
        /// Memory balloon sizing.
        const BALLOON = 0b0000_0100;
        /// Per-vCPU runtime stats.
        const VCPU = 0b0000_1000;
        /// Per-interface I/O counters.
        const INTERFACE = 0b0001_0000;
        /// Per-block-device I/O counters.
        const BLOCK = 0b0010_0000;
    }
}

impl StatsMask {
    fn token(token: &str) -> Option<StatsMask> {
        match token {
            "state" => Some(StatsMask::STATE),
            "cpu-total" => Some(StatsMask::CPU_TOTAL),
            "balloon" => Some(StatsMask::BALLOON),
            "vcpu" => Some(StatsMask::VCPU),
            "interface" => Some(StatsMask::INTERFACE),
            "block" => Some(StatsMask::BLOCK),
            _ => None,
        }
    }

    /// The recognized string tokens set in this mask, in a fixed order —
    /// the inverse of [`StatsMask::token`], used to round-trip a mask back
    /// into a `get-stats` array.
    pub fn tokens(self) -> Vec<&'static str> {
        let table: &[(StatsMask, &str)] = &[
            (StatsMask::STATE, "state"),
            (StatsMask::CPU_TOTAL, "cpu-total"),
            (StatsMask::BALLOON, "balloon"),
            (StatsMask::VCPU, "vcpu"),
            (StatsMask::INTERFACE, "interface"),
            (StatsMask::BLOCK, "block"),
        ];
        table
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

/// A parsed sampling request, immutable once built (§3 SampleRequest).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleRequest {
    /// Caller-supplied request id, echoed back verbatim in responses.
    /// Empty when `req-id` was omitted (the "all-zero" case).
    pub req_id: String,
    /// Which stats sections were requested.
    pub stats: StatsMask,
}

fn count_nodes(value: &Value) -> usize {
    1 + match value {
        Value::Array(items) => items.iter().map(count_nodes).sum(),
        Value::Object(map) => map.values().map(count_nodes).sum(),
        _ => 0,
    }
}

/// Parses one newline-terminated JSON line into a [`SampleRequest`].
///
/// Unknown top-level keys and unknown `get-stats` tokens are logged and
/// ignored rather than rejected. Everything else — a non-object top level,
/// a `req-id` that isn't a short string, a `get-stats` element that isn't a
/// string, or a tree exceeding [`MAX_REQUEST_TOKENS`] — fails the request.
pub fn parse_request(line: &str) -> Result<SampleRequest, RequestError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| RequestError::new(format!("invalid json: {e}")))?;

    if count_nodes(&value) > MAX_REQUEST_TOKENS {
        return Err(RequestError::new("request exceeds token limit"));
    }

    let Value::Object(map) = value else {
        return Err(RequestError::new("top-level value must be an object"));
    };

    let mut request = SampleRequest::default();

    for (key, val) in map {
        match key.as_str() {
            "req-id" => {
                let Value::String(s) = val else {
                    return Err(RequestError::new("req-id must be a string"));
                };
                if s.len() > MAX_REQ_ID_LEN {
                    return Err(RequestError::new("req-id too long"));
                }
                request.req_id = s;
            }
            "get-stats" => {
                let Value::Array(items) = val else {
                    return Err(RequestError::new("get-stats must be an array"));
                };
                for item in items {
                    let Value::String(token) = item else {
                        return Err(RequestError::new("get-stats elements must be strings"));
                    };
                    match StatsMask::token(&token) {
                        Some(bit) => request.stats |= bit,
                        None => tracing::warn!(token = %token, "unknown get-stats token ignored"),
                    }
                }
            }
            other => {
                tracing::warn!(key = %other, "unknown request key ignored");
            }
        }
    }

    Ok(request)
}
