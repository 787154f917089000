//! Relay fragment grammar and chunked-payload reassembly.
//!
//! URL length ceilings force oversized payloads onto multiple frame
//! navigations. Fragment grammar, `&`-separated:
//!
//! - indexed (multi-part enabled): `target & from@call_id & total & index & chunk`
//! - single (multi-part disabled or legacy): `target & from@call_id & chunk`
//!
//! Only the chunk is percent-encoded, which keeps `&` and `@` unambiguous.
//! Chunks are split from the *encoded* payload at arbitrary byte boundaries;
//! decoding happens once after concatenation, so a split mid `%XX` sequence
//! is harmless. Fragments arrive in any order since each one is typically a
//! separate navigation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

/// One parsed relay fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Id of the receiving context.
    pub target: String,
    /// Id of the sending context.
    pub from: String,
    /// Correlation id of the originating call (0 for fire-and-forget).
    pub call_id: u64,
    /// Declared packet count.
    pub total: usize,
    /// Position of this fragment's chunk.
    pub index: usize,
    /// Percent-encoded chunk of the payload.
    pub chunk: String,
}

/// Percent-encode a payload for transport inside a URL fragment.
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            other => {
                out.push('%');
                out.push_str(&format!("{other:02X}"));
            }
        }
    }
    out
}

/// Decode a percent-encoded chunk. Returns `None` on malformed input.
pub fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Encode a payload into relay fragments for the given target.
///
/// With `multi_part`, the encoded payload is split into chunks of at most
/// `max_chunk` bytes, each carried by an indexed fragment. Without it, the
/// whole payload rides a single unindexed fragment regardless of size.
pub fn encode_fragments(
    target: &str,
    from: &str,
    call_id: u64,
    payload: &str,
    multi_part: bool,
    max_chunk: usize,
) -> Vec<String> {
    let encoded = percent_encode(payload);
    if !multi_part {
        return vec![format!("{target}&{from}@{call_id}&{encoded}")];
    }

    let chunks: Vec<&str> = if encoded.is_empty() {
        vec![""]
    } else {
        encoded
            .as_bytes()
            .chunks(max_chunk.max(1))
            // chunk boundaries fall on encoded bytes, always valid ASCII
            .map(|c| std::str::from_utf8(c).unwrap_or(""))
            .collect()
    };

    let total = chunks.len();
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| format!("{target}&{from}@{call_id}&{total}&{index}&{chunk}"))
        .collect()
}

/// Parse a received fragment. Returns `None` for anything malformed.
pub fn parse_fragment(raw: &str) -> Option<Fragment> {
    let fields: Vec<&str> = raw.split('&').collect();
    let (target, origin, total, index, chunk) = match fields.as_slice() {
        [target, origin, chunk] => (*target, *origin, 1usize, 0usize, *chunk),
        [target, origin, total, index, chunk] => {
            let total: usize = total.parse().ok()?;
            let index: usize = index.parse().ok()?;
            (*target, *origin, total, index, *chunk)
        }
        _ => return None,
    };
    if total == 0 || index >= total {
        return None;
    }
    let (from, call_id) = origin.rsplit_once('@')?;
    if from.is_empty() {
        return None;
    }
    let call_id: u64 = call_id.parse().ok()?;
    Some(Fragment {
        target: target.to_string(),
        from: from.to_string(),
        call_id,
        total,
        index,
        chunk: chunk.to_string(),
    })
}

struct ReassemblyBuffer {
    slots: Vec<Option<String>>,
    filled: usize,
    last_update: Duration,
}

/// Reconstructs multi-part payloads from out-of-order fragments.
///
/// Buffers are keyed by `(from, call_id)` and complete only once every slot
/// in `[0, total)` is filled. Incomplete buffers idle longer than the TTL are
/// swept on demand rather than kept forever.
pub struct ChunkAssembler {
    buffers: RefCell<HashMap<(String, u64), ReassemblyBuffer>>,
    ttl: Duration,
}

impl ChunkAssembler {
    /// Create an assembler with the given idle TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            buffers: RefCell::new(HashMap::new()),
            ttl,
        }
    }

    /// Evict buffers idle past the TTL. Returns how many were dropped.
    pub fn sweep(&self, now: Duration) -> usize {
        let mut buffers = self.buffers.borrow_mut();
        let before = buffers.len();
        buffers.retain(|key, buffer| {
            let keep = buffer.last_update + self.ttl >= now;
            if !keep {
                tracing::debug!(from = %key.0, call_id = key.1, "evicting stale reassembly buffer");
            }
            keep
        });
        before - buffers.len()
    }

    /// Store a fragment; returns the decoded payload once reassembly completes.
    ///
    /// The completed buffer is discarded before returning. Fragments whose
    /// declared packet count disagrees with the existing buffer are dropped.
    pub fn insert(&self, fragment: Fragment, now: Duration) -> Option<String> {
        if fragment.total == 1 {
            return percent_decode(&fragment.chunk);
        }

        let key = (fragment.from.clone(), fragment.call_id);
        let mut buffers = self.buffers.borrow_mut();
        let buffer = buffers.entry(key.clone()).or_insert_with(|| ReassemblyBuffer {
            slots: vec![None; fragment.total],
            filled: 0,
            last_update: now,
        });

        if buffer.slots.len() != fragment.total {
            tracing::debug!(
                from = %fragment.from,
                call_id = fragment.call_id,
                declared = fragment.total,
                existing = buffer.slots.len(),
                "fragment packet count disagrees with buffer, dropping"
            );
            return None;
        }

        if buffer.slots[fragment.index].is_none() {
            buffer.filled += 1;
        }
        buffer.slots[fragment.index] = Some(fragment.chunk);
        buffer.last_update = now;

        if buffer.filled < buffer.slots.len() {
            return None;
        }

        let buffer = buffers.remove(&key)?;
        let encoded: String = buffer.slots.into_iter().flatten().collect();
        percent_decode(&encoded)
    }

    /// Number of incomplete buffers currently held.
    pub fn pending_count(&self) -> usize {
        self.buffers.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn fragments_for(payload: &str, max_chunk: usize) -> Vec<Fragment> {
        encode_fragments("recv", "sender", 9, payload, true, max_chunk)
            .iter()
            .map(|raw| parse_fragment(raw).expect("parse"))
            .collect()
    }

    #[test]
    fn test_percent_round_trip() {
        let payload = r#"{"s":"svc","a":["100% & more","a=b#c"]}"#;
        let encoded = percent_encode(payload);
        assert!(!encoded.contains('&'));
        assert!(!encoded.contains('#'));
        assert_eq!(percent_decode(&encoded).as_deref(), Some(payload));
    }

    #[test]
    fn test_percent_decode_rejects_malformed() {
        assert!(percent_decode("%").is_none());
        assert!(percent_decode("%2").is_none());
        assert!(percent_decode("%ZZ").is_none());
    }

    #[test]
    fn test_single_fragment_grammar() {
        let raw = encode_fragments("recv", "sender", 0, "payload", false, 8);
        assert_eq!(raw.len(), 1);

        let fragment = parse_fragment(&raw[0]).expect("parse");
        assert_eq!(fragment.target, "recv");
        assert_eq!(fragment.from, "sender");
        assert_eq!(fragment.call_id, 0);
        assert_eq!(fragment.total, 1);
        assert_eq!(fragment.index, 0);
    }

    #[test]
    fn test_multi_part_splits_encoded_payload() {
        let payload = "x".repeat(100);
        let raw = encode_fragments("recv", "sender", 3, &payload, true, 40);
        assert_eq!(raw.len(), 3);

        for (i, fragment) in raw.iter().enumerate() {
            let parsed = parse_fragment(fragment).expect("parse");
            assert_eq!(parsed.total, 3);
            assert_eq!(parsed.index, i);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_fragment("").is_none());
        assert!(parse_fragment("only&two").is_none());
        assert!(parse_fragment("a&no-call-id&chunk").is_none());
        assert!(parse_fragment("a&s@x&chunk").is_none());
        assert!(parse_fragment("a&s@1&bad&0&chunk").is_none());
        // Index out of declared range.
        assert!(parse_fragment("a&s@1&2&2&chunk").is_none());
        // Zero declared packets.
        assert!(parse_fragment("a&s@1&0&0&chunk").is_none());
    }

    #[test]
    fn test_out_of_order_reassembly_matches_unsplit() {
        let payload = r#"{"s":"resize","f":"w","c":5,"a":[100,"£ & %"]}"#;
        let assembler = ChunkAssembler::new(TTL);
        let mut fragments = fragments_for(payload, 16);
        assert_eq!(fragments.len(), 3);

        // Deliver in order 2, 0, 1.
        let order = [fragments.remove(2), fragments.remove(0), fragments.remove(0)];
        assert!(assembler.insert(order[0].clone(), Duration::ZERO).is_none());
        assert!(assembler.insert(order[1].clone(), Duration::ZERO).is_none());
        let complete = assembler.insert(order[2].clone(), Duration::ZERO);

        assert_eq!(complete.as_deref(), Some(payload));
        assert_eq!(assembler.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_fragment_does_not_complete_early() {
        let assembler = ChunkAssembler::new(TTL);
        let fragments = fragments_for(&"y".repeat(30), 10);
        assert_eq!(fragments.len(), 3);

        assert!(assembler.insert(fragments[0].clone(), Duration::ZERO).is_none());
        assert!(assembler.insert(fragments[0].clone(), Duration::ZERO).is_none());
        assert!(assembler.insert(fragments[1].clone(), Duration::ZERO).is_none());
        assert_eq!(assembler.pending_count(), 1);
    }

    #[test]
    fn test_interleaved_senders_use_separate_buffers() {
        let assembler = ChunkAssembler::new(TTL);
        let a = fragments_for(&"a".repeat(20), 10);
        let mut b: Vec<Fragment> = fragments_for(&"b".repeat(20), 10);
        for fragment in &mut b {
            fragment.from = "other".to_string();
        }

        assert!(assembler.insert(a[0].clone(), Duration::ZERO).is_none());
        assert!(assembler.insert(b[0].clone(), Duration::ZERO).is_none());
        assert_eq!(assembler.pending_count(), 2);

        let done = assembler.insert(a[1].clone(), Duration::ZERO);
        assert_eq!(done.as_deref(), Some("a".repeat(20).as_str()));
        assert_eq!(assembler.pending_count(), 1);
    }

    #[test]
    fn test_ttl_sweep_evicts_stale_buffers() {
        let assembler = ChunkAssembler::new(Duration::from_secs(10));
        let fragments = fragments_for(&"z".repeat(20), 10);

        assert!(assembler.insert(fragments[0].clone(), Duration::from_secs(1)).is_none());
        assert_eq!(assembler.sweep(Duration::from_secs(5)), 0);
        assert_eq!(assembler.sweep(Duration::from_secs(30)), 1);
        assert_eq!(assembler.pending_count(), 0);
    }

    #[test]
    fn test_mismatched_packet_count_dropped() {
        let assembler = ChunkAssembler::new(TTL);
        let fragments = fragments_for(&"q".repeat(20), 10);
        assert!(assembler.insert(fragments[0].clone(), Duration::ZERO).is_none());

        let mut liar = fragments[1].clone();
        liar.total = 5;
        liar.index = 4;
        assert!(assembler.insert(liar, Duration::ZERO).is_none());

        // The honest buffer still completes.
        let done = assembler.insert(fragments[1].clone(), Duration::ZERO);
        assert_eq!(done.as_deref(), Some("q".repeat(20).as_str()));
    }
}
