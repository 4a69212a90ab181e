//! Terminal capability query interception.
//!
//! Interactive CLIs commonly probe the terminal at startup (cursor position,
//! device attributes) and block until a reply arrives. The bridge strips those
//! probes from the captured stream and answers them with synthetic replies so
//! the child proceeds without a real terminal ever existing.

/// Synthetic cursor-position report sent in answer to `ESC[6n`.
pub const CURSOR_REPORT: &[u8] = b"\x1b[1;1R";

/// Scan a chunk for terminal queries, remove them in place, and return the
/// replies to write back to the PTY master, in order of appearance.
///
/// Non-query escape sequences (colors, cursor movement) are left untouched;
/// the captured output stays byte-exact apart from the stripped probes.
pub fn intercept_queries(chunk: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut replies = Vec::new();
    let mut idx = 0;
    while idx < chunk.len() {
        if chunk[idx] != 0x1B || chunk.get(idx + 1) != Some(&b'[') {
            idx += 1;
            continue;
        }
        match find_csi_end(chunk, idx + 2) {
            Some((final_idx, final_byte)) => {
                if let Some(reply) = query_reply(&chunk[idx + 2..final_idx], final_byte) {
                    chunk.drain(idx..=final_idx);
                    replies.push(reply);
                } else {
                    idx = final_idx + 1;
                }
            }
            // Sequence split across chunks; leave the tail for the caller.
            None => break,
        }
    }
    replies
}

/// Synthetic reply for a CSI query, or `None` when the sequence is not a
/// query and should pass through.
fn query_reply(params: &[u8], final_byte: u8) -> Option<Vec<u8>> {
    let params: Vec<u8> = params
        .iter()
        .copied()
        .filter(|b| *b != b' ')
        .skip_while(|b| *b == b'?' || *b == b'>')
        .collect();

    match final_byte {
        // DSR cursor position request
        b'n' if params == b"6" => Some(CURSOR_REPORT.to_vec()),
        // DSR status report
        b'n' if params == b"5" => Some(b"\x1b[0n".to_vec()),
        // DA primary device attributes; a safe VT220-ish answer
        b'c' => Some(b"\x1b[?1;2c".to_vec()),
        _ => None,
    }
}

/// Length of a trailing escape-sequence fragment that has not yet seen its
/// final byte. The caller holds those bytes back and prepends them to the
/// next read, so a query split across reads is still recognized whole.
pub fn incomplete_suffix(bytes: &[u8]) -> usize {
    let Some(start) = bytes.iter().rposition(|b| *b == 0x1B) else {
        return 0;
    };
    let tail = &bytes[start..];
    match tail.get(1) {
        None => 1,
        Some(&b'[') if tail[2..].iter().all(|b| (0x20..=0x3F).contains(b)) => tail.len(),
        Some(_) => 0,
    }
}

fn find_csi_end(bytes: &[u8], start: usize) -> Option<(usize, u8)> {
    bytes
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, b)| (0x40..=0x7E).contains(*b))
        .map(|(idx, b)| (idx, *b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_cursor_query_and_replies() {
        let mut chunk = b"Hello\x1b[6nWorld".to_vec();
        let replies = intercept_queries(&mut chunk);
        assert_eq!(chunk, b"HelloWorld");
        assert_eq!(replies, vec![CURSOR_REPORT.to_vec()]);
    }

    #[test]
    fn handles_multiple_queries_in_order() {
        let mut chunk = b"a\x1b[6nb\x1b[5nc\x1b[0cd".to_vec();
        let replies = intercept_queries(&mut chunk);
        assert_eq!(chunk, b"abcd");
        assert_eq!(
            replies,
            vec![
                CURSOR_REPORT.to_vec(),
                b"\x1b[0n".to_vec(),
                b"\x1b[?1;2c".to_vec(),
            ]
        );
    }

    #[test]
    fn leaves_styling_sequences_intact() {
        let mut chunk = b"\x1b[31mred\x1b[0m\x1b[6n".to_vec();
        let replies = intercept_queries(&mut chunk);
        assert_eq!(chunk, b"\x1b[31mred\x1b[0m");
        assert_eq!(replies.len(), 1);
    }

    #[test]
    fn plain_text_passes_through() {
        let mut chunk = b"nothing to see".to_vec();
        assert!(intercept_queries(&mut chunk).is_empty());
        assert_eq!(chunk, b"nothing to see");
    }

    #[test]
    fn incomplete_sequence_at_chunk_end_is_preserved() {
        let mut chunk = b"tail\x1b[6".to_vec();
        assert!(intercept_queries(&mut chunk).is_empty());
        assert_eq!(chunk, b"tail\x1b[6");
    }

    #[test]
    fn measures_an_unterminated_trailing_fragment() {
        assert_eq!(incomplete_suffix(b"abc\x1b[6"), 3);
        assert_eq!(incomplete_suffix(b"abc\x1b["), 2);
        assert_eq!(incomplete_suffix(b"abc\x1b"), 1);
    }

    #[test]
    fn terminated_or_plain_tails_are_not_fragments() {
        assert_eq!(incomplete_suffix(b"abc\x1b[6n"), 0);
        assert_eq!(incomplete_suffix(b"\x1b[31mred"), 0);
        assert_eq!(incomplete_suffix(b"plain text"), 0);
        assert_eq!(incomplete_suffix(b""), 0);
    }

    #[test]
    fn fragment_rejoined_with_its_remainder_is_a_query() {
        let mut chunk = b"\x1b[6".to_vec();
        let keep = chunk.len() - incomplete_suffix(&chunk);
        let mut held = chunk.split_off(keep);
        assert!(chunk.is_empty());

        held.extend_from_slice(b"nafter");
        let replies = intercept_queries(&mut held);
        assert_eq!(replies, vec![CURSOR_REPORT.to_vec()]);
        assert_eq!(held, b"after");
    }
}
