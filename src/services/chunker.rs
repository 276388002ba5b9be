//! Smart chunker: turns one chat's ordered message stream into semantically
//! coherent chunks with fully populated metadata.
//!
//! A run of consecutive short messages by one author is a single story and
//! should be retrievable as one unit. A reply mid-sequence breaks the story.
//! Quick cross-author exchanges form implicit question/answer pairs that
//! should be findable together, so flushed groups are tagged with question
//! and answer heuristics before they are cut into chunks.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::ChunkingConfig;
use crate::models::chunks::{ChunkDraft, ChunkMetadata};
use crate::models::messages::IncomingMessage;

/// Rolling activity window used to detect busy chats.
const BUSY_WINDOW_SECONDS: i64 = 300;

/// Bounded lookback for resolving reply targets seen earlier in the stream.
const REPLY_LOOKBACK_MESSAGES: usize = 512;

/// Short affirmative/negative tokens treated as answers on their own.
const ANSWER_TOKENS: &[&str] = &[
    "yes", "no", "yep", "nope", "yeah", "nah", "ok", "okay", "sure", "confirmed", "negative",
    "correct", "done",
];

/// Summary of the most recently flushed group, kept for Q/A inference.
struct PrevGroup {
    author_id: i64,
    last_seq: i64,
    last_ts: DateTime<Utc>,
    ended_with_question: bool,
}

/// Groups a chat's messages and cuts each group into chunks.
///
/// `messages` must be in fetch order for one chat; the output preserves that
/// order. Empty-text messages (media-only) are skipped.
pub fn chunk_messages(
    messages: &[IncomingMessage],
    chat_title: &str,
    cfg: &ChunkingConfig,
) -> Vec<ChunkDraft> {
    let mut out = Vec::new();
    let mut group: Vec<&IncomingMessage> = Vec::new();
    let mut group_len = 0usize;
    let mut prev_flushed: Option<PrevGroup> = None;

    // Reply targets are resolved lazily from a bounded window of the stream;
    // replies can only reference older sequences, so a map suffices.
    let mut reply_texts: HashMap<i64, String> = HashMap::new();
    let mut reply_order: VecDeque<i64> = VecDeque::new();

    // (timestamp, author) pairs inside the rolling busy window.
    let mut activity: VecDeque<(DateTime<Utc>, i64)> = VecDeque::new();

    for message in messages {
        if message.text.trim().is_empty() {
            continue;
        }

        activity.push_back((message.sent_at, message.author_id));
        while let Some(&(ts, _)) = activity.front() {
            if message.sent_at - ts > Duration::seconds(BUSY_WINDOW_SECONDS) {
                activity.pop_front();
            } else {
                break;
            }
        }
        let distinct_authors: HashSet<i64> = activity.iter().map(|(_, author)| *author).collect();
        let window_seconds = if distinct_authors.len() >= cfg.busy_chat_author_threshold {
            cfg.busy_chat_time_window_seconds
        } else {
            cfg.group_time_window_seconds
        };

        let breaks_group = match group.last() {
            None => false,
            Some(last) => {
                message.author_id != last.author_id
                    || message.sent_at < last.sent_at
                    || message.sent_at - last.sent_at > Duration::seconds(window_seconds)
                    || message.reply_to_seq.is_some()
                    || group_len + 1 + char_len(&message.text) > cfg.group_max_chars
            }
        };

        if breaks_group {
            prev_flushed = Some(finalize_group(
                &group,
                chat_title,
                cfg,
                prev_flushed.as_ref(),
                &reply_texts,
                &mut out,
            ));
            group.clear();
            group_len = 0;
        }

        group.push(message);
        group_len = if group.len() == 1 {
            char_len(&message.text)
        } else {
            group_len + 1 + char_len(&message.text)
        };

        // A reply always forms its own chunk, never a run.
        if message.reply_to_seq.is_some() {
            prev_flushed = Some(finalize_group(
                &group,
                chat_title,
                cfg,
                prev_flushed.as_ref(),
                &reply_texts,
                &mut out,
            ));
            group.clear();
            group_len = 0;
        }

        reply_texts.insert(message.message_seq, message.text.clone());
        reply_order.push_back(message.message_seq);
        if reply_order.len() > REPLY_LOOKBACK_MESSAGES {
            if let Some(evicted) = reply_order.pop_front() {
                reply_texts.remove(&evicted);
            }
        }
    }

    if !group.is_empty() {
        finalize_group(
            &group,
            chat_title,
            cfg,
            prev_flushed.as_ref(),
            &reply_texts,
            &mut out,
        );
    }

    out
}

/// Derives metadata for a finished group and cuts it into chunks.
fn finalize_group(
    group: &[&IncomingMessage],
    chat_title: &str,
    cfg: &ChunkingConfig,
    prev: Option<&PrevGroup>,
    reply_texts: &HashMap<i64, String>,
    out: &mut Vec<ChunkDraft>,
) -> PrevGroup {
    let first = group[0];
    let last = group[group.len() - 1];

    let full_text = group
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let is_question = full_text.trim_end().ends_with('?');

    let reply_to_seq = first.reply_to_seq;
    let reply_to_text = reply_to_seq.and_then(|seq| reply_texts.get(&seq).cloned());

    // A fast cross-author follow-up to a question is probably its answer.
    let likely_answer_to = if reply_to_seq.is_none() {
        prev.filter(|p| {
            p.author_id != first.author_id
                && p.ended_with_question
                && first.sent_at >= p.last_ts
                && first.sent_at - p.last_ts <= Duration::seconds(cfg.answer_window_seconds)
        })
        .map(|p| p.last_seq)
    } else {
        None
    };

    let normalized = full_text
        .trim()
        .trim_end_matches(['.', '!', ','])
        .to_lowercase();
    let token_count = full_text.split_whitespace().count();
    let short_follow_up_to_question = token_count <= 4
        && prev.is_some_and(|p| {
            p.author_id != first.author_id
                && p.ended_with_question
                && first.sent_at >= p.last_ts
                && first.sent_at - p.last_ts <= Duration::seconds(cfg.question_lookback_seconds)
        });
    let is_answer = ANSWER_TOKENS.contains(&normalized.as_str())
        || short_follow_up_to_question
        || likely_answer_to.is_some();

    let pieces = split_text(&full_text, cfg.chunk_size_chars, cfg.chunk_overlap_chars);
    let total_chunks = pieces.len() as i32;

    for (index, text) in pieces.into_iter().enumerate() {
        let chunk_index = index as i32;
        out.push(ChunkDraft {
            chat_id: first.chat_id,
            message_seq: first.message_seq,
            chunk_index,
            metadata: ChunkMetadata {
                ts: first.sent_at,
                chat_title: chat_title.to_string(),
                chat_id: first.chat_id,
                message_seq: first.message_seq,
                author_name: first.author_name.clone(),
                author_handle: first.author_handle.clone(),
                full_text: full_text.clone(),
                reply_to_seq,
                reply_to_text: reply_to_text.clone(),
                likely_answer_to,
                is_question,
                is_answer,
                chunk_index,
                total_chunks,
            },
            text,
        });
    }

    PrevGroup {
        author_id: first.author_id,
        last_seq: last.message_seq,
        last_ts: last.sent_at,
        ended_with_question: last.text.trim_end().ends_with('?'),
    }
}

/// Cuts a group's text into chunks of at most `size` characters, splitting on
/// sentence boundaries with `overlap` characters carried between neighbours.
fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if char_len(text) <= size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if char_len(&sentence) > size {
            // Pathological sentence longer than a whole chunk: hard-wrap it.
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.extend(hard_wrap(&sentence, size, overlap));
            continue;
        }

        if !current.is_empty() && char_len(&current) + 1 + char_len(&sentence) > size {
            let tail = overlap_tail(&current, overlap);
            chunks.push(std::mem::take(&mut current));
            current = tail;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&sentence);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Splits on sentence-final punctuation followed by whitespace, and on
/// newlines (message boundaries within a group).
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            push_trimmed(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?' | '…') && chars.peek().is_none_or(|n| n.is_whitespace()) {
            push_trimmed(&mut sentences, &mut current);
        }
    }
    push_trimmed(&mut sentences, &mut current);

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Last `overlap` characters of a chunk, on a char boundary.
fn overlap_tail(text: &str, overlap: usize) -> String {
    let total = char_len(text);
    if total <= overlap {
        return text.to_string();
    }
    text.chars().skip(total - overlap).collect()
}

/// Fixed-size windows over an oversized sentence, stepping by
/// `size - overlap` so neighbours still share context.
fn hard_wrap(sentence: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = sentence.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences_on_punctuation_and_newlines() {
        let sentences = split_sentences("First thing. Second thing!\nThird thing");
        assert_eq!(sentences, vec!["First thing.", "Second thing!", "Third thing"]);
    }

    #[test]
    fn test_short_text_is_one_piece() {
        let pieces = split_text("short message", 500, 100);
        assert_eq!(pieces, vec!["short message".to_string()]);
    }

    #[test]
    fn test_split_respects_size_bound_with_overlap_slack() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} has a few words in it.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let pieces = split_text(&text, 500, 100);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.chars().count() <= 601, "piece too long: {}", piece.len());
        }
    }

    #[test]
    fn test_adjacent_pieces_share_overlap() {
        let text = (0..40)
            .map(|i| format!("Sentence number {} has a few words in it.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let pieces = split_text(&text, 500, 100);
        for pair in pieces.windows(2) {
            let tail: String = pair[0]
                .chars()
                .skip(pair[0].chars().count().saturating_sub(40))
                .collect();
            assert!(
                pair[1].contains(tail.split_whitespace().next().unwrap_or("")),
                "no shared context between adjacent pieces"
            );
        }
    }

    #[test]
    fn test_hard_wrap_makes_progress() {
        let long = "x".repeat(1200);
        let pieces = hard_wrap(&long, 500, 100);
        assert_eq!(pieces[0].chars().count(), 500);
        assert!(pieces.len() >= 3);
        let reassembled_len: usize = pieces.iter().map(|p| p.chars().count()).sum();
        assert!(reassembled_len >= 1200);
    }

    #[test]
    fn test_overlap_tail() {
        assert_eq!(overlap_tail("abcdef", 3), "def");
        assert_eq!(overlap_tail("ab", 3), "ab");
    }
}
