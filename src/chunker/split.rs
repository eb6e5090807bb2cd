/// Cuts `text` into trimmed pieces of at most `max_chars` characters.
///
/// Cut points, by priority: a paragraph break in the last 20% of the window,
/// a sentence end (`.!?` + whitespace + uppercase) in the last half, the last
/// whitespace, and finally a hard cut inside an unbroken run. After each cut
/// the cursor rewinds `overlap_chars` and moves forward to the next word start.
pub(crate) fn split_at_boundaries(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<String> {
    debug_assert!(max_chars > 0);

    let chars = text.chars().collect::<Vec<char>>();
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        if chars.len() - start <= max_chars {
            push_piece(&mut pieces, &chars[start..]);
            break;
        }

        let window_end = start + max_chars;
        let end = find_boundary(&chars, start, window_end);
        push_piece(&mut pieces, &chars[start..end]);
        start = next_start(&chars, start, end, overlap_chars);
    }

    pieces
}

fn find_boundary(chars: &[char], start: usize, window_end: usize) -> usize {
    let window = window_end - start;

    let paragraph_floor = start + window * 4 / 5;
    if let Some(end) = rfind_paragraph_break(chars, paragraph_floor, window_end) {
        return end;
    }

    let sentence_floor = start + window / 2;
    if let Some(end) = rfind_sentence_end(chars, sentence_floor, window_end) {
        return end;
    }

    (start + 1..=window_end)
        .rev()
        .find(|&index| chars[index].is_whitespace())
        .unwrap_or(window_end)
}

fn rfind_paragraph_break(chars: &[char], floor: usize, window_end: usize) -> Option<usize> {
    if window_end < floor + 2 {
        return None;
    }

    (floor..=window_end - 2)
        .rev()
        .find(|&index| chars[index] == '\n' && chars[index + 1] == '\n')
        .map(|index| index + 2)
}

fn rfind_sentence_end(chars: &[char], floor: usize, window_end: usize) -> Option<usize> {
    (floor..window_end)
        .rev()
        .find(|&index| {
            matches!(chars[index], '.' | '!' | '?')
                && chars.get(index + 1).is_some_and(|next| next.is_whitespace())
                && chars.get(index + 2).is_some_and(|next| next.is_uppercase())
        })
        .map(|index| index + 1)
}

fn next_start(chars: &[char], start: usize, end: usize, overlap_chars: usize) -> usize {
    if overlap_chars == 0 {
        return end;
    }

    let mut next = end.saturating_sub(overlap_chars).max(start + 1);
    while next < end && !chars[next - 1].is_whitespace() {
        next += 1;
    }
    next
}

fn push_piece(pieces: &mut Vec<String>, chars: &[char]) {
    let piece = chars.iter().collect::<String>();
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}
