//! Break point detection for chunking

/// Priority levels for break points
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BreakPriority {
    /// Word boundary (lowest)
    Word = 1,
    /// Sentence boundary
    Sentence = 2,
    /// Paragraph boundary (highest)
    Paragraph = 3,
}

/// A potential cut position in text (chunk ends before `position`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakPoint {
    /// Character position
    pub position: usize,
    /// Priority of this break point
    pub priority: BreakPriority,
}

impl BreakPoint {
    pub fn new(position: usize, priority: BreakPriority) -> Self {
        Self { position, priority }
    }
}

/// Classify a cut at `pos`, if cutting there lands between words
pub fn classify_break(chars: &[char], pos: usize) -> Option<BreakPriority> {
    if pos == 0 || pos >= chars.len() {
        return None;
    }
    let prev = chars[pos - 1];
    if prev == '\n' {
        return Some(BreakPriority::Paragraph);
    }
    if !prev.is_whitespace() {
        return None;
    }
    if pos >= 2 && matches!(chars[pos - 2], '.' | '!' | '?') {
        return Some(BreakPriority::Sentence);
    }
    Some(BreakPriority::Word)
}

/// Best break in `[lo, hi]`: highest priority, then closest to `hi`
pub fn find_best_break(chars: &[char], lo: usize, hi: usize) -> Option<BreakPoint> {
    let mut best: Option<BreakPoint> = None;
    for pos in (lo..=hi).rev() {
        let Some(priority) = classify_break(chars, pos) else {
            continue;
        };
        if best.map_or(true, |b| priority > b.priority) {
            best = Some(BreakPoint::new(pos, priority));
            if priority == BreakPriority::Paragraph {
                break;
            }
        }
    }
    best
}

/// First word start in `[from, to)`
pub fn next_word_start(chars: &[char], from: usize, to: usize) -> Option<usize> {
    (from..to.min(chars.len()))
        .find(|&i| !chars[i].is_whitespace() && (i == 0 || chars[i - 1].is_whitespace()))
}
