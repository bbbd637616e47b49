/// Word-wrapped text plus the `(line, col)` of every char boundary, so the
/// input cursor can be placed on the wrapped layout.
#[derive(Debug, Clone)]
pub struct WrappedText {
    pub lines: Vec<String>,
    pub positions: Vec<(u16, u16)>,
}

impl WrappedText {
    pub fn line_count(&self) -> u16 {
        self.lines.len().max(1) as u16
    }

    pub fn rendered(&self) -> String {
        self.lines.join("\n")
    }
}

pub fn wrap_word_with_positions(text: &str, width: u16) -> WrappedText {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut lines = vec![String::new()];
    let mut positions = Vec::with_capacity(chars.len() + 1);
    let mut col = 0u16;
    positions.push((0, 0));

    let break_line = |lines: &mut Vec<String>, col: &mut u16| {
        lines.push(String::new());
        *col = 0;
    };

    for (idx, ch) in chars.iter().copied().enumerate() {
        if ch == '\n' {
            break_line(&mut lines, &mut col);
        } else {
            if col >= width || starts_overflowing_word(&chars, idx, col, width) {
                break_line(&mut lines, &mut col);
            }
            if let Some(line) = lines.last_mut() {
                line.push(ch);
            }
            col = col.saturating_add(1);
        }
        let line = lines.len().saturating_sub(1) as u16;
        // A full line puts the cursor at the start of the next one.
        if col >= width && ch != '\n' {
            positions.push((line.saturating_add(1), 0));
        } else {
            positions.push((line, col));
        }
    }

    WrappedText { lines, positions }
}

/// Word starting at `idx` would cross the edge but fits on a fresh line.
fn starts_overflowing_word(chars: &[char], idx: usize, col: u16, width: u16) -> bool {
    if col == 0 || chars[idx].is_whitespace() {
        return false;
    }
    if idx > 0 && !chars[idx - 1].is_whitespace() {
        return false;
    }
    let word_len = chars[idx..]
        .iter()
        .take_while(|c| !c.is_whitespace())
        .count() as u16;
    word_len <= width && col.saturating_add(word_len) > width
}

/// Wrapped display lines for read-only text; never empty.
pub fn wrap_lines(text: &str, width: u16) -> Vec<String> {
    let mut lines = wrap_word_with_positions(text, width).lines;
    while lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}
