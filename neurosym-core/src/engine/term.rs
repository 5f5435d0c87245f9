//! Lexical helpers over Prolog term text.
//!
//! These never parse Prolog properly; they only need to skip quoted text and
//! track bracket depth, which is enough to find goal variables and split the
//! top level of a printed list.

/// Named variables in `goal`, in order of first appearance.
///
/// Quoted atoms, strings and back-quoted text are skipped. The anonymous
/// variable `_` is not reported; `_Named` variables are.
pub fn goal_variables(goal: &str) -> Vec<String> {
    let chars: Vec<char> = goal.chars().collect();
    let mut vars: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if is_quote(c) {
            i = skip_quoted(&chars, i);
            continue;
        }

        if is_ident_char(c) {
            let start = i;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let first = chars[start];
            if first.is_uppercase() || (first == '_' && i - start > 1) {
                let name: String = chars[start..i].iter().collect();
                if !vars.contains(&name) {
                    vars.push(name);
                }
            }
            continue;
        }

        i += 1;
    }

    vars
}

/// Split a printed list term into its top-level elements.
///
/// Returns `None` when `term` is not a proper list literal (including
/// partial lists like `[a|T]`).
pub fn split_list(term: &str) -> Option<Vec<&str>> {
    let term = term.trim();
    let inner = term.strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let chars: Vec<(usize, char)> = inner.char_indices().collect();
    let mut elements = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            q if is_quote(q) => {
                i = skip_quoted_indexed(&chars, i);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                elements.push(inner[start..pos].trim());
                start = pos + 1;
            }
            '|' if depth == 0 => return None,
            _ => {}
        }
        i += 1;
    }

    if depth != 0 {
        return None;
    }
    elements.push(inner[start..].trim());
    Some(elements)
}

fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Index just past the quoted text starting at `open`.
/// Handles backslash escapes and doubled quotes.
fn skip_quoted(chars: &[char], open: usize) -> usize {
    let quote = chars[open];
    let mut i = open + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => {
                if chars.get(i + 1) == Some(&quote) {
                    i += 2;
                } else {
                    return i + 1;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

fn skip_quoted_indexed(chars: &[(usize, char)], open: usize) -> usize {
    let plain: Vec<char> = chars.iter().map(|(_, c)| *c).collect();
    skip_quoted(&plain, open)
}
