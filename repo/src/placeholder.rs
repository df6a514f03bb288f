//! `?` placeholder handling.
//!
//! Fragments are written with `?` placeholders so they can be combined in any
//! order. Before execution they are numbered for Postgres (`$1`, `$2`, ...).
//! `??` stands for a literal `?`. Quoted text (`'...'`, `E'...'`, `"..."`,
//! `$tag$...$tag$`) and comments (`-- ...`, `/* ... */`) are left untouched.

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// End (exclusive) of a quoted run opening at `start`. A doubled quote
/// stays inside the run; with `backslash`, so does any escaped character.
fn quoted_end(chars: &[char], start: usize, quote: char, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash && c == '\\' {
            i += 2;
        } else if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
            } else {
                return i + 1;
            }
        } else {
            i += 1;
        }
    }
    chars.len()
}

/// End (exclusive) of a `/* ... */` comment opening at `start`. Postgres
/// block comments nest.
fn block_comment_end(chars: &[char], start: usize) -> usize {
    let mut depth = 0;
    let mut i = start;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1)) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// End (exclusive) of a dollar-quoted body opening at `start`, or `None`
/// when the `$` does not open one (e.g. `$1`).
fn dollar_quote_end(chars: &[char], start: usize) -> Option<usize> {
    if start > 0 && (is_ident(chars[start - 1]) || chars[start - 1] == '$') {
        return None;
    }

    let mut i = start + 1;
    if let Some(&c) = chars.get(i) {
        if c.is_ascii_digit() {
            return None;
        }
    }
    while i < chars.len() && is_ident(chars[i]) {
        i += 1;
    }
    if chars.get(i) != Some(&'$') {
        return None;
    }

    let tag = &chars[start..=i];
    let mut j = i + 1;
    while j + tag.len() <= chars.len() {
        if &chars[j..j + tag.len()] == tag {
            return Some(j + tag.len());
        }
        j += 1;
    }
    Some(chars.len())
}

fn walk(sql: &str, mut on_placeholder: impl FnMut(&mut String)) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        let skip_to = match c {
            '\'' => {
                let escaped = i > 0
                    && matches!(chars[i - 1], 'e' | 'E')
                    && (i < 2 || !is_ident(chars[i - 2]));
                Some(quoted_end(&chars, i, '\'', escaped))
            }
            '"' => Some(quoted_end(&chars, i, '"', false)),
            '-' if next == Some('-') => Some(
                chars[i..]
                    .iter()
                    .position(|&c| c == '\n')
                    .map_or(chars.len(), |p| i + p + 1),
            ),
            '/' if next == Some('*') => Some(block_comment_end(&chars, i)),
            '$' => dollar_quote_end(&chars, i),
            _ => None,
        };

        if let Some(end) = skip_to {
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        match (c, next) {
            ('?', Some('?')) => {
                out.push('?');
                i += 2;
            }
            ('?', _) => {
                on_placeholder(&mut out);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Number of placeholders in `sql`.
pub fn count(sql: &str) -> usize {
    let mut n = 0;
    walk(sql, |_| n += 1);
    n
}

/// Rewrite `?` placeholders as `$1`, `$2`, ... in order of appearance.
pub fn dollar(sql: &str) -> String {
    let mut n = 0;
    walk(sql, |out| {
        n += 1;
        out.push('$');
        out.push_str(&n.to_string());
    })
}
