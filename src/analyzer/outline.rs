//! Line-based outline of Python sources: functions, classes, their
//! extent, positional parameters and docstrings.
//!
//! Lines inside triple-quoted strings are never read as definitions, and a
//! definition's header ends at the first top-level `:`, so one-line bodies
//! such as `def f(): return 1` are recognized.

/// How far past a `def` line we look for the end of its header.
const MAX_HEADER_LINES: usize = 20;

/// A `def` or `class` found in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// `"Function"` or `"Class"`.
    pub kind: &'static str,
    pub name: String,
    /// 1-indexed line of the `def`/`class` keyword.
    pub line: usize,
    /// 1-indexed last line of the body.
    pub end_line: usize,
    /// Positional parameters, `self` included, as Python's `args.args` counts them.
    pub params: usize,
    pub documented: bool,
}

impl Definition {
    pub fn is_function(&self) -> bool {
        self.kind == "Function"
    }

    /// Lines spanned after the header line.
    pub fn length(&self) -> usize {
        self.end_line - self.line
    }
}

/// Outline every definition in a file, in source order.
pub fn definitions(content: &str) -> Vec<Definition> {
    let lines: Vec<&str> = content.lines().collect();
    let in_string = string_lines(&lines);
    let mut found = Vec::new();

    for (idx, line) in lines.iter().enumerate() {
        if in_string[idx] {
            continue;
        }
        let Some((kind, name)) = parse_definition(line) else {
            continue;
        };

        let (documented, params, body_from) = match header_end(&lines, &in_string, idx) {
            Some(header) => (
                has_docstring(&lines, header.line, header.inline),
                header.positional_params(),
                header.line,
            ),
            None => (false, 0, idx),
        };

        found.push(Definition {
            kind,
            name,
            line: idx + 1,
            end_line: body_end(&lines, &in_string, idx, body_from) + 1,
            params,
            documented,
        });
    }

    found
}

/// Whether a path names a pytest-style test module.
pub fn is_test_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.starts_with("test_") || name.ends_with("_test.py") || name == "conftest.py"
}

/// For each line, whether it starts inside a triple-quoted string.
fn string_lines(lines: &[&str]) -> Vec<bool> {
    let mut open: Option<&'static str> = None;

    lines
        .iter()
        .map(|line| {
            let inside = open.is_some();
            let mut rest = *line;
            loop {
                if let Some(delim) = open {
                    match rest.find(delim) {
                        Some(end) => {
                            rest = &rest[end + delim.len()..];
                            open = None;
                        }
                        None => break,
                    }
                    continue;
                }

                let next = ["\"\"\"", "'''", "#"]
                    .into_iter()
                    .filter_map(|token| rest.find(token).map(|pos| (pos, token)))
                    .min_by_key(|(pos, _)| *pos);
                match next {
                    Some((pos, "\"\"\"")) => {
                        open = Some("\"\"\"");
                        rest = &rest[pos + 3..];
                    }
                    Some((pos, "'''")) => {
                        open = Some("'''");
                        rest = &rest[pos + 3..];
                    }
                    _ => break,
                }
            }
            inside
        })
        .collect()
}

fn parse_definition(line: &str) -> Option<(&'static str, String)> {
    let trimmed = line.trim_start();
    let (kind, rest) = if let Some(rest) = trimmed.strip_prefix("async def ") {
        ("Function", rest)
    } else if let Some(rest) = trimmed.strip_prefix("def ") {
        ("Function", rest)
    } else if let Some(rest) = trimmed.strip_prefix("class ") {
        ("Class", rest)
    } else {
        return None;
    };

    let name: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if name.is_empty() {
        None
    } else {
        Some((kind, name))
    }
}

fn indent(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

struct Header<'a> {
    /// Index of the line holding the closing `:`.
    line: usize,
    /// Code after the `:` on that line.
    inline: &'a str,
    /// Top-level entries of the first parenthesized group.
    params: Vec<String>,
}

impl Header<'_> {
    /// Entries after any `/` and before the first `*`.
    fn positional_params(&self) -> usize {
        let entries: Vec<&str> = self
            .params
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect();
        let after_slash = entries
            .iter()
            .position(|p| *p == "/")
            .map_or(0, |pos| pos + 1);

        entries[after_slash..]
            .iter()
            .take_while(|p| !p.starts_with('*'))
            .count()
    }
}

/// Find the `:` that closes the header starting at `start`. Gives up at the
/// next definition or string line, so a header can never borrow another
/// definition's body.
fn header_end<'a>(lines: &[&'a str], in_string: &[bool], start: usize) -> Option<Header<'a>> {
    let mut depth = 0usize;
    let mut groups = 0usize;
    let mut params = Vec::new();
    let mut current = String::new();

    for (idx, &line) in lines.iter().enumerate().skip(start).take(MAX_HEADER_LINES) {
        if idx > start && (in_string[idx] || parse_definition(line).is_some()) {
            return None;
        }

        let mut quote: Option<char> = None;
        for (pos, c) in line.char_indices() {
            let collecting = groups == 1 && depth > 0;
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                if collecting {
                    current.push(c);
                }
                continue;
            }

            match c {
                '#' => break,
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => {
                    depth += 1;
                    if depth == 1 {
                        groups += 1;
                        continue;
                    }
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 && groups == 1 {
                        params.push(std::mem::take(&mut current));
                        continue;
                    }
                }
                ',' if collecting && depth == 1 => {
                    params.push(std::mem::take(&mut current));
                    continue;
                }
                ':' if depth == 0 => {
                    return Some(Header {
                        line: idx,
                        inline: &line[pos + 1..],
                        params,
                    });
                }
                _ => {}
            }

            if collecting {
                current.push(c);
            }
        }
    }

    None
}

/// Whether the body's first statement is a string literal.
fn has_docstring(lines: &[&str], header_line: usize, inline: &str) -> bool {
    let inline = inline.trim();
    if !inline.is_empty() && !inline.starts_with('#') {
        return is_string_statement(inline);
    }

    lines[header_line + 1..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .is_some_and(is_string_statement)
}

/// A statement made of a single string literal, e.g. `"Doc."` or an opening `"""`.
fn is_string_statement(text: &str) -> bool {
    let text = text.trim();
    let literal = text
        .strip_prefix(['r', 'R', 'u', 'U'])
        .unwrap_or(text);

    for delim in ["\"\"\"", "'''", "\"", "'"] {
        let Some(rest) = literal.strip_prefix(delim) else {
            continue;
        };
        return match rest.find(delim) {
            Some(end) => {
                let after = rest[end + delim.len()..].trim();
                after.is_empty() || after.starts_with('#') || after == ";"
            }
            None => delim.len() == 3,
        };
    }
    false
}

/// Index of the last body line: the last non-blank line indented past the
/// definition, or the header itself for one-line bodies.
fn body_end(lines: &[&str], in_string: &[bool], def_line: usize, header_line: usize) -> usize {
    let base = indent(lines[def_line]);
    let mut end = header_line;

    for (idx, line) in lines.iter().enumerate().skip(header_line + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if !in_string[idx] && indent(line) <= base {
            break;
        }
        end = idx;
    }

    end
}
