//! LP-format reader.
//!
//! Supports the common subset: an objective section opened by
//! `MINIMIZE`/`MAXIMIZE`, constraints under `SUBJECT TO` with `<=`, `>=`,
//! `=` or a two-sided `l <= expr <= u` form, a `BOUNDS` section (including
//! `free`), and `END`. Variables appear on first use with the default box
//! `[0, +inf)`; comments start with `\`.

use std::collections::HashMap;

use faer::Col;

use super::{NameTables, ParseError};
use crate::lp::LinearProgram;
use crate::settings::ObjSense;
use crate::{E, I, INFTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Objective,
    Constraints,
    Bounds,
    End,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(E),
    Ident(String),
    Plus,
    Minus,
    Le,
    Ge,
    Eq,
    Colon,
}

fn tokenize(line: &str, lineno: usize) -> Result<Vec<Tok>, ParseError> {
    let mut out = Vec::new();
    let bytes: Vec<char> = line.chars().collect();
    let mut k = 0;
    while k < bytes.len() {
        let c = bytes[k];
        match c {
            ' ' | '\t' => k += 1,
            '\\' => break,
            '+' => {
                out.push(Tok::Plus);
                k += 1;
            }
            '-' => {
                out.push(Tok::Minus);
                k += 1;
            }
            ':' => {
                out.push(Tok::Colon);
                k += 1;
            }
            '<' | '>' | '=' => {
                let mut j = k + 1;
                if j < bytes.len() && bytes[j] == '=' {
                    j += 1;
                }
                out.push(match c {
                    '<' => Tok::Le,
                    '>' => Tok::Ge,
                    _ => Tok::Eq,
                });
                k = j;
            }
            _ if c.is_ascii_digit() || c == '.' => {
                let start = k;
                while k < bytes.len()
                    && (bytes[k].is_ascii_digit()
                        || bytes[k] == '.'
                        || bytes[k] == 'e'
                        || bytes[k] == 'E'
                        || ((bytes[k] == '+' || bytes[k] == '-')
                            && k > start
                            && (bytes[k - 1] == 'e' || bytes[k - 1] == 'E')))
                {
                    k += 1;
                }
                let txt: String = bytes[start..k].iter().collect();
                let v = txt
                    .parse::<E>()
                    .map_err(|_| ParseError::at(lineno, format!("invalid number '{}'", txt)))?;
                out.push(Tok::Num(v));
            }
            _ if c.is_ascii_alphabetic() || c == '_' => {
                let start = k;
                while k < bytes.len()
                    && (bytes[k].is_ascii_alphanumeric()
                        || bytes[k] == '_'
                        || bytes[k] == '('
                        || bytes[k] == ')'
                        || bytes[k] == '['
                        || bytes[k] == ']'
                        || bytes[k] == '.')
                {
                    k += 1;
                }
                out.push(Tok::Ident(bytes[start..k].iter().collect()));
            }
            other => {
                return Err(ParseError::at(
                    lineno,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }
    Ok(out)
}

fn section_keyword(toks: &[Tok]) -> Option<Section> {
    let first = match toks.first() {
        Some(Tok::Ident(w)) => w.to_ascii_uppercase(),
        _ => return None,
    };
    match first.as_str() {
        "MINIMIZE" | "MINIMISE" | "MIN" | "MAXIMIZE" | "MAXIMISE" | "MAX" => {
            Some(Section::Objective)
        }
        "SUBJECT" | "ST" | "S" | "S.T." | "S.T" => Some(Section::Constraints),
        "SUCH" => Some(Section::Constraints),
        "BOUNDS" | "BOUND" => Some(Section::Bounds),
        "END" => Some(Section::End),
        _ => None,
    }
}

struct Builder {
    sense: ObjSense,
    cols: Vec<String>,
    col_index: HashMap<String, usize>,
    obj: Vec<E>,
    rows: Vec<String>,
    entries: Vec<(I, I, E)>,
    lhs: Vec<E>,
    rhs: Vec<E>,
    lower: Vec<E>,
    upper: Vec<E>,
    anon_rows: usize,
}

impl Builder {
    fn col(&mut self, name: &str) -> usize {
        if let Some(&j) = self.col_index.get(name) {
            return j;
        }
        let j = self.cols.len();
        self.col_index.insert(name.to_string(), j);
        self.cols.push(name.to_string());
        self.obj.push(0.);
        self.lower.push(0.);
        self.upper.push(INFTY);
        j
    }
}

/// A parsed linear expression: `terms` plus a constant offset.
struct Expr {
    terms: Vec<(usize, E)>,
    constant: E,
}

/// Parses `[+|-] [num] ident ...` terms until a relation token or the end.
fn parse_expr(
    b: &mut Builder,
    toks: &[Tok],
    mut k: usize,
    lineno: usize,
) -> Result<(Expr, usize), ParseError> {
    let mut expr = Expr {
        terms: Vec::new(),
        constant: 0.,
    };
    loop {
        let mut sign = 1.;
        loop {
            match toks.get(k) {
                Some(Tok::Plus) => k += 1,
                Some(Tok::Minus) => {
                    sign = -sign;
                    k += 1;
                }
                _ => break,
            }
        }
        match toks.get(k) {
            Some(Tok::Num(v)) => {
                k += 1;
                match toks.get(k) {
                    Some(Tok::Ident(name)) => {
                        let j = b.col(name);
                        expr.terms.push((j, sign * v));
                        k += 1;
                    }
                    _ => expr.constant += sign * v,
                }
            }
            Some(Tok::Ident(name)) => {
                let j = b.col(name);
                expr.terms.push((j, sign));
                k += 1;
            }
            _ => {
                if sign < 0. {
                    return Err(ParseError::at(lineno, "dangling sign in expression"));
                }
                return Ok((expr, k));
            }
        }
    }
}

fn expect_num(toks: &[Tok], k: usize, lineno: usize) -> Result<(E, usize), ParseError> {
    let mut sign = 1.;
    let mut k = k;
    loop {
        match toks.get(k) {
            Some(Tok::Plus) => k += 1,
            Some(Tok::Minus) => {
                sign = -sign;
                k += 1;
            }
            Some(Tok::Num(v)) => return Ok((sign * v, k + 1)),
            Some(Tok::Ident(w)) if w.eq_ignore_ascii_case("inf") || w.eq_ignore_ascii_case("infinity") => {
                return Ok((sign * INFTY, k + 1))
            }
            _ => return Err(ParseError::at(lineno, "expected a number")),
        }
    }
}

/// Parses an LP-format model from text.
pub fn read(text: &str) -> Result<(LinearProgram, NameTables), ParseError> {
    let mut b = Builder {
        sense: ObjSense::Minimize,
        cols: Vec::new(),
        col_index: HashMap::new(),
        obj: Vec::new(),
        rows: Vec::new(),
        entries: Vec::new(),
        lhs: Vec::new(),
        rhs: Vec::new(),
        lower: Vec::new(),
        upper: Vec::new(),
        anon_rows: 0,
    };
    let mut section = None;
    // Multi-line statements accumulate until a fresh label or section.
    let mut pending: Vec<Tok> = Vec::new();
    let mut pending_line = 0usize;

    let mut statements: Vec<(Section, Vec<Tok>, usize)> = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = lineno + 1;
        let toks = tokenize(raw, line)?;
        if toks.is_empty() {
            continue;
        }
        if let Some(next) = section_keyword(&toks) {
            if !pending.is_empty() {
                statements.push((section.unwrap_or(Section::Objective), pending, pending_line));
                pending = Vec::new();
            }
            if next == Section::Objective {
                if let Some(Tok::Ident(w)) = toks.first() {
                    let w = w.to_ascii_uppercase();
                    if w.starts_with("MAX") {
                        b.sense = ObjSense::Maximize;
                    }
                }
            }
            section = Some(next);
            if next == Section::End {
                break;
            }
            continue;
        }
        let sec = section.ok_or_else(|| {
            ParseError::at(line, "content before the objective section")
        })?;

        // A labelled line (`name:`) or a bounds line starts a fresh
        // statement; continuation lines are appended.
        let starts_new = sec == Section::Bounds
            || toks.iter().take(2).any(|t| *t == Tok::Colon)
            || pending.is_empty();
        if starts_new && !pending.is_empty() {
            statements.push((sec, pending, pending_line));
            pending = Vec::new();
        }
        if pending.is_empty() {
            pending_line = line;
        }
        pending.extend(toks);
        if sec == Section::Bounds {
            statements.push((sec, pending, pending_line));
            pending = Vec::new();
        }
    }
    if !pending.is_empty() {
        statements.push((section.unwrap_or(Section::Objective), pending, pending_line));
    }

    for (sec, toks, line) in statements {
        match sec {
            Section::Objective => {
                let (toks, line) = (strip_label(toks), line);
                let (expr, k) = parse_expr(&mut b, &toks, 0, line)?;
                if k != toks.len() {
                    return Err(ParseError::at(line, "trailing tokens in objective"));
                }
                for (j, v) in expr.terms {
                    b.obj[j] += v;
                }
            }
            Section::Constraints => {
                parse_constraint(&mut b, toks, line)?;
            }
            Section::Bounds => {
                parse_bound(&mut b, toks, line)?;
            }
            Section::End => {}
        }
    }

    let n = b.cols.len();
    let m = b.rows.len();
    let lp = LinearProgram::new(
        b.sense,
        Col::from_fn(n, |j| b.obj[j]),
        m,
        &b.entries,
        Col::from_fn(m, |i| b.lhs[i]),
        Col::from_fn(m, |i| b.rhs[i]),
        Col::from_fn(n, |j| b.lower[j]),
        Col::from_fn(n, |j| b.upper[j]),
    )
    .map_err(|e| ParseError::Model {
        message: e.to_string(),
    })?;
    Ok((
        lp,
        NameTables {
            rows: b.rows,
            cols: b.cols,
        },
    ))
}

fn strip_label(toks: Vec<Tok>) -> Vec<Tok> {
    if toks.len() >= 2 && toks[1] == Tok::Colon {
        toks.into_iter().skip(2).collect()
    } else {
        toks
    }
}

fn take_label(toks: &[Tok]) -> (Option<String>, usize) {
    if toks.len() >= 2 && toks[1] == Tok::Colon {
        if let Tok::Ident(name) = &toks[0] {
            return (Some(name.clone()), 2);
        }
    }
    (None, 0)
}

fn parse_constraint(b: &mut Builder, toks: Vec<Tok>, line: usize) -> Result<(), ParseError> {
    let (label, mut k) = take_label(&toks);

    // Optional leading `l <=` of a two-sided row.
    let mut lhs_val: Option<E> = None;
    if let Ok((v, k2)) = expect_num(&toks, k, line) {
        if matches!(toks.get(k2), Some(Tok::Le)) {
            lhs_val = Some(v);
            k = k2 + 1;
        }
    }

    let (expr, k2) = parse_expr(b, &toks, k, line)?;
    k = k2;
    let rel = match toks.get(k) {
        Some(Tok::Le) => Tok::Le,
        Some(Tok::Ge) => Tok::Ge,
        Some(Tok::Eq) => Tok::Eq,
        _ => return Err(ParseError::at(line, "expected a relation in constraint")),
    };
    k += 1;
    let (bound, k3) = expect_num(&toks, k, line)?;
    if k3 != toks.len() {
        return Err(ParseError::at(line, "trailing tokens in constraint"));
    }
    let bound = bound - expr.constant;
    let lhs_val = lhs_val.map(|v| v - expr.constant);

    let (lhs, rhs) = match (lhs_val, &rel) {
        (Some(l), Tok::Le) => (l, bound),
        (None, Tok::Le) => (-INFTY, bound),
        (None, Tok::Ge) => (bound, INFTY),
        (None, Tok::Eq) => (bound, bound),
        _ => return Err(ParseError::at(line, "unsupported ranged relation")),
    };

    let i = b.rows.len();
    let name = label.unwrap_or_else(|| {
        b.anon_rows += 1;
        format!("c{}", b.anon_rows)
    });
    b.rows.push(name);
    b.lhs.push(lhs);
    b.rhs.push(rhs);
    for (j, v) in expr.terms {
        b.entries.push((i, j, v));
    }
    Ok(())
}

fn parse_bound(b: &mut Builder, toks: Vec<Tok>, line: usize) -> Result<(), ParseError> {
    // `x free`
    if toks.len() == 2 {
        if let (Tok::Ident(name), Tok::Ident(kw)) = (&toks[0], &toks[1]) {
            if kw.eq_ignore_ascii_case("free") {
                let j = b.col(name);
                b.lower[j] = -INFTY;
                b.upper[j] = INFTY;
                return Ok(());
            }
        }
    }

    // `l <= x <= u`, `x <= u`, `x >= l`, `x = v`, and the mirrored forms.
    let mut k = 0;
    let mut low: Option<E> = None;
    if let Ok((v, k2)) = expect_num(&toks, k, line) {
        match toks.get(k2) {
            Some(Tok::Le) => {
                low = Some(v);
                k = k2 + 1;
            }
            Some(Tok::Ge) => {
                // `u >= x` form.
                if let Some(Tok::Ident(name)) = toks.get(k2 + 1) {
                    let j = b.col(name);
                    b.upper[j] = v;
                    return Ok(());
                }
                return Err(ParseError::at(line, "malformed bound"));
            }
            _ => return Err(ParseError::at(line, "malformed bound")),
        }
    }

    let name = match toks.get(k) {
        Some(Tok::Ident(name)) => name.clone(),
        _ => return Err(ParseError::at(line, "expected a variable in bound")),
    };
    k += 1;
    let j = b.col(&name);
    if let Some(l) = low {
        b.lower[j] = l;
    }
    match toks.get(k) {
        None => {
            if low.is_none() {
                return Err(ParseError::at(line, "bound without a relation"));
            }
        }
        Some(Tok::Le) => {
            let (v, k2) = expect_num(&toks, k + 1, line)?;
            if k2 != toks.len() {
                return Err(ParseError::at(line, "trailing tokens in bound"));
            }
            b.upper[j] = v;
        }
        Some(Tok::Ge) => {
            let (v, k2) = expect_num(&toks, k + 1, line)?;
            if k2 != toks.len() {
                return Err(ParseError::at(line, "trailing tokens in bound"));
            }
            b.lower[j] = v;
        }
        Some(Tok::Eq) => {
            let (v, k2) = expect_num(&toks, k + 1, line)?;
            if k2 != toks.len() {
                return Err(ParseError::at(line, "trailing tokens in bound"));
            }
            b.lower[j] = v;
            b.upper[j] = v;
        }
        _ => return Err(ParseError::at(line, "malformed bound")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unbounded;

    const SAMPLE: &str = "\
\\ a small model
MINIMIZE
 obj: 2 x + 3 y - z
SUBJECT TO
 c1: x + y <= 10
 c2: x - z >= -2
 c3: y + z = 4
BOUNDS
 -1 <= z <= 6
 x <= 8
 y free
END
";

    #[test]
    fn test_read_sample() {
        let (lp, names) = read(SAMPLE).unwrap();
        assert_eq!(lp.dims(), (3, 3));
        assert_eq!(names.cols, vec!["x", "y", "z"]);
        assert_eq!(names.rows, vec!["c1", "c2", "c3"]);

        assert_eq!(lp.obj()[0], 2.);
        assert_eq!(lp.obj()[2], -1.);

        assert_eq!(lp.rhs()[0], 10.);
        assert!(is_unbounded(lp.lhs()[0]));
        assert_eq!(lp.lhs()[1], -2.);
        assert_eq!(lp.lhs()[2], 4.);
        assert_eq!(lp.rhs()[2], 4.);

        assert_eq!(lp.lower()[2], -1.);
        assert_eq!(lp.upper()[2], 6.);
        assert_eq!(lp.upper()[0], 8.);
        assert!(is_unbounded(lp.lower()[1]));
    }

    #[test]
    fn test_maximize_sense() {
        let (lp, _) = read("MAXIMIZE\n obj: x\nSUBJECT TO\n c: x <= 3\nEND\n").unwrap();
        assert_eq!(lp.sense(), ObjSense::Maximize);
    }

    #[test]
    fn test_two_sided_row() {
        let (lp, _) = read("MINIMIZE\n obj: x\nSUBJECT TO\n c: 1 <= x + x <= 5\nEND\n").unwrap();
        assert_eq!(lp.lhs()[0], 1.);
        assert_eq!(lp.rhs()[0], 5.);
    }
}
