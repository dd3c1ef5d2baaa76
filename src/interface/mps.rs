//! MPS reader.
//!
//! Supports the fixed sections NAME, OBJSENSE, ROWS, COLUMNS, RHS, RANGES,
//! BOUNDS, and ENDATA. Row types `N`/`L`/`G`/`E` become the objective row
//! and ranged rows; bound types `LO`/`UP`/`FX`/`FR`/`MI`/`PL`/`BV` map onto
//! the column bounds, with `[0, +inf)` as the default box. Duplicate matrix
//! entries are accumulated.

use std::collections::HashMap;

use faer::Col;

use super::{NameTables, ParseError};
use crate::lp::LinearProgram;
use crate::settings::ObjSense;
use crate::{E, I, INFTY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowType {
    Objective,
    Leq,
    Geq,
    Eq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Start,
    Rows,
    Columns,
    Rhs,
    Ranges,
    Bounds,
}

struct Builder {
    sense: ObjSense,
    row_names: Vec<String>,
    row_index: HashMap<String, usize>,
    row_types: Vec<RowType>,
    obj_row: Option<String>,
    col_names: Vec<String>,
    col_index: HashMap<String, usize>,
    obj: Vec<E>,
    entries: HashMap<(I, I), E>,
    lhs: Vec<E>,
    rhs: Vec<E>,
    lower: Vec<E>,
    upper: Vec<E>,
}

impl Builder {
    fn new(sense: ObjSense) -> Self {
        Self {
            sense,
            row_names: Vec::new(),
            row_index: HashMap::new(),
            row_types: Vec::new(),
            obj_row: None,
            col_names: Vec::new(),
            col_index: HashMap::new(),
            obj: Vec::new(),
            entries: HashMap::new(),
            lhs: Vec::new(),
            rhs: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
        }
    }

    fn add_row(&mut self, name: &str, ty: RowType, line: usize) -> Result<(), ParseError> {
        if ty == RowType::Objective {
            if self.obj_row.is_none() {
                self.obj_row = Some(name.to_string());
            }
            // Additional free rows are dropped.
            return Ok(());
        }
        if self.row_index.contains_key(name) {
            return Err(ParseError::at(line, format!("duplicate row '{}'", name)));
        }
        self.row_index.insert(name.to_string(), self.row_names.len());
        self.row_names.push(name.to_string());
        self.row_types.push(ty);
        let (lhs, rhs) = match ty {
            RowType::Leq => (-INFTY, 0.),
            RowType::Geq => (0., INFTY),
            RowType::Eq => (0., 0.),
            RowType::Objective => unreachable!(),
        };
        self.lhs.push(lhs);
        self.rhs.push(rhs);
        Ok(())
    }

    fn col(&mut self, name: &str) -> usize {
        if let Some(&j) = self.col_index.get(name) {
            return j;
        }
        let j = self.col_names.len();
        self.col_index.insert(name.to_string(), j);
        self.col_names.push(name.to_string());
        self.obj.push(0.);
        self.lower.push(0.);
        self.upper.push(INFTY);
        j
    }

    fn set_entry(&mut self, row: &str, col: usize, value: E, line: usize) -> Result<(), ParseError> {
        if self.obj_row.as_deref() == Some(row) {
            self.obj[col] += value;
            return Ok(());
        }
        match self.row_index.get(row) {
            Some(&i) => {
                *self.entries.entry((i, col)).or_insert(0.) += value;
                Ok(())
            }
            None => Err(ParseError::at(line, format!("unknown row '{}'", row))),
        }
    }

    fn set_rhs(&mut self, row: &str, value: E, line: usize) -> Result<(), ParseError> {
        let i = *self
            .row_index
            .get(row)
            .ok_or_else(|| ParseError::at(line, format!("unknown row '{}'", row)))?;
        match self.row_types[i] {
            RowType::Leq => self.rhs[i] = value,
            RowType::Geq => self.lhs[i] = value,
            RowType::Eq => {
                self.lhs[i] = value;
                self.rhs[i] = value;
            }
            RowType::Objective => {}
        }
        Ok(())
    }

    fn set_range(&mut self, row: &str, value: E, line: usize) -> Result<(), ParseError> {
        let i = *self
            .row_index
            .get(row)
            .ok_or_else(|| ParseError::at(line, format!("unknown row '{}'", row)))?;
        match self.row_types[i] {
            RowType::Leq => self.lhs[i] = self.rhs[i] - value.abs(),
            RowType::Geq => self.rhs[i] = self.lhs[i] + value.abs(),
            RowType::Eq => {
                if value >= 0. {
                    self.rhs[i] = self.lhs[i] + value;
                } else {
                    self.lhs[i] += value;
                }
            }
            RowType::Objective => {}
        }
        Ok(())
    }

    fn set_bound(
        &mut self,
        kind: &str,
        col: &str,
        value: Option<E>,
        line: usize,
    ) -> Result<(), ParseError> {
        let j = *self
            .col_index
            .get(col)
            .ok_or_else(|| ParseError::at(line, format!("unknown column '{}'", col)))?;
        let need = |v: Option<E>| {
            v.ok_or_else(|| ParseError::at(line, format!("bound '{}' requires a value", kind)))
        };
        match kind {
            "LO" => self.lower[j] = need(value)?,
            "UP" => {
                self.upper[j] = need(value)?;
                // An upper bound below zero on a default box implies a free
                // lower bound in classical MPS.
                if self.upper[j] < 0. && self.lower[j] == 0. {
                    self.lower[j] = -INFTY;
                }
            }
            "FX" => {
                let v = need(value)?;
                self.lower[j] = v;
                self.upper[j] = v;
            }
            "FR" => {
                self.lower[j] = -INFTY;
                self.upper[j] = INFTY;
            }
            "MI" => self.lower[j] = -INFTY,
            "PL" => self.upper[j] = INFTY,
            "BV" => {
                self.lower[j] = 0.;
                self.upper[j] = 1.;
            }
            other => {
                return Err(ParseError::at(
                    line,
                    format!("unsupported bound type '{}'", other),
                ))
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<(LinearProgram, NameTables), ParseError> {
        let n = self.col_names.len();
        let m = self.row_names.len();
        let entries: Vec<(I, I, E)> = self
            .entries
            .into_iter()
            .map(|((i, j), v)| (i, j, v))
            .collect();
        let lp = LinearProgram::new(
            self.sense,
            Col::from_fn(n, |j| self.obj[j]),
            m,
            &entries,
            Col::from_fn(m, |i| self.lhs[i]),
            Col::from_fn(m, |i| self.rhs[i]),
            Col::from_fn(n, |j| self.lower[j]),
            Col::from_fn(n, |j| self.upper[j]),
        )
        .map_err(|e| ParseError::Model {
            message: e.to_string(),
        })?;
        Ok((
            lp,
            NameTables {
                rows: self.row_names,
                cols: self.col_names,
            },
        ))
    }
}

fn parse_value(tok: &str, line: usize) -> Result<E, ParseError> {
    tok.parse::<E>()
        .map_err(|_| ParseError::at(line, format!("invalid number '{}'", tok)))
}

/// Parses an MPS model from text.
pub fn read(text: &str, default_sense: ObjSense) -> Result<(LinearProgram, NameTables), ParseError> {
    let mut b = Builder::new(default_sense);
    let mut section = Section::Start;
    let mut expect_objsense = false;

    for (lineno, raw) in text.lines().enumerate() {
        let line = lineno + 1;
        if raw.trim().is_empty() || raw.starts_with('*') {
            continue;
        }
        let fields: Vec<&str> = raw.split_whitespace().collect();

        // Section headers start in column one.
        if !raw.starts_with(' ') && !raw.starts_with('\t') {
            let header = fields[0].to_ascii_uppercase();
            expect_objsense = false;
            section = match header.as_str() {
                "NAME" => Section::Start,
                "OBJSENSE" => {
                    if fields.len() > 1 {
                        b.sense = parse_sense(fields[1], line)?;
                        Section::Start
                    } else {
                        expect_objsense = true;
                        Section::Start
                    }
                }
                "ROWS" => Section::Rows,
                "COLUMNS" => Section::Columns,
                "RHS" => Section::Rhs,
                "RANGES" => Section::Ranges,
                "BOUNDS" => Section::Bounds,
                "ENDATA" => break,
                other => {
                    return Err(ParseError::at(
                        line,
                        format!("unknown section '{}'", other),
                    ))
                }
            };
            continue;
        }

        if expect_objsense {
            b.sense = parse_sense(fields[0], line)?;
            expect_objsense = false;
            continue;
        }

        match section {
            Section::Rows => {
                if fields.len() < 2 {
                    return Err(ParseError::at(line, "expected row type and name"));
                }
                let ty = match fields[0].to_ascii_uppercase().as_str() {
                    "N" => RowType::Objective,
                    "L" => RowType::Leq,
                    "G" => RowType::Geq,
                    "E" => RowType::Eq,
                    other => {
                        return Err(ParseError::at(
                            line,
                            format!("unknown row type '{}'", other),
                        ))
                    }
                };
                b.add_row(fields[1], ty, line)?;
            }
            Section::Columns => {
                if fields.len() < 3 || fields.len() % 2 == 0 {
                    return Err(ParseError::at(line, "expected column, row/value pairs"));
                }
                let j = b.col(fields[0]);
                for pair in fields[1..].chunks(2) {
                    let value = parse_value(pair[1], line)?;
                    b.set_entry(pair[0], j, value, line)?;
                }
            }
            Section::Rhs => {
                if fields.len() < 3 {
                    return Err(ParseError::at(line, "expected rhs name, row/value pairs"));
                }
                for pair in fields[1..].chunks(2) {
                    if pair.len() != 2 {
                        return Err(ParseError::at(line, "dangling rhs entry"));
                    }
                    b.set_rhs(pair[0], parse_value(pair[1], line)?, line)?;
                }
            }
            Section::Ranges => {
                if fields.len() < 3 {
                    return Err(ParseError::at(line, "expected range name, row/value pairs"));
                }
                for pair in fields[1..].chunks(2) {
                    if pair.len() != 2 {
                        return Err(ParseError::at(line, "dangling range entry"));
                    }
                    b.set_range(pair[0], parse_value(pair[1], line)?, line)?;
                }
            }
            Section::Bounds => {
                if fields.len() < 3 {
                    return Err(ParseError::at(line, "expected bound type, set, column"));
                }
                let kind = fields[0].to_ascii_uppercase();
                let value = if fields.len() > 3 {
                    Some(parse_value(fields[3], line)?)
                } else {
                    None
                };
                b.set_bound(&kind, fields[2], value, line)?;
            }
            Section::Start => {}
        }
    }

    b.finish()
}

fn parse_sense(tok: &str, line: usize) -> Result<ObjSense, ParseError> {
    match tok.to_ascii_uppercase().as_str() {
        "MIN" | "MINIMIZE" => Ok(ObjSense::Minimize),
        "MAX" | "MAXIMIZE" => Ok(ObjSense::Maximize),
        other => Err(ParseError::at(
            line,
            format!("unknown objective sense '{}'", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_unbounded;

    const SAMPLE: &str = "\
* sample problem
NAME          SAMPLE
ROWS
 N  COST
 L  LIM1
 G  LIM2
 E  EQ1
COLUMNS
    X1  COST  1.0  LIM1  1.0
    X1  LIM2  1.0
    X2  COST  2.0  LIM1  1.0
    X2  EQ1  -1.0
RHS
    RHS  LIM1  4.0  LIM2  1.0
    RHS  EQ1  7.0
RANGES
    RNG  LIM1  2.0
BOUNDS
 UP BND  X1  4.0
 FR BND  X2
ENDATA
";

    #[test]
    fn test_read_sample() {
        let (lp, names) = read(SAMPLE, ObjSense::Minimize).unwrap();
        assert_eq!(lp.dims(), (3, 2));
        assert_eq!(names.cols, vec!["X1", "X2"]);
        assert_eq!(names.rows, vec!["LIM1", "LIM2", "EQ1"]);

        assert_eq!(lp.obj()[0], 1.0);
        assert_eq!(lp.obj()[1], 2.0);

        // LIM1 is ranged by 2.0 around its rhs.
        assert_eq!(lp.rhs()[0], 4.0);
        assert_eq!(lp.lhs()[0], 2.0);
        // LIM2 is a >= row.
        assert_eq!(lp.lhs()[1], 1.0);
        assert!(is_unbounded(lp.rhs()[1]));
        // EQ1 pins both sides.
        assert_eq!(lp.lhs()[2], 7.0);
        assert_eq!(lp.rhs()[2], 7.0);

        assert_eq!(lp.upper()[0], 4.0);
        assert!(is_unbounded(lp.lower()[1]));
        assert!(is_unbounded(lp.upper()[1]));
    }

    #[test]
    fn test_error_carries_line() {
        let bad = "NAME X\nROWS\n N COST\n Q BADROW\n";
        match read(bad, ObjSense::Minimize) {
            Err(ParseError::Syntax { line, .. }) => assert_eq!(line, 4),
            other => panic!("unexpected {:?}", other),
        }
    }
}
