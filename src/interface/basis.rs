//! MPS-style basis files.
//!
//! Each line pairs a basic structural column with a nonbasic row (`XL`: row
//! rests on its lhs, `XU`: on its rhs) or marks a nonbasic column sitting on
//! its upper (`UL`) or lower (`LL`) bound; `ENDATA` terminates the file.
//! Everything unmentioned keeps the slack-basis default: rows basic, columns
//! on their preferred bound.

use std::collections::HashMap;

use super::{NameTables, ParseError};
use crate::lp::LinearProgram;
use crate::simplex::desc::{Descriptor, VarStatus};
use crate::E;

/// Writes the basis of `desc` in MPS basis format.
pub fn write_basis<W: std::io::Write>(
    out: &mut W,
    desc: &Descriptor,
    names: &NameTables,
) -> std::io::Result<()> {
    let n = desc.n_cols();
    let m = desc.n_rows();

    // Basic columns pair with nonbasic rows in file order.
    let mut nonbasic_rows = (0..m).filter(|&i| !desc.row_status(i).is_basic());
    for j in 0..n {
        let status = desc.col_status(j);
        if status.is_basic() {
            match nonbasic_rows.next() {
                Some(i) => {
                    let tag = if desc.row_status(i) == VarStatus::PUpper {
                        "XU"
                    } else {
                        "XL"
                    };
                    writeln!(out, " {} {} {}", tag, names.cols[j], names.rows[i])?;
                }
                // More basic columns than nonbasic rows would mean an
                // inconsistent descriptor; emit nothing for the excess.
                None => {}
            }
        } else if status == VarStatus::PUpper {
            writeln!(out, " UL {}", names.cols[j])?;
        }
    }
    writeln!(out, "ENDATA")?;
    Ok(())
}

/// Reads an MPS basis file against the given LP and name tables.
pub fn read_basis(
    text: &str,
    lp: &LinearProgram,
    names: &NameTables,
) -> Result<Descriptor, ParseError> {
    let (m, n) = lp.dims();
    let col_index: HashMap<&str, usize> = names
        .cols
        .iter()
        .enumerate()
        .map(|(j, s)| (s.as_str(), j))
        .collect();
    let row_index: HashMap<&str, usize> = names
        .rows
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    // Slack-basis defaults.
    let mut desc = Descriptor::new(m, n);
    for j in 0..n {
        desc.set_status(
            j,
            VarStatus::nonbasic_from_bounds(lp.lower()[j], lp.upper()[j]),
        );
    }
    for i in 0..m {
        desc.set_status(
            n + i,
            VarStatus::dual_from_bounds(lp.lhs()[i], lp.rhs()[i]),
        );
    }

    for (lineno, raw) in text.lines().enumerate() {
        let line = lineno + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            continue;
        }
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let tag = fields[0].to_ascii_uppercase();
        if tag == "ENDATA" {
            break;
        }
        let lookup_col = |name: &str| {
            col_index
                .get(name)
                .copied()
                .ok_or_else(|| ParseError::at(line, format!("unknown column '{}'", name)))
        };
        let lookup_row = |name: &str| {
            row_index
                .get(name)
                .copied()
                .ok_or_else(|| ParseError::at(line, format!("unknown row '{}'", name)))
        };
        match tag.as_str() {
            "XL" | "XU" => {
                if fields.len() < 3 {
                    return Err(ParseError::at(line, "expected column and row names"));
                }
                let j = lookup_col(fields[1])?;
                let i = lookup_row(fields[2])?;
                desc.set_status(j, VarStatus::dual_from_bounds(lp.lower()[j], lp.upper()[j]));
                desc.set_status(
                    n + i,
                    pick_side(tag == "XU", lp.lhs()[i], lp.rhs()[i]),
                );
            }
            "LL" | "UL" => {
                if fields.len() < 2 {
                    return Err(ParseError::at(line, "expected a column name"));
                }
                let j = lookup_col(fields[1])?;
                desc.set_status(j, pick_side(tag == "UL", lp.lower()[j], lp.upper()[j]));
            }
            other => {
                return Err(ParseError::at(
                    line,
                    format!("unknown basis indicator '{}'", other),
                ))
            }
        }
    }

    if desc.n_basic() != m {
        return Err(ParseError::Model {
            message: format!(
                "basis file yields {} basic variables, expected {}",
                desc.n_basic(),
                m
            ),
        });
    }
    Ok(desc)
}

/// Nonbasic placement on the requested side, falling back to whichever
/// bound actually exists.
fn pick_side(upper: bool, low: E, up: E) -> VarStatus {
    if upper && !crate::is_unbounded(up) {
        VarStatus::PUpper
    } else if !upper && !crate::is_unbounded(low) {
        VarStatus::PLower
    } else {
        VarStatus::nonbasic_from_bounds(low, up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ObjSense;
    use crate::INFTY;
    use faer::Col;

    fn lp_and_names() -> (LinearProgram, NameTables) {
        let lp = LinearProgram::new(
            ObjSense::Minimize,
            Col::from_fn(2, |_| 1.),
            2,
            &[(0, 0, 1.), (0, 1, 1.), (1, 0, 1.), (1, 1, -1.)],
            Col::from_fn(2, |i| [1., -INFTY][i]),
            Col::from_fn(2, |i| [4., 2.][i]),
            Col::from_fn(2, |_| 0.),
            Col::from_fn(2, |_| 5.),
        )
        .unwrap();
        let names = NameTables {
            rows: vec!["r1".to_string(), "r2".to_string()],
            cols: vec!["x1".to_string(), "x2".to_string()],
        };
        (lp, names)
    }

    #[test]
    fn test_roundtrip() {
        let (lp, names) = lp_and_names();
        let text = " XL x1 r1\n UL x2\nENDATA\n";
        let desc = read_basis(text, &lp, &names).unwrap();
        assert!(desc.col_status(0).is_basic());
        assert_eq!(desc.col_status(1), VarStatus::PUpper);
        assert_eq!(desc.row_status(0), VarStatus::PLower);
        assert!(desc.row_status(1).is_basic());
        assert_eq!(desc.n_basic(), 2);

        let mut buf = Vec::new();
        write_basis(&mut buf, &desc, &names).unwrap();
        let written = String::from_utf8(buf).unwrap();
        let reread = read_basis(&written, &lp, &names).unwrap();
        assert_eq!(reread.dump(), desc.dump());
    }

    #[test]
    fn test_unknown_name_is_reported() {
        let (lp, names) = lp_and_names();
        let err = read_basis(" XL nosuch r1\nENDATA\n", &lp, &names).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, .. }));
    }
}
