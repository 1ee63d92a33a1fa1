//! Splitting multi-statement scripts for drivers that execute one statement per call.

/// Terminator that closes a procedural block, written at the end of a line.
pub const BLOCK_TERMINATOR: char = '/';
/// Separator between ordinary statements.
pub const STATEMENT_SEPARATOR: char = ';';
/// Batch separator understood by server scripting layers.
pub const BATCH_SEPARATOR: &str = "GO";

/// Split a script into individually executable units, in script order.
///
/// A line ending in `/` closes the lines accumulated so far. If any of those lines opens a
/// procedural unit (`BEGIN`, `DECLARE`, `CREATE [OR REPLACE] PROCEDURE`, `REPLACE FUNCTION`
/// and similar), the whole block is one unit with its inner semicolons. Otherwise the block is
/// split on `;`. Lines left over at the end of the script are split on `;` too. Blank units
/// are dropped.
///
/// ```
/// use sqlinstall::splitter::split_statements;
///
/// let units = split_statements("stmt1;\nstmt2 /\nstmt3;");
/// assert_eq!(units, vec!["stmt1", "stmt2", "stmt3"]);
/// ```
pub fn split_statements(script: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in script.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        if line.trim().ends_with(BLOCK_TERMINATOR) {
            lines.push(line.trim_end().trim_end_matches(BLOCK_TERMINATOR));
            if lines.iter().any(|l| opens_procedural_unit(l)) {
                push_unit(&mut units, lines.join("\n"));
            } else {
                push_statements(&mut units, &lines);
            }
            lines.clear();
        } else {
            lines.push(line);
        }
    }
    push_statements(&mut units, &lines);
    units
}

/// Split a script on lines consisting only of `GO`, the way server scripting layers do.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case(BATCH_SEPARATOR) {
            push_unit(&mut batches, current.join("\n"));
            current.clear();
        } else {
            current.push(line);
        }
    }
    push_unit(&mut batches, current.join("\n"));
    batches
}

fn push_statements(units: &mut Vec<String>, lines: &[&str]) {
    if lines.is_empty() {
        return;
    }
    for statement in lines.join("\n").split(STATEMENT_SEPARATOR) {
        push_unit(units, statement.to_string());
    }
}

fn push_unit(units: &mut Vec<String>, unit: String) {
    let unit = unit.trim();
    if !unit.is_empty() {
        units.push(unit.to_string());
    }
}

fn opens_procedural_unit(line: &str) -> bool {
    let words = line
        .split_whitespace()
        .take(6)
        .map(str::to_uppercase)
        .filter(|w| w != "EDITIONABLE" && w != "NONEDITIONABLE")
        .collect::<Vec<_>>();
    let words = words.iter().map(String::as_str).collect::<Vec<_>>();
    let routine = |w: &str| matches!(w, "PROCEDURE" | "FUNCTION" | "PACKAGE" | "TRIGGER" | "TYPE");
    match words.as_slice() {
        [first, ..] if first.starts_with("BEGIN") || first.starts_with("DECLARE") => true,
        ["CREATE", "OR", "REPLACE", kind, ..] => routine(*kind),
        ["CREATE", kind, ..] | ["REPLACE", kind, ..] => routine(*kind),
        _ => false,
    }
}
