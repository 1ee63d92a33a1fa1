//! Natural (digit-aware, case-insensitive) ordering.
//!
//! Version directories and script files are applied in this order, so `v2` runs before `v10`
//! and `002.Table.sql` before `010.Table.sql`.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::path::Path;
use std::str::Chars;

/// Compare two strings in natural order.
///
/// Runs of ASCII digits are compared by numeric value (of any magnitude, leading zeros
/// ignored); every other character is compared by its lowercase ordinal value. When one string
/// runs out first it sorts first.
///
/// ```
/// use sqlinstall::natural_compare;
/// use std::cmp::Ordering;
///
/// assert_eq!(natural_compare("v2", "v10"), Ordering::Less);
/// assert_eq!(natural_compare("v02", "v2"), Ordering::Equal);
/// assert_eq!(natural_compare("a", "ab"), Ordering::Less);
/// ```
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut xs = a.chars().peekable();
    let mut ys = b.chars().peekable();

    loop {
        match (xs.peek().copied(), ys.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let vx = take_digits(&mut xs);
                let vy = take_digits(&mut ys);
                match compare_numeric(&vx, &vy) {
                    Ordering::Equal => {}
                    unequal => return unequal,
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                xs.next();
                ys.next();
            }
        }
    }
}

/// Sort paths by their full path in natural order.
pub fn sort_paths<P: AsRef<Path>>(paths: &mut [P]) {
    paths.sort_by(|a, b| {
        natural_compare(
            &a.as_ref().to_string_lossy(),
            &b.as_ref().to_string_lossy(),
        )
    });
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
