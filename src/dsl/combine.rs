//! Merge several rule expressions into one conjunction.

const CONNECTIVES: [&str; 4] = [" AND ", " OR ", " and ", " or "];

/// Cost of an expression: number of connective substrings it contains.
/// Each pattern is counted on its own, so the count is case-sensitive per
/// pattern and additive across them.
pub fn expression_cost(expression: &str) -> usize {
    CONNECTIVES
        .iter()
        .map(|pat| expression.matches(pat).count())
        .sum()
}

/// Join expressions with `AND`, cheapest first.
///
/// Equal-cost expressions keep their input order. Any expression mentioning
/// `OR` (or ` or `) is parenthesized so its disjunction survives the join.
/// A single expression is returned untouched and an empty input yields an
/// empty string.
pub fn combine<S: AsRef<str>>(expressions: &[S]) -> String {
    match expressions {
        [] => return String::new(),
        [only] => return only.as_ref().to_string(),
        _ => {}
    }

    let mut ordered: Vec<&str> = expressions.iter().map(|e| e.as_ref()).collect();
    ordered.sort_by_key(|expr| expression_cost(expr));

    ordered
        .into_iter()
        .map(|expr| {
            if expr.contains("OR") || expr.contains(" or ") {
                format!("({})", expr)
            } else {
                expr.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}
