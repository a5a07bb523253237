use anyhow::{bail, Context};

use cellmesh_p2p::Operation;

/// Parses `"<lhs> <op> <rhs>"`, e.g. `"10 / 2"` or `"-3*4"`.
pub fn parse_expression(line: &str) -> anyhow::Result<(Operation, i32, i32)> {
    let line = line.trim();
    let Some((at, symbol)) = line
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '+' | '-' | '*' | '/'))
    else {
        bail!("no operator in '{}'", line);
    };

    let op = symbol.to_string().parse::<Operation>()?;
    let lhs = line[..at].trim();
    let rhs = line[at + symbol.len_utf8()..].trim();
    let lhs = lhs.parse::<i32>().with_context(|| format!("bad left operand '{}'", lhs))?;
    let rhs = rhs.parse::<i32>().with_context(|| format!("bad right operand '{}'", rhs))?;
    Ok((op, lhs, rhs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expression() {
        assert_eq!(parse_expression("10 / 2").unwrap(), (Operation::Div, 10, 2));
        assert_eq!(parse_expression("-3*4").unwrap(), (Operation::Mul, -3, 4));
        assert_eq!(parse_expression(" 3 - -2 ").unwrap(), (Operation::Sub, 3, -2));
        assert_eq!(parse_expression("7+0").unwrap(), (Operation::Add, 7, 0));
    }

    #[test]
    fn test_parse_expression_errors() {
        assert!(parse_expression("42").is_err());
        assert!(parse_expression("a + 1").is_err());
        assert!(parse_expression("1 + 99999999999").is_err());
        assert!(parse_expression("").is_err());
    }
}
