// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use crate::message::{Message, Operation};
use crate::{ProtocolError, ServiceError};

/// Evaluates `lhs op rhs`. Addition, subtraction and multiplication wrap on
/// overflow; division is checked.
pub fn evaluate(op: Operation, lhs: i32, rhs: i32) -> Result<i32, ServiceError> {
    match op {
        Operation::Add => Ok(lhs.wrapping_add(rhs)),
        Operation::Sub => Ok(lhs.wrapping_sub(rhs)),
        Operation::Mul => Ok(lhs.wrapping_mul(rhs)),
        Operation::Div if rhs == 0 => Err(ServiceError::DivisionByZero),
        Operation::Div => lhs
            .checked_div(rhs)
            .ok_or(ServiceError::Overflow(lhs, op.symbol(), rhs)),
    }
}

/// Evaluates an arithmetic request message.
///
/// The outer error is a malformed request; the inner one an evaluation
/// failure that is reported back to the requester.
pub fn evaluate_request(request: &Message) -> Result<Result<i32, ServiceError>, ProtocolError> {
    let Some(op) = Operation::from_kind(request.kind()) else {
        return Ok(Err(ServiceError::NotArithmetic(request.kind())));
    };

    let (lhs, rhs) = request.operands()?;
    Ok(evaluate(op, lhs, rhs))
}

#[cfg(test)]
mod tests {
    use cellmesh_base::create_identifier;

    use super::*;
    use crate::message::{MessageKind, PeerRole};

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate(Operation::Add, 2, 3), Ok(5));
        assert_eq!(evaluate(Operation::Sub, 2, 3), Ok(-1));
        assert_eq!(evaluate(Operation::Mul, -4, 3), Ok(-12));
        assert_eq!(evaluate(Operation::Div, 10, 2), Ok(5));
        assert_eq!(evaluate(Operation::Div, 7, 2), Ok(3));
        assert_eq!(evaluate(Operation::Div, -7, 2), Ok(-3));
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(evaluate(Operation::Add, i32::MAX, 1), Ok(i32::MIN));
        assert_eq!(evaluate(Operation::Div, 7, 0), Err(ServiceError::DivisionByZero));
        assert_eq!(
            evaluate(Operation::Div, i32::MIN, -1),
            Err(ServiceError::Overflow(i32::MIN, "/", -1))
        );
        assert_eq!(ServiceError::DivisionByZero.to_string(), "division by zero");
    }

    #[test]
    fn test_evaluate_request() {
        let sender = create_identifier("localhost", 4000).unwrap();
        let request = Message::request(sender, Operation::Mul, 6, 7, 0);
        assert_eq!(evaluate_request(&request).unwrap(), Ok(42));

        let ident = Message::identify(PeerRole::Server, sender, PeerRole::Node);
        assert_eq!(
            evaluate_request(&ident).unwrap(),
            Err(ServiceError::NotArithmetic(MessageKind::Identification))
        );
    }
}
