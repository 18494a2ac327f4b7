use super::OperationKind;
use crate::domain::Error;

/// Evaluates one operation. Divide-by-zero and overflow to non-finite values
/// are domain errors so the watcher can record them on the operation instead
/// of persisting NaN/inf.
pub fn compute(kind: OperationKind, a: f64, b: f64) -> Result<f64, Error> {
    let value = match kind {
        OperationKind::Add => a + b,
        OperationKind::Subtract => a - b,
        OperationKind::Multiply => a * b,
        OperationKind::Divide => {
            if b == 0.0 {
                return Err(Error::DivideByZero);
            }
            a / b
        }
        OperationKind::Power => a.powf(b),
    };

    if !value.is_finite() {
        return Err(Error::NotFinite);
    }

    Ok(value)
}
