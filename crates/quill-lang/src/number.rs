use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Numeric template value. All template arithmetic runs on `f64`;
/// integer-ness is a property of the value, not the type, queried where the
/// evaluator demands whole numbers (range endpoints, array indices).
#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Number(f64);

impl Number {
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    /// Truncates to `i64`. Callers gate on [`Number::is_int`] first.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    /// Whether the value is whole, up to float precision.
    pub fn is_int(&self) -> bool {
        self.0.fract().abs() < f64::EPSILON
    }

    pub fn is_zero(&self) -> bool {
        self.0.abs() < f64::EPSILON
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

macro_rules! arith_op {
    ($($op_trait:ident :: $method:ident => $op:tt),+ $(,)?) => {
        $(impl $op_trait for Number {
            type Output = Number;

            fn $method(self, rhs: Number) -> Number {
                Number(self.0 $op rhs.0)
            }
        })+
    };
}

arith_op! {
    Add::add => +,
    Sub::sub => -,
    Mul::mul => *,
    Div::div => /,
    Rem::rem => %,
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        Number(-self.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

// Whole values print without a fractional part, everything else with up to
// six digits and the trailing zeros dropped. This is the text a rendered
// template shows for a numeric insertion.
impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "{}", self.to_int())
        } else {
            let rendered = format!("{:.6}", self.0);
            f.write_str(rendered.trim_end_matches('0').trim_end_matches('.'))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(42.0, "42")]
    #[case(42.123, "42.123")]
    #[case(42.100, "42.1")]
    #[case(-42.0, "-42")]
    #[case(0.0, "0")]
    #[case(0.1, "0.1")]
    fn test_display_formatting(#[case] input: f64, #[case] expected: &str) {
        assert_eq!(format!("{}", Number::new(input)), expected);
    }

    #[rstest]
    #[case(5.0, 2.0, "7", "3", "10", "2.5", "1")]
    #[case(10.0, 3.0, "13", "7", "30", "3.333333", "1")]
    #[case(-5.0, 2.0, "-3", "-7", "-10", "-2.5", "-1")]
    fn test_operations(
        #[case] a: f64,
        #[case] b: f64,
        #[case] add_result: &str,
        #[case] sub_result: &str,
        #[case] mul_result: &str,
        #[case] div_result: &str,
        #[case] rem_result: &str,
    ) {
        let num_a = Number::new(a);
        let num_b = Number::new(b);

        assert_eq!(format!("{}", num_a + num_b), add_result);
        assert_eq!(format!("{}", num_a - num_b), sub_result);
        assert_eq!(format!("{}", num_a * num_b), mul_result);
        assert_eq!(format!("{}", num_a / num_b), div_result);
        assert_eq!(format!("{}", num_a % num_b), rem_result);
    }

    #[rstest]
    #[case(3.0, true)]
    #[case(3.5, false)]
    #[case(-7.0, true)]
    fn test_is_int(#[case] input: f64, #[case] expected: bool) {
        assert_eq!(Number::new(input).is_int(), expected);
    }

    #[test]
    fn test_is_zero() {
        assert!(Number::new(0.0).is_zero());
        assert!(!Number::new(0.5).is_zero());
    }

    #[test]
    fn test_to_int_truncates() {
        assert_eq!(Number::new(7.0).to_int(), 7);
        assert_eq!(Number::new(-3.9).to_int(), -3);
    }
}
