//! Decimal amount handling without floats.
//!
//! The form works with human-readable decimal strings ("100", "0.5"); the aggregator works
//! with integer amounts in a token's smallest unit. Conversion is exact in both directions.

use alloy::primitives::U256;
use eyre::Context as _;

/// Characters a user may type into the amount field: digits and at most one `.` or `,`.
pub fn is_valid_amount_input(s: &str) -> bool {
    let mut seps = 0_usize;
    for c in s.chars() {
        match c {
            '0'..='9' => {}
            '.' | ',' => seps += 1,
            _ => return false,
        }
    }
    seps <= 1
}

fn pow10(decimals: u8) -> eyre::Result<U256> {
    U256::from(10_u8)
        .checked_pow(U256::from(decimals))
        .ok_or_else(|| eyre::eyre!("decimals too large"))
}

/// Scale a UI amount ("1.5") into base units for a token with `decimals`.
pub fn parse_units(s: &str, decimals: u8) -> eyre::Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }
    if s.starts_with('-') {
        eyre::bail!("amount must be non-negative");
    }
    if !is_valid_amount_input(s) {
        eyre::bail!("amount must be a decimal number");
    }
    let s = s.replace(',', ".");

    let (whole, frac) = match s.split_once('.') {
        Some((a, b)) => (a, b),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && frac.is_empty() {
        eyre::bail!("amount must contain a digit");
    }

    let whole_v = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).context("parse whole")?
    };

    if frac.len() > usize::from(decimals) {
        eyre::bail!("too many decimal places for token (decimals={decimals})");
    }

    let mut frac_s = frac.to_owned();
    while frac_s.len() < usize::from(decimals) {
        frac_s.push('0');
    }
    let frac_v = if frac_s.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(&frac_s, 10).context("parse fractional")?
    };

    whole_v
        .checked_mul(pow10(decimals)?)
        .and_then(|x| x.checked_add(frac_v))
        .ok_or_else(|| eyre::eyre!("amount overflow"))
}

/// Parse a base-unit integer as returned by the aggregator (e.g. `buyAmount`).
pub fn parse_base_units(s: &str) -> eyre::Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        eyre::bail!("empty amount");
    }
    U256::from_str_radix(s, 10).context("parse base amount")
}

/// Format a base-unit amount into a decimal string, trimming trailing zeros.
///
/// - base=1500000, decimals=6 => "1.5"
/// - base=1, decimals=6 => "0.000001"
pub fn format_units(base: U256, decimals: u8) -> eyre::Result<String> {
    if decimals == 0 {
        return Ok(base.to_string());
    }
    let scale = pow10(decimals)?;
    let whole = base / scale;
    let frac = base % scale;
    if frac.is_zero() {
        return Ok(whole.to_string());
    }
    let mut frac_s = format!("{:0>width$}", frac.to_string(), width = usize::from(decimals));
    while frac_s.ends_with('0') {
        frac_s.pop();
    }
    Ok(format!("{whole}.{frac_s}"))
}

/// Shorten a decimal string for display in the buy box.
///
/// Values below 0.001 are shown in scientific notation with four fractional mantissa
/// digits (`1.2346e-4`); anything with more than six fractional digits is truncated to six.
pub fn format_display_amount(amount: &str) -> String {
    let amount = amount.trim();
    if amount.is_empty() || amount == "0" {
        return "0".to_owned();
    }
    let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
    let whole_is_zero = whole.bytes().all(|b| b == b'0');
    let leading_zeros = frac.bytes().take_while(|b| *b == b'0').count();

    if whole_is_zero && leading_zeros >= 3 && leading_zeros < frac.len() {
        return scientific_small(frac, leading_zeros);
    }
    if frac.len() > 6 {
        let cut: String = frac.chars().take(6).collect();
        return format!("{whole}.{cut}");
    }
    amount.to_owned()
}

/// `frac` is the fractional digit string of a value < 0.001 whose first non-zero digit sits
/// at index `zeros`.
fn scientific_small(frac: &str, zeros: usize) -> String {
    let digits: Vec<u8> = frac
        .bytes()
        .skip(zeros)
        .map(|b| b.saturating_sub(b'0'))
        .collect();
    let mut exponent = zeros.saturating_add(1);

    // Keep five significant digits, rounding half up on the sixth.
    let mut mantissa: Vec<u8> = digits.iter().take(5).copied().collect();
    mantissa.resize(5, 0);
    let round_up = digits.get(5).is_some_and(|d| *d >= 5);
    if round_up {
        let mut carry = true;
        for d in mantissa.iter_mut().rev() {
            if !carry {
                break;
            }
            if *d == 9 {
                *d = 0;
            } else {
                *d += 1;
                carry = false;
            }
        }
        if carry {
            mantissa.insert(0, 1);
            mantissa.truncate(5);
            exponent = exponent.saturating_sub(1);
        }
    }

    let text: String = mantissa.iter().map(|d| char::from(b'0' + d)).collect();
    let (lead, rest) = text.split_at(1);
    format!("{lead}.{rest}e-{exponent}")
}
