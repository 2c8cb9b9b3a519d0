//! SCPI parameter parsing.
//!
//! Parameters follow the header after whitespace, separated by commas.
//! Numeric parameters may carry a unit suffix; integers accept a 0x prefix
//! for register work. Every accessor reports a queue-ready [`ScpiError`].

use crate::scpi::ScpiError;

const MAX_PARAMS: usize = 8;

/// Positional access to the parameter list of one command.
#[derive(Debug)]
pub struct Params<'a> {
    items: heapless::Vec<&'a str, MAX_PARAMS>,
    next: usize,
}

impl<'a> Params<'a> {
    /// `raw` is everything after the header, possibly empty.
    pub fn parse(raw: &'a str) -> Result<Self, ScpiError> {
        let mut items = heapless::Vec::new();
        for item in raw.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            items.push(item).map_err(|_| ScpiError::SyntaxError)?;
        }
        Ok(Self { items, next: 0 })
    }

    fn take(&mut self) -> Result<&'a str, ScpiError> {
        let item = self
            .items
            .get(self.next)
            .ok_or(ScpiError::MissingParameter)?;
        self.next += 1;
        Ok(item)
    }

    fn take_opt(&mut self) -> Option<&'a str> {
        let item = self.items.get(self.next)?;
        self.next += 1;
        Some(item)
    }

    /// Anything left unconsumed is a syntax error in the sender's list.
    pub fn finish(&self) -> Result<(), ScpiError> {
        if self.next < self.items.len() {
            Err(ScpiError::SyntaxError)
        } else {
            Ok(())
        }
    }

    pub fn next_f64(&mut self) -> Result<f64, ScpiError> {
        parse_f64(self.take()?)
    }

    pub fn next_u32(&mut self) -> Result<u32, ScpiError> {
        parse_u32(self.take()?)
    }

    pub fn opt_u32(&mut self) -> Result<Option<u32>, ScpiError> {
        match self.take_opt() {
            Some(item) => Ok(Some(parse_u32(item)?)),
            None => Ok(None),
        }
    }

    /// Number with an optional voltage unit; result in volts.
    pub fn next_voltage(&mut self) -> Result<f64, ScpiError> {
        let (number, suffix) = split_suffix(self.take()?);
        let scale =
            unit_scale(suffix, &[("", 1.0), ("V", 1.0), ("MV", 1e-3), ("KV", 1e3)])?;
        Ok(parse_f64(number)? * scale)
    }

    /// Number with an optional time unit; result in seconds.
    pub fn next_seconds(&mut self) -> Result<f64, ScpiError> {
        let (number, suffix) = split_suffix(self.take()?);
        let scale = unit_scale(
            suffix,
            &[("", 1.0), ("S", 1.0), ("MS", 1e-3), ("US", 1e-6), ("NS", 1e-9)],
        )?;
        Ok(parse_f64(number)? * scale)
    }

    /// Boolean parameter: ON/OFF or 1/0.
    pub fn next_on_off(&mut self) -> Result<bool, ScpiError> {
        let item = self.take()?;
        if item.eq_ignore_ascii_case("ON") || item == "1" {
            Ok(true)
        } else if item.eq_ignore_ascii_case("OFF") || item == "0" {
            Ok(false)
        } else {
            Err(ScpiError::IllegalParameterValue)
        }
    }
}

fn parse_f64(s: &str) -> Result<f64, ScpiError> {
    s.parse().map_err(|_| ScpiError::IllegalParameterValue)
}

fn parse_u32(s: &str) -> Result<u32, ScpiError> {
    let result = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        s.parse()
    };
    result.map_err(|_| ScpiError::IllegalParameterValue)
}

fn unit_scale(suffix: &str, table: &[(&str, f64)]) -> Result<f64, ScpiError> {
    table
        .iter()
        .find(|(unit, _)| suffix.eq_ignore_ascii_case(unit))
        .map(|&(_, scale)| scale)
        .ok_or(ScpiError::InvalidSuffix)
}

/// Split a token into its numeric front and alphabetic unit tail.
fn split_suffix(item: &str) -> (&str, &str) {
    let split = item
        .rfind(|c: char| c.is_ascii_digit() || c == '.')
        .map_or(0, |i| i + 1);
    let (number, suffix) = item.split_at(split);
    (number.trim(), suffix.trim())
}
