//! `$name` / `${expr}` substitution in plain strings

use std::collections::HashMap;

use crate::common::Result;
use crate::runtime::Scope;

use super::eval::Context;
use super::ops::Registry;
use super::parser::parse_istring;

/// Render `text` against `vars`
///
/// Embedded expressions cannot call operators, so no registry is needed.
pub fn interpolate(text: &str, vars: &Scope) -> Result<String> {
    let Some(istr) = parse_istring(text)? else {
        return Ok(String::new());
    };
    let ops = Registry::new();
    istr.eval(&Context::new(vars, &ops))
}

/// Render every value of a parameter map
pub fn interpolate_params(
    params: &HashMap<String, String>,
    vars: &Scope,
) -> Result<HashMap<String, String>> {
    params
        .iter()
        .map(|(k, v)| Ok((k.clone(), interpolate(v, vars)?)))
        .collect()
}
