use super::cli::LimitArg;
use crate::config::parse_limit;
use crate::error::AppResult;

pub(crate) fn parse_limit_arg(s: &str) -> AppResult<LimitArg> {
    let (name, value) = parse_limit(s)?;
    Ok(LimitArg { name, value })
}
