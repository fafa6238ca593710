use crate::constants::{HEADER_DATE, HEADER_RETRY_AFTER};
use crate::error::{self, Result};
use chrono::{DateTime, FixedOffset};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use snafu::OptionExt;
use std::time::Duration;

/// The shortest delay ever returned. A zero or negative delay would turn the caller's retry into
/// a tight loop against a server that explicitly asked for backoff.
const MIN_DELAY_SECS: i64 = 1;

/// Compute how long to wait before retrying a rate-limited request.
///
/// `retry-after` is either a whole number of seconds or an HTTP date. In the latter case the
/// server's `date` header is the reference point and must be present. Header names are matched
/// case-insensitively.
pub fn compute_delay(headers: &HeaderMap) -> Result<Duration> {
    let retry_after = header_str(headers, HEADER_RETRY_AFTER)?.context(
        error::MissingHeaderSnafu {
            header: HEADER_RETRY_AFTER,
        },
    )?;

    let trimmed = retry_after.trim();
    if is_integer(trimmed) {
        let seconds = trimmed
            .parse::<i64>()
            .map_err(|e| error::Error::MalformedRetryAfter {
                header: HEADER_RETRY_AFTER.to_string(),
                value: retry_after.to_string(),
                message: e.to_string(),
            })?;
        return Ok(clamp(seconds));
    }

    let date = header_str(headers, HEADER_DATE)?.context(error::MissingHeaderSnafu {
        header: HEADER_DATE,
    })?;
    let retry_at = parse_http_date(HEADER_RETRY_AFTER, retry_after)?;
    let now = parse_http_date(HEADER_DATE, date)?;
    Ok(clamp((retry_at - now).num_seconds()))
}

/// [`compute_delay`] for headers that are not already in a `HeaderMap`.
pub fn compute_delay_from_pairs<'a, I>(pairs: I) -> Result<Duration>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| error::Error::MalformedRetryAfter {
                header: name.to_string(),
                value: value.to_string(),
                message: e.to_string(),
            })?;
        let header_value =
            HeaderValue::from_str(value).map_err(|e| error::Error::MalformedRetryAfter {
                header: name.to_string(),
                value: value.to_string(),
                message: e.to_string(),
            })?;
        headers.insert(header_name, header_value);
    }
    compute_delay(&headers)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|e| error::Error::MalformedRetryAfter {
                    header: name.to_string(),
                    value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    message: e.to_string(),
                })
        })
        .transpose()
}

/// Digits with an optional sign. Anything else is treated as a date.
fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_http_date(header: &str, value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(value.trim()).map_err(|e| error::Error::MalformedRetryAfter {
        header: header.to_string(),
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn clamp(seconds: i64) -> Duration {
    Duration::from_secs(seconds.max(MIN_DELAY_SECS).unsigned_abs())
}
