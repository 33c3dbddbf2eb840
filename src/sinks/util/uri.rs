use percent_encoding::percent_decode_str;
use snafu::{ResultExt, Snafu};
use url::Url;

#[derive(Debug, Snafu)]
pub enum UriError {
    #[snafu(display("Invalid host {:?}: {}", host, source))]
    ParseHost {
        host: String,
        source: url::ParseError,
    },
    #[snafu(display("Host {:?} has no usable authority", host))]
    NoAuthority { host: String },
}

/// Builds the request URL for one configured host.
///
/// A host without a scheme gets `protocol` (or `http`) in front of it. A
/// non-empty `path` is appended to whatever path the host already carries,
/// joined by exactly one `/`.
pub fn make_url(protocol: Option<&str>, path: Option<&str>, host: &str) -> Result<Url, UriError> {
    let raw = if host.contains("://") {
        host.to_owned()
    } else {
        let scheme = protocol.filter(|p| !p.is_empty()).unwrap_or("http");
        format!("{}://{}", scheme, host)
    };

    let mut url = Url::parse(&raw).context(ParseHostSnafu { host })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return NoAuthoritySnafu { host }.fail();
    }

    if let Some(path) = path.filter(|p| !p.is_empty()) {
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
    }

    Ok(url)
}

/// Removes userinfo from `url`, returning the percent-decoded user and
/// password if there was any.
pub fn strip_credentials(url: &mut Url) -> Option<(String, String)> {
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }

    let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
    let user = decode(url.username());
    let password = url.password().map(decode).unwrap_or_default();

    // Only fails for URLs without a host, which `make_url` rejects.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    Some((user, password))
}
