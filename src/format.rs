//! Format identifiers used in the manifest.
//!
//! The manifest names each entry's type with a URI: either an
//! `identifiers.org` COMBINE specification or a `purl.org` media type. Older
//! archives sometimes carry bare MIME types instead, which
//! [`convert_mimetype`] upgrades.

use crate::error::{CombineError, Result};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Format of the archive itself, declared on the `.` manifest entry
pub const OMEX: &str = "http://identifiers.org/combine.specifications/omex";
/// Format of the manifest document
pub const OMEX_MANIFEST: &str = "http://identifiers.org/combine.specifications/omex-manifest";
/// Format of OMEX metadata documents
pub const OMEX_METADATA: &str = "http://identifiers.org/combine.specifications/omex-metadata";

pub const SBML: &str = "http://identifiers.org/combine.specifications/sbml";
pub const SEDML: &str = "http://identifiers.org/combine.specifications/sed-ml";
pub const CELLML: &str = "http://identifiers.org/combine.specifications/cellml";
pub const SBGN: &str = "http://identifiers.org/combine.specifications/sbgn";

const PURL_MEDIA_TYPE_BASE: &str = "http://purl.org/NET/mediatypes";

fn mime_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9+.\-]+)/([a-zA-Z0-9+.\-]+)$").expect("valid MIME pattern")
    })
}

fn format_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^https?://(?:www\.)?(?P<domain>[\w.\-]+)/(?P<format>[\w.\-+/]+)$")
            .expect("valid format URL pattern")
    })
}

/// Media-type URL for a bare MIME type
pub fn media_type(mime: &str) -> String {
    format!("{}/{}", PURL_MEDIA_TYPE_BASE, mime)
}

/// Upgrade a bare MIME type (`text/plain`) to its purl.org URL; anything
/// else comes back unchanged
pub fn convert_mimetype(format: &str) -> String {
    match mime_pattern().captures(format) {
        Some(caps) => format!("{}/{}/{}", PURL_MEDIA_TYPE_BASE, &caps[1], &caps[2]),
        None => format.to_string(),
    }
}

/// Validate a format identifier.
///
/// With `convert`, bare MIME types are upgraded first. Only `http(s)` URLs on
/// `purl.org` or `identifiers.org` are accepted; without `convert` a bare MIME
/// type is also accepted as-is.
pub fn check_format(format: &str, convert: bool) -> Result<String> {
    let format = if convert {
        convert_mimetype(format)
    } else {
        format.to_string()
    };

    let Some(caps) = format_url_pattern().captures(&format) else {
        if !convert && mime_pattern().is_match(&format) {
            return Ok(format);
        }
        return Err(CombineError::InvalidFormat(format!(
            "{} is neither a format URL nor a MIME type",
            format
        )));
    };

    match &caps["domain"] {
        "purl.org" | "identifiers.org" => Ok(format),
        domain => Err(CombineError::InvalidFormat(format!(
            "{} is not a known format domain (purl.org or identifiers.org)",
            domain
        ))),
    }
}

/// Whether `format` names an OMEX metadata document
pub fn is_metadata_format(format: &str) -> bool {
    format == OMEX_METADATA || format.starts_with(&format!("{}.", OMEX_METADATA))
}
