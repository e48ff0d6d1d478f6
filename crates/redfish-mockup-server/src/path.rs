//! Request-target normalization.
//!
//! All path handling lives here: the rest of the server only ever sees
//! [`ResourcePath`] values, never raw strings. A `ResourcePath` carries two
//! views of the same target: the *canonical* key used to locate fixtures and
//! overlay entries, and the *external id* used wherever the wire-visible URI
//! matters (`@odata.id` comparisons, `Location` headers).

use std::fmt;

/// The fixed prefix omitted by short-form mockups.
const SHORT_FORM_PREFIX: &str = "redfish/v1";

/// A normalized resource identifier.
///
/// Two request targets that differ only in trailing slash, query string, or
/// fragment produce equal `ResourcePath`s. Degenerate input normalizes to the
/// empty canonical path, which addresses the mockup root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    /// Slash-separated key, no leading/trailing slash, short-form prefix
    /// removed when the server runs in short-form mode.
    canonical: String,
    /// Cleaned request path with leading slash, prefix intact.
    external: String,
}

impl ResourcePath {
    /// Normalize a raw request target (or an `@odata.id` string).
    pub fn resolve(raw: &str, short_form: bool) -> Self {
        let cleaned = raw
            .split('?')
            .next()
            .unwrap_or_default()
            .split('#')
            .next()
            .unwrap_or_default()
            .trim_matches('/');

        let canonical = if short_form {
            strip_prefix_segment(cleaned)
        } else {
            cleaned
        };

        ResourcePath {
            canonical: canonical.to_string(),
            external: format!("/{cleaned}"),
        }
    }

    /// The fixture/overlay lookup key.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// The wire-visible URI path, used for `@odata.id` matching.
    pub fn external_id(&self) -> &str {
        &self.external
    }

    /// True when this path addresses the mockup root.
    pub fn is_root(&self) -> bool {
        self.canonical.is_empty()
    }

    /// The containing collection's path (one segment up). The parent of a
    /// top-level segment is the mockup root.
    pub fn parent(&self) -> ResourcePath {
        ResourcePath {
            canonical: drop_last_segment(&self.canonical).to_string(),
            external: format!("/{}", drop_last_segment(self.external.trim_matches('/'))),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.external)
    }
}

/// Remove `redfish/v1` when it is the leading path segment. Mid-path
/// occurrences and longer segments (`redfish/v1x`) are left alone.
fn strip_prefix_segment(path: &str) -> &str {
    if path == SHORT_FORM_PREFIX {
        ""
    } else if let Some(rest) = path.strip_prefix("redfish/v1/") {
        rest
    } else {
        path
    }
}

fn drop_last_segment(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((head, _)) => head,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variants_map_to_same_path() {
        let plain = ResourcePath::resolve("/redfish/v1/Systems", false);
        assert_eq!(plain, ResourcePath::resolve("/redfish/v1/Systems/", false));
        assert_eq!(
            plain,
            ResourcePath::resolve("/redfish/v1/Systems?$top=3", false)
        );
        assert_eq!(
            plain,
            ResourcePath::resolve("/redfish/v1/Systems#frag", false)
        );
        assert_eq!(plain.canonical(), "redfish/v1/Systems");
        assert_eq!(plain.external_id(), "/redfish/v1/Systems");
    }

    #[test]
    fn test_short_form_strips_prefix_segment() {
        let path = ResourcePath::resolve("/redfish/v1/Systems/1", true);
        assert_eq!(path.canonical(), "Systems/1");
        // External id keeps whatever the client sent.
        assert_eq!(path.external_id(), "/redfish/v1/Systems/1");

        let bare = ResourcePath::resolve("/redfish/v1", true);
        assert_eq!(bare.canonical(), "");
        assert!(bare.is_root());

        // A client already using short addressing is untouched.
        let short = ResourcePath::resolve("/Systems/1", true);
        assert_eq!(short.canonical(), "Systems/1");
        assert_eq!(short.external_id(), "/Systems/1");
    }

    #[test]
    fn test_prefix_must_be_a_whole_segment() {
        let path = ResourcePath::resolve("/redfish/v1x/Thing", true);
        assert_eq!(path.canonical(), "redfish/v1x/Thing");
    }

    #[test]
    fn test_degenerate_input_is_root() {
        assert!(ResourcePath::resolve("", false).is_root());
        assert!(ResourcePath::resolve("/", false).is_root());
        assert!(ResourcePath::resolve("//", false).is_root());
        assert_eq!(ResourcePath::resolve("/", false).external_id(), "/");
    }

    #[test]
    fn test_parent() {
        let path = ResourcePath::resolve("/redfish/v1/Systems/437XR1138R2", false);
        let parent = path.parent();
        assert_eq!(parent.canonical(), "redfish/v1/Systems");
        assert_eq!(parent.external_id(), "/redfish/v1/Systems");

        let short = ResourcePath::resolve("/Systems/1", true);
        assert_eq!(short.parent().canonical(), "Systems");

        let top = ResourcePath::resolve("/Systems", true);
        assert!(top.parent().is_root());
    }

    #[test]
    fn test_odata_id_round_trip() {
        // Subscription members arrive as full @odata.id strings even when
        // the server itself runs short-form.
        let member = ResourcePath::resolve("/redfish/v1/EventService/Subscriptions/1", true);
        assert_eq!(member.canonical(), "EventService/Subscriptions/1");
    }
}
